use bytemuck::{Pod, Zeroable};

/// One batched vertex.
///
/// `cmd` indexes the float4 command buffer uploaded with the batch; the
/// shader reads its shading parameters from there.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub cmd: u32,
}

impl Vertex {
    const ATTRS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Uint32];

    #[inline]
    pub const fn new(cmd: u32, x: f32, y: f32) -> Self {
        Self::textured(cmd, x, y, 0.0, 0.0)
    }

    #[inline]
    pub const fn textured(cmd: u32, x: f32, y: f32, s: f32, t: f32) -> Self {
        Self {
            pos: [x, y],
            uv: [s, t],
            cmd,
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}
