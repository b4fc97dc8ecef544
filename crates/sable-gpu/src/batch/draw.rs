use crate::device::{Program, RenderFlags};
use crate::error::{GpuError, GpuResult};
use crate::texture::Texture;

use super::index::IndexBuffer;
use super::vertex::Vertex;

/// GPU state shared by every primitive of one draw.
#[derive(Debug, Clone)]
pub struct Header {
    pub program: Program,
    pub texture: Option<Texture>,
    pub flags: RenderFlags,
}

impl Header {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            texture: None,
            flags: RenderFlags::empty(),
        }
    }

    pub fn with_texture(mut self, texture: Texture) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn is_multisampled(&self) -> bool {
        self.flags.contains(RenderFlags::MULTISAMPLE)
    }

    /// Whether a draw stamped with `other` may be appended to one stamped
    /// with `self`.
    ///
    /// Texture identity is not compared. A merged record keeps the texture
    /// it already has, so draws that need different textures must use
    /// different programs or share one atlas page.
    pub fn merges_with(&self, other: &Header) -> bool {
        self.program == other.program && self.is_multisampled() == other.is_multisampled()
    }
}

/// One retained draw: a header plus the geometry it renders.
///
/// Indices are relative to this draw's own vertex list. `origin` is the
/// vertex count at the latest `begin`, added to every index appended since.
#[derive(Debug)]
pub struct Draw {
    pub(crate) header: Header,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) indices: IndexBuffer,
    pub(crate) origin: u32,
}

impl Draw {
    pub(crate) fn with_capacity(
        header: Header,
        vertices: usize,
        index_bytes: usize,
    ) -> GpuResult<Self> {
        let mut v = Vec::new();
        v.try_reserve_exact(vertices)?;
        Ok(Self {
            header,
            vertices: v,
            indices: IndexBuffer::with_capacity_bytes(index_bytes)?,
            origin: 0,
        })
    }

    /// Empties geometry and drops the texture reference, keeping storage.
    pub(crate) fn reset(&mut self) {
        self.header.texture = None;
        self.vertices.clear();
        self.indices.reset();
        self.origin = 0;
    }

    pub(crate) fn push_vertex(&mut self, vertex: Vertex) -> GpuResult<u32> {
        if self.vertices.len() > u32::MAX as usize {
            return Err(GpuError::Overflow);
        }
        if self.vertices.len() == self.vertices.capacity() {
            let grow = self.vertices.capacity().max(1);
            self.vertices.try_reserve_exact(grow)?;
        }
        self.vertices.push(vertex);
        Ok(self.vertices.len() as u32 - 1 - self.origin)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &IndexBuffer {
        &self.indices
    }

    pub fn origin(&self) -> u32 {
        self.origin
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multisample_flag_is_the_only_flag_that_splits() {
        let plain = Header::new(Program::Glyph);
        let msaa = Header::new(Program::Glyph).with_flags(RenderFlags::MULTISAMPLE);

        assert!(!plain.is_multisampled());
        assert!(msaa.is_multisampled());
        assert!(RenderFlags::MULTISAMPLE.contains(RenderFlags::empty()));
        assert!(!RenderFlags::empty().contains(RenderFlags::MULTISAMPLE));

        assert!(plain.merges_with(&Header::new(Program::Glyph)));
        assert!(!plain.merges_with(&msaa));
        assert!(!plain.merges_with(&Header::new(Program::Image)));
    }
}
