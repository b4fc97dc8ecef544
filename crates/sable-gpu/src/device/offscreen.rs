use std::collections::HashMap;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use crate::batch::Vertex;

use super::functions::{
    FilterMode, FramebufferStatus, GpuFunctions, ImageDesc, ImageRegion, IndexData, NativeId,
    PixelFormat, Program, RenderFlags, SamplerParams, WrapMode,
};
use super::WgpuInit;

const COMMAND_WORD_SIZE: u64 = std::mem::size_of::<[f32; 4]>() as u64;

// ── storage slots ─────────────────────────────────────────────────────────

struct TextureSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: ImageDesc,
}

#[derive(Debug, Default, Copy, Clone)]
struct Attachments {
    color: NativeId,
    stencil: NativeId,
}

fn color_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Alpha8 => wgpu::TextureFormat::R8Unorm,
        PixelFormat::Rgba32 | PixelFormat::PremultipliedRgba32 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

// ── backend ───────────────────────────────────────────────────────────────

/// Function table backed by a wgpu device, rendering offscreen.
///
/// Object names are generated locally and map to wgpu resources:
/// - textures and stencil renderbuffers are `wgpu::Texture`s, created when
///   storage is defined
/// - framebuffers are attachment records resolved at draw time
/// - programs are render pipelines registered with [`register_program`]
///
/// Every pipeline must be built against [`program_layout`]: binding 0 is the
/// read-only command storage buffer, binding 1 the unit-0 texture view,
/// binding 2 its sampler. Vertex buffers use [`Vertex::layout`].
///
/// Presentation to a window surface is platform glue and not handled here;
/// draws targeting framebuffer 0 are dropped.
///
/// [`register_program`]: WgpuFunctions::register_program
/// [`program_layout`]: WgpuFunctions::program_layout
pub struct WgpuFunctions {
    device: wgpu::Device,
    queue: wgpu::Queue,

    next_id: NativeId,
    textures: HashMap<NativeId, Option<TextureSlot>>,
    renderbuffers: HashMap<NativeId, Option<TextureSlot>>,
    framebuffers: HashMap<NativeId, Attachments>,

    bound_framebuffer: NativeId,
    bound_texture: Option<(NativeId, SamplerParams)>,
    viewport: (u32, u32),
    program: Option<(Program, RenderFlags)>,

    layout: wgpu::BindGroupLayout,
    pipelines: HashMap<Program, wgpu::RenderPipeline>,
    samplers: HashMap<SamplerParams, wgpu::Sampler>,
    placeholder: TextureSlot,

    commands: wgpu::Buffer,
    commands_capacity: u64,
}

impl WgpuFunctions {
    /// Acquires an adapter and device without any surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; this blocks on it.
    pub fn new_headless(init: WgpuInit) -> Result<Self> {
        pollster::block_on(Self::request(init))
    }

    async fn request(init: WgpuInit) -> Result<Self> {
        let WgpuInit {
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sable offscreen device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        log::debug!("offscreen wgpu backend on {:?}", adapter.get_info().name);
        Ok(Self::from_device(device, queue))
    }

    /// Wraps an existing device/queue pair.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sable program bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let placeholder_desc = ImageDesc {
            width: 1,
            height: 1,
            format: PixelFormat::Rgba32,
            samples: 1,
        };
        let placeholder = create_slot(&device, placeholder_desc, "sable placeholder texture");
        write_region(
            &queue,
            &placeholder.texture,
            ImageRegion { x: 0, y: 0, width: 1, height: 1 },
            PixelFormat::Rgba32,
            &[0xff; 4],
            0,
        );

        let commands_capacity = COMMAND_WORD_SIZE * 64;
        let commands = create_command_buffer(&device, commands_capacity);

        Self {
            device,
            queue,
            next_id: 0,
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_framebuffer: 0,
            bound_texture: None,
            viewport: (0, 0),
            program: None,
            layout,
            pipelines: HashMap::new(),
            samplers: HashMap::new(),
            placeholder,
            commands,
            commands_capacity,
        }
    }

    /// Bind group layout every registered pipeline must use.
    pub fn program_layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Associates a render pipeline with `program`. Replaces any previous one.
    pub fn register_program(&mut self, program: Program, pipeline: wgpu::RenderPipeline) {
        self.pipelines.insert(program, pipeline);
    }

    fn generate(&mut self, count: usize) -> Vec<NativeId> {
        (0..count)
            .map(|_| {
                self.next_id = self.next_id.wrapping_add(1).max(1);
                self.next_id
            })
            .collect()
    }

    fn sampler(&mut self, params: SamplerParams) -> &wgpu::Sampler {
        let device = &self.device;
        self.samplers.entry(params).or_insert_with(|| {
            let address_mode = match params.wrap {
                WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
                WrapMode::Repeat => wgpu::AddressMode::Repeat,
            };
            let filter = match params.filter {
                FilterMode::Linear => wgpu::FilterMode::Linear,
                FilterMode::Nearest => wgpu::FilterMode::Nearest,
            };
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("sable sampler"),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                address_mode_w: address_mode,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            })
        })
    }

    /// Resolves the color (and optional stencil) views of the bound framebuffer.
    fn target_views(&self) -> Option<(&wgpu::TextureView, Option<&wgpu::TextureView>)> {
        let fb = self.framebuffers.get(&self.bound_framebuffer)?;
        let color = self.textures.get(&fb.color)?.as_ref()?;
        let stencil = self
            .renderbuffers
            .get(&fb.stencil)
            .and_then(|slot| slot.as_ref())
            .map(|slot| &slot.view);
        Some((&color.view, stencil))
    }
}

// ── resource helpers ──────────────────────────────────────────────────────

fn create_slot(device: &wgpu::Device, desc: ImageDesc, label: &str) -> TextureSlot {
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;
    if desc.samples <= 1 {
        usage |= wgpu::TextureUsages::COPY_DST;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: desc.samples.max(1),
        dimension: wgpu::TextureDimension::D2,
        format: color_format(desc.format),
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureSlot { texture, view, desc }
}

fn create_stencil_slot(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    samples: u32,
) -> TextureSlot {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sable stencil renderbuffer"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: samples.max(1),
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Stencil8,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureSlot {
        texture,
        view,
        desc: ImageDesc {
            width,
            height,
            format: PixelFormat::Alpha8,
            samples,
        },
    }
}

fn create_command_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("sable command buffer"),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn write_region(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    region: ImageRegion,
    format: PixelFormat,
    pixels: &[u8],
    row_length: u32,
) {
    // Row length maps directly onto the copy's bytes-per-row.
    let row_pixels = if row_length == 0 { region.width } else { row_length };
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: region.x, y: region.y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(row_pixels * format.bytes_per_pixel()),
            rows_per_image: Some(region.height),
        },
        wgpu::Extent3d {
            width: region.width,
            height: region.height,
            depth_or_array_layers: 1,
        },
    );
}

// ── function table ────────────────────────────────────────────────────────

impl GpuFunctions for WgpuFunctions {
    fn make_current(&mut self) -> bool {
        // wgpu has no thread-current context; the device is usable anywhere.
        true
    }

    fn release_current(&mut self) {}

    fn gen_framebuffers(&mut self, count: usize) -> Vec<NativeId> {
        let ids = self.generate(count);
        for &id in &ids {
            self.framebuffers.insert(id, Attachments::default());
        }
        ids
    }

    fn delete_framebuffers(&mut self, ids: &[NativeId]) {
        for id in ids {
            self.framebuffers.remove(id);
            if self.bound_framebuffer == *id {
                self.bound_framebuffer = 0;
            }
        }
    }

    fn gen_renderbuffers(&mut self, count: usize) -> Vec<NativeId> {
        let ids = self.generate(count);
        for &id in &ids {
            self.renderbuffers.insert(id, None);
        }
        ids
    }

    fn delete_renderbuffers(&mut self, ids: &[NativeId]) {
        for id in ids {
            if let Some(Some(slot)) = self.renderbuffers.remove(id) {
                slot.texture.destroy();
            }
        }
    }

    fn gen_textures(&mut self, count: usize) -> Vec<NativeId> {
        let ids = self.generate(count);
        for &id in &ids {
            self.textures.insert(id, None);
        }
        ids
    }

    fn delete_textures(&mut self, ids: &[NativeId]) {
        for id in ids {
            if let Some(Some(slot)) = self.textures.remove(id) {
                slot.texture.destroy();
            }
            if self.bound_texture.is_some_and(|(t, _)| t == *id) {
                self.bound_texture = None;
            }
        }
    }

    fn tex_image(
        &mut self,
        texture: NativeId,
        desc: ImageDesc,
        pixels: Option<&[u8]>,
        row_length: u32,
    ) {
        let Some(slot) = self.textures.get_mut(&texture) else {
            log::warn!("tex_image on unknown texture {texture}");
            return;
        };

        let new_slot = create_slot(&self.device, desc, "sable texture");
        if let Some(pixels) = pixels.filter(|_| desc.samples <= 1) {
            let region = ImageRegion { x: 0, y: 0, width: desc.width, height: desc.height };
            write_region(&self.queue, &new_slot.texture, region, desc.format, pixels, row_length);
        }
        if let Some(old) = slot.replace(new_slot) {
            old.texture.destroy();
        }
    }

    fn tex_sub_image(
        &mut self,
        texture: NativeId,
        region: ImageRegion,
        format: PixelFormat,
        pixels: &[u8],
        row_length: u32,
    ) {
        let Some(Some(slot)) = self.textures.get(&texture) else {
            log::warn!("tex_sub_image on texture {texture} without storage");
            return;
        };
        if slot.desc.format != format {
            log::warn!(
                "tex_sub_image format {format:?} does not match storage {:?}",
                slot.desc.format
            );
            return;
        }
        write_region(&self.queue, &slot.texture, region, format, pixels, row_length);
        log::trace!("uploaded {}x{} to texture {texture}", region.width, region.height);
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: NativeId,
        width: u32,
        height: u32,
        samples: u32,
    ) {
        let Some(slot) = self.renderbuffers.get_mut(&renderbuffer) else {
            log::warn!("renderbuffer_storage on unknown renderbuffer {renderbuffer}");
            return;
        };
        let new_slot = create_stencil_slot(&self.device, width, height, samples);
        if let Some(old) = slot.replace(new_slot) {
            old.texture.destroy();
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: NativeId) {
        self.bound_framebuffer = framebuffer;
    }

    fn framebuffer_attach(&mut self, framebuffer: NativeId, texture: NativeId, stencil: NativeId) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.color = texture;
            fb.stencil = stencil;
        }
    }

    fn check_framebuffer_status(&mut self, framebuffer: NativeId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Incomplete;
        };
        let Some(Some(color)) = self.textures.get(&fb.color) else {
            return FramebufferStatus::Incomplete;
        };
        if fb.stencil != 0 {
            let Some(Some(stencil)) = self.renderbuffers.get(&fb.stencil) else {
                return FramebufferStatus::Incomplete;
            };
            if stencil.desc.width != color.desc.width
                || stencil.desc.height != color.desc.height
                || stencil.desc.samples != color.desc.samples
            {
                return FramebufferStatus::Incomplete;
            }
        }
        FramebufferStatus::Complete
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn clear(&mut self) {
        let Some((color, stencil)) = self.target_views() else {
            log::trace!("clear without an offscreen target; ignored");
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sable clear encoder"),
            });
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sable clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: stencil.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: None,
                        stencil_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(0),
                            store: wgpu::StoreOp::Store,
                        }),
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn bind_texture(&mut self, _unit: u32, texture: NativeId, sampler: SamplerParams) {
        // Only unit 0 is wired into the program layout.
        self.bound_texture = (texture != 0).then_some((texture, sampler));
    }

    fn use_program(&mut self, program: Program, flags: RenderFlags) {
        self.program = Some((program, flags));
    }

    fn upload_commands(&mut self, words: &[[f32; 4]]) {
        if words.is_empty() {
            return;
        }
        let required = words.len() as u64 * COMMAND_WORD_SIZE;
        if required > self.commands_capacity {
            let new_capacity = required.next_power_of_two();
            self.commands.destroy();
            self.commands = create_command_buffer(&self.device, new_capacity);
            self.commands_capacity = new_capacity;
        }
        self.queue
            .write_buffer(&self.commands, 0, bytemuck::cast_slice(words));
    }

    fn draw_indexed(&mut self, vertices: &[Vertex], indices: IndexData<'_>) {
        if vertices.is_empty() || indices.is_empty() {
            return;
        }
        let Some((program, _flags)) = self.program else {
            log::warn!("draw_indexed without a program; dropped");
            return;
        };

        let sampler_params = self.bound_texture.map(|(_, s)| s).unwrap_or_default();
        self.sampler(sampler_params);

        let Some(pipeline) = self.pipelines.get(&program) else {
            log::warn!("no pipeline registered for {program:?}; draw dropped");
            return;
        };
        let Some((color, stencil)) = self.target_views() else {
            log::trace!("draw without an offscreen target; dropped");
            return;
        };
        let Some(sampler) = self.samplers.get(&sampler_params) else { return };

        let texture_view = self
            .bound_texture
            .and_then(|(id, _)| self.textures.get(&id))
            .and_then(|slot| slot.as_ref())
            .filter(|slot| slot.desc.samples <= 1)
            .map_or(&self.placeholder.view, |slot| &slot.view);

        let vbo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sable draw vbo"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // wgpu has no 8-bit index format.
        let widened: Vec<u16>;
        let (index_bytes, index_format): (&[u8], wgpu::IndexFormat) = match indices {
            IndexData::U8(i) => {
                widened = i.iter().map(|&v| u16::from(v)).collect();
                (bytemuck::cast_slice(&widened), wgpu::IndexFormat::Uint16)
            }
            IndexData::U16(i) => (bytemuck::cast_slice(i), wgpu::IndexFormat::Uint16),
            IndexData::U32(i) => (bytemuck::cast_slice(i), wgpu::IndexFormat::Uint32),
        };
        let ibo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sable draw ibo"),
            contents: index_bytes,
            usage: wgpu::BufferUsages::INDEX,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sable draw bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.commands.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sable draw encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sable draw pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: stencil.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: None,
                        stencil_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let (w, h) = self.viewport;
            if w > 0 && h > 0 {
                rpass.set_viewport(0.0, 0.0, w as f32, h as f32, 0.0, 1.0);
            }
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_vertex_buffer(0, vbo.slice(..));
            rpass.set_index_buffer(ibo.slice(..), index_format);
            rpass.draw_indexed(0..indices.len() as u32, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("{program:?}: {} indices over {} vertices", indices.len(), vertices.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_backend() -> Option<WgpuFunctions> {
        let init = WgpuInit {
            force_fallback_adapter: true,
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..WgpuInit::default()
        };
        match WgpuFunctions::new_headless(init) {
            Ok(backend) => Some(backend),
            Err(err) => {
                log::warn!("skipping wgpu backend test: {err:#}");
                None
            }
        }
    }

    const SOLID_WGSL: &str = r#"
struct VsIn {
    @location(0) pos: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) cmd: u32,
};

@vertex
fn vs_main(v: VsIn) -> @builtin(position) vec4<f32> {
    return vec4<f32>(v.pos, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

    fn solid_pipeline(gl: &WgpuFunctions) -> wgpu::RenderPipeline {
        let device = gl.device();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sable test shader"),
            source: wgpu::ShaderSource::Wgsl(SOLID_WGSL.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sable test pipeline layout"),
            bind_group_layouts: &[gl.program_layout()],
            immediate_size: 0,
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sable test pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    // ── storage ───────────────────────────────────────────────────────────

    #[test]
    fn texture_names_map_to_storage() {
        let Some(mut gl) = fallback_backend() else { return };

        let ids = gl.gen_textures(2);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let desc = ImageDesc { width: 4, height: 2, format: PixelFormat::Alpha8, samples: 1 };
        gl.tex_image(ids[0], desc, Some(&[0u8; 8]), 0);
        assert!(matches!(gl.textures.get(&ids[0]), Some(Some(_))));
        assert!(matches!(gl.textures.get(&ids[1]), Some(None)));

        gl.delete_textures(&ids);
        assert!(gl.textures.is_empty());
    }

    #[test]
    fn framebuffer_completeness_tracks_attachments() {
        let Some(mut gl) = fallback_backend() else { return };

        let fb = gl.gen_framebuffers(1)[0];
        let tex = gl.gen_textures(1)[0];
        let rb = gl.gen_renderbuffers(1)[0];
        gl.framebuffer_attach(fb, tex, rb);
        assert_eq!(gl.check_framebuffer_status(fb), FramebufferStatus::Incomplete);

        let desc = ImageDesc { width: 16, height: 16, format: PixelFormat::Rgba32, samples: 1 };
        gl.tex_image(tex, desc, None, 0);
        gl.renderbuffer_storage(rb, 16, 16, 1);
        assert_eq!(gl.check_framebuffer_status(fb), FramebufferStatus::Complete);

        gl.bind_framebuffer(fb);
        gl.viewport(16, 16);
        gl.clear();
    }

    // ── draws ─────────────────────────────────────────────────────────────

    #[test]
    fn registered_pipeline_draws_into_bound_target() {
        let Some(mut gl) = fallback_backend() else { return };
        let pipeline = solid_pipeline(&gl);
        gl.register_program(Program::Geometry, pipeline);

        let fb = gl.gen_framebuffers(1)[0];
        let tex = gl.gen_textures(1)[0];
        let desc = ImageDesc { width: 8, height: 8, format: PixelFormat::Rgba32, samples: 1 };
        gl.tex_image(tex, desc, None, 0);
        gl.framebuffer_attach(fb, tex, 0);
        assert_eq!(gl.check_framebuffer_status(fb), FramebufferStatus::Complete);

        let scope = gl.device().push_error_scope(wgpu::ErrorFilter::Validation);
        gl.bind_framebuffer(fb);
        gl.viewport(8, 8);
        gl.clear();
        gl.use_program(Program::Geometry, RenderFlags::empty());
        gl.upload_commands(&[[1.0, 0.0, 0.0, 1.0]]);
        let vertices = [
            Vertex::new(0, -1.0, -1.0),
            Vertex::new(0, 3.0, -1.0),
            Vertex::new(0, -1.0, 3.0),
        ];
        gl.draw_indexed(&vertices, IndexData::U8(&[0, 1, 2]));
        gl.draw_indexed(&vertices, IndexData::U32(&[2, 1, 0]));

        let error = pollster::block_on(scope.pop());
        assert!(error.is_none(), "draw raised a validation error: {error:?}");
    }

    #[test]
    fn draw_without_pipeline_is_dropped() {
        let Some(mut gl) = fallback_backend() else { return };

        gl.use_program(Program::Geometry, RenderFlags::empty());
        let vertices = [Vertex::new(0, 0.0, 0.0); 3];
        gl.draw_indexed(&vertices, IndexData::U8(&[0, 1, 2]));
        gl.upload_commands(&[[0.0; 4]; 100]);
        assert!(gl.commands_capacity >= 100 * COMMAND_WORD_SIZE);
    }
}
