use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::batch::Vertex;
use crate::sync::lock;

use super::functions::{
    FramebufferStatus, GpuFunctions, ImageDesc, ImageRegion, IndexData, NativeId, PixelFormat,
    Program, RenderFlags, SamplerParams,
};

/// One recorded entry point invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MakeCurrent,
    ReleaseCurrent,
    GenFramebuffers(Vec<NativeId>),
    DeleteFramebuffers(Vec<NativeId>),
    GenRenderbuffers(Vec<NativeId>),
    DeleteRenderbuffers(Vec<NativeId>),
    GenTextures(Vec<NativeId>),
    DeleteTextures(Vec<NativeId>),
    TexImage {
        texture: NativeId,
        desc: ImageDesc,
        has_pixels: bool,
        row_length: u32,
    },
    TexSubImage {
        texture: NativeId,
        region: ImageRegion,
        format: PixelFormat,
        row_length: u32,
    },
    RenderbufferStorage {
        renderbuffer: NativeId,
        width: u32,
        height: u32,
        samples: u32,
    },
    BindFramebuffer(NativeId),
    FramebufferAttach {
        framebuffer: NativeId,
        texture: NativeId,
        stencil: NativeId,
    },
    CheckFramebufferStatus(NativeId),
    Viewport(u32, u32),
    Clear,
    BindTexture {
        unit: u32,
        texture: NativeId,
        sampler: SamplerParams,
    },
    UseProgram(Program, RenderFlags),
    UploadCommands(usize),
    DrawIndexed {
        vertices: usize,
        indices: usize,
        index_bits: u32,
    },
}

#[derive(Debug, Default)]
struct Attachments {
    texture: NativeId,
    stencil: NativeId,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: NativeId,
    calls: Vec<Call>,

    textures: HashMap<NativeId, Option<ImageDesc>>,
    renderbuffers: HashMap<NativeId, Option<(u32, u32, u32)>>,
    framebuffers: HashMap<NativeId, Attachments>,

    fail_generate: bool,
    fail_make_current: bool,
    force_incomplete: bool,
}

impl HeadlessState {
    fn generate(&mut self, count: usize) -> Vec<NativeId> {
        if self.fail_generate {
            return Vec::new();
        }
        (0..count)
            .map(|_| {
                self.next_id += 1;
                self.next_id
            })
            .collect()
    }
}

/// CPU-only function table.
///
/// Generates object names, tracks which ones are alive and what storage they
/// have, and records every call. Nothing is rasterized. Used by tests and by
/// tools that need the batching pipeline without a GPU.
pub struct HeadlessFunctions {
    state: Arc<Mutex<HeadlessState>>,
}

/// Observer handle onto a [`HeadlessFunctions`] that has been moved into a context.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessFunctions {
    pub fn new() -> (Self, HeadlessProbe) {
        let state = Arc::new(Mutex::new(HeadlessState::default()));
        (
            Self { state: Arc::clone(&state) },
            HeadlessProbe { state },
        )
    }
}

impl HeadlessProbe {
    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_textures(&self) -> usize {
        lock(&self.state).textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        lock(&self.state).framebuffers.len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        lock(&self.state).renderbuffers.len()
    }

    /// Storage currently defined for `texture`, if any.
    pub fn texture_desc(&self, texture: NativeId) -> Option<ImageDesc> {
        lock(&self.state).textures.get(&texture).copied().flatten()
    }

    /// Makes every subsequent object-generation call return nothing.
    pub fn set_fail_generate(&self, fail: bool) {
        lock(&self.state).fail_generate = fail;
    }

    pub fn set_fail_make_current(&self, fail: bool) {
        lock(&self.state).fail_make_current = fail;
    }

    /// Reports every framebuffer as incomplete.
    pub fn set_force_incomplete(&self, incomplete: bool) {
        lock(&self.state).force_incomplete = incomplete;
    }
}

impl GpuFunctions for HeadlessFunctions {
    fn make_current(&mut self) -> bool {
        let mut s = lock(&self.state);
        s.calls.push(Call::MakeCurrent);
        !s.fail_make_current
    }

    fn release_current(&mut self) {
        lock(&self.state).calls.push(Call::ReleaseCurrent);
    }

    fn gen_framebuffers(&mut self, count: usize) -> Vec<NativeId> {
        let mut s = lock(&self.state);
        let ids = s.generate(count);
        for &id in &ids {
            s.framebuffers.insert(id, Attachments::default());
        }
        s.calls.push(Call::GenFramebuffers(ids.clone()));
        ids
    }

    fn delete_framebuffers(&mut self, ids: &[NativeId]) {
        let mut s = lock(&self.state);
        for id in ids {
            s.framebuffers.remove(id);
        }
        s.calls.push(Call::DeleteFramebuffers(ids.to_vec()));
    }

    fn gen_renderbuffers(&mut self, count: usize) -> Vec<NativeId> {
        let mut s = lock(&self.state);
        let ids = s.generate(count);
        for &id in &ids {
            s.renderbuffers.insert(id, None);
        }
        s.calls.push(Call::GenRenderbuffers(ids.clone()));
        ids
    }

    fn delete_renderbuffers(&mut self, ids: &[NativeId]) {
        let mut s = lock(&self.state);
        for id in ids {
            s.renderbuffers.remove(id);
        }
        s.calls.push(Call::DeleteRenderbuffers(ids.to_vec()));
    }

    fn gen_textures(&mut self, count: usize) -> Vec<NativeId> {
        let mut s = lock(&self.state);
        let ids = s.generate(count);
        for &id in &ids {
            s.textures.insert(id, None);
        }
        s.calls.push(Call::GenTextures(ids.clone()));
        ids
    }

    fn delete_textures(&mut self, ids: &[NativeId]) {
        let mut s = lock(&self.state);
        for id in ids {
            s.textures.remove(id);
        }
        s.calls.push(Call::DeleteTextures(ids.to_vec()));
    }

    fn tex_image(
        &mut self,
        texture: NativeId,
        desc: ImageDesc,
        pixels: Option<&[u8]>,
        row_length: u32,
    ) {
        let mut s = lock(&self.state);
        if let Some(slot) = s.textures.get_mut(&texture) {
            *slot = Some(desc);
        }
        s.calls.push(Call::TexImage {
            texture,
            desc,
            has_pixels: pixels.is_some(),
            row_length,
        });
    }

    fn tex_sub_image(
        &mut self,
        texture: NativeId,
        region: ImageRegion,
        format: PixelFormat,
        _pixels: &[u8],
        row_length: u32,
    ) {
        lock(&self.state).calls.push(Call::TexSubImage {
            texture,
            region,
            format,
            row_length,
        });
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: NativeId,
        width: u32,
        height: u32,
        samples: u32,
    ) {
        let mut s = lock(&self.state);
        if let Some(slot) = s.renderbuffers.get_mut(&renderbuffer) {
            *slot = Some((width, height, samples));
        }
        s.calls.push(Call::RenderbufferStorage {
            renderbuffer,
            width,
            height,
            samples,
        });
    }

    fn bind_framebuffer(&mut self, framebuffer: NativeId) {
        lock(&self.state).calls.push(Call::BindFramebuffer(framebuffer));
    }

    fn framebuffer_attach(&mut self, framebuffer: NativeId, texture: NativeId, stencil: NativeId) {
        let mut s = lock(&self.state);
        if let Some(fb) = s.framebuffers.get_mut(&framebuffer) {
            fb.texture = texture;
            fb.stencil = stencil;
        }
        s.calls.push(Call::FramebufferAttach {
            framebuffer,
            texture,
            stencil,
        });
    }

    fn check_framebuffer_status(&mut self, framebuffer: NativeId) -> FramebufferStatus {
        let mut s = lock(&self.state);
        s.calls.push(Call::CheckFramebufferStatus(framebuffer));
        if s.force_incomplete {
            return FramebufferStatus::Incomplete;
        }

        let Some(fb) = s.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Incomplete;
        };
        let Some(Some(color)) = s.textures.get(&fb.texture) else {
            return FramebufferStatus::Incomplete;
        };
        if fb.stencil != 0 {
            match s.renderbuffers.get(&fb.stencil) {
                Some(Some((w, h, samples)))
                    if *w == color.width && *h == color.height && *samples == color.samples => {}
                _ => return FramebufferStatus::Incomplete,
            }
        }
        FramebufferStatus::Complete
    }

    fn viewport(&mut self, width: u32, height: u32) {
        lock(&self.state).calls.push(Call::Viewport(width, height));
    }

    fn clear(&mut self) {
        lock(&self.state).calls.push(Call::Clear);
    }

    fn bind_texture(&mut self, unit: u32, texture: NativeId, sampler: SamplerParams) {
        lock(&self.state).calls.push(Call::BindTexture {
            unit,
            texture,
            sampler,
        });
    }

    fn use_program(&mut self, program: Program, flags: RenderFlags) {
        lock(&self.state).calls.push(Call::UseProgram(program, flags));
    }

    fn upload_commands(&mut self, words: &[[f32; 4]]) {
        lock(&self.state).calls.push(Call::UploadCommands(words.len()));
    }

    fn draw_indexed(&mut self, vertices: &[Vertex], indices: IndexData<'_>) {
        lock(&self.state).calls.push(Call::DrawIndexed {
            vertices: vertices.len(),
            indices: indices.len(),
            index_bits: indices.bits(),
        });
    }
}
