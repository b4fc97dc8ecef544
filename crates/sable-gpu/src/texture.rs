//! Reference-counted GPU images.
//!
//! A [`Texture`] wraps one native texture and, when used as a render target,
//! an attached framebuffer plus stencil renderbuffer. All three are allocated
//! lazily through the owning [`Context`] and handed back to its deferred-free
//! queues when the texture is reset or its last handle drops. A texture never
//! deletes native objects itself, so dropping one is safe from any call site.
//!
//! The texture holds only a weak back-reference: it never keeps its context
//! alive. Once the context is gone (or invalid) every operation fails with
//! [`GpuError::BadState`] and the texture has to be recreated.

use std::sync::{Arc, Mutex, PoisonError};

use crate::context::{Context, WeakContext};
use crate::device::{
    FramebufferStatus, ImageDesc, ImageRegion, NativeId, PixelFormat, SamplerParams,
};
use crate::error::{GpuError, GpuResult};
use crate::sync::lock;

/// Capability set a render target was built for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct TargetCaps {
    width: u32,
    height: u32,
    format: PixelFormat,
    samples: u32,
}

#[derive(Debug)]
struct TextureState {
    context: WeakContext,

    texture: NativeId,
    framebuffer: NativeId,
    stencil: NativeId,

    width: u32,
    height: u32,
    format: PixelFormat,
    samples: u32,

    target: Option<TargetCaps>,
    needs_clear: bool,
    bound_unit: Option<u32>,
}

impl TextureState {
    fn context(&self) -> GpuResult<Context> {
        self.context
            .upgrade()
            .filter(Context::is_valid)
            .ok_or(GpuError::BadState)
    }

    fn ensure_texture(&mut self, ctx: &Context) -> GpuResult<NativeId> {
        if self.texture == 0 {
            self.texture = ctx.alloc_texture()?;
        }
        Ok(self.texture)
    }

    fn reset(&mut self) {
        if let Some(ctx) = self.context.upgrade() {
            ctx.free_texture(self.texture);
            ctx.free_framebuffer(self.framebuffer);
            ctx.free_renderbuffer(self.stencil);
        }
        self.context = WeakContext::default();
        self.texture = 0;
        self.framebuffer = 0;
        self.stencil = 0;
        self.width = 0;
        self.height = 0;
        self.samples = 1;
        self.target = None;
        self.needs_clear = false;
        self.bound_unit = None;
    }
}

struct TextureInner {
    state: Mutex<TextureState>,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

/// Counted handle to a GPU image. `clone()` takes a reference.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = lock(&self.inner.state);
        f.debug_struct("Texture")
            .field("id", &s.texture)
            .field("size", &(s.width, s.height))
            .field("format", &s.format)
            .field("samples", &s.samples)
            .finish_non_exhaustive()
    }
}

/// Number of source pixels per row, or `BadState` if `stride` is not a whole
/// number of pixels at least `width` long. A zero stride means tightly packed.
pub(crate) fn row_pixels(stride: u32, width: u32, format: PixelFormat) -> GpuResult<u32> {
    let bpp = format.bytes_per_pixel();
    if stride == 0 {
        return Ok(width);
    }
    if stride % bpp != 0 || stride / bpp < width {
        return Err(GpuError::BadState);
    }
    Ok(stride / bpp)
}

pub(crate) fn check_pixels(
    pixels: &[u8],
    row_pixels: u32,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> GpuResult<()> {
    let bpp = format.bytes_per_pixel() as usize;
    let required = (row_pixels as usize * bpp) * (height as usize - 1) + width as usize * bpp;
    if pixels.len() < required {
        return Err(GpuError::BadState);
    }
    Ok(())
}

impl Texture {
    /// Creates an empty texture. No native object exists until first use.
    pub fn new(context: &Context) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                state: Mutex::new(TextureState {
                    context: context.downgrade(),
                    texture: 0,
                    framebuffer: 0,
                    stencil: 0,
                    width: 0,
                    height: 0,
                    format: PixelFormat::Rgba32,
                    samples: 1,
                    target: None,
                    needs_clear: false,
                    bound_unit: None,
                }),
            }),
        }
    }

    // ── uploads ───────────────────────────────────────────────────────────

    /// Defines the full image, optionally filling it from `pixels`.
    ///
    /// `stride` is the source row pitch in bytes (0 for tightly packed). A
    /// pitch wider than the image is passed to the driver as the unpack row
    /// length; the data is never repacked.
    pub fn set_image(
        &self,
        pixels: Option<&[u8]>,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Err(GpuError::BadState);
        }
        let row = row_pixels(stride, width, format)?;
        if let Some(pixels) = pixels {
            check_pixels(pixels, row, width, height, format)?;
        }

        let mut s = lock(&self.inner.state);
        if s.samples > 1 {
            return Err(GpuError::BadState);
        }
        let ctx = s.context()?;
        let id = s.ensure_texture(&ctx)?;

        let desc = ImageDesc { width, height, format, samples: 1 };
        let row_length = if row == width { 0 } else { row };
        ctx.with_functions(|gl| gl.tex_image(id, desc, pixels, row_length))?;

        s.width = width;
        s.height = height;
        s.format = format;
        s.target = None;
        Ok(())
    }

    /// Uploads a sub-rectangle in the texture's current format.
    pub fn set_subimage(
        &self,
        pixels: &[u8],
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        stride: u32,
    ) -> GpuResult<()> {
        let s = lock(&self.inner.state);
        if s.texture == 0 || s.samples > 1 || width == 0 || height == 0 {
            return Err(GpuError::BadState);
        }
        let fits_x = x.checked_add(width).is_some_and(|r| r <= s.width);
        let fits_y = y.checked_add(height).is_some_and(|b| b <= s.height);
        if !fits_x || !fits_y {
            return Err(GpuError::BadState);
        }

        let row = row_pixels(stride, width, s.format)?;
        check_pixels(pixels, row, width, height, s.format)?;

        let ctx = s.context()?;
        let region = ImageRegion { x, y, width, height };
        let row_length = if row == width { 0 } else { row };
        let (id, format) = (s.texture, s.format);
        ctx.with_functions(|gl| gl.tex_sub_image(id, region, format, pixels, row_length))
    }

    /// Reallocates storage when the size changed. Multisample targets are
    /// left alone; they are rebuilt by [`Self::begin_draw`]. A resized render
    /// target is rebuilt and cleared by its next [`Self::begin_draw`].
    pub fn resize(&self, width: u32, height: u32) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Err(GpuError::BadState);
        }
        let mut s = lock(&self.inner.state);
        if s.texture == 0 {
            return Err(GpuError::BadState);
        }
        if s.samples > 1 || (s.width == width && s.height == height) {
            return Ok(());
        }

        let ctx = s.context()?;
        let desc = ImageDesc { width, height, format: s.format, samples: 1 };
        let id = s.texture;
        ctx.with_functions(|gl| gl.tex_image(id, desc, None, 0))?;

        s.width = width;
        s.height = height;
        // The stencil attachment still has the old size.
        s.target = None;
        Ok(())
    }

    // ── render target ─────────────────────────────────────────────────────

    /// Binds this texture as the draw target.
    ///
    /// The framebuffer, stencil renderbuffer and color storage are created on
    /// first use and rebuilt whenever size, format or sample count changes.
    /// A freshly built target is cleared once; reuse keeps its contents.
    pub fn begin_draw(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        samples: u32,
    ) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Err(GpuError::BadState);
        }
        let caps = TargetCaps { width, height, format, samples: samples.max(1) };

        let mut s = lock(&self.inner.state);
        let ctx = s.context()?;

        if s.framebuffer == 0 {
            s.framebuffer = ctx.alloc_framebuffer()?;
        }
        if s.stencil == 0 {
            s.stencil = ctx.alloc_renderbuffer()?;
        }
        let texture = s.ensure_texture(&ctx)?;
        let (framebuffer, stencil) = (s.framebuffer, s.stencil);

        if s.target != Some(caps) {
            let desc = ImageDesc { width, height, format, samples: caps.samples };
            let status = ctx.with_functions(|gl| {
                gl.tex_image(texture, desc, None, 0);
                gl.renderbuffer_storage(stencil, width, height, caps.samples);
                gl.framebuffer_attach(framebuffer, texture, stencil);
                gl.check_framebuffer_status(framebuffer)
            })?;

            s.width = width;
            s.height = height;
            s.format = format;
            s.samples = caps.samples;

            if status != FramebufferStatus::Complete {
                log::warn!("render target {width}x{height} x{} is incomplete", caps.samples);
                s.target = None;
                return Err(GpuError::UnknownErr);
            }
            s.target = Some(caps);
            s.needs_clear = true;
        }

        let clear = s.needs_clear;
        ctx.with_functions(|gl| {
            gl.bind_framebuffer(framebuffer);
            gl.viewport(width, height);
            if clear {
                gl.clear();
            }
        })?;
        s.needs_clear = false;
        Ok(())
    }

    /// Restores the default draw target.
    pub fn end_draw(&self) -> GpuResult<()> {
        let s = lock(&self.inner.state);
        if s.framebuffer == 0 {
            return Err(GpuError::BadState);
        }
        s.context()?.with_functions(|gl| gl.bind_framebuffer(0))
    }

    // ── sampling ──────────────────────────────────────────────────────────

    /// Binds the texture to `unit` with clamp-to-edge, linear filtering.
    pub fn activate(&self, unit: u32) -> GpuResult<()> {
        let mut s = lock(&self.inner.state);
        if s.texture == 0 {
            return Err(GpuError::BadState);
        }
        let id = s.texture;
        s.context()?
            .with_functions(|gl| gl.bind_texture(unit, id, SamplerParams::default()))?;
        s.bound_unit = Some(unit);
        Ok(())
    }

    /// Unbinds the unit set by the last [`Self::activate`].
    pub fn deactivate(&self) -> GpuResult<()> {
        let mut s = lock(&self.inner.state);
        let Some(unit) = s.bound_unit.take() else {
            return Ok(());
        };
        s.context()?
            .with_functions(|gl| gl.bind_texture(unit, 0, SamplerParams::default()))
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    /// Hands every native object to the context's deferred-free queues and
    /// forgets the context. The handle stays usable only as an empty shell.
    pub fn reset(&self) {
        lock(&self.inner.state).reset();
    }

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The owning context, if it is still alive.
    pub fn context(&self) -> Option<Context> {
        lock(&self.inner.state).context.upgrade()
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn width(&self) -> u32 {
        lock(&self.inner.state).width
    }

    pub fn height(&self) -> u32 {
        lock(&self.inner.state).height
    }

    pub fn format(&self) -> PixelFormat {
        lock(&self.inner.state).format
    }

    pub fn samples(&self) -> u32 {
        lock(&self.inner.state).samples
    }

    /// Native texture name; 0 before first upload.
    pub fn native_id(&self) -> NativeId {
        lock(&self.inner.state).texture
    }

    /// Native framebuffer name; 0 until used as a render target.
    pub fn framebuffer_id(&self) -> NativeId {
        lock(&self.inner.state).framebuffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResourceKind;
    use crate::device::{Call, HeadlessFunctions, HeadlessProbe};

    fn headless() -> (Context, HeadlessProbe) {
        let (gl, probe) = HeadlessFunctions::new();
        (Context::new(Box::new(gl)), probe)
    }

    fn any_delete(c: &Call) -> bool {
        matches!(
            c,
            Call::DeleteTextures(_) | Call::DeleteFramebuffers(_) | Call::DeleteRenderbuffers(_)
        )
    }

    // ── uploads ───────────────────────────────────────────────────────────

    #[test]
    fn set_image_allocates_lazily() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        assert_eq!(tex.native_id(), 0);
        assert_eq!(ctx.registered().textures, 0);

        tex.set_image(Some(&[0u8; 16]), 2, 2, 0, PixelFormat::Rgba32).unwrap();
        let id = tex.native_id();
        assert_ne!(id, 0);
        assert_eq!((tex.width(), tex.height()), (2, 2));
        assert_eq!(ctx.registered_ids(ResourceKind::Texture), vec![id]);

        tex.set_image(None, 4, 4, 0, PixelFormat::Alpha8).unwrap();
        assert_eq!(tex.native_id(), id);
        assert_eq!(probe.count(|c| matches!(c, Call::GenTextures(_))), 1);
        assert_eq!(probe.texture_desc(id).map(|d| d.format), Some(PixelFormat::Alpha8));
    }

    #[test]
    fn wide_stride_becomes_unpack_row_length() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);

        // 3 pixels wide, rows padded to 8 pixels.
        tex.set_image(Some(&[0u8; 8 * 4 * 2]), 3, 2, 32, PixelFormat::Rgba32).unwrap();
        tex.set_subimage(&[0u8; 8 * 4 * 2], 0, 0, 3, 2, 32).unwrap();
        tex.set_subimage(&[0u8; 2 * 4], 1, 1, 2, 1, 0).unwrap();

        let row_lengths: Vec<u32> = probe
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::TexImage { row_length, .. } | Call::TexSubImage { row_length, .. } => {
                    Some(row_length)
                }
                _ => None,
            })
            .collect();
        assert_eq!(row_lengths, vec![8, 8, 0]);
    }

    #[test]
    fn malformed_uploads_are_rejected() {
        let (ctx, _probe) = headless();
        let tex = Texture::new(&ctx);

        assert_eq!(tex.set_subimage(&[0u8; 4], 0, 0, 1, 1, 0), Err(GpuError::BadState));
        assert_eq!(tex.set_image(None, 0, 4, 0, PixelFormat::Rgba32), Err(GpuError::BadState));
        assert_eq!(
            tex.set_image(Some(&[0u8; 3]), 1, 1, 0, PixelFormat::Rgba32),
            Err(GpuError::BadState)
        );
        assert_eq!(tex.set_image(None, 4, 1, 6, PixelFormat::Rgba32), Err(GpuError::BadState));

        tex.set_image(None, 4, 4, 0, PixelFormat::Alpha8).unwrap();
        assert_eq!(tex.set_subimage(&[0u8; 4], 3, 3, 2, 2, 0), Err(GpuError::BadState));
    }

    #[test]
    fn resize_only_reallocates_on_change() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        assert_eq!(tex.resize(4, 4), Err(GpuError::BadState));

        tex.set_image(None, 4, 4, 0, PixelFormat::Rgba32).unwrap();
        probe.clear_calls();

        tex.resize(4, 4).unwrap();
        assert_eq!(probe.count(|c| matches!(c, Call::TexImage { .. })), 0);

        tex.resize(8, 2).unwrap();
        assert_eq!(probe.count(|c| matches!(c, Call::TexImage { .. })), 1);
        assert_eq!((tex.width(), tex.height()), (8, 2));
    }

    #[test]
    fn resized_render_target_is_rebuilt_on_next_draw() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        tex.begin_draw(16, 16, PixelFormat::Rgba32, 1).unwrap();
        tex.end_draw().unwrap();
        tex.resize(8, 8).unwrap();
        probe.clear_calls();

        tex.begin_draw(16, 16, PixelFormat::Rgba32, 1).unwrap();
        assert_eq!((tex.width(), tex.height()), (16, 16));
        assert_eq!(probe.texture_desc(tex.native_id()).map(|d| d.width), Some(16));
        assert_eq!(probe.count(|c| matches!(c, Call::RenderbufferStorage { .. })), 1);
        assert_eq!(probe.count(|c| matches!(c, Call::CheckFramebufferStatus(_))), 1);
        assert_eq!(probe.count(|c| *c == Call::Clear), 1);
    }

    #[test]
    fn resize_leaves_multisample_targets_alone() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        tex.begin_draw(16, 16, PixelFormat::PremultipliedRgba32, 4).unwrap();
        probe.clear_calls();

        tex.resize(32, 32).unwrap();
        assert!(probe.calls().is_empty());
        assert_eq!(tex.width(), 16);
    }

    // ── render target ─────────────────────────────────────────────────────

    #[test]
    fn begin_draw_builds_target_once_and_clears_once() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);

        tex.begin_draw(64, 32, PixelFormat::PremultipliedRgba32, 1).unwrap();
        tex.end_draw().unwrap();
        tex.begin_draw(64, 32, PixelFormat::PremultipliedRgba32, 1).unwrap();
        tex.end_draw().unwrap();

        assert_eq!(ctx.registered(), crate::context::ResourceCounts {
            framebuffers: 1,
            renderbuffers: 1,
            textures: 1,
        });
        assert_eq!(probe.count(|c| *c == Call::Clear), 1);
        assert_eq!(probe.count(|c| matches!(c, Call::CheckFramebufferStatus(_))), 1);
        assert_eq!(probe.count(|c| *c == Call::BindFramebuffer(0)), 2);
    }

    #[test]
    fn capability_change_rebuilds_without_new_objects() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);

        tex.begin_draw(64, 64, PixelFormat::Rgba32, 1).unwrap();
        let fb = tex.framebuffer_id();
        tex.begin_draw(64, 64, PixelFormat::Rgba32, 4).unwrap();
        tex.begin_draw(128, 64, PixelFormat::Rgba32, 4).unwrap();

        assert_eq!(tex.framebuffer_id(), fb);
        assert_eq!(tex.samples(), 4);
        assert_eq!(probe.count(|c| matches!(c, Call::GenFramebuffers(_))), 1);
        assert_eq!(probe.count(|c| matches!(c, Call::RenderbufferStorage { .. })), 3);
        assert_eq!(probe.count(|c| *c == Call::Clear), 3);
    }

    #[test]
    fn incomplete_target_reports_unknown_error() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        probe.set_force_incomplete(true);
        assert_eq!(
            tex.begin_draw(8, 8, PixelFormat::Rgba32, 1),
            Err(GpuError::UnknownErr)
        );
        assert_eq!(probe.count(|c| *c == Call::Clear), 0);

        probe.set_force_incomplete(false);
        tex.begin_draw(8, 8, PixelFormat::Rgba32, 1).unwrap();
        assert_eq!(probe.count(|c| *c == Call::Clear), 1);
    }

    // ── sampling ──────────────────────────────────────────────────────────

    #[test]
    fn activate_binds_and_deactivate_unbinds() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        assert_eq!(tex.activate(0), Err(GpuError::BadState));

        tex.set_image(None, 1, 1, 0, PixelFormat::Rgba32).unwrap();
        let id = tex.native_id();
        tex.activate(2).unwrap();
        tex.deactivate().unwrap();

        let binds: Vec<_> = probe
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::BindTexture { .. }))
            .collect();
        assert_eq!(binds, vec![
            Call::BindTexture { unit: 2, texture: id, sampler: SamplerParams::default() },
            Call::BindTexture { unit: 2, texture: 0, sampler: SamplerParams::default() },
        ]);
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    #[test]
    fn last_reference_defers_deletion_to_context() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        tex.begin_draw(8, 8, PixelFormat::Rgba32, 1).unwrap();
        let copy = tex.clone();
        assert_eq!(tex.reference_count(), 2);

        drop(tex);
        assert_eq!(ctx.pending().total(), 0);

        drop(copy);
        assert_eq!(probe.count(any_delete), 0);
        assert_eq!(ctx.pending(), crate::context::ResourceCounts {
            framebuffers: 1,
            renderbuffers: 1,
            textures: 1,
        });

        ctx.perform_gc();
        assert_eq!(probe.count(any_delete), 3);
        assert_eq!(ctx.registered().total(), 0);
    }

    #[test]
    fn reset_forgets_the_context() {
        let (ctx, _probe) = headless();
        let tex = Texture::new(&ctx);
        tex.set_image(None, 2, 2, 0, PixelFormat::Rgba32).unwrap();
        tex.reset();

        assert!(tex.context().is_none());
        assert_eq!(tex.native_id(), 0);
        assert_eq!(ctx.pending().textures, 1);
        assert_eq!(tex.set_image(None, 2, 2, 0, PixelFormat::Rgba32), Err(GpuError::BadState));
    }

    #[test]
    fn texture_does_not_keep_context_alive() {
        let (ctx, probe) = headless();
        let tex = Texture::new(&ctx);
        tex.set_image(None, 2, 2, 0, PixelFormat::Rgba32).unwrap();

        drop(ctx);
        assert_eq!(probe.live_textures(), 0);
        assert_eq!(tex.activate(0), Err(GpuError::BadState));
        drop(tex);
    }

    #[test]
    fn invalid_context_blocks_uploads() {
        let (ctx, _probe) = headless();
        let tex = Texture::new(&ctx);
        ctx.invalidate();
        assert_eq!(tex.set_image(None, 2, 2, 0, PixelFormat::Rgba32), Err(GpuError::BadState));
    }
}
