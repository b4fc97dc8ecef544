use crate::batch::Vertex;

/// Driver-side object name (texture, framebuffer, renderbuffer).
///
/// Zero is reserved for "no object", matching the convention of the native
/// APIs the function table wraps.
pub type NativeId = u32;

/// Pixel layouts a [`crate::Texture`] can hold.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGBA, straight alpha.
    Rgba32,
    /// Single 8-bit coverage channel (glyph masks).
    Alpha8,
    /// 8-bit RGBA with color already multiplied by alpha.
    PremultipliedRgba32,
}

impl PixelFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Alpha8 => 1,
            PixelFormat::Rgba32 | PixelFormat::PremultipliedRgba32 => 4,
        }
    }
}

/// Storage description for a full image upload.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Multisample factor; 1 for a plain texture.
    pub samples: u32,
}

/// Destination rectangle of a partial upload, in texels.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ImageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FilterMode {
    Linear,
    Nearest,
}

/// Sampling state applied when a texture is bound to a unit.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SamplerParams {
    pub wrap: WrapMode,
    pub filter: FilterMode,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            wrap: WrapMode::ClampToEdge,
            filter: FilterMode::Linear,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete,
}

/// Shader program selected for a draw.
///
/// The programs themselves live with the shaders; the core only needs to tell
/// them apart so compatible draws can merge.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Program {
    /// Solid fills, gradients and clipped geometry.
    Geometry,
    /// Alpha-mask glyph quads sampled from an atlas page.
    Glyph,
    /// RGBA image quads.
    Image,
}

/// Render-state bits carried in a draw header.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct RenderFlags(u32);

impl RenderFlags {
    pub const MULTISAMPLE: RenderFlags = RenderFlags(1 << 0);

    #[inline]
    pub const fn empty() -> Self {
        RenderFlags(0)
    }

    #[inline]
    pub const fn contains(self, other: RenderFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Borrowed index data handed to a draw call, at its stored width.
#[derive(Debug, Copy, Clone)]
pub enum IndexData<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            IndexData::U8(i) => i.len(),
            IndexData::U16(i) => i.len(),
            IndexData::U32(i) => i.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index width in bits.
    #[inline]
    pub fn bits(&self) -> u32 {
        match self {
            IndexData::U8(_) => 8,
            IndexData::U16(_) => 16,
            IndexData::U32(_) => 32,
        }
    }
}

/// The resolved set of native rendering entry points.
///
/// This is the only boundary to the driver. Everything the core does to the
/// GPU goes through one of these calls, always on the thread that owns the
/// context. Object-generation calls return an empty vector when the driver
/// fails to create anything.
///
/// Calls follow direct-state-access style: the object being modified is
/// passed explicitly instead of relying on a bind point, except for the
/// framebuffer targeted by `viewport`/`clear`/`draw_indexed`.
pub trait GpuFunctions: Send {
    /// Makes the native context current on this thread.
    fn make_current(&mut self) -> bool;

    /// Releases the native context from this thread.
    fn release_current(&mut self);

    fn gen_framebuffers(&mut self, count: usize) -> Vec<NativeId>;
    fn delete_framebuffers(&mut self, ids: &[NativeId]);

    fn gen_renderbuffers(&mut self, count: usize) -> Vec<NativeId>;
    fn delete_renderbuffers(&mut self, ids: &[NativeId]);

    fn gen_textures(&mut self, count: usize) -> Vec<NativeId>;
    fn delete_textures(&mut self, ids: &[NativeId]);

    /// (Re)defines the storage of `texture`, optionally filling it.
    ///
    /// `row_length` is the source row length in pixels, 0 meaning tightly
    /// packed; it plays the role of the "unpack row length" pixel-store
    /// parameter.
    fn tex_image(
        &mut self,
        texture: NativeId,
        desc: ImageDesc,
        pixels: Option<&[u8]>,
        row_length: u32,
    );

    /// Uploads a sub-rectangle of `texture`. `row_length` as in [`Self::tex_image`].
    fn tex_sub_image(
        &mut self,
        texture: NativeId,
        region: ImageRegion,
        format: PixelFormat,
        pixels: &[u8],
        row_length: u32,
    );

    /// Allocates stencil storage for `renderbuffer`.
    fn renderbuffer_storage(
        &mut self,
        renderbuffer: NativeId,
        width: u32,
        height: u32,
        samples: u32,
    );

    /// Makes `framebuffer` the draw target; 0 selects the default target.
    fn bind_framebuffer(&mut self, framebuffer: NativeId);

    /// Attaches a color texture and a stencil renderbuffer (0 for none).
    fn framebuffer_attach(&mut self, framebuffer: NativeId, texture: NativeId, stencil: NativeId);

    fn check_framebuffer_status(&mut self, framebuffer: NativeId) -> FramebufferStatus;

    fn viewport(&mut self, width: u32, height: u32);

    /// Clears color and stencil of the bound framebuffer.
    fn clear(&mut self);

    /// Binds `texture` to `unit`; 0 unbinds.
    fn bind_texture(&mut self, unit: u32, texture: NativeId, sampler: SamplerParams);

    fn use_program(&mut self, program: Program, flags: RenderFlags);

    /// Replaces the float4 command side buffer addressed by vertex command indices.
    fn upload_commands(&mut self, words: &[[f32; 4]]);

    /// Issues one indexed triangle-list draw into the bound framebuffer.
    fn draw_indexed(&mut self, vertices: &[Vertex], indices: IndexData<'_>);
}
