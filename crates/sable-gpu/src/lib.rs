//! Sable GPU core.
//!
//! This crate owns the draw batching and GPU resource lifecycle pieces that sit
//! underneath the 2D drawing surface: the batch builder, the draw-record pool,
//! the context abstraction, textures, and the glyph atlas allocator.

pub mod batch;
pub mod context;
pub mod device;
pub mod error;
pub mod logging;
mod sync;
pub mod text;
pub mod texture;

pub use batch::{
    Allocator, AllocatorConfig, Batch, BatchConfig, CommandBuffer, Header, Program, RenderFlags,
    Vertex,
};
pub use context::{
    Context, ContextFactory, ContextParam, ResourceCounts, ResourceKind, WeakContext,
};
pub use device::{GpuFunctions, NativeId, PixelFormat};
pub use error::{GpuError, GpuResult};
pub use logging::{init_logging, LoggingConfig};
pub use text::{AtlasConfig, AtlasRect, GlyphCache, TextAllocator};
pub use texture::Texture;
