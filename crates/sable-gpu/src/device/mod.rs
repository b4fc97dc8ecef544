//! GPU function tables.
//!
//! This module defines the boundary to the native driver ([`GpuFunctions`])
//! and the implementations shipped with the crate:
//! - [`HeadlessFunctions`]: CPU-only, records every call
//! - [`WgpuFunctions`]: offscreen rendering through a wgpu device

mod functions;
mod headless;
mod init;
mod offscreen;

pub use functions::{
    FilterMode, FramebufferStatus, GpuFunctions, ImageDesc, ImageRegion, IndexData, NativeId,
    PixelFormat, Program, RenderFlags, SamplerParams, WrapMode,
};
pub use headless::{Call, HeadlessFunctions, HeadlessProbe};
pub use init::WgpuInit;
pub use offscreen::WgpuFunctions;
