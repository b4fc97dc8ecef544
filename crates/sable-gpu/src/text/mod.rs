//! Glyph atlas packing and the glyph cache on top of it.

mod atlas;
mod glyph_cache;

pub use atlas::{AtlasConfig, AtlasRect, TextAllocator, ATLAS_SIZE};
pub use glyph_cache::{rasterize_glyph, CachedGlyph, GlyphBitmap, GlyphCache};
