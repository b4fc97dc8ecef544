use std::collections::HashMap;
use std::hash::Hash;

use fontdue::layout::GlyphRasterConfig;
use fontdue::Font;

use crate::error::GpuResult;
use crate::texture::Texture;

use super::atlas::{AtlasRect, TextAllocator};

/// A coverage bitmap ready for the atlas, plus its placement metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    /// Offset of the bitmap's left edge from the pen position.
    pub xmin: i32,
    /// Offset of the bitmap's bottom edge from the baseline.
    pub ymin: i32,
    pub advance: f32,
    /// One byte per texel, tightly packed.
    pub coverage: Vec<u8>,
}

/// Rasterizes one glyph with `font` at the size and index in `key`.
pub fn rasterize_glyph(font: &Font, key: GlyphRasterConfig) -> GlyphBitmap {
    let (metrics, coverage) = font.rasterize_config(key);
    GlyphBitmap {
        width: metrics.width as u32,
        height: metrics.height as u32,
        xmin: metrics.xmin,
        ymin: metrics.ymin,
        advance: metrics.advance_width,
        coverage,
    }
}

/// A glyph as stored in the cache.
///
/// Blank glyphs (spaces) keep their metrics but have no page.
#[derive(Debug, Clone)]
pub struct CachedGlyph {
    pub page: Option<Texture>,
    pub rect: AtlasRect,
    pub xmin: i32,
    pub ymin: i32,
    pub advance: f32,
}

/// Rasterize-once glyph store on top of a [`TextAllocator`].
///
/// Keys are usually [`GlyphRasterConfig`], which already identifies font,
/// glyph and pixel size.
#[derive(Debug)]
pub struct GlyphCache<K> {
    atlas: TextAllocator,
    glyphs: HashMap<K, CachedGlyph>,
}

impl<K: Hash + Eq> GlyphCache<K> {
    pub fn new(atlas: TextAllocator) -> Self {
        Self {
            atlas,
            glyphs: HashMap::new(),
        }
    }

    pub fn atlas(&self) -> &TextAllocator {
        &self.atlas
    }

    pub fn get(&self, key: &K) -> Option<&CachedGlyph> {
        self.glyphs.get(key)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Returns the cached glyph for `key`, rasterizing and uploading it on
    /// first request. `rasterize` runs at most once per key; a failed
    /// placement is not cached.
    pub fn get_or_insert_with(
        &mut self,
        key: K,
        rasterize: impl FnOnce() -> GlyphBitmap,
    ) -> GpuResult<&CachedGlyph> {
        use std::collections::hash_map::Entry;

        match self.glyphs.entry(key) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let bitmap = rasterize();
                let (page, rect) = if bitmap.width == 0 || bitmap.height == 0 {
                    (None, AtlasRect::default())
                } else {
                    let (page, rect) =
                        self.atlas.allocate(&bitmap.coverage, bitmap.width, bitmap.height, 0)?;
                    (Some(page), rect)
                };
                log::trace!("glyph cached: {}×{} at {rect:?}", bitmap.width, bitmap.height);
                Ok(slot.insert(CachedGlyph {
                    page,
                    rect,
                    xmin: bitmap.xmin,
                    ymin: bitmap.ymin,
                    advance: bitmap.advance,
                }))
            }
        }
    }

    /// Forgets every glyph and every atlas page.
    pub fn clear(&mut self) {
        self.glyphs.clear();
        self.atlas.clear();
    }
}
