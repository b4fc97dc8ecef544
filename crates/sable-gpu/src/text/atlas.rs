use crate::context::Context;
use crate::device::PixelFormat;
use crate::error::{GpuError, GpuResult};
use crate::texture::{check_pixels, row_pixels, Texture};

// ── atlas constants ────────────────────────────────────────────────────────

/// Edge length of one square atlas page.
pub const ATLAS_SIZE: u32 = 1024;
const GLYPH_PADDING: u32 = 1; // pixels between glyphs in the atlas

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasConfig {
    /// Edge length of each square page.
    pub size: u32,
    /// Empty pixels kept around every glyph.
    pub padding: u32,
    pub format: PixelFormat,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            size: ATLAS_SIZE,
            padding: GLYPH_PADDING,
            format: PixelFormat::Alpha8,
        }
    }
}

/// Where a bitmap landed inside its page, in texels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    /// Normalized `(uv_min, uv_max)` on a page of edge `page_size`.
    pub fn uv(&self, page_size: u32) -> ([f32; 2], [f32; 2]) {
        let s = page_size as f32;
        (
            [self.x as f32 / s, self.y as f32 / s],
            [(self.x + self.width) as f32 / s, (self.y + self.height) as f32 / s],
        )
    }
}

// ── rows ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Row {
    page: usize,
    top: u32,
    /// Horizontal cursor: next free x, padding included.
    used: u32,
    height: u32,
}

/// Shelf packer for glyph bitmaps.
///
/// Bitmaps go into rows of exactly their own height. Rows are kept sorted by
/// height so the candidates for a bitmap are one contiguous run found by
/// binary search. When no row of that height has room a new row opens below
/// the last one on the current page; when the page is full a new page
/// texture starts.
#[derive(Debug)]
pub struct TextAllocator {
    context: Context,
    config: AtlasConfig,
    pages: Vec<Texture>,
    rows: Vec<Row>,
    /// Top of the next row on the newest page.
    cursor: u32,
}

impl TextAllocator {
    pub fn new(context: &Context, config: AtlasConfig) -> Self {
        Self {
            context: context.clone(),
            config,
            pages: Vec::new(),
            rows: Vec::new(),
            cursor: 0,
        }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Texture> {
        self.pages.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of the first row at least `height` tall; `row_count()` if none.
    pub fn first_row_id(&self, height: u32) -> usize {
        self.rows.partition_point(|row| row.height < height)
    }

    /// Copies a `width` × `height` bitmap into the atlas.
    ///
    /// `stride` is the source row pitch in bytes, 0 for tightly packed.
    /// Returns the page holding the bitmap and where it was placed.
    /// `Overflow` when the bitmap cannot fit on an empty page. `BadState`
    /// when `data` is too short for the bitmap; nothing is placed then.
    pub fn allocate(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> GpuResult<(Texture, AtlasRect)> {
        if width == 0 || height == 0 {
            return Err(GpuError::BadState);
        }
        let AtlasConfig { size, padding, format } = self.config;
        check_pixels(data, row_pixels(stride, width, format)?, width, height, format)?;
        let span = |extent: u32| {
            extent
                .checked_add(padding.saturating_mul(2))
                .is_some_and(|total| total <= size)
        };
        if !span(width) || !span(height) {
            return Err(GpuError::Overflow);
        }

        let (page, rect) = match self.place_in_existing_row(width, height) {
            Some(placed) => placed,
            None => self.open_row(width, height)?,
        };

        let texture = self.pages[page].clone();
        texture.set_subimage(data, rect.x, rect.y, width, height, stride)?;
        Ok((texture, rect))
    }

    fn place_in_existing_row(&mut self, width: u32, height: u32) -> Option<(usize, AtlasRect)> {
        let AtlasConfig { size, padding, .. } = self.config;
        let start = self.first_row_id(height);

        let row = self.rows[start..]
            .iter_mut()
            .take_while(|row| row.height == height)
            .find(|row| row.used + width + padding <= size)?;

        let rect = AtlasRect { x: row.used, y: row.top, width, height };
        row.used += width + padding;
        Some((row.page, rect))
    }

    fn open_row(&mut self, width: u32, height: u32) -> GpuResult<(usize, AtlasRect)> {
        let padding = self.config.padding;
        if self.pages.is_empty() || self.cursor + height + padding > self.config.size {
            self.new_page()?;
        }

        let page = self.pages.len() - 1;
        let row = Row {
            page,
            top: self.cursor,
            used: padding + width + padding,
            height,
        };
        self.rows.try_reserve(1)?;
        let at = self.rows.partition_point(|r| r.height <= height);
        self.rows.insert(at, row);
        self.cursor += height + padding;

        Ok((page, AtlasRect { x: padding, y: row.top, width, height }))
    }

    fn new_page(&mut self) -> GpuResult<()> {
        let AtlasConfig { size, padding, format } = self.config;
        let texture = Texture::new(&self.context);

        let blank = vec![0u8; size as usize * size as usize * format.bytes_per_pixel() as usize];
        texture.set_image(Some(&blank), size, size, 0, format)?;

        self.pages.try_reserve(1)?;
        self.pages.push(texture);
        self.cursor = padding;
        log::debug!("glyph atlas page {} created ({size}×{size} {format:?})", self.pages.len());
        Ok(())
    }

    /// Drops every page and row. Outstanding page handles stay valid.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.rows.clear();
        self.cursor = 0;
    }
}
