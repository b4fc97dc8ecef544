//! Draw batching.
//!
//! A [`Batch`] turns a stream of 2D primitives into as few GPU draw calls as
//! possible. The caller brackets each visually distinct GPU state with
//! [`Batch::begin`] / [`Batch::end`] and emits vertices and triangles in
//! between. Consecutive brackets whose headers merge share one record, and
//! so one draw call. [`Batch::execute`] issues everything at frame end.
//!
//! Index storage starts at 8 bits per index and widens only when a larger
//! index arrives; see [`IndexBuffer`].

mod allocator;
mod commands;
mod draw;
mod index;
mod vertex;

pub use allocator::{Allocator, AllocatorConfig, DEFAULT_TTL};
pub use commands::CommandBuffer;
pub use draw::{Draw, Header};
pub use index::{IndexBuffer, IndexWidth};
pub use vertex::Vertex;

pub use crate::device::{Program, RenderFlags};

use crate::context::Context;
use crate::error::{GpuError, GpuResult};

/// Initial record sizes used when a batch has no [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub initial_vertices: usize,
    pub initial_index_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_vertices: 32,
            initial_index_bytes: 32,
        }
    }
}

/// Retained draw records for one frame.
#[derive(Debug, Default)]
pub struct Batch {
    config: BatchConfig,
    allocator: Option<Allocator>,
    draws: Vec<Box<Draw>>,
    /// The last record is open for primitives.
    active: bool,
    commands: CommandBuffer,
}

impl Batch {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// A batch that takes its records from, and returns them to, `allocator`.
    pub fn with_allocator(allocator: Allocator) -> Self {
        Self {
            allocator: Some(allocator),
            ..Default::default()
        }
    }

    pub fn allocator(&self) -> Option<&Allocator> {
        self.allocator.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Retained records, in submission order.
    pub fn draws(&self) -> impl ExactSizeIterator<Item = &Draw> {
        self.draws.iter().map(|d| &**d)
    }

    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    /// Appends shading words; returns the command index for their vertices.
    pub fn command(&mut self, words: &[[f32; 4]]) -> GpuResult<u32> {
        self.commands.push(words)
    }

    // ── recording ─────────────────────────────────────────────────────────

    /// Opens a draw for `header`.
    ///
    /// When the last retained record merges with `header` it is continued;
    /// indices emitted from here on are relative to its current vertex count.
    /// A continued record without a texture adopts the incoming one.
    pub fn begin(&mut self, header: Header) -> GpuResult<()> {
        if self.active {
            return Err(GpuError::BadState);
        }

        if let Some(last) = self.draws.last_mut() {
            if last.header.merges_with(&header) {
                last.origin =
                    u32::try_from(last.vertices.len()).map_err(|_| GpuError::Overflow)?;
                if last.header.texture.is_none() {
                    last.header.texture = header.texture;
                } else if let (Some(kept), Some(dropped)) =
                    (&last.header.texture, &header.texture)
                {
                    if !kept.ptr_eq(dropped) {
                        log::trace!(
                            "merged {:?} draw keeps texture {:?}, ignoring {:?}",
                            header.program,
                            kept.native_id(),
                            dropped.native_id()
                        );
                    }
                }
                self.active = true;
                return Ok(());
            }
        }

        self.draws.try_reserve(1)?;
        let draw = match &mut self.allocator {
            Some(pool) => pool.alloc_draw(header).ok_or(GpuError::NoMem)?,
            None => Box::new(Draw::with_capacity(
                header,
                self.config.initial_vertices,
                self.config.initial_index_bytes,
            )?),
        };
        self.draws.push(draw);
        self.active = true;
        Ok(())
    }

    /// Closes the open draw.
    pub fn end(&mut self) -> GpuResult<()> {
        if !self.active {
            return Err(GpuError::BadState);
        }
        self.active = false;
        Ok(())
    }

    fn active_draw(&mut self) -> GpuResult<&mut Draw> {
        if !self.active {
            return Err(GpuError::BadState);
        }
        self.draws.last_mut().map(|d| &mut **d).ok_or(GpuError::BadState)
    }

    /// Appends an untextured vertex; returns its index within this bracket.
    pub fn vertex(&mut self, cmd: u32, x: f32, y: f32) -> GpuResult<u32> {
        self.active_draw()?.push_vertex(Vertex::new(cmd, x, y))
    }

    pub fn textured_vertex(&mut self, cmd: u32, x: f32, y: f32, s: f32, t: f32) -> GpuResult<u32> {
        self.active_draw()?.push_vertex(Vertex::textured(cmd, x, y, s, t))
    }

    /// Appends bracket-relative indices, widening storage to fit `max`.
    fn push_indices<const N: usize>(&mut self, local: [u32; N], max: u32) -> GpuResult<()> {
        let draw = self.active_draw()?;
        let origin = draw.origin;

        let top = u64::from(max) + u64::from(origin);
        let width = IndexWidth::for_max(top).ok_or(GpuError::Overflow)?;

        let mut absolute = [0u32; N];
        for (out, i) in absolute.iter_mut().zip(local) {
            *out = i.checked_add(origin).ok_or(GpuError::Overflow)?;
        }

        draw.indices.widen(width)?;
        draw.indices.extend(&absolute)
    }

    pub fn triangle(&mut self, a: u32, b: u32, c: u32) -> GpuResult<()> {
        self.push_indices([a, b, c], a.max(b).max(c))
    }

    /// Like [`Self::triangle`]; the caller guarantees `c` is the largest index.
    pub fn triangle_hinted(&mut self, a: u32, b: u32, c: u32) -> GpuResult<()> {
        self.push_indices([a, b, c], c)
    }

    /// Two triangles, `(a, b, c)` and `(a, c, d)`.
    pub fn rectangle(&mut self, a: u32, b: u32, c: u32, d: u32) -> GpuResult<()> {
        self.push_indices([a, b, c, a, c, d], a.max(b).max(c).max(d))
    }

    /// Like [`Self::rectangle`]; the caller guarantees `d` is the largest index.
    pub fn rectangle_hinted(&mut self, a: u32, b: u32, c: u32, d: u32) -> GpuResult<()> {
        self.push_indices([a, b, c, a, c, d], d)
    }

    // ── submission ────────────────────────────────────────────────────────

    /// Issues every retained record through `context`, then clears.
    ///
    /// The command buffer is uploaded once. Each record binds its texture on
    /// unit 0, selects its program and draws once. Empty records and records
    /// whose texture cannot be bound are skipped. Returns the number of draw
    /// calls issued.
    pub fn execute(&mut self, context: &Context) -> GpuResult<usize> {
        if self.active {
            return Err(GpuError::BadState);
        }

        context.with_functions(|gl| gl.upload_commands(self.commands.words()))?;

        let mut issued = 0;
        for draw in &self.draws {
            if draw.is_empty() {
                continue;
            }
            let header = &draw.header;

            if let Some(texture) = &header.texture {
                if let Err(err) = texture.activate(0) {
                    log::warn!("skipping {:?} draw: texture bind failed: {err}", header.program);
                    continue;
                }
            }

            context.with_functions(|gl| {
                gl.use_program(header.program, header.flags);
                gl.draw_indexed(&draw.vertices, draw.indices.as_data());
            })?;
            log::trace!(
                "draw {:?}: {} vertices, {} indices at {} bits",
                header.program,
                draw.vertices.len(),
                draw.indices.len(),
                draw.indices.width().bytes() * 8
            );
            issued += 1;

            if let Some(texture) = &header.texture {
                if let Err(err) = texture.deactivate() {
                    log::warn!("texture unbind failed: {err}");
                }
            }
        }

        self.clear();
        Ok(issued)
    }

    /// Releases every record except an open one.
    pub fn clear(&mut self) {
        let keep = if self.active { self.draws.pop() } else { None };

        for draw in self.draws.drain(..) {
            if let Some(pool) = &mut self.allocator {
                pool.release_draw(draw);
            }
        }
        match keep {
            Some(open) => self.draws.push(open),
            None => self.commands.clear(),
        }
    }

    /// Sweeps the allocator's pool, if any.
    pub fn perform_gc(&mut self) {
        if let Some(pool) = &mut self.allocator {
            pool.perform_gc();
        }
    }
}
