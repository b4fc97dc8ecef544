use super::draw::{Draw, Header};

/// Sweeps a retired draw record survives before it is freed.
pub const DEFAULT_TTL: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Sweeps before an unused record is freed.
    pub ttl: u32,
    pub initial_vertices: usize,
    pub initial_index_bytes: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            initial_vertices: 64,
            initial_index_bytes: 256,
        }
    }
}

#[derive(Debug)]
struct FreeNode {
    draw: Box<Draw>,
    age: u32,
}

/// Pool of draw records recycled across frames.
///
/// Released records go on a free stack and are handed out again newest
/// first. Every [`Allocator::perform_gc`] ages the stack; records that sat
/// unused for `ttl` sweeps are freed.
#[derive(Debug, Default)]
pub struct Allocator {
    config: AllocatorConfig,
    free: Vec<FreeNode>,
    fresh: usize,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            free: Vec::new(),
            fresh: 0,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// A record stamped with `header`, reused when one is free.
    ///
    /// Returns `None` when a new record cannot be allocated.
    pub fn alloc_draw(&mut self, header: Header) -> Option<Box<Draw>> {
        if let Some(FreeNode { mut draw, .. }) = self.free.pop() {
            draw.header = header;
            return Some(draw);
        }

        let draw = Draw::with_capacity(
            header,
            self.config.initial_vertices,
            self.config.initial_index_bytes,
        )
        .ok()?;
        self.fresh += 1;
        Some(Box::new(draw))
    }

    /// Returns `draw` to the pool. Its texture reference is dropped here.
    pub fn release_draw(&mut self, mut draw: Box<Draw>) {
        draw.reset();
        if self.free.try_reserve(1).is_err() {
            return;
        }
        self.free.push(FreeNode { draw, age: 0 });
    }

    /// Ages every pooled record and frees the ones past the TTL.
    pub fn perform_gc(&mut self) {
        let ttl = self.config.ttl;
        let before = self.free.len();
        self.free.retain_mut(|node| {
            node.age += 1;
            node.age < ttl
        });
        let freed = before - self.free.len();
        if freed > 0 {
            log::debug!("allocator gc: {freed} draw records freed, {} pooled", self.free.len());
        }
    }

    /// Frees the whole pool.
    pub fn clear(&mut self) {
        self.free.clear();
    }

    /// Records currently pooled.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Records created from scratch rather than reused.
    pub fn fresh_allocations(&self) -> usize {
        self.fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Vertex;
    use crate::context::Context;
    use crate::device::{HeadlessFunctions, Program};
    use crate::texture::Texture;

    // ── reuse ─────────────────────────────────────────────────────────────

    #[test]
    fn released_record_is_reused_with_zeroed_counts() {
        let mut pool = Allocator::default();
        let mut draw = pool.alloc_draw(Header::new(Program::Geometry)).unwrap();
        draw.push_vertex(Vertex::new(0, 1.0, 1.0)).unwrap();
        draw.indices.extend(&[0, 0, 0]).unwrap();
        let addr: *const Draw = &*draw;

        pool.release_draw(draw);
        assert_eq!(pool.free_len(), 1);

        let again = pool.alloc_draw(Header::new(Program::Glyph)).unwrap();
        assert!(std::ptr::eq(addr, &*again));
        assert!(again.vertices().is_empty());
        assert!(again.indices().is_empty());
        assert_eq!(again.origin(), 0);
        assert_eq!(again.header().program, Program::Glyph);
        assert_eq!(pool.fresh_allocations(), 1);
    }

    #[test]
    fn fresh_record_uses_configured_baseline() {
        let mut pool = Allocator::default();
        let draw = pool.alloc_draw(Header::new(Program::Image)).unwrap();
        assert!(draw.vertices.capacity() >= 64);
        assert!(draw.indices().capacity_bytes() >= 256);
    }

    #[test]
    fn release_drops_texture_reference() {
        let (gl, _probe) = HeadlessFunctions::new();
        let ctx = Context::new(Box::new(gl));
        let tex = Texture::new(&ctx);

        let mut pool = Allocator::default();
        let draw = pool
            .alloc_draw(Header::new(Program::Image).with_texture(tex.clone()))
            .unwrap();
        assert_eq!(tex.reference_count(), 2);

        pool.release_draw(draw);
        assert_eq!(tex.reference_count(), 1);
    }

    // ── eviction ──────────────────────────────────────────────────────────

    #[test]
    fn ttl_sweeps_empty_the_pool() {
        let mut pool = Allocator::default();
        for _ in 0..3 {
            let draw = pool.alloc_draw(Header::new(Program::Geometry)).unwrap();
            pool.release_draw(draw);
        }
        assert_eq!(pool.free_len(), 1);

        for _ in 0..DEFAULT_TTL - 1 {
            pool.perform_gc();
        }
        assert_eq!(pool.free_len(), 1);

        pool.perform_gc();
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn reuse_resets_age() {
        let mut pool = Allocator::new(AllocatorConfig { ttl: 2, ..Default::default() });
        let draw = pool.alloc_draw(Header::new(Program::Geometry)).unwrap();
        pool.release_draw(draw);
        pool.perform_gc();

        let draw = pool.alloc_draw(Header::new(Program::Geometry)).unwrap();
        pool.release_draw(draw);
        pool.perform_gc();
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn clear_frees_everything() {
        let mut pool = Allocator::default();
        let a = pool.alloc_draw(Header::new(Program::Geometry)).unwrap();
        let b = pool.alloc_draw(Header::new(Program::Geometry)).unwrap();
        pool.release_draw(a);
        pool.release_draw(b);
        assert_eq!(pool.free_len(), 2);

        pool.clear();
        assert_eq!(pool.free_len(), 0);
    }
}
