//! GPU context abstraction.
//!
//! A [`Context`] owns one live native rendering context (through its function
//! table) and is the only path by which native objects are deleted. Objects
//! are registered when generated, queued by the `free_*` calls from any call
//! site, and deleted in one batched call per kind by [`Context::perform_gc`]
//! while the context is current.
//!
//! Locking: the function table and the registries share one mutex; the
//! pending-deletion queues have their own. Dropping a [`crate::Texture`] only
//! touches the queues, so it is safe from anywhere, including while a draw is
//! being issued.

mod factory;
mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::device::{GpuFunctions, NativeId};
use crate::error::{GpuError, GpuResult};
use crate::sync::lock;

pub use factory::{
    Backend, ContextFactory, ContextParam, ContextParams, HeadlessBackend, WgpuBackend,
};
pub use registry::{ResourceCounts, ResourceKind};

use registry::{remove_sorted, IdLists};

struct Device {
    functions: Box<dyn GpuFunctions>,
    current: bool,
    registered: IdLists,
}

impl Device {
    fn ensure_current(&mut self) -> bool {
        if !self.current {
            self.current = self.functions.make_current();
        }
        self.current
    }

    /// Deletes every registered object, best effort.
    fn delete_all(&mut self) {
        if !self.ensure_current() {
            log::warn!("context could not be made current; registered objects are abandoned");
        }
        for kind in ResourceKind::ALL {
            let ids = std::mem::take(self.registered.get_mut(kind));
            if !ids.is_empty() {
                kind.delete(self.functions.as_mut(), &ids);
            }
        }
    }
}

struct Shared {
    valid: AtomicBool,
    device: Mutex<Device>,
    pending: Mutex<IdLists>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if !*self.valid.get_mut() {
            return;
        }
        let device = self.device.get_mut().unwrap_or_else(PoisonError::into_inner);
        device.delete_all();
        if device.current {
            device.functions.release_current();
        }
    }
}

/// Counted handle to a native rendering context.
///
/// `clone()` takes a reference, dropping releases it; the last release deletes
/// every object still registered.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

/// Non-owning back-reference to a [`Context`].
#[derive(Clone, Default)]
pub struct WeakContext {
    shared: Weak<Shared>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.shared.upgrade().map(|shared| Context { shared })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("valid", &self.is_valid())
            .field("references", &self.reference_count())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for WeakContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakContext { .. }")
    }
}

impl Context {
    /// Wraps a resolved function table.
    pub fn new(functions: Box<dyn GpuFunctions>) -> Self {
        Self {
            shared: Arc::new(Shared {
                valid: AtomicBool::new(true),
                device: Mutex::new(Device {
                    functions,
                    current: false,
                    registered: IdLists::default(),
                }),
                pending: Mutex::new(IdLists::default()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of live strong handles.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_valid(&self) -> bool {
        self.shared.valid.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        lock(&self.shared.device).current
    }

    /// Makes the context current on the calling thread.
    pub fn activate(&self) -> GpuResult<()> {
        if !self.is_valid() {
            return Err(GpuError::BadState);
        }
        let mut device = lock(&self.shared.device);
        if device.ensure_current() {
            Ok(())
        } else {
            Err(GpuError::UnknownErr)
        }
    }

    /// Reclaims everything freed so far, then releases the context.
    pub fn deactivate(&self) {
        self.perform_gc();
        let mut device = lock(&self.shared.device);
        if device.current {
            device.functions.release_current();
            device.current = false;
        }
    }

    /// Runs `f` against the function table with the context current.
    pub fn with_functions<R>(&self, f: impl FnOnce(&mut dyn GpuFunctions) -> R) -> GpuResult<R> {
        if !self.is_valid() {
            return Err(GpuError::BadState);
        }
        let mut device = lock(&self.shared.device);
        if !device.ensure_current() {
            return Err(GpuError::UnknownErr);
        }
        Ok(f(device.functions.as_mut()))
    }

    // ── allocation ────────────────────────────────────────────────────────

    pub fn alloc_framebuffer(&self) -> GpuResult<NativeId> {
        self.alloc(ResourceKind::Framebuffer)
    }

    pub fn alloc_renderbuffer(&self) -> GpuResult<NativeId> {
        self.alloc(ResourceKind::Renderbuffer)
    }

    pub fn alloc_texture(&self) -> GpuResult<NativeId> {
        self.alloc(ResourceKind::Texture)
    }

    fn alloc(&self, kind: ResourceKind) -> GpuResult<NativeId> {
        if !self.is_valid() {
            return Err(GpuError::BadState);
        }
        let mut device = lock(&self.shared.device);
        if !device.ensure_current() {
            return Err(GpuError::UnknownErr);
        }

        let Device {
            functions,
            registered,
            ..
        } = &mut *device;

        let Some(&id) = kind.generate(functions.as_mut(), 1).first() else {
            log::warn!("driver failed to generate a {kind:?}");
            return Err(GpuError::UnknownErr);
        };

        let list = registered.get_mut(kind);
        if list.try_reserve(1).is_err() {
            // Untracked objects would never be deleted.
            kind.delete(functions.as_mut(), &[id]);
            return Err(GpuError::NoMem);
        }
        list.push(id);
        Ok(id)
    }

    // ── deferred deletion ─────────────────────────────────────────────────

    pub fn free_framebuffer(&self, id: NativeId) {
        self.free(ResourceKind::Framebuffer, id);
    }

    pub fn free_renderbuffer(&self, id: NativeId) {
        self.free(ResourceKind::Renderbuffer, id);
    }

    pub fn free_texture(&self, id: NativeId) {
        self.free(ResourceKind::Texture, id);
    }

    /// Queues `id` for deletion at the next GC. No native call is made here.
    ///
    /// A no-op once the context is invalid: the object died with it.
    pub fn free(&self, kind: ResourceKind, id: NativeId) {
        if id == 0 || !self.is_valid() {
            return;
        }
        lock(&self.shared.pending).get_mut(kind).push(id);
    }

    /// Deletes every queued object, one batched call per kind, and drops the
    /// ids from the registries.
    pub fn perform_gc(&self) {
        if !self.is_valid() {
            return;
        }

        let mut doomed = std::mem::take(&mut *lock(&self.shared.pending));
        if doomed.is_empty() {
            return;
        }

        let mut device = lock(&self.shared.device);
        if !device.ensure_current() {
            log::warn!("context could not be made current; deletions stay queued");
            let mut pending = lock(&self.shared.pending);
            for kind in ResourceKind::ALL {
                pending.get_mut(kind).append(doomed.get_mut(kind));
            }
            return;
        }

        let counts = doomed.counts();
        let Device {
            functions,
            registered,
            ..
        } = &mut *device;
        for kind in ResourceKind::ALL {
            let ids = doomed.get_mut(kind);
            if ids.is_empty() {
                continue;
            }
            kind.delete(functions.as_mut(), ids);
            remove_sorted(registered.get_mut(kind), ids);
        }

        log::debug!(
            "context gc: {} framebuffers, {} renderbuffers, {} textures deleted",
            counts.framebuffers,
            counts.renderbuffers,
            counts.textures
        );
    }

    /// Deletes every registered object, not only queued ones.
    pub fn cleanup(&self) {
        *lock(&self.shared.pending) = IdLists::default();
        lock(&self.shared.device).delete_all();
    }

    /// Marks the context dead after a best-effort cleanup. Terminal.
    pub fn invalidate(&self) {
        if !self.is_valid() {
            return;
        }
        let live = self.registered();
        if live.total() > 0 {
            log::warn!("invalidating context with {} live objects", live.total());
        }
        self.cleanup();
        self.shared.valid.store(false, Ordering::Release);
    }

    // ── introspection ─────────────────────────────────────────────────────

    pub fn registered(&self) -> ResourceCounts {
        lock(&self.shared.device).registered.counts()
    }

    pub fn pending(&self) -> ResourceCounts {
        lock(&self.shared.pending).counts()
    }

    /// Registered ids of `kind`, in no particular order.
    pub fn registered_ids(&self, kind: ResourceKind) -> Vec<NativeId> {
        lock(&self.shared.device).registered.get(kind).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Call, HeadlessFunctions, HeadlessProbe};

    fn headless() -> (Context, HeadlessProbe) {
        let (gl, probe) = HeadlessFunctions::new();
        (Context::new(Box::new(gl)), probe)
    }

    fn deletes_of_textures(probe: &HeadlessProbe) -> Vec<Vec<NativeId>> {
        probe
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteTextures(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    // ── allocation ────────────────────────────────────────────────────────

    #[test]
    fn alloc_registers_and_activates() {
        let (ctx, probe) = headless();
        let fb = ctx.alloc_framebuffer().unwrap();
        let rb = ctx.alloc_renderbuffer().unwrap();
        let tex = ctx.alloc_texture().unwrap();

        assert!(ctx.is_active());
        assert_eq!(probe.count(|c| *c == Call::MakeCurrent), 1);
        assert_eq!(
            ctx.registered(),
            ResourceCounts { framebuffers: 1, renderbuffers: 1, textures: 1 }
        );
        assert_eq!(ctx.registered_ids(ResourceKind::Framebuffer), vec![fb]);
        assert_eq!(ctx.registered_ids(ResourceKind::Renderbuffer), vec![rb]);
        assert_eq!(ctx.registered_ids(ResourceKind::Texture), vec![tex]);
    }

    #[test]
    fn alloc_fails_when_driver_generates_nothing() {
        let (ctx, probe) = headless();
        probe.set_fail_generate(true);
        assert_eq!(ctx.alloc_texture(), Err(GpuError::UnknownErr));
        assert_eq!(ctx.registered().total(), 0);
    }

    #[test]
    fn alloc_fails_when_context_cannot_be_made_current() {
        let (ctx, probe) = headless();
        probe.set_fail_make_current(true);
        assert_eq!(ctx.alloc_texture(), Err(GpuError::UnknownErr));
        assert_eq!(ctx.activate(), Err(GpuError::UnknownErr));
    }

    // ── deferred deletion ─────────────────────────────────────────────────

    #[test]
    fn free_only_queues() {
        let (ctx, probe) = headless();
        let tex = ctx.alloc_texture().unwrap();
        ctx.free_texture(tex);

        assert!(deletes_of_textures(&probe).is_empty());
        assert_eq!(ctx.pending().textures, 1);
        assert_eq!(ctx.registered().textures, 1);
    }

    #[test]
    fn gc_issues_one_batched_delete_per_kind() {
        let (ctx, probe) = headless();
        let ids: Vec<_> = (0..5).map(|_| ctx.alloc_texture().unwrap()).collect();
        let keep = ctx.alloc_framebuffer().unwrap();

        for &id in &ids[1..] {
            ctx.free_texture(id);
        }
        ctx.perform_gc();

        let deletes = deletes_of_textures(&probe);
        assert_eq!(deletes.len(), 1);
        let mut deleted = deletes[0].clone();
        deleted.sort_unstable();
        assert_eq!(deleted, ids[1..].to_vec());

        assert_eq!(ctx.registered_ids(ResourceKind::Texture), vec![ids[0]]);
        assert_eq!(ctx.registered_ids(ResourceKind::Framebuffer), vec![keep]);
        assert_eq!(ctx.pending().total(), 0);
        assert_eq!(probe.count(|c| matches!(c, Call::DeleteFramebuffers(_))), 0);
    }

    #[test]
    fn gc_with_nothing_pending_is_silent() {
        let (ctx, probe) = headless();
        ctx.perform_gc();
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn deactivate_collects_then_releases() {
        let (ctx, probe) = headless();
        let rb = ctx.alloc_renderbuffer().unwrap();
        ctx.free_renderbuffer(rb);
        ctx.deactivate();

        let calls = probe.calls();
        let delete_at = calls
            .iter()
            .position(|c| matches!(c, Call::DeleteRenderbuffers(_)))
            .unwrap();
        let release_at = calls.iter().position(|c| *c == Call::ReleaseCurrent).unwrap();
        assert!(delete_at < release_at);
        assert!(!ctx.is_active());
        assert_eq!(ctx.registered().renderbuffers, 0);
    }

    #[test]
    fn gc_requeues_when_context_cannot_be_made_current() {
        let (ctx, probe) = headless();
        let tex = ctx.alloc_texture().unwrap();
        ctx.deactivate();

        ctx.free_texture(tex);
        probe.set_fail_make_current(true);
        ctx.perform_gc();
        assert_eq!(ctx.pending().textures, 1);

        probe.set_fail_make_current(false);
        ctx.perform_gc();
        assert_eq!(ctx.pending().textures, 0);
        assert_eq!(ctx.registered().textures, 0);
    }

    // ── invalidation ──────────────────────────────────────────────────────

    #[test]
    fn invalidate_deletes_everything_and_is_terminal() {
        let (ctx, probe) = headless();
        ctx.alloc_texture().unwrap();
        ctx.alloc_framebuffer().unwrap();
        ctx.invalidate();

        assert!(!ctx.is_valid());
        assert_eq!(probe.live_textures(), 0);
        assert_eq!(probe.live_framebuffers(), 0);
        assert_eq!(ctx.alloc_texture(), Err(GpuError::BadState));
        assert_eq!(ctx.activate(), Err(GpuError::BadState));

        ctx.free_texture(42);
        assert_eq!(ctx.pending().total(), 0);
    }

    #[test]
    fn last_reference_cleans_up() {
        let (ctx, probe) = headless();
        let second = ctx.clone();
        assert_eq!(ctx.reference_count(), 2);

        ctx.alloc_texture().unwrap();
        drop(ctx);
        assert_eq!(probe.live_textures(), 1);

        drop(second);
        assert_eq!(probe.live_textures(), 0);
    }

    #[test]
    fn weak_reference_does_not_keep_context_alive() {
        let (ctx, _probe) = headless();
        let weak = ctx.downgrade();
        assert!(weak.upgrade().is_some_and(|c| c.ptr_eq(&ctx)));
        drop(ctx);
        assert!(weak.upgrade().is_none());
    }
}
