use crate::device::{GpuFunctions, NativeId};

/// Kinds of native objects a context tracks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Framebuffer,
    Renderbuffer,
    Texture,
}

impl ResourceKind {
    pub(super) const ALL: [ResourceKind; 3] = [
        ResourceKind::Framebuffer,
        ResourceKind::Renderbuffer,
        ResourceKind::Texture,
    ];

    pub(super) fn generate(self, gl: &mut dyn GpuFunctions, count: usize) -> Vec<NativeId> {
        match self {
            ResourceKind::Framebuffer => gl.gen_framebuffers(count),
            ResourceKind::Renderbuffer => gl.gen_renderbuffers(count),
            ResourceKind::Texture => gl.gen_textures(count),
        }
    }

    pub(super) fn delete(self, gl: &mut dyn GpuFunctions, ids: &[NativeId]) {
        match self {
            ResourceKind::Framebuffer => gl.delete_framebuffers(ids),
            ResourceKind::Renderbuffer => gl.delete_renderbuffers(ids),
            ResourceKind::Texture => gl.delete_textures(ids),
        }
    }
}

/// Per-kind object counts, as reported by [`super::Context::registered`] and
/// [`super::Context::pending`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ResourceCounts {
    pub framebuffers: usize,
    pub renderbuffers: usize,
    pub textures: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.framebuffers + self.renderbuffers + self.textures
    }
}

/// One unordered id list per resource kind.
#[derive(Debug, Default)]
pub(super) struct IdLists {
    framebuffers: Vec<NativeId>,
    renderbuffers: Vec<NativeId>,
    textures: Vec<NativeId>,
}

impl IdLists {
    pub(super) fn get(&self, kind: ResourceKind) -> &Vec<NativeId> {
        match kind {
            ResourceKind::Framebuffer => &self.framebuffers,
            ResourceKind::Renderbuffer => &self.renderbuffers,
            ResourceKind::Texture => &self.textures,
        }
    }

    pub(super) fn get_mut(&mut self, kind: ResourceKind) -> &mut Vec<NativeId> {
        match kind {
            ResourceKind::Framebuffer => &mut self.framebuffers,
            ResourceKind::Renderbuffer => &mut self.renderbuffers,
            ResourceKind::Texture => &mut self.textures,
        }
    }

    pub(super) fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            framebuffers: self.framebuffers.len(),
            renderbuffers: self.renderbuffers.len(),
            textures: self.textures.len(),
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

/// Removes every id in `doomed` from `registry`.
///
/// Sorts both lists, then walks them once, copying survivors down in place.
/// O(n log n) instead of a per-id search.
pub(super) fn remove_sorted(registry: &mut Vec<NativeId>, doomed: &mut [NativeId]) {
    registry.sort_unstable();
    doomed.sort_unstable();

    let mut write = 0;
    let mut d = 0;
    for read in 0..registry.len() {
        let id = registry[read];
        while d < doomed.len() && doomed[d] < id {
            d += 1;
        }
        if d < doomed.len() && doomed[d] == id {
            continue;
        }
        registry[write] = id;
        write += 1;
    }
    registry.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_only_doomed_ids() {
        let mut registry = vec![9, 3, 7, 1, 5];
        let mut doomed = vec![7, 1];
        remove_sorted(&mut registry, &mut doomed);
        assert_eq!(registry, vec![3, 5, 9]);
    }

    #[test]
    fn ignores_unknown_and_duplicate_ids() {
        let mut registry = vec![4, 2, 6];
        let mut doomed = vec![6, 100, 6, 0];
        remove_sorted(&mut registry, &mut doomed);
        assert_eq!(registry, vec![2, 4]);
    }

    #[test]
    fn empties_when_everything_is_doomed() {
        let mut registry = vec![1, 2, 3];
        let mut doomed = vec![3, 2, 1];
        remove_sorted(&mut registry, &mut doomed);
        assert!(registry.is_empty());
    }
}
