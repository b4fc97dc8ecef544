use crate::error::{GpuError, GpuResult};

/// Float4 side buffer addressed by [`super::Vertex::cmd`].
///
/// Shading parameters (colors, gradient stops, clip data) are packed here
/// and uploaded once per frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandBuffer {
    words: Vec<[f32; 4]>,
}

impl CommandBuffer {
    /// Appends `words` and returns the index of the first one.
    pub fn push(&mut self, words: &[[f32; 4]]) -> GpuResult<u32> {
        let first = u32::try_from(self.words.len()).map_err(|_| GpuError::Overflow)?;
        if u32::try_from(self.words.len() + words.len()).is_err() {
            return Err(GpuError::Overflow);
        }
        self.words.try_reserve(words.len())?;
        self.words.extend_from_slice(words);
        Ok(first)
    }

    pub fn words(&self) -> &[[f32; 4]] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}
