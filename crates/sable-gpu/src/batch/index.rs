use crate::device::IndexData;
use crate::error::{GpuError, GpuResult};

/// Storage width of an [`IndexBuffer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// Narrowest width able to hold `max`, or `None` past 32 bits.
    pub const fn for_max(max: u64) -> Option<Self> {
        if max <= u8::MAX as u64 {
            Some(IndexWidth::U8)
        } else if max <= u16::MAX as u64 {
            Some(IndexWidth::U16)
        } else if max <= u32::MAX as u64 {
            Some(IndexWidth::U32)
        } else {
            None
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }
}

/// Growable index list stored at the narrowest width seen so far.
///
/// Widening is one-way and keeps every stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Default for IndexBuffer {
    fn default() -> Self {
        IndexBuffer::U8(Vec::new())
    }
}

/// Grows `v` so `extra` more items fit, at least doubling the capacity.
fn reserve_doubling<T>(v: &mut Vec<T>, extra: usize) -> GpuResult<()> {
    let needed = v.len() + extra;
    if needed <= v.capacity() {
        return Ok(());
    }
    let target = needed.max(v.capacity() * 2);
    v.try_reserve_exact(target - v.len())?;
    Ok(())
}

fn widened<T: Copy, U: From<T>>(src: &[T], capacity: usize) -> GpuResult<Vec<U>> {
    let mut out = Vec::new();
    out.try_reserve_exact(capacity.max(src.len()))?;
    out.extend(src.iter().map(|&v| U::from(v)));
    Ok(out)
}

impl IndexBuffer {
    /// An empty 8-bit buffer with room for `bytes` indices.
    pub fn with_capacity_bytes(bytes: usize) -> GpuResult<Self> {
        let mut v = Vec::new();
        v.try_reserve_exact(bytes)?;
        Ok(IndexBuffer::U8(v))
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            IndexBuffer::U8(_) => IndexWidth::U8,
            IndexBuffer::U16(_) => IndexWidth::U16,
            IndexBuffer::U32(_) => IndexWidth::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U8(v) => v.len(),
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity in bytes at the current width.
    pub fn capacity_bytes(&self) -> usize {
        match self {
            IndexBuffer::U8(v) => v.capacity(),
            IndexBuffer::U16(v) => v.capacity() * 2,
            IndexBuffer::U32(v) => v.capacity() * 4,
        }
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexBuffer::U8(v) => v.get(i).map(|&x| u32::from(x)),
            IndexBuffer::U16(v) => v.get(i).map(|&x| u32::from(x)),
            IndexBuffer::U32(v) => v.get(i).copied(),
        }
    }

    /// Promotes storage to at least `to`. Narrowing requests are ignored.
    pub fn widen(&mut self, to: IndexWidth) -> GpuResult<()> {
        if to <= self.width() {
            return Ok(());
        }
        let next = match (&*self, to) {
            (IndexBuffer::U8(v), IndexWidth::U16) => IndexBuffer::U16(widened(v, v.capacity())?),
            (IndexBuffer::U8(v), IndexWidth::U32) => IndexBuffer::U32(widened(v, v.capacity())?),
            (IndexBuffer::U16(v), IndexWidth::U32) => IndexBuffer::U32(widened(v, v.capacity())?),
            _ => return Ok(()),
        };
        log::trace!("index buffer widened to {to:?} ({} indices)", next.len());
        *self = next;
        Ok(())
    }

    /// Appends indices that already fit the current width.
    ///
    /// Callers widen first; a value that does not fit is a `BadState`.
    pub fn extend(&mut self, indices: &[u32]) -> GpuResult<()> {
        match self {
            IndexBuffer::U8(v) => {
                reserve_doubling(v, indices.len())?;
                for &i in indices {
                    v.push(u8::try_from(i).map_err(|_| GpuError::BadState)?);
                }
            }
            IndexBuffer::U16(v) => {
                reserve_doubling(v, indices.len())?;
                for &i in indices {
                    v.push(u16::try_from(i).map_err(|_| GpuError::BadState)?);
                }
            }
            IndexBuffer::U32(v) => {
                reserve_doubling(v, indices.len())?;
                v.extend_from_slice(indices);
            }
        }
        Ok(())
    }

    /// Empties the buffer and returns it to 8-bit width.
    ///
    /// Storage is kept when already 8-bit; a wider buffer is swapped for an
    /// 8-bit one of the same byte capacity.
    pub fn reset(&mut self) {
        match self {
            IndexBuffer::U8(v) => v.clear(),
            _ => {
                let bytes = self.capacity_bytes();
                *self = IndexBuffer::U8(Vec::with_capacity(bytes));
            }
        }
    }

    pub fn as_data(&self) -> IndexData<'_> {
        match self {
            IndexBuffer::U8(v) => IndexData::U8(v),
            IndexBuffer::U16(v) => IndexData::U16(v),
            IndexBuffer::U32(v) => IndexData::U32(v),
        }
    }

    /// Every stored index widened to `u32`.
    pub fn to_vec(&self) -> Vec<u32> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}
