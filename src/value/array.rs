//! Shared arrays, optionally aliasing mapped file memory.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use bytemuck::Pod;
#[cfg(feature = "mmap")]
use memmap2::Mmap;

#[derive(Clone)]
enum Storage<T: Pod> {
    Owned(Arc<Vec<T>>),
    /// Elements live in a read-only mapping kept alive by the `Arc`.
    #[cfg(feature = "mmap")]
    Mapped {
        map: Arc<Mmap>,
        offset: usize,
        len: usize,
    },
}

/// Immutable, cheaply clonable array of plain-old-data elements.
///
/// Arrays read from a memory-mapped store may point straight into the
/// mapping. They hold a strong reference to it, so the bytes stay valid for
/// as long as the array lives, even after the store is dropped.
#[derive(Clone)]
pub struct Array<T: Pod> {
    storage: Storage<T>,
}

impl<T: Pod> Array<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self { storage: Storage::Owned(Arc::new(values)) }
    }

    /// View `len` elements at byte `offset` of `map` without copying.
    ///
    /// Returns `None` if the range is out of bounds or misaligned for `T`.
    #[cfg(feature = "mmap")]
    pub(crate) fn mapped(map: Arc<Mmap>, offset: usize, len: usize) -> Option<Self> {
        let nbytes = len.checked_mul(std::mem::size_of::<T>())?;
        let bytes = map.get(offset..offset.checked_add(nbytes)?)?;
        bytemuck::try_cast_slice::<u8, T>(bytes).ok()?;
        Some(Self { storage: Storage::Mapped { map, offset, len } })
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            Storage::Owned(v) => v,
            #[cfg(feature = "mmap")]
            Storage::Mapped { map, offset, len } => {
                let nbytes = len * std::mem::size_of::<T>();
                // Range and alignment were checked on construction.
                bytemuck::try_cast_slice(&map[*offset..*offset + nbytes]).unwrap_or(&[])
            }
        }
    }

    /// True if the elements alias mapped file memory.
    pub fn is_zero_copy(&self) -> bool {
        match &self.storage {
            Storage::Owned(_) => false,
            #[cfg(feature = "mmap")]
            Storage::Mapped { .. } => true,
        }
    }

    /// Mutable access, copying out of the mapping or a shared buffer first.
    pub fn make_mut(&mut self) -> &mut Vec<T> {
        if self.is_zero_copy() {
            self.storage = Storage::Owned(Arc::new(self.as_slice().to_vec()));
        }
        match &mut self.storage {
            Storage::Owned(v) => Arc::make_mut(v),
            #[cfg(feature = "mmap")]
            Storage::Mapped { .. } => unreachable!("detached above"),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self.storage {
            Storage::Owned(v) => Arc::try_unwrap(v).unwrap_or_else(|shared| (*shared).clone()),
            #[cfg(feature = "mmap")]
            Storage::Mapped { .. } => self.as_slice().to_vec(),
        }
    }

    /// Raw element bytes, as stored on disk.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl<T: Pod> Default for Array<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Pod> Deref for Array<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Pod + PartialEq> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Pod> From<Vec<T>> for Array<T> {
    fn from(values: Vec<T>) -> Self {
        Self::new(values)
    }
}

impl<T: Pod> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_array() {
        let a: Array<i32> = vec![1, 2, 3].into();
        let b = a.clone();
        assert_eq!(&*a, &[1, 2, 3]);
        assert_eq!(a, b);
        assert!(!a.is_zero_copy());
        assert_eq!(a.as_bytes().len(), 12);
    }

    #[test]
    fn test_make_mut_copies_on_write() {
        let a: Array<f32> = vec![1.0, 2.0].into();
        let mut b = a.clone();
        b.make_mut().push(3.0);
        assert_eq!(a.len(), 2);
        assert_eq!(&*b, &[1.0, 2.0, 3.0]);
        assert_eq!(b.into_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[cfg(feature = "mmap")]
    #[test]
    fn test_mapped_array_outlives_file() {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        let values: Vec<u32> = (0..64).collect();
        tmp.write_all(&[0u8; 8]).expect("write");
        tmp.write_all(bytemuck::cast_slice(&values)).expect("write");
        tmp.flush().expect("flush");

        let file = std::fs::File::open(tmp.path()).expect("open");
        let map = Arc::new(unsafe { Mmap::map(&file) }.expect("map"));
        let arr = Array::<u32>::mapped(map.clone(), 8, 64).expect("aligned");
        drop(map);
        drop(file);
        assert!(arr.is_zero_copy());
        assert_eq!(&*arr, values.as_slice());

        assert!(Array::<u32>::mapped(
            Arc::new(unsafe { Mmap::map(&std::fs::File::open(tmp.path()).expect("open")) }.expect("map")),
            1,
            4
        )
        .is_none());

        let mut detached = arr.clone();
        detached.make_mut()[0] = 99;
        assert!(!detached.is_zero_copy());
        assert_eq!(arr[0], 0);
    }
}
