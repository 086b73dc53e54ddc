//! Byte-stream backends.
//!
//! Reading goes through [`ByteStream`], a cursor with read/seek/tell and a
//! best-effort prefetch hint. Three implementations exist:
//!
//! - [`MmapStream`] - memory-mapped file, supports zero-copy arrays
//! - [`PreadStream`] - positional reads on a shared file handle
//! - [`AssetStream`] - any [`Asset`] (size + positional read)
//!
//! [`Backend`] is the shared source a store opens once; each reader gets its
//! own cursor from [`Backend::stream`]. Writing goes through
//! [`BufferedOutput`].

mod asset;
#[cfg(feature = "mmap")]
mod mmap;
mod output;
mod pread;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

pub use asset::*;
#[cfg(feature = "mmap")]
pub use mmap::*;
pub use output::*;
pub use pread::*;

use crate::util::{CrateConfig, Error, Result};

/// Read cursor over a crate file's bytes.
pub trait ByteStream: Send + Sync {
    /// Fill `buf` from the current position and advance.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
    /// Move the cursor to an absolute offset.
    fn seek(&mut self, offset: u64);
    /// Current absolute offset.
    fn tell(&self) -> u64;
    /// Total size of the underlying bytes.
    fn size(&self) -> u64;
    /// Hint that `[offset, offset + len)` will be read soon.
    fn prefetch(&self, _offset: u64, _len: u64) {}
    /// Independent cursor over the same bytes.
    fn boxed_clone(&self) -> Box<dyn ByteStream>;
    /// The mapping, for backends that can alias arrays into it.
    #[cfg(feature = "mmap")]
    fn mapping(&self) -> Option<&Arc<Mmap>> {
        None
    }
}

/// Source bytes of an open store. Chosen once per open.
#[derive(Clone)]
pub enum Backend {
    #[cfg(feature = "mmap")]
    Mmap(Arc<Mmap>),
    Pread(Arc<File>),
    Asset(Arc<dyn Asset>),
}

impl Backend {
    /// Open a file with the backend selected by `config`.
    pub fn open_file(path: &Path, config: &CrateConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_file(file, config)
    }

    /// Wrap an already open file.
    pub fn from_file(file: File, config: &CrateConfig) -> Result<Self> {
        #[cfg(feature = "mmap")]
        {
            if !config.use_pread && file.metadata()?.len() > 0 {
                // Safety: the map is read-only; rewrites of a mapped file only
                // touch bytes past the last value any live array refers to.
                let map = unsafe { Mmap::map(&file) }
                    .map_err(|e| Error::MmapFailed(e.to_string()))?;
                return Ok(Backend::Mmap(Arc::new(map)));
            }
        }
        #[cfg(not(feature = "mmap"))]
        let _ = config;
        Ok(Backend::Pread(Arc::new(file)))
    }

    /// Total byte size.
    pub fn size(&self) -> u64 {
        match self {
            #[cfg(feature = "mmap")]
            Backend::Mmap(map) => map.len() as u64,
            Backend::Pread(file) => file.metadata().map(|m| m.len()).unwrap_or(0),
            Backend::Asset(asset) => asset.size(),
        }
    }

    /// Backend name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            #[cfg(feature = "mmap")]
            Backend::Mmap(_) => "mmap",
            Backend::Pread(_) => "pread",
            Backend::Asset(_) => "asset",
        }
    }

    /// A fresh cursor at offset 0.
    pub fn stream(&self, config: &CrateConfig) -> Box<dyn ByteStream> {
        #[cfg(not(feature = "mmap"))]
        let _ = config;
        match self {
            #[cfg(feature = "mmap")]
            Backend::Mmap(map) => Box::new(MmapStream::new(map.clone(), config.mmap_prefetch_kb * 1024)),
            Backend::Pread(file) => Box::new(PreadStream::new(file.clone(), self.size())),
            Backend::Asset(asset) => Box::new(AssetStream::new(asset.clone())),
        }
    }

    /// Read `len` bytes at `offset` without a long-lived cursor.
    pub fn read_bytes(&self, offset: u64, len: usize, config: &CrateConfig) -> Result<Vec<u8>> {
        let mut stream = self.stream(config);
        stream.seek(offset);
        let mut buf = vec![0u8; len];
        stream.read(&mut buf)?;
        Ok(buf)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Backend({}, {} bytes)", self.kind(), self.size())
    }
}

/// Check that `[offset, offset + len)` lies within `size` bytes.
#[inline]
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::UnexpectedEof(offset.saturating_add(len as u64))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_with(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(bytes).expect("write");
        f.flush().expect("flush");
        f
    }

    fn exercise(stream: &mut dyn ByteStream) {
        assert_eq!(stream.size(), 10);
        let mut buf = [0u8; 4];
        stream.seek(3);
        stream.read(&mut buf).expect("read");
        assert_eq!(buf, [3, 4, 5, 6]);
        assert_eq!(stream.tell(), 7);
        stream.prefetch(0, 10);

        let mut other = stream.boxed_clone();
        other.seek(0);
        let mut one = [0u8; 1];
        other.read(&mut one).expect("read");
        assert_eq!(one, [0]);
        assert_eq!(stream.tell(), 7);

        let mut big = [0u8; 4];
        assert!(matches!(stream.read(&mut big), Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_backends_agree() {
        let data: Vec<u8> = (0..10).collect();
        let tmp = temp_with(&data);

        let pread = Backend::open_file(tmp.path(), &CrateConfig::default().with_pread(true))
            .expect("pread backend");
        assert_eq!(pread.kind(), "pread");
        exercise(pread.stream(&CrateConfig::default()).as_mut());

        #[cfg(feature = "mmap")]
        {
            let cfg = CrateConfig::default().with_mmap_prefetch_kb(4);
            let mapped = Backend::open_file(tmp.path(), &cfg).expect("mmap backend");
            assert_eq!(mapped.kind(), "mmap");
            exercise(mapped.stream(&cfg).as_mut());
        }

        let asset = Backend::Asset(Arc::new(MemoryAsset::new(data.clone())));
        exercise(asset.stream(&CrateConfig::default()).as_mut());
        assert_eq!(
            asset.read_bytes(8, 2, &CrateConfig::default()).expect("read"),
            vec![8, 9]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = Backend::open_file(Path::new("/no/such/file.usdc"), &CrateConfig::default())
            .expect_err("missing");
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 10, 10).is_ok());
        assert!(check_range(1, 10, 10).is_err());
        assert!(check_range(u64::MAX, 2, 10).is_err());
    }
}
