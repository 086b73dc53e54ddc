//! Memory-mapped stream.

use std::sync::Arc;

use memmap2::Mmap;

use super::{check_range, ByteStream};
use crate::util::Result;

/// Cursor over a shared read-only mapping.
#[derive(Clone)]
pub struct MmapStream {
    map: Arc<Mmap>,
    pos: u64,
    prefetch_bytes: usize,
}

impl MmapStream {
    /// `prefetch_bytes` > 0 issues a will-need hint of that size around
    /// every read.
    pub fn new(map: Arc<Mmap>, prefetch_bytes: usize) -> Self {
        Self { map, pos: 0, prefetch_bytes }
    }

    #[cfg(unix)]
    fn advise(&self, offset: u64, len: u64) {
        let size = self.map.len() as u64;
        if offset >= size || len == 0 {
            return;
        }
        let len = len.min(size - offset);
        // Best effort; failure only costs performance.
        let _ = self
            .map
            .advise_range(memmap2::Advice::WillNeed, offset as usize, len as usize);
    }

    #[cfg(not(unix))]
    fn advise(&self, _offset: u64, _len: u64) {}
}

impl ByteStream for MmapStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.pos, buf.len(), self.map.len() as u64)?;
        if self.prefetch_bytes > 0 {
            let chunk = self.prefetch_bytes as u64;
            let start = self.pos / chunk * chunk;
            let end = (self.pos + buf.len() as u64).div_ceil(chunk) * chunk;
            self.advise(start, end - start);
        }
        let start = self.pos as usize;
        buf.copy_from_slice(&self.map[start..start + buf.len()]);
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn seek(&mut self, offset: u64) {
        self.pos = offset;
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> u64 {
        self.map.len() as u64
    }

    fn prefetch(&self, offset: u64, len: u64) {
        self.advise(offset, len);
    }

    fn boxed_clone(&self) -> Box<dyn ByteStream> {
        Box::new(self.clone())
    }

    fn mapping(&self) -> Option<&Arc<Mmap>> {
        Some(&self.map)
    }
}
