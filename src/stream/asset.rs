//! Generic asset stream.
//!
//! An [`Asset`] is anything that can report its size and read at an offset:
//! an archive member, a network blob already fetched, an in-memory buffer.
//! Resolving assets by name is the caller's business.

use std::sync::Arc;

use super::{check_range, ByteStream};
use crate::util::{Error, Result};

/// Already-open byte source.
pub trait Asset: Send + Sync {
    fn size(&self) -> u64;
    /// Read up to `buf.len()` bytes at `offset`, returning the count read.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

/// Asset over an owned byte buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryAsset {
    bytes: Arc<[u8]>,
}

impl MemoryAsset {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Asset for MemoryAsset {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let start = usize::try_from(offset).map_err(|_| Error::UnexpectedEof(offset))?;
        let avail = self.bytes.get(start..).unwrap_or(&[]);
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        Ok(n)
    }
}

/// Cursor over an [`Asset`]. Never zero-copy.
#[derive(Clone)]
pub struct AssetStream {
    asset: Arc<dyn Asset>,
    pos: u64,
}

impl AssetStream {
    pub fn new(asset: Arc<dyn Asset>) -> Self {
        Self { asset, pos: 0 }
    }
}

impl ByteStream for AssetStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.pos, buf.len(), self.asset.size())?;
        let mut done = 0;
        while done < buf.len() {
            let n = self.asset.read_at(&mut buf[done..], self.pos + done as u64)?;
            if n == 0 {
                return Err(Error::UnexpectedEof(self.pos + done as u64));
            }
            done += n;
        }
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
        self.asset.size()
    }

    fn boxed_clone(&self) -> Box<dyn ByteStream> {
        Box::new(self.clone())
    }
}
