//! Positional-read stream over a shared file handle.

use std::fs::File;
use std::sync::Arc;

use super::{check_range, ByteStream};
use crate::util::Result;

/// Cursor doing one positional read per request. Never zero-copy.
#[derive(Clone)]
pub struct PreadStream {
    file: Arc<File>,
    pos: u64,
    size: u64,
}

impl PreadStream {
    pub fn new(file: Arc<File>, size: u64) -> Self {
        Self { file, pos: 0, size }
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

impl ByteStream for PreadStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        check_range(self.pos, buf.len(), self.size)?;
        read_at(&self.file, buf, self.pos)?;
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
        self.size
    }

    fn boxed_clone(&self) -> Box<dyn ByteStream> {
        Box::new(self.clone())
    }
}
