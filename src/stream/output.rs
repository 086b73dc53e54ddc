//! Buffered output with a background writer thread.
//!
//! The producer fills fixed-size buffers; full buffers are handed to a
//! dedicated thread that writes them at their file offsets and hands them
//! back. A small pool bounds memory: the producer only blocks when every
//! buffer is waiting to be written.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use tracing::trace;

use crate::util::{Error, Result};

/// Capacity of each buffer.
pub const BUFFER_CAP: usize = 512 * 1024;
/// Total number of buffers, including the one being filled.
pub const NUM_BUFFERS: usize = 8;

struct WriteOp {
    buf: Vec<u8>,
    pos: u64,
}

/// Seekable write sink backed by a background writer.
pub struct BufferedOutput {
    /// Write head. Always inside the current buffer's region.
    file_pos: u64,
    /// File offset of the current buffer's first byte.
    buffer_pos: u64,
    buffer: Vec<u8>,
    free: Vec<Vec<u8>>,
    in_flight: usize,
    failed: bool,
    ops_tx: Option<Sender<WriteOp>>,
    done_rx: Receiver<Result<Vec<u8>>>,
    worker: Option<JoinHandle<File>>,
}

impl BufferedOutput {
    /// Start a writer over `file`. Positions are absolute file offsets.
    pub fn new(file: File) -> Result<Self> {
        let (ops_tx, ops_rx) = channel::<WriteOp>();
        let (done_tx, done_rx) = channel::<Result<Vec<u8>>>();
        let worker = thread::Builder::new()
            .name("usdc-writer".into())
            .spawn(move || writer_loop(file, ops_rx, done_tx))?;
        Ok(Self {
            file_pos: 0,
            buffer_pos: 0,
            buffer: Vec::with_capacity(BUFFER_CAP),
            free: Vec::new(),
            in_flight: 0,
            failed: false,
            ops_tx: Some(ops_tx),
            done_rx,
            worker: Some(worker),
        })
    }

    #[inline]
    pub fn tell(&self) -> u64 {
        self.file_pos
    }

    /// Move the write head. Seeks inside the current buffer are free.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset >= self.buffer_pos && offset <= self.buffer_pos + self.buffer.len() as u64 {
            self.file_pos = offset;
        } else {
            self.flush_buffer()?;
            self.buffer_pos = offset;
            self.file_pos = offset;
        }
        Ok(())
    }

    /// Seek forward to a multiple of `alignment` (a power of two).
    pub fn align(&mut self, alignment: u64) -> Result<u64> {
        debug_assert!(alignment.is_power_of_two());
        let aligned = (self.file_pos + alignment - 1) & !(alignment - 1);
        self.seek(aligned)?;
        Ok(aligned)
    }

    /// Write bytes at the head, flushing full buffers as they fill.
    pub fn put(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.check_failed()?;
        while !bytes.is_empty() {
            let available = BUFFER_CAP - (self.file_pos - self.buffer_pos) as usize;
            let n = available.min(bytes.len());
            self.write_to_buffer(&bytes[..n]);
            bytes = &bytes[n..];
            if n == available {
                self.flush_buffer()?;
            }
        }
        Ok(())
    }

    /// Queue the current buffer and wait for every pending write.
    pub fn flush_all(&mut self) -> Result<()> {
        self.flush_buffer()?;
        while self.in_flight > 0 {
            let returned = self
                .done_rx
                .recv()
                .map_err(|_| Error::WriteFailed("writer thread exited".into()))?;
            self.accept(returned)?;
        }
        Ok(())
    }

    /// Flush everything, stop the writer and hand back the file.
    pub fn finish(mut self) -> Result<File> {
        self.flush_all()?;
        self.ops_tx.take();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| Error::WriteFailed("writer already finished".into()))?;
        worker
            .join()
            .map_err(|_| Error::WriteFailed("writer thread panicked".into()))
    }

    fn check_failed(&self) -> Result<()> {
        if self.failed {
            return Err(Error::WriteFailed("an earlier background write failed".into()));
        }
        Ok(())
    }

    fn write_to_buffer(&mut self, bytes: &[u8]) {
        let start = (self.file_pos - self.buffer_pos) as usize;
        let end = start + bytes.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(bytes);
        self.file_pos += bytes.len() as u64;
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            let next = self.next_free_buffer()?;
            let buf = std::mem::replace(&mut self.buffer, next);
            trace!("queueing {} bytes at offset {}", buf.len(), self.buffer_pos);
            let tx = self
                .ops_tx
                .as_ref()
                .ok_or_else(|| Error::WriteFailed("writer already finished".into()))?;
            tx.send(WriteOp { buf, pos: self.buffer_pos })
                .map_err(|_| Error::WriteFailed("writer thread exited".into()))?;
            self.in_flight += 1;
        }
        self.buffer_pos = self.file_pos;
        Ok(())
    }

    fn next_free_buffer(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.done_rx.try_recv() {
                Ok(returned) => self.accept(returned)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(Error::WriteFailed("writer thread exited".into()));
                }
            }
        }
        if let Some(buf) = self.free.pop() {
            return Ok(buf);
        }
        // The buffer being queued plus every in-flight one.
        if self.in_flight + 2 <= NUM_BUFFERS {
            return Ok(Vec::with_capacity(BUFFER_CAP));
        }
        let returned = self
            .done_rx
            .recv()
            .map_err(|_| Error::WriteFailed("writer thread exited".into()))?;
        self.accept(returned)?;
        self.free
            .pop()
            .ok_or_else(|| Error::WriteFailed("no free output buffer".into()))
    }

    fn accept(&mut self, returned: Result<Vec<u8>>) -> Result<()> {
        self.in_flight -= 1;
        match returned {
            Ok(buf) => {
                self.free.push(buf);
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

fn writer_loop(mut file: File, ops: Receiver<WriteOp>, done: Sender<Result<Vec<u8>>>) -> File {
    let mut failed = false;
    while let Ok(mut op) = ops.recv() {
        let result = if failed {
            Err(Error::WriteFailed("skipped after an earlier failure".into()))
        } else {
            match write_at(&mut file, &op.buf, op.pos) {
                Ok(()) => {
                    op.buf.clear();
                    Ok(op.buf)
                }
                Err(e) => {
                    failed = true;
                    Err(Error::Io(e))
                }
            }
        };
        if done.send(result).is_err() {
            break;
        }
    }
    file
}

fn write_at(file: &mut File, bytes: &[u8], pos: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(bytes)
}

impl Write for BufferedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_all().map_err(io::Error::other)
    }
}

impl Drop for BufferedOutput {
    fn drop(&mut self) {
        self.ops_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
