use std::io::{Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use casket_types::{BlockHasher, BlockId, BlockType, BlockUri, HashKind};

use crate::error::{BlockError, BlockResult};

const STATE_IDLE: u8 = 0;
const STATE_READING: u8 = 1;
const STATE_WRITING: u8 = 2;

/// Bidirectional byte stream a block body can live on, typically a socket.
pub trait ByteStream: Read + Write + Send {}

impl<T: Read + Write + Send> ByteStream for T {}

struct Inner {
    stream: Box<dyn ByteStream>,
    hasher: Option<BlockHasher>,
    count: u64,
}

/// Block whose body is a bounded read or write over a live stream.
///
/// At most one reader or writer may be open at a time; the open state is a
/// single atomic cell and a second concurrent open fails with
/// [`BlockError::ReaderWriterOpen`]. Reads deliver exactly `size` bytes and
/// then EOF; closing either side caches the final id.
pub struct StreamedBlock {
    block_type: BlockType,
    uri: Option<BlockUri>,
    hash: HashKind,
    size: u64,
    state: AtomicU8,
    id: Mutex<Option<BlockId>>,
    inner: Mutex<Inner>,
}

impl StreamedBlock {
    /// Wrap a stream as a block of the given type and body size. If the
    /// URI path carries a hex id it becomes the block's preset id.
    pub fn new(
        block_type: BlockType,
        uri: Option<BlockUri>,
        hash: HashKind,
        stream: Box<dyn ByteStream>,
        size: u64,
    ) -> Self {
        let id = uri
            .as_ref()
            .and_then(|u| BlockId::from_hex(&u.path).ok());
        Self {
            block_type,
            uri,
            hash,
            size,
            state: AtomicU8::new(STATE_IDLE),
            id: Mutex::new(id),
            inner: Mutex::new(Inner {
                stream,
                hasher: None,
                count: 0,
            }),
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn uri(&self) -> Option<&BlockUri> {
        self.uri.as_ref()
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash
    }

    /// The preset or cached id, if any.
    pub fn id(&self) -> Option<BlockId> {
        *self.id.lock().expect("lock poisoned")
    }

    /// Open the bounded reader. Fails if a reader or writer is already
    /// open.
    pub fn reader(&self) -> BlockResult<StreamedReader<'_>> {
        self.state
            .compare_exchange(STATE_IDLE, STATE_READING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BlockError::ReaderWriterOpen)?;

        let mut guard = self.inner.lock().expect("lock poisoned");
        // Seed the type tag so a fully drained read finalizes to the true
        // content id. The tag itself is not in the stream.
        let mut hasher = self.hash.hasher();
        hasher.update(&[self.block_type.as_byte()]);
        guard.hasher = Some(hasher);
        guard.count = 0;

        Ok(StreamedReader {
            guard,
            size: self.size,
            state: &self.state,
            id: &self.id,
        })
    }

    /// Open the writer. The type tag is written to the stream and the hash
    /// before user bytes. Fails if a reader or writer is already open.
    pub fn writer(&self) -> BlockResult<StreamedWriter<'_>> {
        self.state
            .compare_exchange(STATE_IDLE, STATE_WRITING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BlockError::ReaderWriterOpen)?;

        let mut guard = self.inner.lock().expect("lock poisoned");
        let mut hasher = self.hash.hasher();
        hasher.update(&[self.block_type.as_byte()]);

        let tag = [self.block_type.as_byte()];
        if guard.stream.write_all(&tag).is_err() {
            drop(guard);
            self.state.store(STATE_IDLE, Ordering::Release);
            return Err(BlockError::WriteBlockType);
        }
        guard.hasher = Some(hasher);
        guard.count = 0;

        Ok(StreamedWriter {
            guard,
            state: &self.state,
            id: &self.id,
        })
    }
}

impl std::fmt::Debug for StreamedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedBlock")
            .field("type", &self.block_type)
            .field("size", &self.size)
            .field("id", &self.id())
            .finish()
    }
}

/// Bounded reader over a streamed block. Dropping it (or calling `close`)
/// caches the id and returns the block to idle.
pub struct StreamedReader<'a> {
    guard: MutexGuard<'a, Inner>,
    size: u64,
    state: &'a AtomicU8,
    id: &'a Mutex<Option<BlockId>>,
}

impl StreamedReader<'_> {
    /// Bytes delivered so far.
    pub fn count(&self) -> u64 {
        self.guard.count
    }

    /// Finish the read, caching the id and releasing the block.
    pub fn close(self) {}
}

impl Read for StreamedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.size - self.guard.count;
        if remaining == 0 {
            return Ok(0);
        }
        // Never overrun the body: the last chunk is truncated.
        let cap = (buf.len() as u64).min(remaining) as usize;
        let n = self.guard.stream.read(&mut buf[..cap])?;
        if let Some(hasher) = self.guard.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.guard.count += n as u64;
        Ok(n)
    }
}

impl Drop for StreamedReader<'_> {
    fn drop(&mut self) {
        if let Some(hasher) = self.guard.hasher.take() {
            let computed = hasher.finalize();
            let mut cell = self.id.lock().expect("lock poisoned");
            // A preset id from the URI wins over the read-side digest.
            if cell.is_none() {
                *cell = Some(computed);
            }
        }
        self.state.store(STATE_IDLE, Ordering::Release);
    }
}

/// Writer over a streamed block. Dropping it (or calling `close`) caches
/// the final id and returns the block to idle.
pub struct StreamedWriter<'a> {
    guard: MutexGuard<'a, Inner>,
    state: &'a AtomicU8,
    id: &'a Mutex<Option<BlockId>>,
}

impl StreamedWriter<'_> {
    /// Bytes written so far.
    pub fn count(&self) -> u64 {
        self.guard.count
    }

    /// Finish the write, caching the final id and releasing the block.
    pub fn close(self) {}
}

impl Write for StreamedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.guard.stream.write(buf)?;
        if let Some(hasher) = self.guard.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.guard.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.guard.stream.flush()
    }
}

impl Drop for StreamedWriter<'_> {
    fn drop(&mut self) {
        if let Some(hasher) = self.guard.hasher.take() {
            let computed = hasher.finalize();
            *self.id.lock().expect("lock poisoned") = Some(computed);
        }
        self.state.store(STATE_IDLE, Ordering::Release);
    }
}
