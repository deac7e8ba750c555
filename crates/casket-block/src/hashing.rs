use std::io::{self, Read, Write};

use casket_types::{BlockHasher, BlockId, HashKind};

/// Tee-style reader that hashes every byte actually returned from the
/// underlying reader and keeps a running count.
pub struct HashingReader<R> {
    inner: R,
    hasher: BlockHasher,
    count: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(hash: HashKind, inner: R) -> Self {
        Self {
            inner,
            hasher: hash.hasher(),
            count: 0,
        }
    }

    /// Feed bytes into the hash without reading them from the underlying
    /// stream. Used to seed the leading type tag.
    pub fn absorb(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Total bytes read so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Finish the hash, returning the digest, the byte count, and the
    /// underlying reader. Valid once the upstream is drained.
    pub fn finalize(self) -> (BlockId, u64, R) {
        (self.hasher.finalize(), self.count, self.inner)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

/// Tee-style writer that forwards every byte to the underlying writer and
/// the hash, keeping a running count.
pub struct HashingWriter<W> {
    inner: W,
    hasher: BlockHasher,
    count: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(hash: HashKind, inner: W) -> Self {
        Self {
            inner,
            hasher: hash.hasher(),
            count: 0,
        }
    }

    /// Feed bytes into the hash without writing them to the underlying
    /// writer.
    pub fn absorb(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Total bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Finish the hash, returning the digest, the byte count, and the
    /// underlying writer. Valid only after the last write.
    pub fn finalize(self) -> (BlockId, u64, W) {
        (self.hasher.finalize(), self.count, self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
