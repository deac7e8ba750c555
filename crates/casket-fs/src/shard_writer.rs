use std::io::{self, Write};

use crossbeam_channel::{bounded, Receiver, Sender};

/// A cut piece of the written stream with its ordinal and byte offset.
pub struct Shard {
    pub data: Vec<u8>,
    pub index: u64,
    pub offset: u64,
}

/// Writer that cuts incoming bytes into block-size shards and hands each
/// one to a consumer over a bounded channel.
///
/// A shard is emitted every `block_size` bytes; the remainder (if any) is
/// emitted on [`ShardWriter::close`] as a final short shard. Once closed
/// the writer cannot be reused.
pub struct ShardWriter {
    block_size: u64,
    buf: Vec<u8>,
    index: u64,
    tx: Sender<Shard>,
}

impl ShardWriter {
    /// Create a writer and the receiving end of its shard stream.
    /// `readahead` bounds how many uncollected shards may be in flight.
    pub fn new(block_size: u64, readahead: usize) -> (Self, Receiver<Shard>) {
        let (tx, rx) = bounded(readahead.max(1));
        (
            Self {
                block_size,
                buf: Vec::with_capacity(block_size as usize),
                index: 0,
                tx,
            },
            rx,
        )
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let data = std::mem::replace(&mut self.buf, Vec::with_capacity(self.block_size as usize));
        let shard = Shard {
            data,
            index: self.index,
            offset: self.index * self.block_size,
        };
        self.index += 1;
        self.tx
            .send(shard)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "shard consumer is gone"))
    }

    /// Flush the remainder as a final short shard and close the stream.
    pub fn close(mut self) -> io::Result<()> {
        self.emit()
        // Dropping `tx` here closes the channel for the consumer.
    }
}

impl Write for ShardWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.block_size as usize - self.buf.len();
            let take = room.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == self.block_size as usize {
                self.emit()?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn collect(block_size: u64, chunks: &[&[u8]]) -> Vec<Shard> {
        let (mut wr, rx) = ShardWriter::new(block_size, 4);
        let chunks: Vec<Vec<u8>> = chunks.iter().map(|c| c.to_vec()).collect();
        let collector = thread::spawn(move || rx.iter().collect::<Vec<Shard>>());
        for chunk in &chunks {
            wr.write_all(chunk).unwrap();
        }
        wr.close().unwrap();
        collector.join().unwrap()
    }

    #[test]
    fn exact_multiple_produces_even_shards() {
        let shards = collect(4, &[b"abcdefgh"]);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].data, b"abcd");
        assert_eq!(shards[1].data, b"efgh");
        assert_eq!(shards[1].index, 1);
        assert_eq!(shards[1].offset, 4);
    }

    #[test]
    fn remainder_is_flushed_on_close() {
        let shards = collect(4, &[b"abcdefghij"]);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[2].data, b"ij");
    }

    #[test]
    fn writes_spanning_boundaries() {
        // Write sizes unaligned with the block size.
        let shards = collect(5, &[b"abc", b"defg", b"hi", b"jklmnop"]);
        let total: Vec<u8> = shards.iter().flat_map(|s| s.data.clone()).collect();
        assert_eq!(total, b"abcdefghijklmnop");
        assert!(shards[..shards.len() - 1].iter().all(|s| s.data.len() == 5));
    }

    #[test]
    fn empty_input_emits_nothing() {
        let shards = collect(4, &[]);
        assert!(shards.is_empty());
    }

    #[test]
    fn closed_consumer_surfaces_broken_pipe() {
        let (mut wr, rx) = ShardWriter::new(2, 1);
        drop(rx);
        let err = wr.write_all(b"abcd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
