use std::io::Read;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use casket_block::{Block, BlockError, DataBlock, IndexBlock};
use casket_device::BlockDevice;
use casket_types::BlockId;

use crate::cancel::CancelToken;
use crate::error::{StreamError, StreamResult};

/// A fixed-size slice of the input stream with its 0-based ordinal and
/// byte offset.
struct Shard {
    data: Vec<u8>,
    index: u64,
    offset: u64,
}

/// Outcome of persisting one shard.
struct ShardResult {
    index: u64,
    id: BlockId,
    size: u64,
}

/// Cuts a byte stream into block-size shards, persists each as a Data
/// block in parallel, and produces the IndexBlock describing the stream.
///
/// One reader task cuts exact-size chunks (the last may be short) onto a
/// bounded channel; `workers` tasks persist them and report position-tagged
/// results, which the driver folds into the index regardless of completion
/// order.
pub struct StreamSharder<'a> {
    dev: &'a BlockDevice,
    workers: usize,
    idx: IndexBlock,
}

impl<'a> StreamSharder<'a> {
    pub fn new(dev: &'a BlockDevice, workers: usize) -> Self {
        Self {
            dev,
            workers: workers.max(1),
            idx: IndexBlock::new(dev.hasher()),
        }
    }

    /// Set the shard size. Takes effect only before [`StreamSharder::shard`]
    /// is called.
    pub fn set_block_size(&mut self, size: u64) {
        self.idx.set_block_size(size);
    }

    /// Shard the stream to completion, returning the populated IndexBlock.
    pub fn shard<R: Read + Send>(self, input: R) -> StreamResult<IndexBlock> {
        self.shard_with_cancel(input, &CancelToken::new())
    }

    /// Shard with cooperative cancellation. On cancel the reader aborts
    /// with [`StreamError::ReadCancelled`] and no index block is produced.
    pub fn shard_with_cancel<R: Read + Send>(
        mut self,
        input: R,
        cancel: &CancelToken,
    ) -> StreamResult<IndexBlock> {
        let block_size = self.idx.block_size();
        let workers = self.workers;
        let dev = self.dev;
        let idx = &mut self.idx;
        let (shard_tx, shard_rx) = bounded::<Shard>(workers * 2);
        let (result_tx, result_rx) = bounded::<StreamResult<ShardResult>>(workers * 2);

        let mut first_err: Option<StreamError> = None;

        thread::scope(|scope| {
            let reader = scope.spawn(move || read_shards(input, block_size, shard_tx, cancel));

            for _ in 0..workers {
                let shard_rx = shard_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || persist_shards(dev, shard_rx, result_tx, cancel));
            }
            // The driver holds no sender; the results channel closes when
            // the last worker exits.
            drop(shard_rx);
            drop(result_tx);

            for result in result_rx {
                match result {
                    Ok(res) => {
                        // Shard index 0 is position 1 in the index block.
                        idx.add_block(res.index + 1, res.id, res.size);
                    }
                    Err(err) => {
                        cancel.cancel();
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                    }
                }
            }

            if let Err(err) = reader.join().expect("reader thread panicked") {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        });

        match first_err {
            Some(err) => Err(err),
            None => {
                debug!(
                    file_size = self.idx.file_size(),
                    blocks = self.idx.child_count(),
                    "stream sharded"
                );
                Ok(self.idx)
            }
        }
    }
}

/// Reader task: cut exact `block_size` chunks and hand them downstream
/// with their 0-based index and byte offset.
fn read_shards<R: Read>(
    mut input: R,
    block_size: u64,
    shard_tx: Sender<Shard>,
    cancel: &CancelToken,
) -> StreamResult<()> {
    let mut buf = vec![0u8; block_size as usize];
    let mut index = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(StreamError::ReadCancelled);
        }

        let n = read_full(&mut input, &mut buf)?;
        if n == 0 {
            return Ok(());
        }

        let shard = Shard {
            data: buf[..n].to_vec(),
            index,
            offset: index * block_size,
        };
        if shard_tx.send(shard).is_err() {
            // Workers are gone; a cancel or error is already in flight.
            return Err(StreamError::ReadCancelled);
        }

        if (n as u64) < block_size {
            return Ok(());
        }
        index += 1;
    }
}

/// Worker task: materialize each shard as a Data block and persist it.
/// `BlockExists` is not an error; the existing id is reported.
fn persist_shards(
    dev: &BlockDevice,
    shard_rx: Receiver<Shard>,
    result_tx: Sender<StreamResult<ShardResult>>,
    cancel: &CancelToken,
) {
    for shard in shard_rx {
        if cancel.is_cancelled() {
            return;
        }

        let index = shard.index;
        let size = shard.data.len() as u64;
        debug!(index, offset = shard.offset, size, "persisting shard");

        let blk: Block = DataBlock::from_bytes(dev.hasher(), shard.data).into();
        let result = match dev.set_block(&blk) {
            Ok(id) => Ok(ShardResult { index, id, size }),
            Err(BlockError::BlockExists) => Ok(ShardResult {
                index,
                id: blk.id().expect("data blocks always carry an id"),
                size,
            }),
            Err(err) => Err(StreamError::from(err)),
        };

        let failed = result.is_err();
        if failed {
            cancel.cancel();
        }
        if result_tx.send(result).is_err() || failed {
            return;
        }
    }
}

/// Read until the buffer is full or the stream ends; returns bytes read.
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use casket_device::{FileRawDevice, MemoryIndex};
    use casket_types::HashKind;

    fn device() -> (tempfile::TempDir, BlockDevice) {
        let dir = tempfile::tempdir().unwrap();
        let raw = FileRawDevice::new(dir.path(), HashKind::Sha256).unwrap();
        (dir, BlockDevice::new(Arc::new(MemoryIndex::new()), raw))
    }

    #[test]
    fn three_even_shards() {
        let (_dir, dev) = device();
        let input = b"1234509876543223456plokijuhygqakvoekfk1234509876549823456";
        assert_eq!(input.len(), 57);

        let mut sharder = StreamSharder::new(&dev, 3);
        sharder.set_block_size(19);
        let idx = sharder.shard(&input[..]).unwrap();

        assert_eq!(idx.file_size(), 57);
        assert_eq!(idx.block_size(), 19);
        assert_eq!(idx.child_count(), 3);
        // 8 + 8 + 3 * 32 bytes of encoded body.
        assert_eq!(idx.encode_body().len(), 112);
    }

    #[test]
    fn short_final_shard() {
        let (_dir, dev) = device();
        let input = vec![0xAB; 100];
        let mut sharder = StreamSharder::new(&dev, 2);
        sharder.set_block_size(30);
        let idx = sharder.shard(&input[..]).unwrap();

        assert_eq!(idx.file_size(), 100);
        assert_eq!(idx.child_count(), 4); // 30 + 30 + 30 + 10
    }

    #[test]
    fn empty_stream_produces_empty_index() {
        let (_dir, dev) = device();
        let idx = StreamSharder::new(&dev, 2).shard(&[][..]).unwrap();
        assert_eq!(idx.file_size(), 0);
        assert_eq!(idx.child_count(), 0);
    }

    #[test]
    fn duplicate_shards_are_deduplicated() {
        let (_dir, dev) = device();
        // Four identical shards: one stored block, four index positions.
        let input = vec![7u8; 4 * 1024];
        let mut sharder = StreamSharder::new(&dev, 3);
        sharder.set_block_size(1024);
        let idx = sharder.shard(&input[..]).unwrap();

        assert_eq!(idx.child_count(), 4);
        let ids = idx.children();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(dev.stats().unwrap().data_blocks, 1);
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let (_dir, dev) = device();
        let mut sharder = StreamSharder::new(&dev, 0);
        sharder.set_block_size(16);
        let idx = sharder.shard(&[1u8; 40][..]).unwrap();
        assert_eq!(idx.child_count(), 3);
    }

    /// Reader that produces zeros forever.
    struct Endless;

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(0);
            Ok(buf.len())
        }
    }

    #[test]
    fn cancellation_aborts_promptly() {
        let (_dir, dev) = device();
        let cancel = CancelToken::new();

        let started = Instant::now();
        let err = thread::scope(|scope| {
            let token = cancel.clone();
            let handle = scope.spawn(move || {
                let mut sharder = StreamSharder::new(&dev, 2);
                sharder.set_block_size(1024);
                sharder.shard_with_cancel(Endless, &token)
            });
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
            handle.join().expect("sharder thread panicked")
        })
        .unwrap_err();

        assert!(matches!(err, StreamError::ReadCancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
