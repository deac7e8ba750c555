use std::collections::BTreeMap;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use casket_block::{Block, IndexBlock};
use casket_device::BlockDevice;
use casket_types::BlockId;

use crate::cancel::CancelToken;
use crate::error::{StreamError, StreamResult};

/// Reassembles the byte stream described by an IndexBlock, writing chunks
/// to a sink in strict position order.
///
/// One generator walks the children in ascending position; `workers` tasks
/// fetch bodies in parallel; a single sequencer buffers out-of-order
/// results and writes them as the next expected position arrives.
pub struct Assembler<'a> {
    dev: &'a BlockDevice,
    workers: usize,
    runtime: Option<Duration>,
}

impl<'a> Assembler<'a> {
    pub fn new(dev: &'a BlockDevice, workers: usize) -> Self {
        Self {
            dev,
            workers: workers.max(1),
            runtime: None,
        }
    }

    /// Wall-clock time of the last [`Assembler::assemble`] run.
    pub fn runtime(&self) -> Option<Duration> {
        self.runtime
    }

    /// Resolve a root id to its IndexBlock, failing with
    /// [`StreamError::NotIndexBlock`] for any other kind.
    pub fn set_root(&self, id: &BlockId) -> StreamResult<IndexBlock> {
        match self.dev.get_block(id)? {
            Block::Index(idx) => Ok(idx),
            _ => Err(StreamError::NotIndexBlock),
        }
    }

    /// Assemble the stream rooted at `id` into `out`. Returns the number
    /// of bytes written.
    pub fn assemble<W: Write>(&mut self, id: &BlockId, out: &mut W) -> StreamResult<u64> {
        self.assemble_with_cancel(id, out, &CancelToken::new())
    }

    /// Assemble with cooperative cancellation.
    pub fn assemble_with_cancel<W: Write>(
        &mut self,
        id: &BlockId,
        out: &mut W,
        cancel: &CancelToken,
    ) -> StreamResult<u64> {
        let start = Instant::now();
        let result = self.run(id, out, cancel);
        self.runtime = Some(start.elapsed());
        debug!(root = %id.short_hex(), elapsed = ?self.runtime, "assemble finished");
        result
    }

    fn run<W: Write>(
        &self,
        id: &BlockId,
        out: &mut W,
        cancel: &CancelToken,
    ) -> StreamResult<u64> {
        let root = self.set_root(id)?;
        let children = root.children();
        let dev = self.dev;
        let workers = self.workers;

        let (work_tx, work_rx) = bounded::<(u64, BlockId)>(workers * 2);
        let (result_tx, result_rx) = bounded::<StreamResult<(u64, Vec<u8>)>>(workers * 2);

        let mut first_err: Option<StreamError> = None;
        let mut written = 0u64;

        thread::scope(|scope| {
            let generator = scope.spawn(move || generate(children, work_tx, cancel));

            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || fetch_blocks(dev, work_rx, result_tx, cancel));
            }
            drop(work_rx);
            drop(result_tx);

            // Sequencer: write results in position order, buffering any
            // that complete early.
            let mut next = 0u64;
            let mut pending: BTreeMap<u64, Vec<u8>> = BTreeMap::new();

            for result in result_rx {
                match result {
                    Ok((index, data)) => {
                        if index == next {
                            if let Err(err) = write_chunk(out, &data) {
                                cancel.cancel();
                                if first_err.is_none() {
                                    first_err = Some(err);
                                }
                                continue;
                            }
                            written += data.len() as u64;
                            next += 1;
                            // Drain everything now in order.
                            while let Some(data) = pending.remove(&next) {
                                if let Err(err) = write_chunk(out, &data) {
                                    cancel.cancel();
                                    if first_err.is_none() {
                                        first_err = Some(err);
                                    }
                                    break;
                                }
                                written += data.len() as u64;
                                next += 1;
                            }
                        } else {
                            pending.insert(index, data);
                        }
                    }
                    Err(err) => {
                        cancel.cancel();
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                    }
                }
            }

            if let Err(err) = generator.join().expect("generator thread panicked") {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        });

        match first_err {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }
}

/// Generator task: feed `(index, id)` pairs downstream in position order.
fn generate(
    children: Vec<BlockId>,
    work_tx: Sender<(u64, BlockId)>,
    cancel: &CancelToken,
) -> StreamResult<()> {
    for (index, id) in children.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(StreamError::AssembleCancelled);
        }
        if work_tx.send((index as u64, id)).is_err() {
            return Err(StreamError::AssembleCancelled);
        }
    }
    Ok(())
}

/// Worker task: fetch each block and deliver its full body.
fn fetch_blocks(
    dev: &BlockDevice,
    work_rx: Receiver<(u64, BlockId)>,
    result_tx: Sender<StreamResult<(u64, Vec<u8>)>>,
    cancel: &CancelToken,
) {
    for (index, id) in work_rx {
        if cancel.is_cancelled() {
            return;
        }

        let result = dev
            .get_block(&id)
            .and_then(|blk| blk.read_body())
            .map(|data| (index, data))
            .map_err(StreamError::from);

        let failed = result.is_err();
        if failed {
            cancel.cancel();
        }
        if result_tx.send(result).is_err() || failed {
            return;
        }
    }
}

fn write_chunk<W: Write>(out: &mut W, data: &[u8]) -> StreamResult<()> {
    let n = out.write(data)?;
    if n != data.len() {
        return Err(StreamError::ShortWrite);
    }
    Ok(())
}
