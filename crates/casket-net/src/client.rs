use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use casket_block::{
    Block, BlockError, DataBlock, IndexBlock, MetaBlock, StreamedBlock, TreeBlock,
};
use casket_device::copy_exact;
use casket_types::{BlockId, BlockType, BlockUri, HashKind};

use crate::error::{NetError, NetResult};
use crate::pool::OutboundPool;
use crate::protocol::{
    read_block_type_and_size, read_response_header, write_block_type_and_size, write_request, Op,
};

/// Client tuning knobs. Both peers must share the hash kind; its digest
/// length fixes the request frame size.
#[derive(Clone, Copy, Debug)]
pub struct NetClientOptions {
    pub dial_timeout: Duration,
    pub max_idle: Duration,
    pub reap_interval: Duration,
    pub hash: HashKind,
}

impl Default for NetClientOptions {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(3),
            max_idle: Duration::from_secs(3 * 60),
            reap_interval: Duration::from_secs(30),
            hash: HashKind::default(),
        }
    }
}

/// Network client for remote block operations.
///
/// Requests on one connection are strictly serialized; connections are
/// pooled per host and reaped when idle.
pub struct NetClient {
    pool: Arc<OutboundPool>,
    hash: HashKind,
}

impl NetClient {
    pub fn new(opts: NetClientOptions) -> Self {
        let pool = Arc::new(OutboundPool::new(opts.dial_timeout, opts.max_idle));
        OutboundPool::start_reaper(Arc::clone(&pool), opts.reap_interval);
        Self {
            pool,
            hash: opts.hash,
        }
    }

    pub fn hasher(&self) -> HashKind {
        self.hash
    }

    /// Ask `host` whether it has a block.
    pub fn block_exists(&self, host: &str, id: &BlockId) -> NetResult<bool> {
        let mut conn = self.pool.get(host)?;

        if let Err(err) = write_request(&mut conn.stream, Op::Exists, id) {
            return Err(err); // dropping the conn closes it
        }
        if let Err(err) = read_response_header(&mut conn.stream) {
            // A typed failure leaves the stream at a request boundary.
            self.pool.checkin(conn);
            return Err(err);
        }

        let mut flag = [0u8; 1];
        conn.stream.read_exact(&mut flag)?;
        self.pool.checkin(conn);
        Ok(flag[0] == 1)
    }

    /// Fetch a block from `host`. The body arrives as
    /// `type ‖ size ‖ bytes`; Data bodies are read through a bounded
    /// streamed block, structured bodies are decoded from their canonical
    /// encoding.
    pub fn get_block(&self, host: &str, id: &BlockId) -> NetResult<Block> {
        let mut conn = self.pool.get(host)?;

        write_request(&mut conn.stream, Op::Get, id)?;
        if let Err(err) = read_response_header(&mut conn.stream) {
            self.pool.checkin(conn);
            return Err(err);
        }

        let (block_type, size) = read_block_type_and_size(&mut conn.stream)?;
        debug!(host, id = %id.short_hex(), kind = %block_type, size, "receiving block");

        let blk = match block_type {
            BlockType::Data => {
                let uri = BlockUri::tcp(host, id.to_hex());
                let stream = conn.stream.try_clone()?;
                let remote =
                    StreamedBlock::new(block_type, Some(uri), self.hash, Box::new(stream), size);
                let mut body = Vec::with_capacity(size as usize);
                {
                    let mut rd = remote.reader().map_err(NetError::Block)?;
                    rd.read_to_end(&mut body)?;
                }
                if body.len() as u64 != size {
                    return Err(BlockError::IncompleteRead.into());
                }
                DataBlock::from_bytes(self.hash, body).into()
            }
            BlockType::Index | BlockType::Tree | BlockType::Meta => {
                let mut body = vec![0u8; size as usize];
                conn.stream.read_exact(&mut body)?;
                decode_structured(self.hash, block_type, &body)?
            }
        };

        self.pool.checkin(conn);
        Ok(blk)
    }

    /// Push a block to `host`. The server acks, receives
    /// `type ‖ size ‖ body`, and confirms with the stored id. An already
    /// present block fails with [`BlockError::BlockExists`] before any
    /// body bytes move.
    pub fn set_block(&self, host: &str, blk: &Block) -> NetResult<BlockId> {
        let id = blk.id().ok_or(BlockError::InvalidBlock)?;
        let mut conn = self.pool.get(host)?;

        write_request(&mut conn.stream, Op::Set, &id)?;
        if let Err(err) = read_response_header(&mut conn.stream) {
            self.pool.checkin(conn);
            return Err(err);
        }

        write_block_type_and_size(&mut conn.stream, blk.block_type(), blk.size())?;
        let mut body = blk.reader()?;
        copy_exact(&mut conn.stream, &mut body, blk.size())?;
        drop(body);

        read_response_header(&mut conn.stream)?;
        let mut confirmed = [0u8; BlockId::LEN];
        conn.stream.read_exact(&mut confirmed)?;
        self.pool.checkin(conn);

        let confirmed = BlockId::from_digest(confirmed);
        if confirmed != id {
            return Err(NetError::IdMismatch {
                sent: id.to_hex(),
                confirmed: confirmed.to_hex(),
            });
        }
        debug!(host, id = %id.short_hex(), "block pushed");
        Ok(confirmed)
    }

    /// Remove a block on `host`.
    pub fn remove_block(&self, host: &str, id: &BlockId) -> NetResult<()> {
        let mut conn = self.pool.get(host)?;

        write_request(&mut conn.stream, Op::Remove, id)?;
        let result = read_response_header(&mut conn.stream);
        self.pool.checkin(conn);
        result
    }

    /// Close all pooled connections; in-flight ones close on checkin.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &OutboundPool {
        &self.pool
    }
}

/// Decode an Index/Tree/Meta body received off the wire.
fn decode_structured(hash: HashKind, block_type: BlockType, body: &[u8]) -> NetResult<Block> {
    Ok(match block_type {
        BlockType::Index => IndexBlock::decode_body(hash, body)?.into(),
        BlockType::Tree => TreeBlock::decode_body(hash, body)?.into(),
        BlockType::Meta => MetaBlock::decode_body(hash, body)?.into(),
        BlockType::Data => return Err(BlockError::InvalidBlockType.into()),
    })
}
