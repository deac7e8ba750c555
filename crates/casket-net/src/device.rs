use casket_block::Block;
use casket_types::{BlockId, HashKind};

use crate::client::{NetClient, NetClientOptions};
use crate::error::NetResult;

/// A block device backed by a single remote peer.
///
/// Exposes the same get/set/remove/exists shape as the local device so
/// callers can point either at a directory or at a host.
pub struct NetDevice {
    remote: String,
    client: NetClient,
}

impl NetDevice {
    pub fn new(remote: impl Into<String>, opts: NetClientOptions) -> Self {
        Self {
            remote: remote.into(),
            client: NetClient::new(opts),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn hasher(&self) -> HashKind {
        self.client.hasher()
    }

    pub fn set_block(&self, blk: &Block) -> NetResult<BlockId> {
        self.client.set_block(&self.remote, blk)
    }

    pub fn get_block(&self, id: &BlockId) -> NetResult<Block> {
        self.client.get_block(&self.remote, id)
    }

    pub fn remove_block(&self, id: &BlockId) -> NetResult<()> {
        self.client.remove_block(&self.remote, id)
    }

    pub fn block_exists(&self, id: &BlockId) -> NetResult<bool> {
        self.client.block_exists(&self.remote, id)
    }

    /// Shut the underlying client pool down.
    pub fn close(&self) {
        self.client.shutdown();
    }
}
