use std::net::TcpListener;
use std::sync::Arc;

use casket_block::Block;
use casket_device::BlockDevice;
use casket_types::BlockId;

use crate::error::NetResult;
use crate::server::NetTransport;

/// Host-addressed block operations, local or remote.
pub trait Transport: Send + Sync {
    fn get_block(&self, host: &str, id: &BlockId) -> NetResult<Block>;
    fn set_block(&self, host: &str, blk: &Block) -> NetResult<BlockId>;
    fn block_exists(&self, host: &str, id: &BlockId) -> NetResult<bool>;
    fn remove_block(&self, host: &str, id: &BlockId) -> NetResult<()>;
}

impl Transport for NetTransport {
    fn get_block(&self, host: &str, id: &BlockId) -> NetResult<Block> {
        self.client().get_block(host, id)
    }

    fn set_block(&self, host: &str, blk: &Block) -> NetResult<BlockId> {
        self.client().set_block(host, blk)
    }

    fn block_exists(&self, host: &str, id: &BlockId) -> NetResult<bool> {
        self.client().block_exists(host, id)
    }

    fn remove_block(&self, host: &str, id: &BlockId) -> NetResult<()> {
        self.client().remove_block(host, id)
    }
}

/// Composite transport routing by host: operations addressed to the
/// configured local identity dispatch straight to the in-process device,
/// everything else goes over the network.
pub struct LocalNetTransport {
    host: String,
    local: Arc<BlockDevice>,
    remote: NetTransport,
}

impl LocalNetTransport {
    /// Build the composite and register the local device with the network
    /// transport so peers can reach it too.
    pub fn new(host: impl Into<String>, local: Arc<BlockDevice>, mut remote: NetTransport) -> Self {
        remote.register(Arc::clone(&local));
        Self {
            host: host.into(),
            local,
            remote,
        }
    }

    /// The configured local identity.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Start serving the local device to peers.
    pub fn start(&self, listener: TcpListener) -> NetResult<()> {
        self.remote.start(listener)
    }

    pub fn shutdown(&self) {
        self.remote.shutdown();
    }
}

impl Transport for LocalNetTransport {
    fn get_block(&self, host: &str, id: &BlockId) -> NetResult<Block> {
        if host == self.host {
            return Ok(self.local.get_block(id)?);
        }
        self.remote.get_block(host, id)
    }

    fn set_block(&self, host: &str, blk: &Block) -> NetResult<BlockId> {
        if host == self.host {
            return Ok(self.local.set_block(blk)?);
        }
        self.remote.set_block(host, blk)
    }

    fn block_exists(&self, host: &str, id: &BlockId) -> NetResult<bool> {
        if host == self.host {
            return Ok(self.local.block_exists(id));
        }
        self.remote.block_exists(host, id)
    }

    fn remove_block(&self, host: &str, id: &BlockId) -> NetResult<()> {
        if host == self.host {
            return Ok(self.local.remove_block(id)?);
        }
        self.remote.remove_block(host, id)
    }
}
