//! Binary wire protocol and transports for remote block access.
//!
//! Every request leads with a 2-byte `{op, status}` header and a
//! fixed-length hash id; failures come back as length-prefixed error
//! frames whose canonical messages parse back to typed errors. The
//! [`NetClient`] pools outbound connections per host; the [`NetTransport`]
//! serves a registered [`casket_device::BlockDevice`] with one handler
//! task per connection. [`LocalNetTransport`] routes host-addressed
//! operations to the in-process device when the host matches the local
//! identity.

pub mod client;
pub mod device;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{NetClient, NetClientOptions};
pub use device::NetDevice;
pub use error::{NetError, NetResult};
pub use pool::{OutboundPool, PooledConn};
pub use protocol::{Header, Op, HEADER_SIZE, STATUS_FAIL, STATUS_OK};
pub use server::NetTransport;
pub use transport::{LocalNetTransport, Transport};

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    use rand::RngCore;

    use casket_block::{Block, BlockError, DataBlock, TreeBlock, TreeNode};
    use casket_device::{BlockDevice, FileRawDevice, MemoryIndex};
    use casket_types::{BlockId, BlockType, HashKind};

    struct Peer {
        _dir: tempfile::TempDir,
        dev: Arc<BlockDevice>,
        transport: NetTransport,
        addr: String,
    }

    fn options() -> NetClientOptions {
        NetClientOptions {
            dial_timeout: Duration::from_secs(1),
            max_idle: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
            hash: HashKind::Sha256,
        }
    }

    fn peer() -> Peer {
        let dir = tempfile::tempdir().unwrap();
        let raw = FileRawDevice::new(dir.path(), HashKind::Sha256).unwrap();
        let dev = Arc::new(BlockDevice::new(Arc::new(MemoryIndex::new()), raw));

        let mut transport = NetTransport::new(options());
        transport.register(Arc::clone(&dev));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        transport.start(listener).unwrap();

        Peer {
            _dir: dir,
            dev,
            transport,
            addr,
        }
    }

    fn data(bytes: Vec<u8>) -> Block {
        DataBlock::from_bytes(HashKind::Sha256, bytes).into()
    }

    #[test]
    fn remote_set_then_get() {
        let server = peer();
        let client = NetClient::new(options());

        let blk = data(b"over the wire".to_vec());
        let id = client.set_block(&server.addr, &blk).unwrap();
        assert_eq!(Some(id), blk.id());
        assert!(server.dev.block_exists(&id));

        let got = client.get_block(&server.addr, &id).unwrap();
        assert_eq!(got.id(), Some(id));
        assert_eq!(got.read_body().unwrap(), b"over the wire");
        client.shutdown();
    }

    #[test]
    fn remote_get_matches_local_write() {
        let server = peer();
        // Block written directly to the server's device.
        let blk = data(vec![0x5A; 10_000]);
        let id = server.dev.set_block(&blk).unwrap();

        let client = NetClient::new(options());
        let got = client.get_block(&server.addr, &id).unwrap();
        assert_eq!(got.id(), Some(id));
        assert_eq!(got.size(), 10_000);
        assert_eq!(got.read_body().unwrap(), vec![0x5A; 10_000]);
    }

    #[test]
    fn duplicate_remote_set_is_block_exists() {
        let server = peer();
        let client = NetClient::new(options());

        let blk = data(b"only once".to_vec());
        client.set_block(&server.addr, &blk).unwrap();
        let err = client.set_block(&server.addr, &blk).unwrap_err();
        assert!(matches!(err, NetError::Block(BlockError::BlockExists)));
    }

    #[test]
    fn get_missing_is_typed_not_found() {
        let server = peer();
        let client = NetClient::new(options());
        let err = client
            .get_block(&server.addr, &BlockId::from_digest([3; 32]))
            .unwrap_err();
        assert!(matches!(err, NetError::Block(BlockError::BlockNotFound)));
    }

    #[test]
    fn exists_and_remove() {
        let server = peer();
        let client = NetClient::new(options());

        let blk = data(b"short lived".to_vec());
        let id = client.set_block(&server.addr, &blk).unwrap();
        assert!(client.block_exists(&server.addr, &id).unwrap());

        client.remove_block(&server.addr, &id).unwrap();
        assert!(!client.block_exists(&server.addr, &id).unwrap());

        let err = client.remove_block(&server.addr, &id).unwrap_err();
        assert!(matches!(err, NetError::Block(BlockError::BlockNotFound)));
    }

    #[test]
    fn requests_are_serialized_on_one_connection() {
        let server = peer();
        let client = NetClient::new(options());

        // Several sequential operations; the pool should keep reusing a
        // single live connection.
        for i in 0..10u8 {
            let blk = data(vec![i; 64 + i as usize]);
            let id = client.set_block(&server.addr, &blk).unwrap();
            assert!(client.block_exists(&server.addr, &id).unwrap());
            let got = client.get_block(&server.addr, &id).unwrap();
            assert_eq!(got.read_body().unwrap(), vec![i; 64 + i as usize]);
        }
        assert_eq!(client.pool().idle_count(&server.addr), 1);
    }

    #[test]
    fn large_block_streams_through() {
        let server = peer();
        let client = NetClient::new(options());

        let mut body = vec![0u8; 1 << 20];
        rand::thread_rng().fill_bytes(&mut body);
        let blk = data(body.clone());

        let id = client.set_block(&server.addr, &blk).unwrap();
        // Above the inline threshold: the server's raw backend holds it.
        assert_eq!(server.dev.raw().count().unwrap(), 1);

        let got = client.get_block(&server.addr, &id).unwrap();
        assert_eq!(got.read_body().unwrap(), body);
    }

    #[test]
    fn tree_block_travels_as_canonical_encoding() {
        let server = peer();
        let client = NetClient::new(options());

        let mut tree = TreeBlock::new(HashKind::Sha256);
        tree.add_nodes([
            TreeNode::file("a", HashKind::Sha256.block_id(BlockType::Data, b"a")),
            TreeNode::dir("b", HashKind::Sha256.block_id(BlockType::Tree, b"b")),
        ]);
        let want = tree.id();

        let id = client.set_block(&server.addr, &tree.into()).unwrap();
        assert_eq!(id, want);

        match client.get_block(&server.addr, &id).unwrap() {
            Block::Tree(got) => {
                assert_eq!(got.id(), want);
                assert_eq!(got.node_count(), 2);
            }
            other => panic!("expected tree, got {:?}", other.block_type()),
        }
    }

    #[test]
    fn two_peer_replication() {
        let a = peer();
        let b = peer();
        let client = NetClient::new(options());

        // Write straight into B, fetch from B, push into A.
        let blk = data(b"replicate me".to_vec());
        let id = b.dev.set_block(&blk).unwrap();

        let fetched = client.get_block(&b.addr, &id).unwrap();
        assert_eq!(fetched.id(), Some(id));
        assert_eq!(fetched.read_body().unwrap(), b"replicate me");

        let stored = client.set_block(&a.addr, &fetched).unwrap();
        assert_eq!(stored, id);
        assert!(a.dev.block_exists(&id));

        let err = client.set_block(&a.addr, &fetched).unwrap_err();
        assert!(matches!(err, NetError::Block(BlockError::BlockExists)));
    }

    #[test]
    fn local_transport_routes_by_host() {
        let dir = tempfile::tempdir().unwrap();
        let raw = FileRawDevice::new(dir.path(), HashKind::Sha256).unwrap();
        let dev = Arc::new(BlockDevice::new(Arc::new(MemoryIndex::new()), raw));

        let remote_peer = peer();
        let transport =
            LocalNetTransport::new("node-a", Arc::clone(&dev), NetTransport::new(options()));

        // Local host goes straight to the device.
        let blk = data(b"stays local".to_vec());
        let id = transport.set_block("node-a", &blk).unwrap();
        assert!(dev.block_exists(&id));
        assert!(transport.block_exists("node-a", &id).unwrap());
        assert!(!remote_peer.dev.block_exists(&id));

        // Any other host goes over the wire.
        let blk = data(b"goes remote".to_vec());
        let id = transport.set_block(&remote_peer.addr, &blk).unwrap();
        assert!(remote_peer.dev.block_exists(&id));
        assert!(!dev.block_exists(&id));

        transport.shutdown();
    }

    #[test]
    fn net_device_pins_one_remote() {
        let server = peer();
        let ndev = NetDevice::new(server.addr.clone(), options());

        let blk = data(b"via net device".to_vec());
        let id = ndev.set_block(&blk).unwrap();
        assert!(ndev.block_exists(&id).unwrap());
        let got = ndev.get_block(&id).unwrap();
        assert_eq!(got.read_body().unwrap(), b"via net device");
        ndev.remove_block(&id).unwrap();
        assert!(!ndev.block_exists(&id).unwrap());
        ndev.close();
    }

    #[test]
    fn shutdown_client_rejects_operations() {
        let server = peer();
        let client = NetClient::new(options());
        client.shutdown();
        let err = client
            .block_exists(&server.addr, &BlockId::from_digest([1; 32]))
            .unwrap_err();
        assert!(matches!(err, NetError::TransportShutdown));
        server.transport.shutdown();
    }
}
