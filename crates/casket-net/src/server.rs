use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use casket_block::{Block, StreamedBlock};
use casket_device::{copy_exact, BlockDevice};
use casket_types::{BlockId, BlockUri, HashKind};

use crate::client::{NetClient, NetClientOptions};
use crate::error::{NetError, NetResult};
use crate::protocol::{
    read_block_type_and_size, read_request, write_block_type_and_size, write_frame, write_header,
    Header, Op, STATUS_FAIL, STATUS_OK,
};

/// Outcome of serving one request on a connection.
enum Served {
    /// Request handled; keep reading from the connection.
    Done,
    /// Recoverable failure; send an error frame and keep the connection.
    Fail(NetError),
    /// The connection can no longer be trusted; drop it.
    Disconnect(NetError),
}

/// Network transport: the client side plus a TCP server dispatching block
/// operations to a registered local device.
///
/// One accept task hands each connection to its own handler task, which
/// serves a sequence of requests until EOF or a fatal protocol error.
pub struct NetTransport {
    client: NetClient,
    dev: Option<Arc<BlockDevice>>,
    hash: HashKind,
    shutdown: Arc<AtomicBool>,
}

impl NetTransport {
    pub fn new(opts: NetClientOptions) -> Self {
        Self {
            client: NetClient::new(opts),
            dev: None,
            hash: opts.hash,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn client(&self) -> &NetClient {
        &self.client
    }

    pub fn hasher(&self) -> HashKind {
        self.hash
    }

    /// Register the local block device served to peers. Must be called
    /// before [`NetTransport::start`].
    pub fn register(&mut self, dev: Arc<BlockDevice>) {
        self.dev = Some(dev);
    }

    /// Start accepting connections on the listener.
    pub fn start(&self, listener: TcpListener) -> NetResult<()> {
        let dev = self.dev.clone().ok_or(NetError::DeviceNotRegistered)?;
        let hash = self.hash;
        let shutdown = Arc::clone(&self.shutdown);
        let addr = listener.local_addr()?;

        thread::Builder::new()
            .name("casket-accept".into())
            .spawn(move || {
                info!(%addr, "transport listening");
                loop {
                    if shutdown.load(Ordering::Acquire) {
                        info!("transport shutting down");
                        return;
                    }
                    let (conn, peer) = match listener.accept() {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            if shutdown.load(Ordering::Acquire) {
                                return;
                            }
                            error!(%err, "accept failed");
                            continue;
                        }
                    };
                    debug!(%peer, "connection accepted");

                    let dev = Arc::clone(&dev);
                    let handler = thread::Builder::new()
                        .name("casket-conn".into())
                        .spawn(move || handle_conn(conn, dev, hash));
                    if let Err(err) = handler {
                        error!(%err, "failed to spawn connection handler");
                    }
                }
            })?;
        Ok(())
    }

    /// Stop taking new connections and shut the client pool down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.client.shutdown();
    }
}

/// Serve requests on one connection until EOF or a fatal error.
fn handle_conn(mut conn: TcpStream, dev: Arc<BlockDevice>, hash: HashKind) {
    let _ = crate::pool::setup_conn(&conn);
    let peer = conn
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".into());

    loop {
        let (op, id) = match read_request(&mut conn) {
            Ok(request) => request,
            Err(NetError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!(peer, "client disconnected");
                return;
            }
            Err(err) => {
                error!(peer, %err, "reading request failed");
                return;
            }
        };
        debug!(peer, ?op, id = %id.short_hex(), "request");

        let served = match op {
            Op::Get => serve_get(&mut conn, &dev, &id),
            Op::Exists => serve_exists(&mut conn, &dev, &id),
            Op::Set => serve_set(&mut conn, &dev, hash, &peer, &id),
            Op::Remove => serve_remove(&mut conn, &dev, &id),
        };

        match served {
            Served::Done => {}
            Served::Disconnect(err) => {
                error!(peer, %err, "disconnecting client");
                return;
            }
            Served::Fail(err) => {
                debug!(peer, ?op, %err, "request failed");
                let frame = write_frame(
                    &mut conn,
                    Header::new(op, STATUS_FAIL),
                    err.to_string().as_bytes(),
                );
                if let Err(err) = frame {
                    error!(peer, %err, "failed to write error frame");
                    return;
                }
            }
        }
    }
}

fn serve_get(conn: &mut TcpStream, dev: &BlockDevice, id: &BlockId) -> Served {
    let blk = match dev.get_block(id) {
        Ok(blk) => blk,
        Err(err) => return Served::Fail(err.into()),
    };

    if let Err(err) = write_header(conn, Header::new(Op::Get, STATUS_OK)) {
        return Served::Disconnect(err);
    }
    if let Err(err) = write_block_type_and_size(conn, blk.block_type(), blk.size()) {
        return Served::Disconnect(err);
    }

    let mut body = match blk.reader() {
        Ok(body) => body,
        Err(err) => return Served::Disconnect(err.into()),
    };
    if let Err(err) = copy_exact(conn, &mut body, blk.size()) {
        return Served::Disconnect(err.into());
    }
    Served::Done
}

fn serve_exists(conn: &mut TcpStream, dev: &BlockDevice, id: &BlockId) -> Served {
    let exists = dev.block_exists(id);
    if let Err(err) = write_header(conn, Header::new(Op::Exists, STATUS_OK)) {
        return Served::Disconnect(err);
    }
    if let Err(err) = conn_write_all(conn, &[u8::from(exists)]) {
        return Served::Disconnect(err);
    }
    Served::Done
}

fn serve_set(
    conn: &mut TcpStream,
    dev: &BlockDevice,
    hash: HashKind,
    peer: &str,
    id: &BlockId,
) -> Served {
    if dev.block_exists(id) {
        return Served::Fail(casket_block::BlockError::BlockExists.into());
    }

    // Ack that the body may be sent.
    if let Err(err) = write_header(conn, Header::new(Op::Set, STATUS_OK)) {
        return Served::Disconnect(err);
    }

    let (block_type, size) = match read_block_type_and_size(conn) {
        Ok(prefix) => prefix,
        Err(err) => return Served::Disconnect(err),
    };

    let stream = match conn.try_clone() {
        Ok(stream) => stream,
        Err(err) => return Served::Disconnect(err.into()),
    };
    let uri = BlockUri::tcp(peer, id.to_hex());
    let remote = StreamedBlock::new(block_type, Some(uri), hash, Box::new(stream), size);

    let stored = match dev.set_block(&Block::Streamed(remote)) {
        Ok(stored) => stored,
        Err(err) => return Served::Fail(err.into()),
    };
    debug!(peer, id = %stored.short_hex(), size, "block stored");

    if let Err(err) = write_header(conn, Header::new(Op::Set, STATUS_OK)) {
        return Served::Disconnect(err);
    }
    if let Err(err) = conn_write_all(conn, stored.as_bytes()) {
        return Served::Disconnect(err);
    }
    Served::Done
}

fn serve_remove(conn: &mut TcpStream, dev: &BlockDevice, id: &BlockId) -> Served {
    if let Err(err) = dev.remove_block(id) {
        return Served::Fail(err.into());
    }
    if let Err(err) = write_header(conn, Header::new(Op::Remove, STATUS_OK)) {
        return Served::Disconnect(err);
    }
    Served::Done
}

fn conn_write_all(conn: &mut TcpStream, bytes: &[u8]) -> NetResult<()> {
    use std::io::Write;
    conn.write_all(bytes)?;
    Ok(())
}
