use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use socket2::SockRef;
use tracing::{debug, warn};

use crate::error::{NetError, NetResult};

/// Apply the transport socket options to a dialed or accepted stream:
/// no-delay plus keep-alive.
pub(crate) fn setup_conn(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)
}

/// A pooled outbound connection with its host key and last-use stamp.
pub struct PooledConn {
    pub stream: TcpStream,
    host: String,
    last_used: Instant,
}

impl PooledConn {
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Outbound connection pool keyed by host.
///
/// Idle connections are reaped after `max_idle`; a liveness probe on reuse
/// discards sockets the peer has closed. Dialing applies `dial_timeout`
/// per new connection.
pub struct OutboundPool {
    conns: Mutex<HashMap<String, Vec<PooledConn>>>,
    dial_timeout: Duration,
    max_idle: Duration,
    stop: AtomicBool,
}

impl OutboundPool {
    pub fn new(dial_timeout: Duration, max_idle: Duration) -> Self {
        Self {
            conns: Mutex::new(HashMap::new()),
            dial_timeout,
            max_idle,
            stop: AtomicBool::new(false),
        }
    }

    /// Check out a connection to `host`, reusing a pooled one when a live
    /// socket is available.
    pub fn get(&self, host: &str) -> NetResult<PooledConn> {
        if self.stop.load(Ordering::Acquire) {
            return Err(NetError::TransportShutdown);
        }

        loop {
            let cached = {
                let mut conns = self.conns.lock().expect("lock poisoned");
                conns.get_mut(host).and_then(Vec::pop)
            };
            match cached {
                Some(conn) if is_alive(&conn.stream) => return Ok(conn),
                Some(_) => {
                    debug!(host, "discarding dead pooled connection");
                    continue;
                }
                None => break,
            }
        }

        let addr = host
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "host resolved to nothing"))?;
        let stream = TcpStream::connect_timeout(&addr, self.dial_timeout)?;
        setup_conn(&stream)?;
        debug!(host, "dialed new connection");

        Ok(PooledConn {
            stream,
            host: host.to_string(),
            last_used: Instant::now(),
        })
    }

    /// Return a connection to the pool. Dropped instead if the pool has
    /// shut down.
    pub fn checkin(&self, mut conn: PooledConn) {
        if self.stop.load(Ordering::Acquire) {
            return;
        }
        conn.last_used = Instant::now();
        let mut conns = self.conns.lock().expect("lock poisoned");
        conns.entry(conn.host.clone()).or_default().push(conn);
    }

    /// Close every connection idle past `max_idle`.
    pub fn reap(&self) {
        let mut conns = self.conns.lock().expect("lock poisoned");
        for (host, list) in conns.iter_mut() {
            let before = list.len();
            list.retain(|conn| conn.last_used.elapsed() <= self.max_idle);
            let reaped = before - list.len();
            if reaped > 0 {
                debug!(host, reaped, "reaped idle connections");
            }
        }
    }

    /// Close all pooled connections and reject further checkouts.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        self.conns.lock().expect("lock poisoned").clear();
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Pooled connection count for a host (diagnostics and tests).
    pub fn idle_count(&self, host: &str) -> usize {
        self.conns
            .lock()
            .expect("lock poisoned")
            .get(host)
            .map_or(0, Vec::len)
    }

    /// Spawn the background reaper; it exits once the pool shuts down.
    pub fn start_reaper(pool: Arc<Self>, interval: Duration) {
        thread::Builder::new()
            .name("casket-pool-reaper".into())
            .spawn(move || loop {
                thread::sleep(interval);
                if pool.is_shutdown() {
                    return;
                }
                pool.reap();
            })
            .map_err(|err| warn!(%err, "failed to spawn pool reaper"))
            .ok();
    }
}

/// Probe a pooled socket with a zero-blocking peek: a clean EOF or error
/// means the peer closed it, and stray unread bytes mean the stream is no
/// longer at a request boundary. Both discard the socket.
fn is_alive(stream: &TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return false;
    }
    let mut probe = [0u8; 1];
    let alive = match stream.peek(&mut probe) {
        Err(err) if err.kind() == ErrorKind::WouldBlock => true,
        Ok(_) | Err(_) => false,
    };
    alive && stream.set_nonblocking(false).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn listener() -> (TcpListener, String) {
        let ln = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = ln.local_addr().unwrap().to_string();
        (ln, host)
    }

    #[test]
    fn checkout_checkin_reuse() {
        let (ln, host) = listener();
        let pool = OutboundPool::new(Duration::from_secs(1), Duration::from_secs(60));

        let conn = pool.get(&host).unwrap();
        let (_server_side, _) = ln.accept().unwrap();
        assert_eq!(conn.host(), host);

        pool.checkin(conn);
        assert_eq!(pool.idle_count(&host), 1);

        // Reuse does not dial again.
        let conn = pool.get(&host).unwrap();
        assert_eq!(pool.idle_count(&host), 0);
        pool.checkin(conn);
    }

    #[test]
    fn dead_connection_is_discarded() {
        let (ln, host) = listener();
        let pool = OutboundPool::new(Duration::from_secs(1), Duration::from_secs(60));

        let conn = pool.get(&host).unwrap();
        let (server_side, _) = ln.accept().unwrap();
        pool.checkin(conn);

        // Peer closes while the connection sits in the pool.
        drop(server_side);
        std::thread::sleep(Duration::from_millis(50));

        // Checkout probes, discards the dead socket, and dials fresh.
        let conn = pool.get(&host).unwrap();
        let _ = ln.accept().unwrap();
        assert!(is_alive(&conn.stream));
    }

    #[test]
    fn reap_closes_idle_connections() {
        let (ln, host) = listener();
        let pool = OutboundPool::new(Duration::from_secs(1), Duration::from_millis(10));

        let conn = pool.get(&host).unwrap();
        let _accepted = ln.accept().unwrap();
        pool.checkin(conn);
        assert_eq!(pool.idle_count(&host), 1);

        std::thread::sleep(Duration::from_millis(30));
        pool.reap();
        assert_eq!(pool.idle_count(&host), 0);
    }

    #[test]
    fn shutdown_rejects_checkout() {
        let (_ln, host) = listener();
        let pool = OutboundPool::new(Duration::from_secs(1), Duration::from_secs(60));
        pool.shutdown();
        assert!(matches!(pool.get(&host), Err(NetError::TransportShutdown)));
    }

    #[test]
    fn dialed_sockets_carry_keepalive() {
        let (ln, host) = listener();
        let pool = OutboundPool::new(Duration::from_secs(1), Duration::from_secs(60));

        let conn = pool.get(&host).unwrap();
        let _accepted = ln.accept().unwrap();
        assert!(SockRef::from(&conn.stream).keepalive().unwrap());
        assert!(conn.stream.nodelay().unwrap());
    }

    #[test]
    fn dial_failure_surfaces_io_error() {
        // Port 1 on localhost is almost certainly closed.
        let pool = OutboundPool::new(Duration::from_millis(200), Duration::from_secs(60));
        assert!(matches!(pool.get("127.0.0.1:1"), Err(NetError::Io(_))));
    }
}
