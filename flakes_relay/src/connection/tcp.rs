//! TCP implementation of the `Connector` / `Link` capabilities.
//!
//! Each attempt resolves the endpoint and runs `TcpStream::connect_timeout`
//! on a short-lived worker thread, then hands the stream back over an `mpsc`
//! channel, so the scheduling loop only ever calls `try_recv`. Once
//! connected the stream is switched to non-blocking mode and is used exclusively from the
//! scheduling thread.

use super::{ConnectError, Connector, Link};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Connector for a fixed controller endpoint.
///
/// The endpoint is resolved on every attempt, so a controller whose name
/// does not resolve yet (DNS or network still coming up) is just another
/// failed attempt.
pub struct TcpConnector {
    endpoint: String,
    timeout: Duration,
    pending: Option<Receiver<Result<TcpStream, ConnectError>>>,
}

impl TcpConnector {
    /// Connector for `address` (`host:port`), each attempt bounded by `timeout`.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: address.into(),
            timeout,
            pending: None,
        }
    }

    /// Connector for an already-known socket address.
    pub fn from_addr(addr: SocketAddr, timeout: Duration) -> Self {
        Self::new(addr.to_string(), timeout)
    }

    /// True while a connection attempt is in flight.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Connector for TcpConnector {
    type Link = TcpLink;

    fn start(&mut self) -> Result<(), ConnectError> {
        let (tx, rx) = mpsc::channel();
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;

        thread::Builder::new()
            .name("flakes-connect".to_string())
            .spawn(move || {
                // Receiver may be gone if the attempt was cancelled.
                let _ = tx.send(connect_any(&endpoint, timeout));
            })
            .map_err(|e| ConnectError::Spawn(e.to_string()))?;

        self.pending = Some(rx);
        Ok(())
    }

    fn poll(&mut self) -> Option<Result<TcpLink, ConnectError>> {
        let rx = self.pending.as_ref()?;
        let result = match rx.try_recv() {
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(ConnectError::Aborted),
            Ok(Ok(stream)) => TcpLink::new(stream).map_err(ConnectError::Io),
            Ok(Err(e)) => Err(e),
        };
        self.pending = None;
        Some(result)
    }

    fn cancel(&mut self) {
        self.pending = None;
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// Resolve `endpoint`, then try each address in turn, bounded by `timeout`
/// per address.
fn connect_any(endpoint: &str, timeout: Duration) -> Result<TcpStream, ConnectError> {
    let addrs = endpoint
        .to_socket_addrs()
        .map_err(|e| ConnectError::Resolve(format!("{endpoint}: {e}")))?;

    let mut last_err = None;
    for addr in addrs {
        debug!("Trying {} ({})", endpoint, addr);
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(ConnectError::Io(e)),
        None => Err(ConnectError::Resolve(format!("{endpoint}: no addresses"))),
    }
}

/// Non-blocking TCP link to the controller.
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Wrap a connected stream: `TCP_NODELAY` on, non-blocking reads.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(Self { stream })
    }

    /// Remote address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Link for TcpLink {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "controller closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        // Messages are a few bytes; a full send buffer counts as a dead link.
        self.stream.write_all(bytes)
    }

    fn abort(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn poll_until_ready(connector: &mut TcpConnector) -> Result<TcpLink, ConnectError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = connector.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "connect attempt never finished");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn unresolvable_endpoint_fails_the_attempt() {
        let mut connector = TcpConnector::new("not an address", Duration::from_millis(100));
        assert_eq!(connector.endpoint(), "not an address");

        connector.start().unwrap();
        assert!(matches!(
            poll_until_ready(&mut connector),
            Err(ConnectError::Resolve(_))
        ));
        // Each attempt resolves again.
        connector.start().unwrap();
        assert!(matches!(
            poll_until_ready(&mut connector),
            Err(ConnectError::Resolve(_))
        ));
    }

    #[test]
    fn poll_without_start_is_none() {
        let mut connector =
            TcpConnector::from_addr("127.0.0.1:9".parse().unwrap(), Duration::from_millis(100));
        assert!(connector.poll().is_none());
        assert!(!connector.is_pending());
    }

    #[test]
    fn connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut connector = TcpConnector::new(addr.to_string(), Duration::from_secs(1));

        connector.start().unwrap();
        assert!(connector.is_pending());
        let mut link = poll_until_ready(&mut connector).unwrap();
        assert!(!connector.is_pending());
        assert_eq!(link.peer_addr().unwrap(), addr);

        let mut buf = [0u8; 8];
        assert_eq!(link.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn refused_connection_reports_error() {
        // Grab a free port, then close the listener so nothing accepts on it.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut connector = TcpConnector::from_addr(addr, Duration::from_millis(500));
        connector.start().unwrap();
        assert!(matches!(
            poll_until_ready(&mut connector),
            Err(ConnectError::Io(_))
        ));
    }

    #[test]
    fn peer_close_is_reported_as_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut connector =
            TcpConnector::from_addr(listener.local_addr().unwrap(), Duration::from_secs(1));
        connector.start().unwrap();
        let mut link = poll_until_ready(&mut connector).unwrap();

        let (server, _) = listener.accept().unwrap();
        drop(server);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = [0u8; 8];
        loop {
            match link.read_available(&mut buf) {
                Ok(0) => {
                    assert!(Instant::now() < deadline, "EOF never observed");
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(_) => panic!("unexpected data"),
                Err(e) => {
                    assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
                    break;
                }
            }
        }
    }
}
