//! Transport to a mail exchanger.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens byte channels to exchangers.
///
/// The dispatcher goes through this trait so that tests can hand out
/// in-memory streams instead of sockets.
pub trait Transport: Send + Sync {
    /// Bidirectional stream produced by [`Transport::open`].
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a connection to `host:port`.
    fn open(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Creates a transport that gives up connecting after `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn open(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        // (host, port) rather than "host:port" so bare IPv6 addresses work.
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {host}:{port} timed out"),
                )
            })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 ok\r\n").await.unwrap();
        });

        let transport = TcpTransport::new(Duration::from_secs(5));
        let mut stream = transport.open("127.0.0.1", port).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"220 ok\r\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new(Duration::from_secs(5));
        assert!(transport.open("127.0.0.1", port).await.is_err());
    }
}
