//! TCP connection to the server.

use crate::config::{ConnectConfig, WireConfig};
use crate::error::ClientError;
use crate::protocol::{framing, Endpoint};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Open a stream connection to `endpoint`.
///
/// Refused attempts are retried every `policy.retry_interval()` while
/// `policy.retry_refused` is set, up to `policy.max_attempts` if given. Every other
/// failure is returned immediately.
pub async fn connect(endpoint: &Endpoint, policy: &ConnectConfig) -> Result<TcpStream, ClientError> {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        debug!("Connecting to {} (attempt {})", endpoint, attempts);

        let target = (endpoint.host.as_str(), endpoint.port);
        let result = match policy.timeout() {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(target))
                .await
                .map_err(|_| ClientError::ConnectTimeout {
                    endpoint: endpoint.clone(),
                    timeout: limit,
                })?,
            None => TcpStream::connect(target).await,
        };

        match result {
            Ok(stream) => {
                info!("Connected to {} after {} attempt(s)", endpoint, attempts);
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused && policy.retry_refused => {
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(ClientError::Refused {
                        endpoint: endpoint.clone(),
                        attempts,
                    });
                }
                debug!(
                    "Connection refused, retrying in {:?}",
                    policy.retry_interval()
                );
                tokio::time::sleep(policy.retry_interval()).await;
            }
            Err(source) => {
                return Err(ClientError::Connect {
                    endpoint: endpoint.clone(),
                    source,
                });
            }
        }
    }
}

/// An exclusively owned connection with framed send/receive.
///
/// Dropping the connection closes it; `close` additionally shuts down the write
/// side so the server sees end of stream before the socket goes away.
pub struct Connection<S = TcpStream> {
    stream: BufReader<S>,
    wire: WireConfig,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established stream.
    pub fn new(stream: S, wire: WireConfig) -> Self {
        Self {
            stream: BufReader::new(stream),
            wire,
        }
    }

    /// Send one line to the server.
    pub async fn send(&mut self, line: &str) -> Result<(), ClientError> {
        let n = framing::write_message(&mut self.stream, line, self.wire.framing).await?;
        debug!("Sent {} byte(s)", n);
        Ok(())
    }

    /// Wait for one reply from the server.
    ///
    /// Without a configured reply timeout this waits as long as the server does.
    pub async fn receive(&mut self) -> Result<Vec<u8>, ClientError> {
        let read = framing::read_reply(&mut self.stream, &self.wire);
        let reply = match self.wire.reply_timeout() {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ClientError::ReplyTimeout(limit))??,
            None => read.await?,
        };
        debug!("Received {} byte(s)", reply.len());
        Ok(reply)
    }

    /// Shut down the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        debug!("Connection closed");
        Ok(())
    }

    /// Framing and reply settings this connection was opened with.
    pub fn wire(&self) -> &WireConfig {
        &self.wire
    }
}

impl Connection<TcpStream> {
    /// Connect to `endpoint` and wrap the resulting stream.
    pub async fn open(
        endpoint: &Endpoint,
        policy: &ConnectConfig,
        wire: WireConfig,
    ) -> Result<Self, ClientError> {
        let stream = connect(endpoint, policy).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        Ok(Self::new(stream, wire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Framing;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A port on loopback that nothing is listening on.
    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn no_retry() -> ConnectConfig {
        ConnectConfig {
            retry_refused: false,
            ..ConnectConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let endpoint = Endpoint::new("127.0.0.1", port);
        let stream = connect(&endpoint, &no_retry()).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_without_retry() {
        let endpoint = Endpoint::new("127.0.0.1", unused_port());
        let err = connect(&endpoint, &no_retry()).await.unwrap_err();
        match err {
            ClientError::Connect { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_max_attempts() {
        let endpoint = Endpoint::new("127.0.0.1", unused_port());
        let policy = ConnectConfig {
            retry_interval_ms: 10,
            max_attempts: Some(3),
            ..ConnectConfig::default()
        };
        let err = connect(&endpoint, &policy).await.unwrap_err();
        assert!(matches!(err, ClientError::Refused { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_connect_waits_for_late_listener() {
        let port = unused_port();
        let start = Instant::now();

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            listener.accept().await.unwrap()
        });

        let endpoint = Endpoint::new("127.0.0.1", port);
        connect(&endpoint, &ConnectConfig::default()).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "too early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2500), "too late: {elapsed:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_and_receive_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            lines.read_line(&mut line).await.unwrap();
            lines
                .get_mut()
                .write_all(format!("echo: {}", line).as_bytes())
                .await
                .unwrap();
            line
        });

        let endpoint = Endpoint::new("127.0.0.1", port);
        let mut conn = Connection::open(&endpoint, &no_retry(), WireConfig::default())
            .await
            .unwrap();
        conn.send("hello").await.unwrap();
        assert_eq!(conn.receive().await.unwrap(), b"echo: hello");
        conn.close().await.unwrap();

        assert_eq!(server.await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_raw_send_has_no_terminator() {
        let (client, mut server) = tokio::io::duplex(1024);
        let wire = WireConfig {
            framing: Framing::Raw,
            ..WireConfig::default()
        };
        let mut conn = Connection::new(client, wire);
        conn.send("hello").await.unwrap();
        conn.close().await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn test_raw_receive_with_large_buffer() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let wire = WireConfig {
            framing: Framing::Raw,
            buffer_size: 16 * 1024,
            ..WireConfig::default()
        };
        let mut conn = Connection::new(client, wire);

        server.write_all(&[b'z'; 10_000]).await.unwrap();
        assert_eq!(conn.receive().await.unwrap().len(), 10_000);

        server.write_all(&[b'z'; 20_000]).await.unwrap();
        assert_eq!(conn.receive().await.unwrap().len(), 16 * 1024);
    }

    #[tokio::test]
    async fn test_receive_blocks_without_timeout() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut conn = Connection::new(client, WireConfig::default());
        let pending = tokio::time::timeout(Duration::from_millis(200), conn.receive()).await;
        assert!(pending.is_err(), "receive returned without a reply");
    }

    #[tokio::test]
    async fn test_receive_reply_timeout() {
        let (client, _server) = tokio::io::duplex(1024);
        let wire = WireConfig {
            reply_timeout_ms: Some(50),
            ..WireConfig::default()
        };
        let mut conn = Connection::new(client, wire);
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, ClientError::ReplyTimeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_receive_after_server_close() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let mut conn = Connection::new(client, WireConfig::default());
        let err = conn.receive().await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
