//! Wire definitions for talking to a line-oriented TCP server.
//!
//! There is no protocol beyond lines of text: a request is one line typed by the
//! operator, a reply is whatever the configured framing says one reply is.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host/port pair identifying the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How message boundaries are drawn on the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Requests end with `\n`; a reply is one `\n`-terminated line.
    #[default]
    Newline,
    /// Requests are sent as typed; a reply is a single read of at most `buffer_size` bytes.
    Raw,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Newline => f.write_str("newline"),
            Framing::Raw => f.write_str("raw"),
        }
    }
}

/// Reading and writing framed messages.
pub mod framing {
    use super::Framing;
    use crate::config::WireConfig;
    use crate::error::ClientError;
    use futures::FutureExt;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
    use tracing::debug;

    /// Write one line using the given framing. Returns the number of bytes put on the wire.
    pub async fn write_message<W>(
        writer: &mut W,
        line: &str,
        framing: Framing,
    ) -> Result<usize, ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        if framing == Framing::Newline {
            bytes.push(b'\n');
        }
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(bytes.len())
    }

    /// Read one reply according to the wire settings.
    pub async fn read_reply<R>(reader: &mut R, wire: &WireConfig) -> Result<Vec<u8>, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        match wire.framing {
            Framing::Newline => read_line(reader, wire.max_line_length).await,
            Framing::Raw => read_chunk(reader, wire.buffer_size).await,
        }
    }

    /// Read a single `\n`-terminated line, without its terminator.
    ///
    /// Bytes following the newline stay in the reader for the next call. A final
    /// unterminated line before EOF is returned as-is.
    pub async fn read_line<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        // Room for the text plus a `\r\n` terminator.
        let limit = max_len as u64 + 2;
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        if buf.len() > max_len {
            return Err(ClientError::LineTooLong(max_len));
        }
        Ok(buf)
    }

    /// Perform one read of at most `buffer_size` bytes.
    ///
    /// Anything else the server already sent is discarded so the next call starts
    /// with the server's next reply.
    pub async fn read_chunk<R>(reader: &mut R, buffer_size: usize) -> Result<Vec<u8>, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut chunk = vec![0u8; buffer_size];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        chunk.truncate(n);

        let discarded = discard_available(reader).await?;
        if discarded > 0 {
            debug!(
                "Discarded {} byte(s) beyond the {} byte receive buffer",
                discarded, buffer_size
            );
        }
        Ok(chunk)
    }

    /// Drop every byte that can be read without waiting.
    async fn discard_available<R>(reader: &mut R) -> Result<usize, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut discarded = 0;
        loop {
            let len = match reader.fill_buf().now_or_never() {
                Some(Ok(bytes)) => bytes.len(),
                Some(Err(e)) => return Err(e.into()),
                None => 0,
            };
            if len == 0 {
                return Ok(discarded);
            }
            reader.consume(len);
            discarded += len;
        }
    }
}
