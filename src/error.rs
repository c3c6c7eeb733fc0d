//! Error types for the line client.

use crate::protocol::Endpoint;
use std::io;
use std::time::Duration;

/// Errors produced while connecting to, talking to, or reading from the server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A connect attempt failed with something other than a retried refusal.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// The endpoint kept refusing until the attempt limit ran out.
    #[error("connection to {endpoint} refused after {attempts} attempt(s)")]
    Refused { endpoint: Endpoint, attempts: u32 },

    /// A single connect attempt did not finish in time.
    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    /// The server closed its side before sending a reply.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No reply arrived within the configured limit.
    #[error("no reply from server within {0:?}")]
    ReplyTimeout(Duration),

    /// A newline-framed reply exceeded the maximum line length.
    #[error("reply line exceeds {0} bytes")]
    LineTooLong(usize),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Whether the error means the peer is gone, as opposed to a local failure.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ClientError::ConnectionClosed => true,
            ClientError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
