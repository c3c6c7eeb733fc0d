//! The interactive request/reply loop.

use crate::client::socket::Connection;
use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::protocol::Framing;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operator typed the exit command.
    Quit,
    /// The operator's input stream ended.
    EndOfInput,
}

/// Reads operator lines from `input` and prints server replies to `output`.
pub struct Session<I, O> {
    input: I,
    output: O,
    exit_command: Option<String>,
    prompt: Option<String>,
}

impl<I, O> Session<I, O>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    pub fn new(input: I, output: O, config: &SessionConfig) -> Self {
        Self {
            input,
            output,
            exit_command: config.exit_command().map(str::to_string),
            prompt: config.prompt.clone(),
        }
    }

    /// Drop the prompt, e.g. when input is not a terminal.
    pub fn without_prompt(mut self) -> Self {
        self.prompt = None;
        self
    }

    /// Read one line from the operator, without its line ending.
    ///
    /// Returns `None` once input is exhausted.
    pub async fn read_input(&mut self) -> Result<Option<String>, ClientError> {
        if let Some(prompt) = &self.prompt {
            self.output.write_all(prompt.as_bytes()).await?;
            self.output.flush().await?;
        }

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Run the loop until the exit command or end of input.
    ///
    /// The connection is closed on both outcomes; on error it is dropped.
    pub async fn run<S>(&mut self, mut conn: Connection<S>) -> Result<Outcome, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outcome = loop {
            let Some(line) = self.read_input().await? else {
                info!("End of input");
                break Outcome::EndOfInput;
            };

            if self.exit_command.as_deref() == Some(line.as_str()) {
                info!("Exit command received");
                break Outcome::Quit;
            }

            // Nothing would go on the wire, so there is nothing to wait for.
            if line.is_empty() && conn.wire().framing == Framing::Raw {
                debug!("Skipping empty line");
                continue;
            }

            conn.send(&line).await?;
            let reply = conn.receive().await?;
            self.print_reply(&reply).await?;
        };

        conn.close().await?;
        Ok(outcome)
    }

    async fn print_reply(&mut self, reply: &[u8]) -> Result<(), ClientError> {
        self.output
            .write_all(String::from_utf8_lossy(reply).as_bytes())
            .await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }
}
