//! Server connection for the console client.
//!
//! `ChatClient::run` pumps two streams concurrently:
//! - server lines → local output, verbatim
//! - local input lines → server
//!
//! Typing `/quit` forwards it and stops reading input; the client keeps
//! printing until the server closes the connection, so the farewell line
//! is shown. End of input behaves the same way (the write half is closed).
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use parley_protocol::{parse_line, Command, Input};

use crate::error::{ClientError, Result};

/// Default server address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:12345";

/// Printed when the server goes away without the user quitting.
pub const CONNECTION_LOST: &str = "❌ Connection to server lost.";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The user quit (or input ended) and the server closed the connection.
    Quit,
    /// The server closed the connection on its own.
    ServerClosed,
}

/// A connected chat client.
pub struct ChatClient {
    stream: TcpStream,
    addr: String,
}

impl ChatClient {
    /// Connects to the server at `addr`.
    ///
    /// # Errors
    ///
    /// - `ClientError::Connect` if the connection cannot be established
    pub async fn connect(addr: &str) -> Result<Self> {
        debug!(addr, "Connecting to chat server");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        info!(addr, "Connected to chat server");
        Ok(Self {
            stream,
            addr: addr.to_string(),
        })
    }

    /// The address this client connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Runs the session until the server closes the connection.
    ///
    /// # Errors
    ///
    /// - `ClientError::Io` if the connection or the local streams fail
    pub async fn run<I, O>(self, input: I, output: &mut O) -> Result<Disconnect>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (reader, mut writer) = self.stream.into_split();
        let mut server_lines = BufReader::new(reader).lines();
        let mut input_lines = input.lines();
        let mut quitting = false;

        loop {
            tokio::select! {
                line = server_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => print_line(output, &line).await?,
                        Ok(None) if quitting => return Ok(Disconnect::Quit),
                        Ok(None) => {
                            print_line(output, CONNECTION_LOST).await?;
                            return Ok(Disconnect::ServerClosed);
                        }
                        Err(e) => {
                            print_line(output, CONNECTION_LOST).await?;
                            return Err(e.into());
                        }
                    }
                }

                line = input_lines.next_line(), if !quitting => {
                    match line? {
                        Some(line) => {
                            writer.write_all(line.as_bytes()).await?;
                            writer.write_all(b"\n").await?;
                            writer.flush().await?;

                            if is_quit(&line) {
                                debug!("Quit requested, waiting for server to close");
                                quitting = true;
                            }
                        }
                        None => {
                            debug!("Input closed, shutting down write half");
                            writer.shutdown().await?;
                            quitting = true;
                        }
                    }
                }
            }
        }
    }
}

fn is_quit(line: &str) -> bool {
    parse_line(line) == Input::Command(Command::Quit)
}

async fn print_line<O>(output: &mut O, line: &str) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
