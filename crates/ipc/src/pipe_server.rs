use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::lifecycle::ShutdownSignal;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::handler::RequestHandler;
use crate::protocol::{Command, Response};

pub const CHANNEL_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const IDLE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("channel i/o failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    WaitingForChannels,
    Ready,
    Processing,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::WaitingForChannels => "WAITING_FOR_CHANNELS",
            ServerState::Ready => "READY",
            ServerState::Processing => "PROCESSING",
            ServerState::ShuttingDown => "SHUTTING_DOWN",
            ServerState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Line-delimited JSON server over an inbound/outbound FIFO pair.
///
/// One request is handled to completion before the next line is read. Every
/// non-empty request line gets exactly one response line, errors included.
pub struct PipeServer {
    handler: RequestHandler,
    inbound: PathBuf,
    outbound: PathBuf,
    channel_poll: Duration,
    idle_backoff: Duration,
    state: ServerState,
}

impl PipeServer {
    pub fn new(
        handler: RequestHandler,
        inbound: impl Into<PathBuf>,
        outbound: impl Into<PathBuf>,
    ) -> Self {
        Self {
            handler,
            inbound: inbound.into(),
            outbound: outbound.into(),
            channel_poll: CHANNEL_POLL_INTERVAL,
            idle_backoff: IDLE_BACKOFF,
            state: ServerState::WaitingForChannels,
        }
    }

    pub fn with_channel_poll(mut self, interval: Duration) -> Self {
        self.channel_poll = interval;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    fn transition(&mut self, next: ServerState) {
        if self.state == next {
            return;
        }
        match next {
            ServerState::Ready | ServerState::Processing => {
                debug!("Pipe server: {} -> {}", self.state, next)
            }
            _ => info!("Pipe server: {} -> {}", self.state, next),
        }
        self.state = next;
    }

    /// Waits for both channels, then serves until shutdown. Returns the
    /// number of requests answered.
    #[cfg(unix)]
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<u64, ServerError> {
        self.transition(ServerState::WaitingForChannels);
        info!("Waiting for channels {:?} and {:?}", self.inbound, self.outbound);

        loop {
            if shutdown.is_requested() {
                self.transition(ServerState::Stopped);
                return Ok(0);
            }
            if self.inbound.exists() && self.outbound.exists() {
                break;
            }
            if !shutdown.sleep(self.channel_poll).await {
                self.transition(ServerState::Stopped);
                return Ok(0);
            }
        }

        let (reader, writer) = match open_channels(&self.inbound, &self.outbound) {
            Ok(channels) => channels,
            Err(e) => {
                error!("Failed to open channels: {}", e);
                self.transition(ServerState::Stopped);
                return Err(e.into());
            }
        };
        info!("Channels open, serving requests");

        let result = self.serve(BufReader::new(reader), writer, &mut shutdown).await;
        self.transition(ServerState::Stopped);
        result
    }

    /// Serves requests from `reader` until shutdown is requested or the
    /// channel fails. Empty lines and EOF back off for the idle interval.
    pub async fn serve<R, W>(
        &mut self,
        mut reader: R,
        mut writer: W,
        shutdown: &mut ShutdownSignal,
    ) -> Result<u64, ServerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.transition(ServerState::Ready);
        let mut handled = 0u64;
        let mut line = String::new();

        loop {
            if shutdown.is_requested() {
                break;
            }

            line.clear();
            let read = tokio::select! {
                r = reader.read_line(&mut line) => r,
                _ = shutdown.requested() => break,
            };

            let response = match read {
                Ok(_) if line.trim().is_empty() => {
                    if !shutdown.sleep(self.idle_backoff).await {
                        break;
                    }
                    continue;
                }
                Ok(_) => {
                    self.transition(ServerState::Processing);
                    self.respond(line.trim()).await
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    self.transition(ServerState::Processing);
                    warn!("Discarding undecodable request: {}", e);
                    Response::error(e).to_line()
                }
                Err(e) => {
                    self.transition(ServerState::ShuttingDown);
                    return Err(e.into());
                }
            };

            if let Err(e) = write_line(&mut writer, &response).await {
                self.transition(ServerState::ShuttingDown);
                return Err(e.into());
            }
            handled += 1;
            self.transition(ServerState::Ready);
        }

        self.transition(ServerState::ShuttingDown);
        info!("Pipe server handled {} requests", handled);
        Ok(handled)
    }

    /// Parses and executes one request line, returning the response line.
    pub async fn respond(&self, line: &str) -> String {
        let response = match Command::parse(line) {
            Ok(command) => match self.handler.handle(command).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Request failed: {}", e);
                    Response::error(e)
                }
            },
            Err(e) => {
                warn!("Malformed request: {}", e);
                Response::error(e)
            }
        };
        response.to_line()
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(unix)]
fn open_channels(
    inbound: &Path,
    outbound: &Path,
) -> io::Result<(tokio::net::unix::pipe::Receiver, tokio::net::unix::pipe::Sender)> {
    use tokio::net::unix::pipe;

    let reader = pipe::OpenOptions::new().open_receiver(inbound)?;

    let mut options = pipe::OpenOptions::new();
    // Open without waiting for the peer to attach its read end.
    #[cfg(target_os = "linux")]
    options.read_write(true);
    let writer = options.open_sender(outbound)?;

    Ok((reader, writer))
}
