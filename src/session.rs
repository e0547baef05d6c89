use crate::config::StreamMode;
use crate::error::{RelayError, Result};
use crate::transport::Transport;
use pulse_protocol::{encode_auth, encode_create_playback_stream, PacketWriter, DATA_CHANNEL};
use std::future::Future;
use std::time::Duration;
use strum::Display;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Size of the buffer the drain task reads server replies into
const DRAIN_BUFFER_SIZE: usize = 4096;

/// How long a session waits for the server to hang up after half-closing
pub const DEFAULT_CLOSE_LINGER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    Authenticating,
    CreatingStream,
    Streaming,
    Closed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Data packets (or raw chunks) written
    pub chunks_sent: u64,
    /// Audio bytes forwarded, excluding headers
    pub bytes_sent: u64,
    /// Server bytes read and thrown away
    pub bytes_discarded: u64,
}

/// One connection's lifetime: handshake, then forwarding audio until
/// the source ends, a write fails or the session is cancelled.
///
/// Replies are never inspected. A background task reads and drops them
/// so the server never blocks on a full socket.
///
/// When the source ends or fails, the write side is shut down and the
/// session keeps draining until the server closes its end, for at most the
/// close linger. Dropping the transport with replies unread resets it.
pub struct StreamSession {
    mode: StreamMode,
    chunk_size: usize,
    close_linger: Duration,
    state: SessionState,
    stats: SessionStats,
}

impl StreamSession {
    pub fn new(mode: StreamMode, chunk_size: usize) -> Self {
        Self {
            mode,
            chunk_size: chunk_size.max(1),
            close_linger: DEFAULT_CLOSE_LINGER,
            state: SessionState::Idle,
            stats: SessionStats::default(),
        }
    }

    pub fn with_close_linger(mut self, close_linger: Duration) -> Self {
        self.close_linger = close_linger;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run the session to completion.
    ///
    /// Returns `Ok(())` only when `cancel` fires. The end of the source is
    /// reported as [`RelayError::SourceExhausted`].
    pub async fn run<R>(
        &mut self,
        transport: Transport,
        source: &mut R,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let (reader, writer) = tokio::io::split(transport);

        let drain_cancel = cancel.child_token();
        let mut drain = spawn_drain(reader, drain_cancel.clone());

        let mut writer = PacketWriter::new(writer);
        let result = self.forward(&mut writer, source, cancel).await;

        // Source-side endings half-close and wait for the server to hang up
        let lingers = matches!(result, Err(RelayError::SourceExhausted | RelayError::Io(_)));

        let joined = if lingers {
            if let Err(e) = writer.get_mut().shutdown().await {
                log::debug!("Shutting down write side failed: {}", e);
            }
            let linger = tokio::time::timeout(self.close_linger, &mut drain);
            match until_cancelled(cancel, linger).await {
                Some(Ok(joined)) => Some(joined),
                Some(Err(_)) => {
                    log::debug!("Server still open after {:?}", self.close_linger);
                    None
                }
                None => None,
            }
        } else {
            None
        };

        // The drain task belongs to this session; stop it and wait for it
        let joined = match joined {
            Some(joined) => joined,
            None => {
                drain_cancel.cancel();
                drain.await
            }
        };
        match joined {
            Ok(discarded) => self.stats.bytes_discarded = discarded,
            Err(e) => log::warn!("Drain task failed: {}", e),
        }

        self.state = SessionState::Closed;
        log::info!(
            "🔌 Session closed: {} chunks, {} bytes sent, {} bytes discarded",
            self.stats.chunks_sent,
            self.stats.bytes_sent,
            self.stats.bytes_discarded
        );

        result
    }

    async fn forward<W, R>(
        &mut self,
        writer: &mut PacketWriter<W>,
        source: &mut R,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        if self.mode == StreamMode::Native {
            // No reply is awaited between the two commands
            self.state = SessionState::Authenticating;
            let auth = encode_auth()?;
            match until_cancelled(cancel, writer.write_command(&auth)).await {
                None => return Ok(()),
                Some(written) => written.map_err(RelayError::from_write)?,
            }
            log::debug!("📤 Sent auth");

            self.state = SessionState::CreatingStream;
            let create = encode_create_playback_stream();
            match until_cancelled(cancel, writer.write_command(&create)).await {
                None => return Ok(()),
                Some(written) => written.map_err(RelayError::from_write)?,
            }
            log::debug!("📤 Sent create playback stream");
        }

        self.state = SessionState::Streaming;
        log::info!("🔊 Streaming ({} mode)", self.mode);

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = match until_cancelled(cancel, source.read(&mut buf)).await {
                None => return Ok(()),
                Some(read) => read?,
            };
            if n == 0 {
                return Err(RelayError::SourceExhausted);
            }

            let written = match self.mode {
                StreamMode::Native => {
                    until_cancelled(cancel, writer.write_packet(DATA_CHANNEL, &buf[..n])).await
                }
                StreamMode::Raw => until_cancelled(cancel, writer.write_raw(&buf[..n])).await,
            };
            match written {
                None => return Ok(()),
                Some(written) => written.map_err(RelayError::from_write)?,
            }

            self.stats.chunks_sent += 1;
            self.stats.bytes_sent += n as u64;
        }
    }
}

/// Resolve `fut` unless `cancel` fires first; cancellation wins ties
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

fn spawn_drain<T>(mut reader: ReadHalf<T>, cancel: CancellationToken) -> JoinHandle<u64>
where
    T: AsyncRead + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; DRAIN_BUFFER_SIZE];
        let mut discarded: u64 = 0;
        loop {
            match until_cancelled(&cancel, reader.read(&mut buf)).await {
                None => break,
                Some(Ok(0)) => {
                    log::debug!("Server closed its side after {} bytes", discarded);
                    break;
                }
                Some(Ok(n)) => discarded += n as u64,
                Some(Err(e)) => {
                    log::debug!("Drain read failed: {}", e);
                    break;
                }
            }
        }
        discarded
    })
}
