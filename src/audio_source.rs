use crate::config::SourceConfig;
use crate::error::{RelayError, Result};
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Size of the buffer capture copies through
const CAPTURE_BUFFER_SIZE: usize = 4096;

/// Raw PCM byte stream (f32le stereo 44.1kHz), passed through unmodified
pub struct AudioSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    description: String,
    // Keeps a capture process alive for as long as we read from it
    _child: Option<Child>,
}

impl AudioSource {
    /// Wrap any reader, mostly for tests and embedding
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, description: &str) -> Self {
        Self {
            reader: Box::new(reader),
            description: description.to_string(),
            _child: None,
        }
    }

    /// Open the configured source. Failure here is fatal for the whole run.
    pub async fn open(config: &SourceConfig) -> Result<Self> {
        match config {
            SourceConfig::Stdin => Ok(Self::from_reader(tokio::io::stdin(), "stdin")),
            SourceConfig::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    RelayError::SourceInit(format!("open {}: {}", path.display(), e))
                })?;
                Ok(Self::from_reader(file, &path.display().to_string()))
            }
            SourceConfig::Command { program, args } => {
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| RelayError::SourceInit(format!("spawn {}: {}", program, e)))?;

                let stdout = child.stdout.take().ok_or_else(|| {
                    RelayError::SourceInit(format!("{} started without piped stdout", program))
                })?;

                Ok(Self {
                    reader: Box::new(stdout),
                    description: program.clone(),
                    _child: Some(child),
                })
            }
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl AsyncRead for AudioSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

/// Capture side of the pipe
pub type PipeWriter = DuplexStream;

/// Session side of the pipe
pub type PipeReader = DuplexStream;

/// Bounded in-memory byte pipe between capture and the supervisor.
/// When full, capture waits until a session drains it.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    tokio::io::duplex(capacity)
}

/// Copy `source` into the pipe until the source ends or `cancel` fires.
///
/// Returns the number of bytes captured. A clean end of the source is not an
/// error; the pipe is closed when `pipe` is dropped on return.
pub async fn run_capture(
    mut source: AudioSource,
    mut pipe: PipeWriter,
    cancel: CancellationToken,
) -> Result<u64> {
    log::info!("🎤 Capturing from {}", source.description());

    let mut buf = vec![0u8; CAPTURE_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Capture cancelled after {} bytes", total);
                return Ok(total);
            }
            read = source.read(&mut buf) => read?,
        };

        if n == 0 {
            log::info!("🎤 Source {} ended after {} bytes", source.description(), total);
            return Ok(total);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Capture cancelled after {} bytes", total);
                return Ok(total);
            }
            written = pipe.write_all(&buf[..n]) => written?,
        }

        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_capture_copies_everything() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let source = AudioSource::from_reader(std::io::Cursor::new(data.clone()), "memory");
        let (writer, mut reader) = pipe(64 * 1024);

        let total = run_capture(source, writer, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(total, data.len() as u64);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_capture_stops_on_cancel_while_pipe_full() {
        let (mut feed, source_end) = tokio::io::duplex(1024);
        feed.write_all(&[1u8; 1024]).await.unwrap();
        let source = AudioSource::from_reader(source_end, "duplex");

        // Nobody reads the pipe, so capture blocks once it fills
        let (writer, _reader) = pipe(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_capture(source, writer, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let total = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("capture did not observe cancellation")
            .unwrap()
            .unwrap();
        assert!(total < 1024);
    }

    #[tokio::test]
    async fn test_open_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 32]).unwrap();

        let config = SourceConfig::File(file.path().to_path_buf());
        let mut source = AudioSource::open(&config).await.unwrap();

        let mut data = Vec::new();
        source.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, vec![7u8; 32]);
    }

    #[tokio::test]
    async fn test_missing_file_is_init_failure() {
        let config = SourceConfig::File(PathBuf::from("/nonexistent/pulse-relay/capture.raw"));
        assert!(matches!(
            AudioSource::open(&config).await,
            Err(RelayError::SourceInit(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_capture_command_is_init_failure() {
        let config = SourceConfig::Command {
            program: "definitely-not-a-real-capture-tool".to_string(),
            args: vec![],
        };
        assert!(matches!(
            AudioSource::open(&config).await,
            Err(RelayError::SourceInit(_))
        ));
    }
}
