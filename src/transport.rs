use crate::config::TransportConfig;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Bidirectional byte stream to the server
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TransportStream for T {}

pub type Transport = Box<dyn TransportStream>;

/// Opens a fresh transport for every connection attempt
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Transport>;

    /// Human-readable target for logs
    fn describe(&self) -> String;
}

pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Transport> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| RelayError::Transport(format!("connect to {}: {}", self.address, e)))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// Runs a command per attempt and talks to it over its stdin/stdout
pub struct ProcessConnector {
    program: String,
    args: Vec<String>,
}

impl ProcessConnector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn connect(&self) -> Result<Transport> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::Transport(format!("spawn {}: {}", self.program, e)))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(RelayError::Transport(format!(
                    "{} started without piped stdio",
                    self.program
                )))
            }
        };

        Ok(Box::new(ProcessTransport {
            _child: child,
            stdin: Some(stdin),
            stdout,
        }))
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Child process stdio as one stream. Dropping it kills the child.
/// Shutting down the write side closes the child's stdin.
struct ProcessTransport {
    _child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

fn stdin_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed")
}

impl AsyncRead for ProcessTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProcessTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_write(cx, buf),
            None => Poll::Ready(Err(stdin_closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(stdin) = this.stdin.as_mut() {
            ready!(Pin::new(stdin).poll_flush(cx))?;
        }
        // The pipe only reaches EOF once our end is dropped
        this.stdin = None;
        Poll::Ready(Ok(()))
    }
}

pub fn connector_for(config: &TransportConfig) -> Arc<dyn Connector> {
    match config {
        TransportConfig::Tcp { address } => Arc::new(TcpConnector::new(address.clone())),
        TransportConfig::Process { program, args } => {
            Arc::new(ProcessConnector::new(program.clone(), args.clone()))
        }
    }
}
