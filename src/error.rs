use pulse_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Audio source exhausted")]
    SourceExhausted,

    #[error("Audio source initialization failed: {0}")]
    SourceInit(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl RelayError {
    /// Classify a failed packet write: I/O failures belong to the transport
    pub fn from_write(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => RelayError::Transport(format!("write failed: {}", e)),
            other => RelayError::Protocol(other),
        }
    }

    /// Whether the supervisor should log this at a quiet level before retrying
    pub fn is_benign(&self) -> bool {
        matches!(self, RelayError::SourceExhausted)
    }
}
