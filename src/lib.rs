pub mod audio_source;
pub mod config;
pub mod error;
pub mod mock_server;
pub mod relay;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use error::{RelayError, Result};
