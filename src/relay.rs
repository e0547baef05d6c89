use crate::audio_source::{pipe, run_capture, AudioSource};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::supervisor::{ReconnectSupervisor, SupervisorStats};
use crate::transport::{connector_for, Connector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capture and supervisor wired together over one pipe
pub struct Relay {
    config: RelayConfig,
    connector: Arc<dyn Connector>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let connector = connector_for(&config.transport);
        Ok(Self { config, connector })
    }

    /// Use a caller-supplied connector instead of the configured transport
    pub fn with_connector(config: RelayConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Open the configured source and relay until `stop` fires.
    ///
    /// A source that cannot be opened is fatal and never retried.
    pub async fn run(&self, stop: CancellationToken) -> Result<SupervisorStats> {
        let source = AudioSource::open(&self.config.source).await?;
        self.run_with_source(source, stop).await
    }

    /// Relay an already opened source until `stop` fires or capture fails.
    ///
    /// Capture failure cancels the whole group and is returned; `stop`
    /// itself is not an error.
    pub async fn run_with_source(
        &self,
        source: AudioSource,
        stop: CancellationToken,
    ) -> Result<SupervisorStats> {
        let group = stop.child_token();
        let (pipe_writer, mut pipe_reader) = pipe(self.config.pipe_capacity);

        let capture_group = group.clone();
        let capture = tokio::spawn(async move {
            let result = run_capture(source, pipe_writer, capture_group.clone()).await;
            if let Err(e) = &result {
                log::error!("❌ Capture failed: {}", e);
                capture_group.cancel();
            }
            result
        });

        let supervisor = ReconnectSupervisor::new(Arc::clone(&self.connector), &self.config);
        // Returns only once the group is cancelled
        let stats = supervisor.run(&mut pipe_reader, &group).await;
        drop(pipe_reader);

        let captured = capture
            .await
            .map_err(|e| RelayError::Io(std::io::Error::other(e)))??;
        log::info!("🛑 Relay stopped, {} bytes captured", captured);

        Ok(stats)
    }
}
