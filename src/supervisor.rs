use crate::config::{RelayConfig, StreamMode};
use crate::session::{until_cancelled, StreamSession};
use crate::transport::Connector;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Connection attempts, successful or not
    pub attempts: u64,
    /// Attempts that got a transport and ran a session
    pub sessions: u64,
}

/// Keeps a session running against the same source until cancelled.
///
/// Every failure, including the source running dry, is logged and followed
/// by a fixed pause before the next attempt. There is no backoff and no
/// retry limit.
pub struct ReconnectSupervisor {
    connector: Arc<dyn Connector>,
    mode: StreamMode,
    chunk_size: usize,
    retry_interval: Duration,
}

impl ReconnectSupervisor {
    pub fn new(connector: Arc<dyn Connector>, config: &RelayConfig) -> Self {
        Self {
            connector,
            mode: config.mode,
            chunk_size: config.chunk_size,
            retry_interval: config.retry_interval,
        }
    }

    /// Run until `cancel` fires. Never fails; errors only trigger a retry.
    pub async fn run<R>(&self, source: &mut R, cancel: &CancellationToken) -> SupervisorStats
    where
        R: AsyncRead + Unpin,
    {
        let target = self.connector.describe();
        let mut stats = SupervisorStats::default();

        while !cancel.is_cancelled() {
            stats.attempts += 1;
            log::info!("📡 Connecting to {} (attempt {})", target, stats.attempts);

            let transport = match until_cancelled(cancel, self.connector.connect()).await {
                None => break,
                Some(transport) => transport,
            };

            let outcome = match transport {
                Ok(transport) => {
                    stats.sessions += 1;
                    log::info!("✅ Connected to {}", target);
                    let mut session = StreamSession::new(self.mode, self.chunk_size);
                    session.run(transport, source, cancel).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => break,
                Err(e) if e.is_benign() => log::info!("⏸️  {}, reconnecting", e),
                Err(e) => log::error!("❌ {}", e),
            }

            if until_cancelled(cancel, tokio::time::sleep(self.retry_interval))
                .await
                .is_none()
            {
                break;
            }
        }

        log::info!(
            "🛑 Supervisor stopped after {} attempts ({} sessions)",
            stats.attempts,
            stats.sessions
        );
        stats
    }
}
