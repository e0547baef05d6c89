use clap::Parser;
use pulse_relay::{
    config::{EnvSettings, RelayConfig, SourceConfig, StreamMode, TransportConfig},
    error::Result as RelayResult,
    relay::Relay,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "pulse-relay")]
#[command(about = "Stream local PCM audio (f32le, stereo, 44.1kHz) to a PulseAudio server")]
struct Args {
    /// PulseAudio server, host[:port] (defaults to PULSE_SERVER, then 127.0.0.1:4713)
    #[arg(short, long, conflicts_with_all = ["ssh", "command"])]
    server: Option<String>,

    /// Play through pacat over SSH instead, user@host[:port]
    #[arg(long, conflicts_with = "command")]
    ssh: Option<String>,

    /// Speak the native protocol over this command's stdin/stdout
    #[arg(long)]
    command: Option<String>,

    /// Audio source: stdin, file:PATH or cmd:COMMAND
    #[arg(long, default_value = "stdin")]
    source: SourceConfig,

    /// Bytes of audio per data packet
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Pause between connection attempts, in milliseconds
    #[arg(long)]
    retry_ms: Option<u64>,

    /// Bytes buffered while the server is unreachable, at least the chunk size
    #[arg(long)]
    pipe_capacity: Option<usize>,
}

impl Args {
    /// Flags win over the environment; the result is validated once
    fn into_config(self, mut env: EnvSettings) -> RelayResult<RelayConfig> {
        // Drop what the flags replace so a bad env value can't block them
        if self.server.is_some() || self.ssh.is_some() || self.command.is_some() {
            env.server = None;
        }
        if self.chunk_size.is_some() {
            env.chunk_size = None;
        }
        if self.retry_ms.is_some() {
            env.retry_ms = None;
        }
        if self.pipe_capacity.is_some() {
            env.pipe_capacity = None;
        }

        let mut config = RelayConfig::default();
        config.apply_env(&env)?;

        if let Some(server) = &self.server {
            config.transport = TransportConfig::tcp(server)?;
        }
        if let Some(destination) = &self.ssh {
            config.transport = TransportConfig::ssh_pacat(destination)?;
            config.mode = StreamMode::Raw;
        }
        if let Some(command) = &self.command {
            config.transport = TransportConfig::process(command)?;
        }
        config.source = self.source;
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(retry_ms) = self.retry_ms {
            config.retry_interval = Duration::from_millis(retry_ms);
        }
        if let Some(pipe_capacity) = self.pipe_capacity {
            config.pipe_capacity = pipe_capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    // Initialize logging
    env_logger::init();

    let config = Args::parse().into_config(EnvSettings::load())?;
    log::info!(
        "🚀 Relaying {:?} to {:?} ({} mode)",
        config.source,
        config.transport,
        config.mode
    );

    let relay = Relay::new(config)?;

    // Stop trigger
    let stop = CancellationToken::new();
    let stop_trigger = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received Ctrl+C, shutting down...");
                stop_trigger.cancel();
            }
            Err(e) => log::warn!("Ctrl+C handler unavailable: {}", e),
        }
    });

    let stats = relay.run(stop).await?;
    log::info!(
        "👋 Done after {} connection attempts ({} sessions)",
        stats.attempts,
        stats.sessions
    );

    Ok(())
}
