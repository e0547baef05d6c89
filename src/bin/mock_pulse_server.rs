use clap::Parser;
use log::info;
use pulse_relay::mock_server::{MockPulseServer, MockServerConfig, ServerEvent};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "mock_pulse_server")]
#[command(about = "Mock PulseAudio server that decodes and logs what clients send")]
struct Args {
    /// Address to bind the TCP server to
    #[arg(short, long, default_value = "127.0.0.1:4713")]
    address: String,

    /// Don't answer commands
    #[arg(long)]
    silent: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    info!("🚀 Starting mock pulse server with args: {:?}", args);

    let config = MockServerConfig {
        bind_address: args.address,
        reply_to_commands: !args.silent,
    };
    let (server, mut events) = MockPulseServer::bind(config).await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Received Ctrl+C, shutting down...");
            ctrl_c_cancel.cancel();
        }
    });

    // Per-connection totals are logged by the server; count packets here
    tokio::spawn(async move {
        let mut packets: u64 = 0;
        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::Data { .. } => {
                    packets += 1;
                    if packets % 100 == 0 {
                        info!("🎵 {} audio packets received", packets);
                    }
                }
                ServerEvent::Closed { .. } => packets = 0,
                _ => {}
            }
        }
    });

    server.run(cancel).await?;
    Ok(())
}
