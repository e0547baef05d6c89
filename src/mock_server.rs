use pulse_protocol::{encode_reply, Command, PacketReader, PacketWriter, ProtocolError};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for the mock server
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Address to bind (use "127.0.0.1:0" for a random port)
    pub bind_address: String,
    /// Answer each command with an empty reply, like a real server would
    pub reply_to_commands: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            reply_to_commands: true,
        }
    }
}

/// What the mock server saw, in arrival order per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Connected { connection: usize },
    Command { connection: usize, opcode: Option<u32> },
    Data { connection: usize, channel: u32, payload: Vec<u8> },
    Closed { connection: usize },
}

/// Accepts native-protocol clients, decodes their packets and reports them.
/// Audio is never played.
pub struct MockPulseServer {
    config: MockServerConfig,
    listener: TcpListener,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl MockPulseServer {
    pub async fn bind(
        config: MockServerConfig,
    ) -> std::io::Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        let (events, receiver) = mpsc::unbounded_channel();

        log::info!("🎵 Mock server listening on {}", listener.local_addr()?);

        Ok((
            Self {
                config,
                listener,
                events,
            },
            receiver,
        ))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<()> {
        let mut next_connection = 0usize;

        loop {
            let (stream, addr) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };

            next_connection += 1;
            let connection = next_connection;
            log::info!("🔌 Connection {} from {}", connection, addr);

            let (reader, writer) = stream.into_split();
            let events = self.events.clone();
            let reply = self.config.reply_to_commands;
            let cancel = cancel.clone();

            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = handle_connection(connection, reader, writer, reply, &events) => {
                        if let Err(e) = result {
                            log::warn!("Connection {} error: {}", connection, e);
                        }
                    }
                }
                let _ = events.send(ServerEvent::Closed { connection });
            });
        }

        log::info!("🛑 Mock server stopped");
        Ok(())
    }
}

async fn handle_connection<R, W>(
    connection: usize,
    reader: R,
    writer: W,
    reply: bool,
    events: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = PacketReader::new(reader);
    let mut writer = PacketWriter::new(writer);
    let mut data_bytes: u64 = 0;

    let _ = events.send(ServerEvent::Connected { connection });

    while let Some(packet) = reader.read_packet().await? {
        if packet.header.is_control() {
            let opcode = Command::peek_opcode(&packet.payload);
            log::info!(
                "📥 Connection {}: command {:?}",
                connection,
                opcode.and_then(Command::from_opcode)
            );
            let _ = events.send(ServerEvent::Command { connection, opcode });

            if reply {
                writer.write_command(&encode_reply(0)).await?;
            }
        } else {
            data_bytes += packet.payload.len() as u64;
            log::debug!(
                "📥 Connection {}: {} bytes on channel {} ({} total)",
                connection,
                packet.payload.len(),
                packet.header.channel,
                data_bytes
            );
            let _ = events.send(ServerEvent::Data {
                connection,
                channel: packet.header.channel,
                payload: packet.payload,
            });
        }
    }

    log::info!(
        "🔌 Connection {} closed after {} audio bytes",
        connection,
        data_bytes
    );
    Ok(())
}
