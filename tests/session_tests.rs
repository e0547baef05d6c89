//! Session behaviour as observed from the server side of an in-memory transport.

use pulse_protocol::{
    encode_auth, encode_create_playback_stream, encode_reply, Command, Packet, PacketReader,
    PacketWriter, CONTROL_CHANNEL, DATA_CHANNEL, HEADER_LEN,
};
use pulse_relay::config::StreamMode;
use pulse_relay::session::{SessionState, StreamSession};
use pulse_relay::RelayError;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const CHUNK_SIZE: usize = 4096;

async fn read_all_packets(server: DuplexStream) -> Vec<Packet> {
    let mut reader = PacketReader::new(server);
    let mut packets = Vec::new();
    while let Some(packet) = reader.read_packet().await.expect("malformed packet") {
        packets.push(packet);
    }
    packets
}

async fn run_to_exhaustion(data: Vec<u8>) -> Vec<Packet> {
    let (client, server) = tokio::io::duplex(1 << 20);
    let server = tokio::spawn(read_all_packets(server));
    let mut source = std::io::Cursor::new(data);

    let mut session = StreamSession::new(StreamMode::Native, CHUNK_SIZE);
    let result = session
        .run(Box::new(client), &mut source, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(RelayError::SourceExhausted)));
    assert_eq!(session.state(), SessionState::Closed);

    server.await.unwrap()
}

#[test_log::test(tokio::test)]
async fn test_ten_thousand_bytes_scenario() {
    let packets = run_to_exhaustion(vec![0u8; 10_000]).await;

    assert_eq!(packets.len(), 5);

    assert_eq!(packets[0].header.channel, CONTROL_CHANNEL);
    assert_eq!(packets[0].payload, encode_auth().unwrap());
    assert_eq!(
        Command::peek_opcode(&packets[0].payload),
        Some(Command::Auth as u32)
    );

    assert_eq!(packets[1].header.channel, CONTROL_CHANNEL);
    assert_eq!(packets[1].payload, encode_create_playback_stream());

    let data_lengths: Vec<usize> = packets[2..].iter().map(|p| p.payload.len()).collect();
    assert_eq!(data_lengths, vec![4096, 4096, 1808]);
    for packet in &packets[2..] {
        assert_eq!(packet.header.channel, DATA_CHANNEL);
        assert_eq!(packet.header.length as usize, packet.payload.len());
        assert_eq!(packet.header.offset, 0);
        assert_eq!(packet.header.flags, 0);
        assert!(packet.payload.iter().all(|b| *b == 0));
    }
}

#[test_log::test(tokio::test)]
async fn test_chunking_preserves_bytes_in_order() {
    for len in [0usize, 1, 4095, 4096, 4097, 12_288, 50_001] {
        let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
        let packets = run_to_exhaustion(data.clone()).await;

        let data_packets: Vec<&Packet> = packets
            .iter()
            .filter(|p| p.header.channel == DATA_CHANNEL)
            .collect();
        assert_eq!(data_packets.len(), len.div_ceil(CHUNK_SIZE), "len {}", len);

        let joined: Vec<u8> = data_packets
            .iter()
            .flat_map(|p| p.payload.iter().copied())
            .collect();
        assert_eq!(joined, data, "len {}", len);
    }
}

#[test_log::test(tokio::test)]
async fn test_cancellation_mid_stream_stops_sending() {
    let (client, server) = tokio::io::duplex(1 << 20);
    let (mut feed, mut source) = tokio::io::duplex(1 << 16);
    let cancel = CancellationToken::new();

    let session_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut session = StreamSession::new(StreamMode::Native, CHUNK_SIZE);
        let result = session
            .run(Box::new(client), &mut source, &session_cancel)
            .await;
        (result, session.state())
    });

    let mut reader = PacketReader::new(server);
    assert!(reader.read_packet().await.unwrap().unwrap().header.is_control());
    assert!(reader.read_packet().await.unwrap().unwrap().header.is_control());

    feed.write_all(&[1u8; CHUNK_SIZE]).await.unwrap();
    let data = reader.read_packet().await.unwrap().unwrap();
    assert_eq!(data.payload, vec![1u8; CHUNK_SIZE]);

    cancel.cancel();
    let (result, state) = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("session did not observe cancellation")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(state, SessionState::Closed);

    // The session is gone; anything fed now must never reach the server
    let _ = feed.write_all(&[2u8; CHUNK_SIZE]).await;
    assert!(reader.read_packet().await.unwrap().is_none());
}

#[test_log::test(tokio::test)]
async fn test_source_error_ends_session() {
    struct BrokenSource;

    impl tokio::io::AsyncRead for BrokenSource {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("capture device lost")))
        }
    }

    let (client, server) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(read_all_packets(server));
    let mut session = StreamSession::new(StreamMode::Native, CHUNK_SIZE);
    let result = session
        .run(Box::new(client), &mut BrokenSource, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(RelayError::Io(_))));

    // Handshake still went out before the failed read
    let packets = server.await.unwrap();
    assert_eq!(packets.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_tcp_server_receives_everything_despite_replies() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    // Answers every command, like a real server, and collects the audio
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut reader = PacketReader::new(reader);
        let mut writer = PacketWriter::new(writer);

        let mut commands = 0;
        let mut audio = Vec::new();
        while let Some(packet) = reader.read_packet().await.unwrap() {
            if packet.header.is_control() {
                commands += 1;
                writer.write_command(&encode_reply(0)).await.unwrap();
            } else {
                audio.extend_from_slice(&packet.payload);
            }
        }
        (commands, audio)
    });

    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 239) as u8).collect();
    let mut source = std::io::Cursor::new(data.clone());
    let transport = TcpStream::connect(address).await.unwrap();

    let mut session = StreamSession::new(StreamMode::Native, CHUNK_SIZE);
    let result = session
        .run(Box::new(transport), &mut source, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(RelayError::SourceExhausted)));

    let (commands, audio) = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server never saw the end of the stream")
        .unwrap();
    assert_eq!(commands, 2);
    assert_eq!(audio.len(), data.len());
    assert_eq!(audio, data);

    let reply_len = (HEADER_LEN + encode_reply(0).len()) as u64;
    assert_eq!(session.stats().bytes_discarded, 2 * reply_len);
}
