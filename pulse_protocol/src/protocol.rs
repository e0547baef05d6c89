use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the fixed header that precedes every packet.
pub const HEADER_LEN: usize = 20;

/// Channel index reserved for command packets.
pub const CONTROL_CHANNEL: u32 = 0xFFFF_FFFF;

/// Channel index used for the single playback stream's audio data.
pub const DATA_CHANNEL: u32 = 0;

/// Upper bound accepted by [`PacketReader`] (16MB), same sanity limit the server uses.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Too many entries in {what}: {count}")]
    TooManyEntries { what: &'static str, count: usize },

    #[error("Invalid packet header: {0}")]
    InvalidHeader(String),
}

/// Packet header: `[length:u32][channel:u32][offset:u64][flags:u32]`, big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u32,
    pub channel: u32,
    pub offset: u64,
    pub flags: u32,
}

impl PacketHeader {
    /// Header for `payload` on `channel`, offset and flags zeroed
    pub fn for_payload(channel: u32, payload: &[u8]) -> Result<Self, ProtocolError> {
        let length =
            u32::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

        Ok(Self {
            length,
            channel,
            offset: 0,
            flags: 0,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&self.length.to_be_bytes());
        header[4..8].copy_from_slice(&self.channel.to_be_bytes());
        header[8..16].copy_from_slice(&self.offset.to_be_bytes());
        header[16..20].copy_from_slice(&self.flags.to_be_bytes());
        header
    }

    pub fn parse(header: &[u8; HEADER_LEN]) -> Self {
        Self {
            length: u32::from_be_bytes([header[0], header[1], header[2], header[3]]),
            channel: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
            offset: u64::from_be_bytes([
                header[8], header[9], header[10], header[11], header[12], header[13], header[14],
                header[15],
            ]),
            flags: u32::from_be_bytes([header[16], header[17], header[18], header[19]]),
        }
    }

    pub fn is_control(&self) -> bool {
        self.channel == CONTROL_CHANNEL
    }
}

/// A decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

/// Wrap `payload` in a packet header for `channel`
pub fn frame(channel: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let header = PacketHeader::for_payload(channel, payload)?;

    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet.extend_from_slice(&header.to_bytes());
    packet.extend_from_slice(payload);

    Ok(packet)
}

/// Writes framed packets to an async byte stream
pub struct PacketWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Frame `payload` on `channel` and write it out in one piece
    pub async fn write_packet(&mut self, channel: u32, payload: &[u8]) -> Result<(), ProtocolError> {
        let packet = frame(channel, payload)?;
        self.writer.write_all(&packet).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write a command body on the control channel
    pub async fn write_command(&mut self, body: &[u8]) -> Result<(), ProtocolError> {
        self.write_packet(CONTROL_CHANNEL, body).await
    }

    /// Write bytes without any framing
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reads framed packets from an async byte stream
pub struct PacketReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next packet, `None` on a clean end of stream between packets.
    /// A stream that ends inside a header is an error.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::InvalidHeader(format!(
                    "stream ended after {} of {} header bytes",
                    filled, HEADER_LEN
                )));
            }
            filled += n;
        }

        let header = PacketHeader::parse(&header);
        if header.length > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidHeader(format!(
                "payload length {} exceeds {}",
                header.length, MAX_PAYLOAD_LEN
            )));
        }

        let mut payload = vec![0u8; header.length as usize];
        if header.length > 0 {
            self.reader.read_exact(&mut payload).await?;
        }

        Ok(Some(Packet { header, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let payload = [0xAAu8; 7];
        let packet = frame(0x0102_0304, &payload).unwrap();

        assert_eq!(packet.len(), HEADER_LEN + payload.len());
        assert_eq!(&packet[0..4], &[0, 0, 0, 7]);
        assert_eq!(&packet[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&packet[8..16], &[0u8; 8]);
        assert_eq!(&packet[16..20], &[0u8; 4]);
        assert_eq!(&packet[20..], &payload);
    }

    #[test]
    fn test_frame_lengths() {
        for len in [0usize, 1, 19, 20, 4096, 70_000] {
            let payload = vec![0x5Au8; len];
            for channel in [DATA_CHANNEL, 1, CONTROL_CHANNEL] {
                let packet = frame(channel, &payload).unwrap();
                assert_eq!(packet.len(), HEADER_LEN + len);

                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&packet[..HEADER_LEN]);
                let header = PacketHeader::parse(&header);
                assert_eq!(header.length as usize, len);
                assert_eq!(header.channel, channel);
                assert_eq!(header.offset, 0);
                assert_eq!(header.flags, 0);
            }
        }
    }

    #[test]
    fn test_control_channel_header() {
        let packet = frame(CONTROL_CHANNEL, &[]).unwrap();
        assert_eq!(
            packet,
            vec![0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&packet);
        assert!(PacketHeader::parse(&header).is_control());
    }

    #[tokio::test]
    async fn test_writer_and_reader_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = PacketWriter::new(client);
        let mut reader = PacketReader::new(server);

        writer.write_command(b"cmd").await.unwrap();
        writer.write_packet(DATA_CHANNEL, &[1, 2, 3, 4]).await.unwrap();
        drop(writer);

        let first = reader.read_packet().await.unwrap().unwrap();
        assert!(first.header.is_control());
        assert_eq!(first.payload, b"cmd");

        let second = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(second.header.channel, DATA_CHANNEL);
        assert_eq!(second.payload, vec![1, 2, 3, 4]);

        assert!(reader.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_rejects_truncated_header() {
        let (mut client, server) = tokio::io::duplex(64);
        let header = frame(DATA_CHANNEL, &[9u8; 4]).unwrap();
        client.write_all(&header[..7]).await.unwrap();
        drop(client);

        let mut reader = PacketReader::new(server);
        assert!(matches!(
            reader.read_packet().await,
            Err(ProtocolError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_reader_rejects_truncated_payload() {
        let (mut client, server) = tokio::io::duplex(64);
        let packet = frame(DATA_CHANNEL, &[9u8; 4]).unwrap();
        client.write_all(&packet[..HEADER_LEN + 2]).await.unwrap();
        drop(client);

        let mut reader = PacketReader::new(server);
        assert!(matches!(
            reader.read_packet().await,
            Err(ProtocolError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_reader_rejects_oversized_payload() {
        let (mut client, server) = tokio::io::duplex(64);
        let header = PacketHeader {
            length: MAX_PAYLOAD_LEN + 1,
            channel: DATA_CHANNEL,
            offset: 0,
            flags: 0,
        };
        client.write_all(&header.to_bytes()).await.unwrap();

        let mut reader = PacketReader::new(server);
        assert!(matches!(
            reader.read_packet().await,
            Err(ProtocolError::InvalidHeader(_))
        ));
    }
}
