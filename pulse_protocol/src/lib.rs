//! # Pulse Protocol
//!
//! Just enough of the PulseAudio native protocol to play a stream.
//!
//! This crate provides:
//! - Packet framing (the 20-byte header every message carries)
//! - Tagged parameter encoding for command bodies
//! - The two commands a playback client needs: authenticate and create-playback-stream
//!
//! Replies from the server are never parsed.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pulse_protocol::{PacketWriter, DATA_CHANNEL};
//! use tokio::net::TcpStream;
//!
//! # async fn play() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:4713").await?;
//! let mut writer = PacketWriter::new(stream);
//!
//! writer.write_command(&pulse_protocol::encode_auth()?).await?;
//! writer
//!     .write_command(&pulse_protocol::encode_create_playback_stream())
//!     .await?;
//!
//! // One second of silence, f32le stereo 44.1kHz
//! let silence = vec![0u8; 44_100 * 8];
//! writer.write_packet(DATA_CHANNEL, &silence).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod protocol;
pub mod tagstruct;

// Re-export commonly used types
pub use command::{
    encode_auth, encode_create_playback_stream, encode_reply, framed_auth,
    framed_create_playback_stream, BufferAttr, Command, PlaybackStreamParams,
};
pub use protocol::{
    frame, Packet, PacketHeader, PacketReader, PacketWriter, ProtocolError, CONTROL_CHANNEL,
    DATA_CHANNEL, HEADER_LEN, MAX_PAYLOAD_LEN,
};
pub use tagstruct::{CVolume, ChannelMap, ChannelPosition, SampleFormat, SampleSpec, TagStruct};
