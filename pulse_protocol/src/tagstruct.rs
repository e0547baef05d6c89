//! Tagged parameter encoding used by command bodies.
//!
//! Every value is preceded by a one-byte tag that fixes its wire shape.
//! The server reads values positionally, so callers are responsible for
//! writing them in the order the command expects.

use crate::protocol::ProtocolError;

/// Maximum number of channels a sample spec, channel map or volume may carry
pub const CHANNELS_MAX: usize = 32;

pub mod tag {
    pub const STRING: u8 = b't';
    pub const STRING_NULL: u8 = b'N';
    pub const U32: u8 = b'L';
    pub const U8: u8 = b'B';
    pub const SAMPLE_SPEC: u8 = b'a';
    pub const ARBITRARY: u8 = b'x';
    pub const BOOLEAN_TRUE: u8 = b'1';
    pub const BOOLEAN_FALSE: u8 = b'0';
    pub const CHANNEL_MAP: u8 = b'm';
    pub const CVOLUME: u8 = b'v';
    pub const PROPLIST: u8 = b'P';
}

/// Sample formats understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleFormat {
    U8 = 0,
    S16Le = 3,
    S16Be = 4,
    Float32Le = 5,
    Float32Be = 6,
    S32Le = 7,
    S32Be = 8,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
            SampleFormat::Float32Le
            | SampleFormat::Float32Be
            | SampleFormat::S32Le
            | SampleFormat::S32Be => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub channels: u8,
    pub rate: u32,
}

impl SampleSpec {
    /// Interleaved float32 little-endian stereo at 44.1kHz
    pub const fn float32le_stereo() -> Self {
        Self {
            format: SampleFormat::Float32Le,
            channels: 2,
            rate: 44_100,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelPosition {
    Mono = 0,
    FrontLeft = 1,
    FrontRight = 2,
    FrontCenter = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    pub fn new(positions: Vec<ChannelPosition>) -> Result<Self, ProtocolError> {
        if positions.len() > CHANNELS_MAX {
            return Err(ProtocolError::TooManyEntries {
                what: "channel map",
                count: positions.len(),
            });
        }
        Ok(Self { positions })
    }

    pub fn stereo() -> Self {
        Self {
            positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
        }
    }

    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }
}

/// Per-channel volumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVolume {
    values: Vec<u32>,
}

impl CVolume {
    pub fn new(values: Vec<u32>) -> Result<Self, ProtocolError> {
        if values.len() > CHANNELS_MAX {
            return Err(ProtocolError::TooManyEntries {
                what: "channel volume",
                count: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// `channels` entries all set to `volume`
    pub fn uniform(channels: u8, volume: u32) -> Self {
        Self {
            values: vec![volume; (channels as usize).min(CHANNELS_MAX)],
        }
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }
}

/// Builder for a command body
#[derive(Debug, Default, Clone)]
pub struct TagStruct {
    data: Vec<u8>,
}

impl TagStruct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.data.push(tag::U32);
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.data.push(tag::U8);
        self.data.push(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.data.push(if value {
            tag::BOOLEAN_TRUE
        } else {
            tag::BOOLEAN_FALSE
        });
        self
    }

    /// `None` is sent as the null string
    pub fn put_string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => {
                self.data.push(tag::STRING);
                self.data.extend_from_slice(s.as_bytes());
                self.data.push(0);
            }
            None => self.data.push(tag::STRING_NULL),
        }
        self
    }

    pub fn put_sample_spec(&mut self, spec: &SampleSpec) -> &mut Self {
        self.data.push(tag::SAMPLE_SPEC);
        self.data.push(spec.format as u8);
        self.data.push(spec.channels);
        self.data.extend_from_slice(&spec.rate.to_be_bytes());
        self
    }

    pub fn put_channel_map(&mut self, map: &ChannelMap) -> &mut Self {
        self.data.push(tag::CHANNEL_MAP);
        self.data.push(map.positions.len() as u8);
        self.data
            .extend(map.positions.iter().map(|position| *position as u8));
        self
    }

    pub fn put_cvolume(&mut self, volume: &CVolume) -> &mut Self {
        self.data.push(tag::CVOLUME);
        self.data.push(volume.values.len() as u8);
        for value in &volume.values {
            self.data.extend_from_slice(&value.to_be_bytes());
        }
        self
    }

    /// Length-prefixed raw blob
    pub fn put_arbitrary(&mut self, bytes: &[u8]) -> Result<&mut Self, ProtocolError> {
        let len =
            u32::try_from(bytes.len()).map_err(|_| ProtocolError::PayloadTooLarge(bytes.len()))?;
        self.data.push(tag::ARBITRARY);
        self.data.extend_from_slice(&len.to_be_bytes());
        self.data.extend_from_slice(bytes);
        Ok(self)
    }

    /// Property list with no entries: the tag followed by its terminator
    pub fn put_empty_proplist(&mut self) -> &mut Self {
        self.data.push(tag::PROPLIST);
        self.data.push(tag::STRING_NULL);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_tags() {
        let mut ts = TagStruct::new();
        ts.put_u32(0xDEAD_BEEF).put_u8(7).put_bool(true).put_bool(false);

        assert_eq!(
            ts.as_bytes(),
            &[b'L', 0xDE, 0xAD, 0xBE, 0xEF, b'B', 7, b'1', b'0']
        );
    }

    #[test]
    fn test_strings() {
        let mut ts = TagStruct::new();
        ts.put_string(None).put_string(Some("sink"));

        assert_eq!(ts.as_bytes(), b"Ntsink\0");
    }

    #[test]
    fn test_sample_spec_and_channel_map() {
        let mut ts = TagStruct::new();
        ts.put_sample_spec(&SampleSpec::float32le_stereo())
            .put_channel_map(&ChannelMap::stereo());

        assert_eq!(
            ts.as_bytes(),
            &[b'a', 5, 2, 0x00, 0x00, 0xAC, 0x44, b'm', 2, 1, 2]
        );
    }

    #[test]
    fn test_cvolume() {
        let mut ts = TagStruct::new();
        ts.put_cvolume(&CVolume::uniform(2, 0x100));

        assert_eq!(ts.as_bytes(), &[b'v', 2, 0, 0, 1, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_arbitrary_and_proplist() {
        let mut ts = TagStruct::new();
        ts.put_arbitrary(&[9, 8]).unwrap().put_empty_proplist();

        assert_eq!(ts.as_bytes(), &[b'x', 0, 0, 0, 2, 9, 8, b'P', b'N']);
        assert_eq!(ts.len(), 9);
    }

    #[test]
    fn test_channel_limits() {
        assert!(ChannelMap::new(vec![ChannelPosition::Mono; CHANNELS_MAX]).is_ok());
        assert!(matches!(
            ChannelMap::new(vec![ChannelPosition::Mono; CHANNELS_MAX + 1]),
            Err(ProtocolError::TooManyEntries { .. })
        ));
        assert!(CVolume::new(vec![0; CHANNELS_MAX + 1]).is_err());
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(SampleSpec::float32le_stereo().frame_size(), 8);
    }
}
