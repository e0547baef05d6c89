use crate::protocol::{frame, ProtocolError, CONTROL_CHANNEL};
use crate::tagstruct::{tag, CVolume, ChannelMap, SampleSpec, TagStruct};

/// Native protocol version announced during authentication
pub const PROTOCOL_VERSION: u32 = 0x20;

/// Length of the authentication cookie
pub const COOKIE_LEN: usize = 256;

/// Tag echoed back by the server in replies; replies are never read, so it is always 0
pub const COMMAND_TAG: u32 = 0;

/// Command opcodes sent on the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    Reply = 2,
    CreatePlaybackStream = 3,
    Auth = 8,
}

impl Command {
    pub fn from_opcode(opcode: u32) -> Option<Self> {
        match opcode {
            2 => Some(Command::Reply),
            3 => Some(Command::CreatePlaybackStream),
            8 => Some(Command::Auth),
            _ => None,
        }
    }

    /// Read the opcode a command body starts with
    pub fn peek_opcode(body: &[u8]) -> Option<u32> {
        match body {
            [tag::U32, a, b, c, d, ..] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }

    /// Start a command body with its opcode and tag
    fn begin(self) -> TagStruct {
        let mut ts = TagStruct::new();
        ts.put_u32(self as u32).put_u32(COMMAND_TAG);
        ts
    }
}

/// Authentication body: protocol version and an all-zero cookie
pub fn encode_auth() -> Result<Vec<u8>, ProtocolError> {
    let cookie = [0u8; COOKIE_LEN];

    let mut ts = Command::Auth.begin();
    ts.put_u32(PROTOCOL_VERSION);
    ts.put_arbitrary(&cookie)?;

    Ok(ts.into_bytes())
}

/// Empty reply to the command carrying `tag`, as a server sends it
pub fn encode_reply(tag: u32) -> Vec<u8> {
    let mut ts = TagStruct::new();
    ts.put_u32(Command::Reply as u32).put_u32(tag);
    ts.into_bytes()
}

/// [`encode_auth`] framed on the control channel
pub fn framed_auth() -> Result<Vec<u8>, ProtocolError> {
    frame(CONTROL_CHANNEL, &encode_auth()?)
}

/// Server-side buffer metrics in bytes. `u32::MAX` lets the server choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAttr {
    pub max_length: u32,
    pub target_length: u32,
    pub prebuf: u32,
    pub min_request: u32,
}

impl Default for BufferAttr {
    fn default() -> Self {
        Self {
            max_length: u32::MAX,
            target_length: 0,
            prebuf: u32::MAX,
            min_request: 0,
        }
    }
}

/// Parameters of the create-playback-stream command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStreamParams {
    pub sample_spec: SampleSpec,
    pub channel_map: ChannelMap,
    pub sink_index: u32,
    pub sink_name: Option<String>,
    pub buffer_attr: BufferAttr,
    pub corked: bool,
    pub sync_id: u32,
    pub volume: CVolume,
}

impl Default for PlaybackStreamParams {
    fn default() -> Self {
        let sample_spec = SampleSpec::float32le_stereo();
        Self {
            sample_spec,
            channel_map: ChannelMap::stereo(),
            sink_index: 0,
            sink_name: None,
            buffer_attr: BufferAttr::default(),
            corked: false,
            sync_id: 0,
            volume: CVolume::uniform(sample_spec.channels, 0x100),
        }
    }
}

impl PlaybackStreamParams {
    /// Encode the command body. Field order is fixed by the server's parser.
    pub fn encode(&self) -> Vec<u8> {
        let mut ts = Command::CreatePlaybackStream.begin();

        ts.put_sample_spec(&self.sample_spec)
            .put_channel_map(&self.channel_map)
            .put_u32(self.sink_index)
            .put_string(self.sink_name.as_deref())
            .put_u32(self.buffer_attr.max_length)
            .put_bool(self.corked)
            .put_u32(self.buffer_attr.target_length)
            .put_u32(self.buffer_attr.prebuf)
            .put_u32(self.buffer_attr.min_request)
            .put_u32(self.sync_id)
            .put_cvolume(&self.volume);

        // no_remap, no_remix, fix_format, fix_rate, fix_channels, no_move, variable_rate, muted
        for _ in 0..8 {
            ts.put_bool(false);
        }

        ts.put_bool(false) // adjust_latency
            .put_empty_proplist()
            .put_bool(false) // volume_set
            .put_bool(false) // early_requests
            .put_bool(false) // muted_set
            .put_bool(false) // dont_inhibit_auto_suspend
            .put_bool(false) // fail_on_suspend
            .put_bool(false) // relative_volume
            .put_bool(false) // passthrough
            .put_u8(0); // format info count

        ts.into_bytes()
    }
}

/// Create-playback-stream body for f32le stereo 44.1kHz on the default sink
pub fn encode_create_playback_stream() -> Vec<u8> {
    PlaybackStreamParams::default().encode()
}

/// [`encode_create_playback_stream`] framed on the control channel
pub fn framed_create_playback_stream() -> Result<Vec<u8>, ProtocolError> {
    frame(CONTROL_CHANNEL, &encode_create_playback_stream())
}
