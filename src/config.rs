use pulse_protocol::MAX_PAYLOAD_LEN;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;

/// Native protocol port used when an address omits one
pub const DEFAULT_PORT: u16 = 4713;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Playback command run on the remote side in SSH mode
pub const PACAT_COMMAND: &str = "pacat -p --format float32le --rate 44100 --channels 2";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("Invalid source '{0}': expected stdin, file:PATH or cmd:COMMAND")]
    InvalidSource(String),
    #[error("Invalid SSH destination '{0}': expected user@host[:port]")]
    InvalidSshDestination(String),
}

/// How each connection attempt reaches the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Plain TCP to the native protocol port
    Tcp { address: String },
    /// A spawned process; its stdin carries our output and its stdout is drained
    Process { program: String, args: Vec<String> },
}

impl TransportConfig {
    /// Accepts `host`, `host:port` and the `tcp:` prefix PULSE_SERVER uses
    pub fn tcp(server: &str) -> Result<Self, ConfigError> {
        let server = server.trim();
        if server.starts_with("unix:") || server.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                name: "server".to_string(),
                reason: "only tcp servers are supported".to_string(),
            });
        }
        let server = server.strip_prefix("tcp:").unwrap_or(server);
        if server.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "server".to_string(),
                reason: "address cannot be empty".to_string(),
            });
        }

        let address = match server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                server.to_string()
            }
            Some(_) if server.starts_with('[') && server.ends_with(']') => {
                format!("{}:{}", server, DEFAULT_PORT)
            }
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    name: "server".to_string(),
                    reason: format!("'{}' has an invalid port", server),
                })
            }
            None => format!("{}:{}", server, DEFAULT_PORT),
        };

        Ok(TransportConfig::Tcp { address })
    }

    /// Run `pacat` on `user@host[:port]` through ssh
    pub fn ssh_pacat(destination: &str) -> Result<Self, ConfigError> {
        let (user, host) = destination
            .split_once('@')
            .filter(|(user, host)| !user.is_empty() && !host.is_empty())
            .ok_or_else(|| ConfigError::InvalidSshDestination(destination.to_string()))?;

        let mut args = Vec::new();
        let host = match host.rsplit_once(':') {
            Some((host, port)) => {
                port.parse::<u16>()
                    .map_err(|_| ConfigError::InvalidSshDestination(destination.to_string()))?;
                args.push("-p".to_string());
                args.push(port.to_string());
                host
            }
            None => host,
        };
        args.push(format!("{}@{}", user, host));
        args.push(PACAT_COMMAND.to_string());

        Ok(TransportConfig::Process {
            program: "ssh".to_string(),
            args,
        })
    }

    /// Split a shell-like command line on whitespace
    pub fn process(command_line: &str) -> Result<Self, ConfigError> {
        let (program, args) = split_command(command_line).ok_or_else(|| {
            ConfigError::InvalidValue {
                name: "command".to_string(),
                reason: "command cannot be empty".to_string(),
            }
        })?;
        Ok(TransportConfig::Process { program, args })
    }
}

/// Where PCM bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Stdin,
    File(PathBuf),
    /// A capture command writing PCM to stdout, e.g. `parec --format=float32le`
    Command { program: String, args: Vec<String> },
}

impl FromStr for SourceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "stdin" || s == "-" {
            return Ok(SourceConfig::Stdin);
        }
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(ConfigError::InvalidSource(s.to_string()));
            }
            return Ok(SourceConfig::File(PathBuf::from(path)));
        }
        if let Some(command) = s.strip_prefix("cmd:") {
            let (program, args) =
                split_command(command).ok_or_else(|| ConfigError::InvalidSource(s.to_string()))?;
            return Ok(SourceConfig::Command { program, args });
        }
        Err(ConfigError::InvalidSource(s.to_string()))
    }
}

/// What goes over the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StreamMode {
    /// Native protocol: handshake, then framed data packets
    Native,
    /// Unframed PCM, for transports that already play it (pacat over ssh)
    Raw,
}

/// Everything the relay needs, passed in at construction
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub transport: TransportConfig,
    pub source: SourceConfig,
    pub mode: StreamMode,
    /// Largest payload read from the source per data packet
    pub chunk_size: usize,
    /// Delay between connection attempts
    pub retry_interval: Duration,
    /// Bytes buffered between capture and the current session
    pub pipe_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::Tcp {
                address: format!("127.0.0.1:{}", DEFAULT_PORT),
            },
            source: SourceConfig::Stdin,
            mode: StreamMode::Native,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Relay settings found in the environment (and `.env`), still unparsed.
///
/// Values are only parsed when applied, so a caller can drop the ones it
/// overrides before a bad value gets in the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    /// `PULSE_SERVER`
    pub server: Option<String>,
    /// `PULSE_RELAY_CHUNK_SIZE`
    pub chunk_size: Option<String>,
    /// `PULSE_RELAY_RETRY_MS`
    pub retry_ms: Option<String>,
    /// `PULSE_RELAY_PIPE_CAPACITY`
    pub pipe_capacity: Option<String>,
}

impl EnvSettings {
    pub fn load() -> Self {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        Self {
            server: env::var("PULSE_SERVER").ok(),
            chunk_size: env::var("PULSE_RELAY_CHUNK_SIZE").ok(),
            retry_ms: env::var("PULSE_RELAY_RETRY_MS").ok(),
            pipe_capacity: env::var("PULSE_RELAY_PIPE_CAPACITY").ok(),
        }
    }
}

impl RelayConfig {
    /// Defaults overlaid with `PULSE_SERVER` and the `PULSE_RELAY_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(&EnvSettings::load())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and apply every setting present. Does not validate the result.
    pub fn apply_env(&mut self, settings: &EnvSettings) -> Result<(), ConfigError> {
        if let Some(server) = &settings.server {
            self.transport = TransportConfig::tcp(server)?;
        }
        let chunk_size = settings.chunk_size.as_deref();
        if let Some(chunk_size) = parse_number("PULSE_RELAY_CHUNK_SIZE", chunk_size)? {
            self.chunk_size = chunk_size as usize;
        }
        let retry_ms = settings.retry_ms.as_deref();
        if let Some(retry_ms) = parse_number("PULSE_RELAY_RETRY_MS", retry_ms)? {
            self.retry_interval = Duration::from_millis(retry_ms);
        }
        let capacity = settings.pipe_capacity.as_deref();
        if let Some(capacity) = parse_number("PULSE_RELAY_PIPE_CAPACITY", capacity)? {
            self.pipe_capacity = capacity as usize;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chunk_size > MAX_PAYLOAD_LEN as usize {
            return Err(ConfigError::InvalidValue {
                name: "chunk_size".to_string(),
                reason: format!("cannot exceed {} bytes", MAX_PAYLOAD_LEN),
            });
        }
        if self.retry_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "retry_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pipe_capacity < self.chunk_size {
            return Err(ConfigError::InvalidValue {
                name: "pipe_capacity".to_string(),
                reason: format!("must be at least the chunk size ({})", self.chunk_size),
            });
        }
        match &self.transport {
            TransportConfig::Tcp { address } if address.trim().is_empty() => {
                Err(ConfigError::InvalidValue {
                    name: "server".to_string(),
                    reason: "address cannot be empty".to_string(),
                })
            }
            TransportConfig::Process { program, .. } if program.trim().is_empty() => {
                Err(ConfigError::InvalidValue {
                    name: "command".to_string(),
                    reason: "program cannot be empty".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

fn split_command(command_line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

fn parse_number(name: &str, value: Option<&str>) -> Result<Option<u64>, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}
