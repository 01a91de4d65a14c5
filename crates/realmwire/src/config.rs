//! Server configuration.
//!
//! Every field has a default, so a config file only lists what it changes:
//!
//! ```json
//! {
//!     "bind_addr": "0.0.0.0:8085",
//!     "inbound_opcode_width": "u32",
//!     "idle_timeout_secs": 120
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use realmwire_protocol::{
    DEFAULT_MAX_MESSAGE_SIZE, FrameCodec, Opcode, OpcodeWidth,
};
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// The file that was requested.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has unknown or mistyped keys.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The values parse but cannot run together.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for a [`RealmwireServer`](crate::RealmwireServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,

    /// Largest `length` (opcode + body) accepted or sent. At most 65535.
    pub max_message_size: usize,

    /// Seconds an authenticated connection may stay silent before it is
    /// closed.
    pub idle_timeout_secs: u64,

    /// Seconds a new connection has to complete authentication.
    pub handshake_timeout_secs: u64,

    /// Opcode field width of client → server frames.
    pub inbound_opcode_width: OpcodeWidth,

    /// Opcode field width of server → client frames.
    pub outbound_opcode_width: OpcodeWidth,

    /// Opcode carrying the client's auth request. Intercepted before
    /// dispatch while the session is unauthenticated.
    pub auth_opcode: Opcode,

    /// Opcode of the challenge frame (a `u32` seed) sent on accept.
    /// `None` sends no challenge.
    pub challenge_opcode: Option<Opcode>,

    /// Whether a handler violation closes the connection.
    pub disconnect_on_violation: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8085".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_timeout_secs: 60,
            handshake_timeout_secs: 30,
            inbound_opcode_width: OpcodeWidth::U16,
            outbound_opcode_width: OpcodeWidth::U16,
            auth_opcode: Opcode(0x01ED),
            challenge_opcode: Some(Opcode(0x01EC)),
            disconnect_on_violation: true,
        }
    }
}

impl ServerConfig {
    /// Loads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), "loaded server config");
        Ok(config)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values can run together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ceiling = usize::from(u16::MAX);
        if self.max_message_size > ceiling {
            return Err(ConfigError::Invalid(format!(
                "max_message_size {} exceeds the 16-bit length field ({ceiling})",
                self.max_message_size
            )));
        }
        let floor = self
            .inbound_opcode_width
            .size()
            .max(self.outbound_opcode_width.size());
        if self.max_message_size < floor {
            return Err(ConfigError::Invalid(format!(
                "max_message_size {} cannot hold a {floor}-byte opcode",
                self.max_message_size
            )));
        }
        if self.idle_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least one second".into(),
            ));
        }
        if self.auth_opcode.0 > self.inbound_opcode_width.max_opcode() {
            return Err(ConfigError::Invalid(format!(
                "auth_opcode {} does not fit the {} inbound opcode field",
                self.auth_opcode, self.inbound_opcode_width
            )));
        }
        if let Some(challenge) = self.challenge_opcode {
            if challenge.0 > self.outbound_opcode_width.max_opcode() {
                return Err(ConfigError::Invalid(format!(
                    "challenge_opcode {challenge} does not fit the {} outbound opcode field",
                    self.outbound_opcode_width
                )));
            }
            // The seed body is 4 bytes.
            if self.outbound_opcode_width.size() + 4 > self.max_message_size {
                return Err(ConfigError::Invalid(
                    "max_message_size cannot hold the challenge frame".into(),
                ));
            }
        }
        Ok(())
    }

    /// The frame codec these settings describe.
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new()
            .with_max_message_size(self.max_message_size)
            .with_opcode_widths(
                self.inbound_opcode_width,
                self.outbound_opcode_width,
            )
    }

    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Handshake timeout as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
