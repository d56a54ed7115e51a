//! Centralized client configuration.
//!
//! Loaded via the `config` crate from `PARLEY_`-prefixed environment
//! variables, with `__` separating nested keys:
//!
//! - `PARLEY_CHANNEL__COUNTERPART_ID` (required)
//! - `PARLEY_CHANNEL__STRICT_ISOLATION`
//! - `PARLEY_PRINCIPAL_ID`
//! - `PARLEY_COUNTERPART_LABEL`
//! - `PARLEY_NATS__URL`, `PARLEY_NATS__COLLECTION`, `PARLEY_NATS__STREAM_NAME`
//!
//! Without a NATS URL the client keeps messages in memory.

use parley_conversation::{ChannelConfig, NatsConfig};
use parley_core::PrincipalId;
use serde::Deserialize;

/// Client configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// Principal signed in at startup. Absent means start signed out.
    #[serde(default)]
    pub principal_id: Option<PrincipalId>,

    /// Name shown for the counterpart's messages.
    #[serde(default = "default_counterpart_label")]
    pub counterpart_label: String,

    /// Conversation channel configuration.
    pub channel: ChannelConfig,

    /// Message store on NATS JetStream.
    #[serde(default)]
    pub nats: Option<NatsConfig>,
}

fn default_counterpart_label() -> String {
    "Admin".to_string()
}

impl CliConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("PARLEY")
        .prefix_separator("_")
        .separator("__")
}
