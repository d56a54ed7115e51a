//! Conversation channel configuration.

use parley_core::PrincipalId;
use serde::{Deserialize, Serialize};

/// Configuration for a conversation channel.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// The fixed counterpart every conversation is held with.
    counterpart_id: PrincipalId,
    /// Restrict the conversation view to records whose participants are
    /// exactly `{principal, counterpart}`.
    /// Default: false (any record that includes the principal is shown)
    #[serde(default)]
    strict_isolation: bool,
}

impl ChannelConfig {
    /// Creates a configuration for chatting with `counterpart_id`.
    #[must_use]
    pub fn new(counterpart_id: PrincipalId) -> Self {
        Self {
            counterpart_id,
            strict_isolation: false,
        }
    }

    /// Enables or disables strict conversation isolation.
    #[must_use]
    pub fn with_strict_isolation(mut self, strict: bool) -> Self {
        self.strict_isolation = strict;
        self
    }

    /// Returns the counterpart identifier.
    #[must_use]
    pub fn counterpart_id(&self) -> &PrincipalId {
        &self.counterpart_id
    }

    /// Returns true if the view is restricted to the exact pair.
    #[must_use]
    pub fn strict_isolation(&self) -> bool {
        self.strict_isolation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_isolation_defaults_off() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"counterpart_id":"admin1"}"#).expect("deserialize");

        assert_eq!(config.counterpart_id().as_str(), "admin1");
        assert!(!config.strict_isolation());
    }

    #[test]
    fn builder_sets_isolation() {
        let config = ChannelConfig::new(PrincipalId::new("admin1")).with_strict_isolation(true);
        assert!(config.strict_isolation());
    }
}
