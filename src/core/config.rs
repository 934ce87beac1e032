//! `SessionPolicy`: the typed configuration surface for session lifetime,
//! handshake timing, and the Nonce Cache, in a builder-over-a-plain-struct
//! style.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_MAX_SKEW, DEFAULT_NONCE_CACHE_CAPACITY, DEFAULT_NONCE_TTL,
    DEFAULT_PENDING_HANDSHAKE_TTL, DEFAULT_SESSION_IDLE_TIMEOUT, DEFAULT_SESSION_MAX_AGE,
    DEFAULT_SESSION_MAX_MESSAGES, DEFAULT_SWEEP_INTERVAL,
};

/// Session lifetime, handshake timing, and nonce-cache tuning.
///
/// Carries `serde` derives so an embedding application can source its
/// values from its own configuration format; this crate itself reads no
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Maximum session lifetime regardless of activity.
    pub max_age: Duration,
    /// Maximum time a session may sit idle before it expires.
    pub idle_timeout: Duration,
    /// Maximum messages a session may carry before it expires.
    pub max_messages: u64,
    /// Maximum accepted clock skew for handshake and signature timestamps.
    pub max_skew: Duration,
    /// TTL for a responder-side `PendingHandshake` record.
    pub pending_handshake_ttl: Duration,
    /// Bound on the Nonce Cache's entry count.
    pub nonce_cache_capacity: usize,
    /// Nonce retention window.
    pub nonce_ttl: Duration,
    /// Interval between Session Manager expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_SESSION_MAX_AGE,
            idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            max_messages: DEFAULT_SESSION_MAX_MESSAGES,
            max_skew: DEFAULT_MAX_SKEW,
            pending_handshake_ttl: DEFAULT_PENDING_HANDSHAKE_TTL,
            nonce_cache_capacity: DEFAULT_NONCE_CACHE_CAPACITY,
            nonce_ttl: DEFAULT_NONCE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl SessionPolicy {
    /// Start building a policy from the defaults.
    pub fn builder() -> SessionPolicyBuilder {
        SessionPolicyBuilder::default()
    }
}

/// Builder for [`SessionPolicy`].
#[derive(Debug, Default)]
pub struct SessionPolicyBuilder {
    policy: SessionPolicy,
}

macro_rules! setter {
    ($name:ident, $field:ident, $ty:ty) => {
        /// Override this field, returning `self` for chaining.
        pub fn $name(mut self, value: $ty) -> Self {
            self.policy.$field = value;
            self
        }
    };
}

impl SessionPolicyBuilder {
    setter!(max_age, max_age, Duration);
    setter!(idle_timeout, idle_timeout, Duration);
    setter!(max_messages, max_messages, u64);
    setter!(max_skew, max_skew, Duration);
    setter!(pending_handshake_ttl, pending_handshake_ttl, Duration);
    setter!(nonce_cache_capacity, nonce_cache_capacity, usize);
    setter!(nonce_ttl, nonce_ttl, Duration);
    setter!(sweep_interval, sweep_interval, Duration);

    /// Finish building.
    pub fn build(self) -> SessionPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_named_fields() {
        let policy = SessionPolicy::builder()
            .max_messages(10)
            .sweep_interval(Duration::from_secs(5))
            .build();
        assert_eq!(policy.max_messages, 10);
        assert_eq!(policy.sweep_interval, Duration::from_secs(5));
        assert_eq!(policy.max_age, DEFAULT_SESSION_MAX_AGE);
    }
}
