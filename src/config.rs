//! # Link Configuration
//!
//! Port address and the protocol's timing contract.
//!
//! The delays below are observable protocol behavior: the peer (or printer)
//! is written against them. They default to the values the nibble and strobe
//! protocols were designed with and can be overridden from a TOML file.
//!
//! | Field | Default | Used by |
//! |-------|---------|---------|
//! | `line_settle` | 10 µs | sender, after the arm marker |
//! | `handshake_poll` | 10 ms | sender handshake wait |
//! | `transfer_settle` | 500 ms | sender, after the high nibble |
//! | `release_settle` | 100 ms | sender, before the idle marker |
//! | `status_poll` | 1 s | printer busy/ack waits |
//! | `connection_poll` | 5 s | printer connection wait |
//! | `receive_poll` | 0 (yield) | receiver poll, below `line_settle` |
//! | `handshake_timeout` | 5 s | bound on a stalled peer (optional) |
//!
//! The sender holds its arm marker for only `line_settle`, and the receiver
//! has to see it, so a nonzero `receive_poll` must be shorter than
//! `line_settle`. A zero `receive_poll` yields the thread between reads
//! instead of sleeping.
//!
//! ## File Format
//!
//! Durations are integer microseconds:
//!
//! ```toml
//! base = 0x278
//!
//! [timing]
//! transfer_settle = 250000
//! handshake_timeout = 10000000
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LinkError;
use crate::transport::DEFAULT_BASE;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// I/O base address of the port (LPT1 = 0x378, LPT2 = 0x278)
    pub base: u16,

    pub timing: Timing,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            timing: Timing::default(),
        }
    }
}

impl LinkConfig {
    /// Load from a TOML file. Missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
            .map_err(|e| LinkError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, LinkError> {
        let config: Self = toml::from_str(text).map_err(|e| LinkError::Config(e.to_string()))?;
        config.timing.validate()?;
        Ok(config)
    }
}

/// Protocol delays and poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    #[serde(with = "micros")]
    pub line_settle: Duration,
    #[serde(with = "micros")]
    pub handshake_poll: Duration,
    #[serde(with = "micros")]
    pub transfer_settle: Duration,
    #[serde(with = "micros")]
    pub release_settle: Duration,
    #[serde(with = "micros")]
    pub status_poll: Duration,
    #[serde(with = "micros")]
    pub connection_poll: Duration,
    #[serde(with = "micros")]
    pub receive_poll: Duration,
    /// `None` waits forever; `0` in the file also means forever.
    #[serde(with = "opt_micros")]
    pub handshake_timeout: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            line_settle: Duration::from_micros(10),
            handshake_poll: Duration::from_millis(10),
            transfer_settle: Duration::from_millis(500),
            release_settle: Duration::from_millis(100),
            status_poll: Duration::from_secs(1),
            connection_poll: Duration::from_secs(5),
            receive_poll: Duration::ZERO,
            handshake_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl Timing {
    /// Every delay zeroed and no stall bound. For simulated ports.
    pub const fn immediate() -> Self {
        Self {
            line_settle: Duration::ZERO,
            handshake_poll: Duration::ZERO,
            transfer_settle: Duration::ZERO,
            release_settle: Duration::ZERO,
            status_poll: Duration::ZERO,
            connection_poll: Duration::ZERO,
            receive_poll: Duration::ZERO,
            handshake_timeout: None,
        }
    }

    /// Reject a receiver poll that could sleep through the arm marker.
    pub fn validate(&self) -> Result<(), LinkError> {
        if !self.receive_poll.is_zero() && self.receive_poll >= self.line_settle {
            return Err(LinkError::Config(format!(
                "receive_poll ({:?}) must be shorter than line_settle ({:?}) or zero",
                self.receive_poll, self.line_settle
            )));
        }
        Ok(())
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout.filter(|t| !t.is_zero());
        self
    }
}

mod micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_micros)
    }
}

mod opt_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let us = u64::deserialize(d)?;
        Ok((us > 0).then(|| Duration::from_micros(us)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_protocol_timing() {
        let t = Timing::default();
        assert_eq!(t.line_settle, Duration::from_micros(10));
        assert_eq!(t.handshake_poll, Duration::from_millis(10));
        assert_eq!(t.transfer_settle, Duration::from_millis(500));
        assert_eq!(t.status_poll, Duration::from_secs(1));
        assert_eq!(t.connection_poll, Duration::from_secs(5));
        assert_eq!(LinkConfig::default().base, 0x378);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(LinkConfig::from_toml("").unwrap(), LinkConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = LinkConfig::from_toml(
            "base = 0x278\n[timing]\ntransfer_settle = 250000\nhandshake_timeout = 0\n",
        )
        .unwrap();
        assert_eq!(config.base, 0x278);
        assert_eq!(config.timing.transfer_settle, Duration::from_millis(250));
        assert_eq!(config.timing.handshake_timeout, None);
        assert_eq!(config.timing.line_settle, Duration::from_micros(10));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = LinkConfig::from_toml("[timing]\nsettle = 1\n").unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn test_receive_poll_slower_than_arm_rejected() {
        let err = LinkConfig::from_toml("[timing]\nline_settle = 10\nreceive_poll = 50\n").unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));

        let config = LinkConfig::from_toml("[timing]\nline_settle = 100\nreceive_poll = 20\n").unwrap();
        assert_eq!(config.timing.receive_poll, Duration::from_micros(20));
        assert!(Timing::default().validate().is_ok());
        assert!(Timing::immediate().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_means_unbounded() {
        let t = Timing::default().with_handshake_timeout(Some(Duration::ZERO));
        assert_eq!(t.handshake_timeout, None);
    }

    #[test]
    fn test_missing_file() {
        let err = LinkConfig::load("/nonexistent/parport.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/parport.toml"));
    }
}
