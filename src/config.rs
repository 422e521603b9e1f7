//! Downward dependency injection surface plus validation, built the
//! way a validate-then-build constructor should be: bad configuration
//! is rejected with a `Result`, never a panic. No environment
//! variables, no files, no CLI: callers build a config in code.

use crate::error::{Error, Result};
use crate::header::{ProtocolVersion, MAX_COMPRESSED};
use crate::transport::TransportReliability;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Which half of a connection a `RecordLayer` serves. A connection
/// pairs one `Read` instance with one `Write` instance, each carrying
/// its own epoch/key/replay-window state; `RecordLayer` enforces this
/// at the method level (`receive_datagram`/`poll_record` require
/// `Read`, `write_records` requires `Write`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Clone, Debug)]
pub struct RecordLayerConfig {
    pub role: Role,
    pub direction: Direction,
    pub protocol_version: ProtocolVersion,
    pub initial_epoch: u16,
    pub max_fragment_len: usize,
    pub overhead_budget: usize,
    pub transport_reliability: TransportReliability,
}

pub struct RecordLayerConfigBuilder {
    role: Role,
    direction: Direction,
    protocol_version: ProtocolVersion,
    initial_epoch: u16,
    max_fragment_len: usize,
    overhead_budget: usize,
    transport_reliability: TransportReliability,
}

/// Default maximum plaintext fragment length (RFC 6347 / TLS default).
pub const DEFAULT_MAX_FRAGMENT_LEN: usize = 1 << 14;
/// Default budget for explicit-IV + MAC + padding + AEAD tag overhead
/// counted against a record's on-the-wire length.
pub const DEFAULT_OVERHEAD_BUDGET: usize = 2048;

impl Default for RecordLayerConfigBuilder {
    fn default() -> Self {
        Self {
            role: Role::Client,
            direction: Direction::Read,
            protocol_version: ProtocolVersion::DTLS1_2,
            initial_epoch: 0,
            max_fragment_len: DEFAULT_MAX_FRAGMENT_LEN,
            overhead_budget: DEFAULT_OVERHEAD_BUDGET,
            transport_reliability: TransportReliability::UnreliableUnordered,
        }
    }
}

impl RecordLayerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn initial_epoch(mut self, epoch: u16) -> Self {
        self.initial_epoch = epoch;
        self
    }

    pub fn max_fragment_len(mut self, len: usize) -> Self {
        self.max_fragment_len = len;
        self
    }

    pub fn overhead_budget(mut self, budget: usize) -> Self {
        self.overhead_budget = budget;
        self
    }

    /// Mark the transport as a reliable, ordered datagram service
    /// (e.g. SCTP), which skips replay-window checks entirely. Modeled
    /// as a capability flag rather than a compile-time toggle.
    pub fn transport_reliability(mut self, reliability: TransportReliability) -> Self {
        self.transport_reliability = reliability;
        self
    }

    pub fn build(self) -> Result<RecordLayerConfig> {
        if self.max_fragment_len == 0 || self.max_fragment_len > MAX_COMPRESSED {
            return Err(Error::Config(format!(
                "max_fragment_len {} out of range (1..={})",
                self.max_fragment_len, MAX_COMPRESSED
            )));
        }
        Ok(RecordLayerConfig {
            role: self.role,
            direction: self.direction,
            protocol_version: self.protocol_version,
            initial_epoch: self.initial_epoch,
            max_fragment_len: self.max_fragment_len,
            overhead_budget: self.overhead_budget,
            transport_reliability: self.transport_reliability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let cfg = RecordLayerConfigBuilder::new().build().unwrap();
        assert_eq!(cfg.initial_epoch, 0);
        assert_eq!(cfg.max_fragment_len, DEFAULT_MAX_FRAGMENT_LEN);
    }

    #[test]
    fn rejects_zero_fragment_len() {
        let err = RecordLayerConfigBuilder::new()
            .max_fragment_len(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_oversized_fragment_len() {
        let err = RecordLayerConfigBuilder::new()
            .max_fragment_len(MAX_COMPRESSED + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
