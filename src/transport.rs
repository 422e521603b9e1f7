//! Downward capability the write path flushes through. This crate is
//! sans-io: the read path is driven by feeding whole datagrams into
//! [`crate::record_layer::RecordLayer`] and polling it for records (see
//! that module), the same pull model `Endpoint::read`/`poll_transmit`
//! use rather than an owned socket. Only the outbound direction needs a
//! real capability trait, since the partial-write retry guard is
//! meaningless without something to retry against.

use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The whole buffer was accepted by the transport.
    Sent,
    /// The transport would block; the caller must retry with the
    /// exact same buffer later.
    WouldBlock,
}

/// Whether the underlying datagram transport is reliable and ordered
/// (e.g. carried over SCTP), in which case the replay window is
/// skipped entirely.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportReliability {
    UnreliableUnordered,
    ReliableOrdered,
}

pub trait Transport: Send {
    /// Attempt to send exactly `buf` as a single datagram.
    fn send(&mut self, buf: &[u8]) -> Result<WriteOutcome>;
}
