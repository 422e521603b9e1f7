use std::io;

use thiserror::Error;

use crate::alert::AlertDescription;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can escape the record layer.
///
/// Under the DTLS threat model, most malformed or untrusted input is
/// a *silent drop*, never an `Error`. Only conditions that must be
/// alerted to the peer, or internal consistency failures, become
/// values of this type. See [`crate::record_layer::PipelineOutcome`]
/// for how the two are kept apart in the read path.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("record layer: write would block mid-record")]
    WouldBlock,

    #[error("record layer: buffer too short, need {want} have {have}")]
    BufferTooShort { want: usize, have: usize },

    #[error("record layer: record length {0} exceeds MAX_ENCRYPTED")]
    RecordTooLarge(usize),

    #[error("record layer: sequence number overflowed 48 bits")]
    SequenceNumberOverflow,

    #[error("record layer: multiple write templates in a single write_records call")]
    BatchedWriteRejected,

    #[error("record layer: retried write does not match the pending write (buf/type/len changed)")]
    BadWriteRetry,

    #[error("record layer: deferred queue is full")]
    DeferredQueueFull,

    #[error("record layer: malformed or unrecognized record header")]
    MalformedHeader,

    #[error("record layer: no cipher suite configured but encryption/decryption was requested")]
    CipherSuiteUnset,

    #[error("record layer: no MAC algorithm configured but one was required")]
    MacAlgorithmUnset,

    #[error("record layer: cipher suite error: {0}")]
    Cipher(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("record layer: mac verification error: {0}")]
    Mac(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("record layer: compression error: {0}")]
    Compression(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A condition that must be surfaced as a fatal alert to the peer.
    /// Carries the alert description the caller should emit.
    #[error("fatal alert {0:?}: {1}")]
    Fatal(AlertDescription, String),

    #[error("record layer config: {0}")]
    Config(String),
}

impl Error {
    pub fn fatal(desc: AlertDescription, reason: impl Into<String>) -> Self {
        Error::Fatal(desc, reason.into())
    }

    /// The alert description to send to the peer, if this error is one
    /// that must be surfaced. Non-fatal errors (plumbing, config) have
    /// no associated alert.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        match self {
            Error::Fatal(desc, _) => Some(*desc),
            _ => None,
        }
    }
}
