//! Alert levels/descriptions the record layer needs to know about.
//!
//! The full DTLS alert catalog belongs to the handshake layer; this
//! crate only needs the subset it can itself raise plus
//! `CloseNotify`, since a peer alert record of that description is
//! something the record layer parses on the way up to the caller.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    DecompressionFailure = 30,
    InternalError = 80,
    DecodeError = 50,
    BadRecordMac = 20,
    RecordOverflow = 22,
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Option<Self> {
        use AlertDescription::*;
        Some(match v {
            0 => CloseNotify,
            10 => UnexpectedMessage,
            20 => BadRecordMac,
            22 => RecordOverflow,
            30 => DecompressionFailure,
            50 => DecodeError,
            80 => InternalError,
            _ => return None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}
