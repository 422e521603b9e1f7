//! The four record content types DTLS puts on the wire.

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub fn to_u8(self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }

    /// Whether the epoch router ever lets this content type jump ahead to
    /// the next epoch while keys for it are still missing.
    pub fn eligible_for_next_epoch(self) -> bool {
        matches!(self, ContentType::Handshake | ContentType::Alert)
    }
}

/// A parsed alert or change-cipher-spec body. Handshake and
/// application-data bodies stay opaque bytes: reassembly of handshake
/// fragments and interpretation of application data is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    ChangeCipherSpec,
    Alert(Alert),
    Handshake(Vec<u8>),
    ApplicationData(Vec<u8>),
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::ChangeCipherSpec => ContentType::ChangeCipherSpec,
            Content::Alert(_) => ContentType::Alert,
            Content::Handshake(_) => ContentType::Handshake,
            Content::ApplicationData(_) => ContentType::ApplicationData,
        }
    }

    /// Decode a record body given its content type. The framing layer
    /// treats anything past the header as opaque length-checked bytes, so
    /// malformed alert/CCS bodies only surface as a decode failure here.
    pub fn decode(content_type: ContentType, body: &[u8]) -> Result<Self> {
        match content_type {
            ContentType::ChangeCipherSpec => {
                if body.first() != Some(&1) {
                    return Err(Error::fatal(
                        AlertDescription::DecodeError,
                        "malformed change_cipher_spec body",
                    ));
                }
                Ok(Content::ChangeCipherSpec)
            }
            ContentType::Alert => {
                if body.len() < 2 {
                    return Err(Error::fatal(
                        AlertDescription::DecodeError,
                        "alert body shorter than 2 bytes",
                    ));
                }
                let level = AlertLevel::from_u8(body[0]).ok_or_else(|| {
                    Error::fatal(AlertDescription::DecodeError, "unknown alert level")
                })?;
                let description = AlertDescription::from_u8(body[1]).ok_or_else(|| {
                    Error::fatal(AlertDescription::DecodeError, "unknown alert description")
                })?;
                Ok(Content::Alert(Alert { level, description }))
            }
            ContentType::Handshake => Ok(Content::Handshake(body.to_vec())),
            ContentType::ApplicationData => Ok(Content::ApplicationData(body.to_vec())),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Content::ChangeCipherSpec => vec![1],
            Content::Alert(a) => vec![a.level as u8, a.description as u8],
            Content::Handshake(b) => b.clone(),
            Content::ApplicationData(b) => b.clone(),
        }
    }
}
