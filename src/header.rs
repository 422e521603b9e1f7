//! The 13-byte DTLS record header:
//! `[type:1][version_major:1][version_minor:1][epoch:2 BE][seq:6 BE][length:2 BE]`.

use byteorder::{BigEndian, ByteOrder};

use crate::alert::AlertDescription;
use crate::content::ContentType;
use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 13;

/// `MAX_ENCRYPTED`: the largest encrypted record body
/// this implementation will ever attempt to read, independent of any
/// negotiated fragment length.
pub const MAX_ENCRYPTED: usize = (1 << 14) + 2048;

/// `MAX_COMPRESSED`: the largest decompressed-but-still-protected body
/// (before MAC/explicit-IV stripping) a record is allowed to expand to.
pub const MAX_COMPRESSED: usize = (1 << 14) + 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const DTLS_ANY: ProtocolVersion = ProtocolVersion { major: 0, minor: 0 };
    pub const DTLS1_0: ProtocolVersion = ProtocolVersion {
        major: 254,
        minor: 255,
    };
    pub const DTLS1_2: ProtocolVersion = ProtocolVersion {
        major: 254,
        minor: 253,
    };

    pub fn is_any(self) -> bool {
        self == Self::DTLS_ANY
    }

    pub fn to_u16(self) -> u16 {
        ((self.major as u16) << 8) | self.minor as u16
    }

    pub fn from_u16(v: u16) -> Self {
        ProtocolVersion {
            major: (v >> 8) as u8,
            minor: (v & 0xff) as u8,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    /// 48-bit sequence number, stored widened.
    pub sequence_number: u64,
    pub length: u16,
}

impl RecordHeader {
    /// Parse a 13-byte buffer. A `None` content type or a structurally
    /// short buffer is a parse failure; the caller treats any `Err`
    /// here as a silent drop, never a fatal alert.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::BufferTooShort {
                want: HEADER_SIZE,
                have: buf.len(),
            });
        }
        let content_type = ContentType::from_u8(buf[0])
            .ok_or_else(|| Error::BufferTooShort { want: HEADER_SIZE, have: buf.len() })?;
        let version = ProtocolVersion {
            major: buf[1],
            minor: buf[2],
        };
        let epoch = BigEndian::read_u16(&buf[3..5]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes[2..8].copy_from_slice(&buf[5..11]);
        let sequence_number = BigEndian::read_u64(&seq_bytes);
        let length = BigEndian::read_u16(&buf[11..13]);

        Ok(RecordHeader {
            content_type,
            version,
            epoch,
            sequence_number,
            length,
        })
    }

    pub fn marshal(&self, out: &mut Vec<u8>) {
        out.push(self.content_type.to_u8());
        out.push(self.version.major);
        out.push(self.version.minor);
        let mut buf2 = [0u8; 2];
        BigEndian::write_u16(&mut buf2, self.epoch);
        out.extend_from_slice(&buf2);
        let mut seq8 = [0u8; 8];
        BigEndian::write_u64(&mut seq8, self.sequence_number);
        out.extend_from_slice(&seq8[2..8]);
        BigEndian::write_u16(&mut buf2, self.length);
        out.extend_from_slice(&buf2);
    }

    /// Validate framing-level constraints. Returns
    /// `Ok(())` when the header may proceed to a body read; an `Err`
    /// here is always a silent drop, never a fatal alert.
    pub fn validate(
        &self,
        is_first_record: bool,
        configured_major: u8,
        negotiated_version: Option<ProtocolVersion>,
        negotiated_max_frag: usize,
        overhead_budget: usize,
    ) -> Result<()> {
        if !is_first_record && self.content_type != ContentType::Alert {
            if let Some(negotiated) = negotiated_version {
                if negotiated.to_u16() != self.version.to_u16() {
                    return Err(Error::fatal(
                        AlertDescription::DecodeError,
                        "version mismatch on non-alert record",
                    ));
                }
            }
        }
        if self.version.major != configured_major && self.version.major != ProtocolVersion::DTLS_ANY.major
        {
            return Err(Error::MalformedHeader);
        }
        if self.length as usize > MAX_ENCRYPTED {
            return Err(Error::RecordTooLarge(self.length as usize));
        }
        if self.length as usize > negotiated_max_frag + overhead_budget {
            return Err(Error::RecordTooLarge(self.length as usize));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> RecordHeader {
        RecordHeader {
            content_type: ContentType::Handshake,
            version: ProtocolVersion::DTLS1_2,
            epoch: 3,
            sequence_number: 0x0000_1234_5678,
            length: 42,
        }
    }

    #[test]
    fn round_trips_through_marshal_parse() {
        let h = sample();
        let mut buf = vec![];
        h.marshal(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        let parsed = RecordHeader::parse(&buf).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(RecordHeader::parse(&[0u8; 5]).is_err());
    }

    #[test]
    fn rejects_unknown_content_type() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0] = 99;
        assert!(RecordHeader::parse(&buf).is_err());
    }

    #[test]
    fn scenario_version_tolerance() {
        let mut alert_hdr = sample();
        alert_hdr.content_type = ContentType::Alert;
        alert_hdr.version = ProtocolVersion::DTLS1_0;
        assert!(alert_hdr
            .validate(false, 254, Some(ProtocolVersion::DTLS1_2), 16384, 2048)
            .is_ok());

        let mut hs_hdr = sample();
        hs_hdr.version = ProtocolVersion::DTLS1_0;
        assert!(hs_hdr
            .validate(false, 254, Some(ProtocolVersion::DTLS1_2), 16384, 2048)
            .is_err());
    }

    #[test]
    fn scenario_length_overflow() {
        let mut h = sample();
        h.length = (MAX_ENCRYPTED + 1) as u16;
        assert!(h.validate(true, 254, None, 16384, 4096).is_err());
    }

    proptest! {
        #[test]
        fn parse_never_panics_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = RecordHeader::parse(&bytes);
        }

        #[test]
        fn header_round_trip_preserves_all_fields(
            ct_idx in 0..4usize,
            major in any::<u8>(),
            minor in any::<u8>(),
            epoch in any::<u16>(),
            seq in 0u64..(1u64 << 48),
            length in any::<u16>(),
        ) {
            let content_type = [
                ContentType::ChangeCipherSpec,
                ContentType::Alert,
                ContentType::Handshake,
                ContentType::ApplicationData,
            ][ct_idx];
            let h = RecordHeader {
                content_type,
                version: ProtocolVersion { major, minor },
                epoch,
                sequence_number: seq,
                length,
            };
            let mut buf = vec![];
            h.marshal(&mut buf);
            let parsed = RecordHeader::parse(&buf).unwrap();
            prop_assert_eq!(parsed, h);
        }
    }
}
