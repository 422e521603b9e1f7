//! Test-fixture cipher suites.
//!
//! `crate::crypto` defines the traits the record layer consumes;
//! negotiating or choosing a cipher suite is explicitly out of scope
//! for this crate. These implementations exist so the round-trip and
//! ETM/MtE tests have something real to exercise, not as a
//! suite-selection surface. None of them implement exact RFC wire
//! compatibility (AAD construction in particular is simplified); they
//! only need to be internally consistent encrypt/decrypt pairs.

pub mod aes128cbc_hmac_sha1;
pub mod aes128cbc_hmac_sha1_etm;
pub mod aes128gcm;

fn additional_data(header: &crate::header::RecordHeader) -> [u8; 11] {
    let mut aad = [0u8; 11];
    aad[0] = header.content_type.to_u8();
    aad[1] = header.version.major;
    aad[2] = header.version.minor;
    aad[3..5].copy_from_slice(&header.epoch.to_be_bytes());
    aad[5..11].copy_from_slice(&header.sequence_number.to_be_bytes()[2..8]);
    aad
}
