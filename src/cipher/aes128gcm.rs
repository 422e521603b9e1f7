use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::RngCore;

use crate::crypto::{CipherProtection, MacMode};
use crate::error::{Error, Result};
use crate::header::RecordHeader;

const EXPLICIT_IV_LEN: usize = 8;
const FIXED_IV_LEN: usize = 4;

/// AES-128-GCM, AEAD. The explicit per-record nonce component is
/// random rather than the RFC 5288 sequence-number convention, so two
/// suite instances talking to each other over this crate's test
/// fixtures don't need to agree on anything beyond the key.
pub struct Aes128GcmSuite {
    cipher: Aes128Gcm,
    fixed_iv: [u8; FIXED_IV_LEN],
}

impl Aes128GcmSuite {
    pub fn new(key: &[u8; 16], fixed_iv: [u8; FIXED_IV_LEN]) -> Self {
        Self {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key)),
            fixed_iv,
        }
    }

    fn nonce(&self, explicit_iv: &[u8]) -> Nonce {
        let mut n = [0u8; 12];
        n[..FIXED_IV_LEN].copy_from_slice(&self.fixed_iv);
        n[FIXED_IV_LEN..].copy_from_slice(explicit_iv);
        *Nonce::from_slice(&n)
    }
}

impl CipherProtection for Aes128GcmSuite {
    fn explicit_iv_len(&self) -> usize {
        EXPLICIT_IV_LEN
    }

    fn mac_mode(&self) -> MacMode {
        MacMode::Aead
    }

    fn encrypt(&self, header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut explicit_iv = [0u8; EXPLICIT_IV_LEN];
        rand::rng().fill_bytes(&mut explicit_iv);
        let nonce = self.nonce(&explicit_iv);
        let aad = super::additional_data(header);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                aes_gcm::aead::Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| Error::Cipher(Box::new(GcmError(e.to_string()))))?;

        let mut body = Vec::with_capacity(EXPLICIT_IV_LEN + ciphertext.len());
        body.extend_from_slice(&explicit_iv);
        body.extend_from_slice(&ciphertext);
        Ok(body)
    }

    fn decrypt(&self, header: &RecordHeader, body: &[u8]) -> Result<Vec<u8>> {
        if body.len() < EXPLICIT_IV_LEN {
            return Err(Error::Cipher(Box::new(GcmError(
                "body shorter than explicit IV".into(),
            ))));
        }
        let (explicit_iv, ciphertext) = body.split_at(EXPLICIT_IV_LEN);
        let nonce = self.nonce(explicit_iv);
        let aad = super::additional_data(header);
        self.cipher
            .decrypt(
                &nonce,
                aes_gcm::aead::Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|e| Error::Cipher(Box::new(GcmError(e.to_string()))))
    }
}

#[derive(Debug)]
struct GcmError(String);

impl std::fmt::Display for GcmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "aes-gcm: {}", self.0)
    }
}
impl std::error::Error for GcmError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentType;
    use crate::header::ProtocolVersion;

    fn header() -> RecordHeader {
        RecordHeader {
            content_type: ContentType::ApplicationData,
            version: ProtocolVersion::DTLS1_2,
            epoch: 1,
            sequence_number: 7,
            length: 0,
        }
    }

    #[test]
    fn round_trips() {
        let suite = Aes128GcmSuite::new(&[9u8; 16], [1, 2, 3, 4]);
        let h = header();
        let body = suite.encrypt(&h, b"hello dtls").unwrap();
        let plaintext = suite.decrypt(&h, &body).unwrap();
        assert_eq!(plaintext, b"hello dtls");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let suite = Aes128GcmSuite::new(&[9u8; 16], [1, 2, 3, 4]);
        let h = header();
        let mut body = suite.encrypt(&h, b"hello dtls").unwrap();
        let last = body.len() - 1;
        body[last] ^= 0xff;
        assert!(suite.decrypt(&h, &body).is_err());
    }
}
