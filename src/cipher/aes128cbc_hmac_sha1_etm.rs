//! AES-128-CBC, encrypt-then-MAC: the companion cipher mode to
//! [`super::aes128cbc_hmac_sha1`]'s MAC-then-encrypt. Confidentiality
//! is identical CBC; only `mac_mode()` differs, so the record layer
//! computes the tag over the ciphertext here instead of over the
//! plaintext.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::crypto::{CipherProtection, MacMode};
use crate::error::{Error, Result};
use crate::header::RecordHeader;

type Enc = cbc::Encryptor<Aes128>;
type Dec = cbc::Decryptor<Aes128>;

const BLOCK_LEN: usize = 16;

pub struct Aes128CbcEtmSuite {
    key: [u8; 16],
}

impl Aes128CbcEtmSuite {
    pub fn new(key: [u8; 16]) -> Self {
        Self { key }
    }
}

impl CipherProtection for Aes128CbcEtmSuite {
    fn explicit_iv_len(&self) -> usize {
        BLOCK_LEN
    }

    fn mac_mode(&self) -> MacMode {
        MacMode::EncryptThenMac
    }

    fn encrypt(&self, _header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; BLOCK_LEN];
        rand::rng().fill_bytes(&mut iv);
        let ciphertext = Enc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut body = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
        body.extend_from_slice(&iv);
        body.extend_from_slice(&ciphertext);
        Ok(body)
    }

    fn decrypt(&self, _header: &RecordHeader, body: &[u8]) -> Result<Vec<u8>> {
        if body.len() < BLOCK_LEN || (body.len() - BLOCK_LEN) % BLOCK_LEN != 0 {
            return Err(Error::Cipher(Box::new(CbcError(
                "malformed CBC body length".into(),
            ))));
        }
        let (iv, ciphertext) = body.split_at(BLOCK_LEN);
        Dec::new(&self.key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| Error::Cipher(Box::new(CbcError(e.to_string()))))
    }
}

#[derive(Debug)]
struct CbcError(String);

impl std::fmt::Display for CbcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "aes-cbc-etm: {}", self.0)
    }
}
impl std::error::Error for CbcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::aes128cbc_hmac_sha1::HmacSha1Mac;
    use crate::content::ContentType;
    use crate::crypto::MacAlgorithm;
    use crate::header::ProtocolVersion;
    use subtle::ConstantTimeEq;

    fn header() -> RecordHeader {
        RecordHeader {
            content_type: ContentType::ApplicationData,
            version: ProtocolVersion::DTLS1_2,
            epoch: 2,
            sequence_number: 11,
            length: 0,
        }
    }

    #[test]
    fn round_trips_with_mac_over_ciphertext() {
        let cipher = Aes128CbcEtmSuite::new([5u8; 16]);
        let mac = HmacSha1Mac::new(vec![6u8; 20]);
        let h = header();

        let ciphertext = cipher.encrypt(&h, b"encrypt then mac").unwrap();
        let tag = mac.compute(&h, &ciphertext);
        let expected_tag = mac.compute(&h, &ciphertext);
        assert_eq!(expected_tag.ct_eq(&tag).unwrap_u8(), 1);

        let plaintext = cipher.decrypt(&h, &ciphertext).unwrap();
        assert_eq!(plaintext, b"encrypt then mac");
    }

    #[test]
    fn tampered_ciphertext_mac_mismatches_without_ever_decrypting() {
        let cipher = Aes128CbcEtmSuite::new([5u8; 16]);
        let mac = HmacSha1Mac::new(vec![6u8; 20]);
        let h = header();

        let mut ciphertext = cipher.encrypt(&h, b"encrypt then mac").unwrap();
        let tag = mac.compute(&h, &ciphertext);
        ciphertext[0] ^= 0xff;

        let expected_tag = mac.compute(&h, &ciphertext);
        assert_eq!(expected_tag.ct_eq(&tag).unwrap_u8(), 0);
    }
}
