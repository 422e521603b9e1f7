//! Typed interfaces the core consumes for the concerns left to
//! external collaborators: cipher/MAC primitives and compression.
//! Negotiation, certificate handling, and key schedule derivation stay
//! entirely outside this crate; a caller hands in already-keyed
//! implementations of these traits at construction.

use crate::error::Result;
use crate::header::RecordHeader;

/// How a cipher suite is combined with message authentication,
/// independent of the cipher implementation itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MacMode {
    /// The cipher is an AEAD; it authenticates on its own and no
    /// separate `MacAlgorithm` is consulted.
    Aead,
    /// MAC-then-encrypt: MAC is computed over the plaintext, then the
    /// plaintext+MAC is encrypted.
    MacThenEncrypt,
    /// Encrypt-then-MAC: the plaintext is encrypted first, then the
    /// MAC is computed over the ciphertext.
    EncryptThenMac,
}

/// A keyed bulk cipher. Implementations own their key material; the
/// record layer only ever calls `encrypt`/`decrypt` with a header (for
/// epoch/seq-derived nonces and associated data) and a body.
pub trait CipherProtection: Send + Sync {
    /// Bytes of explicit, per-record IV transmitted in the clear ahead
    /// of the ciphertext: 0 for a stream cipher,
    /// the block size for CBC, 8 for GCM/CCM.
    fn explicit_iv_len(&self) -> usize;

    /// Whether this cipher authenticates on its own (AEAD) or needs a
    /// separate `MacAlgorithm` collaborator.
    fn mac_mode(&self) -> MacMode;

    /// Encrypt `plaintext` (which, for MAC-then-encrypt ciphers, already
    /// has the MAC appended by the caller) into a full record body:
    /// explicit IV followed by ciphertext (and AEAD tag, if any).
    fn encrypt(&self, header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a full record body (explicit IV + ciphertext [+ tag])
    /// back to plaintext. Any failure here is an *opaque* decrypt
    /// failure: the pipeline maps it to a silent drop when not in
    /// encrypt-then-MAC mode, and it never reveals *why* decryption
    /// failed to the peer.
    fn decrypt(&self, header: &RecordHeader, body: &[u8]) -> Result<Vec<u8>>;
}

/// A MAC used in either MAC-then-encrypt or encrypt-then-MAC mode.
pub trait MacAlgorithm: Send + Sync {
    fn mac_size(&self) -> usize;

    /// Compute the MAC over `data` (plaintext for MtE, ciphertext for
    /// ETM) using `header` for the sequence-number-derived additional
    /// data TLS/DTLS MACs authenticate over.
    fn compute(&self, header: &RecordHeader, data: &[u8]) -> Vec<u8>;
}

/// Compression algorithm selection is out of scope for this crate; it
/// only needs somewhere to hang a (de)compress call so the pipeline's
/// decompress step has a real collaborator to invoke.
pub trait Compressor: Send + Sync {
    fn compress(&self, input: &[u8]) -> Vec<u8>;

    /// Decompress `input`. An `Err` here is always the fatal
    /// `decompression_failure`/`record_overflow` path, never a silent
    /// drop.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// The identity compressor: passthrough. Used whenever no compression
/// method was negotiated (the overwhelmingly common case).
#[derive(Default, Clone, Copy)]
pub struct NullCompression;

impl Compressor for NullCompression {
    fn compress(&self, input: &[u8]) -> Vec<u8> {
        input.to_vec()
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

/// The identity cipher: no confidentiality, no authentication. Used for
/// epoch 0 (the cleartext epoch every DTLS connection starts in).
#[derive(Default, Clone, Copy)]
pub struct NullCipher;

impl CipherProtection for NullCipher {
    fn explicit_iv_len(&self) -> usize {
        0
    }

    fn mac_mode(&self) -> MacMode {
        MacMode::Aead
    }

    fn encrypt(&self, _header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _header: &RecordHeader, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }
}
