//! Payload codec: optional lz4 compression, then optional AES-256-GCM.
//!
//! The encryption key is derived per subject from the store's master key with
//! HKDF-SHA256, and the subject is also bound as associated data, so a blob
//! written for one subject cannot be opened under another.
//!
//! Encrypted layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use super::CacheError;
use crate::activity::SubjectId;
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use zeroize::Zeroizing;

const KEY_SALT: &[u8] = b"devcred-cache-encryption-v1";

/// Encodes payloads for the durable tier.
pub struct PayloadCodec {
    master_key: Zeroizing<Vec<u8>>,
    rng: SystemRandom,
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec").finish_non_exhaustive()
    }
}

impl PayloadCodec {
    /// Build from a 32-byte master key.
    pub fn new(master_key: &[u8]) -> Result<Self, CacheError> {
        if master_key.len() != 32 {
            return Err(CacheError::InvalidKey);
        }
        Ok(Self {
            master_key: Zeroizing::new(master_key.to_vec()),
            rng: SystemRandom::new(),
        })
    }

    /// Build with a fresh random master key.
    pub fn generate() -> Result<Self, CacheError> {
        let rng = SystemRandom::new();
        let mut key = Zeroizing::new(vec![0u8; 32]);
        rng.fill(&mut key)
            .map_err(|_| CacheError::Codec("random key generation failed".to_string()))?;
        Ok(Self {
            master_key: key,
            rng,
        })
    }

    pub fn encode(
        &self,
        payload: &[u8],
        compress: bool,
        subject: Option<&SubjectId>,
    ) -> Result<Vec<u8>, CacheError> {
        let body = if compress {
            lz4_flex::compress_prepend_size(payload)
        } else {
            payload.to_vec()
        };
        match subject {
            Some(subject) => self.seal(body, subject),
            None => Ok(body),
        }
    }

    pub fn decode(
        &self,
        blob: &[u8],
        compressed: bool,
        subject: Option<&SubjectId>,
    ) -> Result<Vec<u8>, CacheError> {
        let body = match subject {
            Some(subject) => self.open(blob, subject)?,
            None => blob.to_vec(),
        };
        if compressed {
            lz4_flex::decompress_size_prepended(&body)
                .map_err(|e| CacheError::Codec(format!("decompression failed: {}", e)))
        } else {
            Ok(body)
        }
    }

    fn subject_key(&self, subject: &SubjectId) -> Result<LessSafeKey, CacheError> {
        let hkdf = Hkdf::<Sha256>::new(Some(KEY_SALT), &self.master_key);
        let mut key = Zeroizing::new(vec![0u8; 32]);
        hkdf.expand(subject.as_str().as_bytes(), &mut key)
            .map_err(|e| CacheError::Codec(format!("HKDF expand failed: {}", e)))?;
        let unbound = UnboundKey::new(&AES_256_GCM, &key)
            .map_err(|e| CacheError::Codec(format!("key creation failed: {}", e)))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn seal(&self, mut body: Vec<u8>, subject: &SubjectId) -> Result<Vec<u8>, CacheError> {
        let key = self.subject_key(subject)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CacheError::Codec("nonce generation failed".to_string()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        key.seal_in_place_append_tag(nonce, Aad::from(subject.as_str().as_bytes()), &mut body)
            .map_err(|e| CacheError::Codec(format!("encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + body.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn open(&self, blob: &[u8], subject: &SubjectId) -> Result<Vec<u8>, CacheError> {
        if blob.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CacheError::Codec("ciphertext too short".to_string()));
        }
        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CacheError::Codec("invalid nonce".to_string()))?;
        let key = self.subject_key(subject)?;

        let mut buffer = sealed.to_vec();
        let plain_len = key
            .open_in_place(nonce, Aad::from(subject.as_str().as_bytes()), &mut buffer)
            .map_err(|e| CacheError::Codec(format!("decryption failed: {}", e)))?
            .len();
        buffer.truncate(plain_len);
        Ok(buffer)
    }
}
