//! Payload transforms applied between serialization and framing.
//!
//! The first payload byte records which transforms were applied, so a
//! file written with compression or encryption turned on can still be
//! read after the setting changes (given the key).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use super::error::{LoadError, SaveError};

pub const FLAG_COMPRESSED: u8 = 0b01;
pub const FLAG_ENCRYPTED: u8 = 0b10;
const KNOWN_FLAGS: u8 = FLAG_COMPRESSED | FLAG_ENCRYPTED;

pub const NONCE_LEN: usize = 12;

/// Compression and encryption settings for payloads.
#[derive(Clone, Default)]
pub struct PayloadCodec {
    compression_level: Option<i32>,
    key: Option<[u8; 32]>,
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("compression_level", &self.compression_level)
            .field("key", &self.key.map(|_| "<redacted>"))
            .finish()
    }
}

impl PayloadCodec {
    pub fn new(compression_level: Option<i32>, key: Option<[u8; 32]>) -> Self {
        Self {
            compression_level,
            key,
        }
    }

    pub fn is_encrypting(&self) -> bool {
        self.key.is_some()
    }

    /// Compress, then encrypt, then prefix the flag byte.
    pub fn encode(&self, plain: &[u8]) -> Result<Vec<u8>, SaveError> {
        let mut flags = 0u8;

        let mut data = match self.compression_level {
            Some(level) => {
                flags |= FLAG_COMPRESSED;
                zstd::encode_all(plain, level).map_err(|e| SaveError::Compression(e.to_string()))?
            }
            None => plain.to_vec(),
        };

        if let Some(key) = &self.key {
            flags |= FLAG_ENCRYPTED;
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| SaveError::Encryption(e.to_string()))?;
            let mut nonce = [0u8; NONCE_LEN];
            rand::thread_rng().fill_bytes(&mut nonce);
            let sealed = cipher
                .encrypt(Nonce::from_slice(&nonce), data.as_slice())
                .map_err(|e| SaveError::Encryption(e.to_string()))?;
            data = Vec::with_capacity(NONCE_LEN + sealed.len());
            data.extend_from_slice(&nonce);
            data.extend_from_slice(&sealed);
        }

        let mut out = Vec::with_capacity(1 + data.len());
        out.push(flags);
        out.extend_from_slice(&data);
        Ok(out)
    }

    /// Reverse [`encode`](Self::encode) according to the flag byte.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, LoadError> {
        let (&flags, rest) = payload
            .split_first()
            .ok_or_else(|| LoadError::Corrupt("empty payload".into()))?;
        if flags & !KNOWN_FLAGS != 0 {
            return Err(LoadError::Corrupt(format!("unknown transform flags {:#04x}", flags)));
        }

        let mut data = rest.to_vec();

        if flags & FLAG_ENCRYPTED != 0 {
            let key = self.key.as_ref().ok_or(LoadError::MissingKey)?;
            if data.len() < NONCE_LEN {
                return Err(LoadError::Corrupt("encrypted payload missing nonce".into()));
            }
            let (nonce, sealed) = data.split_at(NONCE_LEN);
            let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| LoadError::Decryption)?;
            data = cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| LoadError::Decryption)?;
        }

        if flags & FLAG_COMPRESSED != 0 {
            data = zstd::decode_all(data.as_slice())
                .map_err(|e| LoadError::Corrupt(format!("decompression failed: {}", e)))?;
        }

        Ok(data)
    }
}
