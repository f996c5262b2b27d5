//! At-rest encryption for stored sessions.
//!
//! Each write derives a fresh key from the passphrase with Argon2 using a
//! random salt, then seals the session with ChaCha20-Poly1305. The envelope
//! is `pcenc1:<base64(salt || nonce || ciphertext)>`.

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use super::StoreError;

const ENVELOPE_PREFIX: &str = "pcenc1:";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

pub struct SessionCipher {
    passphrase: Zeroizing<String>,
}

impl SessionCipher {
    pub fn new(passphrase: impl Into<String>) -> Result<Self, StoreError> {
        let passphrase = Zeroizing::new(passphrase.into());
        if passphrase.is_empty() {
            return Err(StoreError::Crypto("session passphrase is empty".to_string()));
        }
        Ok(Self { passphrase })
    }

    pub fn is_encrypted(text: &str) -> bool {
        text.starts_with(ENVELOPE_PREFIX)
    }

    fn derive_key(&self, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, StoreError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key[..])
            .map_err(|e| StoreError::Crypto(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, StoreError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| StoreError::Crypto("encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", ENVELOPE_PREFIX, STANDARD.encode(&combined)))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, StoreError> {
        let encoded = envelope
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or_else(|| StoreError::Crypto("missing envelope prefix".to_string()))?;
        let combined = STANDARD
            .decode(encoded.trim())
            .map_err(|e| StoreError::Crypto(format!("invalid envelope encoding: {}", e)))?;

        if combined.len() < SALT_LEN + NONCE_LEN {
            return Err(StoreError::Crypto("envelope too short".to_string()));
        }
        let (salt, rest) = combined.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StoreError::Crypto("decryption failed (wrong passphrase?)".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| StoreError::Crypto(format!("invalid UTF-8 in session: {}", e)))
    }
}
