//! Secret-at-rest encryption for provider API tokens (§4.K).
//!
//! A 256-bit key is generated at first startup and kept at
//! `<library-root>/.secret.key` (0600 on unix); it is never written to logs.
//! Secrets decrypted for use are wrapped in [`zeroize::Zeroizing`] so they
//! are wiped from memory once dropped.

use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{ConfigError, Result};

const KEY_FILE_NAME: &str = ".secret.key";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Loads `<library_root>/.secret.key`, generating one on first startup.
    pub fn load_or_create(library_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(library_root)?;
        let key_path = library_root.join(KEY_FILE_NAME);

        let key_bytes: Zeroizing<Vec<u8>> = if key_path.exists() {
            Zeroizing::new(std::fs::read(&key_path)?)
        } else {
            let mut bytes = vec![0u8; KEY_LEN];
            OsRng.fill_bytes(&mut bytes);
            std::fs::write(&key_path, &bytes)?;
            set_owner_only_permissions(&key_path)?;
            Zeroizing::new(bytes)
        };

        if key_bytes.len() != KEY_LEN {
            return Err(ConfigError::Secret(format!("{} is not a {KEY_LEN}-byte key", key_path.display())));
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self { cipher: Aes256Gcm::new(key) })
    }

    /// Encrypts `plaintext`, returning `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext =
            self.cipher.encrypt(nonce, plaintext.as_bytes()).map_err(|_| ConfigError::Secret("encrypt failed".into()))?;
        let mut out = nonce_bytes.to_vec();
        out.append(&mut ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypts a value produced by [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<Zeroizing<String>> {
        let raw = BASE64.decode(encoded).map_err(|e| ConfigError::Secret(e.to_string()))?;
        if raw.len() < NONCE_LEN {
            return Err(ConfigError::Secret("ciphertext shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext =
            self.cipher.decrypt(nonce, ciphertext).map_err(|_| ConfigError::Secret("decrypt failed".into()))?;
        let text = String::from_utf8(plaintext).map_err(|e| ConfigError::Secret(e.to_string()))?;
        Ok(Zeroizing::new(text))
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Masks all but the last four characters (§4.K debug-output rule).
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_secret() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = SecretCipher::load_or_create(dir.path()).unwrap();

        let encrypted = cipher.encrypt("super-secret-token").unwrap();
        assert_ne!(encrypted, "super-secret-token");

        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(&*decrypted, "super-secret-token");
    }

    #[test]
    fn reloading_reuses_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let first = SecretCipher::load_or_create(dir.path()).unwrap();
        let encrypted = first.encrypt("token").unwrap();

        let second = SecretCipher::load_or_create(dir.path()).unwrap();
        let decrypted = second.decrypt(&encrypted).unwrap();
        assert_eq!(&*decrypted, "token");
    }

    #[test]
    fn masks_all_but_last_four_characters() {
        assert_eq!(mask_secret("abcdefgh"), "****efgh");
        assert_eq!(mask_secret("ab"), "**");
    }
}
