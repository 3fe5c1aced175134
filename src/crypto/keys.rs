//! Key material loading and derivation.
//!
//! The master secret comes from a passphrase (PBKDF2-HMAC-SHA256, random
//! salt, high iteration count), an existing key file, or a freshly generated
//! random secret persisted with restrictive permissions. The cipher and
//! integrity keys are derived from the master with domain-separated HMACs,
//! so the same key is never used for both purposes.
//!
//! Operational invariant: the key file (or passphrase) is the only way to
//! recover encrypted cache content. Losing it makes every record written
//! with it permanently unreadable.

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::EncryptionConfig;
use crate::error::{EncryptionFailure, GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

const KEY_FILE_VERSION: u32 = 1;
const CIPHER_KEY_DOMAIN: &[u8] = b"cache-encryption-key";
const MAC_KEY_DOMAIN: &[u8] = b"cache-integrity-key";
const CHECK_DOMAIN: &[u8] = b"key-check";

/// On-disk key file contents.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    /// PBKDF2 salt, present for passphrase-derived keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt_hex: Option<String>,
    /// Truncated HMAC of the master secret, used to detect a wrong
    /// passphrase on reload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check_hex: Option<String>,
    /// Raw master secret, present only for generated keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_hex: Option<String>,
}

/// Cipher and integrity keys for the encryptor.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("cipher_key", &"<redacted>")
            .field("mac_key", &"<redacted>")
            .finish()
    }
}

impl KeyMaterial {
    /// Derive both subkeys from a 32-byte master secret.
    pub fn from_master(master: &[u8; 32]) -> Self {
        Self {
            cipher_key: derive_subkey(master, CIPHER_KEY_DOMAIN),
            mac_key: derive_subkey(master, MAC_KEY_DOMAIN),
        }
    }

    /// Derive the master secret from a passphrase and salt.
    pub fn from_passphrase(passphrase: &str, salt: &[u8], iterations: u32) -> Self {
        let mut master = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut master);
        let material = Self::from_master(&master);
        master.zeroize();
        material
    }

    /// Generate a fresh random key pair, not persisted anywhere.
    pub fn generate() -> Self {
        let mut master = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut master);
        let material = Self::from_master(&master);
        master.zeroize();
        material
    }

    /// Resolve key material from the configured sources.
    ///
    /// Priority: passphrase from the configured environment variable (salt
    /// persisted in the key file), then an existing key file, then a newly
    /// generated secret persisted to the key file. With neither passphrase
    /// nor key file configured the key is generated in-memory and lives
    /// only for the process lifetime.
    pub fn load_or_create(config: &EncryptionConfig) -> Result<Self> {
        let passphrase = std::env::var(&config.passphrase_env)
            .ok()
            .filter(|p| !p.is_empty());

        match (&passphrase, &config.key_file) {
            (Some(passphrase), Some(path)) => {
                Self::from_passphrase_file(passphrase, path, config.kdf_iterations)
            }
            (Some(passphrase), None) => {
                // No file to hold a salt; derive it from a fixed-size random
                // salt that only lives for this process.
                let mut salt = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut salt);
                Ok(Self::from_passphrase(passphrase, &salt, config.kdf_iterations))
            }
            (None, Some(path)) => Self::from_key_file(path),
            (None, None) => {
                tracing::warn!(
                    "no key file or passphrase configured, encryption keys are ephemeral"
                );
                Ok(Self::generate())
            }
        }
    }

    fn from_passphrase_file(passphrase: &str, path: &Path, iterations: u32) -> Result<Self> {
        if path.exists() {
            let file = read_key_file(path)?;
            let salt_hex = file.salt_hex.ok_or_else(|| {
                tracing::error!(path = %path.display(), "key file has no salt entry");
                GatewayError::Encryption(EncryptionFailure::KeyUnavailable)
            })?;
            let salt = hex::decode(&salt_hex)
                .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;

            let material = Self::from_passphrase(passphrase, &salt, iterations);

            // A wrong passphrase yields a different check value.
            if let Some(check_hex) = file.check_hex {
                if material.check_value() != check_hex {
                    tracing::error!(path = %path.display(), "passphrase check mismatch");
                    return Err(GatewayError::Encryption(EncryptionFailure::KeyUnavailable));
                }
            }
            Ok(material)
        } else {
            let mut salt = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut salt);
            let material = Self::from_passphrase(passphrase, &salt, iterations);

            write_key_file(
                path,
                &KeyFile {
                    version: KEY_FILE_VERSION,
                    salt_hex: Some(hex::encode(salt)),
                    check_hex: Some(material.check_value()),
                    key_hex: None,
                },
            )?;
            Ok(material)
        }
    }

    fn from_key_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = read_key_file(path)?;
            let key_hex = file.key_hex.ok_or_else(|| {
                tracing::error!(
                    path = %path.display(),
                    "key file is passphrase-derived but no passphrase was supplied"
                );
                GatewayError::Encryption(EncryptionFailure::KeyUnavailable)
            })?;
            let bytes = hex::decode(&key_hex)
                .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;
            let master: [u8; 32] = bytes
                .try_into()
                .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;
            Ok(Self::from_master(&master))
        } else {
            let mut master = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut master);
            let material = Self::from_master(&master);

            write_key_file(
                path,
                &KeyFile {
                    version: KEY_FILE_VERSION,
                    salt_hex: None,
                    check_hex: None,
                    key_hex: Some(hex::encode(master)),
                },
            )?;
            master.zeroize();
            tracing::info!(path = %path.display(), "generated new master key file");
            Ok(material)
        }
    }

    /// Key used for the AEAD cipher.
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    /// Key used for the independent integrity tag.
    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }

    /// Short verification value for passphrase checking.
    fn check_value(&self) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.cipher_key)
            .expect("HMAC accepts any key length");
        mac.update(CHECK_DOMAIN);
        hex::encode(&mac.finalize().into_bytes()[..8])
    }
}

fn derive_subkey(master: &[u8; 32], domain: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(master).expect("HMAC accepts any key length");
    mac.update(domain);
    mac.finalize().into_bytes().into()
}

fn read_key_file(path: &Path) -> Result<KeyFile> {
    let content = fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read key file");
        GatewayError::Encryption(EncryptionFailure::KeyUnavailable)
    })?;
    let file: KeyFile = serde_json::from_str(&content).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to parse key file");
        GatewayError::Encryption(EncryptionFailure::KeyUnavailable)
    })?;
    if file.version != KEY_FILE_VERSION {
        tracing::error!(path = %path.display(), version = file.version, "unsupported key file version");
        return Err(GatewayError::Encryption(EncryptionFailure::KeyUnavailable));
    }
    Ok(file)
}

fn write_key_file(path: &Path, file: &KeyFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;
        }
    }

    let content = serde_json::to_string_pretty(file)
        .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "failed to create key file");
                GatewayError::Encryption(EncryptionFailure::KeyUnavailable)
            })?;
        f.write_all(content.as_bytes())
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, content)
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::KeyUnavailable))?;
    }

    Ok(())
}
