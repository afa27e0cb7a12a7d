//! Key derivation and authenticated encryption primitives.
//!
//! Argon2id turns a passphrase into a 32-byte key; XChaCha20-Poly1305 seals
//! the payload with a detached 16-byte tag so the file layout can keep the
//! tag ahead of the ciphertext.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, StoreError};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

pub const KDF_MEMORY_COST: u32 = 65536; // 64MB
pub const KDF_TIME_COST: u32 = 3;
pub const KDF_PARALLELISM: u32 = 4;

// Upper bounds on work factors read back from a file, checked before deriving.
pub const KDF_MAX_MEMORY_COST: u32 = 4 * 1024 * 1024; // 4GB
pub const KDF_MAX_TIME_COST: u32 = 64;
pub const KDF_MAX_PARALLELISM: u32 = 64;

const EXPORT_LEN: usize = 12 + SALT_LEN + KEY_LEN;

/// Argon2id work factor. Written into every file header so a store always
/// opens with the parameters it was sealed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: KDF_MEMORY_COST,
            iterations: KDF_TIME_COST,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            memory_kib,
            iterations,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the Argon2 minimums and the fixed maximums without deriving.
    pub fn validate(&self) -> Result<()> {
        self.argon2_params().map(|_| ())
    }

    fn argon2_params(&self) -> Result<Params> {
        if self.memory_kib > KDF_MAX_MEMORY_COST
            || self.iterations > KDF_MAX_TIME_COST
            || self.parallelism > KDF_MAX_PARALLELISM
        {
            return Err(StoreError::KeyDerivation(format!(
                "argon2 params above limits: m={} t={} p={}",
                self.memory_kib, self.iterations, self.parallelism
            )));
        }
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| StoreError::KeyDerivation(format!("argon2 params: {e}")))
    }
}

/// A derived store key together with the salt and parameters it came from.
pub struct StoreKey {
    salt: [u8; SALT_LEN],
    params: KdfParams,
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl StoreKey {
    /// Derive a key under a fresh random salt, as done at store creation and
    /// key rotation.
    pub fn generate(passphrase: &str, params: KdfParams) -> Result<Self> {
        Self::derive(passphrase, generate_salt(), params)
    }

    pub fn derive(passphrase: &str, salt: [u8; SALT_LEN], params: KdfParams) -> Result<Self> {
        let bytes = derive_key(passphrase, &salt, &params)?;
        Ok(Self {
            salt,
            params,
            bytes,
        })
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Opaque text form suitable for an external key cache.
    pub fn export(&self) -> Zeroizing<String> {
        let mut raw = Zeroizing::new(Vec::with_capacity(EXPORT_LEN));
        raw.extend_from_slice(&self.params.memory_kib.to_le_bytes());
        raw.extend_from_slice(&self.params.iterations.to_le_bytes());
        raw.extend_from_slice(&self.params.parallelism.to_le_bytes());
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&self.bytes[..]);
        Zeroizing::new(general_purpose::STANDARD.encode(raw.as_slice()))
    }

    pub fn import(encoded: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| StoreError::KeyCache(format!("decode cached key: {e}")))?,
        );
        if raw.len() != EXPORT_LEN {
            return Err(StoreError::KeyCache("cached key length invalid".into()));
        }
        let params = KdfParams {
            memory_kib: read_u32(&raw[0..4]),
            iterations: read_u32(&raw[4..8]),
            parallelism: read_u32(&raw[8..12]),
        };
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[12..12 + SALT_LEN]);
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(&raw[12 + SALT_LEN..]);
        Ok(Self {
            salt,
            params,
            bytes,
        })
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreKey")
            .field("params", &self.params)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

/// What the caller hands in to unlock a store.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Passphrase(&'a str),
    Key(&'a StoreKey),
}

impl Credential<'_> {
    /// Produce the key for a file sealed under `salt`/`params`. A pre-derived
    /// key from another salt can never open the file, so it is rejected the
    /// same way a wrong passphrase is.
    pub(crate) fn resolve(&self, salt: &[u8; SALT_LEN], params: KdfParams) -> Result<StoreKey> {
        match self {
            Credential::Passphrase(passphrase) => StoreKey::derive(passphrase, *salt, params),
            Credential::Key(key) => {
                if key.salt != *salt || key.params != params {
                    return Err(StoreError::Authentication);
                }
                Ok(StoreKey {
                    salt: key.salt,
                    params: key.params,
                    bytes: key.bytes.clone(),
                })
            }
        }
    }
}

pub fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|e| StoreError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(key)
}

/// Encrypt `buffer` in place, authenticating `aad` alongside it.
pub fn seal_in_place(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<[u8; TAG_LEN]> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(nonce), aad, buffer)
        .map_err(|_| StoreError::corrupted("payload too large to seal"))?;
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Verify `tag` and decrypt `buffer` in place. On failure the buffer is wiped
/// so no unauthenticated bytes survive.
pub fn open_in_place(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_LEN],
) -> Result<()> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt_in_place_detached(XNonce::from_slice(nonce), aad, buffer, Tag::from_slice(tag))
        .map_err(|_| {
            buffer.zeroize();
            StoreError::Authentication
        })
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}
