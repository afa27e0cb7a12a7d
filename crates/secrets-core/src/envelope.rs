//! Sealed file layout.
//!
//! ```text
//! 0   8   magic "SGSTORE\0"
//! 8   4   format version (u32 LE)
//! 12  12  argon2 memory KiB / iterations / parallelism (u32 LE each)
//! 24  32  salt
//! 56  24  nonce
//! 80  16  poly1305 tag
//! 96  ..  ciphertext
//! ```
//!
//! Bytes 0..80 are authenticated as associated data, so editing the header
//! (for example lowering the KDF cost) is caught exactly like editing the
//! ciphertext. KDF costs outside `KdfParams::validate` are rejected as
//! corruption before any key is derived from them.

use zeroize::Zeroizing;

use crate::crypto::{
    generate_nonce, open_in_place, seal_in_place, Credential, KdfParams, StoreKey, NONCE_LEN,
    SALT_LEN, TAG_LEN,
};
use crate::error::{Result, StoreError};

pub const MAGIC: &[u8; 8] = b"SGSTORE\0";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 80;
pub const PREFIX_LEN: usize = HEADER_LEN + TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub params: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.params.memory_kib.to_le_bytes());
        buf[16..20].copy_from_slice(&self.params.iterations.to_le_bytes());
        buf[20..24].copy_from_slice(&self.params.parallelism.to_le_bytes());
        buf[24..56].copy_from_slice(&self.salt);
        buf[56..80].copy_from_slice(&self.nonce);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(StoreError::corrupted("truncated header"));
        }
        if &buf[..8] != MAGIC {
            return Err(StoreError::corrupted("not a secrets store (bad magic)"));
        }
        let version = le_u32(&buf[8..12]);
        if version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&buf[24..56]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[56..80]);
        let params = KdfParams {
            memory_kib: le_u32(&buf[12..16]),
            iterations: le_u32(&buf[16..20]),
            parallelism: le_u32(&buf[20..24]),
        };
        params
            .validate()
            .map_err(|_| StoreError::corrupted("key derivation parameters out of range"))?;
        Ok(Self {
            version,
            params,
            salt,
            nonce,
        })
    }
}

/// Seal `plaintext` under `key` with a fresh nonce.
pub fn encrypt(plaintext: &[u8], key: &StoreKey) -> Result<Vec<u8>> {
    let header = Header {
        version: FORMAT_VERSION,
        params: key.params(),
        salt: *key.salt(),
        nonce: generate_nonce(),
    };
    let header_bytes = header.to_bytes();
    let mut out = Vec::with_capacity(PREFIX_LEN + plaintext.len());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&[0u8; TAG_LEN]);
    out.extend_from_slice(plaintext);
    let tag = seal_in_place(
        key.bytes(),
        &header.nonce,
        &header_bytes,
        &mut out[PREFIX_LEN..],
    )?;
    out[HEADER_LEN..PREFIX_LEN].copy_from_slice(&tag);
    Ok(out)
}

/// Authenticate and decrypt a sealed blob. Nothing is returned unless the
/// tag verifies.
pub fn decrypt(blob: &[u8], key: &StoreKey) -> Result<Zeroizing<Vec<u8>>> {
    let header = read_header(blob)?;
    if header.salt != *key.salt() || header.params != key.params() {
        return Err(StoreError::Authentication);
    }
    open_with(blob, &header, key)
}

/// Decrypt with whatever credential the caller holds, handing back the key
/// that worked so it can be reused for the next save.
pub fn unlock(blob: &[u8], credential: Credential<'_>) -> Result<(Zeroizing<Vec<u8>>, StoreKey)> {
    let header = read_header(blob)?;
    let key = credential.resolve(&header.salt, header.params)?;
    let plaintext = open_with(blob, &header, &key)?;
    Ok((plaintext, key))
}

pub fn read_header(blob: &[u8]) -> Result<Header> {
    let header = Header::from_bytes(blob)?;
    if blob.len() < PREFIX_LEN {
        return Err(StoreError::corrupted("truncated authentication tag"));
    }
    Ok(header)
}

fn open_with(blob: &[u8], header: &Header, key: &StoreKey) -> Result<Zeroizing<Vec<u8>>> {
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&blob[HEADER_LEN..PREFIX_LEN]);
    let mut buffer = Zeroizing::new(blob[PREFIX_LEN..].to_vec());
    open_in_place(
        key.bytes(),
        &header.nonce,
        &blob[..HEADER_LEN],
        buffer.as_mut_slice(),
        &tag,
    )?;
    Ok(buffer)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_params;

    #[test]
    fn sealed_blob_opens_with_same_key_only() {
        let key = StoreKey::generate("k1", test_params()).unwrap();
        let blob = encrypt(b"payload", &key).unwrap();
        assert_eq!(blob.len(), PREFIX_LEN + b"payload".len());
        assert_eq!(&*decrypt(&blob, &key).unwrap(), b"payload");

        let same_salt = StoreKey::derive("k2", *key.salt(), test_params()).unwrap();
        assert!(matches!(
            decrypt(&blob, &same_salt),
            Err(StoreError::Authentication)
        ));
        assert!(matches!(
            unlock(&blob, Credential::Passphrase("k2")),
            Err(StoreError::Authentication)
        ));
        let (plain, used) = unlock(&blob, Credential::Passphrase("k1")).unwrap();
        assert_eq!(&*plain, b"payload");
        assert_eq!(used.salt(), key.salt());
    }

    #[test]
    fn each_seal_uses_a_fresh_nonce() {
        let key = StoreKey::generate("k", test_params()).unwrap();
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();
        assert_ne!(a[56..80], b[56..80]);
        assert_ne!(a[PREFIX_LEN..], b[PREFIX_LEN..]);
    }

    #[test]
    fn any_flipped_byte_fails_authentication() {
        let key = StoreKey::generate("k", test_params()).unwrap();
        let blob = encrypt(b"some secret payload", &key).unwrap();
        // magic, version and KDF costs are covered by the structural checks
        for index in 24..blob.len() {
            let mut tampered = blob.clone();
            tampered[index] ^= 0x01;
            let err = unlock(&tampered, Credential::Key(&key)).unwrap_err();
            assert!(
                matches!(err, StoreError::Authentication),
                "byte {index}: {err:?}"
            );
        }
    }

    #[test]
    fn tampered_kdf_costs_fail_closed_for_any_credential() {
        let key = StoreKey::generate("pw", test_params()).unwrap();
        let blob = encrypt(b"payload", &key).unwrap();
        for index in 12..24 {
            for flip in [0x01u8, 0x80] {
                let mut tampered = blob.clone();
                tampered[index] ^= flip;
                for credential in [Credential::Passphrase("pw"), Credential::Key(&key)] {
                    let err = unlock(&tampered, credential).unwrap_err();
                    assert!(
                        matches!(err, StoreError::Authentication | StoreError::Corrupted(_)),
                        "byte {index} ^ {flip:#x}: {err:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn out_of_range_kdf_costs_are_corruption() {
        let key = StoreKey::generate("pw", test_params()).unwrap();
        let blob = encrypt(b"payload", &key).unwrap();
        let cases: [(usize, u32); 5] = [
            (12, 251_658_304),
            (12, u32::MAX),
            (16, 65_537),
            (16, 0),
            (20, 1_000),
        ];
        for (offset, value) in cases {
            let mut tampered = blob.clone();
            tampered[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            assert!(
                matches!(
                    unlock(&tampered, Credential::Passphrase("pw")),
                    Err(StoreError::Corrupted(_))
                ),
                "offset {offset} = {value}"
            );
        }
    }

    #[test]
    fn structural_damage_is_reported() {
        let key = StoreKey::generate("k", test_params()).unwrap();
        let blob = encrypt(b"x", &key).unwrap();
        assert!(matches!(
            decrypt(&blob[..40], &key),
            Err(StoreError::Corrupted(_))
        ));
        assert!(matches!(
            decrypt(&blob[..HEADER_LEN + 4], &key),
            Err(StoreError::Corrupted(_))
        ));
        let mut bad_magic = blob.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            decrypt(&bad_magic, &key),
            Err(StoreError::Corrupted(_))
        ));
        let mut future = blob;
        future[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            decrypt(&future, &key),
            Err(StoreError::UnsupportedVersion(7))
        ));
    }
}
