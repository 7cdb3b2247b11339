//! OpenSSL "traditional" key encryption
//!
//! Keys written by `openssl rsa -aes128` (and friends) keep their PKCS#1 or SEC1
//! label and carry two RFC 1421 headers:
//!
//! ```text
//! Proc-Type: 4,ENCRYPTED
//! DEK-Info: AES-128-CBC,38B5499EB8076DE4EF519C04DD030061
//! ```
//!
//! The cipher key is derived with `EVP_BytesToKey` (one MD5 round, salt = first
//! 8 bytes of the IV) and the body is CBC-encrypted with PKCS#7 padding.

use crate::{Error, Result};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use md5::{Digest, Md5};

pub(super) const PROC_TYPE: &str = "Proc-Type";
pub(super) const DEK_INFO: &str = "DEK-Info";

/// Salt length used by `EVP_BytesToKey`
const SALT_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DekCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
    DesCbc,
}

impl DekCipher {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "AES-128-CBC" => Some(Self::Aes128Cbc),
            "AES-192-CBC" => Some(Self::Aes192Cbc),
            "AES-256-CBC" => Some(Self::Aes256Cbc),
            "DES-EDE3-CBC" => Some(Self::DesEde3Cbc),
            "DES-CBC" => Some(Self::DesCbc),
            _ => None,
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
            Self::DesEde3Cbc => 24,
            Self::DesCbc => 8,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
            Self::DesEde3Cbc | Self::DesCbc => 8,
        }
    }

    fn decrypt(self, key: &[u8], iv: &[u8], body: Vec<u8>) -> Option<Vec<u8>> {
        match self {
            Self::Aes128Cbc => cbc_decrypt::<aes::Aes128>(key, iv, body),
            Self::Aes192Cbc => cbc_decrypt::<aes::Aes192>(key, iv, body),
            Self::Aes256Cbc => cbc_decrypt::<aes::Aes256>(key, iv, body),
            Self::DesEde3Cbc => cbc_decrypt::<des::TdesEde3>(key, iv, body),
            Self::DesCbc => cbc_decrypt::<des::Des>(key, iv, body),
        }
    }
}

/// Whether `Proc-Type` marks the section as encrypted
pub(super) fn is_encrypted(proc_type: Option<&str>) -> bool {
    proc_type.is_some_and(|value| value.replace(' ', "") == "4,ENCRYPTED")
}

/// Decrypt a traditional-format key body given its `DEK-Info` header.
///
/// Returns the plaintext DER. A wrong passphrase shows up as bad padding, or as
/// plaintext that is not a DER SEQUENCE; both are reported as `KeyMaterial`.
pub(super) fn decrypt(
    label: &str,
    dek_info: Option<&str>,
    body: &[u8],
    passphrase: &str,
) -> Result<Vec<u8>> {
    if passphrase.is_empty() {
        return Err(Error::KeyMaterial(
            "private key is encrypted but no passphrase was given".into(),
        ));
    }

    let dek_info = dek_info.ok_or_else(|| {
        Error::KeyMaterial(format!("encrypted '{}' has no DEK-Info header", label))
    })?;
    let (name, iv_hex) = dek_info
        .split_once(',')
        .ok_or_else(|| Error::KeyMaterial(format!("malformed DEK-Info '{}'", dek_info)))?;

    let cipher = DekCipher::from_name(name.trim()).ok_or_else(|| {
        Error::KeyMaterial(format!("unsupported key encryption '{}'", name.trim()))
    })?;

    let iv = hex::decode(iv_hex.trim())
        .map_err(|e| Error::KeyMaterial(format!("malformed DEK-Info IV: {}", e)))?;
    if iv.len() != cipher.iv_len() {
        return Err(Error::KeyMaterial(format!(
            "DEK-Info IV is {} bytes, {:?} needs {}",
            iv.len(),
            cipher,
            cipher.iv_len()
        )));
    }

    let key = bytes_to_key(passphrase.as_bytes(), &iv[..SALT_LEN], cipher.key_len());
    let plain = cipher.decrypt(&key, &iv, body.to_vec()).ok_or_else(|| {
        Error::KeyMaterial("could not decrypt private key (wrong passphrase?)".into())
    })?;

    Ok(plain)
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration
fn bytes_to_key(passphrase: &[u8], salt: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut block: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&block);
        hasher.update(passphrase);
        hasher.update(salt);
        block = hasher.finalize().to_vec();
        key.extend_from_slice(&block);
    }

    key.truncate(key_len);
    key
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], mut body: Vec<u8>) -> Option<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv).ok()?;
    let len = decryptor.decrypt_padded_mut::<Pkcs7>(&mut body).ok()?.len();
    body.truncate(len);
    Some(body)
}
