use base64::{Engine, prelude::BASE64_STANDARD};
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use md5::{Digest, Md5};

use crate::errors::{ExtractError, Result};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SALT_HEADER: &[u8] = b"Salted__";

/// decrypts a base64 `Salted__` blob produced by CryptoJS `AES.encrypt(data, passphrase)`.
pub fn decrypt_passphrase(encoded: &str, passphrase: &str) -> Result<String> {
    let data = BASE64_STANDARD.decode(encoded.trim())?;
    if data.len() < 16 || !data.starts_with(SALT_HEADER) {
        return Err(ExtractError::Decrypt {
            reason: "missing salt header",
        });
    }

    let (key, iv) = evp_bytes_to_key(passphrase.as_bytes(), &data[8..16]);
    let mut buf = data[16..].to_vec();

    let cipher =
        Aes256CbcDec::new_from_slices(&key, &iv).map_err(|_| ExtractError::Decrypt {
            reason: "invalid key or iv length",
        })?;
    let plain = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| ExtractError::Decrypt {
            reason: "bad padding (wrong key?)",
        })?;

    String::from_utf8(plain.to_vec()).map_err(|_| ExtractError::Decrypt {
        reason: "plaintext is not utf-8",
    })
}

// openssl EVP_BytesToKey with md5, one iteration: 32 byte key + 16 byte iv.
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; 32], [u8; 16]) {
    let mut derived = Vec::with_capacity(48);
    let mut block: Vec<u8> = Vec::new();

    while derived.len() < 48 {
        let mut hasher = Md5::new();
        hasher.update(&block);
        hasher.update(passphrase);
        hasher.update(salt);
        block = hasher.finalize().to_vec();
        derived.extend_from_slice(&block);
    }

    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&derived[..32]);
    iv.copy_from_slice(&derived[32..48]);
    (key, iv)
}
