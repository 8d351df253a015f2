//! Symmetric-cipher primitives for the credentials store: AES-128-CBC
//! encryption of secret fields, stored as base64-of-ciphertext alongside
//! their IV and salt. Drives the same `aes`/`cbc` crates used elsewhere
//! in this workspace for Z-Wave Security S0 framing.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

#[derive(thiserror::Error, Debug)]
pub enum CipherError {
    #[error("ciphertext is not valid base64")]
    Base64,
    #[error("ciphertext padding is invalid or the key/iv is wrong")]
    Padding,
    #[error("crypto params are malformed: {0}")]
    MalformedParams(String),
}

/// Cipher parameters used for one credentials entry, so the key/IV can be
/// reconstructed correctly on read regardless of when it was written.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CryptoParams {
    pub algorithm: String,
    pub iv: [u8; 16],
}

impl CryptoParams {
    /// Generates fresh, random IV parameters for AES-128-CBC.
    pub fn generate() -> Self {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        Self {
            algorithm: "AES-128-CBC".to_string(),
            iv,
        }
    }

    /// Serializes to the flat string stored at `credentials.<id>.<field>.params`.
    pub fn to_string_repr(&self) -> String {
        format!("{}:{}", self.algorithm, hex::encode(self.iv))
    }

    pub fn parse(s: &str) -> Result<Self, CipherError> {
        let (algorithm, iv_hex) = s
            .split_once(':')
            .ok_or_else(|| CipherError::MalformedParams(s.to_string()))?;
        let iv_bytes = hex::decode(iv_hex)
            .map_err(|_| CipherError::MalformedParams(s.to_string()))?;
        let iv: [u8; 16] = iv_bytes
            .try_into()
            .map_err(|_| CipherError::MalformedParams(s.to_string()))?;
        Ok(Self {
            algorithm: algorithm.to_string(),
            iv,
        })
    }
}

/// Encrypts `plaintext` with `key` under fresh params, returning the
/// base64-of-ciphertext form the configuration file stores.
pub fn encrypt(plaintext: &str, key: &[u8; 16]) -> (String, CryptoParams) {
    let params = CryptoParams::generate();
    let ciphertext = encrypt_with_params(plaintext, key, &params);
    (ciphertext, params)
}

pub fn encrypt_with_params(plaintext: &str, key: &[u8; 16], params: &CryptoParams) -> String {
    let cipher = Aes128CbcEnc::new(key.into(), &params.iv.into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    STANDARD.encode(ciphertext)
}

/// Decrypts a base64-of-ciphertext value previously produced by [`encrypt`].
pub fn decrypt(ciphertext_b64: &str, key: &[u8; 16], params: &CryptoParams) -> Result<String, CipherError> {
    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|_| CipherError::Base64)?;
    let cipher = Aes128CbcDec::new(key.into(), &params.iv.into());
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CipherError::Padding)?;
    String::from_utf8(plaintext).map_err(|_| CipherError::Padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [0x42u8; 16];
        let (ct, params) = encrypt("pinkod01", &key);
        let pt = decrypt(&ct, &key, &params).unwrap();
        assert_eq!(pt, "pinkod01");
    }

    #[test]
    fn params_roundtrip_through_string() {
        let params = CryptoParams::generate();
        let s = params.to_string_repr();
        let parsed = CryptoParams::parse(&s).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn wrong_key_fails() {
        let key = [1u8; 16];
        let other = [2u8; 16];
        let (ct, params) = encrypt("secret", &key);
        assert!(decrypt(&ct, &other, &params).is_err());
    }
}
