//! `Credentials` and its two built-in kinds: a credential stores its
//! secret fields already encrypted (base64-of-ciphertext) plus the
//! `CryptoParams` needed to decrypt them, and knows how to flatten
//! itself under `<root>.<device>.<field>` in a
//! [`ConfigTree`](crate::config::ConfigTree).

use gw_core::crypto::{decrypt, encrypt_with_params, CryptoParams};
use gw_core::prelude::{DeviceId, Error, Result};

use crate::config::ConfigTree;

/// Implemented by every credential kind; `CredentialsStorage` stores these
/// as trait objects so new kinds can be registered without touching the
/// storage layer (the original's `CredentialsFactory` map plays the same
/// role).
pub trait Credentials: Send + Sync + std::fmt::Debug {
    fn type_name(&self) -> &'static str;
    fn params(&self) -> &CryptoParams;

    /// Flattens this credential's fields into `tree` under
    /// `<root>.<device>.*`, mirroring `makeConfString`.
    fn save(&self, tree: &mut ConfigTree, device: DeviceId, root: &str);
}

fn conf_key(root: &str, device: DeviceId, attribute: &str) -> String {
    format!("{root}.{device}.{attribute}")
}

/// A username/password pair, both stored as base64-of-ciphertext.
#[derive(Debug, Clone)]
pub struct PasswordCredentials {
    params: CryptoParams,
    username: String,
    password: String,
}

impl PasswordCredentials {
    pub const TYPE: &'static str = "password";

    /// Builds an entry with already-encrypted fields, as read back from
    /// storage (the original's `setRawUsername`/`setRawPassword`).
    pub fn from_raw(params: CryptoParams, username: String, password: String) -> Self {
        Self { params, username, password }
    }

    /// Builds an entry by encrypting plaintext fields under fresh params.
    pub fn encrypt(key: &[u8; 16], username: &str, password: &str) -> Self {
        let params = CryptoParams::generate();
        Self {
            username: encrypt_with_params(username, key, &params),
            password: encrypt_with_params(password, key, &params),
            params,
        }
    }

    pub fn username(&self, key: &[u8; 16]) -> Result<String> {
        decrypt(&self.username, key, &self.params).map_err(|e| Error::Protocol(e.to_string()))
    }

    pub fn password(&self, key: &[u8; 16]) -> Result<String> {
        decrypt(&self.password, key, &self.params).map_err(|e| Error::Protocol(e.to_string()))
    }
}

impl Credentials for PasswordCredentials {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn params(&self) -> &CryptoParams {
        &self.params
    }

    fn save(&self, tree: &mut ConfigTree, device: DeviceId, root: &str) {
        tree.set(conf_key(root, device, "type"), Self::TYPE);
        tree.set(conf_key(root, device, "params"), self.params.to_string_repr());
        tree.set(conf_key(root, device, "username"), self.username.clone());
        tree.set(conf_key(root, device, "password"), self.password.clone());
    }
}

/// A single PIN code, stored as base64-of-ciphertext.
#[derive(Debug, Clone)]
pub struct PinCredentials {
    params: CryptoParams,
    pin: String,
}

impl PinCredentials {
    pub const TYPE: &'static str = "pin";

    pub fn from_raw(params: CryptoParams, pin: String) -> Self {
        Self { params, pin }
    }

    pub fn encrypt(key: &[u8; 16], pin: &str) -> Self {
        let params = CryptoParams::generate();
        Self {
            pin: encrypt_with_params(pin, key, &params),
            params,
        }
    }

    pub fn pin(&self, key: &[u8; 16]) -> Result<String> {
        decrypt(&self.pin, key, &self.params).map_err(|e| Error::Protocol(e.to_string()))
    }
}

impl Credentials for PinCredentials {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn params(&self) -> &CryptoParams {
        &self.params
    }

    fn save(&self, tree: &mut ConfigTree, device: DeviceId, root: &str) {
        tree.set(conf_key(root, device, "type"), Self::TYPE);
        tree.set(conf_key(root, device, "params"), self.params.to_string_repr());
        tree.set(conf_key(root, device, "pin"), self.pin.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrips_through_encryption() {
        let key = [9u8; 16];
        let cred = PasswordCredentials::encrypt(&key, "alice", "s3cr3t");
        assert_eq!(cred.username(&key).unwrap(), "alice");
        assert_eq!(cred.password(&key).unwrap(), "s3cr3t");
    }

    #[test]
    fn pin_saves_expected_fields() {
        let key = [1u8; 16];
        let cred = PinCredentials::encrypt(&key, "1234");
        let mut tree = ConfigTree::default();
        let device = DeviceId::jablotron(1);
        cred.save(&mut tree, device, "credentials");
        assert_eq!(tree.get(&format!("credentials.{device}.type")), Some("pin"));
        assert!(tree.get(&format!("credentials.{device}.pin")).is_some());
    }
}
