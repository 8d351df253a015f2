//! `GatewayConfig` — the minimal `toml` configuration the daemon needs to
//! parameterize each technology's manager.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfig {
    pub credentials: CredentialsConfig,
    pub jablotron: Option<JablotronConfig>,
    pub conrad: Option<ConradConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CredentialsConfig {
    pub path: PathBuf,
    #[serde(default = "default_credentials_root")]
    pub root: String,
    /// Hex-encoded AES-128 key used to encrypt/decrypt secret fields.
    pub key_hex: String,
}

fn default_credentials_root() -> String {
    "credentials".to_string()
}

impl CredentialsConfig {
    pub fn key(&self) -> anyhow::Result<[u8; 16]> {
        let bytes = hex::decode(&self.key_hex).context("credentials.key_hex is not valid hex")?;
        bytes.try_into().map_err(|_| anyhow::anyhow!("credentials.key_hex must decode to exactly 16 bytes"))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct JablotronConfig {
    pub serial_port: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConradConfig {
    pub event_endpoint: String,
    pub cmd_endpoint: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl ConradConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl GatewayConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
