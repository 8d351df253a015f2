//! A flat, dotted-key configuration tree: the credentials file is a
//! sequence of `a.b.c = value` lines. `toml` (used by `gw-cli`'s
//! `GatewayConfig`) is the wrong shape for an arbitrary,
//! dynamically-keyed property tree, so this is a small, dedicated
//! store rather than a borrowed format that doesn't fit.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

use gw_core::prelude::*;

/// An ordered set of dotted key/value pairs, e.g. `credentials.0x01....type`.
#[derive(Clone, Debug, Default)]
pub struct ConfigTree {
    entries: BTreeMap<String, String>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove_prefixed(&mut self, prefix: &str) {
        let dotted = format!("{prefix}.");
        self.entries.retain(|k, _| !(k == prefix || k.starts_with(&dotted)));
    }

    /// The distinct first path segment below `root` for every key that
    /// starts with `root.`, in the order they'd be encountered walking the
    /// tree (used to enumerate device ids stored under `credentials`).
    pub fn child_keys(&self, root: &str) -> Vec<String> {
        let dotted = format!("{root}.");
        let mut seen = Vec::new();
        for key in self.entries.keys() {
            let Some(rest) = key.strip_prefix(&dotted) else { continue };
            let child = rest.split('.').next().unwrap_or(rest).to_string();
            if !seen.contains(&child) {
                seen.push(child);
            }
        }
        seen
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(Error::Io)?;
        let reader = std::io::BufReader::new(file);
        let mut tree = Self::new();
        for line in reader.lines() {
            let line = line.map_err(Error::Io)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            tree.set(key.trim().to_string(), value.trim().to_string());
        }
        Ok(tree)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path).map_err(Error::Io)?;
        for (key, value) in &self.entries {
            writeln!(file, "{key} = {value}").map_err(Error::Io)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_keys_lists_distinct_first_segments() {
        let mut tree = ConfigTree::new();
        tree.set("credentials.0x01.type", "pin");
        tree.set("credentials.0x01.pin", "xyz");
        tree.set("credentials.0x02.type", "password");
        assert_eq!(tree.child_keys("credentials"), vec!["0x01", "0x02"]);
    }

    #[test]
    fn remove_prefixed_drops_only_matching_keys() {
        let mut tree = ConfigTree::new();
        tree.set("credentials.0x01.type", "pin");
        tree.set("credentials.0x01.pin", "xyz");
        tree.set("credentials.0x02.type", "password");
        tree.remove_prefixed("credentials.0x01");
        assert_eq!(tree.child_keys("credentials"), vec!["0x02"]);
    }

    #[test]
    fn roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.conf");
        let mut tree = ConfigTree::new();
        tree.set("credentials.0x01.type", "pin");
        tree.save(&path).unwrap();

        let loaded = ConfigTree::load(&path).unwrap();
        assert_eq!(loaded.get("credentials.0x01.type"), Some("pin"));
    }
}
