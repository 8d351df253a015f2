//! A minimal scanner for the VPT HTTP-polled gateway. Reuses the
//! poll-and-diff shape [`crate::fhem::HttpPollScanner`] defines.

use std::collections::HashMap;
use std::time::Duration;

use gw_core::prelude::*;
use serde_json::Value;

use crate::fhem::HttpPollScanner;

#[derive(Clone, Debug)]
pub struct VptHttpScannerConfig {
    pub base_url: String,
    pub poll_interval: Duration,
}

/// A VPT scanner stub: fetches `{base_url}/state`, which is expected to
/// return a JSON object of `{device_id: payload}`. The precise payload
/// shape VPT gadgets use is out of scope.
pub struct VptHttpScanner {
    config: VptHttpScannerConfig,
}

impl VptHttpScanner {
    pub fn new(config: VptHttpScannerConfig) -> Self {
        Self { config }
    }
}

impl HttpPollScanner for VptHttpScanner {
    fn fetch_snapshot(&self) -> Result<HashMap<String, Value>> {
        let url = format!("{}/state", self.config.base_url);
        reqwest::blocking::get(&url).and_then(|r| r.json()).map_err(|e| Error::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeScanner {
        snapshot: HashMap<String, Value>,
    }

    impl HttpPollScanner for FakeScanner {
        fn fetch_snapshot(&self) -> Result<HashMap<String, Value>> {
            Ok(self.snapshot.clone())
        }
    }

    #[test]
    fn first_poll_reports_every_device_as_new() {
        let scanner = FakeScanner {
            snapshot: HashMap::from([("vpt-1".to_string(), serde_json::json!({"on": true}))]),
        };
        let mut previous = HashMap::new();
        let changes = scanner.poll(&mut previous).unwrap();
        assert_eq!(changes, vec![(true, "vpt-1".to_string(), serde_json::json!({"on": true}))]);
    }

    #[test]
    fn unchanged_device_is_not_reported_again() {
        let scanner = FakeScanner {
            snapshot: HashMap::from([("vpt-1".to_string(), serde_json::json!({"on": true}))]),
        };
        let mut previous = HashMap::new();
        scanner.poll(&mut previous).unwrap();
        let changes = scanner.poll(&mut previous).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn changed_payload_is_reported_as_not_new() {
        let scanner_v1 = FakeScanner {
            snapshot: HashMap::from([("vpt-1".to_string(), serde_json::json!({"on": true}))]),
        };
        let mut previous = HashMap::new();
        scanner_v1.poll(&mut previous).unwrap();

        let scanner_v2 = FakeScanner {
            snapshot: HashMap::from([("vpt-1".to_string(), serde_json::json!({"on": false}))]),
        };
        let changes = scanner_v2.poll(&mut previous).unwrap();
        assert_eq!(changes, vec![(false, "vpt-1".to_string(), serde_json::json!({"on": false}))]);
    }
}
