//! `JablotronReport` — an unsolicited sensor report, and the small
//! token-scanning helpers (`has`/`get`/`temperature`/`battery`) every
//! gadget decoder in `gadget.rs` builds on.

use gw_core::prelude::*;

/// `{address, type, data}`. The sentinel `address == 0` marks an invalid
/// report, returned by `poll_report` on timeout.
#[derive(Clone, PartialEq, Debug)]
pub struct JablotronReport {
    pub address: u32,
    pub type_tag: String,
    pub data: String,
}

impl JablotronReport {
    pub fn invalid() -> Self {
        Self {
            address: 0,
            type_tag: String::new(),
            data: String::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.address != 0
    }

    /// Whether a bare keyword (`"SENSOR"`) or a `keyword:value` token
    /// (`"LB:0"`) appears among the whitespace-separated tokens of the
    /// payload. With `has_value = true`, only `keyword:value` counts.
    pub fn has(&self, keyword: &str, has_value: bool) -> bool {
        self.data.split_whitespace().any(|tok| {
            if has_value {
                tok.strip_prefix(keyword)
                    .map(|rest| rest.starts_with(':'))
                    .unwrap_or(false)
            } else {
                tok == keyword || tok.strip_prefix(keyword).map(|r| r.starts_with(':')).unwrap_or(false)
            }
        })
    }

    /// Requires an integer-valued `keyword:NN` token and returns `NN`.
    pub fn get(&self, keyword: &str) -> Result<i64> {
        for tok in self.data.split_whitespace() {
            if let Some(rest) = tok.strip_prefix(keyword) {
                if let Some(value) = rest.strip_prefix(':') {
                    return value
                        .parse::<i64>()
                        .map_err(|_| Error::NotFound(format!("{keyword} has no integer value")));
                }
            }
        }
        Err(Error::NotFound(format!("keyword {keyword} not present")))
    }

    /// Requires a `keyword:NN.N°C` token (the degree byte is UTF-8 `0xB0`)
    /// and returns the Celsius value.
    pub fn temperature(&self, keyword: &str) -> Result<f64> {
        let prefix = format!("{keyword}:");
        for tok in self.data.split_whitespace() {
            if let Some(rest) = tok.strip_prefix(&prefix) {
                let numeric = rest
                    .strip_suffix("\u{b0}C")
                    .or_else(|| rest.strip_suffix("°C"))
                    .ok_or_else(|| Error::NotFound(format!("{keyword} has no temperature value")))?;
                return numeric
                    .parse::<f64>()
                    .map_err(|_| Error::NotFound(format!("{keyword} has no temperature value")));
            }
        }
        Err(Error::NotFound(format!("keyword {keyword} not present")))
    }

    /// `LB:0` -> 100% battery, `LB:1` -> 5% battery (low-battery flag).
    pub fn battery(&self) -> f64 {
        match self.get("LB") {
            Ok(0) => 100.0,
            _ => 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(data: &str) -> JablotronReport {
        JablotronReport {
            address: 0x1A0000,
            type_tag: "JA-81M".to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn has_bare_keyword() {
        assert!(report("SENSOR LB:0 ACT:1").has("SENSOR", false));
        assert!(!report("SENSOR LB:0 ACT:1").has("TAMPER", false));
    }

    #[test]
    fn has_value_keyword() {
        assert!(report("LB:0 ACT:1").has("ACT", true));
        assert!(!report("LB:0 ACT:1").has("SENSOR", true));
    }

    #[test]
    fn get_integer() {
        assert_eq!(report("LB:0 ACT:1").get("ACT").unwrap(), 1);
        assert!(report("LB:0").get("ACT").is_err());
    }

    #[test]
    fn temperature_token() {
        let r = report("SET:21.5\u{b0}C INT:22.0\u{b0}C");
        assert_eq!(r.temperature("SET").unwrap(), 21.5);
        assert_eq!(r.temperature("INT").unwrap(), 22.0);
    }

    #[test]
    fn battery_levels() {
        assert_eq!(report("LB:0").battery(), 100.0);
        assert_eq!(report("LB:1").battery(), 5.0);
        assert_eq!(report("SENSOR").battery(), 5.0);
    }

    #[test]
    fn invalid_sentinel() {
        let r = JablotronReport::invalid();
        assert!(!r.is_valid());
    }
}
