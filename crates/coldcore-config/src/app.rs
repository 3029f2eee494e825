//! Application settings (`app.json`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frontend key under which canceled insurance statuses are recorded.
pub const BITSURANCE_NOTIFY_KEY: &str = "bitsuranceNotify";

fn default_main_fiat() -> String {
    "USD".to_string()
}

fn default_fiat_list() -> Vec<String> {
    vec!["USD".to_string(), "EUR".to_string(), "CHF".to_string()]
}

fn default_frontend() -> Value {
    Value::Object(Map::new())
}

/// Typed backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettings {
    /// Fiat currency used for totals.
    #[serde(default = "default_main_fiat")]
    pub main_fiat: String,
    /// Fiat currencies offered in the UI.
    #[serde(default = "default_fiat_list")]
    pub fiat_list: Vec<String>,
    /// UI language override, empty for the system default.
    #[serde(default)]
    pub user_language: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            main_fiat: default_main_fiat(),
            fiat_list: default_fiat_list(),
            user_language: String::new(),
            extra: Map::new(),
        }
    }
}

/// Contents of `app.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    /// Opaque frontend settings.
    #[serde(default = "default_frontend")]
    pub frontend: Value,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            frontend: default_frontend(),
        }
    }
}

impl AppConfig {
    /// Mutable access to the frontend object, replacing non-objects.
    pub fn frontend_object(&mut self) -> &mut Map<String, Value> {
        if !self.frontend.is_object() {
            self.frontend = default_frontend();
        }
        match &mut self.frontend {
            Value::Object(map) => map,
            _ => unreachable!("frontend was just replaced by an object"),
        }
    }

    /// Remember that the insurance of an account was canceled, for a UI prompt.
    pub fn record_insurance_canceled(&mut self, code: &str) {
        let notify = self
            .frontend_object()
            .entry(BITSURANCE_NOTIFY_KEY)
            .or_insert_with(default_frontend);
        if !notify.is_object() {
            *notify = default_frontend();
        }
        if let Value::Object(map) = notify {
            map.insert(code.to_string(), Value::String("canceled".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.backend.main_fiat, "USD");
        assert!(cfg.frontend.is_object());
    }

    #[test]
    fn test_record_insurance_canceled() {
        let mut cfg = AppConfig {
            frontend: Value::Null,
            ..Default::default()
        };
        cfg.record_insurance_canceled("v0-55555555-btc-0");
        assert_eq!(
            cfg.frontend[BITSURANCE_NOTIFY_KEY]["v0-55555555-btc-0"],
            "canceled"
        );
    }
}
