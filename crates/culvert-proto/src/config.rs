//! ---
//! culvert_section: "01-wire-contract"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Agent configuration document with lossless unknown-key handling."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Agent configuration document.
///
/// Only the fields the control plane understands are typed; everything else
/// lands in the flattened `extra` table so a decode/encode cycle returns a
/// structurally identical document. Ingress order is significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tunnel identifier the agent runs under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<String>,
    /// Ordered ingress routing rules; first match wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Vec<IngressRule>>,
    /// Metrics listener address of the supervised process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
    /// Log level of the supervised process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<String>,
    /// Unrecognized keys, preserved verbatim and in order.
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

/// One ingress routing rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Hostname this rule matches; absent on the catch-all rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Target service URL, e.g. `http://localhost:3000` or `http_status:404`.
    #[serde(default)]
    pub service: String,
    /// Optional path matcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Validation failures for a configuration document.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The document carries no ingress rules at all.
    #[error("ingress rules are required")]
    MissingIngress,
    /// The final rule does not name a service, so unmatched requests have
    /// nowhere to go.
    #[error("last ingress rule must have a service")]
    MissingCatchAll,
}

impl Config {
    /// Validate the structural rules the agent enforces before persisting:
    /// at least one ingress rule, and the last rule must name a service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rules = self.ingress.as_deref().unwrap_or_default();
        let last = rules.last().ok_or(ConfigError::MissingIngress)?;
        if last.service.is_empty() {
            return Err(ConfigError::MissingCatchAll);
        }
        Ok(())
    }

    /// Canonical editor text: pretty-printed JSON of this document.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            tunnel: Some("edge-tunnel".to_string()),
            ingress: Some(vec![
                IngressRule {
                    hostname: Some("app.example.com".to_string()),
                    service: "http://localhost:3000".to_string(),
                    path: None,
                },
                IngressRule {
                    hostname: None,
                    service: "http_status:404".to_string(),
                    path: None,
                },
            ]),
            metrics: None,
            loglevel: Some("info".to_string()),
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn unknown_keys_survive_a_decode_encode_cycle() {
        let text = r#"{
            "tunnel": "edge-tunnel",
            "warp-routing": {"enabled": true},
            "ingress": [
                {"hostname": "app.example.com", "service": "http://localhost:3000"},
                {"service": "http_status:404"}
            ],
            "originRequest": {"connectTimeout": "30s"}
        }"#;
        let config: Config = serde_json::from_str(text).expect("deserialize");
        assert_eq!(config.extra.len(), 2);
        assert!(config.extra.contains_key("warp-routing"));

        let encoded = serde_json::to_value(&config).expect("serialize");
        let original: serde_json::Value = serde_json::from_str(text).expect("raw value");
        assert_eq!(encoded, original);
    }

    #[test]
    fn ingress_order_is_preserved() {
        let config = sample();
        let back: Config =
            serde_json::from_str(&config.to_pretty_json().expect("pretty")).expect("deserialize");
        let rules = back.ingress.expect("ingress");
        assert_eq!(rules[0].hostname.as_deref(), Some("app.example.com"));
        assert_eq!(rules[1].service, "http_status:404");
    }

    #[test]
    fn validation_requires_at_least_one_rule() {
        let mut config = sample();
        config.ingress = None;
        assert_eq!(config.validate(), Err(ConfigError::MissingIngress));
        config.ingress = Some(Vec::new());
        assert_eq!(config.validate(), Err(ConfigError::MissingIngress));
    }

    #[test]
    fn validation_requires_a_final_service() {
        let mut config = sample();
        if let Some(rules) = config.ingress.as_mut() {
            rules.push(IngressRule::default());
        }
        assert_eq!(config.validate(), Err(ConfigError::MissingCatchAll));
    }

    #[test]
    fn valid_document_passes() {
        assert_eq!(sample().validate(), Ok(()));
    }
}
