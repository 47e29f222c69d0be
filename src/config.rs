//! Service configuration read from the environment (after `.env`).

use rust_decimal::Decimal;
use std::str::FromStr;
use crate::domain::value_objects::TaxRate;
use crate::{PosError, Result};

pub const DEFAULT_PORT: u16 = 8084;
pub const DEFAULT_BUCKET: &str = "product-images";

#[derive(Clone, Debug, PartialEq)]
pub enum BackendConfig {
    /// Hosted backend reached over HTTP.
    Rest { url: String, anon_key: String },
    /// In-process backend for offline runs and demos. Data is lost on exit.
    /// `demo_user` is an email and password accepted by sign-in.
    Memory { demo_user: Option<(String, String)> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub backend: BackendConfig,
    pub storage_bucket: String,
    pub tax_rate: TaxRate,
    pub realtime: bool,
    pub nats_url: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Endpoint and key have no built-in fallback: a missing value is an error.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let backend = match get("POS_BACKEND").as_deref().unwrap_or("rest") {
            "rest" => {
                let url = get("POS_BACKEND_URL").ok_or_else(|| PosError::Config("POS_BACKEND_URL is not set".into()))?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(PosError::Config(format!("POS_BACKEND_URL must be an http(s) URL, got {url}")));
                }
                let anon_key = get("POS_BACKEND_ANON_KEY").ok_or_else(|| PosError::Config("POS_BACKEND_ANON_KEY is not set".into()))?;
                BackendConfig::Rest { url: url.trim_end_matches('/').to_string(), anon_key }
            }
            "memory" => BackendConfig::Memory { demo_user: get("POS_DEMO_EMAIL").zip(get("POS_DEMO_PASSWORD")) },
            other => return Err(PosError::Config(format!("unknown POS_BACKEND {other:?} (expected rest or memory)"))),
        };
        let tax_rate = match get("POS_TAX_RATE") {
            Some(raw) => {
                let fraction = Decimal::from_str(&raw).map_err(|e| PosError::Config(format!("POS_TAX_RATE {raw:?}: {e}")))?;
                TaxRate::new(fraction).map_err(|e| PosError::Config(e.to_string()))?
            }
            None => TaxRate::STANDARD,
        };
        let realtime = match get("POS_REALTIME").as_deref() {
            None => true,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => return Err(PosError::Config(format!("POS_REALTIME {other:?} is not a boolean"))),
        };
        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| PosError::Config(format!("PORT {raw:?} is not a port number")))?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            backend,
            storage_bucket: get("POS_STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            tax_rate,
            realtime,
            nats_url: get("NATS_URL"),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_rest_requires_url_and_key() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("POS_BACKEND_URL"));
        let err = Config::from_lookup(lookup(&[("POS_BACKEND_URL", "https://x.example.co")])).unwrap_err();
        assert!(err.to_string().contains("POS_BACKEND_ANON_KEY"));
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[("POS_BACKEND_URL", "https://x.example.co/"), ("POS_BACKEND_ANON_KEY", "anon")])).unwrap();
        assert_eq!(cfg.backend, BackendConfig::Rest { url: "https://x.example.co".into(), anon_key: "anon".into() });
        assert_eq!(cfg.tax_rate, TaxRate::STANDARD);
        assert_eq!(cfg.storage_bucket, DEFAULT_BUCKET);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.realtime);
        assert_eq!(cfg.nats_url, None);
    }

    #[test]
    fn test_memory_and_overrides() {
        let cfg = Config::from_lookup(lookup(&[("POS_BACKEND", "memory"), ("POS_TAX_RATE", "0.08"), ("POS_REALTIME", "off"), ("PORT", "9000")])).unwrap();
        assert_eq!(cfg.backend, BackendConfig::Memory { demo_user: None });
        assert_eq!(cfg.tax_rate.fraction(), Decimal::new(8, 2));
        assert!(!cfg.realtime);
        assert_eq!(cfg.port, 9000);
        assert!(Config::from_lookup(lookup(&[("POS_BACKEND", "memory"), ("POS_TAX_RATE", "1.5")])).is_err());
        let demo = Config::from_lookup(lookup(&[("POS_BACKEND", "memory"), ("POS_DEMO_EMAIL", "a@b.mx"), ("POS_DEMO_PASSWORD", "secret")])).unwrap();
        assert_eq!(demo.backend, BackendConfig::Memory { demo_user: Some(("a@b.mx".into(), "secret".into())) });
    }
}
