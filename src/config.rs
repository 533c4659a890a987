//! Configuration loading for Invoice-View.
//!
//! Every field has a default so an empty file is a valid configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub http: HttpConfig,
}

/// How existing view records react to a new customer collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Re-enrich every materialized record on each customer update
    #[default]
    Live,
    /// Keep the customer seen when the record was enriched
    Snapshot,
}

/// Resource names and join behaviour of the store
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub invoices_resource: String,
    pub customers_resource: String,
    /// Child path under an invoice holding its items
    pub items_resource: String,
    pub join_policy: JoinPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            invoices_resource: "invoices".to_string(),
            customers_resource: "customers".to_string(),
            items_resource: "items".to_string(),
            join_policy: JoinPolicy::default(),
        }
    }
}

/// REST transport settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let resources = [
            ("store.invoices_resource", &self.store.invoices_resource),
            ("store.customers_resource", &self.store.customers_resource),
            ("store.items_resource", &self.store.items_resource),
        ];
        for (field, value) in resources {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if reqwest::Url::parse(&self.http.base_url).is_err() {
            return Err(invalid("http.base_url", "must be an absolute URL"));
        }
        if self.http.request_timeout_ms == 0 {
            return Err(invalid("http.request_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::Configuration(format!("invalid value for {field}: {reason}"))
}
