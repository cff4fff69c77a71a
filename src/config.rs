//! C1 ambient collaborator — client configuration, per spec.md §6 and
//! SPEC_FULL.md §4.0/§9. Grounded on `config.rs::Config::load`'s
//! layered-load + `dotenvy` env-override shape, re-expressed as a direct
//! `toml::from_str` deserialize (this crate has one flat settings struct,
//! not the teacher's multi-provider chain) narrowed to the handful of
//! fields this crate's pipeline actually reads.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SLIPPAGE, MAX_SLIPPAGE, MIN_SLIPPAGE};
use crate::error::BridgeError;

/// The one configuration object every public client is constructed from.
///
/// `integrator` is the only required field; everything else has a spec-
/// mandated default. `validate()` is called by `Client::new` before any
/// network call is made, per SPEC_FULL.md §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub integrator: String,

    #[serde(default = "default_true")]
    pub auto_deposit: bool,

    #[serde(default = "default_slippage")]
    pub default_slippage: f64,

    #[serde(default)]
    pub rpc_urls: HashMap<u64, String>,

    #[serde(default)]
    pub lifi_api_key: Option<String>,

    /// Base URL of the opaque routing aggregator (spec.md §6's `GET
    /// /chains`/`/quote`/etc. surface). Not part of the caller-visible
    /// config vocabulary in most SDKs of this shape, but this crate has no
    /// other way to learn where that HTTP surface lives.
    #[serde(default = "default_aggregator_base_url")]
    pub aggregator_base_url: String,

    /// Base URL of the trading-ledger info endpoint `l1_monitor.rs` polls.
    #[serde(default = "default_info_endpoint")]
    pub info_endpoint: String,

    /// Selects the testnet RPC/info-endpoint variants, per spec.md §6.
    #[serde(default)]
    pub use_testnet: bool,
}

fn default_true() -> bool {
    true
}

fn default_slippage() -> f64 {
    DEFAULT_SLIPPAGE
}

fn default_aggregator_base_url() -> String {
    "https://li.quest/v1".to_string()
}

fn default_info_endpoint() -> String {
    "https://api.hyperliquid.xyz".to_string()
}

impl ClientConfig {
    pub fn new(integrator: impl Into<String>) -> Self {
        Self {
            integrator: integrator.into(),
            auto_deposit: default_true(),
            default_slippage: default_slippage(),
            rpc_urls: HashMap::new(),
            lifi_api_key: None,
            aggregator_base_url: default_aggregator_base_url(),
            info_endpoint: default_info_endpoint(),
            use_testnet: false,
        }
    }

    /// Load a config from a TOML file, with `XBRIDGE_`-prefixed
    /// environment variables overlaid on top, matching
    /// `config.rs::Config::load`'s layered-source approach.
    pub async fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let content = tokio::fs::read_to_string(path).await?;
        let file_config: ClientConfig = toml::from_str(&content)?;
        let merged = apply_env_overrides(file_config);
        merged.validate().map_err(anyhow::Error::from)?;
        Ok(merged)
    }

    /// Rejects configuration that would cause every network call to fail
    /// or misbehave, before any of those calls are made, per
    /// SPEC_FULL.md §9.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.integrator.trim().is_empty() {
            return Err(BridgeError::InvalidQuoteParams { reason: "integrator must not be empty".into() });
        }
        if !(MIN_SLIPPAGE..=MAX_SLIPPAGE).contains(&self.default_slippage) {
            return Err(BridgeError::InvalidSlippage { value: self.default_slippage });
        }
        Ok(())
    }

    pub fn destination_chain_id(&self) -> u64 {
        if self.use_testnet {
            crate::constants::DESTINATION_TESTNET_CHAIN_ID
        } else {
            crate::constants::DESTINATION_CHAIN_ID
        }
    }
}

fn apply_env_overrides(mut config: ClientConfig) -> ClientConfig {
    if let Ok(integrator) = std::env::var("XBRIDGE_INTEGRATOR") {
        config.integrator = integrator;
    }
    if let Ok(api_key) = std::env::var("XBRIDGE_LIFI_API_KEY") {
        config.lifi_api_key = Some(api_key);
    }
    if let Ok(slippage) = std::env::var("XBRIDGE_DEFAULT_SLIPPAGE") {
        if let Ok(value) = slippage.parse() {
            config.default_slippage = value;
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ClientConfig::new("xbridge-demo");
        assert!(config.auto_deposit);
        assert_eq!(config.default_slippage, 0.005);
        assert!(config.rpc_urls.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_integrator() {
        let config = ClientConfig::new("");
        assert!(matches!(config.validate(), Err(BridgeError::InvalidQuoteParams { .. })));
    }

    #[test]
    fn validate_rejects_out_of_range_slippage() {
        let mut config = ClientConfig::new("xbridge-demo");
        config.default_slippage = 0.25;
        assert!(matches!(config.validate(), Err(BridgeError::InvalidSlippage { .. })));
    }

    #[test]
    fn destination_chain_id_switches_on_testnet_flag() {
        let mut config = ClientConfig::new("xbridge-demo");
        assert_eq!(config.destination_chain_id(), crate::constants::DESTINATION_CHAIN_ID);
        config.use_testnet = true;
        assert_eq!(config.destination_chain_id(), crate::constants::DESTINATION_TESTNET_CHAIN_ID);
    }
}
