use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::aggregator::AggregatorClient;
use crate::cache::TtlCache;
use crate::catalog::CatalogResult;
use crate::constants::{
    CHAIN_CATALOG_TTL_SECS, DESTINATION_CHAIN_ID, DESTINATION_USDC_ADDRESS, NATIVE_TOKEN_PLACEHOLDER,
};
use crate::error::BridgeError;
use crate::types::{Chain, Token};

fn destination_chain() -> Chain {
    Chain {
        id: DESTINATION_CHAIN_ID,
        key: "hyperevm".into(),
        name: "Destination EVM".into(),
        logo_url: String::new(),
        native_token: Token {
            address: NATIVE_TOKEN_PLACEHOLDER.into(),
            symbol: "HYPE".into(),
            name: "Native Gas Token".into(),
            decimals: 18,
            logo_url: String::new(),
            chain_id: DESTINATION_CHAIN_ID,
            price_usd: None,
        },
        is_evm: true,
    }
}

fn parse_token(value: &Value, chain_id: u64) -> Option<Token> {
    let address = value.get("address")?.as_str()?.to_lowercase();
    let symbol = value.get("symbol")?.as_str()?.to_string();
    if symbol.is_empty() {
        return None;
    }
    let decimals = value.get("decimals")?.as_u64()?;
    Some(Token {
        address,
        symbol,
        name: value.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        decimals: decimals as u32,
        logo_url: value.get("logoURI").and_then(Value::as_str).unwrap_or_default().to_string(),
        chain_id,
        price_usd: value.get("priceUSD").and_then(Value::as_str).and_then(|s| s.parse().ok()),
    })
}

fn parse_chain(value: &Value) -> Option<Chain> {
    let id = value.get("id")?.as_u64()?;
    let key = value.get("key")?.as_str()?.to_string();
    let name = value.get("name")?.as_str()?.to_string();
    if key.is_empty() || name.is_empty() {
        return None;
    }
    let is_mainnet = value.get("mainnet").and_then(Value::as_bool).unwrap_or(true);
    let is_evm = value.get("chainType").and_then(Value::as_str).map(|t| t.eq_ignore_ascii_case("evm")).unwrap_or(true);
    if !is_mainnet || !is_evm {
        return None;
    }
    let native_token = parse_token(value.get("nativeToken")?, id)?;
    Some(Chain { id, key, name, logo_url: value.get("logoURI").and_then(Value::as_str).unwrap_or_default().to_string(), native_token, is_evm })
}

/// Cached chain discovery (spec.md §4.2).
pub struct ChainCatalog {
    aggregator: Arc<AggregatorClient>,
    cache: TtlCache<(), (Vec<Chain>, i64)>,
    fetch_timeout: Duration,
}

impl ChainCatalog {
    pub fn new(aggregator: Arc<AggregatorClient>) -> Self {
        Self { aggregator, cache: TtlCache::new(Duration::from_secs(CHAIN_CATALOG_TTL_SECS)), fetch_timeout: Duration::from_secs(12) }
    }

    pub async fn get_chains(&self) -> Result<CatalogResult<Vec<Chain>>, BridgeError> {
        if let Some((chains, _)) = self.cache.get(&()) {
            return Ok(CatalogResult::fresh(chains));
        }

        match self.fetch_and_cache().await {
            Ok(chains) => Ok(CatalogResult::fresh(chains)),
            Err(err) => {
                if let Some((chains, cached_at)) = self.cache.get_stale(&()) {
                    warn!(error = %err, "chain catalog fetch failed, returning stale cache");
                    Ok(CatalogResult::stale(chains, cached_at))
                } else {
                    Err(BridgeError::ChainFetchFailed { message: err.to_string() })
                }
            }
        }
    }

    async fn fetch_and_cache(&self) -> anyhow::Result<Vec<Chain>> {
        let body = self.aggregator.get("/chains", &[], self.fetch_timeout).await?;
        let entries = body.get("chains").and_then(Value::as_array).ok_or_else(|| anyhow::anyhow!("aggregator /chains missing `chains` array"))?;

        let mut chains: Vec<Chain> = entries.iter().filter_map(parse_chain).collect();
        chains.retain(|c| c.id != DESTINATION_CHAIN_ID);
        chains.push(destination_chain());

        self.cache.set((), (chains.clone(), Utc::now().timestamp_millis()));
        Ok(chains)
    }

    pub fn reset(&self) {
        self.cache.invalidate(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_chain_is_always_present() {
        let dest = destination_chain();
        assert_eq!(dest.id, DESTINATION_CHAIN_ID);
        assert_eq!(dest.native_token.chain_id, DESTINATION_CHAIN_ID);
    }

    #[test]
    fn parse_chain_rejects_non_evm() {
        let value = serde_json::json!({
            "id": 2, "key": "sol", "name": "Solana", "chainType": "SVM", "mainnet": true,
            "nativeToken": {"address": "0x0", "symbol": "SOL", "decimals": 9},
        });
        assert!(parse_chain(&value).is_none());
    }

    #[test]
    fn parse_chain_accepts_well_formed_evm_entry() {
        let value = serde_json::json!({
            "id": 137, "key": "pol", "name": "Polygon", "chainType": "EVM", "mainnet": true,
            "nativeToken": {"address": NATIVE_TOKEN_PLACEHOLDER, "symbol": "MATIC", "decimals": 18, "name": "Matic"},
        });
        let chain = parse_chain(&value).unwrap();
        assert_eq!(chain.id, 137);
        assert_eq!(chain.native_token.symbol, "MATIC");
    }

    #[test]
    fn destination_usdc_constant_is_lowercase() {
        assert_eq!(DESTINATION_USDC_ADDRESS, DESTINATION_USDC_ADDRESS.to_lowercase());
    }
}
