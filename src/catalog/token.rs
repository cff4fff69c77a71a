use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::aggregator::AggregatorClient;
use crate::cache::TtlCache;
use crate::catalog::CatalogResult;
use crate::constants::{DESTINATION_CHAIN_ID, DESTINATION_USDC_ADDRESS, NATIVE_TOKEN_PLACEHOLDER, TOKEN_CATALOG_TTL_SECS};
use crate::error::BridgeError;
use crate::types::Token;

pub(crate) fn parse_token(value: &Value, chain_id: u64) -> Option<Token> {
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

/// Destination-chain tokens are hardcoded — their addresses are fixed
/// protocol constants, not discoverable via the aggregator (spec.md §4.2).
fn destination_tokens() -> Vec<Token> {
    vec![
        Token {
            address: DESTINATION_USDC_ADDRESS.to_string(),
            symbol: "USDC".into(),
            name: "USD Coin".into(),
            decimals: 6,
            logo_url: String::new(),
            chain_id: DESTINATION_CHAIN_ID,
            price_usd: Some(1.0),
        },
        Token {
            address: NATIVE_TOKEN_PLACEHOLDER.to_string(),
            symbol: "HYPE".into(),
            name: "Native Gas Token".into(),
            decimals: 18,
            logo_url: String::new(),
            chain_id: DESTINATION_CHAIN_ID,
            price_usd: None,
        },
    ]
}

/// Cached token discovery (spec.md §4.2).
pub struct TokenCatalog {
    aggregator: Arc<AggregatorClient>,
    tokens_cache: TtlCache<u64, (Vec<Token>, i64)>,
    bridgeable_cache: TtlCache<u64, (Vec<Token>, i64)>,
    fetch_timeout: Duration,
}

impl TokenCatalog {
    pub fn new(aggregator: Arc<AggregatorClient>) -> Self {
        Self {
            aggregator,
            tokens_cache: TtlCache::new(Duration::from_secs(TOKEN_CATALOG_TTL_SECS)),
            bridgeable_cache: TtlCache::new(Duration::from_secs(TOKEN_CATALOG_TTL_SECS)),
            fetch_timeout: Duration::from_secs(12),
        }
    }

    pub async fn get_tokens(&self, chain_id: u64) -> Result<CatalogResult<Vec<Token>>, BridgeError> {
        if chain_id == DESTINATION_CHAIN_ID {
            return Ok(CatalogResult::fresh(destination_tokens()));
        }
        if let Some((tokens, _)) = self.tokens_cache.get(&chain_id) {
            return Ok(CatalogResult::fresh(tokens));
        }

        match self.fetch_tokens(chain_id).await {
            Ok(tokens) => Ok(CatalogResult::fresh(tokens)),
            Err(err) => {
                if let Some((tokens, cached_at)) = self.tokens_cache.get_stale(&chain_id) {
                    warn!(chain_id, error = %err, "token catalog fetch failed, returning stale cache");
                    Ok(CatalogResult::stale(tokens, cached_at))
                } else {
                    Err(BridgeError::TokenFetchFailed { chain_id, message: err.to_string() })
                }
            }
        }
    }

    async fn fetch_tokens(&self, chain_id: u64) -> anyhow::Result<Vec<Token>> {
        let chain_id_str = chain_id.to_string();
        let body = self.aggregator.get("/tokens", &[("chains", chain_id_str.as_str())], self.fetch_timeout).await?;
        let entries = body
            .get("tokens")
            .and_then(|v| v.get(&chain_id_str))
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("aggregator /tokens missing entries for chain {chain_id}"))?;
        let tokens: Vec<Token> = entries.iter().filter_map(|v| parse_token(v, chain_id)).collect();
        self.tokens_cache.set(chain_id, (tokens.clone(), Utc::now().timestamp_millis()));
        Ok(tokens)
    }

    /// Tokens on `source_chain_id` with a known route to the destination
    /// chain, deduplicated by lowercased address.
    pub async fn get_bridgeable_tokens(&self, source_chain_id: u64) -> Result<CatalogResult<Vec<Token>>, BridgeError> {
        if let Some((tokens, _)) = self.bridgeable_cache.get(&source_chain_id) {
            return Ok(CatalogResult::fresh(tokens));
        }

        match self.fetch_bridgeable(source_chain_id).await {
            Ok(tokens) => Ok(CatalogResult::fresh(tokens)),
            Err(err) => {
                if let Some((tokens, cached_at)) = self.bridgeable_cache.get_stale(&source_chain_id) {
                    warn!(source_chain_id, error = %err, "bridgeable token fetch failed, returning stale cache");
                    Ok(CatalogResult::stale(tokens, cached_at))
                } else {
                    Err(BridgeError::TokenFetchFailed { chain_id: source_chain_id, message: err.to_string() })
                }
            }
        }
    }

    async fn fetch_bridgeable(&self, source_chain_id: u64) -> anyhow::Result<Vec<Token>> {
        let from = source_chain_id.to_string();
        let to = DESTINATION_CHAIN_ID.to_string();
        let body = self
            .aggregator
            .get("/connections", &[("fromChain", from.as_str()), ("toChain", to.as_str())], self.fetch_timeout)
            .await?;
        let entries = body
            .get("connections")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("fromTokens"))
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("aggregator /connections missing `fromTokens`"))?;

        let mut seen = HashSet::new();
        let mut tokens = Vec::new();
        for entry in entries {
            if let Some(token) = parse_token(entry, source_chain_id) {
                if seen.insert(token.address.clone()) {
                    tokens.push(token);
                }
            }
        }
        self.bridgeable_cache.set(source_chain_id, (tokens.clone(), Utc::now().timestamp_millis()));
        Ok(tokens)
    }

    pub fn reset(&self) {
        self.tokens_cache.invalidate(None);
        self.bridgeable_cache.invalidate(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_tokens_include_usdc_and_native() {
        let tokens = destination_tokens();
        assert!(tokens.iter().any(|t| t.symbol == "USDC" && t.address == DESTINATION_USDC_ADDRESS));
        assert!(tokens.iter().any(|t| t.address == NATIVE_TOKEN_PLACEHOLDER));
    }

    #[test]
    fn parse_token_rejects_missing_symbol() {
        let value = serde_json::json!({"address": "0xabc", "decimals": 6});
        assert!(parse_token(&value, 1).is_none());
    }
}
