//! C5 — balance service, per spec.md §4.3.
//!
//! Per-key dedup of concurrent requests, a 300 ms debounce window before
//! the actual fetch, and stale-cache fallback on error mirror the
//! request-coalescing pattern in `bridges/transaction_monitor.rs`'s
//! subscriber handling, generalized to a keyed cache instead of a single
//! broadcast stream.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use num_bigint::BigUint;
use tokio::sync::broadcast;
use tracing::warn;

use crate::aggregator::AggregatorClient;
use crate::cache::TtlCache;
use crate::calldata;
use crate::catalog::token::parse_token;
use crate::common::validation::is_valid_address;
use crate::constants::{BALANCE_CACHE_TTL_SECS, BALANCE_DEBOUNCE_MS, NATIVE_TOKEN_PLACEHOLDER};
use crate::error::BridgeError;
use crate::rpc::{RpcClient, RpcEndpoints};
use crate::types::{Balance, BalanceKey, BalanceValidation, BalancesResponse, Quote, Token};

type BalanceFetch = Result<Balance, BridgeError>;

pub struct BalanceService {
    aggregator: Arc<AggregatorClient>,
    rpc_endpoints: Arc<RpcEndpoints>,
    rpc_clients: DashMap<u64, Arc<RpcClient>>,
    cache: TtlCache<BalanceKey, (Balance, i64)>,
    in_flight: DashMap<BalanceKey, broadcast::Sender<BalanceFetch>>,
}

impl BalanceService {
    pub fn new(aggregator: Arc<AggregatorClient>, rpc_endpoints: Arc<RpcEndpoints>) -> Self {
        Self {
            aggregator,
            rpc_endpoints,
            rpc_clients: DashMap::new(),
            cache: TtlCache::new(Duration::from_secs(BALANCE_CACHE_TTL_SECS)),
            in_flight: DashMap::new(),
        }
    }

    fn rpc_client(&self, chain_id: u64) -> anyhow::Result<Arc<RpcClient>> {
        if let Some(client) = self.rpc_clients.get(&chain_id) {
            return Ok(client.clone());
        }
        let endpoint = self.rpc_endpoints.get(chain_id)?;
        let client = Arc::new(RpcClient::new(endpoint));
        self.rpc_clients.insert(chain_id, client.clone());
        Ok(client)
    }

    pub async fn get_balance(&self, wallet: &str, chain_id: u64, token_address: &str) -> Result<Balance, BridgeError> {
        if !is_valid_address(wallet) {
            return Err(BridgeError::InvalidAddress { address: wallet.to_string() });
        }
        if !is_valid_address(token_address) && token_address != NATIVE_TOKEN_PLACEHOLDER {
            return Err(BridgeError::InvalidAddress { address: token_address.to_string() });
        }

        let key = BalanceKey::new(wallet, chain_id, token_address);

        if let Some((balance, _)) = self.cache.get(&key) {
            return Ok(balance);
        }

        if let Some(sender) = self.in_flight.get(&key) {
            let mut receiver = sender.subscribe();
            drop(sender);
            return receiver.recv().await.map_err(|_| BridgeError::BalanceFetchFailed { message: "in-flight balance fetch dropped".into() })?;
        }

        let (sender, _) = broadcast::channel(1);
        self.in_flight.insert(key.clone(), sender.clone());

        let result = self.fetch_with_debounce(wallet, chain_id, token_address, &key).await;
        self.in_flight.remove(&key);
        let _ = sender.send(result.clone());
        result
    }

    async fn fetch_with_debounce(&self, wallet: &str, chain_id: u64, token_address: &str, key: &BalanceKey) -> BalanceFetch {
        tokio::time::sleep(Duration::from_millis(BALANCE_DEBOUNCE_MS)).await;

        match self.fetch_onchain(wallet, chain_id, token_address).await {
            Ok(balance) => {
                self.cache.set(key.clone(), (balance.clone(), Utc::now().timestamp_millis()));
                Ok(balance)
            }
            Err(err) => {
                if let Some((mut stale, _)) = self.cache.get_stale(key) {
                    warn!(wallet, chain_id, token_address, error = %err, "balance fetch failed, returning stale cache");
                    stale.is_stale = true;
                    Ok(stale)
                } else {
                    Err(BridgeError::BalanceFetchFailed { message: err.to_string() })
                }
            }
        }
    }

    async fn fetch_onchain(&self, wallet: &str, chain_id: u64, token_address: &str) -> anyhow::Result<Balance> {
        let token = self.fetch_token_metadata(chain_id, token_address).await?;
        let rpc = self.rpc_client(chain_id)?;

        let raw_balance: BigUint = if token_address == NATIVE_TOKEN_PLACEHOLDER {
            rpc.eth_get_balance(wallet).await?
        } else {
            let calldata = calldata::encode_balance_of(wallet)?;
            let result = rpc.eth_call(token_address, &calldata).await?;
            calldata::decode_uint256(&result)?
        };

        let formatted = format_units(&raw_balance, token.decimals);
        let balance_usd = token.price_usd.map(|price| formatted.parse::<f64>().unwrap_or(0.0) * price);

        Ok(Balance {
            token,
            balance: raw_balance.to_string(),
            formatted,
            balance_usd,
            has_balance: raw_balance > BigUint::from(0u32),
            is_stale: false,
        })
    }

    async fn fetch_token_metadata(&self, chain_id: u64, token_address: &str) -> anyhow::Result<Token> {
        if token_address == NATIVE_TOKEN_PLACEHOLDER {
            return Ok(Token {
                address: NATIVE_TOKEN_PLACEHOLDER.into(),
                symbol: "NATIVE".into(),
                name: "Native Gas Token".into(),
                decimals: 18,
                logo_url: String::new(),
                chain_id,
                price_usd: None,
            });
        }
        let chain_id_str = chain_id.to_string();
        let body = self
            .aggregator
            .get("/token", &[("chain", chain_id_str.as_str()), ("token", token_address)], Duration::from_secs(10))
            .await?;
        parse_token(&body, chain_id).ok_or_else(|| anyhow::anyhow!("malformed token metadata for {token_address} on chain {chain_id}"))
    }

    /// Fans out per-chain and per-token in parallel; a leaf failure never
    /// fails its siblings (spec.md §4.3).
    pub async fn get_balances(&self, wallet: &str, chains: &[u64], token_addresses: Option<&[String]>) -> BalancesResponse {
        let mut futures = Vec::new();
        for &chain_id in chains {
            let tokens: Vec<String> = token_addresses.map(|t| t.to_vec()).unwrap_or_else(|| vec![NATIVE_TOKEN_PLACEHOLDER.to_string()]);
            for token in tokens {
                futures.push(async move { (chain_id, self.get_balance(wallet, chain_id, &token).await) });
            }
        }

        let results = futures::future::join_all(futures).await;

        let mut balances: std::collections::HashMap<u64, Vec<Balance>> = std::collections::HashMap::new();
        let mut is_stale = false;
        let mut cached_at: Option<i64> = None;

        for (chain_id, result) in results {
            if let Ok(balance) = result {
                if balance.is_stale {
                    is_stale = true;
                }
                balances.entry(chain_id).or_default().push(balance);
            }
        }
        if is_stale {
            cached_at = Some(Utc::now().timestamp_millis());
        }

        BalancesResponse { balances, is_stale, cached_at }
    }

    pub async fn validate_balance(&self, quote: &Quote, wallet: &str) -> Result<BalanceValidation, BridgeError> {
        let token_balance = self.get_balance(wallet, quote.from_token.chain_id, &quote.from_token.address).await?;
        let native_balance = self.get_balance(wallet, quote.from_token.chain_id, NATIVE_TOKEN_PLACEHOLDER).await?;

        let required_token = BigUint::from_str(&quote.from_amount).unwrap_or_default();
        let have_token = BigUint::from_str(&token_balance.balance).unwrap_or_default();
        let required_gas = BigUint::from_str(&quote.fees.gas_estimate.gas_cost).unwrap_or_default();
        let have_gas = BigUint::from_str(&native_balance.balance).unwrap_or_default();

        let mut warnings = Vec::new();
        let token_sufficient = have_token >= required_token;
        if !token_sufficient {
            let shortfall = &required_token - &have_token;
            warnings.push(format!("short {shortfall} of {} (base units)", quote.from_token.symbol));
        }
        let gas_sufficient = have_gas >= required_gas;
        if !gas_sufficient {
            let shortfall = &required_gas - &have_gas;
            warnings.push(format!("short {shortfall} native gas (base units)"));
        }

        Ok(BalanceValidation { valid: token_sufficient && gas_sufficient, token_sufficient, gas_sufficient, warnings })
    }
}

fn format_units(raw: &BigUint, decimals: u32) -> String {
    let divisor = BigUint::from(10u32).pow(decimals);
    let whole = raw / &divisor;
    let remainder = raw % &divisor;
    if decimals == 0 {
        return whole.to_string();
    }
    let fractional = format!("{:0>width$}", remainder, width = decimals as usize);
    format!("{whole}.{fractional}").trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_units_handles_whole_and_fractional() {
        assert_eq!(format_units(&BigUint::from(1_000_000u64), 6), "1");
        assert_eq!(format_units(&BigUint::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(&BigUint::from(0u64), 6), "0");
    }

    #[tokio::test]
    async fn rejects_invalid_wallet_address() {
        let aggregator = Arc::new(AggregatorClient::new("http://localhost", "xbridge", None));
        let endpoints = Arc::new(RpcEndpoints::default());
        let service = BalanceService::new(aggregator, endpoints);
        let err = service.get_balance("not-an-address", 1, NATIVE_TOKEN_PLACEHOLDER).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAddress { .. }));
    }
}
