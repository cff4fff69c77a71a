//! Core data model, per spec.md §3.
//!
//! Wire-format DTOs for the aggregator and info-endpoint responses live
//! next to the component that parses them (`quote::dto`, `l1_monitor::dto`)
//! and are never exposed here; everything in this module is the validated,
//! public domain type a caller actually sees.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DESTINATION_CHAIN_ID, MAX_SLIPPAGE, MIN_SLIPPAGE};
use crate::error::BridgeError;

/// A source or destination chain, as surfaced by the catalog (C4).
///
/// Modeled as a plain struct rather than a closed enum: spec.md covers
/// ~40 source chains plus the fixed destination, which a compile-time enum
/// the way the teacher's `ChainId` is built cannot express. See
/// DESIGN.md "Open Questions resolved".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: u64,
    pub key: String,
    pub name: String,
    pub logo_url: String,
    pub native_token: Token,
    pub is_evm: bool,
}

impl Chain {
    pub fn is_destination(&self) -> bool {
        self.id == DESTINATION_CHAIN_ID
    }
}

/// A token on a given chain. Addresses are canonicalized to lowercase hex
/// at ingress (see `common::validation::canonicalize_address`); two tokens
/// are equal iff `(chain_id, address)` match, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub logo_url: String,
    pub chain_id: u64,
    pub price_usd: Option<f64>,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

/// A caller's preferred optimization target for route discovery, sent
/// through to the aggregator and usable as a local secondary sort via
/// `Quote::sort_routes_by` (see SPEC_FULL.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePreference {
    Recommended,
    Fastest,
    Cheapest,
}

impl Default for RoutePreference {
    fn default() -> Self {
        RoutePreference::Recommended
    }
}

/// Inputs to [`crate::quote::QuoteEngine::get_quote`], per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteParams {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: String,
    pub to_token: String,
    /// Decimal string in the source token's smallest units.
    pub from_amount: String,
    pub from_address: String,
    pub to_address: Option<String>,
    pub slippage: f64,
    pub route_preference: RoutePreference,
}

impl QuoteParams {
    /// Field-level validation per spec.md §3. Chain resolution against the
    /// catalog happens separately in `QuoteEngine::get_quote` since it
    /// requires a network-backed lookup.
    pub fn validate_shape(&self) -> Result<(), BridgeError> {
        let amount: u128 = self.from_amount.parse().map_err(|_| BridgeError::InvalidQuoteParams {
            reason: format!("fromAmount '{}' is not a positive integer", self.from_amount),
        })?;
        if amount == 0 {
            return Err(BridgeError::InvalidQuoteParams { reason: "fromAmount must be positive".into() });
        }
        if !crate::common::validation::is_valid_address(&self.from_address) {
            return Err(BridgeError::InvalidAddress { address: self.from_address.clone() });
        }
        if let Some(to_address) = &self.to_address {
            if !crate::common::validation::is_valid_address(to_address) {
                return Err(BridgeError::InvalidAddress { address: to_address.clone() });
            }
        }
        if !(MIN_SLIPPAGE..=MAX_SLIPPAGE).contains(&self.slippage) {
            return Err(BridgeError::InvalidSlippage { value: self.slippage });
        }
        Ok(())
    }
}

/// One atomic leg of a route, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Approve,
    Swap,
    Bridge,
    Deposit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub tool: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Token,
    pub to_token: Token,
    pub from_amount: String,
    pub to_amount: String,
    pub estimated_time: u64,
    /// The address a caller must `approve` before this step can execute,
    /// when `from_token` is non-native. Populated by the step-transaction
    /// fetch in the orchestrator, not by the initial quote response.
    pub approval_address: Option<String>,
}

/// Per-step gas cost, rolled up into [`GasEstimate::step_breakdown`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepGasCost {
    pub step_id: String,
    pub gas_limit: String,
    pub gas_amount: String,
    pub gas_amount_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasEstimate {
    pub gas_limit: String,
    pub gas_price: String,
    pub gas_cost: String,
    pub gas_cost_usd: f64,
    pub native_token: Token,
    pub step_breakdown: Vec<StepGasCost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeComponent {
    pub name: String,
    pub amount: String,
    pub amount_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fees {
    pub total_usd: f64,
    pub gas_usd: f64,
    pub bridge_fee_usd: f64,
    pub protocol_fee_usd: f64,
    pub gas_estimate: GasEstimate,
    pub gas_fee: Option<FeeComponent>,
    pub bridge_fee: Option<FeeComponent>,
    pub protocol_fee: Option<FeeComponent>,
}

/// Price-impact severity bands, per spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactSeverity {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ImpactSeverity {
    pub fn classify(price_impact: f64) -> Self {
        let magnitude = price_impact.abs();
        if magnitude >= crate::constants::IMPACT_VERY_HIGH_THRESHOLD {
            ImpactSeverity::VeryHigh
        } else if magnitude >= crate::constants::IMPACT_HIGH_THRESHOLD {
            ImpactSeverity::High
        } else if magnitude >= crate::constants::IMPACT_MEDIUM_THRESHOLD {
            ImpactSeverity::Medium
        } else {
            ImpactSeverity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub steps: Vec<Step>,
    pub fees: Fees,
    pub estimated_time: u64,
    pub from_amount: String,
    pub to_amount: String,
    pub price_impact: f64,
    pub impact_severity: ImpactSeverity,
    pub high_impact: bool,
    pub expires_at: i64,
    pub from_token: Token,
    pub to_token: Token,
    pub includes_auto_deposit: bool,
    pub manual_deposit_required: bool,
    /// Not part of the caller-visible wire shape in most SDKs, but kept
    /// here so cache-staleness tests can assert ordering without reaching
    /// into the cache's internal clock (spec.md §8 invariant 1).
    pub cached_at: Option<i64>,
}

impl Quote {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Re-rank a set of routes locally by the given preference without a
    /// second aggregator round-trip. See SPEC_FULL.md §9.
    pub fn sort_routes_by(routes: &mut [Quote], preference: RoutePreference) {
        match preference {
            RoutePreference::Cheapest => {
                routes.sort_by(|a, b| a.fees.total_usd.partial_cmp(&b.fees.total_usd).unwrap_or(std::cmp::Ordering::Equal))
            }
            RoutePreference::Fastest => routes.sort_by_key(|r| r.estimated_time),
            RoutePreference::Recommended => {}
        }
    }
}

/// Execution status, per spec.md §3. `Completed`/`Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatusKind {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStatus {
    pub step_id: String,
    pub step: StepType,
    pub status: StepStatusKind,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Owned exclusively by the orchestrator (C11); all other components
/// receive read-only projections via [`crate::registry::ExecutionStatusResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: String,
    pub quote_id: String,
    pub status: ExecutionStatus,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub steps: Vec<StepStatus>,
    pub tx_hash: Option<String>,
    pub receiving_tx_hash: Option<String>,
    pub from_amount: String,
    pub to_amount: Option<String>,
    pub received_amount: Option<String>,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub progress: u8,
    pub estimated_time: u64,
    pub substatus: String,
    pub error: Option<BridgeError>,
    pub retry_count: u32,
    pub previous_errors: Vec<BridgeError>,
    pub failed_step_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A read-only key into a balance/quote cache. Kept here (rather than in
/// `balance.rs`/`quote.rs`) since both components and tests need it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BalanceKey {
    pub wallet: String,
    pub chain_id: u64,
    pub token: String,
}

impl BalanceKey {
    pub fn new(wallet: &str, chain_id: u64, token: &str) -> Self {
        Self { wallet: wallet.to_lowercase(), chain_id, token: token.to_lowercase() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteCacheKey {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub from_address: String,
    pub slippage_bps: u32,
}

impl QuoteCacheKey {
    pub fn from_params(params: &QuoteParams) -> Self {
        Self {
            from_chain_id: params.from_chain_id,
            to_chain_id: params.to_chain_id,
            from_token: params.from_token.to_lowercase(),
            to_token: params.to_token.to_lowercase(),
            from_amount: params.from_amount.clone(),
            from_address: params.from_address.to_lowercase(),
            slippage_bps: (params.slippage * 10_000.0).round() as u32,
        }
    }
}

/// A resolved balance, per spec.md §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub token: Token,
    pub balance: String,
    pub formatted: String,
    pub balance_usd: Option<f64>,
    pub has_balance: bool,
    pub is_stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesResponse {
    pub balances: HashMap<u64, Vec<Balance>>,
    pub is_stale: bool,
    pub cached_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceValidation {
    pub valid: bool,
    pub token_sufficient: bool,
    pub gas_sufficient: bool,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(chain_id: u64, address: &str) -> Token {
        Token {
            address: address.to_lowercase(),
            symbol: "USDC".into(),
            name: "USD Coin".into(),
            decimals: 6,
            logo_url: String::new(),
            chain_id,
            price_usd: Some(1.0),
        }
    }

    #[test]
    fn tokens_equal_iff_chain_and_address_match() {
        let a = token(1, "0xAbC0000000000000000000000000000000000F");
        let b = token(1, "0xabc0000000000000000000000000000000000f");
        assert_eq!(a.address, b.address.to_lowercase());
        assert_eq!(a, b);
        let c = token(137, "0xabc0000000000000000000000000000000000f");
        assert_ne!(a, c);
    }

    #[test]
    fn impact_severity_bands_match_spec_thresholds() {
        assert_eq!(ImpactSeverity::classify(0.0005), ImpactSeverity::Low);
        assert_eq!(ImpactSeverity::classify(0.006), ImpactSeverity::Medium);
        assert_eq!(ImpactSeverity::classify(0.02), ImpactSeverity::High);
        assert_eq!(ImpactSeverity::classify(0.05), ImpactSeverity::VeryHigh);
        assert_eq!(ImpactSeverity::classify(-0.02), ImpactSeverity::High);
    }

    #[test]
    fn execution_status_terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::InProgress.is_terminal());
    }

    #[test]
    fn quote_params_rejects_zero_amount() {
        let params = QuoteParams {
            from_chain_id: 1,
            to_chain_id: 999,
            from_token: "0x0".into(),
            to_token: "0x0".into(),
            from_amount: "0".into(),
            from_address: "0x0000000000000000000000000000000000000a".into(),
            to_address: None,
            slippage: 0.005,
            route_preference: RoutePreference::Recommended,
        };
        assert!(params.validate_shape().is_err());
    }

    #[test]
    fn quote_cache_key_is_case_insensitive() {
        let mut params = QuoteParams {
            from_chain_id: 1,
            to_chain_id: 999,
            from_token: "0xABC".into(),
            to_token: "0xDEF".into(),
            from_amount: "1000".into(),
            from_address: "0xAAA0000000000000000000000000000000000A".into(),
            to_address: None,
            slippage: 0.005,
            route_preference: RoutePreference::Recommended,
        };
        let key1 = QuoteCacheKey::from_params(&params);
        params.from_token = "0xabc".into();
        params.from_address = params.from_address.to_lowercase();
        let key2 = QuoteCacheKey::from_params(&params);
        assert_eq!(key1, key2);
    }
}
