//! C6 — quote engine, per spec.md §4.4 (the largest single component).
//!
//! Fetches, normalizes and caches quotes from the aggregator. Wire shapes
//! live in [`dto`] and never leak past [`map_quote`]; everything this
//! module hands back to a caller is the domain [`crate::types::Quote`].

pub mod dto;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use num_bigint::BigUint;
use serde_json::Value;
use tracing::warn;

use crate::aggregator::AggregatorClient;
use crate::cache::TtlCache;
use crate::catalog::ChainCatalog;
use crate::constants::{
    DEFAULT_SLIPPAGE, DESTINATION_CHAIN_ID, HIGH_IMPACT_THRESHOLD, IMPACT_HIGH_THRESHOLD, IMPACT_MEDIUM_THRESHOLD,
    IMPACT_VERY_HIGH_THRESHOLD, QUOTE_LIFETIME_MS,
};
use crate::error::BridgeError;
use crate::types::{
    Fees, FeeComponent, GasEstimate, ImpactSeverity, Quote, QuoteCacheKey, QuoteParams, Step, StepGasCost, StepType,
};

use dto::{IncludedStepDto, QuoteResponseDto, RoutesResponseDto};

const QUOTE_FETCH_TIMEOUT_SECS: u64 = 30;

pub struct QuoteEngine {
    aggregator: Arc<AggregatorClient>,
    chain_catalog: Arc<ChainCatalog>,
    cache: TtlCache<QuoteCacheKey, Quote>,
}

impl QuoteEngine {
    pub fn new(aggregator: Arc<AggregatorClient>, chain_catalog: Arc<ChainCatalog>) -> Self {
        Self { aggregator, chain_catalog, cache: TtlCache::new(Duration::from_secs(QUOTE_LIFETIME_MS as u64 / 1000)) }
    }

    fn normalize(params: &QuoteParams) -> QuoteParams {
        let mut normalized = params.clone();
        if normalized.to_chain_id == 0 {
            normalized.to_chain_id = DESTINATION_CHAIN_ID;
        }
        if normalized.slippage == 0.0 {
            normalized.slippage = DEFAULT_SLIPPAGE;
        }
        normalized
    }

    async fn validate_chains(&self, params: &QuoteParams) -> Result<(), BridgeError> {
        if params.to_chain_id != DESTINATION_CHAIN_ID {
            let chains = self.chain_catalog.get_chains().await?;
            if !chains.value.iter().any(|c| c.id == params.to_chain_id) {
                return Err(BridgeError::InvalidQuoteParams { reason: format!("unknown destination chain {}", params.to_chain_id) });
            }
        }
        let chains = self.chain_catalog.get_chains().await?;
        if !chains.value.iter().any(|c| c.id == params.from_chain_id) {
            return Err(BridgeError::InvalidQuoteParams { reason: format!("unknown source chain {}", params.from_chain_id) });
        }
        Ok(())
    }

    pub async fn get_quote(&self, params: &QuoteParams, auto_deposit: bool) -> Result<Quote, BridgeError> {
        params.validate_shape()?;
        self.validate_chains(params).await?;
        let normalized = Self::normalize(params);
        let key = QuoteCacheKey::from_params(&normalized);

        if let Some(quote) = self.cache.get(&key) {
            if !quote.is_expired_at(Utc::now().timestamp_millis()) {
                return Ok(quote);
            }
        }

        match self.fetch_quote(&normalized, auto_deposit).await {
            Ok(quote) => {
                self.cache.set(key, quote.clone());
                Ok(quote)
            }
            Err(err) => {
                if let Some(stale) = self.cache.get_stale(&key) {
                    if !stale.is_expired_at(Utc::now().timestamp_millis()) {
                        warn!(error = %err, "quote fetch failed, returning stale cache");
                        return Ok(stale);
                    }
                    self.cache.invalidate(Some(&key));
                }
                Err(classify_fetch_error(&err))
            }
        }
    }

    async fn fetch_quote(&self, params: &QuoteParams, auto_deposit: bool) -> anyhow::Result<Quote> {
        let slippage_pct = format!("{:.2}", params.slippage * 100.0);
        let from_amount = params.from_amount.clone();
        let from_chain = params.from_chain_id.to_string();
        let to_chain = params.to_chain_id.to_string();
        let mut query = vec![
            ("fromChain", from_chain.as_str()),
            ("toChain", to_chain.as_str()),
            ("fromToken", params.from_token.as_str()),
            ("toToken", params.to_token.as_str()),
            ("fromAmount", from_amount.as_str()),
            ("fromAddress", params.from_address.as_str()),
            ("slippage", slippage_pct.as_str()),
        ];
        if let Some(to_address) = &params.to_address {
            query.push(("toAddress", to_address.as_str()));
        }

        let body = self.aggregator.get("/quote", &query, Duration::from_secs(QUOTE_FETCH_TIMEOUT_SECS)).await?;
        let dto: QuoteResponseDto = serde_json::from_value(body)?;
        map_quote(dto, auto_deposit)
    }

    pub async fn get_quotes(&self, params: &QuoteParams, auto_deposit: bool) -> Result<Vec<Quote>, BridgeError> {
        params.validate_shape()?;
        self.validate_chains(params).await?;
        let normalized = Self::normalize(params);

        let slippage_pct = format!("{:.2}", normalized.slippage * 100.0);
        let body = serde_json::json!({
            "fromChainId": normalized.from_chain_id,
            "toChainId": normalized.to_chain_id,
            "fromTokenAddress": normalized.from_token,
            "toTokenAddress": normalized.to_token,
            "fromAmount": normalized.from_amount,
            "fromAddress": normalized.from_address,
            "options": { "slippage": slippage_pct },
        });

        let response = self
            .aggregator
            .post("/advanced/routes", body, Duration::from_secs(QUOTE_FETCH_TIMEOUT_SECS))
            .await
            .map_err(|err| classify_fetch_error(&err))?;

        let parsed: RoutesResponseDto = serde_json::from_value(response).map_err(|e| BridgeError::QuoteFetchFailed { message: e.to_string() })?;
        parsed
            .routes
            .into_iter()
            .map(|dto| map_quote(dto, auto_deposit).map_err(|e| BridgeError::QuoteFetchFailed { message: e.to_string() }))
            .collect()
    }

    pub fn reset(&self) {
        self.cache.invalidate(None);
    }
}

fn classify_fetch_error(err: &anyhow::Error) -> BridgeError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("404") || lower.contains("no available quotes") {
        return BridgeError::NoRouteFound { from_chain_id: 0, to_chain_id: 0 };
    }
    if lower.contains("error") && !lower.contains("invalid") {
        return BridgeError::NetworkError { message };
    }
    BridgeError::QuoteFetchFailed { message }
}

fn parse_step_type(raw: &str) -> StepType {
    match raw.to_lowercase().as_str() {
        "approve" => StepType::Approve,
        "swap" => StepType::Swap,
        "deposit" => StepType::Deposit,
        _ => StepType::Bridge,
    }
}

fn map_included_step(dto: IncludedStepDto) -> Option<Step> {
    let from_token = dto.action.from_token.into_domain()?;
    let to_token = dto.action.to_token.into_domain()?;
    Some(Step {
        id: dto.id,
        step_type: parse_step_type(&dto.step_type),
        tool: if dto.tool.is_empty() { dto.tool_details.map(|t| t.key).unwrap_or_default() } else { dto.tool },
        from_chain_id: dto.action.from_chain_id,
        to_chain_id: dto.action.to_chain_id,
        from_token,
        to_token,
        from_amount: dto.action.from_amount,
        to_amount: dto.estimate.to_amount,
        estimated_time: dto.estimate.execution_duration,
        approval_address: None,
    })
}

fn parse_usd(raw: &Option<String>) -> Option<f64> {
    raw.as_ref().and_then(|s| s.parse().ok())
}

pub(crate) fn map_quote(dto: QuoteResponseDto, auto_deposit: bool) -> anyhow::Result<Quote> {
    let from_token = dto.from_token.into_domain().ok_or_else(|| anyhow::anyhow!("malformed fromToken in quote response"))?;
    let to_token = dto.to_token.into_domain().ok_or_else(|| anyhow::anyhow!("malformed toToken in quote response"))?;

    let mut steps: Vec<Step> = dto.included_steps.into_iter().filter_map(map_included_step).collect();
    if steps.is_empty() {
        steps.push(Step {
            id: dto.id.clone(),
            step_type: if dto.tool.is_empty() { StepType::Bridge } else { parse_step_type(&dto.tool) },
            tool: dto.tool.clone(),
            from_chain_id: dto.from_chain_id,
            to_chain_id: dto.to_chain_id,
            from_token: from_token.clone(),
            to_token: to_token.clone(),
            from_amount: dto.from_amount.clone(),
            to_amount: dto.to_amount.clone(),
            estimated_time: dto.estimate.execution_duration,
            approval_address: dto.estimate.approval_address.clone(),
        });
    }
    if steps.is_empty() {
        anyhow::bail!("quote response produced zero steps");
    }

    let mut gas_limit_total = BigUint::from(0u32);
    let mut gas_amount_total = BigUint::from(0u32);
    let mut gas_usd_total = 0.0;
    let mut gas_price = "0".to_string();
    let mut native_token = from_token.clone();
    let mut step_breakdown = Vec::new();

    for (idx, gas_cost) in dto.estimate.gas_costs.iter().enumerate() {
        gas_limit_total += BigUint::from_str(&gas_cost.limit).unwrap_or_default();
        gas_amount_total += BigUint::from_str(&gas_cost.amount).unwrap_or_default();
        gas_usd_total += gas_cost.amount_usd.as_deref().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
        if gas_price == "0" {
            if let Some(price) = &gas_cost.price {
                gas_price = price.clone();
            }
        }
        if idx == 0 {
            if let Some(token) = gas_cost.token.into_domain_ref() {
                native_token = token;
            }
        }
        step_breakdown.push(StepGasCost {
            step_id: steps.get(idx).map(|s| s.id.clone()).unwrap_or_default(),
            gas_limit: gas_cost.limit.clone(),
            gas_amount: gas_cost.amount.clone(),
            gas_amount_usd: gas_cost.amount_usd.as_deref().and_then(|s| s.parse().ok()),
        });
    }

    let mut bridge_fee_usd = 0.0;
    let mut protocol_fee_usd = 0.0;
    let mut bridge_fee: Option<FeeComponent> = None;
    let mut protocol_fee: Option<FeeComponent> = None;
    for fee in &dto.estimate.fee_costs {
        if fee.included {
            continue;
        }
        let amount_usd = fee.amount_usd.as_deref().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
        let lower_name = fee.name.to_lowercase();
        let component = FeeComponent { name: fee.name.clone(), amount: fee.amount.clone(), amount_usd };
        if lower_name.contains("protocol") || lower_name.contains("lifi") {
            protocol_fee_usd += amount_usd;
            protocol_fee.get_or_insert(component);
        } else {
            bridge_fee_usd += amount_usd;
            bridge_fee.get_or_insert(component);
        }
    }

    let total_usd = gas_usd_total + bridge_fee_usd + protocol_fee_usd;

    let from_usd = parse_usd(&dto.estimate.from_amount_usd);
    let to_usd = parse_usd(&dto.estimate.to_amount_usd);
    let price_impact = match (from_usd, to_usd) {
        (Some(from), Some(to)) if from > 0.0 => (((from - to) / from) * 10_000.0).round() / 10_000.0,
        _ => 0.0,
    };
    let impact_severity = ImpactSeverity::classify(price_impact);
    let high_impact = price_impact.abs() >= HIGH_IMPACT_THRESHOLD;

    let estimated_time: u64 = steps.iter().map(|s| s.estimated_time).sum();
    let now_ms = Utc::now().timestamp_millis();

    let includes_auto_deposit = auto_deposit && dto.to_chain_id == DESTINATION_CHAIN_ID;
    let manual_deposit_required = !auto_deposit && dto.to_chain_id == DESTINATION_CHAIN_ID;

    Ok(Quote {
        id: dto.id,
        steps,
        fees: Fees {
            total_usd,
            gas_usd: gas_usd_total,
            bridge_fee_usd,
            protocol_fee_usd,
            gas_estimate: GasEstimate {
                gas_limit: gas_limit_total.to_string(),
                gas_price,
                gas_cost: gas_amount_total.to_string(),
                gas_cost_usd: gas_usd_total,
                native_token,
                step_breakdown,
            },
            gas_fee: None,
            bridge_fee,
            protocol_fee,
        },
        estimated_time,
        from_amount: dto.from_amount,
        to_amount: dto.to_amount,
        price_impact,
        impact_severity,
        high_impact,
        expires_at: now_ms + QUOTE_LIFETIME_MS,
        from_token,
        to_token,
        includes_auto_deposit,
        manual_deposit_required,
        cached_at: Some(now_ms),
    })
}

trait TokenDtoExt {
    fn into_domain_ref(&self) -> Option<crate::types::Token>;
}

impl TokenDtoExt for dto::TokenInfoDto {
    fn into_domain_ref(&self) -> Option<crate::types::Token> {
        if self.symbol.is_empty() {
            return None;
        }
        Some(crate::types::Token {
            address: self.address.to_lowercase(),
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            decimals: self.decimals,
            logo_url: String::new(),
            chain_id: self.chain_id,
            price_usd: self.price_usd.as_deref().and_then(|s| s.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_dto() -> QuoteResponseDto {
        serde_json::from_value(json!({
            "id": "quote-1",
            "fromChainId": 1,
            "toChainId": 999,
            "fromToken": {"address": "0xA0b86991c6218b36C1D19D4a2e9Eb0cE3606EB48", "symbol": "USDC", "decimals": 6, "chainId": 1},
            "toToken": {"address": "0xb88339cb7199b77e23db6e890353e22632ba630f", "symbol": "USDC", "decimals": 6, "chainId": 999},
            "fromAmount": "1000000000",
            "toAmount": "999500000",
            "estimate": {
                "fromAmount": "1000000000",
                "toAmount": "999500000",
                "executionDuration": 120,
                "fromAmountUsd": "1000",
                "toAmountUsd": "999.50",
                "gasCosts": [],
                "feeCosts": []
            }
        }))
        .unwrap()
    }

    #[test]
    fn maps_single_step_quote_matching_scenario_s1() {
        let quote = map_quote(sample_dto(), true).unwrap();
        assert_eq!(quote.steps.len(), 1);
        assert_eq!(quote.estimated_time, 120);
        assert!((quote.price_impact - 0.0005).abs() < 1e-9);
        assert_eq!(quote.impact_severity, ImpactSeverity::Low);
        assert!(!quote.high_impact);
        assert!(quote.includes_auto_deposit);
    }

    #[test]
    fn missing_usd_fields_default_price_impact_to_zero() {
        let mut dto = sample_dto();
        dto.estimate.from_amount_usd = None;
        dto.estimate.to_amount_usd = None;
        let quote = map_quote(dto, true).unwrap();
        assert_eq!(quote.price_impact, 0.0);
        assert_eq!(quote.impact_severity, ImpactSeverity::Low);
    }

    #[test]
    fn fee_decomposition_sums_to_total() {
        let quote = map_quote(sample_dto(), true).unwrap();
        let sum = quote.fees.gas_usd + quote.fees.bridge_fee_usd + quote.fees.protocol_fee_usd;
        assert!((quote.fees.total_usd - sum).abs() < 1e-9);
    }
}
