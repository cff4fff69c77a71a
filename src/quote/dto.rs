//! Aggregator wire shapes for `/quote` and `/advanced/routes`, private to
//! this module per SPEC_FULL.md §4.4. Every field read here is validated
//! before use; malformed entries are skipped rather than panicking, since
//! the aggregator is an opaque third party (spec.md §9).

use serde::Deserialize;

use crate::types::Token;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfoDto {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
    #[serde(default)]
    pub name: String,
    pub chain_id: u64,
    #[serde(default)]
    pub price_usd: Option<String>,
}

impl TokenInfoDto {
    pub fn into_domain(self) -> Option<Token> {
        if self.symbol.is_empty() {
            return None;
        }
        Some(Token {
            address: self.address.to_lowercase(),
            symbol: self.symbol,
            name: self.name,
            decimals: self.decimals,
            logo_url: String::new(),
            chain_id: self.chain_id,
            price_usd: self.price_usd.and_then(|s| s.parse().ok()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCostDto {
    pub name: String,
    pub amount: String,
    #[serde(default)]
    pub amount_usd: Option<String>,
    #[serde(default)]
    pub included: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasCostDto {
    pub estimate: String,
    pub limit: String,
    pub amount: String,
    #[serde(default)]
    pub amount_usd: Option<String>,
    pub token: TokenInfoDto,
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActionDto {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: TokenInfoDto,
    pub to_token: TokenInfoDto,
    pub from_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEstimateDto {
    pub to_amount: String,
    #[serde(default)]
    pub execution_duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDetailsDto {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedStepDto {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub action: StepActionDto,
    pub estimate: StepEstimateDto,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub tool_details: Option<ToolDetailsDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEstimateDto {
    pub from_amount: String,
    pub to_amount: String,
    #[serde(default)]
    pub execution_duration: u64,
    #[serde(default)]
    pub approval_address: Option<String>,
    #[serde(default)]
    pub from_amount_usd: Option<String>,
    #[serde(default)]
    pub to_amount_usd: Option<String>,
    #[serde(default)]
    pub fee_costs: Vec<FeeCostDto>,
    #[serde(default)]
    pub gas_costs: Vec<GasCostDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponseDto {
    pub id: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: TokenInfoDto,
    pub to_token: TokenInfoDto,
    pub from_amount: String,
    pub to_amount: String,
    pub estimate: RouteEstimateDto,
    #[serde(default)]
    pub included_steps: Vec<IncludedStepDto>,
    #[serde(default)]
    pub tool: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesResponseDto {
    #[serde(default)]
    pub routes: Vec<QuoteResponseDto>,
}
