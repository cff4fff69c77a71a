//! C11 — execution orchestrator, per spec.md §4.9. The hardest part: a
//! single straight-line pipeline per execution that validates a quote,
//! drives approvals and step transactions, polls bridging status, and
//! funnels every failure into a typed, returned [`ExecutionResult`]
//! rather than a propagated error. Grounded on
//! `bridges/manager.rs::execute_bridge`'s timeout-wrapped dispatch and
//! `bridges/transaction_monitor.rs`'s full lifecycle state machine,
//! rewritten as the no-hidden-state coroutine spec.md §9 prescribes.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use num_bigint::BigUint;
use serde::Deserialize;
use tracing::warn;

use crate::aggregator::AggregatorClient;
use crate::calldata;
use crate::constants::{APPROVAL_MINE_WAIT_SECS, STEP_BRIDGE_POLL_INTERVAL_SECS, STEP_BRIDGE_TIMEOUT_SECS};
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventBus, TransactionKind};
use crate::registry::{ExecutionPatch, ExecutionRegistry};
use crate::rpc::{RpcClient, RpcEndpoints};
use crate::signer::{Signer, TransactionRequest};
use crate::types::{ExecutionStatus, Quote, Step, StepStatus, StepStatusKind, StepType};

/// Callbacks a caller can wire up to mirror a UI's prompts, per spec.md §4.9.
pub type ApprovalCallback = Arc<dyn Fn(usize, &str, &str) + Send + Sync>;
pub type TransactionCallback = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExecutionCallbacks {
    pub on_step_change: Option<Arc<dyn Fn(usize, StepType, StepStatusKind) + Send + Sync>>,
    pub on_status_change: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_approval_request: Option<ApprovalCallback>,
    pub on_transaction_request: Option<TransactionCallback>,
}

impl std::fmt::Debug for ExecutionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCallbacks").finish_non_exhaustive()
    }
}

pub(crate) fn invoke<F: Fn()>(f: F) {
    // Best-effort: listener exceptions (panics) are caught and logged,
    // never allowed to abort the pipeline, per spec.md §4.9.
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        let message = payload.downcast_ref::<&str>().map(|s| s.to_string()).unwrap_or_else(|| "non-string panic payload".into());
        warn!(panic = %message, "execution callback panicked, ignoring");
    }
}

pub struct ExecutionInput {
    pub quote: Quote,
    pub signer: Arc<dyn Signer>,
    pub infinite_approval: bool,
    pub callbacks: ExecutionCallbacks,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepStatus>,
    pub tx_hash: Option<String>,
    pub from_amount: String,
    pub to_amount: Option<String>,
    pub received_amount: Option<String>,
    pub deposit_tx_hash: Option<String>,
    pub error: Option<BridgeError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequestDto {
    to: String,
    data: String,
    #[serde(default = "zero_value")]
    value: String,
}

fn zero_value() -> String {
    "0".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepEstimateDto {
    #[serde(default)]
    approval_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepTransactionDto {
    transaction_request: TransactionRequestDto,
    #[serde(default)]
    estimate: Option<StepEstimateDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivingDto {
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeStatusDto {
    status: String,
    #[serde(default)]
    substatus: Option<String>,
    #[serde(default)]
    receiving: Option<ReceivingDto>,
}

/// `progress = round(currentStepIndex/totalSteps*100 + stepProgress/totalSteps*100)`,
/// clamped to 100, per spec.md §4.9.
fn compute_progress(current_step_index: usize, total_steps: usize, step_progress: f64) -> u8 {
    if total_steps == 0 {
        return 100;
    }
    let raw = (current_step_index as f64 / total_steps as f64) * 100.0 + (step_progress / total_steps as f64) * 100.0;
    raw.round().clamp(0.0, 100.0) as u8
}

pub struct ExecutionOrchestrator {
    aggregator: Arc<AggregatorClient>,
    registry: Arc<ExecutionRegistry>,
    events: Arc<EventBus>,
    rpc_endpoints: Arc<RpcEndpoints>,
    rpc_clients: DashMap<u64, Arc<RpcClient>>,
}

impl ExecutionOrchestrator {
    pub fn new(aggregator: Arc<AggregatorClient>, registry: Arc<ExecutionRegistry>, events: Arc<EventBus>, rpc_endpoints: Arc<RpcEndpoints>) -> Self {
        Self { aggregator, registry, events, rpc_endpoints, rpc_clients: DashMap::new() }
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

    fn set_overall_status(&self, execution_id: &str, substatus: &str, callbacks: &ExecutionCallbacks) {
        self.registry.update(execution_id, ExecutionPatch { substatus: Some(substatus.to_string()), ..Default::default() });
        self.events.publish(BridgeEvent::StatusChanged { execution_id: execution_id.to_string(), status: substatus.to_string() });
        if let Some(cb) = &callbacks.on_status_change {
            invoke(|| cb(substatus));
        }
    }

    /// Drives `quote` through approval(s), steps, and bridging
    /// confirmation. Never propagates an error: every failure is
    /// normalized, recorded on the registry, and returned inline on
    /// [`ExecutionResult`], per spec.md §4.9's error funnel.
    pub async fn execute(&self, input: ExecutionInput) -> ExecutionResult {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let ExecutionInput { quote, signer, infinite_approval, callbacks } = input;

        if let Err(err) = validate_quote(&quote) {
            return ExecutionResult {
                execution_id,
                status: ExecutionStatus::Failed,
                steps: Vec::new(),
                tx_hash: None,
                from_amount: quote.from_amount,
                to_amount: None,
                received_amount: None,
                deposit_tx_hash: None,
                error: Some(err),
            };
        }

        self.registry.create(&execution_id, &quote.id, quote.steps.len(), &quote.from_amount, quote.from_token.chain_id, quote.to_token.chain_id, quote.estimated_time);
        self.events.publish(BridgeEvent::ExecutionStarted { execution_id: execution_id.clone(), quote_id: quote.id.clone(), total_steps: quote.steps.len() });

        match self.run_pipeline(&execution_id, &quote, signer.as_ref(), infinite_approval, &callbacks).await {
            Ok((tx_hash, received_amount)) => {
                self.registry.update(
                    &execution_id,
                    ExecutionPatch { status: Some(ExecutionStatus::Completed), progress: Some(100), tx_hash: tx_hash.clone(), received_amount: received_amount.clone(), ..Default::default() },
                );
                self.events.publish(BridgeEvent::ExecutionCompleted { execution_id: execution_id.clone(), tx_hash: tx_hash.clone(), received_amount: received_amount.clone() });
                let steps = self.registry.get(&execution_id).map(|s| s.steps).unwrap_or_default();
                ExecutionResult {
                    execution_id,
                    status: ExecutionStatus::Completed,
                    steps,
                    tx_hash,
                    from_amount: quote.from_amount,
                    to_amount: Some(quote.to_amount),
                    received_amount,
                    deposit_tx_hash: None,
                    error: None,
                }
            }
            Err((failed_index, err)) => {
                self.fail_remaining_steps(&execution_id, &quote, failed_index);
                self.registry.update(
                    &execution_id,
                    ExecutionPatch { status: Some(ExecutionStatus::Failed), error: Some(err.clone()), failed_step_index: Some(failed_index), ..Default::default() },
                );
                self.events.publish(BridgeEvent::ExecutionFailed { execution_id: execution_id.clone(), error_code: err.code().to_string(), message: err.to_string() });
                let steps = self.registry.get(&execution_id).map(|s| s.steps).unwrap_or_default();
                ExecutionResult {
                    execution_id,
                    status: ExecutionStatus::Failed,
                    steps,
                    tx_hash: None,
                    from_amount: quote.from_amount,
                    to_amount: None,
                    received_amount: None,
                    deposit_tx_hash: None,
                    error: Some(err),
                }
            }
        }
    }

    fn fail_remaining_steps(&self, execution_id: &str, quote: &Quote, from_index: usize) {
        for (index, step) in quote.steps.iter().enumerate() {
            if index < from_index || step.step_type == StepType::Deposit {
                continue;
            }
            self.registry.update_step(
                execution_id,
                StepStatus { step_id: step.id.clone(), step: step.step_type, status: StepStatusKind::Failed, tx_hash: None, error: None, timestamp: Utc::now() },
            );
        }
    }

    /// Returns `(tx_hash_of_last_step, received_amount)` on success, or
    /// `(failed_step_index, error)` on the first failure.
    async fn run_pipeline(
        &self,
        execution_id: &str,
        quote: &Quote,
        signer: &dyn Signer,
        infinite_approval: bool,
        callbacks: &ExecutionCallbacks,
    ) -> Result<(Option<String>, Option<String>), (usize, BridgeError)> {
        let total_steps = quote.steps.len();
        let mut last_tx_hash = None;
        let mut received_amount = None;

        for (index, step) in quote.steps.iter().enumerate() {
            if step.step_type == StepType::Deposit {
                continue;
            }

            self.mark_step(execution_id, step, StepStatusKind::Active, None, None);
            self.events.publish(BridgeEvent::StepChanged { execution_id: execution_id.to_string(), step_index: index, step_type: step.step_type, status: "active".into() });
            if let Some(cb) = &callbacks.on_step_change {
                invoke(|| cb(index, step.step_type, StepStatusKind::Active));
            }
            self.registry.update(execution_id, ExecutionPatch { current_step_index: Some(index), progress: Some(compute_progress(index, total_steps, 0.5)), ..Default::default() });

            let step_tx = self.fetch_step_transaction(step).await.map_err(|e| (index, e))?;

            if !is_native(&step.from_token.address) {
                if let Some(approval_address) = &step_tx.1 {
                    let allowance = self.read_allowance(step, approval_address).await.map_err(|e| (index, e))?;
                    let required: BigUint = BigUint::from_str(&step.from_amount).unwrap_or_default();
                    if allowance < required {
                        self.set_overall_status(execution_id, "approving", callbacks);
                        self.events.publish(BridgeEvent::ApprovalRequired { execution_id: execution_id.to_string(), step_index: index, token: step.from_token.address.clone(), spender: approval_address.clone() });
                        if let Some(cb) = &callbacks.on_approval_request {
                            invoke(|| cb(index, &step.from_token.address, approval_address));
                        }
                        self.send_approval(execution_id, step, approval_address, infinite_approval, signer).await.map_err(|e| (index, e))?;
                        self.set_overall_status(execution_id, "approved", callbacks);
                    }
                }
            }

            self.set_overall_status(execution_id, "executing", callbacks);
            if let Some(cb) = &callbacks.on_transaction_request {
                invoke(|| cb(index));
            }

            let request = TransactionRequest { chain_id: step.from_chain_id, to: step_tx.0.to.clone(), data: step_tx.0.data.clone(), value: step_tx.0.value.clone(), gas_limit: None, gas_price: None };
            let tx_hash = signer.send_transaction(request).await.map_err(|e| (index, BridgeError::normalize(&e)))?;
            self.events.publish(BridgeEvent::TransactionSent { execution_id: execution_id.to_string(), step_index: index, kind: TransactionKind::Step, tx_hash: tx_hash.clone() });
            self.registry.update(execution_id, ExecutionPatch { tx_hash: Some(tx_hash.clone()), ..Default::default() });

            self.set_overall_status(execution_id, "bridging", callbacks);
            let (receiving_tx, step_received_amount) = self.poll_bridge_status(&tx_hash, step).await.map_err(|e| (index, e))?;
            if let Some(receiving_tx) = &receiving_tx {
                self.registry.update(execution_id, ExecutionPatch { receiving_tx_hash: Some(receiving_tx.clone()), ..Default::default() });
            }
            self.events.publish(BridgeEvent::TransactionConfirmed { execution_id: execution_id.to_string(), step_index: index, kind: TransactionKind::Step, tx_hash: tx_hash.clone() });

            self.mark_step(execution_id, step, StepStatusKind::Completed, Some(tx_hash.clone()), None);
            self.events.publish(BridgeEvent::StepChanged { execution_id: execution_id.to_string(), step_index: index, step_type: step.step_type, status: "completed".into() });
            self.registry.update(execution_id, ExecutionPatch { progress: Some(compute_progress(index, total_steps, 1.0)), ..Default::default() });

            last_tx_hash = Some(tx_hash);
            if step_received_amount.is_some() {
                received_amount = step_received_amount;
            }
        }

        self.set_overall_status(execution_id, "completed", callbacks);
        Ok((last_tx_hash, received_amount))
    }

    fn mark_step(&self, execution_id: &str, step: &Step, status: StepStatusKind, tx_hash: Option<String>, error: Option<String>) {
        self.registry.update_step(execution_id, StepStatus { step_id: step.id.clone(), step: step.step_type, status, tx_hash, error, timestamp: Utc::now() });
    }

    /// Re-quotes the single step leg to obtain its transaction calldata
    /// and approval spender, per spec.md §4.9 ("fetch step transaction
    /// details ... including any approvalAddress").
    async fn fetch_step_transaction(&self, step: &Step) -> Result<(TransactionRequestDto, Option<String>), BridgeError> {
        let from_chain = step.from_chain_id.to_string();
        let to_chain = step.to_chain_id.to_string();
        let query = vec![
            ("fromChain", from_chain.as_str()),
            ("toChain", to_chain.as_str()),
            ("fromToken", step.from_token.address.as_str()),
            ("toToken", step.to_token.address.as_str()),
            ("fromAmount", step.from_amount.as_str()),
        ];
        let body = self
            .aggregator
            .get("/quote", &query, Duration::from_secs(30))
            .await
            .map_err(|e| BridgeError::TransactionFailed { reason: format!("failed to fetch step transaction: {e}"), tx_hash: None })?;
        let dto: StepTransactionDto = serde_json::from_value(body).map_err(|e| BridgeError::TransactionFailed { reason: format!("malformed step transaction response: {e}"), tx_hash: None })?;
        let approval_address = dto.estimate.and_then(|e| e.approval_address).or_else(|| step.approval_address.clone());
        Ok((dto.transaction_request, approval_address))
    }

    async fn read_allowance(&self, step: &Step, spender: &str) -> Result<BigUint, BridgeError> {
        let rpc = self.rpc_client(step.from_chain_id).map_err(|e| BridgeError::NetworkError { message: e.to_string() })?;
        let data = calldata::encode_allowance(&step.from_token.address, spender).map_err(|e| BridgeError::InvalidAddress { address: e.to_string() })?;
        let raw = rpc.eth_call(&step.from_token.address, &data).await.map_err(|e| BridgeError::NetworkError { message: e.to_string() })?;
        calldata::decode_uint256(&raw).map_err(|e| BridgeError::NetworkError { message: e.to_string() })
    }

    async fn send_approval(&self, execution_id: &str, step: &Step, spender: &str, infinite: bool, signer: &dyn Signer) -> Result<(), BridgeError> {
        let data = calldata::encode_approve(spender, if infinite { None } else { Some(&step.from_amount) }).map_err(|e| BridgeError::InvalidAddress { address: e.to_string() })?;
        let request = TransactionRequest { chain_id: step.from_chain_id, to: step.from_token.address.clone(), data, value: "0".to_string(), gas_limit: None, gas_price: None };
        let tx_hash = signer.send_transaction(request).await.map_err(|e| BridgeError::normalize(&e))?;
        self.events.publish(BridgeEvent::TransactionSent { execution_id: execution_id.to_string(), step_index: 0, kind: TransactionKind::Approval, tx_hash: tx_hash.clone() });
        tokio::time::sleep(Duration::from_secs(APPROVAL_MINE_WAIT_SECS)).await;
        self.events.publish(BridgeEvent::TransactionConfirmed { execution_id: execution_id.to_string(), step_index: 0, kind: TransactionKind::Approval, tx_hash });
        Ok(())
    }

    /// Polls aggregator `/status` at a fixed cadence until the step's
    /// bridge leg reports `DONE`/`FAILED`, or the wall-clock cap elapses,
    /// per spec.md §4.9. Transient network errors during polling are
    /// retried silently at the same cadence.
    async fn poll_bridge_status(&self, tx_hash: &str, step: &Step) -> Result<(Option<String>, Option<String>), BridgeError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(STEP_BRIDGE_TIMEOUT_SECS);
        let from_chain = step.from_chain_id.to_string();
        let to_chain = step.to_chain_id.to_string();

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(BridgeError::TransactionFailed { reason: "timeout".into(), tx_hash: Some(tx_hash.to_string()) });
            }

            let query = vec![("txHash", tx_hash), ("fromChain", from_chain.as_str()), ("toChain", to_chain.as_str())];
            match self.aggregator.get("/status", &query, Duration::from_secs(15)).await {
                Ok(body) => match serde_json::from_value::<BridgeStatusDto>(body) {
                    Ok(status) => {
                        let receiving_tx = status.receiving.as_ref().and_then(|r| r.tx_hash.clone());
                        let received_amount = status.receiving.as_ref().and_then(|r| r.amount.clone());
                        match status.status.as_str() {
                            "DONE" => return Ok((receiving_tx, received_amount)),
                            "FAILED" => {
                                return Err(BridgeError::TransactionFailed {
                                    reason: status.substatus.unwrap_or_else(|| "FAILED".to_string()),
                                    tx_hash: Some(tx_hash.to_string()),
                                })
                            }
                            _ => {}
                        }
                    }
                    Err(err) => warn!(tx_hash, error = %err, "malformed bridge status response, retrying"),
                },
                Err(err) => warn!(tx_hash, error = %err, "bridge status poll failed, retrying"),
            }

            tokio::time::sleep(Duration::from_secs(STEP_BRIDGE_POLL_INTERVAL_SECS)).await;
        }
    }
}

fn is_native(address: &str) -> bool {
    address == crate::constants::NATIVE_TOKEN_PLACEHOLDER
}

fn validate_quote(quote: &Quote) -> Result<(), BridgeError> {
    if quote.steps.is_empty() {
        return Err(BridgeError::InvalidQuote { reason: "quote has zero steps".into() });
    }
    let now_ms = Utc::now().timestamp_millis();
    if quote.is_expired_at(now_ms) {
        return Err(BridgeError::QuoteExpired { expires_at: quote.expires_at });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_zero_at_start_of_first_step() {
        assert_eq!(compute_progress(0, 2, 0.5), 25);
    }

    #[test]
    fn progress_reaches_100_after_last_step_completes() {
        assert_eq!(compute_progress(1, 2, 1.0), 100);
    }

    #[test]
    fn progress_clamped_to_100() {
        assert_eq!(compute_progress(3, 2, 1.0), 100);
    }

    #[test]
    fn validate_quote_rejects_empty_steps() {
        let quote = Quote {
            id: "q".into(),
            steps: vec![],
            fees: crate::types::Fees {
                total_usd: 0.0,
                gas_usd: 0.0,
                bridge_fee_usd: 0.0,
                protocol_fee_usd: 0.0,
                gas_estimate: crate::types::GasEstimate {
                    gas_limit: "0".into(),
                    gas_price: "0".into(),
                    gas_cost: "0".into(),
                    gas_cost_usd: 0.0,
                    native_token: sample_token(),
                    step_breakdown: vec![],
                },
                gas_fee: None,
                bridge_fee: None,
                protocol_fee: None,
            },
            estimated_time: 0,
            from_amount: "0".into(),
            to_amount: "0".into(),
            price_impact: 0.0,
            impact_severity: crate::types::ImpactSeverity::Low,
            high_impact: false,
            expires_at: Utc::now().timestamp_millis() + 60_000,
            from_token: sample_token(),
            to_token: sample_token(),
            includes_auto_deposit: false,
            manual_deposit_required: false,
            cached_at: None,
        };
        assert!(matches!(validate_quote(&quote), Err(BridgeError::InvalidQuote { .. })));
    }

    fn sample_token() -> crate::types::Token {
        crate::types::Token { address: "0x0".into(), symbol: "USDC".into(), name: "USD Coin".into(), decimals: 6, logo_url: String::new(), chain_id: 1, price_usd: Some(1.0) }
    }
}
