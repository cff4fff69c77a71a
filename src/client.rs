//! Public client — composes C1–C11 into the single caller-facing object
//! spec.md §6 names. Grounded on `core/searcher_core.rs`'s role as the top-
//! level composition root in the teacher (one struct holding references to
//! every subsystem, constructed once from a config and handed out to
//! whatever drives the process).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::aggregator::AggregatorClient;
use crate::arrival::{ArrivalDetection, ArrivalDetector, ArrivalOptions};
use crate::balance::BalanceService;
use crate::catalog::{CatalogResult, ChainCatalog, TokenCatalog};
use crate::config::ClientConfig;
use crate::deposit::{DepositExecutor, DepositOptions, DepositResult};
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventBus};
use crate::l1_monitor::{L1ConfirmationResult, L1Monitor, L1MonitorController, L1MonitorOptions};
use crate::orchestrator::{invoke, ExecutionInput, ExecutionOrchestrator, ExecutionResult};
use crate::quote::QuoteEngine;
use crate::registry::{ExecutionRegistry, ExecutionStatusResult};
use crate::rpc::{RpcClient, RpcEndpoints};
use crate::signer::Signer;
use crate::types::{Balance, BalanceValidation, BalancesResponse, Chain, Quote, QuoteParams, Token};

/// Status of a single bridge transaction, as reported by the aggregator's
/// `/status` endpoint — the public counterpart of `getStatus(txHash)` in
/// spec.md §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub status: String,
    #[serde(default)]
    pub substatus: Option<String>,
    #[serde(default)]
    pub receiving_tx_hash: Option<String>,
    #[serde(default)]
    pub received_amount: Option<String>,
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
struct StatusResponseDto {
    status: String,
    #[serde(default)]
    substatus: Option<String>,
    #[serde(default)]
    receiving: Option<ReceivingDto>,
}

/// Handle returned by [`Client::on`]/[`Client::once`]; pass to
/// [`Client::off`] to stop the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The single caller-facing object spec.md §6 describes. Owns a private
/// set of caches and the execution registry — process-wide defaults exist
/// only for standalone function calls (SPEC_FULL.md §9); every `Client`
/// gets its own.
pub struct Client {
    config: ClientConfig,
    aggregator: Arc<AggregatorClient>,
    rpc_endpoints: Arc<RpcEndpoints>,
    chain_catalog: Arc<ChainCatalog>,
    token_catalog: Arc<TokenCatalog>,
    balances: Arc<BalanceService>,
    quotes: Arc<QuoteEngine>,
    arrival: Arc<ArrivalDetector>,
    deposits: Arc<DepositExecutor>,
    l1_monitor: Arc<L1Monitor>,
    registry: Arc<ExecutionRegistry>,
    orchestrator: Arc<ExecutionOrchestrator>,
    events: Arc<EventBus>,
    listeners: DashMap<u64, JoinHandle<()>>,
    next_listener_id: AtomicU64,
}

impl Client {
    /// Builds every collaborator from `config`, validating it first so a
    /// malformed config fails before any network call is attempted.
    pub fn new(config: ClientConfig) -> Result<Self, BridgeError> {
        config.validate()?;

        let aggregator = Arc::new(AggregatorClient::new(config.aggregator_base_url.clone(), config.integrator.clone(), config.lifi_api_key.clone()));
        let rpc_endpoints = Arc::new(RpcEndpoints::new(config.rpc_urls.clone()));
        let chain_catalog = Arc::new(ChainCatalog::new(aggregator.clone()));
        let token_catalog = Arc::new(TokenCatalog::new(aggregator.clone()));
        let balances = Arc::new(BalanceService::new(aggregator.clone(), rpc_endpoints.clone()));
        let quotes = Arc::new(QuoteEngine::new(aggregator.clone(), chain_catalog.clone()));
        let arrival = Arc::new(ArrivalDetector::new(balances.clone()));

        let destination_chain_id = config.destination_chain_id();
        let deposit_rpc = match rpc_endpoints.get(destination_chain_id) {
            Ok(endpoint) => Arc::new(RpcClient::new(endpoint)),
            Err(_) => Arc::new(RpcClient::new("")),
        };
        let deposits = Arc::new(DepositExecutor::new(deposit_rpc));

        let l1_monitor = Arc::new(L1Monitor::new(config.info_endpoint.clone()));
        let registry = Arc::new(ExecutionRegistry::new());
        let events = Arc::new(EventBus::new());
        let orchestrator = Arc::new(ExecutionOrchestrator::new(aggregator.clone(), registry.clone(), events.clone(), rpc_endpoints.clone()));

        Ok(Self {
            config,
            aggregator,
            rpc_endpoints,
            chain_catalog,
            token_catalog,
            balances,
            quotes,
            arrival,
            deposits,
            l1_monitor,
            registry,
            orchestrator,
            events,
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ---- C4: chain/token catalogs ----

    pub async fn get_chains(&self) -> Result<CatalogResult<Vec<Chain>>, BridgeError> {
        self.chain_catalog.get_chains().await
    }

    pub async fn get_tokens(&self, chain_id: u64) -> Result<CatalogResult<Vec<Token>>, BridgeError> {
        self.token_catalog.get_tokens(chain_id).await
    }

    pub async fn get_bridgeable_tokens(&self, source_chain_id: u64) -> Result<CatalogResult<Vec<Token>>, BridgeError> {
        self.token_catalog.get_bridgeable_tokens(source_chain_id).await
    }

    // ---- C5: balance service ----

    pub async fn get_balance(&self, wallet: &str, chain_id: u64, token_address: &str) -> Result<Balance, BridgeError> {
        self.balances.get_balance(wallet, chain_id, token_address).await
    }

    pub async fn get_balances(&self, wallet: &str, chains: &[u64], token_addresses: Option<&[String]>) -> BalancesResponse {
        self.balances.get_balances(wallet, chains, token_addresses).await
    }

    pub async fn validate_balance(&self, quote: &Quote, wallet: &str) -> Result<BalanceValidation, BridgeError> {
        self.balances.validate_balance(quote, wallet).await
    }

    // ---- C6: quote engine ----

    pub async fn get_quote(&self, params: &QuoteParams) -> Result<Quote, BridgeError> {
        self.quotes.get_quote(params, self.config.auto_deposit).await
    }

    pub async fn get_quotes(&self, params: &QuoteParams) -> Result<Vec<Quote>, BridgeError> {
        self.quotes.get_quotes(params, self.config.auto_deposit).await
    }

    // ---- C7: arrival detector ----

    pub async fn snapshot_usdc_balance(&self, wallet: &str) -> Result<String, BridgeError> {
        self.arrival.snapshot_balance(wallet).await
    }

    pub async fn detect_arrival(
        &self,
        wallet: &str,
        previous_balance: &str,
        expected_amount: Option<&str>,
        options: ArrivalOptions,
    ) -> Result<ArrivalDetection, BridgeError> {
        self.arrival.detect_arrival_from_snapshot(wallet, previous_balance, expected_amount, options).await
    }

    // ---- C8: deposit executor ----

    pub async fn validate_deposit_requirements(&self, wallet: &str, amount: &str) -> Result<crate::deposit::DepositRequirements, BridgeError> {
        self.deposits.validate_deposit_requirements(wallet, amount).await
    }

    pub async fn execute_deposit(&self, signer: &dyn Signer, amount: &str, options: DepositOptions) -> Result<DepositResult, BridgeError> {
        self.deposits.execute_deposit(signer, amount, options).await
    }

    pub async fn execute_deposit_for(&self, signer: &dyn Signer, recipient: &str, amount: &str, options: DepositOptions) -> Result<DepositResult, BridgeError> {
        self.deposits.execute_deposit_for(signer, recipient, amount, options).await
    }

    // ---- C9: L1 confirmation monitor ----

    pub fn wait_for_l1_confirmation(
        &self,
        wallet: String,
        expected_amount: String,
        hyper_evm_tx_hash: String,
        options: L1MonitorOptions,
        on_timeout_warning: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Result<(JoinHandle<Result<L1ConfirmationResult, BridgeError>>, L1MonitorController), BridgeError> {
        self.l1_monitor.clone().monitor_l1_confirmation(wallet, expected_amount, hyper_evm_tx_hash, options, on_timeout_warning)
    }

    // ---- C10/C11: execution orchestrator + registry ----

    pub async fn execute(&self, input: ExecutionInput) -> ExecutionResult {
        self.orchestrator.execute(input).await
    }

    pub fn get_execution_status(&self, execution_id: &str) -> ExecutionStatusResult {
        self.registry.get_status(execution_id)
    }

    /// Queries the aggregator's relay status for a bridge-leg transaction,
    /// per spec.md §6's `getStatus(txHash)`.
    pub async fn get_status(&self, tx_hash: &str, from_chain_id: u64, to_chain_id: u64) -> Result<BridgeStatus, BridgeError> {
        let from_chain = from_chain_id.to_string();
        let to_chain = to_chain_id.to_string();
        let query = vec![("txHash", tx_hash), ("fromChain", from_chain.as_str()), ("toChain", to_chain.as_str())];
        let body = self
            .aggregator
            .get("/status", &query, Duration::from_secs(15))
            .await
            .map_err(|e| BridgeError::NetworkError { message: e.to_string() })?;
        let dto: StatusResponseDto = serde_json::from_value(body).map_err(|e| BridgeError::NetworkError { message: format!("malformed status response: {e}") })?;
        Ok(BridgeStatus {
            status: dto.status,
            substatus: dto.substatus,
            receiving_tx_hash: dto.receiving.as_ref().and_then(|r| r.tx_hash.clone()),
            received_amount: dto.receiving.as_ref().and_then(|r| r.amount.clone()),
        })
    }

    // ---- C2: event subscription ----

    /// Subscribes `handler` to every future [`BridgeEvent`] until [`Client::off`]
    /// is called with the returned id. A panicking handler is caught and
    /// logged, never allowed to tear down the listener task, mirroring the
    /// orchestrator's own callback discipline (spec.md §4.9).
    pub fn on<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.spawn_listener(handler, false)
    }

    /// Like [`Client::on`], but the listener task exits after its first
    /// delivered event.
    pub fn once<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.spawn_listener(handler, true)
    }

    /// Stops a listener previously registered via [`Client::on`]/[`Client::once`].
    /// A no-op if `id` is unknown or already fired (for `once`).
    pub fn off(&self, id: ListenerId) {
        if let Some((_, handle)) = self.listeners.remove(&id.0) {
            handle.abort();
        }
    }

    fn spawn_listener<F>(&self, handler: F, once: bool) -> ListenerId
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut receiver = self.events.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        invoke(|| handler(&envelope.event));
                        if once {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
        self.listeners.insert(id, handle);
        ListenerId(id)
    }

    /// Resets every per-client cache and the execution registry. Intended
    /// for tests; production callers normally let TTLs expire naturally
    /// (SPEC_FULL.md §9's "tests get a reset capability").
    pub fn reset(&self) {
        self.chain_catalog.reset();
        self.token_catalog.reset();
        self.quotes.reset();
        self.registry.reset();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ClientConfig {
        let mut config = ClientConfig::new("xbridge-demo");
        config.rpc_urls = HashMap::from([(999u64, "http://localhost:9999".to_string())]);
        config
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = ClientConfig::new("");
        assert!(Client::new(config).is_err());
    }

    #[test]
    fn new_succeeds_with_valid_config() {
        let client = Client::new(sample_config()).unwrap();
        assert_eq!(client.config().integrator, "xbridge-demo");
    }

    #[tokio::test]
    async fn on_receives_published_events_until_off() {
        let client = Client::new(sample_config()).unwrap();
        let received = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let received_clone = received.clone();
        let id = client.on(move |_event| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });

        client.events.publish(BridgeEvent::QuoteUpdated { quote_id: "q1".into() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);

        client.off(id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.events.publish(BridgeEvent::QuoteUpdated { quote_id: "q2".into() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn once_fires_exactly_one_event() {
        let client = Client::new(sample_config()).unwrap();
        let received = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let received_clone = received.clone();
        client.once(move |_event| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });

        client.events.publish(BridgeEvent::QuoteUpdated { quote_id: "q1".into() });
        client.events.publish(BridgeEvent::QuoteUpdated { quote_id: "q2".into() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_registry() {
        let client = Client::new(sample_config()).unwrap();
        client.registry.create("exec-1", "quote-1", 1, "1000", 1, 999, 60);
        assert_eq!(client.registry.len(), 1);
        client.reset();
        assert!(client.registry.is_empty());
    }
}
