//! C9 — L1 (trading ledger) confirmation monitor, per spec.md §4.7.
//!
//! Polls the off-chain trading-ledger info endpoint until the observed
//! account value has moved by the expected (tolerance-adjusted) amount.
//! Soft timeout only warns and continues; hard timeout cancels with an
//! error. Grounded on `bridges/transaction_monitor.rs`'s `MonitorConfig`/
//! `TimeoutConfig` soft/hard shape, generalized to a cancellable
//! controller returned alongside the result future (spec.md §4.7).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use num_bigint::BigUint;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::constants::{ARRIVAL_TOLERANCE_DEN, ARRIVAL_TOLERANCE_NUM, L1_HARD_TIMEOUT_SECS, L1_POLL_INTERVAL_SECS, L1_SOFT_TIMEOUT_SECS};
use crate::common::validation::is_valid_address;
use crate::error::BridgeError;

#[derive(Debug, Deserialize)]
struct ClearinghouseStateDto {
    #[serde(rename = "marginSummary")]
    margin_summary: MarginSummaryDto,
}

#[derive(Debug, Deserialize)]
struct MarginSummaryDto {
    #[serde(rename = "accountValue")]
    account_value: String,
}

/// Converts a human-decimal account-value string (e.g. `"1234.56"`) into
/// smallest units (6 decimals), per spec.md §6.
fn parse_account_value(raw: &str) -> BigUint {
    let mut parts = raw.splitn(2, '.');
    let whole = parts.next().unwrap_or("0");
    let fraction = parts.next().unwrap_or("");
    let mut fraction = fraction.to_string();
    fraction.truncate(6);
    while fraction.len() < 6 {
        fraction.push('0');
    }
    let combined = format!("{whole}{fraction}");
    BigUint::from_str(&combined).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Monitoring,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct L1MonitorProgress {
    pub status: MonitorStatus,
    pub elapsed_secs: u64,
    /// Always `true` in the system this crate is modeled on; intended
    /// semantics are unclear (see DESIGN.md Open Questions). Preserved
    /// unchanged rather than invented.
    pub checking: bool,
}

#[derive(Debug, Clone)]
pub struct L1ConfirmationResult {
    pub confirmed: bool,
    pub amount: String,
    pub final_balance: String,
    pub hyper_evm_tx_hash: String,
    pub confirmation_time: chrono::DateTime<Utc>,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct L1MonitorOptions {
    pub poll_interval: Duration,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
}

impl Default for L1MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(L1_POLL_INTERVAL_SECS),
            soft_timeout: Duration::from_secs(L1_SOFT_TIMEOUT_SECS),
            hard_timeout: Duration::from_secs(L1_HARD_TIMEOUT_SECS),
        }
    }
}

enum ControlMessage {
    Cancel,
    ExtendTimeout(Duration),
}

/// Returned alongside the confirmation future; lets a caller cancel,
/// extend the soft-timeout budget, or poll status without owning the
/// future itself.
pub struct L1MonitorController {
    control: tokio::sync::mpsc::UnboundedSender<ControlMessage>,
    status: watch::Receiver<MonitorStatus>,
    started_at: std::time::Instant,
}

impl L1MonitorController {
    pub fn cancel(&self) {
        let _ = self.control.send(ControlMessage::Cancel);
    }

    pub fn extend_timeout(&self, additional: Duration) {
        let _ = self.control.send(ControlMessage::ExtendTimeout(additional));
    }

    pub fn get_status(&self) -> L1MonitorProgress {
        L1MonitorProgress {
            status: *self.status.borrow(),
            elapsed_secs: self.started_at.elapsed().as_secs(),
            checking: true,
        }
    }
}

pub struct L1Monitor {
    http: Client,
    info_endpoint: String,
}

impl L1Monitor {
    pub fn new(info_endpoint: impl Into<String>) -> Self {
        Self { http: Client::new(), info_endpoint: info_endpoint.into() }
    }

    async fn fetch_account_value(&self, wallet: &str) -> anyhow::Result<BigUint> {
        let response = self
            .http
            .post(format!("{}/info", self.info_endpoint))
            .json(&json!({ "type": "clearinghouseState", "user": wallet }))
            .timeout(Duration::from_secs(15))
            .send()
            .await?;
        let dto: ClearinghouseStateDto = response.json().await?;
        Ok(parse_account_value(&dto.margin_summary.account_value))
    }

    /// Starts monitoring and returns a future that resolves on
    /// confirmation or rejects on cancellation/hard-timeout, alongside a
    /// controller the caller can act on independently, per spec.md §4.7.
    ///
    /// `on_timeout_warning` fires exactly once per soft-timeout
    /// activation; `extend_timeout` re-arms it.
    pub fn monitor_l1_confirmation(
        self: Arc<Self>,
        wallet: String,
        expected_amount: String,
        hyper_evm_tx_hash: String,
        options: L1MonitorOptions,
        on_timeout_warning: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Result<(tokio::task::JoinHandle<Result<L1ConfirmationResult, BridgeError>>, L1MonitorController), BridgeError> {
        if !is_valid_address(&wallet) {
            return Err(BridgeError::InvalidAddress { address: wallet });
        }

        let (control_tx, mut control_rx) = tokio::sync::mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(MonitorStatus::Monitoring);
        let started_at = std::time::Instant::now();

        let handle = tokio::spawn(async move {
            let expected: BigUint = BigUint::from_str(&expected_amount).unwrap_or_default();
            let baseline = self.fetch_account_value(&wallet).await.map_err(|e| BridgeError::NetworkError { message: e.to_string() })?;

            let mut soft_deadline = started_at + options.soft_timeout;
            let hard_deadline = started_at + options.hard_timeout;
            let mut warning_fired = false;
            let mut last_seen = baseline.clone();

            loop {
                tokio::select! {
                    message = control_rx.recv() => {
                        match message {
                            Some(ControlMessage::Cancel) => {
                                let _ = status_tx.send(MonitorStatus::Cancelled);
                                return Err(BridgeError::L1MonitorCancelled { reason: "cancelled".into() });
                            }
                            Some(ControlMessage::ExtendTimeout(additional)) => {
                                soft_deadline = std::time::Instant::now() + additional;
                                warning_fired = false;
                            }
                            None => {}
                        }
                    }
                    _ = tokio::time::sleep(options.poll_interval) => {
                        if std::time::Instant::now() >= hard_deadline {
                            let _ = status_tx.send(MonitorStatus::Cancelled);
                            return Err(BridgeError::L1MonitorCancelled { reason: "max_timeout".into() });
                        }
                        if !warning_fired && std::time::Instant::now() >= soft_deadline {
                            warning_fired = true;
                            if let Some(cb) = &on_timeout_warning {
                                cb();
                            }
                            warn!(wallet = %wallet, "L1 confirmation soft timeout reached, continuing to poll");
                        }

                        match self.fetch_account_value(&wallet).await {
                            Ok(current) => {
                                if current < last_seen {
                                    info!(wallet = %wallet, "L1 account value decreased (trading activity), continuing");
                                }
                                last_seen = current.clone();
                                if current >= baseline {
                                    let delta = &current - &baseline;
                                    let threshold = (&expected * ARRIVAL_TOLERANCE_NUM) / ARRIVAL_TOLERANCE_DEN;
                                    if delta >= threshold {
                                        let _ = status_tx.send(MonitorStatus::Completed);
                                        return Ok(L1ConfirmationResult {
                                            confirmed: true,
                                            amount: delta.to_string(),
                                            final_balance: current.to_string(),
                                            hyper_evm_tx_hash: hyper_evm_tx_hash.clone(),
                                            confirmation_time: Utc::now(),
                                            timestamp: Utc::now(),
                                        });
                                    }
                                }
                            }
                            Err(err) => warn!(wallet = %wallet, error = %err, "L1 info endpoint poll failed, retrying"),
                        }
                    }
                }
            }
        });

        let controller = L1MonitorController { control: control_tx, status: status_rx, started_at };
        Ok((handle, controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_account_value_pads_short_fraction() {
        assert_eq!(parse_account_value("1234.56"), BigUint::from(1_234_560_000u64));
    }

    #[test]
    fn parse_account_value_truncates_long_fraction() {
        assert_eq!(parse_account_value("1.123456789"), BigUint::from(1_123_456u64));
    }

    #[test]
    fn parse_account_value_handles_whole_numbers() {
        assert_eq!(parse_account_value("500"), BigUint::from(500_000_000u64));
    }
}
