//! C7 — arrival detector, per spec.md §4.5.
//!
//! Snapshot-delta polling: take a balance reading before a transfer, then
//! poll until the destination-chain balance has moved by at least the
//! expected (tolerance-adjusted) amount. Grounded on the polling-loop
//! shape of `bridges/transaction_monitor.rs`'s monitoring loops
//! (`interval`/`sleep` + status check), applied to a balance read instead
//! of a transaction receipt.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use num_bigint::BigUint;
use tracing::{debug, warn};

use crate::balance::BalanceService;
use crate::constants::{
    ARRIVAL_POLL_INTERVAL_SECS, ARRIVAL_TIMEOUT_SECS, ARRIVAL_TOLERANCE_DEN, ARRIVAL_TOLERANCE_NUM,
    DESTINATION_CHAIN_ID, DESTINATION_USDC_ADDRESS,
};
use crate::error::BridgeError;

/// Polling cadence and wall-clock budget for [`ArrivalDetector::detect_arrival_from_snapshot`].
#[derive(Debug, Clone, Copy)]
pub struct ArrivalOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ArrivalOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(ARRIVAL_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(ARRIVAL_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrivalDetection {
    pub detected: bool,
    pub amount: String,
    pub amount_formatted: String,
    pub previous_balance: String,
    pub current_balance: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Minimum fraction of `expected_amount` that must have arrived, per
/// spec.md §4.5's 1% fee tolerance.
fn meets_tolerance(delta: &BigUint, expected_amount: &BigUint) -> bool {
    let threshold = (expected_amount * ARRIVAL_TOLERANCE_NUM) / ARRIVAL_TOLERANCE_DEN;
    *delta >= threshold
}

pub struct ArrivalDetector {
    balances: Arc<BalanceService>,
}

impl ArrivalDetector {
    pub fn new(balances: Arc<BalanceService>) -> Self {
        Self { balances }
    }

    /// Current destination-chain USDC balance for `wallet`.
    pub async fn snapshot_balance(&self, wallet: &str) -> Result<String, BridgeError> {
        let balance = self.balances.get_balance(wallet, DESTINATION_CHAIN_ID, DESTINATION_USDC_ADDRESS).await?;
        Ok(balance.balance)
    }

    /// Poll until `current - previous_balance` clears the tolerance
    /// threshold (or any positive delta, if `expected_amount` is `None`),
    /// per spec.md §4.5. Per-poll fetch failures are logged and do not
    /// abort the loop; only the overall timeout does.
    pub async fn detect_arrival_from_snapshot(
        &self,
        wallet: &str,
        previous_balance: &str,
        expected_amount: Option<&str>,
        options: ArrivalOptions,
    ) -> Result<ArrivalDetection, BridgeError> {
        let previous: BigUint = BigUint::from_str(previous_balance).unwrap_or_default();
        let expected: Option<BigUint> = expected_amount.map(|a| BigUint::from_str(a).unwrap_or_default());

        let deadline = tokio::time::Instant::now() + options.timeout;
        let mut last_observed = previous.clone();

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(BridgeError::ArrivalTimeout {
                    timeout_secs: options.timeout.as_secs(),
                    last_balance: last_observed.to_string(),
                });
            }

            match self.snapshot_balance(wallet).await {
                Ok(current_raw) => {
                    let current: BigUint = BigUint::from_str(&current_raw).unwrap_or_default();
                    last_observed = current.clone();
                    if current >= previous {
                        let delta = &current - &previous;
                        let arrived = match &expected {
                            Some(expected) => meets_tolerance(&delta, expected),
                            None => delta > BigUint::from(0u32),
                        };
                        if arrived {
                            let token_decimals = 6u32;
                            return Ok(ArrivalDetection {
                                detected: true,
                                amount: delta.to_string(),
                                amount_formatted: format_units(&delta, token_decimals),
                                previous_balance: previous.to_string(),
                                current_balance: current.to_string(),
                                timestamp: Utc::now(),
                            });
                        }
                    }
                    debug!(wallet, current = %current, "arrival not yet detected, continuing to poll");
                }
                Err(err) => {
                    warn!(wallet, error = %err, "arrival poll failed, retrying at next tick");
                }
            }

            tokio::time::sleep(options.poll_interval).await;
        }
    }
}

fn format_units(raw: &BigUint, decimals: u32) -> String {
    let divisor = BigUint::from(10u32).pow(decimals);
    let whole = raw / &divisor;
    let remainder = raw % &divisor;
    let fractional = format!("{:0>width$}", remainder, width = decimals as usize);
    format!("{whole}.{fractional}").trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_accepts_99_percent_of_expected() {
        let delta = BigUint::from(9_900_000u64);
        let expected = BigUint::from(10_000_000u64);
        assert!(meets_tolerance(&delta, &expected));
    }

    #[test]
    fn tolerance_rejects_below_threshold() {
        let delta = BigUint::from(9_000_000u64);
        let expected = BigUint::from(10_000_000u64);
        assert!(!meets_tolerance(&delta, &expected));
    }

    #[test]
    fn format_units_trims_trailing_zeros() {
        assert_eq!(format_units(&BigUint::from(9_900_000u64), 6), "9.9");
    }

    #[tokio::test]
    async fn scenario_s6_detects_arrival_within_tolerance() {
        // previousBalance=1_000_000, expectedAmount=10_000_000, delta observed = 9_900_000
        let previous = BigUint::from(1_000_000u64);
        let current = BigUint::from(10_900_000u64);
        let expected = BigUint::from(10_000_000u64);
        let delta = &current - &previous;
        assert_eq!(delta, BigUint::from(9_900_000u64));
        assert!(meets_tolerance(&delta, &expected));
    }
}
