//! C1 — error taxonomy & result model.
//!
//! A closed sum type covering every failure mode this crate surfaces.
//! Every variant carries enough structure to answer three questions a
//! caller (or a UI built on top of one) always needs answered: what went
//! wrong, can it be retried, and what should the user do next.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a caller should do in response to a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    AddFunds,
    IncreaseSlippage,
    TryDifferentAmount,
    TryAgain,
    FetchNewQuote,
    ContactSupport,
    SwitchNetwork,
    CheckAllowance,
    AdjustSlippage,
}

/// The closed error sum type for the whole crate.
///
/// Pattern-match on this instead of `instanceof`-style checks; every
/// variant implements [`BridgeError::recoverable`], [`BridgeError::user_message`]
/// and [`BridgeError::recovery_action`] through the inherent methods below.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "details")]
pub enum BridgeError {
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: String, required: String, token: String },

    #[error("insufficient gas: have {available}, need {required}")]
    InsufficientGas { available: String, required: String },

    #[error("no route found from chain {from_chain_id} to chain {to_chain_id}")]
    NoRouteFound { from_chain_id: u64, to_chain_id: u64 },

    #[error("slippage exceeded: expected at most {expected_pct}%, observed {observed_pct}%")]
    SlippageExceeded { expected_pct: f64, observed_pct: f64 },

    #[error("invalid slippage {value}: must be within [0.0001, 0.05]")]
    InvalidSlippage { value: f64 },

    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String, tx_hash: Option<String> },

    #[error("user rejected the transaction")]
    UserRejected,

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("deposit transaction failed: {reason}")]
    DepositTransactionFailed { reason: String, tx_hash: Option<String> },

    #[error("minimum deposit not met: have {amount}, minimum is {minimum}")]
    MinimumDeposit { amount: String, minimum: String },

    #[error("invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("quote expired at {expires_at}")]
    QuoteExpired { expires_at: i64 },

    #[error("invalid quote: {reason}")]
    InvalidQuote { reason: String },

    #[error("invalid quote params: {reason}")]
    InvalidQuoteParams { reason: String },

    #[error("failed to fetch quote: {message}")]
    QuoteFetchFailed { message: String },

    #[error("failed to fetch chains: {message}")]
    ChainFetchFailed { message: String },

    #[error("failed to fetch tokens for chain {chain_id}: {message}")]
    TokenFetchFailed { chain_id: u64, message: String },

    #[error("failed to fetch balance: {message}")]
    BalanceFetchFailed { message: String },

    #[error("arrival detection timed out after {timeout_secs}s, last observed balance {last_balance}")]
    ArrivalTimeout { timeout_secs: u64, last_balance: String },

    #[error("L1 confirmation monitor cancelled: {reason}")]
    L1MonitorCancelled { reason: String },

    #[error("max retries exceeded ({attempts} attempts)")]
    MaxRetriesExceeded { attempts: u32 },
}

impl BridgeError {
    /// Whether an automatic retry is likely to succeed.
    pub fn recoverable(&self) -> bool {
        use BridgeError::*;
        match self {
            UserRejected => false,
            InsufficientBalance { .. } | InsufficientGas { .. } => false,
            TransactionFailed { reason, .. } | DepositTransactionFailed { reason, .. } => {
                !is_non_recoverable_message(reason)
            }
            InvalidAddress { .. }
            | InvalidQuote { .. }
            | InvalidQuoteParams { .. }
            | InvalidSlippage { .. }
            | MinimumDeposit { .. } => false,
            MaxRetriesExceeded { .. } => false,
            _ => true,
        }
    }

    /// A short, user-facing message distinct from the technical `Display` text.
    pub fn user_message(&self) -> String {
        use BridgeError::*;
        match self {
            InsufficientBalance { token, .. } => format!("You don't have enough {token} to complete this transfer."),
            InsufficientGas { .. } => "You don't have enough gas to complete this transaction.".into(),
            NoRouteFound { .. } => "No route is currently available for this transfer.".into(),
            SlippageExceeded { .. } => "Price moved more than your slippage tolerance allows.".into(),
            InvalidSlippage { .. } => "Slippage must be between 0.01% and 5%.".into(),
            TransactionFailed { .. } => "The transaction failed on-chain.".into(),
            UserRejected => "Transaction was rejected in your wallet.".into(),
            NetworkError { .. } => "A network error occurred. Please try again.".into(),
            DepositTransactionFailed { .. } => "The deposit transaction failed on-chain.".into(),
            MinimumDeposit { minimum, .. } => format!("Deposits below {minimum} are not supported."),
            InvalidAddress { .. } => "One of the provided addresses is invalid.".into(),
            QuoteExpired { .. } => "Your quote has expired. Please fetch a new one.".into(),
            InvalidQuote { .. } => "This quote is no longer valid.".into(),
            InvalidQuoteParams { .. } => "The transfer parameters are invalid.".into(),
            QuoteFetchFailed { .. } => "We couldn't fetch a quote right now.".into(),
            ChainFetchFailed { .. } => "We couldn't load the list of supported chains.".into(),
            TokenFetchFailed { .. } => "We couldn't load the list of supported tokens.".into(),
            BalanceFetchFailed { .. } => "We couldn't load your balance right now.".into(),
            ArrivalTimeout { .. } => "We haven't detected your funds arriving yet.".into(),
            L1MonitorCancelled { reason } if reason == "max_timeout" => {
                "Confirmation is taking longer than expected. Check your account directly.".into()
            }
            L1MonitorCancelled { .. } => "Confirmation monitoring was cancelled.".into(),
            MaxRetriesExceeded { .. } => "We've retried this several times without success.".into(),
        }
    }

    /// The recommended next step for the caller/UI.
    pub fn recovery_action(&self) -> RecoveryAction {
        use BridgeError::*;
        match self {
            InsufficientBalance { .. } | InsufficientGas { .. } | MinimumDeposit { .. } => RecoveryAction::AddFunds,
            NoRouteFound { .. } => RecoveryAction::TryDifferentAmount,
            SlippageExceeded { .. } | InvalidSlippage { .. } => RecoveryAction::AdjustSlippage,
            TransactionFailed { .. } | DepositTransactionFailed { .. } => RecoveryAction::Retry,
            UserRejected => RecoveryAction::TryAgain,
            NetworkError { .. } | BalanceFetchFailed { .. } | ChainFetchFailed { .. } | TokenFetchFailed { .. } => {
                RecoveryAction::Retry
            }
            InvalidAddress { .. } | InvalidQuoteParams { .. } | InvalidQuote { .. } => RecoveryAction::ContactSupport,
            QuoteExpired { .. } | QuoteFetchFailed { .. } => RecoveryAction::FetchNewQuote,
            ArrivalTimeout { .. } => RecoveryAction::CheckAllowance,
            L1MonitorCancelled { .. } => RecoveryAction::ContactSupport,
            MaxRetriesExceeded { .. } => RecoveryAction::ContactSupport,
        }
    }

    /// Machine-readable error code (the enum's variant name), stable across versions.
    pub fn code(&self) -> &'static str {
        use BridgeError::*;
        match self {
            InsufficientBalance { .. } => "InsufficientBalance",
            InsufficientGas { .. } => "InsufficientGas",
            NoRouteFound { .. } => "NoRouteFound",
            SlippageExceeded { .. } => "SlippageExceeded",
            InvalidSlippage { .. } => "InvalidSlippage",
            TransactionFailed { .. } => "TransactionFailed",
            UserRejected => "UserRejected",
            NetworkError { .. } => "NetworkError",
            DepositTransactionFailed { .. } => "DepositTransactionFailed",
            MinimumDeposit { .. } => "MinimumDeposit",
            InvalidAddress { .. } => "InvalidAddress",
            QuoteExpired { .. } => "QuoteExpired",
            InvalidQuote { .. } => "InvalidQuote",
            InvalidQuoteParams { .. } => "InvalidQuoteParams",
            QuoteFetchFailed { .. } => "QuoteFetchFailed",
            ChainFetchFailed { .. } => "ChainFetchFailed",
            TokenFetchFailed { .. } => "TokenFetchFailed",
            BalanceFetchFailed { .. } => "BalanceFetchFailed",
            ArrivalTimeout { .. } => "ArrivalTimeout",
            L1MonitorCancelled { .. } => "L1MonitorCancelled",
            MaxRetriesExceeded { .. } => "MaxRetriesExceeded",
        }
    }

    /// Structured details as a JSON value, for logging/telemetry.
    pub fn details(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Normalize an opaque error (from a signer, RPC call, or HTTP client)
    /// into a typed [`BridgeError`] using the message-substring heuristics
    /// spec.md §4.8/§7 prescribe.
    pub fn normalize(err: &anyhow::Error) -> BridgeError {
        let message = err.to_string();
        let lower = message.to_lowercase();
        if lower.contains("user rejected") || lower.contains("user denied") {
            return BridgeError::UserRejected;
        }
        if lower.contains("insufficient balance") || lower.contains("insufficient funds") {
            return BridgeError::InsufficientBalance {
                available: "0".into(),
                required: "unknown".into(),
                token: "unknown".into(),
            };
        }
        if lower.contains("revert") {
            return BridgeError::TransactionFailed { reason: message, tx_hash: None };
        }
        if lower.contains("timeout") || lower.contains("timed out") {
            return BridgeError::NetworkError { message };
        }
        BridgeError::NetworkError { message }
    }
}

/// Message-substring heuristic shared by registry projection and the error
/// taxonomy's own `recoverable()`: mirrors spec.md §4.8 exactly.
pub fn is_non_recoverable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    const NON_RECOVERABLE: [&str; 5] = [
        "user rejected",
        "user denied",
        "insufficient balance",
        "insufficient funds",
        "nonce too low",
    ];
    NON_RECOVERABLE.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_is_not_recoverable() {
        assert!(!BridgeError::UserRejected.recoverable());
        assert_eq!(BridgeError::UserRejected.code(), "UserRejected");
    }

    #[test]
    fn network_error_is_recoverable_with_retry_action() {
        let err = BridgeError::NetworkError { message: "boom".into() };
        assert!(err.recoverable());
        assert_eq!(err.recovery_action(), RecoveryAction::Retry);
    }

    #[test]
    fn normalize_detects_user_rejection_substring() {
        let raw = anyhow::anyhow!("Error: User denied transaction signature");
        let normalized = BridgeError::normalize(&raw);
        assert!(matches!(normalized, BridgeError::UserRejected));
    }

    #[test]
    fn normalize_detects_revert_substring() {
        let raw = anyhow::anyhow!("execution reverted: insufficient output amount");
        let normalized = BridgeError::normalize(&raw);
        assert!(matches!(normalized, BridgeError::TransactionFailed { .. }));
    }

    #[test]
    fn non_recoverable_message_heuristic() {
        assert!(is_non_recoverable_message("Nonce too low for account"));
        assert!(!is_non_recoverable_message("temporary network blip"));
    }
}
