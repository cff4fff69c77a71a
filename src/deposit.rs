//! C8 — deposit executor, per spec.md §4.6.
//!
//! Allowance check → optional approve → deposit call, with receipt
//! polling when the signer has no wait primitive of its own. Calldata
//! encoding lives in [`crate::calldata`]; this module owns the pre-flight
//! checks, the approve/deposit dispatch, and reverted-receipt handling.
//! Grounded on `blockchain/rpc.rs::send_transaction`/`estimate_gas`'s
//! submit-then-poll shape, narrowed to the one fixed contract this crate
//! ever calls.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;

use crate::calldata;
use crate::constants::{
    APPROVAL_GAS_LIMIT, DEPOSIT_CONTRACT_ADDRESS, DEPOSIT_GAS_LIMIT, DEPOSIT_GAS_PRICE_WEI, DESTINATION_CHAIN_ID,
    DESTINATION_DEX_PERPS, DESTINATION_USDC_ADDRESS, MINIMUM_DEPOSIT_BASE_UNITS, RECEIPT_POLL_INTERVAL_SECS,
    RECEIPT_POLL_MAX_ATTEMPTS,
};
use crate::error::BridgeError;
use crate::rpc::RpcClient;
use crate::signer::{Signer, TransactionRequest};

/// Pre-flight validation result for a prospective deposit, per spec.md §4.6.
#[derive(Debug, Clone)]
pub struct DepositRequirements {
    pub usdc_balance: String,
    pub native_balance: String,
    pub allowance: String,
    pub estimated_gas_cost: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationDex {
    Perps,
    Spot,
}

impl DestinationDex {
    fn as_u32(self) -> u32 {
        match self {
            DestinationDex::Perps => DESTINATION_DEX_PERPS,
            DestinationDex::Spot => crate::constants::DESTINATION_DEX_SPOT,
        }
    }
}

impl Default for DestinationDex {
    fn default() -> Self {
        DestinationDex::Perps
    }
}

#[derive(Debug, Clone, Default)]
pub struct DepositOptions {
    pub destination_dex: DestinationDex,
    /// Approve `amount` exactly rather than the infinite sentinel.
    pub infinite_approval: bool,
}

#[derive(Debug, Clone)]
pub struct DepositResult {
    pub approval_tx_hash: Option<String>,
    pub deposit_tx_hash: String,
}

pub struct DepositExecutor {
    rpc: Arc<RpcClient>,
}

impl DepositExecutor {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    async fn usdc_balance(&self, wallet: &str) -> anyhow::Result<BigUint> {
        let data = calldata::encode_balance_of(wallet)?;
        let raw = self.rpc.eth_call(DESTINATION_USDC_ADDRESS, &data).await?;
        calldata::decode_uint256(&raw)
    }

    async fn allowance(&self, wallet: &str) -> anyhow::Result<BigUint> {
        let data = calldata::encode_allowance(wallet, DEPOSIT_CONTRACT_ADDRESS)?;
        let raw = self.rpc.eth_call(DESTINATION_USDC_ADDRESS, &data).await?;
        calldata::decode_uint256(&raw)
    }

    /// Fetches the destination-chain USDC balance, native gas balance and
    /// current allowance in parallel, then validates against `amount`,
    /// per spec.md §4.6.
    pub async fn validate_deposit_requirements(&self, wallet: &str, amount: &str) -> Result<DepositRequirements, BridgeError> {
        let amount_value: BigUint = BigUint::from_str(amount).map_err(|_| BridgeError::InvalidQuoteParams {
            reason: format!("deposit amount '{amount}' is not a positive integer"),
        })?;
        if amount_value < BigUint::from(MINIMUM_DEPOSIT_BASE_UNITS) {
            return Err(BridgeError::MinimumDeposit {
                amount: amount_value.to_string(),
                minimum: MINIMUM_DEPOSIT_BASE_UNITS.to_string(),
            });
        }

        let (usdc_balance, native_balance, allowance) = tokio::try_join!(
            self.usdc_balance(wallet),
            self.rpc.eth_get_balance(wallet),
            self.allowance(wallet),
        )
        .map_err(|e| BridgeError::BalanceFetchFailed { message: e.to_string() })?;

        let estimated_gas_cost = BigUint::from(APPROVAL_GAS_LIMIT + DEPOSIT_GAS_LIMIT) * BigUint::from(DEPOSIT_GAS_PRICE_WEI);

        if usdc_balance < amount_value {
            return Err(BridgeError::InsufficientBalance {
                available: usdc_balance.to_string(),
                required: amount_value.to_string(),
                token: "USDC".into(),
            });
        }
        if native_balance < estimated_gas_cost {
            return Err(BridgeError::InsufficientGas { available: native_balance.to_string(), required: estimated_gas_cost.to_string() });
        }

        Ok(DepositRequirements {
            usdc_balance: usdc_balance.to_string(),
            native_balance: native_balance.to_string(),
            allowance: allowance.to_string(),
            estimated_gas_cost: estimated_gas_cost.to_string(),
        })
    }

    /// Submits an `approve` transaction if the current allowance is
    /// insufficient. Returns `None` if no approval was needed.
    pub async fn approve(&self, signer: &dyn Signer, amount: &str, infinite: bool) -> Result<Option<String>, BridgeError> {
        let wallet = signer.get_address().await.map_err(|e| BridgeError::normalize(&e))?;
        let amount_value: BigUint = BigUint::from_str(amount).unwrap_or_default();
        let current_allowance = self.allowance(&wallet).await.map_err(|e| BridgeError::BalanceFetchFailed { message: e.to_string() })?;

        if current_allowance >= amount_value {
            return Ok(None);
        }

        let data = calldata::encode_approve(DEPOSIT_CONTRACT_ADDRESS, if infinite { None } else { Some(amount) })
            .map_err(|e| BridgeError::InvalidAddress { address: e.to_string() })?;

        let request = TransactionRequest {
            chain_id: DESTINATION_CHAIN_ID,
            to: DESTINATION_USDC_ADDRESS.to_string(),
            data,
            value: "0".to_string(),
            gas_limit: Some(APPROVAL_GAS_LIMIT.to_string()),
            gas_price: None,
        };

        let tx_hash = signer.send_transaction(request).await.map_err(|e| BridgeError::normalize(&e))?;
        let receipt = self.await_receipt(signer, &tx_hash).await?;
        if receipt.is_success() == Some(false) {
            return Err(BridgeError::DepositTransactionFailed { reason: "approval reverted".into(), tx_hash: Some(tx_hash) });
        }
        Ok(Some(tx_hash))
    }

    /// Full flow: validate, approve-if-needed, then deposit for the
    /// signer's own address.
    pub async fn execute_deposit(&self, signer: &dyn Signer, amount: &str, options: DepositOptions) -> Result<DepositResult, BridgeError> {
        let wallet = signer.get_address().await.map_err(|e| BridgeError::normalize(&e))?;
        self.execute_deposit_for(signer, &wallet, amount, options).await
    }

    /// Same as [`Self::execute_deposit`] but credits `recipient` instead
    /// of the signer's own address, via `depositFor`.
    pub async fn execute_deposit_for(
        &self,
        signer: &dyn Signer,
        recipient: &str,
        amount: &str,
        options: DepositOptions,
    ) -> Result<DepositResult, BridgeError> {
        let wallet = signer.get_address().await.map_err(|e| BridgeError::normalize(&e))?;
        self.validate_deposit_requirements(&wallet, amount).await?;

        let approval_tx_hash = self.approve(signer, amount, options.infinite_approval).await?;

        let is_self = recipient.eq_ignore_ascii_case(&wallet);
        let data = if is_self {
            calldata::encode_deposit(amount, options.destination_dex.as_u32())
        } else {
            calldata::encode_deposit_for(recipient, amount, options.destination_dex.as_u32())
        }
        .map_err(|e| BridgeError::InvalidAddress { address: e.to_string() })?;

        let request = TransactionRequest {
            chain_id: DESTINATION_CHAIN_ID,
            to: DEPOSIT_CONTRACT_ADDRESS.to_string(),
            data,
            value: "0".to_string(),
            gas_limit: Some(DEPOSIT_GAS_LIMIT.to_string()),
            gas_price: None,
        };

        let tx_hash = signer.send_transaction(request).await.map_err(|e| BridgeError::normalize(&e))?;
        let receipt = self.await_receipt(signer, &tx_hash).await?;
        if receipt.is_success() == Some(false) {
            return Err(BridgeError::DepositTransactionFailed { reason: "deposit reverted".into(), tx_hash: Some(tx_hash) });
        }

        Ok(DepositResult { approval_tx_hash, deposit_tx_hash: tx_hash })
    }

    /// Prefers the signer's own wait primitive; falls back to polling
    /// `eth_getTransactionReceipt` at the spec's cadence/cap.
    async fn await_receipt(&self, signer: &dyn Signer, tx_hash: &str) -> Result<crate::rpc::TransactionReceipt, BridgeError> {
        if let Ok(receipt) = signer.wait_for_transaction_receipt(&self.rpc, tx_hash).await {
            return Ok(receipt);
        }

        for _ in 0..RECEIPT_POLL_MAX_ATTEMPTS {
            match self.rpc.eth_get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.is_mined() => return Ok(receipt),
                _ => tokio::time::sleep(Duration::from_secs(RECEIPT_POLL_INTERVAL_SECS)).await,
            }
        }
        Err(BridgeError::DepositTransactionFailed { reason: "receipt not available after max polling attempts".into(), tx_hash: Some(tx_hash.to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_dex_perps_is_zero_spot_is_max() {
        assert_eq!(DestinationDex::Perps.as_u32(), 0);
        assert_eq!(DestinationDex::Spot.as_u32(), u32::MAX);
    }

    #[tokio::test]
    async fn validate_rejects_below_minimum_deposit() {
        let rpc = Arc::new(RpcClient::new("http://localhost:1"));
        let executor = DepositExecutor::new(rpc);
        let err = executor.validate_deposit_requirements("0x000000000000000000000000000000000000aa", "1000000").await.unwrap_err();
        assert!(matches!(err, BridgeError::MinimumDeposit { .. }));
    }
}
