//! C8/C11 collaborator — an abstract transaction-signing boundary.
//!
//! This crate never holds a private key. A host application supplies a
//! [`Signer`] (a wallet extension bridge, a KMS-backed service, a hardware
//! wallet adapter) and every component that needs to send a transaction
//! goes through this trait, per spec.md §6.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::rpc::TransactionReceipt;

#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub chain_id: u64,
    pub to: String,
    pub data: String,
    pub value: String,
    pub gas_limit: Option<String>,
    pub gas_price: Option<String>,
}

#[async_trait]
pub trait Signer: Send + Sync {
    /// Submit a signed transaction and return its hash. Errors should be
    /// raw (signer-specific) strings; callers normalize them with
    /// [`BridgeError::normalize`].
    async fn send_transaction(&self, request: TransactionRequest) -> Result<String, anyhow::Error>;

    async fn get_address(&self) -> Result<String, anyhow::Error>;

    async fn get_chain_id(&self) -> Result<u64, anyhow::Error>;

    /// Default implementation polls an injected [`crate::rpc::RpcClient`]
    /// via `eth_getTransactionReceipt`; signers backed by a provider with
    /// its own wait-for-receipt primitive may override this.
    async fn wait_for_transaction_receipt(
        &self,
        _rpc: &crate::rpc::RpcClient,
        _tx_hash: &str,
    ) -> Result<TransactionReceipt, BridgeError> {
        Err(BridgeError::TransactionFailed {
            reason: "wait_for_transaction_receipt not implemented for this signer".into(),
            tx_hash: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// An in-memory signer for orchestrator/deposit tests: always
    /// succeeds, hands back a deterministic incrementing tx hash.
    pub struct FakeSigner {
        address: String,
        chain_id: u64,
        counter: AtomicU64,
        pub sent: Mutex<Vec<TransactionRequest>>,
        pub should_reject: bool,
    }

    impl FakeSigner {
        pub fn new(address: &str, chain_id: u64) -> Self {
            Self {
                address: address.to_string(),
                chain_id,
                counter: AtomicU64::new(1),
                sent: Mutex::new(Vec::new()),
                should_reject: false,
            }
        }

        pub fn rejecting(address: &str, chain_id: u64) -> Self {
            Self { should_reject: true, ..Self::new(address, chain_id) }
        }
    }

    #[async_trait]
    impl Signer for FakeSigner {
        async fn send_transaction(&self, request: TransactionRequest) -> Result<String, anyhow::Error> {
            if self.should_reject {
                return Err(anyhow::anyhow!("User rejected the request"));
            }
            let id = self.counter.fetch_add(1, Ordering::Relaxed);
            self.sent.lock().unwrap().push(request);
            Ok(format!("0x{id:064x}"))
        }

        async fn get_address(&self) -> Result<String, anyhow::Error> {
            Ok(self.address.clone())
        }

        async fn get_chain_id(&self) -> Result<u64, anyhow::Error> {
            Ok(self.chain_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeSigner;
    use super::*;

    #[tokio::test]
    async fn fake_signer_records_sent_transactions() {
        let signer = FakeSigner::new("0x000000000000000000000000000000000000aa", 999);
        let request = TransactionRequest {
            chain_id: 999,
            to: "0x6b9e773128f453f5c2c60935ee2de2cbc5390a24".into(),
            data: "0x095ea7b3".into(),
            value: "0".into(),
            gas_limit: None,
            gas_price: None,
        };
        let hash = signer.send_transaction(request).await.unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(signer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejecting_signer_errors() {
        let signer = FakeSigner::rejecting("0x000000000000000000000000000000000000aa", 999);
        let request = TransactionRequest {
            chain_id: 999,
            to: "0x0".into(),
            data: "0x0".into(),
            value: "0".into(),
            gas_limit: None,
            gas_price: None,
        };
        let err = signer.send_transaction(request).await.unwrap_err();
        let normalized = BridgeError::normalize(&err);
        assert!(matches!(normalized, BridgeError::UserRejected));
    }
}
