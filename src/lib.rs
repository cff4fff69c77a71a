//! xbridge-core: cross-chain bridge orchestration core.
//!
//! Moves fungible tokens from any of ~40 source chains to a single
//! destination EVM (chain id 999) by delegating route discovery and step
//! construction to an external aggregator, signing to a caller-supplied
//! [`signer::Signer`], and observation to public JSON-RPC plus a trading-
//! ledger info endpoint. See `SPEC_FULL.md` for the full component map.

#![allow(dead_code)]

pub mod aggregator;
pub mod arrival;
pub mod balance;
pub mod cache;
pub mod calldata;
pub mod catalog;
pub mod client;
pub mod common;
pub mod config;
pub mod constants;
pub mod deposit;
pub mod error;
pub mod events;
pub mod l1_monitor;
pub mod orchestrator;
pub mod quote;
pub mod registry;
pub mod rpc;
pub mod signer;
pub mod types;

pub use client::{BridgeStatus, Client};
pub use config::ClientConfig;
pub use error::{BridgeError, RecoveryAction};
pub use events::{BridgeEvent, EventBus};
pub use types::{
    Balance, BalanceValidation, BalancesResponse, Chain, ExecutionState, ExecutionStatus, Fees,
    Quote, QuoteParams, Step, StepStatus, StepType, Token,
};
