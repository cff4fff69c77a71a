//! Fixed constants, per spec.md §6.
//!
//! Mirrors the teacher's `constants.rs` shape (plain `pub const`s plus a
//! couple of small helper functions) but scoped to what this crate's
//! pipeline actually touches — no DEX router/factory tables, since route
//! construction is delegated to the aggregator.

/// The single EVM chain id all bridges in this system target.
pub const DESTINATION_CHAIN_ID: u64 = 999;

/// Testnet counterpart of [`DESTINATION_CHAIN_ID`]; selects the
/// `-testnet` RPC endpoint variant per spec.md §6.
pub const DESTINATION_TESTNET_CHAIN_ID: u64 = 998;

/// Named purely for labeling; see DESIGN.md "Open Questions resolved" for
/// why this never appears in an RPC call — all trading-ledger I/O goes
/// through the info endpoint, not JSON-RPC.
pub const TRADING_CHAIN_ID: u64 = 1337;

/// USDC on the destination chain (lowercased, canonical form).
pub const DESTINATION_USDC_ADDRESS: &str = "0xb88339cb7199b77e23db6e890353e22632ba630f";

/// The deposit contract on the destination chain that credits the trading ledger.
pub const DEPOSIT_CONTRACT_ADDRESS: &str = "0x6b9e773128f453f5c2c60935ee2de2cbc5390a24";

/// Sentinel address representing the native gas token in token lists.
pub const NATIVE_TOKEN_PLACEHOLDER: &str = "0x0000000000000000000000000000000000000000";

/// Minimum deposit amount, in USDC base units (5 USDC @ 6 decimals).
pub const MINIMUM_DEPOSIT_BASE_UNITS: u128 = 5_000_000;

/// `destinationDex` argument values for `deposit`/`depositFor`.
pub const DESTINATION_DEX_PERPS: u32 = 0;
pub const DESTINATION_DEX_SPOT: u32 = u32::MAX;

/// Quote lifetime, per spec.md §3/§4.4.
pub const QUOTE_LIFETIME_MS: i64 = 60_000;

/// TTLs for the chain/token catalogs, per spec.md §4.2.
pub const CHAIN_CATALOG_TTL_SECS: u64 = 30 * 60;
pub const TOKEN_CATALOG_TTL_SECS: u64 = 15 * 60;

/// Balance service debounce window, per spec.md §4.3.
pub const BALANCE_DEBOUNCE_MS: u64 = 300;
/// Balance cache TTL — fresh for 10s, matching scenario S2 in spec.md §8.
pub const BALANCE_CACHE_TTL_SECS: u64 = 10;

/// Arrival detector defaults, per spec.md §4.5.
pub const ARRIVAL_POLL_INTERVAL_SECS: u64 = 5;
pub const ARRIVAL_TIMEOUT_SECS: u64 = 5 * 60;
/// Tolerance numerator/denominator for `delta >= expected * 99/100`.
pub const ARRIVAL_TOLERANCE_NUM: u128 = 99;
pub const ARRIVAL_TOLERANCE_DEN: u128 = 100;

/// L1 confirmation monitor timeouts, per spec.md §4.7.
pub const L1_POLL_INTERVAL_SECS: u64 = 5;
pub const L1_SOFT_TIMEOUT_SECS: u64 = 2 * 60;
pub const L1_HARD_TIMEOUT_SECS: u64 = 30 * 60;

/// Deposit executor receipt-polling defaults, per spec.md §4.6.
pub const RECEIPT_POLL_INTERVAL_SECS: u64 = 2;
pub const RECEIPT_POLL_MAX_ATTEMPTS: u32 = 60;
/// `(approvalGasLimit + depositGasLimit) * 0.1 gwei` estimate inputs.
pub const APPROVAL_GAS_LIMIT: u64 = 60_000;
pub const DEPOSIT_GAS_LIMIT: u64 = 150_000;
pub const DEPOSIT_GAS_PRICE_WEI: u64 = 100_000_000; // 0.1 gwei

/// Orchestrator step-bridging wall-clock cap, per spec.md §4.9.
pub const STEP_BRIDGE_TIMEOUT_SECS: u64 = 10 * 60;
pub const STEP_BRIDGE_POLL_INTERVAL_SECS: u64 = 5;
/// Minimum wait for an approval to mine before proceeding, per spec.md §4.9.
pub const APPROVAL_MINE_WAIT_SECS: u64 = 3;

/// Execution registry bounds, per spec.md §3/§4.8.
pub const REGISTRY_CAPACITY: usize = 100;
pub const REGISTRY_TERMINAL_EVICTION_AGE_SECS: i64 = 60 * 60;

/// Price impact severity bands, per spec.md §4.4.
pub const IMPACT_VERY_HIGH_THRESHOLD: f64 = 0.03;
pub const IMPACT_HIGH_THRESHOLD: f64 = 0.01;
pub const IMPACT_MEDIUM_THRESHOLD: f64 = 0.005;
/// `highImpact` boolean threshold — intentionally equal to the high band.
pub const HIGH_IMPACT_THRESHOLD: f64 = 0.01;

/// Default slippage and bounds, per spec.md §3.
pub const DEFAULT_SLIPPAGE: f64 = 0.005;
pub const MIN_SLIPPAGE: f64 = 0.0001;
pub const MAX_SLIPPAGE: f64 = 0.05;

/// ERC-20 / deposit-contract function selectors (4-byte, hex-encoded).
pub mod selectors {
    pub const APPROVE: &str = "0x095ea7b3";
    pub const DEPOSIT: &str = "0x2b2dfd2c";
    pub const DEPOSIT_FOR: &str = "0x7a92539e";
    pub const ALLOWANCE: &str = "0xdd62ed3e";
    pub const BALANCE_OF: &str = "0x70a08231";
}

/// `MAX_UINT256`, used for infinite approvals.
pub const MAX_UINT256_HEX: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_and_trading_chain_ids_are_distinct() {
        assert_ne!(DESTINATION_CHAIN_ID, TRADING_CHAIN_ID);
    }

    #[test]
    fn minimum_deposit_matches_five_usdc_at_six_decimals() {
        assert_eq!(MINIMUM_DEPOSIT_BASE_UNITS, 5 * 10u128.pow(6));
    }

    #[test]
    fn max_uint256_hex_is_exactly_32_bytes() {
        assert_eq!(MAX_UINT256_HEX.len(), 64);
        assert!(MAX_UINT256_HEX.chars().all(|c| c == 'f'));
    }
}
