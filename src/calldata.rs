//! Manual ABI-calldata encoding for the handful of functions this crate
//! ever calls (spec.md §6). No contract/ABI-binding layer is pulled in for
//! this — five selectors and three argument shapes don't justify one.
//!
//! Every helper returns a `0x`-prefixed hex string: selector followed by
//! 32-byte big-endian-packed arguments, exactly as `eth_call`/`eth_sendTransaction`
//! expect in the `data` field.

use anyhow::{anyhow, Result};

use crate::constants::{selectors, MAX_UINT256_HEX};

fn pad_address(address: &str) -> Result<String> {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    if stripped.len() != 40 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("not a 20-byte address: {address}"));
    }
    Ok(format!("{:0>64}", stripped.to_lowercase()))
}

fn pad_uint(value_base10: &str) -> Result<String> {
    let value: u128 = value_base10.parse().map_err(|_| anyhow!("not a uint128-range integer: {value_base10}"))?;
    Ok(format!("{value:064x}"))
}

fn pad_uint256_hex(hex_value: &str) -> String {
    let stripped = hex_value.strip_prefix("0x").unwrap_or(hex_value);
    format!("{stripped:0>64}")
}

/// `approve(address spender, uint256 amount)`. Pass `amount = None` for the
/// infinite-approval sentinel ([`crate::constants::MAX_UINT256_HEX`]).
pub fn encode_approve(spender: &str, amount_base10: Option<&str>) -> Result<String> {
    let amount_word = match amount_base10 {
        Some(amount) => pad_uint(amount)?,
        None => pad_uint256_hex(MAX_UINT256_HEX),
    };
    Ok(format!("{}{}{}", selectors::APPROVE, pad_address(spender)?, amount_word))
}

/// `deposit(uint256 amount, uint256 destinationDex)`.
pub fn encode_deposit(amount_base10: &str, destination_dex: u32) -> Result<String> {
    Ok(format!(
        "{}{}{}",
        selectors::DEPOSIT,
        pad_uint(amount_base10)?,
        format!("{destination_dex:064x}")
    ))
}

/// `depositFor(address beneficiary, uint256 amount, uint256 destinationDex)`.
pub fn encode_deposit_for(beneficiary: &str, amount_base10: &str, destination_dex: u32) -> Result<String> {
    Ok(format!(
        "{}{}{}{}",
        selectors::DEPOSIT_FOR,
        pad_address(beneficiary)?,
        pad_uint(amount_base10)?,
        format!("{destination_dex:064x}")
    ))
}

/// `allowance(address owner, address spender)`.
pub fn encode_allowance(owner: &str, spender: &str) -> Result<String> {
    Ok(format!("{}{}{}", selectors::ALLOWANCE, pad_address(owner)?, pad_address(spender)?))
}

/// `balanceOf(address account)`.
pub fn encode_balance_of(account: &str) -> Result<String> {
    Ok(format!("{}{}", selectors::BALANCE_OF, pad_address(account)?))
}

/// Decode a single `uint256` return value from an `eth_call` result.
pub fn decode_uint256(hex_result: &str) -> Result<num_bigint::BigUint> {
    let stripped = hex_result.strip_prefix("0x").unwrap_or(hex_result);
    if stripped.is_empty() {
        return Ok(num_bigint::BigUint::from(0u32));
    }
    let bytes = hex::decode(stripped).map_err(|e| anyhow!("invalid hex in eth_call result: {e}"))?;
    Ok(num_bigint::BigUint::from_bytes_be(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_approve_pads_spender_and_amount() {
        let encoded = encode_approve("0x6b9e773128f453f5c2c60935ee2de2cbc5390a24", Some("1000000")).unwrap();
        assert!(encoded.starts_with(selectors::APPROVE));
        assert_eq!(encoded.len(), 2 + 8 + 64 + 64);
    }

    #[test]
    fn encode_approve_infinite_uses_max_uint256() {
        let encoded = encode_approve("0x6b9e773128f453f5c2c60935ee2de2cbc5390a24", None).unwrap();
        let amount_word = &encoded[encoded.len() - 64..];
        assert_eq!(amount_word, "f".repeat(64));
    }

    #[test]
    fn encode_deposit_for_packs_three_arguments() {
        let encoded = encode_deposit_for(
            "0x000000000000000000000000000000000000aa",
            "5000000",
            crate::constants::DESTINATION_DEX_SPOT,
        )
        .unwrap();
        assert_eq!(encoded.len(), 2 + 8 + 64 * 3);
        assert!(encoded.ends_with(&"f".repeat(64)));
    }

    #[test]
    fn pad_address_rejects_wrong_length() {
        assert!(pad_address("0x1234").is_err());
    }

    #[test]
    fn decode_uint256_handles_empty_result() {
        let decoded = decode_uint256("0x").unwrap();
        assert_eq!(decoded, num_bigint::BigUint::from(0u32));
    }
}
