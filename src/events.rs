use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256};

use crate::chain::Log;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function decimals() external view returns (uint8);
}

/// topic0 of the ERC-20 `Transfer(address,address,uint256)` event.
pub const TRANSFER_SIGNATURE: B256 = Transfer::SIGNATURE_HASH;

/// A log that can be read as an ERC-20 transfer: matching topic0, a non-empty
/// value payload, and indexed `from`/`to` topics.
pub fn is_token_transfer(log: &Log) -> bool {
    log.topics.first() == Some(&TRANSFER_SIGNATURE) && !is_empty_payload(&log.data)
}

/// Indexed `from` and `to` of a transfer log, taken from the low 20 bytes of
/// topics 1 and 2.
pub fn transfer_parties(log: &Log) -> Option<(Address, Address)> {
    match log.topics.as_slice() {
        [_, from, to, ..] => Some((Address::from_word(*from), Address::from_word(*to))),
        _ => None,
    }
}

fn is_empty_payload(data: &str) -> bool {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    digits.is_empty()
}
