//! Chain data types and JSON-RPC quantity decoding.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::Deserialize;

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// A transaction as read from the chain.
///
/// Amounts and positions are arbitrary precision: chain-native values are not
/// bounded by 64 bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transaction {
    /// Sender address
    pub from: String,
    /// Recipient address (empty for contract creation)
    pub to: String,
    /// Transaction hash
    pub hash: String,
    /// Transferred value in the chain's base unit
    pub value: BigUint,
    /// Block containing the transaction
    pub block_number: BigUint,
    /// Position within the block
    pub transaction_index: BigUint,
}

impl Transaction {
    /// Create a transaction at index zero of its block
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        hash: impl Into<String>,
        value: impl Into<BigUint>,
        block_number: impl Into<BigUint>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            hash: hash.into(),
            value: value.into(),
            block_number: block_number.into(),
            transaction_index: BigUint::zero(),
        }
    }

    /// Set the position within the block
    pub fn with_index(mut self, index: impl Into<BigUint>) -> Self {
        self.transaction_index = index.into();
        self
    }

    /// True when `address` is the sender or the recipient
    pub fn involves(&self, address: &str) -> bool {
        self.from == address || self.to == address
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Transaction object as returned by `eth_getBlockByNumber(n, true)`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    /// Sender
    pub from: String,
    /// Recipient, null for contract creation
    #[serde(default)]
    pub to: Option<String>,
    /// Hash
    pub hash: String,
    /// Hex quantity
    #[serde(default)]
    pub value: String,
    /// Hex quantity
    #[serde(default)]
    pub block_number: String,
    /// Hex quantity
    #[serde(default)]
    pub transaction_index: String,
}

impl TryFrom<RpcTransaction> for Transaction {
    type Error = Error;

    fn try_from(raw: RpcTransaction) -> Result<Self> {
        Ok(Self {
            value: parse_quantity(&raw.value)?,
            block_number: parse_quantity(&raw.block_number)?,
            transaction_index: parse_quantity(&raw.transaction_index)?,
            from: raw.from,
            to: raw.to.unwrap_or_default(),
            hash: raw.hash,
        })
    }
}

/// Block object with full transaction bodies
#[derive(Debug, Deserialize)]
pub struct RpcBlock {
    /// Transactions in block order
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUANTITY DECODING
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Decode a hex quantity into an arbitrary-precision integer.
///
/// The `0x` prefix is optional and an empty quantity decodes to zero.
pub fn parse_quantity(s: &str) -> Result<BigUint> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() {
        return Ok(BigUint::zero());
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| Error::Decode(format!("invalid hex quantity: {:?}", s)))
}

/// Decode a hex quantity that must fit a block height
pub fn parse_block_number(s: &str) -> Result<u64> {
    let digits = strip_hex_prefix(s.trim());
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::Decode(format!("invalid block number {:?}: {}", s, e)))
}

/// Encode a block height as a JSON-RPC quantity
pub fn to_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}
