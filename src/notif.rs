//! Notification adapter.
//!
//! Consumers never see [`Transaction`] directly. They read
//! [`WireTransaction`] records, where the value is a decimal string and the
//! block number a signed 64-bit integer.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chain::Transaction;
use crate::error::{Error, Result};

/// Transaction as delivered to notification consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    /// Sender
    pub from: String,
    /// Recipient
    pub to: String,
    /// Value in base units, decimal
    pub value: String,
    /// Transaction hash
    pub hash: String,
    /// Block number
    pub block: i64,
}

impl TryFrom<&Transaction> for WireTransaction {
    type Error = Error;

    fn try_from(tx: &Transaction) -> Result<Self> {
        let block = tx
            .block_number
            .to_i64()
            .ok_or_else(|| Error::BlockNumberOverflow(tx.block_number.to_string()))?;

        Ok(Self {
            from: tx.from.clone(),
            to: tx.to.clone(),
            value: tx.value.to_string(),
            hash: tx.hash.clone(),
            block,
        })
    }
}

/// Project archive entries into wire records, preserving order.
///
/// Entries whose block number does not fit the wire type are dropped and
/// logged rather than truncated.
pub fn project(transactions: &[Transaction]) -> Vec<WireTransaction> {
    transactions
        .iter()
        .filter_map(|tx| match WireTransaction::try_from(tx) {
            Ok(wire) => Some(wire),
            Err(e) => {
                warn!(hash = %tx.hash, error = %e, "Dropping transaction from notification");
                None
            }
        })
        .collect()
}

/// What a blockchain parser must offer to plug into notification dataflows
pub trait Notifier: Send + Sync {
    /// Last parsed block
    fn current_block(&self) -> u64;

    /// Start watching `address`; `false` if it was already watched
    fn subscribe(&self, address: &str) -> Result<bool>;

    /// Inbound and outbound transactions seen for `address`
    fn transactions(&self, address: &str) -> Result<Vec<WireTransaction>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn test_projection_shape() {
        let tx = Transaction::new("0x1234", "0x5678", "0xabcd", 100u32, 1u32);
        let wire = WireTransaction::try_from(&tx).unwrap();

        assert_eq!(wire.value, "100");
        assert_eq!(wire.block, 1);
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            serde_json::json!({
                "from": "0x1234",
                "to": "0x5678",
                "value": "100",
                "hash": "0xabcd",
                "block": 1
            })
        );
    }

    #[test]
    fn test_value_beyond_u64_renders_exactly() {
        let value = BigUint::from(u64::MAX) * BigUint::from(1000u32);
        let tx = Transaction::new("0xa", "0xb", "0x01", value.clone(), 7u32);
        let wire = WireTransaction::try_from(&tx).unwrap();
        assert_eq!(wire.value, value.to_string());
    }

    #[test]
    fn test_block_overflow_rejected() {
        let block = BigUint::from(i64::MAX as u64) + BigUint::from(1u32);
        let tx = Transaction::new("0xa", "0xb", "0x01", 1u32, block);
        assert!(matches!(
            WireTransaction::try_from(&tx),
            Err(Error::BlockNumberOverflow(_))
        ));
    }

    #[test]
    fn test_project_drops_overflow_keeps_order() {
        let huge = BigUint::from(u64::MAX);
        let txs = vec![
            Transaction::new("0xa", "0xb", "0x01", 1u32, 1u32),
            Transaction::new("0xa", "0xb", "0x02", 1u32, huge),
            Transaction::new("0xa", "0xb", "0x03", 1u32, 3u32),
        ];
        let hashes: Vec<_> = project(&txs).into_iter().map(|w| w.hash).collect();
        assert_eq!(hashes, vec!["0x01", "0x03"]);
    }
}
