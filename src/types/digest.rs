//! Book digest: a deterministic fingerprint of the visible book.
//!
//! Each visible order is encoded as a fixed-size SSZ [`QuoteRecord`]; the
//! records of the buy side followed by the sell side are hashed with
//! SHA-256 into a 32-byte state root. Two engines that saw the same event
//! stream produce the same digest.

use sha2::{Digest, Sha256};
use ssz_rs::prelude::*;
use tracing::warn;

use crate::types::Order;

/// Fixed-size encoding of one visible order.
///
/// Symbol and market maker are left out: the symbol is constant within a
/// book and the market maker is already part of the tree order.
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct QuoteRecord {
    pub index: u64,
    pub price: u64,
    pub size: u64,
    pub time_sequence: u64,
    pub side_raw: u8,
    pub scope_raw: u8,
    pub exchange_code: u8,
}

impl From<&Order> for QuoteRecord {
    fn from(order: &Order) -> Self {
        Self {
            index: order.index,
            price: order.price,
            size: order.size,
            time_sequence: order.time_sequence(),
            side_raw: order.side.to_u8(),
            scope_raw: order.scope.to_u8(),
            exchange_code: order.exchange_code,
        }
    }
}

/// Summary of the visible book at one point in time.
///
/// ## Example
///
/// ```
/// use orderbook_model::types::BookDigest;
///
/// let empty = BookDigest::compute(0, std::iter::empty(), std::iter::empty());
/// assert!(empty.is_empty());
/// assert_eq!(empty.state_root_hex().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct BookDigest {
    /// Number of change notifications fired so far
    pub version: u64,

    /// Visible buy orders
    pub buy_count: u64,

    /// Visible sell orders
    pub sell_count: u64,

    /// SHA-256 over the SSZ encoding of every visible order, buy side first
    pub state_root: [u8; 32],
}

impl BookDigest {
    /// Hash the visible orders of both sides, each in book order.
    pub fn compute<'a>(
        version: u64,
        buy: impl IntoIterator<Item = &'a Order>,
        sell: impl IntoIterator<Item = &'a Order>,
    ) -> Self {
        let mut hasher = Sha256::new();
        let buy_count = Self::absorb(&mut hasher, buy);
        let sell_count = Self::absorb(&mut hasher, sell);

        let mut state_root = [0u8; 32];
        state_root.copy_from_slice(&hasher.finalize());
        Self {
            version,
            buy_count,
            sell_count,
            state_root,
        }
    }

    fn absorb<'a>(hasher: &mut Sha256, orders: impl IntoIterator<Item = &'a Order>) -> u64 {
        let mut count: u64 = 0;
        for order in orders {
            match ssz_rs::serialize(&QuoteRecord::from(order)) {
                Ok(bytes) => {
                    hasher.update(&bytes);
                    count += 1;
                }
                Err(err) => warn!(order = %order, ?err, "quote left out of digest"),
            }
        }
        // Side separator, so moving an order across sides changes the root.
        hasher.update(count.to_le_bytes());
        count
    }

    /// Get the state root as a hex string
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root)
    }

    /// Whether both sides were empty.
    pub fn is_empty(&self) -> bool {
        self.buy_count == 0 && self.sell_count == 0
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Scope, Side};

    fn order(index: u64, side: Side, price: u64) -> Order {
        Order::new("T", index, side, Scope::Order, price, 100)
    }

    #[test]
    fn test_digest_determinism() {
        let buy = vec![order(1, Side::Buy, 10), order(2, Side::Buy, 9)];
        let sell = vec![order(3, Side::Sell, 11)];

        let d1 = BookDigest::compute(1, &buy, &sell);
        let d2 = BookDigest::compute(1, &buy, &sell);
        assert_eq!(d1, d2);
        assert_eq!(d1.buy_count, 2);
        assert_eq!(d1.sell_count, 1);
        assert!(!d1.is_empty());
    }

    #[test]
    fn test_digest_sensitive_to_order_and_side() {
        let a = order(1, Side::Buy, 10);
        let b = order(2, Side::Buy, 9);

        let forward = BookDigest::compute(0, [&a, &b], []);
        let backward = BookDigest::compute(0, [&b, &a], []);
        assert_ne!(forward.state_root, backward.state_root);

        let moved = BookDigest::compute(0, [&a], [&b]);
        assert_ne!(forward.state_root, moved.state_root);
    }

    #[test]
    fn test_counts_match_hashed_records() {
        let buy: Vec<Order> = (0..5).map(|i| order(i, Side::Buy, 100 - i)).collect();
        let digest = BookDigest::compute(3, &buy, []);
        assert_eq!(digest.buy_count, 5);
        assert_eq!(digest.sell_count, 0);
        assert_eq!(digest.version, 3);

        // Count separator keeps an empty side distinct from a missing one.
        let empty = BookDigest::compute(3, [], []);
        assert!(empty.is_empty());
        assert_ne!(empty.state_root, [0u8; 32]);
    }

    #[test]
    fn test_quote_record_ssz_size() {
        let bytes = ssz_rs::serialize(&QuoteRecord::from(&order(1, Side::Sell, 5)))
            .expect("Failed to serialize");
        // 8 * 4 + 1 * 3
        assert_eq!(bytes.len(), 35);
    }

    #[test]
    fn test_digest_ssz_roundtrip() {
        let digest = BookDigest::compute(7, [&order(1, Side::Buy, 1)], []);
        let bytes = ssz_rs::serialize(&digest).expect("Failed to serialize");
        let back: BookDigest = ssz_rs::deserialize(&bytes).expect("Failed to deserialize");
        assert_eq!(digest, back);
        assert_eq!(bytes.len(), 56);
    }
}
