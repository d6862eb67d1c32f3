//! Property-based tests for the checked tree and the scope override index.
//!
//! - Child counts, coloring and ordering hold after every operation
//! - The checked in-order sequence equals a sorted model
//! - `node_at_rank(rank_of(n)) == n` for every checked node
//! - check/uncheck are idempotent
//! - Scope tables stay consistent with the tree under any mutation order

use std::collections::BTreeMap;

use orderbook_model::orderbook::ScopeOverrideIndex;
use orderbook_model::tree::{CheckedTree, NodeId};
use orderbook_model::{BookError, Order, Scope, Side};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum TreeOp {
    Insert(u16),
    Delete(u16),
    Check(u16),
    Uncheck(u16),
}

fn arb_tree_op() -> impl Strategy<Value = TreeOp> {
    let value = 0u16..64;
    prop_oneof![
        3 => value.clone().prop_map(TreeOp::Insert),
        1 => value.clone().prop_map(TreeOp::Delete),
        3 => value.clone().prop_map(TreeOp::Check),
        1 => value.prop_map(TreeOp::Uncheck),
    ]
}

/// Linked values: node id and whether it is checked
type Model = BTreeMap<u16, (NodeId, bool)>;

fn apply(tree: &mut CheckedTree<u16>, model: &mut Model, op: &TreeOp) -> Result<(), TestCaseError> {
    match *op {
        TreeOp::Insert(value) => {
            let id = tree.allocate(value);
            let result = tree.insert(id);
            if model.contains_key(&value) {
                prop_assert!(
                    matches!(result, Err(BookError::DuplicateKey { .. })),
                    "expected duplicate key error"
                );
                tree.release(id);
            } else {
                prop_assert!(result.is_ok());
                model.insert(value, (id, false));
            }
        }
        TreeOp::Delete(value) => {
            if let Some((id, _)) = model.remove(&value) {
                prop_assert!(tree.release(id).is_some());
            }
        }
        TreeOp::Check(value) => {
            if let Some((id, checked)) = model.get_mut(&value) {
                prop_assert_eq!(tree.check(*id), !*checked);
                prop_assert!(!tree.check(*id));
                *checked = true;
            }
        }
        TreeOp::Uncheck(value) => {
            if let Some((id, checked)) = model.get_mut(&value) {
                prop_assert_eq!(tree.uncheck(*id), *checked);
                prop_assert!(!tree.uncheck(*id));
                *checked = false;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum BookOp {
    Upsert { slot: u8, price: u64 },
    Remove { slot: u8 },
}

fn arb_book_op() -> impl Strategy<Value = BookOp> {
    prop_oneof![
        3 => (0u8..24, 1u64..5).prop_map(|(slot, price)| BookOp::Upsert { slot, price }),
        1 => (0u8..24).prop_map(|slot| BookOp::Remove { slot }),
    ]
}

/// Fixed scope, venue and market maker per slot.
fn slot_order(slot: u8, price: u64) -> Order {
    let scope = match slot {
        0 => Scope::Composite,
        1..=3 => Scope::Regional,
        4..=11 => Scope::Aggregate,
        _ => Scope::Order,
    };
    Order::new("T", u64::from(slot), Side::Buy, scope, price, 10)
        .with_exchange(b'A' + slot % 4)
        .with_market_maker(format!("MM{}", slot % 8))
}

proptest! {
    #[test]
    fn prop_tree_matches_model(ops in prop::collection::vec(arb_tree_op(), 1..200)) {
        let mut tree = CheckedTree::new(<u16 as Ord>::cmp);
        let mut model = Model::new();

        for op in &ops {
            apply(&mut tree, &mut model, op)?;
            prop_assert!(tree.validate().is_ok(), "invalid after {:?}", op);
        }

        let expected: Vec<u16> = model
            .iter()
            .filter(|&(_, &(_, checked))| checked)
            .map(|(&value, _)| value)
            .collect();
        let actual: Vec<u16> = tree.iter().copied().collect();
        prop_assert_eq!(&actual, &expected);
        prop_assert_eq!(tree.len(), expected.len());
        prop_assert_eq!(tree.tree_len(), model.len());
    }

    #[test]
    fn prop_rank_round_trip(ops in prop::collection::vec(arb_tree_op(), 1..200)) {
        let mut tree = CheckedTree::new(<u16 as Ord>::cmp);
        let mut model = Model::new();
        for op in &ops {
            apply(&mut tree, &mut model, op)?;
        }

        for &(id, checked) in model.values() {
            match tree.rank_of(id) {
                Some(rank) => {
                    prop_assert!(checked);
                    prop_assert_eq!(tree.node_at_rank(rank), Some(id));
                }
                None => prop_assert!(!checked),
            }
        }
        prop_assert_eq!(tree.node_at_rank(tree.len()), None);
    }

    #[test]
    fn prop_scope_index_stays_consistent(ops in prop::collection::vec(arb_book_op(), 1..120)) {
        let mut book = ScopeOverrideIndex::new(Side::Buy);
        let mut nodes: BTreeMap<u8, NodeId> = BTreeMap::new();

        for op in &ops {
            match *op {
                BookOp::Upsert { slot, price } => {
                    let id = match nodes.get(&slot) {
                        Some(&id) => {
                            book.delete_order_node(id);
                            prop_assert!(book.set_value(id, slot_order(slot, price)));
                            id
                        }
                        None => {
                            let id = book.allocate(slot_order(slot, price));
                            nodes.insert(slot, id);
                            id
                        }
                    };
                    prop_assert!(book.insert_order_node(id).is_ok());
                }
                BookOp::Remove { slot } => {
                    if let Some(id) = nodes.remove(&slot) {
                        prop_assert!(book.release(id).is_some());
                    }
                }
            }
            if let Err(err) = book.validate() {
                return Err(TestCaseError::fail(format!("{err} after {op:?}")));
            }
        }

        // Individual orders are never hidden.
        for (&slot, &id) in &nodes {
            if slot >= 12 {
                prop_assert!(book.is_visible(id));
            }
        }
        prop_assert_eq!(book.tree().allocated(), nodes.len());
    }
}
