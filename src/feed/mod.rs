//! Snapshot and transaction assembly of indexed order events.
//!
//! ## Event Flags
//!
//! Every event carries a small flag set describing where it sits in the
//! upstream stream:
//!
//! | Flag | Bit | Meaning |
//! |------|-----|---------|
//! | `TX_PENDING` | `0x01` | more events of the same transaction follow |
//! | `REMOVE_EVENT` | `0x02` | the index is gone |
//! | `SNAPSHOT_BEGIN` | `0x04` | first event of a snapshot |
//! | `SNAPSHOT_END` | `0x08` | last event of a snapshot |
//! | `SNAPSHOT_SNIP` | `0x10` | last event of a truncated snapshot |
//!
//! ## Assembly
//!
//! Events are grouped per source id (top 16 bits of the index). While a
//! transaction is pending or a snapshot is in progress for a source, its
//! events are held back. Once the source is consistent again, everything
//! held back plus the current event is released as one [`ReleasedBatch`].
//! A batch that completes a snapshot is flagged, and the receiver drops
//! everything it knows about that source before applying it.
//!
//! ## Example
//!
//! ```
//! use orderbook_model::feed::{EventFlags, OrderEvent, TransactionAssembler};
//! use orderbook_model::types::{Order, Scope, Side};
//!
//! let order = |index| Order::new("IBM", index, Side::Buy, Scope::Order, 100, 1);
//! let mut assembler = TransactionAssembler::new();
//!
//! let begin = OrderEvent::new(order(1)).with_flags(EventFlags::SNAPSHOT_BEGIN);
//! assert!(assembler.push(begin).is_none());
//!
//! let end = OrderEvent::new(order(2)).with_flags(EventFlags::SNAPSHOT_END);
//! let batch = assembler.push(end).unwrap();
//! assert!(batch.snapshot);
//! assert_eq!(batch.events.len(), 2);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tracing::{debug, trace};

use crate::types::Order;

// ============================================================================
// Event flags
// ============================================================================

/// Bit set of stream position flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventFlags(u8);

impl EventFlags {
    pub const TX_PENDING: EventFlags = EventFlags(0x01);
    pub const REMOVE_EVENT: EventFlags = EventFlags(0x02);
    pub const SNAPSHOT_BEGIN: EventFlags = EventFlags(0x04);
    pub const SNAPSHOT_END: EventFlags = EventFlags(0x08);
    pub const SNAPSHOT_SNIP: EventFlags = EventFlags(0x10);

    const NAMES: [(EventFlags, &'static str); 5] = [
        (Self::TX_PENDING, "TX_PENDING"),
        (Self::REMOVE_EVENT, "REMOVE_EVENT"),
        (Self::SNAPSHOT_BEGIN, "SNAPSHOT_BEGIN"),
        (Self::SNAPSHOT_END, "SNAPSHOT_END"),
        (Self::SNAPSHOT_SNIP, "SNAPSHOT_SNIP"),
    ];

    pub const fn empty() -> Self {
        EventFlags(0)
    }

    /// Flags from raw bits; unknown bits are dropped.
    pub const fn from_bits(bits: u8) -> Self {
        EventFlags(bits & 0x1f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag of `other` is set.
    #[inline]
    pub const fn contains(self, other: EventFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag of `other` is set.
    #[inline]
    pub const fn intersects(self, other: EventFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventFlags {
    type Output = EventFlags;

    fn bitor(self, rhs: EventFlags) -> EventFlags {
        EventFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: EventFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "EventFlags({})", names.join(" | "))
    }
}

// ============================================================================
// Events and batches
// ============================================================================

/// An order together with its stream flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    pub order: Order,
    pub flags: EventFlags,
}

impl OrderEvent {
    /// Plain event with no flags.
    pub fn new(order: Order) -> Self {
        Self {
            order,
            flags: EventFlags::empty(),
        }
    }

    /// Removal of `order.index`.
    pub fn removal(order: Order) -> Self {
        Self::new(order).with_flags(EventFlags::REMOVE_EVENT)
    }

    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[inline]
    pub fn is_removal(&self) -> bool {
        self.flags.contains(EventFlags::REMOVE_EVENT)
    }

    #[inline]
    pub fn source_id(&self) -> u16 {
        self.order.source_id()
    }
}

/// Events of one source that may now be applied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedBatch {
    pub source: u16,

    /// Completes a snapshot: the receiver drops every entry of `source`
    /// before applying `events`
    pub snapshot: bool,

    pub events: Vec<OrderEvent>,
}

// ============================================================================
// Assembler
// ============================================================================

#[derive(Debug, Default)]
struct SourceState {
    /// Between snapshot begin and snapshot end
    snapshot_part: bool,

    /// Snapshot ended, not yet released
    snapshot_full: bool,

    /// Last event had `TX_PENDING`
    tx: bool,

    pending: Vec<OrderEvent>,
}

/// Source ids of the composite, regional and aggregate feeds.
const SPECIAL_SOURCES: std::ops::RangeInclusive<u64> = 1..=6;

/// Older feeds omit `SNAPSHOT_END`; their snapshots end at the event whose
/// low 32 index bits are zero. Special sources carry an exchange code in
/// bits 32..48, so for them the code must be zero as well.
fn closes_legacy_snapshot(index: u64) -> bool {
    index as u32 == 0 && (!SPECIAL_SOURCES.contains(&(index >> 48)) || (index >> 32) as u16 == 0)
}

/// Holds back events of inconsistent sources.
#[derive(Debug, Default)]
pub struct TransactionAssembler {
    sources: BTreeMap<u16, SourceState>,
}

impl TransactionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event; returns the batch it completes, if any.
    pub fn push(&mut self, event: OrderEvent) -> Option<ReleasedBatch> {
        let source_id = event.source_id();
        let source = self.sources.entry(source_id).or_default();
        let flags = event.flags;

        source.tx = flags.contains(EventFlags::TX_PENDING);
        if flags.contains(EventFlags::SNAPSHOT_BEGIN) {
            if !source.pending.is_empty() {
                debug!(source = source_id, dropped = source.pending.len(), "snapshot restarted");
            }
            source.snapshot_part = true;
            source.snapshot_full = false;
            source.pending.clear();
        }
        if source.snapshot_part
            && (flags.intersects(EventFlags::SNAPSHOT_END | EventFlags::SNAPSHOT_SNIP)
                || closes_legacy_snapshot(event.order.index))
        {
            source.snapshot_part = false;
            source.snapshot_full = true;
        }

        if source.tx || source.snapshot_part {
            trace!(source = source_id, index = event.order.index, "event held back");
            source.pending.push(event);
            return None;
        }

        let snapshot = std::mem::take(&mut source.snapshot_full);
        let mut events = std::mem::take(&mut source.pending);
        events.push(event);
        if snapshot {
            debug!(source = source_id, events = events.len(), "snapshot complete");
        }
        Some(ReleasedBatch {
            source: source_id,
            snapshot,
            events,
        })
    }

    /// Number of events held back across all sources.
    pub fn pending_len(&self) -> usize {
        self.sources.values().map(|s| s.pending.len()).sum()
    }

    /// Whether `source` is between snapshot begin and end.
    pub fn in_snapshot(&self, source: u16) -> bool {
        self.sources.get(&source).is_some_and(|s| s.snapshot_part)
    }

    /// Forget every source and everything held back.
    pub fn clear(&mut self) {
        self.sources.clear();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
