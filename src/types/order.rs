//! Order event types for the order book model.
//!
//! ## Fixed-Point Representation
//!
//! Prices and sizes are stored as u64 scaled by 10^8 (see [`super::price`]).
//!
//! ## Scopes
//!
//! The same market can be quoted at several granularities at once. From the
//! least to the most detailed:
//!
//! | Scope | Meaning | Keyed by |
//! |-------|---------|----------|
//! | `Composite` | market-wide best quote | - |
//! | `Regional` | best quote of one venue | exchange code |
//! | `Aggregate` | one market maker on one venue | exchange code + market maker |
//! | `Order` | one individual order | exchange code + market maker |

use std::fmt;

use crate::types::price::from_fixed_trimmed;

/// Exchange codes are 7-bit; this is the number of distinct venues.
pub const EXCHANGE_COUNT: usize = 128;

// ============================================================================
// Side enum
// ============================================================================

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Side {
    /// Buy order (bid)
    #[default]
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Convert to u8 for serialization
    pub fn to_u8(self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    /// Convert from u8 for deserialization
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    /// Returns the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

// ============================================================================
// Scope enum
// ============================================================================

/// Granularity of a quote, ordered from least to most detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Scope {
    /// Market-wide best quote
    #[default]
    Composite,
    /// Best quote of a single venue
    Regional,
    /// Quote of a single market maker on a single venue
    Aggregate,
    /// Individual order
    Order,
}

impl Scope {
    /// All scopes, least detailed first.
    pub const ALL: [Scope; 4] = [Scope::Composite, Scope::Regional, Scope::Aggregate, Scope::Order];

    /// Convert to u8 for serialization
    pub fn to_u8(self) -> u8 {
        match self {
            Scope::Composite => 0,
            Scope::Regional => 1,
            Scope::Aggregate => 2,
            Scope::Order => 3,
        }
    }

    /// Convert from u8 for deserialization
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Scope::Composite),
            1 => Some(Scope::Regional),
            2 => Some(Scope::Aggregate),
            3 => Some(Scope::Order),
            _ => None,
        }
    }

    /// Lowercase name, as used in configuration strings.
    pub fn name(self) -> &'static str {
        match self {
            Scope::Composite => "composite",
            Scope::Regional => "regional",
            Scope::Aggregate => "aggregate",
            Scope::Order => "order",
        }
    }
}

// ============================================================================
// Order struct
// ============================================================================

/// An order event as delivered by the feed.
///
/// Immutable by convention: the book copies it, scales the copy by the lot
/// size and never touches the original.
///
/// ## Example
///
/// ```
/// use orderbook_model::types::{Order, Scope, Side};
///
/// let order = Order::new("IBM", 7, Side::Buy, Scope::Aggregate, 10_000_000_000, 500_000_000)
///     .with_exchange(b'N')
///     .with_market_maker("NSDQ")
///     .with_time(1_000, 3);
///
/// assert_eq!(order.source_id(), 0);
/// assert!(order.has_size());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Order {
    /// Instrument symbol
    pub symbol: String,

    /// Stable identity of the order within its symbol; the top 16 bits
    /// carry the source id
    pub index: u64,

    /// Buy or sell
    pub side: Side,

    /// Granularity of this quote
    pub scope: Scope,

    /// Venue code (0..=127), meaningful for regional and finer scopes
    pub exchange_code: u8,

    /// Market maker id, meaningful for aggregate and order scopes.
    /// Empty means none.
    pub market_maker: String,

    /// Price in fixed-point (scaled by 10^8)
    pub price: u64,

    /// Size in fixed-point (scaled by 10^8); zero means removal
    pub size: u64,

    /// Event time in milliseconds
    pub time: u64,

    /// Sequence number within the same millisecond (22 bits)
    pub sequence: u32,
}

impl Order {
    /// Maximum value of [`Order::sequence`].
    pub const MAX_SEQUENCE: u32 = (1 << 22) - 1;

    /// Create a new order event with no venue, market maker or time.
    pub fn new(
        symbol: impl Into<String>,
        index: u64,
        side: Side,
        scope: Scope,
        price: u64,
        size: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            index,
            side,
            scope,
            price,
            size,
            ..Self::default()
        }
    }

    /// Set the venue code.
    pub fn with_exchange(mut self, exchange_code: u8) -> Self {
        self.exchange_code = exchange_code;
        self
    }

    /// Set the market maker id.
    pub fn with_market_maker(mut self, market_maker: impl Into<String>) -> Self {
        self.market_maker = market_maker.into();
        self
    }

    /// Set event time (ms) and sequence.
    pub fn with_time(mut self, time: u64, sequence: u32) -> Self {
        self.time = time;
        self.sequence = sequence.min(Self::MAX_SEQUENCE);
        self
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Copy of this order carrying a different size.
    pub fn resized(&self, size: u64) -> Self {
        Self {
            size,
            ..self.clone()
        }
    }

    /// Whether the order carries a non-zero size.
    #[inline]
    pub fn has_size(&self) -> bool {
        self.size != 0
    }

    /// Recency key: seconds in the high 32 bits, then milliseconds, then
    /// sequence.
    #[inline]
    pub fn time_sequence(&self) -> u64 {
        let seconds = self.time / 1000;
        let millis = self.time % 1000;
        (seconds << 32) | (millis << 22) | u64::from(self.sequence & Self::MAX_SEQUENCE)
    }

    /// Source id encoded in the top 16 bits of the index.
    #[inline]
    pub fn source_id(&self) -> u16 {
        (self.index >> 48) as u16
    }

    /// Whether the venue code fits the 7-bit exchange table.
    #[inline]
    pub fn has_valid_exchange(&self) -> bool {
        usize::from(self.exchange_code) < EXCHANGE_COUNT
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} {:?} {:?} {}@{}",
            self.symbol,
            self.index,
            self.side,
            self.scope,
            from_fixed_trimmed(self.size),
            from_fixed_trimmed(self.price),
        )?;
        if self.exchange_code != 0 {
            write!(f, " ex={}", char::from(self.exchange_code))?;
        }
        if !self.market_maker.is_empty() {
            write!(f, " mm={}", self.market_maker)?;
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
