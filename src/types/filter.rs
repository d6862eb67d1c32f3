//! Scope filter: which quote scopes are eligible to be shown at all.
//!
//! A scope excluded by the filter is treated as absent for override
//! purposes, so it can neither show up nor hide anything.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::BookError;
use crate::types::Scope;

/// Set of scopes eligible to be checked, stored as a 4-bit mask.
///
/// ```
/// use orderbook_model::types::{Scope, ScopeFilter};
///
/// let filter: ScopeFilter = "composite,regional".parse().unwrap();
/// assert!(filter.allows(Scope::Regional));
/// assert!(!filter.allows(Scope::Order));
/// assert_eq!(ScopeFilter::ALL.to_string(), "all");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ScopeFilter(u8);

impl ScopeFilter {
    pub const COMPOSITE: ScopeFilter = ScopeFilter(1);
    pub const REGIONAL: ScopeFilter = ScopeFilter(1 << 1);
    pub const AGGREGATE: ScopeFilter = ScopeFilter(1 << 2);
    pub const ORDER: ScopeFilter = ScopeFilter(1 << 3);
    pub const COMPOSITE_REGIONAL: ScopeFilter = ScopeFilter(0b0011);
    pub const COMPOSITE_REGIONAL_AGGREGATE: ScopeFilter = ScopeFilter(0b0111);
    pub const ALL: ScopeFilter = ScopeFilter(0b1111);

    /// Filter allowing exactly the given scopes.
    pub fn from_scopes(scopes: &[Scope]) -> Self {
        scopes.iter().fold(ScopeFilter(0), |acc, &scope| acc.with(scope))
    }

    /// This filter with `scope` added.
    pub fn with(self, scope: Scope) -> Self {
        ScopeFilter(self.0 | Self::bit(scope))
    }

    /// Whether orders of `scope` may be checked.
    #[inline]
    pub fn allows(self, scope: Scope) -> bool {
        self.0 & Self::bit(scope) != 0
    }

    /// Whether no scope at all is allowed.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn bit(scope: Scope) -> u8 {
        1 << scope.to_u8()
    }
}

impl Default for ScopeFilter {
    fn default() -> Self {
        ScopeFilter::ALL
    }
}

impl FromStr for ScopeFilter {
    type Err = BookError;

    /// Parses `all` or a comma separated list of scope names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(ScopeFilter::ALL);
        }
        let mut filter = ScopeFilter(0);
        for name in s.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let scope = Scope::ALL
                .into_iter()
                .find(|scope| scope.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| BookError::invalid(format!("unknown scope in filter: {name}")))?;
            filter = filter.with(scope);
        }
        if filter.is_empty() {
            return Err(BookError::invalid("filter allows no scope"));
        }
        Ok(filter)
    }
}

impl TryFrom<String> for ScopeFilter {
    type Error = BookError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ScopeFilter::ALL {
            return f.write_str("all");
        }
        let names: Vec<&str> = Scope::ALL
            .into_iter()
            .filter(|&scope| self.allows(scope))
            .map(Scope::name)
            .collect();
        f.write_str(&names.join(","))
    }
}
