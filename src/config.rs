//! Book configuration loaded from environment variables.
//!
//! Every field is read from an `ORDERBOOK_`-prefixed variable:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `ORDERBOOK_SYMBOL` | none | symbol to subscribe to |
//! | `ORDERBOOK_FILTER` | `all` | scopes eligible to be shown |
//! | `ORDERBOOK_LOT_SIZE` | `1` | multiplier for non-individual sizes |
//! | `ORDERBOOK_CORRECT` | `false` | run the aggregate quote corrector |
//! | `ORDERBOOK_KEEP_TTL_SECS` | `86400` | corrector keep window |
//! | `ORDERBOOK_FLIP_TTL_SECS` | `60` | corrector bid/ask flip window |
//! | `ORDERBOOK_SIZE_LIMIT` | none | maximum number of tracked orders |

use std::time::Duration;

use serde::Deserialize;

use crate::engine::CorrectionSettings;
use crate::error::{BookError, Result};
use crate::types::ScopeFilter;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ORDERBOOK_";

/// Book configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookConfig {
    /// Symbol to subscribe to on start.
    #[serde(default)]
    pub symbol: Option<String>,

    /// Scopes eligible to be shown, e.g. `all` or `composite,regional`.
    #[serde(default)]
    pub filter: ScopeFilter,

    /// Multiplier applied to composite, regional and aggregate sizes.
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,

    /// Run aggregate quotes through the corrector.
    #[serde(default)]
    pub correct: bool,

    /// Corrector keep window in seconds.
    #[serde(default = "default_keep_ttl_secs")]
    pub keep_ttl_secs: u64,

    /// Corrector flip window in seconds.
    #[serde(default = "default_flip_ttl_secs")]
    pub flip_ttl_secs: u64,

    /// Maximum number of tracked orders; unlimited when absent.
    #[serde(default)]
    pub size_limit: Option<usize>,
}

fn default_lot_size() -> u32 {
    1
}

fn default_keep_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_flip_ttl_secs() -> u64 {
    60
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            symbol: None,
            filter: ScopeFilter::ALL,
            lot_size: default_lot_size(),
            correct: false,
            keep_ttl_secs: default_keep_ttl_secs(),
            flip_ttl_secs: default_flip_ttl_secs(),
            size_limit: None,
        }
    }
}

impl BookConfig {
    /// Load from the process environment and validate.
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from explicit `(name, value)` pairs and validate.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the book refuses to run with.
    pub fn validate(&self) -> Result<()> {
        if self.lot_size == 0 {
            return Err(BookError::invalid("lot size must be at least 1"));
        }
        if self.filter.is_empty() {
            return Err(BookError::invalid("filter allows no scope"));
        }
        if self.symbol.as_deref().is_some_and(str::is_empty) {
            return Err(BookError::invalid("symbol is empty"));
        }
        Ok(())
    }

    pub fn keep_ttl(&self) -> Duration {
        Duration::from_secs(self.keep_ttl_secs)
    }

    pub fn flip_ttl(&self) -> Duration {
        Duration::from_secs(self.flip_ttl_secs)
    }

    /// Corrector settings, if correction is enabled.
    pub fn correction(&self) -> Option<CorrectionSettings> {
        self.correct.then(|| CorrectionSettings {
            keep_ttl: self.keep_ttl(),
            flip_ttl: self.flip_ttl(),
        })
    }
}
