//! Error types for the order book model.
//!
//! Structural errors abort the single operation and leave the book exactly
//! as it was before the call. Conditions that are part of normal flow
//! (deleting a removed node, unchecking an unchecked node, looking up a
//! missing key) are not errors and never show up here.

use thiserror::Error;

use crate::tree::NodeId;

/// Unified error type for the order book model.
#[derive(Error, Debug)]
pub enum BookError {
    /// Insert found a node with an equal key already in the tree.
    ///
    /// Means the caller broke the node identity/reuse discipline.
    #[error("duplicate key: node {node} collides with node {existing} already in the tree")]
    DuplicateKey {
        /// The node that was being inserted.
        node: NodeId,
        /// The node already holding the key.
        existing: NodeId,
    },

    /// Rejected before any state mutation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised by consistency validation only; indicates a bug in the tree
    /// or scope index, never bad input.
    #[error("state invariant violated: {0}")]
    StateInvariantViolation(String),

    /// A detached cursor observed a structural modification of its tree.
    #[error("concurrent modification: expected mod count {expected}, found {actual}")]
    ConcurrentModification {
        /// Modification counter captured when the cursor was created.
        expected: u64,
        /// Modification counter observed on the tree.
        actual: u64,
    },

    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),
}

impl BookError {
    /// Shorthand for [`BookError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        BookError::InvalidArgument(message.into())
    }

    /// Shorthand for [`BookError::StateInvariantViolation`].
    pub fn violation(message: impl Into<String>) -> Self {
        BookError::StateInvariantViolation(message.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BookError::DuplicateKey { node: 3, existing: 7 };
        assert_eq!(
            err.to_string(),
            "duplicate key: node 3 collides with node 7 already in the tree"
        );

        let err = BookError::invalid("lot size must be positive");
        assert_eq!(err.to_string(), "invalid argument: lot size must be positive");

        let err = BookError::ConcurrentModification { expected: 1, actual: 4 };
        assert!(err.to_string().contains("expected mod count 1"));
    }
}
