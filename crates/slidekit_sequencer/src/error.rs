// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequencer errors.

use crate::effect::EffectId;
use slidekit_timing::{GroupId, NodeId, TreeError};
use thiserror::Error;

/// Errors raised while editing sequences
#[derive(Debug, Error)]
pub enum SequencerError {
    /// Structural tree error
    #[error("Timing tree error: {0}")]
    Tree(#[from] TreeError),

    /// Effect is not part of the sequence
    #[error("Effect not found: {0:?}")]
    EffectNotFound(EffectId),

    /// Text group is not part of the sequence
    #[error("Text group not found: {0:?}")]
    GroupNotFound(GroupId),

    /// Node lacks a capability the operation needs
    #[error("Node {node:?} is not {expected}")]
    MissingCapability {
        /// Offending node
        node: NodeId,
        /// What the node should have been
        expected: &'static str,
    },

    /// Node has no parent where one is required
    #[error("Node is not attached: {0:?}")]
    Detached(NodeId),

    /// Sequence has no root node yet
    #[error("Sequence has no root node")]
    NoRoot,

    /// Config could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Config could not be written
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] ron::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sequencer result type
pub type Result<T> = std::result::Result<T, SequencerError>;

/// Log a failed edit and swallow it.
///
/// Public mutators are failure boundaries: a broken node must never abort a
/// user edit, so errors end here as warnings.
pub(crate) fn warn_on_err<T>(context: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("{}: {}", context, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_on_err_passes_values() {
        assert_eq!(warn_on_err("ok", Ok(3)), Some(3));
        let failed: Result<u32> = Err(SequencerError::NoRoot);
        assert_eq!(warn_on_err("failed", failed), None);
    }

    #[test]
    fn test_tree_error_conversion() {
        let node = NodeId::new();
        let err: SequencerError = TreeError::NotAContainer(node).into();
        assert!(matches!(err, SequencerError::Tree(TreeError::NotAContainer(n)) if n == node));
        assert!(err.to_string().starts_with("Timing tree error"));
    }
}
