//! Recoverable failures reported by the containers and the dispatch layer.

use core::any::TypeId;

use thiserror::Error;

use crate::list::ListMode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A keyed lookup or removal did not find the key.
    #[error("key not found")]
    NotFound,

    /// A node or entry handle no longer refers to a live element.
    #[error("stale handle: the element was removed")]
    StaleNode,

    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("range {from}..{to} is invalid for length {len}")]
    InvalidRange { from: usize, to: usize, len: usize },

    /// In-place mutation requires the caller to be the only owner.
    #[error("value is shared (refcount {refcount}); mutation needs a unique owner")]
    Shared { refcount: usize },

    /// Two lists with different storage modes cannot exchange nodes.
    #[error("cannot move nodes of a {src:?} list into a {dst:?} list")]
    ModeMismatch { dst: ListMode, src: ListMode },

    #[error("no {capability} capability registered for {type_id:?}")]
    NoCapability {
        capability: &'static str,
        type_id: TypeId,
    },
}

pub type Result<T, E = RuntimeError> = core::result::Result<T, E>;
