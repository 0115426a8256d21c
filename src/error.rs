// Copyright (c) 2025 RustyDB Contributors
//
// Error types for the concurrent priority queue.

use thiserror::Error;

/// Errors returned by [`crate::Queue`] entry points.
///
/// These correspond to the specification's "invariant violation" and
/// "degenerate configuration" error kinds. Resource exhaustion (allocation
/// failure) is not represented here: it surfaces as the ordinary global
/// allocator abort, the same as anywhere else in the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("thread id {tid} out of range [0, {nthreads})")]
    InvalidThreadId { tid: usize, nthreads: usize },

    #[error("key is out of the queue's sentinel bounds")]
    KeyOutOfBounds,

    #[error("max_level must be at least 1")]
    InvalidMaxLevel,

    #[error("nthreads must be at least 1")]
    InvalidThreadCount,

    #[error("update() has no prior minimum to return: the queue was empty under ReturnEmpty policy")]
    EmptyQueue,
}

pub type Result<T> = std::result::Result<T, QueueError>;
