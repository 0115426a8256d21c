// Copyright (c) 2025 RustyDB Contributors
//
// Configuration for the concurrent priority queue.

use crate::error::{QueueError, Result};

/// Whether retired nodes are actually reclaimed.
///
/// `Off` is useful for isolating allocator/reclamation overhead in
/// benchmarks: nodes are unlinked as usual but never handed to the
/// allocator for freeing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reclamation {
    #[default]
    On,
    Off,
}

/// Which extract-min algorithm `Queue::extract_min` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractStrategy {
    /// Strategy A: splice only through `head`. Lowest per-op cost under
    /// modest contention.
    #[default]
    HeadCoupled,
    /// Strategy B: claim the candidate via an atomic mark swap, then run a
    /// generic predecessor search and splice it out like any other delete.
    SearchCoupled,
}

/// What `extract_min` does when the queue is observed empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyPolicy {
    /// Spin until an element becomes available.
    #[default]
    Block,
    /// Return `ExtractOutcome::Empty` immediately.
    ReturnEmpty,
}

/// Construction-time configuration for a [`crate::Queue`].
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig<K> {
    /// Bounds tower height; fixed for the queue's lifetime.
    pub max_level: usize,
    /// Upper bound on concurrent workers; also the size of the hazard
    /// registry and per-thread scratch space.
    pub nthreads: usize,
    /// Sentinel lower bound. All user keys must satisfy `min_key < key`.
    pub min_key: K,
    /// Sentinel upper bound. All user keys must satisfy `key < max_key`.
    pub max_key: K,
    pub reclamation: Reclamation,
    pub extract_strategy: ExtractStrategy,
    pub empty_policy: EmptyPolicy,
}

impl<K> QueueConfig<K> {
    /// Build a config with the spec's default `reclamation`/`extract_strategy`/
    /// `empty_policy`, given just the required sizing and bounds.
    pub fn new(max_level: usize, nthreads: usize, min_key: K, max_key: K) -> Self {
        Self {
            max_level,
            nthreads,
            min_key,
            max_key,
            reclamation: Reclamation::default(),
            extract_strategy: ExtractStrategy::default(),
            empty_policy: EmptyPolicy::default(),
        }
    }

    pub fn with_reclamation(mut self, reclamation: Reclamation) -> Self {
        self.reclamation = reclamation;
        self
    }

    pub fn with_extract_strategy(mut self, strategy: ExtractStrategy) -> Self {
        self.extract_strategy = strategy;
        self
    }

    pub fn with_empty_policy(mut self, policy: EmptyPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<()>
    where
        K: PartialOrd,
    {
        if self.max_level == 0 {
            return Err(QueueError::InvalidMaxLevel);
        }
        if self.nthreads == 0 {
            return Err(QueueError::InvalidThreadCount);
        }
        if !(self.min_key < self.max_key) {
            return Err(QueueError::KeyOutOfBounds);
        }
        Ok(())
    }
}
