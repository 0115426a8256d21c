// Copyright (c) 2025 RustyDB Contributors
//
// Concurrent optimistic skiplist priority queue.
//
// Lock-coupling, not lock-free: each node carries its own spinlock, and
// mutations take a bottom-up chain of predecessor locks, validate, then
// splice. Traversals are lock-free and hazard-pointer protected. This is
// Herlihy et al.'s "lazy" optimistic skiplist, adapted into a priority queue
// with FIFO tie-breaking on equal keys and two interchangeable extract-min
// strategies.

use std::ptr;
use std::sync::atomic::Ordering;

use tracing::trace;

use crate::config::{EmptyPolicy, ExtractStrategy, QueueConfig, Reclamation};
use crate::error::{QueueError, Result};
use crate::maybe_loom::{AtomicUsize, UnsafeCell};
use crate::sampler::{BinomialSampler, LevelSampler};

use super::hazard::HazardRegistry;
use super::node::{Node, SpinlockGuard};

/// The result of [`Queue::extract_min`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome<K, V> {
    Found { key: K, value: V },
    Empty,
}

/// Running counters, exposed the same way the rest of this codebase exposes
/// throughput stats for its concurrent structures. Advisory only: reading
/// them never blocks and never affects correctness.
#[derive(Debug, Default)]
pub struct QueueStats {
    pub inserts: usize,
    pub extracts: usize,
    pub retries: usize,
}

/// Per-thread scratch space for a traversal: the predecessor and successor
/// found at each level. Reused across calls to avoid an allocation per
/// `insert`/`extract_min`.
#[repr(align(64))]
struct ThreadScratch<K, V> {
    preds: UnsafeCell<Vec<*mut Node<K, V>>>,
    succs: UnsafeCell<Vec<*mut Node<K, V>>>,
}

// SAFETY: a scratch slot is only ever touched by its owning `tid`.
unsafe impl<K: Send, V: Send> Send for ThreadScratch<K, V> {}
unsafe impl<K: Send, V: Send> Sync for ThreadScratch<K, V> {}

impl<K, V> ThreadScratch<K, V> {
    fn new(max_level: usize) -> Self {
        Self {
            preds: UnsafeCell::new(vec![ptr::null_mut(); max_level]),
            succs: UnsafeCell::new(vec![ptr::null_mut(); max_level]),
        }
    }

    fn pred(&self, level: usize) -> *mut Node<K, V> {
        self.preds.with(|p| unsafe { (*p)[level] })
    }

    fn succ(&self, level: usize) -> *mut Node<K, V> {
        self.succs.with(|s| unsafe { (*s)[level] })
    }

    fn set_pred(&self, level: usize, node: *mut Node<K, V>) {
        self.preds.with_mut(|p| unsafe { (*p)[level] = node });
    }

    fn set_succ(&self, level: usize, node: *mut Node<K, V>) {
        self.succs.with_mut(|s| unsafe { (*s)[level] = node });
    }
}

/// A concurrent priority queue: a lock-coupled skiplist ordered by `K`,
/// with FIFO ordering among equal keys.
///
/// `tid` arguments across every method must be a stable identifier in
/// `[0, nthreads)`, fixed for the lifetime of the calling thread. There is
/// no dynamic thread registration.
pub struct Queue<K, V, S = BinomialSampler> {
    head: *mut Node<K, V>,
    tail: *mut Node<K, V>,
    max_level: usize,
    nthreads: usize,
    min_key: K,
    max_key: K,
    registry: HazardRegistry<K, V>,
    scratch: Box<[ThreadScratch<K, V>]>,
    sampler: S,
    config: QueueConfig<K>,
    inserts: AtomicUsize,
    extracts: AtomicUsize,
    retries: AtomicUsize,
}

// SAFETY: every field reachable from a `Queue<K, V, S>` is only ever mutated
// through the hazard/spinlock discipline implemented on `Node`, or through a
// `tid`-exclusive scratch slot.
unsafe impl<K: Send + Sync, V: Send, S: Send + Sync> Send for Queue<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send, S: Send + Sync> Sync for Queue<K, V, S> {}

impl<K, V> Queue<K, V, BinomialSampler>
where
    K: Ord + Copy + Send + Sync,
    V: Send,
{
    /// Build a queue using the default binomial(p = 0.5) level sampler.
    pub fn new(config: QueueConfig<K>) -> Result<Self> {
        Self::with_sampler(config, BinomialSampler)
    }
}

impl<K, V, S> Queue<K, V, S>
where
    K: Ord + Copy + Send + Sync,
    V: Send,
    S: LevelSampler,
{
    /// Build a queue with a caller-supplied level sampler.
    pub fn with_sampler(config: QueueConfig<K>, sampler: S) -> Result<Self> {
        config.validate()?;

        let max_level = config.max_level;
        let nthreads = config.nthreads;

        let head = Node::new(config.min_key, None, max_level - 1).into_raw();
        let tail = Node::new(config.max_key, None, max_level - 1).into_raw();

        // SAFETY: both nodes were just allocated; nothing else can observe
        // them until this function returns the `Queue`.
        unsafe {
            for level in 0..max_level {
                (*head).set_next(level, tail, Ordering::Relaxed);
            }
            (*head).fully_linked.store(true, Ordering::Release);
            (*tail).fully_linked.store(true, Ordering::Release);
        }

        let registry = HazardRegistry::new(nthreads, max_level);
        let scratch = (0..nthreads)
            .map(|_| ThreadScratch::new(max_level))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            head,
            tail,
            max_level,
            nthreads,
            min_key: config.min_key,
            max_key: config.max_key,
            registry,
            scratch,
            sampler,
            config,
            inserts: AtomicUsize::new(0),
            extracts: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
        })
    }

    fn check_tid(&self, tid: usize) -> Result<()> {
        if tid >= self.nthreads {
            return Err(QueueError::InvalidThreadId {
                tid,
                nthreads: self.nthreads,
            });
        }
        Ok(())
    }

    fn check_key(&self, key: K) -> Result<()> {
        if !(self.min_key < key && key < self.max_key) {
            return Err(QueueError::KeyOutOfBounds);
        }
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            extracts: self.extracts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Traverse every level from the top down, carrying `pred` across
    /// descents, sliding past any node whose key is `<= key` (this is what
    /// gives equal keys FIFO order: a later insert with the same key always
    /// lands after every earlier one). Fills `self.scratch[tid]` with the
    /// predecessor/successor found at each level.
    ///
    /// Returns the highest level at which a node with `key == key` was ever
    /// the *successor* at loop exit. Because the slide-past rule passes
    /// every node with key `<= key`, this is `-1` for any key already
    /// present in the queue: informational only, same as the original
    /// algorithm it's adapted from. Callers must re-validate under lock
    /// before mutating regardless.
    fn search(&self, key: K, tid: usize) -> isize {
        let scratch = &self.scratch[tid];

        'restart: loop {
            let mut pred = self.head;
            let mut l_found: isize = -1;

            for level in (0..self.max_level).rev() {
                let mut curr = match self
                    .registry
                    .protect_peek(tid, unsafe { (*pred).next_atomic(level) })
                {
                    Some(p) => p,
                    None => continue 'restart,
                };

                loop {
                    if key < unsafe { (*curr).key } {
                        break;
                    }
                    pred = self.registry.promote(tid, level);
                    curr = match self
                        .registry
                        .protect_peek(tid, unsafe { (*pred).next_atomic(level) })
                    {
                        Some(p) => p,
                        None => continue 'restart,
                    };
                }

                if l_found == -1 && unsafe { (*curr).key } == key {
                    l_found = level as isize;
                }

                scratch.set_pred(level, pred);
                scratch.set_succ(level, curr);
            }

            return l_found;
        }
    }

    /// Like `search`, but walks toward a known node `target` instead of a
    /// key, recording only predecessors. Used by the search-coupled
    /// extract-min strategy to find `target`'s predecessors after it has
    /// already been claimed (marked).
    fn search_preds(&self, target: *mut Node<K, V>, top_level: usize, tid: usize) {
        let scratch = &self.scratch[tid];

        'restart: loop {
            let mut pred = self.head;

            for level in (0..=top_level).rev() {
                let mut curr = match self
                    .registry
                    .protect_peek(tid, unsafe { (*pred).next_atomic(level) })
                {
                    Some(p) => p,
                    None => continue 'restart,
                };

                while !ptr::eq(curr, target) {
                    pred = self.registry.promote(tid, level);
                    curr = match self
                        .registry
                        .protect_peek(tid, unsafe { (*pred).next_atomic(level) })
                    {
                        Some(p) => p,
                        None => continue 'restart,
                    };
                }

                scratch.set_pred(level, pred);
            }

            return;
        }
    }

    /// Insert `key`/`value`. Multiple inserts of the same key are ordered
    /// FIFO: each lands immediately after every earlier node with that key.
    pub fn insert(&self, key: K, value: V, tid: usize) -> Result<()> {
        self.check_tid(tid)?;
        self.check_key(key)?;

        let top_level = self.sampler.sample(tid, self.max_level);
        let scratch = &self.scratch[tid];
        let mut value = Some(value);

        loop {
            self.search(key, tid);

            let mut guards: Vec<SpinlockGuard<'_>> = Vec::with_capacity(top_level + 1);
            let mut prev: *mut Node<K, V> = ptr::null_mut();
            let mut valid = true;

            for level in 0..=top_level {
                let pred = scratch.pred(level);
                let succ = scratch.succ(level);
                if !ptr::eq(pred, prev) {
                    guards.push(unsafe { (*pred).lock() });
                    prev = pred;
                }

                valid = unsafe {
                    !(*pred).marked.load(Ordering::Acquire)
                        && !(*succ).marked.load(Ordering::Acquire)
                        && ptr::eq((*pred).next(level, Ordering::Acquire), succ)
                };
                if !valid {
                    break;
                }
            }

            if !valid {
                drop(guards);
                self.registry.clear(tid);
                self.retries.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let new_node =
                Node::new(key, Some(value.take().expect("insert retried after consuming value")), top_level)
                    .into_raw();

            for level in 0..=top_level {
                unsafe { (*new_node).set_next(level, scratch.succ(level), Ordering::Relaxed) };
            }
            for level in 0..=top_level {
                let pred = scratch.pred(level);
                unsafe { (*pred).set_next(level, new_node, Ordering::Release) };
            }

            unsafe { (*new_node).fully_linked.store(true, Ordering::Release) };

            drop(guards);
            self.registry.clear(tid);
            self.inserts.fetch_add(1, Ordering::Relaxed);
            trace!(tid, top_level, "insert committed");
            return Ok(());
        }
    }

    /// Remove and return the minimum-keyed element, dispatching to
    /// whichever extract strategy this queue was configured with.
    pub fn extract_min(&self, tid: usize) -> Result<ExtractOutcome<K, V>> {
        self.check_tid(tid)?;
        match self.config.extract_strategy {
            ExtractStrategy::HeadCoupled => self.extract_min_head_coupled(tid),
            ExtractStrategy::SearchCoupled => self.extract_min_search_coupled(tid),
        }
    }

    /// Strategy A: splice only through `head`. Claim the node directly
    /// after `head` at level 0 by marking it, then relink `head`'s towers
    /// past it. If another thread has changed `head`'s level-0 successor in
    /// the meantime, roll the mark back and retry: this is the only
    /// strategy that ever un-marks a node.
    fn extract_min_head_coupled(&self, tid: usize) -> Result<ExtractOutcome<K, V>> {
        loop {
            let candidate = match self
                .registry
                .protect_peek(tid, unsafe { (*self.head).next_atomic(0) })
            {
                Some(p) => p,
                None => continue,
            };

            if ptr::eq(candidate, self.tail) {
                match self.config.empty_policy {
                    EmptyPolicy::ReturnEmpty => {
                        self.registry.clear(tid);
                        return Ok(ExtractOutcome::Empty);
                    }
                    EmptyPolicy::Block => {
                        std::hint::spin_loop();
                        continue;
                    }
                }
            }

            let fully_linked = unsafe { (*candidate).fully_linked.load(Ordering::Acquire) };
            let marked = unsafe { (*candidate).marked.load(Ordering::Acquire) };
            if !fully_linked || marked {
                continue;
            }

            let candidate_guard = unsafe { (*candidate).lock() };
            if unsafe { (*candidate).marked.load(Ordering::Acquire) } {
                drop(candidate_guard);
                continue;
            }
            unsafe { (*candidate).marked.store(true, Ordering::Release) };

            let head_guard = unsafe { (*self.head).lock() };
            if !ptr::eq(unsafe { (*self.head).next(0, Ordering::Acquire) }, candidate) {
                unsafe { (*candidate).marked.store(false, Ordering::Release) };
                drop(head_guard);
                drop(candidate_guard);
                self.retries.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let top_level = unsafe { (*candidate).top_level };
            for level in (0..=top_level).rev() {
                let next = unsafe { (*candidate).next(level, Ordering::Acquire) };
                unsafe { (*self.head).set_next(level, next, Ordering::Release) };
            }

            drop(head_guard);
            drop(candidate_guard);
            self.registry.clear(tid);

            let key = unsafe { (*candidate).key };
            let value = unsafe { (*candidate).take_value() };

            if let Reclamation::On = self.config.reclamation {
                self.registry.retire(tid, candidate);
            }

            self.extracts.fetch_add(1, Ordering::Relaxed);
            trace!(tid, "extract_min (head-coupled) committed");
            return Ok(ExtractOutcome::Found { key, value });
        }
    }

    /// Strategy B: walk level 0 from `head`, hop by hop, atomically
    /// claiming the first not-yet-marked node by CAS-ing its `marked` flag.
    /// Once claimed, find its predecessors at every level the ordinary way
    /// and splice it out like any other delete.
    fn extract_min_search_coupled(&self, tid: usize) -> Result<ExtractOutcome<K, V>> {
        loop {
            let mut pred_ptr = self.head;
            let candidate = loop {
                let node = match self
                    .registry
                    .protect_peek(tid, unsafe { (*pred_ptr).next_atomic(0) })
                {
                    Some(p) => p,
                    None => {
                        pred_ptr = self.head;
                        continue;
                    }
                };

                if ptr::eq(node, self.tail) {
                    match self.config.empty_policy {
                        EmptyPolicy::ReturnEmpty => {
                            self.registry.clear(tid);
                            return Ok(ExtractOutcome::Empty);
                        }
                        EmptyPolicy::Block => {
                            std::hint::spin_loop();
                            pred_ptr = self.head;
                            continue;
                        }
                    }
                }

                let claimed = unsafe {
                    (*node)
                        .marked
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                };
                if claimed {
                    break node;
                }
                pred_ptr = node;
            };

            while !unsafe { (*candidate).fully_linked.load(Ordering::Acquire) } {
                std::hint::spin_loop();
            }

            let candidate_guard = unsafe { (*candidate).lock() };
            let top_level = unsafe { (*candidate).top_level };

            loop {
                self.search_preds(candidate, top_level, tid);
                let scratch = &self.scratch[tid];

                let mut guards: Vec<SpinlockGuard<'_>> = Vec::with_capacity(top_level + 1);
                let mut prev: *mut Node<K, V> = ptr::null_mut();
                let mut valid = true;

                for level in 0..=top_level {
                    let pred = scratch.pred(level);
                    if !ptr::eq(pred, prev) {
                        guards.push(unsafe { (*pred).lock() });
                        prev = pred;
                    }
                    valid = unsafe {
                        ptr::eq((*pred).next(level, Ordering::Acquire), candidate)
                            && !(*pred).marked.load(Ordering::Acquire)
                    };
                    if !valid {
                        break;
                    }
                }

                if !valid {
                    drop(guards);
                    self.registry.clear(tid);
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                for level in 0..=top_level {
                    let pred = scratch.pred(level);
                    let next = unsafe { (*candidate).next(level, Ordering::Acquire) };
                    unsafe { (*pred).set_next(level, next, Ordering::Release) };
                }

                drop(guards);
                break;
            }

            drop(candidate_guard);
            self.registry.clear(tid);

            let key = unsafe { (*candidate).key };
            let value = unsafe { (*candidate).take_value() };

            if let Reclamation::On = self.config.reclamation {
                self.registry.retire(tid, candidate);
            }

            self.extracts.fetch_add(1, Ordering::Relaxed);
            trace!(tid, "extract_min (search-coupled) committed");
            return Ok(ExtractOutcome::Found { key, value });
        }
    }

    /// Extract the current minimum and insert `new_key`/`new_value` in its
    /// place, returning the extracted value. Under `EmptyPolicy::Block`
    /// (the default) this always succeeds; under `EmptyPolicy::ReturnEmpty`,
    /// calling `update` on an empty queue has no prior minimum to return and
    /// is reported as [`QueueError::EmptyQueue`] rather than silently
    /// dropping `new_key`/`new_value`.
    pub fn update(&self, new_key: K, new_value: V, tid: usize) -> Result<V> {
        self.check_tid(tid)?;
        self.check_key(new_key)?;

        match self.extract_min(tid)? {
            ExtractOutcome::Found { value, .. } => {
                self.insert(new_key, new_value, tid)?;
                Ok(value)
            }
            ExtractOutcome::Empty => Err(QueueError::EmptyQueue),
        }
    }
}

impl<K, V, S> Drop for Queue<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other reference to this queue can be
        // live, so every node is unreachable from anywhere but this chain.
        unsafe {
            let mut curr = (*self.head).next(0, Ordering::Relaxed);
            while !ptr::eq(curr, self.tail) {
                let next = (*curr).next(0, Ordering::Relaxed);
                drop(Box::from_raw(curr));
                curr = next;
            }
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
        self.registry.reclaim_all();
    }
}
