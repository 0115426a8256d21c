// Copyright (c) 2025 RustyDB Contributors
//
// Skiplist node layout.
//
// A node's tower width is fixed at creation (`top_level + 1` levels) and
// never resized. `marked` and `fully_linked` are read without holding the
// node's lock; every other field is only ever written while `lock` is held.

use std::ptr;
use std::sync::atomic::Ordering;

use crate::concurrent::Backoff;
use crate::maybe_loom::{AtomicBool, AtomicPtr, UnsafeCell};

/// A skiplist node.
///
/// `value` is taken exactly once, by whichever thread successfully extracts
/// this node as the minimum; every other access only ever touches `key`.
#[repr(align(64))]
pub struct Node<K, V> {
    pub(crate) key: K,
    value: UnsafeCell<Option<V>>,
    pub(crate) top_level: usize,
    nexts: Box<[AtomicPtr<Node<K, V>>]>,
    pub(crate) marked: AtomicBool,
    pub(crate) fully_linked: AtomicBool,
    lock: Spinlock,
}

// SAFETY: `nexts` and `value` are only ever mutated under `lock` (or, for
// `value`, exactly once by the single extracting thread), and `marked`/
// `fully_linked` are plain atomics. A node is always accessed through a
// hazard-protected raw pointer, never through a borrowed `&Node` that
// outlives its protection.
unsafe impl<K: Send, V: Send> Send for Node<K, V> {}
unsafe impl<K: Sync, V: Send> Sync for Node<K, V> {}

impl<K, V> Node<K, V> {
    /// Allocate a node with `top_level + 1` tower slots, all initially
    /// pointing at null. Callers are responsible for linking it in and
    /// setting `fully_linked`.
    pub(crate) fn new(key: K, value: Option<V>, top_level: usize) -> Self {
        let nexts = (0..=top_level)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            key,
            value: UnsafeCell::new(value),
            top_level,
            nexts,
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(false),
            lock: Spinlock::new(),
        }
    }

    /// Box the node and leak it to a raw pointer for insertion into the
    /// skiplist. Ownership transfers to whichever mechanism later frees it
    /// (the hazard registry's reclamation, or `Queue`'s teardown).
    pub(crate) fn into_raw(self) -> *mut Node<K, V> {
        Box::into_raw(Box::new(self))
    }

    pub(crate) fn next(&self, level: usize, order: Ordering) -> *mut Node<K, V> {
        self.nexts[level].load(order)
    }

    pub(crate) fn set_next(&self, level: usize, node: *mut Node<K, V>, order: Ordering) {
        self.nexts[level].store(node, order);
    }

    pub(crate) fn next_atomic(&self, level: usize) -> &AtomicPtr<Node<K, V>> {
        &self.nexts[level]
    }

    pub(crate) fn lock(&self) -> SpinlockGuard<'_> {
        self.lock.lock()
    }

    /// Take the node's value. Panics if called twice on the same node: the
    /// engine guarantees exactly one extracting thread ever calls this.
    pub(crate) fn take_value(&self) -> V {
        self.value
            .with_mut(|v| unsafe { (*v).take() })
            .expect("Node::take_value called more than once")
    }
}

/// A simple test-and-test-and-set spinlock, backed by the skiplist's
/// exponential-backoff/yield strategy rather than a raw busy loop.
pub(crate) struct Spinlock {
    locked: AtomicBool,
}

impl Spinlock {
    pub(crate) fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub(crate) fn lock(&self) -> SpinlockGuard<'_> {
        let mut backoff = Backoff::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
        SpinlockGuard { lock: self }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

pub(crate) struct SpinlockGuard<'a> {
    lock: &'a Spinlock,
}

impl Drop for SpinlockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
