// Copyright (c) 2025 RustyDB Contributors
//
// Hazard-pointer reclamation registry.
//
// Unlike a general-purpose hazard pointer scheme (one global, dynamically
// registering thread list), this registry is sized once at `Queue`
// construction to exactly `nthreads` records and indexed directly by the
// caller-supplied `tid`. There is no thread registration/deregistration
// protocol to race: a record's "peek" and "held" slots are only ever written
// by its owning thread, and its retired list is only ever pushed to or
// scanned by its owning thread. Other threads only ever *read* another
// record's peek/held slots, during `scan`.

use std::ptr;
use std::sync::atomic::Ordering;

use crate::concurrent::node::Node;
use crate::maybe_loom::{AtomicPtr, UnsafeCell};

/// One thread's hazard slots and retired list.
///
/// `peek` protects a pointer a thread has just read but not yet committed to
/// using; `held[level]` protects the predecessor this thread has settled on
/// at that level, for as long as it may still dereference it.
#[repr(align(64))]
struct ThreadRecord<K, V> {
    peek: AtomicPtr<Node<K, V>>,
    held: Box<[AtomicPtr<Node<K, V>>]>,
    retired: UnsafeCell<Vec<*mut Node<K, V>>>,
}

// SAFETY: `retired` is only ever touched by the owning `tid`; `peek`/`held`
// are plain atomics read cross-thread only by `scan`.
unsafe impl<K: Send, V: Send> Send for ThreadRecord<K, V> {}
unsafe impl<K: Send, V: Send> Sync for ThreadRecord<K, V> {}

impl<K, V> ThreadRecord<K, V> {
    fn new(max_level: usize) -> Self {
        Self {
            peek: AtomicPtr::new(ptr::null_mut()),
            held: (0..max_level)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            retired: UnsafeCell::new(Vec::new()),
        }
    }
}

/// Fixed-size, `tid`-indexed hazard pointer registry for a single [`crate::Queue`].
///
/// Reclamation proceeds in two phases, same as the classic scheme: a thread
/// accumulates unlinked nodes in its own retired list, and every
/// `retire_threshold` retirements it scans the union of every thread's
/// currently-protected pointers and frees whichever of its retired nodes
/// aren't in that set.
pub(crate) struct HazardRegistry<K, V> {
    records: Box<[ThreadRecord<K, V>]>,
    retire_threshold: usize,
}

impl<K, V> HazardRegistry<K, V> {
    pub(crate) fn new(nthreads: usize, max_level: usize) -> Self {
        Self {
            records: (0..nthreads)
                .map(|_| ThreadRecord::new(max_level))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            // A small multiple of nthreads bounds unreclaimed memory without
            // making every delete pay for a full scan.
            retire_threshold: (nthreads * 2).max(8),
        }
    }

    /// Read `cell`, publish the read in `tid`'s peek slot, and re-read `cell`
    /// to confirm it hasn't changed underneath. Returns `None` if it has:
    /// the caller should retry its traversal step.
    pub(crate) fn protect_peek(
        &self,
        tid: usize,
        cell: &AtomicPtr<Node<K, V>>,
    ) -> Option<*mut Node<K, V>> {
        let record = &self.records[tid];
        let first = cell.load(Ordering::Acquire);
        record.peek.store(first, Ordering::SeqCst);
        let second = cell.load(Ordering::Acquire);
        if !ptr::eq(first, second) {
            record.peek.store(ptr::null_mut(), Ordering::Release);
            return None;
        }
        Some(first)
    }

    /// Move whatever is in `tid`'s peek slot into `held[level]`, clearing
    /// peek. The pointer stays protected throughout: it's just tracked in a
    /// different slot.
    pub(crate) fn promote(&self, tid: usize, level: usize) -> *mut Node<K, V> {
        let record = &self.records[tid];
        let ptr = record.peek.load(Ordering::Acquire);
        record.held[level].store(ptr, Ordering::Release);
        record.peek.store(ptr::null_mut(), Ordering::Release);
        ptr
    }

    /// Zero every slot for `tid`. Called at the end of a traversal/critical
    /// section once the thread no longer needs any of its protected
    /// pointers.
    pub(crate) fn clear(&self, tid: usize) {
        let record = &self.records[tid];
        record.peek.store(ptr::null_mut(), Ordering::Release);
        for slot in record.held.iter() {
            slot.store(ptr::null_mut(), Ordering::Release);
        }
    }

    /// Hand `node` to `tid`'s retired list. If the list has grown past the
    /// threshold, scan.
    pub(crate) fn retire(&self, tid: usize, node: *mut Node<K, V>) {
        let record = &self.records[tid];
        let len = record.retired.with_mut(|retired| {
            let retired = unsafe { &mut *retired };
            retired.push(node);
            retired.len()
        });
        if len >= self.retire_threshold {
            self.scan(tid);
        }
    }

    /// Free every node in `tid`'s retired list that no thread currently has
    /// hazard-protected.
    pub(crate) fn scan(&self, tid: usize) {
        let mut protected: Vec<*mut Node<K, V>> = Vec::with_capacity(self.records.len() * 2);
        for record in self.records.iter() {
            let peek = record.peek.load(Ordering::Acquire);
            if !peek.is_null() {
                protected.push(peek);
            }
            for slot in record.held.iter() {
                let held = slot.load(Ordering::Acquire);
                if !held.is_null() {
                    protected.push(held);
                }
            }
        }
        protected.sort_unstable();
        protected.dedup();

        let record = &self.records[tid];
        record.retired.with_mut(|retired| {
            let retired = unsafe { &mut *retired };
            let mut i = 0;
            while i < retired.len() {
                let candidate = retired[i];
                if protected.binary_search(&candidate).is_ok() {
                    i += 1;
                } else {
                    retired.swap_remove(i);
                    // SAFETY: not in `protected`, so no thread can
                    // dereference it; it was only ever reachable through a
                    // hazard-protected read.
                    unsafe { drop(Box::from_raw(candidate)) };
                }
            }
        });
    }

    /// Free every still-retired node across every thread, ignoring
    /// protection. Only valid once every thread using this registry has
    /// quiesced, i.e. during `Queue` teardown.
    pub(crate) fn reclaim_all(&self) {
        for record in self.records.iter() {
            record.retired.with_mut(|retired| {
                let retired = unsafe { &mut *retired };
                for node in retired.drain(..) {
                    unsafe { drop(Box::from_raw(node)) };
                }
            });
        }
    }
}
