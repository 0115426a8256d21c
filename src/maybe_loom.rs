// Copyright (c) 2025 RustyDB Contributors
//
// Swaps the atomics and interior-mutability primitives used by the hazard
// registry and skiplist engine for loom's model-checked equivalents when
// running under `RUSTFLAGS="--cfg loom" cargo test`. Everywhere else in the
// crate imports these from here instead of `std`, so the same code that runs
// in production is what loom explores.

#![expect(unexpected_cfgs, reason = "used for loom model-checking runs")]

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize};
#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize};

#[cfg(not(loom))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);

// SAFETY: matches loom::cell::UnsafeCell, which is also unconditionally
// Sync: callers are responsible for not racing `with`/`with_mut` closures.
#[cfg(not(loom))]
unsafe impl<T> Sync for UnsafeCell<T> {}

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub(crate) fn new(data: T) -> Self {
        Self(std::cell::UnsafeCell::new(data))
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        f(self.0.get())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}
