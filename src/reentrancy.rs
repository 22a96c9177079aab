//! Debug-only relock detection.
//!
//! The table lock is not recursive: a thread that calls `lock()` while it
//! already holds the guard blocks forever. In debug builds the lock records
//! its holder so that second call panics with a message instead. In release
//! builds this compiles to a zero-sized no-op.

#[cfg(not(debug_assertions))]
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use std::thread::{self, ThreadId};

/// Per-lock holder record. Embed next to the mutex it describes and call
/// `check_relock` before blocking, `enter` once the lock is held.
#[derive(Debug, Default)]
pub struct DebugLockOwner {
    #[cfg(debug_assertions)]
    holder: parking_lot::Mutex<Option<ThreadId>>,
}

impl DebugLockOwner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics in debug builds if the calling thread already holds the lock.
    #[inline]
    pub fn check_relock(&self) {
        #[cfg(debug_assertions)]
        {
            let me = thread::current().id();
            assert!(
                *self.holder.lock() != Some(me),
                "relock detected: this thread already holds the table lock"
            );
        }
    }

    /// Record the calling thread as holder until the returned mark drops.
    #[inline]
    pub fn enter(&self) -> OwnerMark<'_> {
        #[cfg(debug_assertions)]
        {
            *self.holder.lock() = Some(thread::current().id());
            return OwnerMark { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return OwnerMark { _z: PhantomData };
        }
    }
}

/// RAII mark returned by `DebugLockOwner::enter`. Must drop before the
/// mutex guard it accompanies.
pub struct OwnerMark<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugLockOwner,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for OwnerMark<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            *self.owner.holder.lock() = None;
        }
    }
}
