use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

// ---------------------------------------------------------------------------
// RefCount — intrusive reference count
// ---------------------------------------------------------------------------

/// Intrusive reference count embedded in every pool-managed object.
///
/// The count itself is atomic so that a producer on another thread may drop
/// its reference concurrently with a pool scan on the owning thread. All
/// destructive work (actually freeing the object) stays on the owning thread,
/// inside [`DeferredPool::flush`](crate::pool::DeferredPool::flush).
pub struct RefCount {
    strong: AtomicI32,
    /// Dirty flag shared with the owning pool; set on every release so the
    /// next flush reconsiders the pool. Installed once, at allocation.
    signal: OnceLock<Arc<AtomicBool>>,
}

impl RefCount {
    pub fn new() -> Self {
        Self {
            strong: AtomicI32::new(0),
            signal: OnceLock::new(),
        }
    }

    /// Current count. Zero means nothing owns the object and the next flush
    /// will reclaim it.
    pub fn count(&self) -> i32 {
        self.strong.load(Ordering::Acquire)
    }

    /// Increments the count by one. Never fails.
    pub fn retain(&self) {
        self.strong.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the count by one and marks the owning pool dirty.
    ///
    /// Never destroys anything synchronously — reclamation is deferred to the
    /// pool flush, so releasing is safe from anywhere, including while the
    /// pool or the action manager is mid-iteration.
    pub fn release(&self) {
        let prev = self.strong.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "release() without a matching retain()");
        if let Some(dirty) = self.signal.get() {
            dirty.store(true, Ordering::Release);
        }
    }

    pub(crate) fn attach_signal(&self, dirty: Arc<AtomicBool>) {
        let _ = self.signal.set(dirty);
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Managed — participation in deferred collection
// ---------------------------------------------------------------------------

/// Anything that can be shared through a [`Handle`] and reclaimed by the
/// [`DeferredPool`](crate::pool::DeferredPool). Implementors embed a
/// [`RefCount`] and return it here.
pub trait Managed {
    fn refs(&self) -> &RefCount;
}

// ---------------------------------------------------------------------------
// Handle<T> — owning smart handle
// ---------------------------------------------------------------------------

/// Owning handle over a pool-managed object.
///
/// Constructing or cloning a handle retains the referent; dropping it
/// releases. Moving a handle transfers ownership without touching the count.
/// A handle is always non-null — an optional binding is `Option<Handle<T>>`,
/// and dereferencing an absent one is an `expect` failure at the use site
/// rather than a silent null.
///
/// `Handle` is deliberately not `Send`: all destructive work happens on the
/// thread that owns the pool.
pub struct Handle<T: ?Sized + Managed> {
    ptr: NonNull<T>,
    /// Teardown flag shared with the owning pool. While it is set the pool is
    /// force-destroying its members in arbitrary order, so a dropping handle
    /// must not touch its referent at all.
    teardown: Arc<AtomicBool>,
}

impl<T: ?Sized + Managed> Handle<T> {
    /// Wraps `ptr` and takes one reference on it. `teardown` is the owning
    /// pool's force-clear flag.
    pub(crate) fn retained(ptr: NonNull<T>, teardown: Arc<AtomicBool>) -> Self {
        // SAFETY: callers pass pointers to live pool-managed objects.
        unsafe { ptr.as_ref() }.refs().retain();
        Self { ptr, teardown }
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub(crate) fn teardown_flag(&self) -> Arc<AtomicBool> {
        self.teardown.clone()
    }

    /// Identity comparison: do both handles refer to the same object?
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        std::ptr::addr_eq(a.ptr.as_ptr(), b.ptr.as_ptr())
    }

    /// Does this handle refer to exactly `candidate`?
    pub fn refers_to(&self, candidate: &T) -> bool {
        std::ptr::addr_eq(self.ptr.as_ptr(), candidate as *const T)
    }
}

impl<T: ?Sized + Managed> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self::retained(self.ptr, self.teardown.clone())
    }
}

impl<T: ?Sized + Managed> Drop for Handle<T> {
    fn drop(&mut self) {
        // During a force-clear the referent may already be destroyed — a
        // composite's drop glue drops handles to siblings the pool freed a
        // moment earlier. The pool reclaims every member itself in that mode,
        // so the release is skipped entirely rather than written into freed
        // memory.
        if self.teardown.load(Ordering::Acquire) {
            return;
        }
        // SAFETY: outside teardown the pool never frees an object whose count
        // is above zero, and this handle still holds one reference until the
        // release below.
        unsafe { self.ptr.as_ref() }.refs().release();
    }
}

impl<T: ?Sized + Managed> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handle").field(&self.ptr).finish()
    }
}

impl<T: ?Sized + Managed> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: same argument as in `drop` — a live handle keeps the count
        // above zero, so the referent has not been reclaimed.
        unsafe { self.ptr.as_ref() }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DeferredPool;

    struct Probe {
        refs: RefCount,
    }

    impl Probe {
        fn new() -> Self {
            Self { refs: RefCount::new() }
        }
    }

    impl Managed for Probe {
        fn refs(&self) -> &RefCount {
            &self.refs
        }
    }

    #[test]
    fn alloc_starts_with_one_reference() {
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new());
        assert_eq!(h.refs().count(), 1);
    }

    #[test]
    fn clone_retains_and_drop_releases() {
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new());
        let dup = h.clone();
        assert_eq!(h.refs().count(), 2);
        drop(dup);
        assert_eq!(h.refs().count(), 1);
    }

    #[test]
    fn balanced_retain_release_restores_count() {
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new());
        let initial = h.refs().count();
        for _ in 0..5 {
            h.refs().retain();
        }
        for _ in 0..5 {
            h.refs().release();
        }
        assert_eq!(h.refs().count(), initial);
    }

    #[test]
    fn move_does_not_change_count() {
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new());
        let moved = h;
        assert_eq!(moved.refs().count(), 1);
    }

    #[test]
    fn ptr_eq_distinguishes_objects() {
        let mut pool = DeferredPool::new();
        let a = pool.alloc(Probe::new());
        let b = pool.alloc(Probe::new());
        assert!(Handle::ptr_eq(&a, &a.clone()));
        assert!(!Handle::ptr_eq(&a, &b));
        assert!(a.refers_to(&a));
        assert!(!a.refers_to(&b));
    }
}
