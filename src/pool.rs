use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{trace, warn};

use crate::managed::{Handle, Managed};

// ---------------------------------------------------------------------------
// DeferredPool — deferred-collection arena
// ---------------------------------------------------------------------------

/// Registry of objects awaiting reference-count-zero collection.
///
/// Every managed object is allocated through [`DeferredPool::alloc`], which
/// registers it here and hands back the single retaining [`Handle`]. Nothing
/// is freed when a count reaches zero; reclamation happens at the next
/// [`flush`](DeferredPool::flush), decoupling "count reached zero" from
/// "memory reclaimed" so releases are safe mid-iteration.
///
/// One pool per engine context. All flushing happens on the thread that owns
/// the scene; only the count decrement itself is cross-thread safe.
pub struct DeferredPool {
    entries: Vec<Entry>,
    /// Set by any release on a pooled object; cleared by flush.
    dirty: Arc<AtomicBool>,
    /// Raised for the span of [`clear`](DeferredPool::clear). Every handle
    /// carries a copy and refuses to release while it is set, since its
    /// referent may already be freed.
    tearing_down: Arc<AtomicBool>,
}

struct Entry {
    ptr: NonNull<dyn Managed>,
}

impl DeferredPool {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            dirty: Arc::new(AtomicBool::new(false)),
            tearing_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The deferred-allocation path: boxes `value`, registers it in the pool,
    /// and returns the one retaining handle (count = 1). Dropping every
    /// handle lets the next flush reclaim the object.
    pub fn alloc<T: Managed + 'static>(&mut self, value: T) -> Handle<T> {
        let raw: *mut T = Box::into_raw(Box::new(value));
        // SAFETY: `Box::into_raw` never returns null.
        let thin = unsafe { NonNull::new_unchecked(raw) };
        unsafe { thin.as_ref() }.refs().attach_signal(self.dirty.clone());
        // SAFETY: same pointer, unsized to the erased entry type.
        let erased = unsafe { NonNull::new_unchecked(raw as *mut dyn Managed) };
        self.entries.push(Entry { ptr: erased });
        Handle::retained(thin, self.tearing_down.clone())
    }

    /// Reclaims every pooled object whose count has dropped to zero.
    ///
    /// No-op unless something was released since the last flush. One O(n)
    /// scan; objects still owned are left untouched, so after a flush every
    /// remaining member has a positive count.
    pub fn flush(&mut self) {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|entry| {
            // SAFETY: pool entries stay valid until this pool destroys them.
            let alive = unsafe { entry.ptr.as_ref() }.refs().count() > 0;
            if !alive {
                // SAFETY: count ≤ 0 means no handle can reach the object any
                // more; the pool holds the only remaining pointer.
                drop(unsafe { Box::from_raw(entry.ptr.as_ptr()) });
            }
            alive
        });
        let reclaimed = before - self.entries.len();
        if reclaimed > 0 {
            trace!("pool flush reclaimed {reclaimed} of {before} object(s)");
        }
    }

    /// Teardown: force-destroys every pooled object regardless of its count.
    ///
    /// Callers must stop schedulers and drop scene references first — the
    /// one place this is wired up is `Context::shutdown`. Members are
    /// destroyed in arbitrary order relative to who owns whom, so for the
    /// span of the call the teardown flag is raised and every handle's drop
    /// becomes a no-op: a composite freed late must not release a sibling
    /// freed early.
    pub fn clear(&mut self) {
        self.tearing_down.store(true, Ordering::Release);
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            // SAFETY: entries are valid until destroyed here; after `clear`
            // no handle to them may be used again.
            let count = unsafe { entry.ptr.as_ref() }.refs().count();
            if count > 0 {
                warn!("force-clearing pooled object with {count} outstanding reference(s)");
            }
            drop(unsafe { Box::from_raw(entry.ptr.as_ptr()) });
        }
        self.tearing_down.store(false, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    /// Number of objects currently registered, reclaimable or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeferredPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredPool {
    fn drop(&mut self) {
        self.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managed::RefCount;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Flips a shared flag on drop so tests can observe destruction.
    struct Probe {
        refs: RefCount,
        alive: Rc<Cell<bool>>,
    }

    impl Probe {
        fn new(alive: Rc<Cell<bool>>) -> Self {
            alive.set(true);
            Self { refs: RefCount::new(), alive }
        }
    }

    impl Managed for Probe {
        fn refs(&self) -> &RefCount {
            &self.refs
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.alive.set(false);
        }
    }

    #[test]
    fn release_then_flush_destroys() {
        let alive = Rc::new(Cell::new(false));
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new(alive.clone()));
        drop(h);
        pool.flush();
        assert!(!alive.get());
        assert!(pool.is_empty());
    }

    #[test]
    fn retained_object_survives_flush() {
        let alive = Rc::new(Cell::new(false));
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new(alive.clone()));
        let dup = h.clone();
        drop(h);
        pool.flush();
        assert!(alive.get());
        assert_eq!(pool.len(), 1);
        drop(dup);
        pool.flush();
        assert!(!alive.get());
        assert!(pool.is_empty());
    }

    #[test]
    fn flush_is_noop_when_clean() {
        let mut pool = DeferredPool::new();
        let _h = pool.alloc(Probe::new(Rc::new(Cell::new(false))));
        // Nothing released since alloc: flush must not scan anything away.
        pool.flush();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn clear_force_destroys_everything() {
        let alive = Rc::new(Cell::new(false));
        let mut pool = DeferredPool::new();
        let h = pool.alloc(Probe::new(alive.clone()));
        // Leak the handle's reference on purpose: clear must still reclaim.
        std::mem::forget(h);
        pool.clear();
        assert!(!alive.get());
        assert!(pool.is_empty());
    }

    /// Owns a handle to another pooled object, like a composite action does.
    struct Holder {
        refs: RefCount,
        alive: Rc<Cell<bool>>,
        child: Handle<Probe>,
    }

    impl Holder {
        fn new(alive: Rc<Cell<bool>>, child: Handle<Probe>) -> Self {
            alive.set(true);
            Self { refs: RefCount::new(), alive, child }
        }
    }

    impl Managed for Holder {
        fn refs(&self) -> &RefCount {
            &self.refs
        }
    }

    impl Drop for Holder {
        fn drop(&mut self) {
            self.alive.set(false);
        }
    }

    /// Force-clear destroys members in registration order, so a holder's drop
    /// glue runs after its child is already gone. The child handle it still
    /// owns must not release into the freed object.
    #[test]
    fn clear_handles_members_that_own_each_other() {
        let child_alive = Rc::new(Cell::new(false));
        let holder_alive = Rc::new(Cell::new(false));
        let mut pool = DeferredPool::new();
        let child = pool.alloc(Probe::new(child_alive.clone()));
        let holder = pool.alloc(Holder::new(holder_alive.clone(), child.clone()));
        assert_eq!(holder.child.refs().count(), 2);
        drop(child);
        drop(holder);
        pool.clear();
        assert!(!child_alive.get());
        assert!(!holder_alive.get());
        assert!(pool.is_empty());
    }

    #[test]
    fn pool_is_reusable_after_clear() {
        let alive = Rc::new(Cell::new(false));
        let mut pool = DeferredPool::new();
        let first = pool.alloc(Probe::new(Rc::new(Cell::new(false))));
        drop(first);
        pool.clear();

        // Handles allocated afterwards release normally again.
        let h = pool.alloc(Probe::new(alive.clone()));
        drop(h);
        pool.flush();
        assert!(!alive.get());
        assert!(pool.is_empty());
    }

    #[test]
    fn clear_on_empty_pool_is_safe() {
        let mut pool = DeferredPool::new();
        pool.clear();
        pool.clear();
        assert!(pool.is_empty());
    }
}
