use crate::manager::ActionManager;
use crate::pool::DeferredPool;
use crate::target::Target;

/// Explicit engine context owning the action scheduler and the deferred
/// pool. One per engine (or per test) — there are no process-wide
/// singletons, so teardown order is testable and independent contexts can
/// coexist.
///
/// Field order matters for drop: the manager releases its action handles
/// before the pool force-clears.
pub struct Context {
    pub actions: ActionManager,
    pub pool: DeferredPool,
}

impl Context {
    pub fn new() -> Self {
        Self {
            actions: ActionManager::new(),
            pool: DeferredPool::new(),
        }
    }

    /// Per-frame entry point: advance every running action, then reclaim
    /// whatever the frame released.
    pub fn update(&mut self, dt: f32) {
        self.actions.update(dt);
        self.pool.flush();
    }

    /// Node-destruction path. Detaches every action bound to `target` before
    /// the caller drops its last handle, so nothing keeps a dangling
    /// back-reference, then flushes.
    pub fn destroy_target(&mut self, target: &dyn Target) {
        self.actions.clear_bound_to(target);
        self.pool.flush();
    }

    /// Deterministic teardown: stop the scheduler first, then force-clear
    /// the pool.
    pub fn shutdown(&mut self) {
        self.actions.clear_all();
        self.pool.clear();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
