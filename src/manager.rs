use log::{debug, warn};

use crate::action::{Action, ActionError, ActionState};
use crate::managed::Handle;
use crate::target::Target;

// ---------------------------------------------------------------------------
// ActionManager — the per-frame scheduler
// ---------------------------------------------------------------------------

/// Owns the set of live actions and advances them once per frame.
///
/// One `Vec` is the single source of truth; the "running" subset and the
/// name/target lookups are derived by filtering it, never stored separately.
/// Actions leave the set when they finish, are stopped, or their target is
/// destroyed — the manager's handle is dropped and the deferred pool reclaims
/// the action at the next flush if nothing else owns it.
pub struct ActionManager {
    live: Vec<Handle<Action>>,
    /// When set, the next update consumes its delta as zero. See
    /// [`reset_timing`](ActionManager::reset_timing).
    drop_next_delta: bool,
}

impl ActionManager {
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            drop_next_delta: false,
        }
    }

    /// Binds `action` to `target` and adds it to the live set, running or
    /// paused per `start_paused`. Starting an action that is already live is
    /// a silent no-op — re-starting a running action has no defined meaning.
    /// Bind conflicts surface to the caller and leave the manager unchanged.
    pub fn start(
        &mut self,
        action: Handle<Action>,
        target: Handle<dyn Target>,
        start_paused: bool,
    ) -> Result<(), ActionError> {
        if self.live.iter().any(|a| Handle::ptr_eq(a, &action)) {
            return Ok(());
        }
        action.bind(target)?;
        if start_paused {
            action.pause();
        }
        self.live.push(action);
        Ok(())
    }

    /// Advances every running action by `dt`, then detaches and releases the
    /// finished ones. Actions started during the pass wait for the next
    /// frame; no action is visited twice or skipped within one call.
    ///
    /// Never panics: a malformed action (running without a target) is
    /// stopped and logged rather than aborting the frame.
    pub fn update(&mut self, dt: f32) {
        let dt = if self.drop_next_delta {
            self.drop_next_delta = false;
            0.0
        } else {
            dt
        };
        let pass = self.live.len();
        for action in &self.live[..pass] {
            if action.state() == ActionState::Running && !action.has_target() {
                warn!("action `{}` is running without a target; stopping it", action.name());
                action.stop();
                continue;
            }
            action.update(dt);
        }
        self.live.retain(|a| a.state() != ActionState::Finished);
    }

    /// Discard the next frame's delta. Call after an engine-wide pause so
    /// actions do not receive one huge catch-up step.
    pub fn reset_timing(&mut self) {
        self.drop_next_delta = true;
    }

    // -- Bulk control by name ----------------------------------------------

    /// Pauses every live action named `name`. Matching nothing is fine.
    pub fn pause_named(&mut self, name: &str) {
        for action in self.live.iter().filter(|a| a.name() == name) {
            action.pause();
        }
    }

    pub fn resume_named(&mut self, name: &str) {
        for action in self.live.iter().filter(|a| a.name() == name) {
            action.resume();
        }
    }

    /// Stops and releases every live action named `name`.
    pub fn stop_named(&mut self, name: &str) {
        for action in self.live.iter().filter(|a| a.name() == name) {
            action.stop();
        }
        self.reap();
    }

    /// Fresh handles to every live action named `name`.
    pub fn find_named(&self, name: &str) -> Vec<Handle<Action>> {
        self.live
            .iter()
            .filter(|a| a.name() == name)
            .cloned()
            .collect()
    }

    // -- Bulk control by bound target --------------------------------------

    pub fn pause_bound_to(&mut self, target: &dyn Target) {
        for action in self.live.iter().filter(|a| a.is_bound_to(target)) {
            action.pause();
        }
    }

    pub fn resume_bound_to(&mut self, target: &dyn Target) {
        for action in self.live.iter().filter(|a| a.is_bound_to(target)) {
            action.resume();
        }
    }

    pub fn stop_bound_to(&mut self, target: &dyn Target) {
        for action in self.live.iter().filter(|a| a.is_bound_to(target)) {
            action.stop();
        }
        self.reap();
    }

    /// Node-destruction hook: detaches and releases every action bound to
    /// `target`. Must run before the target is freed so no action keeps a
    /// dangling back-reference; afterwards no update ever touches `target`.
    pub fn clear_bound_to(&mut self, target: &dyn Target) {
        let before = self.live.len();
        for action in self.live.iter().filter(|a| a.is_bound_to(target)) {
            action.stop();
        }
        self.reap();
        let cleared = before - self.live.len();
        if cleared > 0 {
            debug!("cleared {cleared} action(s) bound to a destroyed target");
        }
    }

    /// Teardown: force-stops and releases every live action. Safe on an
    /// empty set.
    pub fn clear_all(&mut self) {
        for action in &self.live {
            action.stop();
        }
        let n = self.live.len();
        self.live.clear();
        if n > 0 {
            debug!("cleared all {n} live action(s)");
        }
    }

    // -- Introspection ------------------------------------------------------

    /// Size of the live set, paused actions included.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of live actions currently in the Running state.
    pub fn running(&self) -> usize {
        self.live
            .iter()
            .filter(|a| a.state() == ActionState::Running)
            .count()
    }

    /// Drops the manager's handle on every finished action.
    fn reap(&mut self) {
        self.live.retain(|a| a.state() != ActionState::Finished);
    }
}

impl Default for ActionManager {
    fn default() -> Self {
        Self::new()
    }
}
