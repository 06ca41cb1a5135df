use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Vec2;
use thiserror::Error;

use crate::managed::{Handle, Managed, RefCount};
use crate::pool::DeferredPool;
use crate::target::Target;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of an action. `Initialized → Running → Finished`, with `Paused`
/// reachable from `Running` only. `Finished` is terminal — a finished action
/// can be cloned to run again, never resurrected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActionState {
    Initialized,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    /// Binding an action that already has a different live target.
    #[error("action is already bound to a different target")]
    AlreadyBound,
    /// Reversing an action without a well-defined algebraic inverse.
    #[error("`{0}` has no well-defined reverse")]
    NotInvertible(&'static str),
}

// ---------------------------------------------------------------------------
// Action kinds
// ---------------------------------------------------------------------------

type TweenFn = Rc<dyn Fn(&dyn Target, f32)>;

enum Kind {
    /// Translate by `delta` over the duration. `start` is the baseline
    /// captured at bind time and drift-corrected each tick; `prev` is the
    /// position this action last wrote.
    MoveBy {
        delta: Vec2,
        start: Cell<Vec2>,
        prev: Cell<Vec2>,
    },
    /// Additive scale change against the scale captured at bind time.
    ScaleBy { delta: Vec2, start: Cell<Vec2> },
    /// Additive rotation (radians) against the angle captured at bind time.
    RotateBy { delta: f32, start: Cell<f32> },
    /// Generic property tween: called with the target and normalized
    /// progress `t ∈ [0, 1]` once per tick.
    Tween { apply: TweenFn },
    /// Composite: run `child` to completion `times` times (forever when
    /// `None`), re-initializing it between runs.
    Repeat {
        child: Handle<Action>,
        times: Option<u32>,
        completed: Cell<u32>,
    },
    /// Composite: run children one after another, each bound lazily so its
    /// baseline reflects the target's state when its stage begins.
    Sequence {
        children: Vec<Handle<Action>>,
        index: Cell<usize>,
    },
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One time-based mutation of a [`Target`].
///
/// All mutation goes through `&self` — an action is shared between the
/// manager, composites, and whoever started it, so its state lives in cells.
/// Actions are created detached; [`bind`](Action::bind) attaches a target,
/// captures per-kind baselines, and starts the clock.
pub struct Action {
    refs: RefCount,
    name: String,
    duration: f32,
    elapsed: Cell<f32>,
    state: Cell<ActionState>,
    target: RefCell<Option<Handle<dyn Target>>>,
    kind: Kind,
}

impl Managed for Action {
    fn refs(&self) -> &RefCount {
        &self.refs
    }
}

impl Action {
    fn with_kind(duration: f32, kind: Kind) -> Self {
        Self {
            refs: RefCount::new(),
            name: String::new(),
            duration: duration.max(0.0),
            elapsed: Cell::new(0.0),
            state: Cell::new(ActionState::Initialized),
            target: RefCell::new(None),
            kind,
        }
    }

    // -- Constructors -------------------------------------------------------

    /// Translate the target by `delta` over `duration` seconds.
    pub fn move_by(duration: f32, delta: Vec2) -> Self {
        Self::with_kind(
            duration,
            Kind::MoveBy {
                delta,
                start: Cell::new(Vec2::ZERO),
                prev: Cell::new(Vec2::ZERO),
            },
        )
    }

    /// Change the target's scale by `delta` (additive, per axis).
    pub fn scale_by(duration: f32, delta: Vec2) -> Self {
        Self::with_kind(
            duration,
            Kind::ScaleBy {
                delta,
                start: Cell::new(Vec2::ZERO),
            },
        )
    }

    /// Rotate the target by `delta` radians over `duration` seconds.
    pub fn rotate_by(duration: f32, delta: f32) -> Self {
        Self::with_kind(
            duration,
            Kind::RotateBy {
                delta,
                start: Cell::new(0.0),
            },
        )
    }

    /// Generic property tween. `apply` receives the target and the
    /// normalized progress each tick. Not invertible.
    pub fn tween(duration: f32, apply: impl Fn(&dyn Target, f32) + 'static) -> Self {
        Self::with_kind(duration, Kind::Tween { apply: Rc::new(apply) })
    }

    /// Run `child` to completion `times` times, then finish. `times` is
    /// clamped to at least one: `repeat(child, 0)` behaves like running the
    /// child once.
    pub fn repeat(child: Handle<Action>, times: u32) -> Self {
        Self::with_kind(
            0.0,
            Kind::Repeat {
                child,
                times: Some(times.max(1)),
                completed: Cell::new(0),
            },
        )
    }

    /// Run `child` forever, re-initializing it after each completion. Never
    /// finishes on its own.
    pub fn repeat_forever(child: Handle<Action>) -> Self {
        Self::with_kind(
            0.0,
            Kind::Repeat {
                child,
                times: None,
                completed: Cell::new(0),
            },
        )
    }

    /// Run `children` one after another, then finish.
    pub fn sequence(children: Vec<Handle<Action>>) -> Self {
        Self::with_kind(
            0.0,
            Kind::Sequence {
                children,
                index: Cell::new(0),
            },
        )
    }

    /// Name used by the manager's bulk operations. May be empty or shared
    /// between actions.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    // -- Accessors ----------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ActionState {
        self.state.get()
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// The bound target, if any. Returns a fresh owning handle.
    pub fn target(&self) -> Option<Handle<dyn Target>> {
        self.target.borrow().clone()
    }

    /// Cheap bound-check that does not touch the reference count.
    pub fn has_target(&self) -> bool {
        self.target.borrow().is_some()
    }

    /// Is this action bound to exactly `candidate`?
    pub fn is_bound_to(&self, candidate: &dyn Target) -> bool {
        self.target
            .borrow()
            .as_ref()
            .is_some_and(|t| t.refers_to(candidate))
    }

    // -- State machine ------------------------------------------------------

    /// Binds the action to `target`, captures per-kind baselines, and starts
    /// it running. Rebinding the *same* target restarts the action with
    /// freshly captured baselines; binding while a different target is still
    /// attached is an error and leaves the action unchanged.
    pub fn bind(&self, target: Handle<dyn Target>) -> Result<(), ActionError> {
        {
            let bound = self.target.borrow();
            if let Some(current) = bound.as_ref() {
                if !Handle::ptr_eq(current, &target) {
                    return Err(ActionError::AlreadyBound);
                }
            }
        }
        self.setup(&target)?;
        *self.target.borrow_mut() = Some(target);
        self.elapsed.set(0.0);
        self.state.set(ActionState::Running);
        Ok(())
    }

    /// One-time setup at (re)bind: capture the baselines relative actions
    /// need so repeated runs compose against the target's *current* state.
    fn setup(&self, target: &Handle<dyn Target>) -> Result<(), ActionError> {
        match &self.kind {
            Kind::MoveBy { start, prev, .. } => {
                let p = target.position();
                start.set(p);
                prev.set(p);
            }
            Kind::ScaleBy { start, .. } => start.set(target.scale()),
            Kind::RotateBy { start, .. } => start.set(target.rotation()),
            Kind::Tween { .. } => {}
            Kind::Repeat { child, completed, .. } => {
                completed.set(0);
                child.bind(target.clone())?;
            }
            Kind::Sequence { index, .. } => index.set(0),
        }
        Ok(())
    }

    /// Advances the action by `dt` seconds. No-op unless Running.
    pub fn update(&self, dt: f32) {
        if self.state.get() != ActionState::Running {
            return;
        }
        match &self.kind {
            Kind::Repeat { .. } => self.update_repeat(dt),
            Kind::Sequence { .. } => self.update_sequence(dt),
            _ => self.update_timed(dt),
        }
    }

    fn update_timed(&self, dt: f32) {
        // Borrow, don't clone: a per-tick handle clone would dirty the pool
        // every frame for no reason.
        let bound = self.target.borrow();
        let Some(target) = bound.as_ref() else {
            self.state.set(ActionState::Finished);
            return;
        };
        self.elapsed.set(self.elapsed.get() + dt);
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed.get() / self.duration).clamp(0.0, 1.0)
        };
        self.apply(&**target, t);
        if t >= 1.0 {
            self.state.set(ActionState::Finished);
        }
    }

    /// Writes the absolute value for progress `t`. Always computed from the
    /// captured baseline, never by accumulating per-frame deltas, so floating
    /// error does not build up over a long animation.
    fn apply(&self, target: &dyn Target, t: f32) {
        match &self.kind {
            Kind::MoveBy { delta, start, prev } => {
                // Fold any movement applied from outside since the last tick
                // into the baseline, so the delta stays relative to where the
                // target actually is.
                let current = target.position();
                start.set(start.get() + (current - prev.get()));
                let next = start.get() + *delta * t;
                target.set_position(next);
                prev.set(next);
            }
            Kind::ScaleBy { delta, start } => target.set_scale(start.get() + *delta * t),
            Kind::RotateBy { delta, start } => target.set_rotation(start.get() + *delta * t),
            Kind::Tween { apply } => apply(target, t),
            // Composites never reach here; they forward in update().
            Kind::Repeat { .. } | Kind::Sequence { .. } => {}
        }
    }

    fn update_repeat(&self, dt: f32) {
        let Kind::Repeat { child, times, completed } = &self.kind else {
            return;
        };
        child.update(dt);
        if child.state() != ActionState::Finished {
            return;
        }
        completed.set(completed.get() + 1);
        if let Some(n) = times {
            if completed.get() >= *n {
                self.state.set(ActionState::Finished);
                return;
            }
        }
        // Re-initialize without detaching: the child recaptures its
        // baselines and keeps going next frame.
        child.reactivate();
    }

    fn update_sequence(&self, dt: f32) {
        let Kind::Sequence { children, index } = &self.kind else {
            return;
        };
        let bound = self.target.borrow();
        let Some(target) = bound.as_ref() else {
            self.state.set(ActionState::Finished);
            return;
        };
        let i = index.get();
        let Some(child) = children.get(i) else {
            self.state.set(ActionState::Finished);
            return;
        };
        match child.state() {
            ActionState::Running | ActionState::Paused => {}
            // Entering this stage: bind now so the child's baseline reflects
            // the target's state after the previous stage.
            _ => {
                if child.bind(target.clone()).is_err() {
                    // Child is attached to some other target (it was started
                    // independently). The sequence cannot continue.
                    self.state.set(ActionState::Finished);
                    return;
                }
            }
        }
        child.update(dt);
        if child.state() == ActionState::Finished {
            index.set(i + 1);
            if i + 1 >= children.len() {
                self.state.set(ActionState::Finished);
            }
        }
    }

    /// Re-initialize against the already-bound target (loop repeats).
    fn reactivate(&self) {
        let target = self.target.borrow().clone();
        if let Some(target) = target {
            // Rebinding the same target cannot fail.
            let _ = self.bind(target);
        }
    }

    /// Running → Paused. No independent progress while paused.
    pub fn pause(&self) {
        if self.state.get() == ActionState::Running {
            self.state.set(ActionState::Paused);
        }
    }

    /// Paused → Running.
    pub fn resume(&self) {
        if self.state.get() == ActionState::Paused {
            self.state.set(ActionState::Running);
        }
    }

    /// Straight to Finished: cascades to children, drops the target handle,
    /// and leaves the action for the manager (or the pool) to release.
    pub fn stop(&self) {
        match &self.kind {
            Kind::Repeat { child, .. } => child.stop(),
            Kind::Sequence { children, .. } => {
                for child in children {
                    child.stop();
                }
            }
            _ => {}
        }
        self.target.borrow_mut().take();
        self.state.set(ActionState::Finished);
    }

    // -- Clone / reverse ----------------------------------------------------

    /// Deep copy with reset state: Initialized, unbound, identical
    /// parameters. The same logical action is frequently started on several
    /// targets, so clones share nothing mutable with the original.
    pub fn clone_in(&self, pool: &mut DeferredPool) -> Handle<Action> {
        let kind = match &self.kind {
            Kind::MoveBy { delta, .. } => Kind::MoveBy {
                delta: *delta,
                start: Cell::new(Vec2::ZERO),
                prev: Cell::new(Vec2::ZERO),
            },
            Kind::ScaleBy { delta, .. } => Kind::ScaleBy {
                delta: *delta,
                start: Cell::new(Vec2::ZERO),
            },
            Kind::RotateBy { delta, .. } => Kind::RotateBy {
                delta: *delta,
                start: Cell::new(0.0),
            },
            Kind::Tween { apply } => Kind::Tween { apply: apply.clone() },
            Kind::Repeat { child, times, .. } => Kind::Repeat {
                child: child.clone_in(pool),
                times: *times,
                completed: Cell::new(0),
            },
            Kind::Sequence { children, .. } => Kind::Sequence {
                children: children.iter().map(|c| c.clone_in(pool)).collect(),
                index: Cell::new(0),
            },
        };
        pool.alloc(self.derived(kind))
    }

    /// New Initialized action whose effect is the algebraic inverse over the
    /// same duration. Tweens have no well-defined inverse; reversing a
    /// sequence reverses each child and the order.
    pub fn reverse_in(&self, pool: &mut DeferredPool) -> Result<Handle<Action>, ActionError> {
        let kind = match &self.kind {
            Kind::MoveBy { delta, .. } => Kind::MoveBy {
                delta: -*delta,
                start: Cell::new(Vec2::ZERO),
                prev: Cell::new(Vec2::ZERO),
            },
            Kind::ScaleBy { delta, .. } => Kind::ScaleBy {
                delta: -*delta,
                start: Cell::new(Vec2::ZERO),
            },
            Kind::RotateBy { delta, .. } => Kind::RotateBy {
                delta: -*delta,
                start: Cell::new(0.0),
            },
            Kind::Tween { .. } => return Err(ActionError::NotInvertible("tween")),
            Kind::Repeat { child, times, .. } => Kind::Repeat {
                child: child.reverse_in(pool)?,
                times: *times,
                completed: Cell::new(0),
            },
            Kind::Sequence { children, .. } => {
                let mut reversed = Vec::with_capacity(children.len());
                for child in children.iter().rev() {
                    reversed.push(child.reverse_in(pool)?);
                }
                Kind::Sequence {
                    children: reversed,
                    index: Cell::new(0),
                }
            }
        };
        Ok(pool.alloc(self.derived(kind)))
    }

    /// Fresh action carrying this one's name and duration around `kind`.
    fn derived(&self, kind: Kind) -> Action {
        Action {
            refs: RefCount::new(),
            name: self.name.clone(),
            duration: self.duration,
            elapsed: Cell::new(0.0),
            state: Cell::new(ActionState::Initialized),
            target: RefCell::new(None),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
