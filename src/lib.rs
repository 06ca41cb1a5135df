//! Object-lifetime and action-scheduling core for 2D scene graphs.
//!
//! Every shared engine object carries an intrusive [`RefCount`] and lives in
//! a [`DeferredPool`]; ownership flows through [`Handle`]s, and objects whose
//! count reaches zero are reclaimed at the between-frames flush — never
//! mid-iteration. On top of that sits the [`Action`] state machine
//! (move/scale/rotate/tween, loops and sequences) and the [`ActionManager`]
//! that advances them once per frame. A [`Context`] ties the two together
//! with a deterministic teardown order.
//!
//! Rendering, windowing, input, audio, and collision are external
//! collaborators: an action only sees the [`Target`] capability (position,
//! scale, rotation), and time only arrives as a per-frame delta.
//!
//! ```
//! use std::cell::Cell;
//! use glam::Vec2;
//! use kinema::{Action, Context, Managed, RefCount, Target};
//!
//! struct Sprite {
//!     refs: RefCount,
//!     pos: Cell<Vec2>,
//!     scale: Cell<Vec2>,
//!     rot: Cell<f32>,
//! }
//!
//! impl Managed for Sprite {
//!     fn refs(&self) -> &RefCount { &self.refs }
//! }
//!
//! impl Target for Sprite {
//!     fn position(&self) -> Vec2 { self.pos.get() }
//!     fn set_position(&self, p: Vec2) { self.pos.set(p) }
//!     fn scale(&self) -> Vec2 { self.scale.get() }
//!     fn set_scale(&self, s: Vec2) { self.scale.set(s) }
//!     fn rotation(&self) -> f32 { self.rot.get() }
//!     fn set_rotation(&self, r: f32) { self.rot.set(r) }
//! }
//!
//! let mut ctx = Context::new();
//! let node = ctx.pool.alloc(Sprite {
//!     refs: RefCount::new(),
//!     pos: Cell::new(Vec2::ZERO),
//!     scale: Cell::new(Vec2::ONE),
//!     rot: Cell::new(0.0),
//! });
//! let slide = ctx.pool.alloc(Action::move_by(1.0, Vec2::new(10.0, 0.0)));
//! ctx.actions.start(slide, node.as_target(), false).unwrap();
//! ctx.update(0.5);
//! assert!((node.position().x - 5.0).abs() < 1e-4);
//! ```

pub mod action;
pub mod context;
pub mod managed;
pub mod manager;
pub mod pool;
pub mod target;

pub use action::{Action, ActionError, ActionState};
pub use context::Context;
pub use managed::{Handle, Managed, RefCount};
pub use manager::ActionManager;
pub use pool::DeferredPool;
pub use target::Target;
