use std::ptr::NonNull;

use glam::Vec2;

use crate::managed::{Handle, Managed};

/// Capability surface an action mutates: position, scale, and rotation
/// accessors, implemented by the scene-graph node type (or any stand-in in
/// tests). Accessors take `&self` because many actions may share one target
/// through handles — implementors use interior mutability (`Cell` fields).
///
/// `Managed` is a supertrait so an action can keep its target alive via
/// `Handle<dyn Target>` while the animation runs.
pub trait Target: Managed {
    fn position(&self) -> Vec2;
    fn set_position(&self, position: Vec2);

    fn scale(&self) -> Vec2;
    fn set_scale(&self, scale: Vec2);

    /// Rotation in radians.
    fn rotation(&self) -> f32;
    fn set_rotation(&self, rotation: f32);
}

impl<T: Target + 'static> Handle<T> {
    /// Erase a concrete node handle to the capability type an action binds
    /// to. Identity is preserved, so `clear_bound_to` style lookups still
    /// match the original object.
    pub fn as_target(&self) -> Handle<dyn Target> {
        let ptr = self.as_ptr() as *mut dyn Target;
        // SAFETY: unsizing cast of a non-null pointer; `retained` takes the
        // extra reference the new handle owns.
        Handle::retained(unsafe { NonNull::new_unchecked(ptr) }, self.teardown_flag())
    }
}
