//! Drives a sprite through a few actions and prints its transform each
//! frame. No window or renderer — the target is a plain struct and time is
//! a fixed-step delta, exactly how the core sits inside a host loop.
//!
//! Run with `cargo run --example actions`.

use std::cell::Cell;

use glam::Vec2;
use kinema::{Action, Context, Managed, RefCount, Target};

struct Sprite {
    refs: RefCount,
    position: Cell<Vec2>,
    scale: Cell<Vec2>,
    rotation: Cell<f32>,
}

impl Sprite {
    fn new() -> Self {
        Self {
            refs: RefCount::new(),
            position: Cell::new(Vec2::ZERO),
            scale: Cell::new(Vec2::ONE),
            rotation: Cell::new(0.0),
        }
    }
}

impl Managed for Sprite {
    fn refs(&self) -> &RefCount {
        &self.refs
    }
}

impl Target for Sprite {
    fn position(&self) -> Vec2 {
        self.position.get()
    }
    fn set_position(&self, position: Vec2) {
        self.position.set(position);
    }
    fn scale(&self) -> Vec2 {
        self.scale.get()
    }
    fn set_scale(&self, scale: Vec2) {
        self.scale.set(scale);
    }
    fn rotation(&self) -> f32 {
        self.rotation.get()
    }
    fn set_rotation(&self, rotation: f32) {
        self.rotation.set(rotation);
    }
}

fn main() {
    env_logger::init();

    let mut ctx = Context::new();
    let hero = ctx.pool.alloc(Sprite::new());

    // Walk east, then grow, twice over.
    let walk = ctx.pool.alloc(Action::move_by(1.0, Vec2::new(8.0, 0.0)));
    let grow = ctx.pool.alloc(Action::scale_by(0.5, Vec2::splat(0.25)));
    let stage = ctx.pool.alloc(Action::sequence(vec![walk, grow]).with_name("entrance"));
    let twice = ctx.pool.alloc(Action::repeat(stage, 2));
    ctx.actions
        .start(twice, hero.as_target(), false)
        .expect("fresh action binds cleanly");

    // A spin running alongside, forever.
    let spin = ctx.pool.alloc(Action::rotate_by(2.0, std::f32::consts::TAU));
    let spinning = ctx.pool.alloc(Action::repeat_forever(spin));
    ctx.actions
        .start(spinning, hero.as_target(), false)
        .expect("fresh action binds cleanly");

    let dt = 0.25;
    for frame in 0..16 {
        ctx.update(dt);
        let p = hero.position();
        println!(
            "t={:>5.2}s  pos=({:>5.2}, {:>4.2})  scale={:.2}  rot={:>5.2}  live={} pooled={}",
            (frame + 1) as f32 * dt,
            p.x,
            p.y,
            hero.scale().x,
            hero.rotation(),
            ctx.actions.len(),
            ctx.pool.len(),
        );
    }

    drop(hero);
    ctx.shutdown();
    println!("shut down: live={} pooled={}", ctx.actions.len(), ctx.pool.len());
}
