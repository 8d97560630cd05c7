use bevy::math::Vec3;

use crate::entities::{EntityKind, EntityRef, EntityStore};

/// Per-tick multiplicative damping. Not scaled by dt, so the effective
/// friction depends on the tick rate.
pub const FRICTION: f32 = 0.98;

/// Height of the ground plane (Z is up).
pub const GROUND_HEIGHT: f32 = 0.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Impact {
    pub orb: EntityRef,
    pub ground: EntityRef,
}

/// Advances every moving orb by one tick and returns the ground impacts in
/// store order.
///
/// Orbs with exactly zero velocity are skipped, so an orb resting on the
/// ground reports its impact once, on the tick it lands. Player and body
/// part velocities are never integrated.
pub fn step(store: &mut EntityStore, ground: EntityRef, dt: f32) -> Vec<Impact> {
    let mut impacts = Vec::new();
    for (id, record) in store.iter_mut() {
        if record.kind() != EntityKind::Orb || record.velocity == Vec3::ZERO {
            continue;
        }
        // Position uses the pre-damping velocity.
        record.position += record.velocity * dt;
        record.velocity *= FRICTION;

        if record.position.z <= GROUND_HEIGHT {
            record.position.z = GROUND_HEIGHT;
            record.velocity = Vec3::ZERO;
            impacts.push(Impact { orb: id, ground });
        }
    }
    impacts
}
