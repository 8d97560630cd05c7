//! The fixed spell surface, independent of the script language binding.

use bevy::math::Vec3;

use crate::entities::{Element, EntityKind, EntityPayload, EntityRef, SpellWorld};
use crate::error::SpellError;
use crate::ledger::{ResourceKind, ELEMENT_COST, ORB_MANA_COST};

/// Where a new orb appears, relative to the player.
pub const ORB_SPAWN_OFFSET: Vec3 = Vec3::new(0.0, 2.0, 1.0);

/// Spends mana, then spawns an orb in front of the player moving at `force`.
pub fn create_orb(world: &mut SpellWorld, force: Vec3) -> Result<EntityRef, SpellError> {
    world.ledger_mut().spend(ResourceKind::Mana, ORB_MANA_COST)?;
    let origin = world
        .store
        .get(world.roster.player)
        .map_or(Vec3::ZERO, |player| player.position);
    let orb = world.store.create_entity(
        "orb",
        origin + ORB_SPAWN_OFFSET,
        EntityPayload::Orb { element: None },
    );
    if let Some(record) = world.store.get_mut(orb) {
        record.velocity = force;
    }
    Ok(orb)
}

pub fn use_fire(world: &mut SpellWorld, orb: EntityRef) -> Result<(), SpellError> {
    infuse(world, orb, ResourceKind::Fire, Element::Fire)
}

pub fn use_water(world: &mut SpellWorld, orb: EntityRef) -> Result<(), SpellError> {
    infuse(world, orb, ResourceKind::Water, Element::Water)
}

/// Target is checked before anything is spent. Last element written wins.
fn infuse(
    world: &mut SpellWorld,
    orb: EntityRef,
    resource: ResourceKind,
    element: Element,
) -> Result<(), SpellError> {
    match world.store.get(orb).map(|r| r.kind()) {
        Some(EntityKind::Orb) => {}
        Some(kind) => {
            return Err(SpellError::script(format!(
                "use_{} expects an orb, got {}",
                element.as_str(),
                kind.as_str()
            )))
        }
        None => return Err(SpellError::script(format!("unknown entity #{}", orb.0))),
    }
    world.ledger_mut().spend(resource, ELEMENT_COST)?;
    if let Some(record) = world.store.get_mut(orb) {
        record.payload = EntityPayload::Orb {
            element: Some(element),
        };
    }
    Ok(())
}

/// Adds `force` to any entity's velocity. Free of charge.
pub fn apply_force_to(
    world: &mut SpellWorld,
    entity: EntityRef,
    force: Vec3,
) -> Result<(), SpellError> {
    let record = world
        .store
        .get_mut(entity)
        .ok_or_else(|| SpellError::script(format!("unknown entity #{}", entity.0)))?;
    record.velocity += force;
    Ok(())
}
