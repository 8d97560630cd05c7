//! ECS mirror of the spell world, for hosts that render or inspect it.
//! The store stays the source of truth; mirrors are rewritten every frame.

use bevy::prelude::*;
use std::collections::HashSet;

use crate::entities::{EntityKind, EntityRecord, EntityRef};
use crate::session::SpellSession;

const GROUND_TINT: [f32; 3] = [0.4, 0.4, 0.4];
const NEUTRAL_TINT: [f32; 3] = [0.9, 0.9, 0.9];

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PostUpdate, sync_scene_mirror);
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct SceneMirror {
    pub entity: EntityRef,
    pub kind: EntityKind,
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct MarkerTint(pub Color);

fn marker_scale(kind: EntityKind) -> f32 {
    match kind {
        EntityKind::Player => 0.5,
        EntityKind::Orb => 0.3,
        EntityKind::Ground | EntityKind::BodyPart => 1.0,
    }
}

fn marker_tint(record: &EntityRecord) -> MarkerTint {
    let [r, g, b] = match record.kind() {
        EntityKind::Ground => GROUND_TINT,
        _ => record.element().map_or(NEUTRAL_TINT, |e| e.tint()),
    };
    MarkerTint(Color::srgb(r, g, b))
}

fn marker_transform(record: &EntityRecord) -> Transform {
    Transform::from_translation(record.position)
        .with_scale(Vec3::splat(marker_scale(record.kind())))
}

pub fn sync_scene_mirror(
    mut commands: Commands,
    session: NonSend<SpellSession>,
    mut mirrors: Query<(&SceneMirror, &mut Transform, &mut MarkerTint)>,
) {
    let world = session.world();
    let mut mirrored: HashSet<EntityRef> = HashSet::new();
    for (mirror, mut transform, mut tint) in &mut mirrors {
        mirrored.insert(mirror.entity);
        let Some(record) = world.store.get(mirror.entity) else {
            continue;
        };
        *transform = marker_transform(record);
        let next_tint = marker_tint(record);
        if *tint != next_tint {
            *tint = next_tint;
        }
    }

    for (id, record) in world.store.iter() {
        if mirrored.contains(&id) {
            continue;
        }
        commands.spawn((
            Name::new(record.name.clone()),
            SceneMirror {
                entity: id,
                kind: record.kind(),
            },
            marker_transform(record),
            marker_tint(record),
        ));
    }
}
