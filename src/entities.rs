use bevy::math::Vec3;
use serde::Serialize;

use crate::ledger::ResourceLedger;

pub const PLAYER_START: Vec3 = Vec3::new(0.0, 0.0, 0.5);

/// Arena index into the [`EntityStore`]. Stable for the whole session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize)]
pub struct EntityRef(pub u32);

impl EntityRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ground,
    Player,
    BodyPart,
    Orb,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Ground => "ground",
            EntityKind::Player => "player",
            EntityKind::BodyPart => "body_part",
            EntityKind::Orb => "orb",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Fire,
    Water,
}

impl Element {
    pub fn as_str(self) -> &'static str {
        match self {
            Element::Fire => "fire",
            Element::Water => "water",
        }
    }

    /// Marker colour handed to the scene mirror.
    pub fn tint(self) -> [f32; 3] {
        match self {
            Element::Fire => [1.0, 0.3, 0.2],
            Element::Water => [0.3, 0.3, 1.0],
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlayerState {
    pub ledger: ResourceLedger,
    pub hands: EntityRef,
    pub feet: EntityRef,
}

#[derive(Clone, Debug)]
pub enum EntityPayload {
    Ground,
    BodyPart,
    Player(PlayerState),
    Orb { element: Option<Element> },
}

#[derive(Clone, Debug)]
pub struct EntityRecord {
    pub name: String,
    pub position: Vec3,
    pub velocity: Vec3,
    pub payload: EntityPayload,
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self.payload {
            EntityPayload::Ground => EntityKind::Ground,
            EntityPayload::BodyPart => EntityKind::BodyPart,
            EntityPayload::Player(_) => EntityKind::Player,
            EntityPayload::Orb { .. } => EntityKind::Orb,
        }
    }

    pub fn element(&self) -> Option<Element> {
        match self.payload {
            EntityPayload::Orb { element } => element,
            _ => None,
        }
    }

    pub fn player(&self) -> Option<&PlayerState> {
        match &self.payload {
            EntityPayload::Player(state) => Some(state),
            _ => None,
        }
    }
}

/// Owns every entity of the session. Nothing is ever removed.
#[derive(Default, Debug)]
pub struct EntityStore {
    records: Vec<EntityRecord>,
}

impl EntityStore {
    pub fn create_entity(
        &mut self,
        name: impl Into<String>,
        position: Vec3,
        payload: EntityPayload,
    ) -> EntityRef {
        let id = EntityRef(self.records.len() as u32);
        self.records.push(EntityRecord {
            name: name.into(),
            position,
            velocity: Vec3::ZERO,
            payload,
        });
        id
    }

    /// Creates the player plus its hands and feet, all at `position`.
    /// Returns `(player, hands, feet)`.
    pub fn spawn_player(
        &mut self,
        position: Vec3,
        ledger: ResourceLedger,
    ) -> (EntityRef, EntityRef, EntityRef) {
        let hands = self.create_entity("hands", position, EntityPayload::BodyPart);
        let feet = self.create_entity("feet", position, EntityPayload::BodyPart);
        let player = self.create_entity(
            "player",
            position,
            EntityPayload::Player(PlayerState {
                ledger,
                hands,
                feet,
            }),
        );
        (player, hands, feet)
    }

    pub fn get(&self, id: EntityRef) -> Option<&EntityRecord> {
        self.records.get(id.index())
    }

    pub fn get_mut(&mut self, id: EntityRef) -> Option<&mut EntityRecord> {
        self.records.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityRef, &EntityRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (EntityRef(i as u32), r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityRef, &mut EntityRecord)> {
        self.records
            .iter_mut()
            .enumerate()
            .map(|(i, r)| (EntityRef(i as u32), r))
    }

    pub fn orbs(&self) -> impl Iterator<Item = (EntityRef, &EntityRecord)> {
        self.iter().filter(|(_, r)| r.kind() == EntityKind::Orb)
    }
}

/// Stable references to the entities created once at scene setup.
#[derive(Clone, Copy, Debug)]
pub struct SceneRoster {
    pub ground: EntityRef,
    pub player: EntityRef,
    pub hands: EntityRef,
    pub feet: EntityRef,
}

impl SceneRoster {
    pub fn setup(store: &mut EntityStore, ledger: ResourceLedger) -> Self {
        let ground = store.create_entity("ground", Vec3::ZERO, EntityPayload::Ground);
        let (player, hands, feet) = store.spawn_player(PLAYER_START, ledger);
        Self {
            ground,
            player,
            hands,
            feet,
        }
    }
}

/// Everything the spell API and the physics stepper mutate.
#[derive(Debug)]
pub struct SpellWorld {
    pub store: EntityStore,
    pub roster: SceneRoster,
}

impl SpellWorld {
    pub fn new(ledger: ResourceLedger) -> Self {
        let mut store = EntityStore::default();
        let roster = SceneRoster::setup(&mut store, ledger);
        Self { store, roster }
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.player_state().ledger
    }

    pub fn player_state(&self) -> &PlayerState {
        match self.store.get(self.roster.player).and_then(EntityRecord::player) {
            Some(state) => state,
            None => unreachable!("roster player is always a player record"),
        }
    }

    pub fn ledger_mut(&mut self) -> &mut ResourceLedger {
        match self
            .store
            .get_mut(self.roster.player)
            .map(|r| &mut r.payload)
        {
            Some(EntityPayload::Player(state)) => &mut state.ledger,
            _ => unreachable!("roster player is always a player record"),
        }
    }
}
