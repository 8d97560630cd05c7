use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bevy::log::{debug, info, warn};
use mlua::{Function, Lua};
use serde::Serialize;

use crate::config::ArcaneConfig;
use crate::entities::{Element, SpellWorld};
use crate::error::{describe_lua_error, CallbackError, SpellError};
use crate::events::{self, EventBus, IMPACT_EVENT};
use crate::ledger::ResourceLedger;
use crate::physics::{self, Impact};
use crate::scripting::sandbox::{new_sandbox_lua, with_instruction_limit};
use crate::scripting::{LuaEntity, SharedBus, SharedWorld, SpellBindings};

pub const CAST_OK: &str = "ok";
pub const CAST_SUCCESS_MESSAGE: &str = "Spell cast successfully";

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CastReport {
    pub status: &'static str,
    pub orbs_created: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ImpactRecord {
    pub frame: u64,
    pub orb: u32,
    pub ground: u32,
    pub element: Option<Element>,
    pub position: [f32; 3],
}

#[derive(Default, Debug)]
pub struct TickReport {
    pub impacts: Vec<Impact>,
    pub callback_failures: Vec<CallbackError>,
}

#[derive(Serialize, Clone, Debug)]
pub struct OrbStatus {
    pub id: u32,
    pub element: Option<Element>,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
}

/// Everything the host shows after a cast.
#[derive(Serialize, Clone, Debug)]
pub struct SessionStatus {
    pub mana: u32,
    pub fire: u32,
    pub water: u32,
    pub last_status: String,
    pub frame: u64,
    pub orbs: Vec<OrbStatus>,
    pub subscriptions: Vec<Subscription>,
    pub recent_callback_errors: Vec<CallbackError>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Subscription {
    pub event: String,
    pub handlers: usize,
}

/// One player's spell runtime: the Lua state, the world it mutates and the
/// event bus its callbacks live in.
///
/// `execute` and `tick` both take `&mut self`, so a cast always runs to
/// completion before the next physics tick and never overlaps another cast.
pub struct SpellSession {
    lua: Lua,
    world: SharedWorld,
    bus: SharedBus,
    bindings: SpellBindings,
    instruction_limit: u32,
    frame: u64,
    last_status: String,
    recent_limit: usize,
    recent_impacts: VecDeque<ImpactRecord>,
    recent_callback_errors: VecDeque<CallbackError>,
}

impl SpellSession {
    pub fn new(config: &ArcaneConfig) -> mlua::Result<Self> {
        let ledger = ResourceLedger::new(
            config.starting_mana,
            config.starting_fire,
            config.starting_water,
        );
        let lua = new_sandbox_lua()?;
        let world: SharedWorld = Rc::new(RefCell::new(SpellWorld::new(ledger)));
        let bus: SharedBus = Rc::new(RefCell::new(EventBus::default()));
        let bindings = SpellBindings::install(&lua, world.clone(), bus.clone())?;
        Ok(Self {
            lua,
            world,
            bus,
            bindings,
            instruction_limit: config.script_instruction_limit,
            frame: 0,
            last_status: String::new(),
            recent_limit: config.recent_buffer_len.max(1),
            recent_impacts: VecDeque::new(),
            recent_callback_errors: VecDeque::new(),
        })
    }

    /// Runs a spell in a fresh allow-list environment. Mutations made
    /// before a fault are kept.
    pub fn execute(&mut self, source: &str) -> Result<CastReport, SpellError> {
        let orbs_before = self.world.borrow().store.orbs().count();
        let result = self.run_chunk(source);
        let orbs_created = self
            .world
            .borrow()
            .store
            .orbs()
            .count()
            .saturating_sub(orbs_before);
        match result {
            Ok(()) => {
                self.last_status = CAST_SUCCESS_MESSAGE.to_string();
                info!("[Arcane] Spell cast ({orbs_created} orb(s) created)");
                Ok(CastReport {
                    status: CAST_OK,
                    orbs_created,
                })
            }
            Err(err) => {
                let message = describe_lua_error(&err);
                self.last_status = format!("Error: {message}");
                warn!("[Arcane] Spell failed: {message}");
                Err(SpellError::Script(message))
            }
        }
    }

    fn run_chunk(&self, source: &str) -> mlua::Result<()> {
        let env = self.bindings.environment(&self.lua)?;
        let chunk = self
            .lua
            .load(source)
            .set_name("spell")
            .set_environment(env);
        with_instruction_limit(&self.lua, self.instruction_limit, || chunk.exec())
    }

    /// One physics tick, then `impact` dispatch for every orb that landed.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        self.frame = self.frame.saturating_add(1);
        let impacts = {
            let mut world = self.world.borrow_mut();
            let ground = world.roster.ground;
            physics::step(&mut world.store, ground, dt)
        };

        let mut report = TickReport::default();
        for impact in &impacts {
            self.record_impact(*impact);
            // Snapshot: handlers registered by a callback start with the
            // next impact.
            let handlers = self.bus.borrow().handlers(IMPACT_EVENT);
            let orb = LuaEntity::new(impact.orb, self.world.clone());
            let ground = LuaEntity::new(impact.ground, self.world.clone());
            let lua = &self.lua;
            let limit = self.instruction_limit;
            let dispatched = events::dispatch(IMPACT_EVENT, &handlers, |callback: &Function| {
                with_instruction_limit(lua, limit, || {
                    callback.call::<()>((orb.clone(), ground.clone()))
                })
                .map_err(|e| describe_lua_error(&e))
            });
            for failure in dispatched.failures {
                push_capped(
                    &mut self.recent_callback_errors,
                    failure.clone(),
                    self.recent_limit,
                );
                report.callback_failures.push(failure);
            }
        }
        report.impacts = impacts;
        report
    }

    fn record_impact(&mut self, impact: Impact) {
        let record = {
            let world = self.world.borrow();
            let Some(orb) = world.store.get(impact.orb) else {
                return;
            };
            ImpactRecord {
                frame: self.frame,
                orb: impact.orb.0,
                ground: impact.ground.0,
                element: orb.element(),
                position: orb.position.to_array(),
            }
        };
        debug!(
            "[Arcane physics] Orb #{} hit the ground at {:?}",
            record.orb, record.position
        );
        push_capped(&mut self.recent_impacts, record, self.recent_limit);
    }

    pub fn world(&self) -> Ref<'_, SpellWorld> {
        self.world.borrow()
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.world.borrow().ledger()
    }

    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.bus.borrow().handler_count(event)
    }

    pub fn recent_impacts(&self) -> Vec<ImpactRecord> {
        self.recent_impacts.iter().cloned().collect()
    }

    pub fn status(&self) -> SessionStatus {
        let world = self.world.borrow();
        let ledger = world.ledger();
        let orbs = world
            .store
            .orbs()
            .map(|(id, record)| OrbStatus {
                id: id.0,
                element: record.element(),
                position: record.position.to_array(),
                velocity: record.velocity.to_array(),
            })
            .collect();
        let bus = self.bus.borrow();
        let subscriptions = bus
            .event_types()
            .into_iter()
            .map(|event| Subscription {
                handlers: bus.handler_count(&event),
                event,
            })
            .collect();
        SessionStatus {
            mana: ledger.mana(),
            fire: ledger.fire(),
            water: ledger.water(),
            last_status: self.last_status.clone(),
            frame: self.frame,
            orbs,
            subscriptions,
            recent_callback_errors: self.recent_callback_errors.iter().cloned().collect(),
        }
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, item: T, cap: usize) {
    buffer.push_back(item);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EntityKind, EntityRef};
    use bevy::math::Vec3;

    fn session_with(mana: u32, fire: u32, water: u32) -> SpellSession {
        SpellSession::new(&ArcaneConfig {
            starting_mana: mana,
            starting_fire: fire,
            starting_water: water,
            script_instruction_limit: 100_000,
            ..ArcaneConfig::default()
        })
        .expect("session")
    }

    fn script_message(err: SpellError) -> String {
        match err {
            SpellError::Script(message) => message,
            other => panic!("expected a script error, got {other:?}"),
        }
    }

    fn first_orb(session: &SpellSession) -> EntityRef {
        session
            .world()
            .store
            .orbs()
            .map(|(id, _)| id)
            .next()
            .expect("an orb")
    }

    #[test]
    fn example_spell_creates_a_fire_orb() {
        let mut session = session_with(100, 50, 50);
        let report = session
            .execute("local orb = create_orb({10, 0, 15})\nuse_fire(orb)\n")
            .expect("cast");
        assert_eq!(report.status, CAST_OK);
        assert_eq!(report.orbs_created, 1);
        assert_eq!(session.last_status(), CAST_SUCCESS_MESSAGE);

        let ledger = session.ledger();
        assert_eq!((ledger.mana(), ledger.fire(), ledger.water()), (90, 45, 50));
        let orb = first_orb(&session);
        let world = session.world();
        let record = world.store.get(orb).expect("orb");
        assert_eq!(record.element(), Some(Element::Fire));
        assert_eq!(record.velocity, Vec3::new(10.0, 0.0, 15.0));
    }

    #[test]
    fn second_orb_fails_when_mana_runs_out_and_keeps_the_first() {
        let mut session = session_with(10, 0, 0);
        let err = session
            .execute("create_orb({0, 0, 1})\ncreate_orb({0, 0, 1})")
            .unwrap_err();
        assert!(script_message(err).contains("not enough mana"));
        assert_eq!(session.ledger().mana(), 0);
        assert_eq!(session.world().store.orbs().count(), 1);
        assert!(session.last_status().starts_with("Error: "));
    }

    #[test]
    fn element_last_write_wins() {
        let mut session = session_with(100, 50, 50);
        session
            .execute("local o = create_orb({0, 0, 0}) use_fire(o) use_water(o)")
            .expect("cast");
        let orb = first_orb(&session);
        assert_eq!(
            session.world().store.get(orb).and_then(|r| r.element()),
            Some(Element::Water)
        );
        let ledger = session.ledger();
        assert_eq!((ledger.fire(), ledger.water()), (45, 45));
    }

    #[test]
    fn syntax_errors_become_script_errors() {
        let mut session = session_with(100, 50, 50);
        let message = script_message(session.execute("create_orb({1, 2, 3}").unwrap_err());
        assert!(message.starts_with("syntax error:"));
        assert_eq!(session.ledger().mana(), 100);
    }

    #[test]
    fn escape_attempts_fail_after_earlier_effects() {
        let escapes = [
            "os.execute('ls')",
            "io.open('/etc/passwd')",
            "require('ffi')",
            "load('return 1')()",
            "print('hi')",
            "getmetatable(player)",
            "_G.os.exit()",
            "debug.getinfo(1)",
            "string.rep('x', 10)",
            "local s = ('x'):rep(3)",
            "setfenv(1, {})",
            "collectgarbage()",
        ];
        for escape in escapes {
            let mut session = session_with(100, 50, 50);
            let source = format!("create_orb({{0, 0, 1}})\n{escape}\ncreate_orb({{0, 0, 1}})");
            let result = session.execute(&source);
            assert!(result.is_err(), "escape should fail: {escape}");
            assert_eq!(session.ledger().mana(), 90, "only the first statement ran: {escape}");
            assert_eq!(session.world().store.orbs().count(), 1);
        }
    }

    #[test]
    fn globals_do_not_leak_between_casts() {
        let mut session = session_with(100, 50, 50);
        session.execute("stash = 41").expect("first cast");
        let err = session.execute("create_orb({stash + 1, 0, 0})").unwrap_err();
        assert!(!script_message(err).is_empty());
        assert_eq!(session.ledger().mana(), 100);
    }

    #[test]
    fn runaway_spell_hits_the_instruction_limit() {
        let mut session = session_with(100, 50, 50);
        let message = script_message(session.execute("while true do end").unwrap_err());
        assert!(message.contains("instruction limit exceeded"));
        session.execute("create_orb({0, 0, 0})").expect("session still usable");
    }

    #[test]
    fn impact_dispatches_once_in_registration_order() {
        let mut session = session_with(100, 50, 50);
        session
            .execute(
                r#"
                on_event("impact", function(orb, ground)
                    apply_force_to(player.hands, {1, 0, 0})
                    if orb.kind ~= "orb" or ground.kind ~= "ground" then
                        create_orb({0, 0, 0})
                    end
                end)
                on_event("impact", function(orb, ground)
                    local v = player.hands.velocity
                    apply_force_to(player.feet, {v[1] * 10, 0, 0})
                end)
                create_orb({0, 0, -3})
                "#,
            )
            .expect("cast");

        // Spawned at z = 1.5; one tick with dt = 1 lands it.
        let report = session.tick(1.0);
        assert_eq!(report.impacts.len(), 1);
        assert!(report.callback_failures.is_empty());
        {
            let world = session.world();
            let hands = world.store.get(world.roster.hands).expect("hands");
            let feet = world.store.get(world.roster.feet).expect("feet");
            assert_eq!(hands.velocity, Vec3::new(1.0, 0.0, 0.0));
            // The second handler saw the first handler's push.
            assert_eq!(feet.velocity, Vec3::new(10.0, 0.0, 0.0));
            let orb = world.store.get(report.impacts[0].orb).expect("orb");
            assert_eq!(orb.position.z, 0.0);
            assert_eq!(orb.velocity, Vec3::ZERO);
        }
        assert_eq!(session.ledger().mana(), 90);

        for _ in 0..5 {
            assert!(session.tick(1.0).impacts.is_empty());
        }
        assert_eq!(session.recent_impacts().len(), 1);
    }

    #[test]
    fn failing_callback_is_isolated() {
        let mut session = session_with(100, 50, 50);
        session
            .execute(
                r#"
                on_event("impact", function(orb) apply_force_to(player.hands, {1, 0, 0}) end)
                on_event("impact", function(orb) apply_force_to(orb, "fizzle") end)
                on_event("impact", function(orb) apply_force_to(player.hands, {1, 0, 0}) end)
                create_orb({0, 0, -10})
                "#,
            )
            .expect("cast");
        let report = session.tick(1.0);
        assert_eq!(report.impacts.len(), 1);
        assert_eq!(report.callback_failures.len(), 1);
        assert_eq!(report.callback_failures[0].handler_index, 1);
        assert!(report.callback_failures[0]
            .message
            .contains("force must be a sequence"));
        let hands_velocity = {
            let world = session.world();
            world.store.get(world.roster.hands).map(|r| r.velocity)
        };
        assert_eq!(hands_velocity, Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(session.status().recent_callback_errors.len(), 1);
    }

    #[test]
    fn callbacks_can_spend_and_fail_on_insufficient_resources() {
        let mut session = session_with(20, 5, 0);
        session
            .execute(
                r#"
                on_event("impact", function(orb) use_fire(orb) end)
                create_orb({0, 0, -5})
                create_orb({0, 0, -5})
                "#,
            )
            .expect("cast");
        let report = session.tick(1.0);
        assert_eq!(report.impacts.len(), 2);
        assert_eq!(report.callback_failures.len(), 1);
        assert!(report.callback_failures[0].message.contains("not enough fire"));
        let elements: Vec<_> = session
            .world()
            .store
            .orbs()
            .map(|(_, r)| r.element())
            .collect();
        assert_eq!(elements, vec![Some(Element::Fire), None]);
    }

    #[test]
    fn handlers_registered_during_dispatch_wait_for_the_next_impact() {
        let mut session = session_with(100, 50, 50);
        session
            .execute(
                r#"
                on_event("impact", function(orb)
                    on_event("impact", function() apply_force_to(player.hands, {1, 0, 0}) end)
                end)
                create_orb({0, 0, -5})
                "#,
            )
            .expect("cast");
        session.tick(1.0);
        assert_eq!(session.handler_count(IMPACT_EVENT), 2);
        let hands = session.world().store.get(session.world().roster.hands).map(|r| r.velocity);
        assert_eq!(hands, Some(Vec3::ZERO));
    }

    #[test]
    fn runaway_callback_is_reported_not_propagated() {
        let mut session = session_with(100, 50, 50);
        session
            .execute(
                r#"
                on_event("impact", function() while true do end end)
                create_orb({0, 0, -5})
                "#,
            )
            .expect("cast");
        let report = session.tick(1.0);
        assert_eq!(report.callback_failures.len(), 1);
        assert!(report.callback_failures[0]
            .message
            .contains("instruction limit exceeded"));
    }

    #[test]
    fn loops_with_range_and_min_work_inside_spells() {
        let mut session = session_with(100, 50, 50);
        let report = session
            .execute(
                r#"
                for i in range(min(3, player.mana / 10)) do
                    create_orb({i, 0, max(1, i)})
                end
                "#,
            )
            .expect("cast");
        assert_eq!(report.orbs_created, 3);
        assert_eq!(session.ledger().mana(), 70);
        let kinds: Vec<_> = session
            .world()
            .store
            .iter()
            .map(|(_, r)| r.kind())
            .filter(|k| *k == EntityKind::Orb)
            .collect();
        assert_eq!(kinds.len(), 3);
    }

    #[test]
    fn status_reports_orbs_and_ledger() {
        let mut session = session_with(100, 50, 50);
        session
            .execute("local o = create_orb({1, 0, 0}) use_water(o)")
            .expect("cast");
        session.tick(0.5);
        let status = session.status();
        assert_eq!((status.mana, status.fire, status.water), (90, 50, 45));
        assert_eq!(status.frame, 1);
        assert_eq!(status.orbs.len(), 1);
        assert_eq!(status.orbs[0].element, Some(Element::Water));
        assert_eq!(status.orbs[0].position, [0.5, 2.0, 1.5]);
    }

    #[test]
    fn status_lists_subscriptions() {
        let mut session = session_with(100, 50, 50);
        session
            .execute("on_event('impact', function() end) on_event('impact', function() end)")
            .expect("cast");
        assert_eq!(
            session.status().subscriptions,
            vec![Subscription {
                event: "impact".to_string(),
                handlers: 2,
            }]
        );
    }
}
