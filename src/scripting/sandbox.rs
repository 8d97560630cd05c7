//! Lua binding for the spell surface.
//!
//! Spells run in a whitelist-only environment table bound to the chunk with
//! `Chunk::set_environment`. The Lua state itself is created without any
//! standard library, so even `string` methods on literals are unavailable.
//! A spell can reach exactly:
//!
//! - `create_orb`, `use_fire`, `use_water`, `apply_force_to`, `on_event`
//! - `player`
//! - `range`, `min`, `max`

use std::cell::RefCell;
use std::rc::Rc;

use bevy::math::Vec3;
use mlua::{
    AnyUserData, Function, HookTriggers, IntoLua, Lua, LuaOptions, MetaMethod, MultiValue,
    StdLib, Table, UserData, UserDataMethods, Value, Variadic, VmState,
};

use crate::entities::{Element, EntityRef, SpellWorld};
use crate::events::EventBus;
use crate::scripting::api;

pub type SharedWorld = Rc<RefCell<SpellWorld>>;
pub type SharedBus = Rc<RefCell<EventBus<Function>>>;

fn runtime_error(message: impl Into<String>) -> mlua::Error {
    mlua::Error::RuntimeError(message.into())
}

/// Creates a Lua state with no reachable standard library.
pub fn new_sandbox_lua() -> mlua::Result<Lua> {
    let lua = Lua::new_with(StdLib::JIT, LuaOptions::new())?;
    // Count hooks never fire inside compiled traces.
    lua.load("jit.off() jit = nil").set_name("jit_off").exec()?;
    Ok(lua)
}

/// Runs `f` with an instruction-count hook armed. A `limit` of 0 runs
/// unbounded.
pub fn with_instruction_limit<T, F>(lua: &Lua, limit: u32, f: F) -> mlua::Result<T>
where
    F: FnOnce() -> mlua::Result<T>,
{
    if limit == 0 {
        return f();
    }
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(limit),
        move |_lua, _debug| -> mlua::Result<VmState> {
            Err(runtime_error(format!(
                "instruction limit exceeded ({limit})"
            )))
        },
    );
    let out = f();
    lua.remove_hook();
    out
}

/// Script-side handle to a stored entity. Read-only: every field is
/// resolved against the store at access time.
#[derive(Clone)]
pub struct LuaEntity {
    pub id: EntityRef,
    world: SharedWorld,
}

impl LuaEntity {
    pub fn new(id: EntityRef, world: SharedWorld) -> Self {
        Self { id, world }
    }

    fn field(&self, lua: &Lua, key: &str) -> mlua::Result<Value> {
        let world = self.world.borrow();
        let record = world
            .store
            .get(self.id)
            .ok_or_else(|| runtime_error(format!("unknown entity #{}", self.id.0)))?;
        match key {
            "name" => record.name.as_str().into_lua(lua),
            "kind" => record.kind().as_str().into_lua(lua),
            "element" => record.element().map(Element::as_str).into_lua(lua),
            "position" => vec_to_lua(lua, record.position),
            "velocity" => vec_to_lua(lua, record.velocity),
            "mana" | "fire" | "water" | "hands" | "feet" => {
                let state = record.player().ok_or_else(|| {
                    runtime_error(format!("{} has no field '{key}'", record.name))
                })?;
                match key {
                    "mana" => state.ledger.mana().into_lua(lua),
                    "fire" => state.ledger.fire().into_lua(lua),
                    "water" => state.ledger.water().into_lua(lua),
                    "hands" => LuaEntity::new(state.hands, self.world.clone()).into_lua(lua),
                    _ => LuaEntity::new(state.feet, self.world.clone()).into_lua(lua),
                }
            }
            other => Err(runtime_error(format!(
                "{} has no field '{other}'",
                record.name
            ))),
        }
    }
}

impl UserData for LuaEntity {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            this.field(lua, &key)
        });
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<LuaEntity>()
                .map(|o| o.id == this.id)
                .unwrap_or(false))
        });
    }
}

fn vec_to_lua(lua: &Lua, v: Vec3) -> mlua::Result<Value> {
    lua.create_sequence_from([v.x, v.y, v.z]).map(Value::Table)
}

/// Accepts a Lua sequence of exactly three numbers.
pub fn vec_from_lua(value: &Value) -> mlua::Result<Vec3> {
    let invalid = || runtime_error("force must be a sequence of 3 numbers");
    let Value::Table(table) = value else {
        return Err(invalid());
    };
    if table.raw_len() != 3 {
        return Err(invalid());
    }
    let component = |i: usize| match table.raw_get::<Value>(i)? {
        Value::Integer(n) => Ok(n as f32),
        Value::Number(n) => Ok(n as f32),
        _ => Err(invalid()),
    };
    Ok(Vec3::new(component(1)?, component(2)?, component(3)?))
}

fn entity_arg(value: &Value, func: &str) -> mlua::Result<EntityRef> {
    match value {
        Value::UserData(ud) => ud
            .borrow::<LuaEntity>()
            .map(|e| e.id)
            .map_err(|_| runtime_error(format!("{func} expects an entity"))),
        other => Err(runtime_error(format!(
            "{func} expects an entity, got {}",
            other.type_name()
        ))),
    }
}

/// The allow-listed functions, created once per session and copied into a
/// fresh environment for every cast.
pub struct SpellBindings {
    functions: Vec<(&'static str, Function)>,
    player: LuaEntity,
}

impl SpellBindings {
    pub fn install(lua: &Lua, world: SharedWorld, bus: SharedBus) -> mlua::Result<Self> {
        let mut functions = Vec::new();

        let w = world.clone();
        let create_orb = lua.create_function(move |_, force: Value| {
            let force = vec_from_lua(&force)?;
            let id = api::create_orb(&mut w.borrow_mut(), force).map_err(mlua::Error::external)?;
            Ok(LuaEntity::new(id, w.clone()))
        })?;
        functions.push(("create_orb", create_orb));

        let w = world.clone();
        let use_fire = lua.create_function(move |_, orb: Value| {
            let id = entity_arg(&orb, "use_fire")?;
            api::use_fire(&mut w.borrow_mut(), id).map_err(mlua::Error::external)
        })?;
        functions.push(("use_fire", use_fire));

        let w = world.clone();
        let use_water = lua.create_function(move |_, orb: Value| {
            let id = entity_arg(&orb, "use_water")?;
            api::use_water(&mut w.borrow_mut(), id).map_err(mlua::Error::external)
        })?;
        functions.push(("use_water", use_water));

        let w = world.clone();
        let apply_force_to = lua.create_function(move |_, (entity, force): (Value, Value)| {
            let id = entity_arg(&entity, "apply_force_to")?;
            let force = vec_from_lua(&force)?;
            api::apply_force_to(&mut w.borrow_mut(), id, force).map_err(mlua::Error::external)
        })?;
        functions.push(("apply_force_to", apply_force_to));

        let on_event = lua.create_function(move |_, (event, callback): (String, Function)| {
            bus.borrow_mut().register(event, callback);
            Ok(())
        })?;
        functions.push(("on_event", on_event));

        functions.push(("range", create_range(lua)?));

        let min = lua.create_function(|_, values: Variadic<f64>| {
            values
                .iter()
                .copied()
                .reduce(f64::min)
                .ok_or_else(|| runtime_error("min expected at least 1 argument"))
        })?;
        functions.push(("min", min));

        let max = lua.create_function(|_, values: Variadic<f64>| {
            values
                .iter()
                .copied()
                .reduce(f64::max)
                .ok_or_else(|| runtime_error("max expected at least 1 argument"))
        })?;
        functions.push(("max", max));

        let player_ref = world.borrow().roster.player;
        Ok(Self {
            functions,
            player: LuaEntity::new(player_ref, world),
        })
    }

    /// A fresh environment holding only the allow-listed names.
    pub fn environment(&self, lua: &Lua) -> mlua::Result<Table> {
        let env = lua.create_table()?;
        for (name, function) in &self.functions {
            env.set(*name, function.clone())?;
        }
        env.set("player", self.player.clone())?;
        Ok(env)
    }
}

/// `range(stop)` / `range(start, stop[, step])`, half-open, as an iterator
/// for generic `for`.
fn create_range(lua: &Lua) -> mlua::Result<Function> {
    lua.create_function(
        |lua, (first, second, step): (i64, Option<i64>, Option<i64>)| {
            let (start, stop) = match second {
                Some(stop) => (first, stop),
                None => (0, first),
            };
            let step = step.unwrap_or(1);
            if step == 0 {
                return Err(runtime_error("range() step must not be zero"));
            }
            let mut next = start;
            lua.create_function_mut(move |_, _: MultiValue| {
                let live = if step > 0 { next < stop } else { next > stop };
                if !live {
                    return Ok(None);
                }
                let current = next;
                next = next.saturating_add(step);
                Ok(Some(current))
            })
        },
    )
}
