pub mod api;
pub mod sandbox;

/// Instruction budget for a cast or a single callback. 0 disables the hook.
pub const DEFAULT_SCRIPT_INSTRUCTION_LIMIT: u32 = 1_000_000;

pub use sandbox::{LuaEntity, SharedBus, SharedWorld, SpellBindings};
