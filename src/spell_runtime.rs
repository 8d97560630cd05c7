use bevy::prelude::*;

use crate::config::ArcaneConfig;
use crate::session::SpellSession;

/// Drives the session's physics on the fixed clock.
pub struct SpellRuntimePlugin;

impl Plugin for SpellRuntimePlugin {
    fn build(&self, app: &mut App) {
        let tick_hz = app
            .world()
            .get_resource::<ArcaneConfig>()
            .map(|cfg| cfg.tick_hz)
            .unwrap_or(60.0);
        app.insert_resource(Time::<Fixed>::from_hz(tick_hz))
            .init_resource::<FrameBudget>()
            .add_systems(FixedUpdate, advance_spell_physics)
            .add_systems(Last, exit_after_frame_budget);
    }
}

/// Physics ticks to run before exit. `None` runs until stopped.
#[derive(Resource, Default, Debug)]
pub struct FrameBudget(pub Option<u64>);

impl FrameBudget {
    fn spent(&self, session: &SpellSession) -> bool {
        self.0.is_some_and(|limit| session.frame() >= limit)
    }
}

pub fn advance_spell_physics(
    mut session: NonSendMut<SpellSession>,
    budget: Res<FrameBudget>,
    time: Res<Time<Fixed>>,
) {
    // Several fixed steps can run in one app frame; stop exactly at the budget.
    if budget.spent(&session) {
        return;
    }
    let report = session.tick(time.delta_secs());
    if !report.impacts.is_empty() {
        debug!(
            "[Arcane] Frame {}: {} impact(s), {} callback failure(s)",
            session.frame(),
            report.impacts.len(),
            report.callback_failures.len()
        );
    }
}

fn exit_after_frame_budget(
    session: NonSend<SpellSession>,
    budget: Res<FrameBudget>,
    mut exit: EventWriter<AppExit>,
) {
    if budget.spent(&session) {
        exit.send(AppExit::Success);
    }
}
