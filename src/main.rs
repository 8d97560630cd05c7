mod api;
mod config;
mod entities;
mod error;
mod events;
mod file_watcher;
mod host;
mod ledger;
mod physics;
mod scene;
mod scripting;
mod session;
mod spell_runtime;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use config::{load_config, RunOptions};
use session::SpellSession;
use std::time::Duration;

fn print_ledger(session: &SpellSession) {
    let ledger = session.ledger();
    println!(
        "[Arcane] Mana: {}  Fire: {}  Water: {}",
        ledger.mana(),
        ledger.fire(),
        ledger.water()
    );
}

fn main() {
    let options = match RunOptions::from_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("[Arcane] {e}");
            eprintln!("usage: arcane [--spell <file>] [--frames <n>] [--watch] [--serve]");
            std::process::exit(2);
        }
    };
    let config = load_config();

    let mut session = match SpellSession::new(&config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("[Arcane] Failed to start the script sandbox: {e}");
            std::process::exit(1);
        }
    };

    let mut cast_failed = false;
    if let Some(path) = &options.spell_path {
        match std::fs::read_to_string(path) {
            Ok(source) => {
                cast_failed = session.execute(&source).is_err();
                println!("[Arcane] {}", session.last_status());
            }
            Err(e) => {
                eprintln!("[Arcane] Could not read {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }
    print_ledger(&session);

    if let Some(code) = options.exit_code_after_cast(cast_failed) {
        std::process::exit(code);
    }

    let mut app = App::new();
    // Pace the loop to the physics rate instead of spinning.
    let frame_time = Duration::from_secs_f64(1.0 / config.tick_hz);
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame_time)))
        .add_plugins(LogPlugin::default());
    println!("[Arcane] Starting spell runtime at {} Hz", config.tick_hz);

    app.insert_non_send_resource(session)
        .insert_resource(config)
        .insert_resource(spell_runtime::FrameBudget(options.frames))
        .add_plugins(host::HostPlugin)
        .add_plugins(spell_runtime::SpellRuntimePlugin)
        .add_plugins(scene::ScenePlugin);

    if options.watch {
        if let Some(spell_path) = options.spell_path.clone() {
            app.add_plugins(file_watcher::FileWatcherPlugin { spell_path });
        }
    }
    if options.serve {
        app.add_plugins(api::ApiPlugin);
    }

    app.run();
}
