//! Host-side surface: the commands a UI (HTTP, file watcher) may send to
//! the session, drained on the main thread where the session lives.

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::oneshot;

use crate::session::{CastReport, ImpactRecord, SessionStatus, SpellSession};

/// Upper bound on commands handled per frame.
const MAX_COMMANDS_PER_FRAME: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastOrigin {
    Api,
    FileWatch,
}

pub enum HostCommand {
    Cast {
        source: String,
        origin: CastOrigin,
        reply: Option<oneshot::Sender<Result<CastReport, String>>>,
    },
    GetStatus(oneshot::Sender<SessionStatus>),
    GetImpacts(oneshot::Sender<Vec<ImpactRecord>>),
}

#[derive(Resource)]
pub struct HostInbox {
    pub sender: Sender<HostCommand>,
    receiver: Receiver<HostCommand>,
}

impl Default for HostInbox {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }
}

pub struct HostPlugin;

impl Plugin for HostPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<HostInbox>()
            .add_systems(Update, process_host_commands);
    }
}

pub fn handle_command(session: &mut SpellSession, command: HostCommand) {
    match command {
        HostCommand::Cast {
            source,
            origin,
            reply,
        } => {
            let result = session.execute(&source).map_err(|e| e.to_string());
            if origin == CastOrigin::FileWatch {
                println!("[Arcane] {}", session.last_status());
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }
        HostCommand::GetStatus(reply) => {
            let _ = reply.send(session.status());
        }
        HostCommand::GetImpacts(reply) => {
            let _ = reply.send(session.recent_impacts());
        }
    }
}

fn process_host_commands(inbox: Res<HostInbox>, mut session: NonSendMut<SpellSession>) {
    for command in inbox.receiver.try_iter().take(MAX_COMMANDS_PER_FRAME) {
        handle_command(&mut session, command);
    }
}
