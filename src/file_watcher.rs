use bevy::prelude::*;
use crossbeam_channel::Sender;
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

use crate::host::{CastOrigin, HostCommand, HostInbox};

/// Recasts the spell file whenever it is saved. Needs `HostPlugin`.
pub struct FileWatcherPlugin {
    pub spell_path: PathBuf,
}

impl Plugin for FileWatcherPlugin {
    fn build(&self, app: &mut App) {
        let Some(inbox) = app.world().get_resource::<HostInbox>() else {
            eprintln!("[Arcane FileWatcher] HostPlugin missing; not watching");
            return;
        };
        let tx = inbox.sender.clone();
        let spell_path = self.spell_path.clone();

        std::thread::spawn(move || {
            run_watcher(spell_path, tx);
        });
    }
}

/// Editors often emit several modify events per save. Only content that
/// differs from the last cast is sent on.
#[derive(Default)]
struct SpellEdits {
    last_source: Option<String>,
}

impl SpellEdits {
    fn accept(&mut self, source: &str) -> bool {
        if self.last_source.as_deref() == Some(source) {
            return false;
        }
        self.last_source = Some(source.to_string());
        true
    }
}

fn run_watcher(spell_path: PathBuf, tx: Sender<HostCommand>) {
    let mut edits = SpellEdits::default();
    // The startup cast already ran this content.
    if let Ok(source) = std::fs::read_to_string(&spell_path) {
        edits.accept(&source);
    }

    let watched = spell_path.clone();
    let mut watcher: RecommendedWatcher =
        match notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                handle_fs_event(event, &tx, &watched, &mut edits);
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("[Arcane FileWatcher] Failed to create watcher: {e}");
                return;
            }
        };

    // notify needs a directory for single files
    let parent = match spell_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
        eprintln!("[Arcane FileWatcher] Failed to watch {}: {e}", parent.display());
        return;
    }
    println!("[Arcane FileWatcher] Watching spell: {}", spell_path.display());

    // The watcher stops when dropped.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}

fn handle_fs_event(
    event: NotifyEvent,
    tx: &Sender<HostCommand>,
    spell_path: &Path,
    edits: &mut SpellEdits,
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }

    for path in &event.paths {
        if !path_matches(path, spell_path) {
            continue;
        }
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("[Arcane FileWatcher] Could not read {}: {e}", path.display());
                continue;
            }
        };
        if !edits.accept(&source) {
            continue;
        }
        println!("[Arcane FileWatcher] Recasting {}", spell_path.display());
        let _ = tx.send(HostCommand::Cast {
            source,
            origin: CastOrigin::FileWatch,
            reply: None,
        });
    }
}

fn path_matches(a: &Path, b: &Path) -> bool {
    let ca = std::fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let cb = std::fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    ca == cb
}
