mod router;
mod routes;
mod security;
pub mod types;

use axum::{
    extract::Request,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use bevy::prelude::*;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use crate::config::ArcaneConfig;
use crate::host::{CastOrigin, HostCommand, HostInbox};
use crate::session::{CastReport, ImpactRecord, SessionStatus};
use router::build_router;
use routes::*;
use security::*;
use types::*;

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) sender: Sender<HostCommand>,
}

/// Serves the session over HTTP. Needs `HostPlugin` for the command inbox.
pub struct ApiPlugin;

impl Plugin for ApiPlugin {
    fn build(&self, app: &mut App) {
        let Some(inbox) = app.world().get_resource::<HostInbox>() else {
            eprintln!("[Arcane API] HostPlugin missing; HTTP host not started");
            return;
        };
        let state = AppState {
            sender: inbox.sender.clone(),
        };
        let port = app
            .world()
            .get_resource::<ArcaneConfig>()
            .map(|cfg| cfg.api_port)
            .unwrap_or(crate::config::DEFAULT_API_PORT);
        let security = ApiSecurity::from_env();

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("[Arcane API] Failed to start runtime: {e}");
                    return;
                }
            };
            rt.block_on(async move {
                let app = build_router(state, security);
                let addr = format!("127.0.0.1:{port}");

                let listener = match tokio::net::TcpListener::bind(&addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        eprintln!("[Arcane API] Failed to bind to {addr}: {e}");
                        return;
                    }
                };

                println!("[Arcane API] Listening on http://{addr}");

                if let Err(e) = axum::serve(listener, app).await {
                    eprintln!("[Arcane API] Server stopped: {e}");
                }
            });
        });
    }
}
