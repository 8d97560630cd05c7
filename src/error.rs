use serde::Serialize;
use thiserror::Error;

use crate::ledger::ResourceKind;

/// A fault raised inside an event callback. Never propagated past the bus.
#[derive(Debug, Clone, Serialize, Error)]
#[error("handler #{handler_index} for '{event}' failed: {message}")]
pub struct CallbackError {
    pub event: String,
    pub handler_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
pub enum SpellError {
    /// A spend below threshold. The ledger is left untouched.
    #[error("not enough {resource}: need {required}, have {available}")]
    InsufficientResource {
        resource: ResourceKind,
        required: u32,
        available: u32,
    },

    /// Syntax or runtime fault during sandboxed execution.
    #[error("{0}")]
    Script(String),
}

impl SpellError {
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }
}

/// Unwraps callback/external wrappers down to the message a spell author
/// actually cares about.
pub fn describe_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => format!("syntax error: {message}"),
        mlua::Error::CallbackError { cause, .. } => describe_lua_error(cause),
        mlua::Error::WithContext { cause, .. } => describe_lua_error(cause),
        mlua::Error::ExternalError(inner) => inner.to_string(),
        _ => err.to_string(),
    }
}
