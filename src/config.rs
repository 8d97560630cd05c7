use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::scripting::DEFAULT_SCRIPT_INSTRUCTION_LIMIT;

pub const DEFAULT_API_PORT: u16 = 3000;

/// Session tuning. Loaded from `arcane.json` (or `$ARCANE_CONFIG`), with a
/// few environment overrides on top.
#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcaneConfig {
    pub starting_mana: u32,
    pub starting_fire: u32,
    pub starting_water: u32,
    pub tick_hz: f64,
    pub script_instruction_limit: u32,
    pub api_port: u16,
    /// Cap for the recent impact / callback error buffers.
    pub recent_buffer_len: usize,
}

impl Default for ArcaneConfig {
    fn default() -> Self {
        Self {
            starting_mana: 100,
            starting_fire: 50,
            starting_water: 50,
            tick_hz: 60.0,
            script_instruction_limit: DEFAULT_SCRIPT_INSTRUCTION_LIMIT,
            api_port: DEFAULT_API_PORT,
            recent_buffer_len: 200,
        }
    }
}

impl ArcaneConfig {
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Some(limit) = env_parse::<u32>("ARCANE_SCRIPT_INSTRUCTION_LIMIT") {
            self.script_instruction_limit = limit;
        }
        if let Some(port) = env_parse::<u16>("ARCANE_API_PORT") {
            self.api_port = port;
        }
        self.tick_hz = self.tick_hz.max(1.0);
        self.recent_buffer_len = self.recent_buffer_len.max(1);
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

pub fn load_config() -> ArcaneConfig {
    let path = std::env::var("ARCANE_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "arcane.json".to_string());
    let config = match std::fs::read_to_string(&path) {
        Ok(contents) => match ArcaneConfig::from_json(&contents) {
            Ok(cfg) => {
                println!("[Arcane] Loaded config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Arcane] Failed to parse {}: {}", path, e);
                ArcaneConfig::default()
            }
        },
        Err(_) => ArcaneConfig::default(),
    };
    config.apply_env_overrides()
}

/// Command-line switches for the headless runner.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct RunOptions {
    pub spell_path: Option<std::path::PathBuf>,
    pub frames: Option<u64>,
    pub watch: bool,
    pub serve: bool,
}

impl RunOptions {
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut opts = RunOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--spell" => {
                    let path = args.next().ok_or("--spell needs a file path")?;
                    opts.spell_path = Some(path.into());
                }
                "--frames" => {
                    let raw = args.next().ok_or("--frames needs a number")?;
                    let frames = raw
                        .parse::<u64>()
                        .map_err(|_| format!("--frames expects a number, got '{raw}'"))?;
                    opts.frames = Some(frames);
                }
                "--watch" => opts.watch = true,
                "--serve" => opts.serve = true,
                other => return Err(format!("unknown argument '{other}'")),
            }
        }
        if opts.watch && opts.spell_path.is_none() {
            return Err("--watch needs --spell <path>".to_string());
        }
        Ok(opts)
    }

    /// Whether the Bevy loop runs after the startup cast.
    pub fn starts_runtime(&self) -> bool {
        self.frames.is_some() || self.watch || self.serve
    }

    /// Process exit code when the run ends right after the startup cast,
    /// or `None` when the runtime takes over.
    pub fn exit_code_after_cast(&self, cast_failed: bool) -> Option<i32> {
        if self.starts_runtime() {
            None
        } else if cast_failed {
            Some(1)
        } else {
            Some(0)
        }
    }
}
