//! Relay configuration (layered: defaults < TOML file < environment).

use std::path::Path;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::guard::{parse_max_repeat, DEFAULT_MAX_REPEAT};
use crate::intercept::{BoundaryMode, SchemaFailureMode, ToolLoopMode};

pub const DEFAULT_PROVIDER_ID: &str = "cursor-acp";

pub const ENV_TOOL_LOOP_MODE: &str = "RELAY_TOOL_LOOP_MODE";
pub const ENV_SCHEMA_FAILURE_MODE: &str = "RELAY_SCHEMA_VALIDATION_FAILURE_MODE";
pub const ENV_PROVIDER_BOUNDARY: &str = "RELAY_PROVIDER_BOUNDARY";
pub const ENV_AUTO_FALLBACK: &str = "RELAY_PROVIDER_BOUNDARY_AUTO_FALLBACK";
pub const ENV_MAX_REPEAT: &str = "RELAY_TOOL_LOOP_MAX_REPEAT";
pub const ENV_EMIT_TOOL_UPDATES: &str = "RELAY_EMIT_TOOL_UPDATES";

/// Settings for one relay instance.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    #[builder(default)]
    pub tool_loop_mode: ToolLoopMode,
    #[builder(default)]
    pub schema_failure_mode: SchemaFailureMode,
    #[builder(default)]
    pub boundary_mode: BoundaryMode,
    #[builder(default = true)]
    pub auto_fallback_to_legacy: bool,
    /// Values below 1 fall back to [`DEFAULT_MAX_REPEAT`].
    #[builder(default = DEFAULT_MAX_REPEAT)]
    #[serde(deserialize_with = "deserialize_max_repeat")]
    pub max_repeat: usize,
    #[builder(default = false)]
    pub emit_tool_updates: bool,
    #[builder(default = DEFAULT_PROVIDER_ID.to_string(), into)]
    pub provider_id: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tool_loop_mode: ToolLoopMode::default(),
            schema_failure_mode: SchemaFailureMode::default(),
            boundary_mode: BoundaryMode::default(),
            auto_fallback_to_legacy: true,
            max_repeat: DEFAULT_MAX_REPEAT,
            emit_tool_updates: false,
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `RELAY_*` environment variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Override fields from variables resolved by `lookup`.
    ///
    /// Unparseable values are logged and ignored; an invalid max-repeat falls
    /// back to the default.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(mode) = parse_env(&lookup, ENV_TOOL_LOOP_MODE) {
            self.tool_loop_mode = mode;
        }
        if let Some(mode) = parse_env(&lookup, ENV_SCHEMA_FAILURE_MODE) {
            self.schema_failure_mode = mode;
        }
        if let Some(mode) = parse_env(&lookup, ENV_PROVIDER_BOUNDARY) {
            self.boundary_mode = mode;
        }
        if let Some(raw) = lookup(ENV_AUTO_FALLBACK) {
            match parse_flag(&raw) {
                Some(enabled) => self.auto_fallback_to_legacy = enabled,
                None => warn_invalid(ENV_AUTO_FALLBACK, &raw),
            }
        }
        if let Some(raw) = lookup(ENV_EMIT_TOOL_UPDATES) {
            match parse_flag(&raw) {
                Some(enabled) => self.emit_tool_updates = enabled,
                None => warn_invalid(ENV_EMIT_TOOL_UPDATES, &raw),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_REPEAT) {
            let parsed = parse_max_repeat(Some(&raw));
            if !parsed.valid {
                warn_invalid(ENV_MAX_REPEAT, &raw);
            }
            self.max_repeat = parsed.value;
        }
        self
    }
}

fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn_invalid(key, &raw);
            None
        }
    }
}

fn deserialize_max_repeat<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    match usize::try_from(raw) {
        Ok(value) if value > 0 => Ok(value),
        _ => {
            warn_invalid("max_repeat", &raw.to_string());
            Ok(DEFAULT_MAX_REPEAT)
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn warn_invalid(key: &str, raw: &str) {
    tracing::warn!(key, value = raw, "ignoring invalid relay setting");
}
