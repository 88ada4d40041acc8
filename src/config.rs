// ── Configuration Loader (C12) ───────────────────────────────────────────
//
// Process-level configuration: database path, HTTP bind address,
// concurrency caps, fetch timeout. Distinct from `DirectiveSettings`
// (engine::settings), which is per-tier game-balance data stored in the
// database this config merely points at.
//
// Standard config-directory convention (`dirs::config_dir` joined with an
// app name) plus a TOML file with `Default` for every field; environment
// variables override individual fields without requiring a committed file,
// the usual override layering for values that must not live in version
// control.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::atoms::constants::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_RETRIEVAL_CONCURRENCY};
use crate::atoms::error::{EngineError, EngineResult};

const APP_DIR_NAME: &str = "narrative-engine";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Address the HTTP server binds to, e.g. "0.0.0.0:8080".
    pub bind_address: String,
    /// Max concurrent Model Adapter generate() calls offloaded at once.
    pub generation_concurrency: usize,
    /// Max concurrent outbound lookup fetches (C6).
    pub retrieval_concurrency: usize,
    /// Per-URL timeout for retrieval fetches, in seconds.
    pub fetch_timeout_secs: u64,
    /// Deadline for one Model Adapter generate() call, in seconds.
    pub model_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: "127.0.0.1:8080".to_string(),
            generation_concurrency: 1,
            retrieval_concurrency: DEFAULT_RETRIEVAL_CONCURRENCY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            model_timeout_secs: 60,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME).join("engine.db")
}

fn config_file_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME).join(CONFIG_FILE_NAME)
}

impl EngineConfig {
    /// Loads from the platform config directory if present, falling back to
    /// `Default`, then applies environment-variable overrides. Never fails
    /// on a missing file; a malformed one is a `Config` error.
    pub fn load() -> EngineResult<Self> {
        let path = config_file_path();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents).map_err(|e| EngineError::Config(format!("invalid config at {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ENGINE_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGINE_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("ENGINE_GENERATION_CONCURRENCY").and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.generation_concurrency = v;
        }
        if let Ok(v) = std::env::var("ENGINE_RETRIEVAL_CONCURRENCY").and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.retrieval_concurrency = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.generation_concurrency >= 1);
        assert_eq!(config.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    }

    #[test]
    fn env_override_replaces_bind_address() {
        let mut config = EngineConfig::default();
        std::env::set_var("ENGINE_BIND_ADDRESS", "0.0.0.0:9999");
        config.apply_env_overrides();
        std::env::remove_var("ENGINE_BIND_ADDRESS");
        assert_eq!(config.bind_address, "0.0.0.0:9999");
    }
}
