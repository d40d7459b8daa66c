use std::path::{Path, PathBuf};
use tracing::{info, warn};

use robun_core::{Result, RobunError};

use crate::schema::RobunConfig;

const ENV_PREFIX: &str = "ROBUN_";
const ENV_SEPARATOR: &str = "__";

/// Loads the robun configuration from TOML with environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the config path: explicit path > ROBUN_CONFIG env > ~/.robun/robun.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("ROBUN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".robun")
            .join("robun.toml")
    }

    /// Load the config from disk, apply `ROBUN_*` environment overrides,
    /// and validate. Missing file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<RobunConfig> {
        let config_path = Self::resolve_path(path);
        let mut value = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            raw.parse::<toml::Value>().map_err(|e| {
                RobunError::Config(format!("failed to parse {}: {}", config_path.display(), e))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            toml::Value::Table(toml::map::Map::new())
        };

        let overrides: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX) && k != "ROBUN_CONFIG")
            .collect();
        apply_env_overrides(&mut value, &overrides);

        let config: RobunConfig = value
            .try_into()
            .map_err(|e| RobunError::Config(format!("invalid configuration: {e}")))?;

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(RobunError::Config(e)),
        }

        Ok(config)
    }
}

/// Merge `ROBUN_`-prefixed environment variables into the TOML value tree.
/// The key path uses `__` as separator: `ROBUN_AGENTS__MODEL=gpt-4o` sets
/// `agents.model`. Values parse as bool/int/float when they look like one,
/// strings otherwise.
fn apply_env_overrides(root: &mut toml::Value, vars: &[(String, String)]) {
    for (key, raw) in vars {
        let path: Vec<String> = key
            .trim_start_matches(ENV_PREFIX)
            .split(ENV_SEPARATOR)
            .map(|s| s.to_lowercase())
            .collect();
        if path.iter().any(|s| s.is_empty()) {
            warn!(var = %key, "malformed override path — skipping");
            continue;
        }
        set_path(root, &path, parse_env_value(raw));
    }
}

fn set_path(root: &mut toml::Value, path: &[String], value: toml::Value) {
    let mut node = root;
    for segment in &path[..path.len() - 1] {
        if !node.is_table() {
            *node = toml::Value::Table(toml::map::Map::new());
        }
        let table = node.as_table_mut().unwrap();
        node = table
            .entry(segment.clone())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if !node.is_table() {
        *node = toml::Value::Table(toml::map::Map::new());
    }
    node.as_table_mut()
        .unwrap()
        .insert(path[path.len() - 1].clone(), value);
}

fn parse_env_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return toml::Value::Float(f);
    }
    toml::Value::String(raw.to_string())
}
