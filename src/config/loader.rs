//! Tiered configuration loading.
//!
//! Defaults, then the project file, then the user file, each merged field by
//! field over the previous tier; environment variables are applied last.

use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.yaml";

/// Where each file tier lives.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-level config directory (`./mission-control`).
    pub project_dir: Option<PathBuf>,
    /// User-level config directory (`~/.mission-control`).
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    pub fn discover() -> Self {
        Self {
            project_dir: Some(PathBuf::from("mission-control")),
            user_dir: dirs::home_dir().map(|h| h.join(".mission-control")),
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Loads and merges configuration.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: Config,
    /// Files that contributed, lowest tier first.
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load using discovered paths, or `explicit` / `MISSION_CONTROL_CONFIG`
    /// as the only file tier when given.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("MISSION_CONTROL_CONFIG").map(PathBuf::from));

        match explicit {
            Some(path) => Self::load_explicit(&path),
            None => Self::load_with_paths(ConfigPaths::discover()),
        }
    }

    /// Load exactly one file over the defaults.
    pub fn load_explicit(path: &Path) -> Result<Self> {
        let layer = read_layer(path)?
            .with_context(|| format!("config file {} not found", path.display()))?;
        Self::merge_layers(vec![layer], vec![path.to_path_buf()])
    }

    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        for dir in [&paths.project_dir, &paths.user_dir].into_iter().flatten() {
            let file = dir.join(CONFIG_FILE);
            if let Some(layer) = read_layer(&file)? {
                layers.push(layer);
                sources.push(file);
            }
        }

        Self::merge_layers(layers, sources)
    }

    fn merge_layers(layers: Vec<Value>, sources: Vec<PathBuf>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        for layer in layers {
            merge_into(&mut merged, layer);
        }

        let mut config: Config = serde_json::from_value(merged)?;
        apply_env_overrides(&mut config);
        config.validate()?;

        debug!(?sources, "Configuration loaded");
        Ok(Self { config, sources })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

/// Read one YAML tier. A missing file is not an error; an unreadable or
/// malformed one is.
fn read_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    // An empty file parses as null and contributes nothing.
    Ok((!value.is_null()).then_some(value))
}

/// Overlay `layer` onto `base`: objects merge key by key, everything else
/// (arrays included) is replaced; nulls in the overlay are ignored.
fn merge_into(base: &mut Value, layer: Value) {
    match (base, layer) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(db_path) = std::env::var("MISSION_CONTROL_DB_PATH") {
        config.server.db_path = PathBuf::from(db_path);
    }

    if let Ok(port) = std::env::var("MISSION_CONTROL_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %port, "Ignoring invalid MISSION_CONTROL_PORT"),
        }
    }

    if let Ok(url) = std::env::var("OPENCLAW_GATEWAY_URL") {
        config.gateway.url = url;
    }

    if let Ok(token) = std::env::var("OPENCLAW_GATEWAY_TOKEN") {
        config.gateway.token = token;
    }
}
