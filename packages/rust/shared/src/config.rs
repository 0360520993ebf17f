//! Application configuration for the module exporter.
//!
//! User config lives at `~/.modexport/modexport.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModExportError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "modexport.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".modexport";

// ---------------------------------------------------------------------------
// Config structs (matching modexport.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Module store location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Traversal scope and attribute filters.
    #[serde(default)]
    pub traversal: TraversalPoliciesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default maximum traversal depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Directory export files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Pretty-print the export document.
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            output_dir: default_output_dir(),
            pretty: true,
        }
    }
}

fn default_max_depth() -> u32 {
    2
}
fn default_output_dir() -> String {
    ".".into()
}
fn default_true() -> bool {
    true
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding `*.module.json` files.
    #[serde(default = "default_store_root")]
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

fn default_store_root() -> String {
    ".".into()
}

/// `[traversal]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalPoliciesConfig {
    /// Container path include patterns.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Container path exclude patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Attribute names that are never exported.
    #[serde(default)]
    pub skip_attributes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Traversal config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime traversal configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Maximum traversal depth; the root counts as the first level.
    pub max_depth: u32,
    /// Container path include glob patterns.
    pub include_patterns: Vec<String>,
    /// Container path exclude glob patterns.
    pub exclude_patterns: Vec<String>,
    /// Attribute names that are never exported.
    pub skip_attributes: Vec<String>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for TraversalConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_depth: config.defaults.max_depth,
            include_patterns: config.traversal.include_patterns.clone(),
            exclude_patterns: config.traversal.exclude_patterns.clone(),
            skip_attributes: config.traversal.skip_attributes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.modexport/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ModExportError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.modexport/modexport.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ModExportError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ModExportError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ModExportError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ModExportError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ModExportError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
