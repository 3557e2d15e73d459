//! Configuration loading and config file resolution

use crate::identity::{IdentityResolver, DEFAULT_CONFLICT_MARKER_TOKEN};
use crate::merge::{MergeOptions, MergePolicy, OrphanPolicy, DEFAULT_CONTRIBUTOR};
use crate::schema::{
    default_categories, default_fields, CategoryDescriptor, FieldDescriptor, SchemaRegistry,
};
use crate::store::StoreKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "APL_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "apl.toml";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub store: StoreConfig,
    pub merge: MergeConfig,
    pub logging: LoggingConfig,
    pub report: ReportConfig,
    /// Schema fields; the built-in schema is used when empty
    pub fields: Vec<FieldDescriptor>,
    /// Categories; the built-in categories are used when empty
    pub categories: Vec<CategoryDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store format; inferred from the path extension when unset
    pub kind: Option<StoreKind>,
    pub path: PathBuf,
    /// Copy the previous file to `<file>.bak` before each save
    pub backup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: None,
            path: PathBuf::from("papers.json"),
            backup: true,
        }
    }
}

impl StoreConfig {
    /// Explicit kind, else by extension, else JSON
    pub fn resolved_kind(&self) -> StoreKind {
        self.kind
            .or_else(|| StoreKind::from_path(&self.path))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub policy: MergePolicy,
    pub conflict_marker_token: String,
    pub default_contributor: String,
    pub orphan_shadows: OrphanPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::default(),
            conflict_marker_token: DEFAULT_CONFLICT_MARKER_TOKEN.to_string(),
            default_contributor: DEFAULT_CONTRIBUTOR.to_string(),
            orphan_shadows: OrphanPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("README.md"),
        }
    }
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {e}")))
    }

    /// Build and validate the schema registry described by this config
    pub fn schema_registry(&self) -> Result<SchemaRegistry> {
        if self.fields.is_empty() && self.categories.is_empty() {
            return Ok(SchemaRegistry::builtin());
        }
        let fields = if self.fields.is_empty() {
            default_fields()
        } else {
            self.fields.clone()
        };
        let categories = if self.categories.is_empty() {
            default_categories()
        } else {
            self.categories.clone()
        };
        SchemaRegistry::new(fields, categories)
    }

    pub fn identity_resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.merge.conflict_marker_token.clone())
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            policy: self.merge.policy,
            default_contributor: self.merge.default_contributor.clone(),
            orphan_policy: self.merge.orphan_shadows,
        }
    }
}

/// Config file resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `apl.toml` in the working directory
/// 4. Platform config directory (`<config_dir>/apl/config.toml`)
///
/// Returns `None` when no candidate applies; the caller falls back to
/// compiled defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    // Priority 4: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("apl").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration with graceful degradation
///
/// A missing config file logs a warning and yields defaults. A file that
/// exists but cannot be read or parsed is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using default configuration");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using default configuration"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}
