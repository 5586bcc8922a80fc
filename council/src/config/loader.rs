//! Routing config persistence (TOML or JSON).
//!
//! A missing file is not an error: callers get [`RoutingConfig::default`].
//! Saved files are always TOML.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::RoutingConfig;

/// Default file name for the routing configuration.
pub const CONFIG_FILE_NAME: &str = "council.toml";

/// Errors from loading or saving routing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not parse {path} as TOML ({toml}) or JSON ({json})")]
    Parse {
        path: PathBuf,
        toml: String,
        json: String,
    },

    #[error("Serialization failed: {0}")]
    Serialize(String),

    #[error("Profile has no configuration")]
    ProfileWithoutConfig,

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),
}

/// Where the routing config lives under a workspace root.
///
/// ```text
/// <root>/.council/council.toml     (primary)
/// <root>/settings/council.toml     (alternate, read-only fallback)
/// ```
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    root: PathBuf,
}

impl ConfigPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn primary(&self) -> PathBuf {
        self.root.join(".council").join(CONFIG_FILE_NAME)
    }

    pub fn alternate(&self) -> PathBuf {
        self.root.join("settings").join(CONFIG_FILE_NAME)
    }
}

/// Load a routing config from `path`.
///
/// `.toml` and `.json` extensions select the parser; anything else tries
/// TOML first, then JSON. Absent maps become empty and a zero version is
/// bumped to the current one.
pub fn load_config(path: &Path) -> Result<RoutingConfig, ConfigError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no routing config, using defaults");
            return Ok(RoutingConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut config = parse_config(path, &data)?;
    config.normalize();
    Ok(config)
}

fn parse_config(path: &Path, data: &str) -> Result<RoutingConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "toml" => toml::from_str(data).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        }),
        "json" => serde_json::from_str(data).map_err(|source| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source,
        }),
        _ => match toml::from_str::<RoutingConfig>(data) {
            Ok(config) => Ok(config),
            Err(toml_err) => {
                serde_json::from_str(data).map_err(|json_err| ConfigError::Parse {
                    path: path.to_path_buf(),
                    toml: toml_err.to_string(),
                    json: json_err.to_string(),
                })
            }
        },
    }
}

/// Save `config` to `path` as TOML, creating parent directories.
///
/// The document is written to a sibling temp file and renamed into place.
pub fn save_config(path: &Path, config: &RoutingConfig) -> Result<(), ConfigError> {
    let body = toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    write_atomic(path, body.as_bytes()).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load from the primary path, then the alternate; otherwise write and
/// return the default configuration at the primary path.
pub fn load_or_create(paths: &ConfigPaths) -> Result<RoutingConfig, ConfigError> {
    let primary = paths.primary();
    if primary.exists() {
        return load_config(&primary);
    }

    let alternate = paths.alternate();
    if alternate.exists() {
        return load_config(&alternate);
    }

    let config = RoutingConfig::default();
    save_config(&primary, &config)?;
    info!(path = %primary.display(), "wrote default routing config");
    Ok(config)
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
