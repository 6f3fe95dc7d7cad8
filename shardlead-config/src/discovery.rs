//! Configuration file discovery
//!
//! Finds shardlead configuration files in the global (home) and project
//! (current) directories.

use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::{CONFIG_DIR_NAME, CONFIG_FILE_STEM};

/// Represents a discovered configuration file with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Full path to the configuration file
    pub path: PathBuf,
    /// Detected format of the file (TOML, YAML, JSON)
    pub format: ConfigFormat,
    /// Scope indicating where the file was found
    pub scope: ConfigScope,
}

/// Configuration file format detected from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format (.toml extension)
    Toml,
    /// YAML format (.yaml or .yml extensions)
    Yaml,
    /// JSON format (.json extension)
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Detect format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Where a configuration file was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigScope {
    /// `~/.shardlead/`
    Global,
    /// `./.shardlead/`
    Project,
}

/// File discovery service for finding configuration files
#[derive(Debug, Default)]
pub struct FileDiscovery {
    project_dir: Option<PathBuf>,
    global_dir: Option<PathBuf>,
}

impl FileDiscovery {
    /// Discovery rooted at the home and current directories, resolved lazily
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery rooted at explicit directories (each containing `.shardlead/`)
    pub fn with_dirs(global_root: Option<PathBuf>, project_root: Option<PathBuf>) -> Self {
        Self {
            global_dir: global_root.map(|p| p.join(CONFIG_DIR_NAME)),
            project_dir: project_root.map(|p| p.join(CONFIG_DIR_NAME)),
        }
    }

    /// Discover all configuration files, lowest precedence first
    pub fn discover_all(&self) -> Vec<ConfigFile> {
        let global_dir = self
            .global_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME)));
        let project_dir = self.project_dir.clone().or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|cwd| cwd.join(CONFIG_DIR_NAME))
        });

        let mut files = Vec::new();
        if let Some(dir) = global_dir.as_deref() {
            files.extend(Self::scan_dir(dir, ConfigScope::Global));
        }
        if let Some(dir) = project_dir.as_deref() {
            // Home and project can coincide when running from $HOME
            if global_dir.as_deref() != Some(dir) {
                files.extend(Self::scan_dir(dir, ConfigScope::Project));
            }
        }

        debug!("Discovered {} configuration file(s)", files.len());
        files
    }

    fn scan_dir(dir: &Path, scope: ConfigScope) -> Vec<ConfigFile> {
        ["toml", "yaml", "yml", "json"]
            .iter()
            .filter_map(|ext| {
                let path = dir.join(format!("{CONFIG_FILE_STEM}.{ext}"));
                trace!("Checking {}", path.display());
                if !path.is_file() {
                    return None;
                }
                let format = ConfigFormat::from_extension(ext)?;
                Some(ConfigFile {
                    path,
                    format,
                    scope,
                })
            })
            .collect()
    }
}
