//! Configuration provider using Figment

use crate::{
    discovery::{ConfigFile, ConfigFormat, FileDiscovery},
    error::{ConfigError, ConfigResult},
    types::ShardLeaderConfig,
    ENV_PREFIX,
};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Configuration provider using figment
///
/// No caching is performed; every call to [`ConfigProvider::load`] reads the
/// sources again.
#[derive(Debug, Default)]
pub struct ConfigProvider {
    discovery: FileDiscovery,
    explicit_file: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigProvider {
    /// Create a provider reading the default locations
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom discovery (for example rooted at temporary directories)
    pub fn with_discovery(mut self, discovery: FileDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// Merge an explicit file above the discovered ones
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Load and validate the configuration
    pub fn load(&self) -> ConfigResult<ShardLeaderConfig> {
        let config: ShardLeaderConfig = self.build_figment()?.extract()?;
        config.validate()?;

        info!(
            "Loaded configuration for {}/{} as {}",
            config.collection, config.shard, config.core_node_name
        );
        Ok(config)
    }

    /// Build the figment with all sources in precedence order
    ///
    /// 1. Default values
    /// 2. Discovered configuration files (global, then project)
    /// 3. Explicit configuration file
    /// 4. Environment variables
    pub fn build_figment(&self) -> ConfigResult<Figment> {
        debug!("Building figment configuration with precedence order");

        let mut figment = Figment::from(Serialized::defaults(ShardLeaderConfig::default()));

        for file in self.discovery.discover_all() {
            trace!(
                "Loading config file: {} ({:?})",
                file.path.display(),
                file.format
            );
            figment = figment.merge(Self::file_provider(&file));
        }

        if let Some(path) = &self.explicit_file {
            figment = figment.merge(Self::explicit_provider(path)?);
        }

        let prefix = self.env_prefix.as_deref().unwrap_or(ENV_PREFIX);
        Ok(figment.merge(Env::prefixed(prefix).split("__")))
    }

    fn file_provider(file: &ConfigFile) -> Figment {
        let path = &file.path;
        match file.format {
            ConfigFormat::Toml => Figment::from(Toml::file(path)),
            ConfigFormat::Yaml => Figment::from(Yaml::file(path)),
            ConfigFormat::Json => Figment::from(Json::file(path)),
        }
    }

    fn explicit_provider(path: &Path) -> ConfigResult<Figment> {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        // Unknown extensions are read as TOML
        let format = ConfigFormat::from_path(path).unwrap_or(ConfigFormat::Toml);
        Ok(Self::file_provider(&ConfigFile {
            path: path.to_path_buf(),
            format,
            scope: crate::ConfigScope::Project,
        }))
    }
}
