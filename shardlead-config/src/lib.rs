//! shardlead configuration management using Figment
//!
//! Loads the identity of a shard leader candidate (which collection and shard
//! it serves, which core it is, where it can be reached) and the ACL settings
//! used when it publishes its leader marker.
//!
//! # Precedence
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults
//! 2. Global file: `~/.shardlead/shardlead.{toml,yaml,yml,json}`
//! 3. Project file: `./.shardlead/shardlead.{toml,yaml,yml,json}`
//! 4. An explicit file passed to [`ConfigProvider::with_file`]
//! 5. `SHARDLEAD_` environment variables, nested keys separated by `__`
//!    (for example `SHARDLEAD_ACL__ALL_USER`)
//!
//! # Example
//!
//! ```no_run
//! use shardlead_config::ConfigProvider;
//!
//! let config = ConfigProvider::new().load()?;
//! println!("{}/{} as {}", config.collection, config.shard, config.core_node_name);
//! # Ok::<(), shardlead_config::ConfigError>(())
//! ```

pub mod discovery;
pub mod error;
pub mod provider;
pub mod types;


pub use discovery::{ConfigFile, ConfigFormat, ConfigScope, FileDiscovery};
pub use error::{ConfigError, ConfigResult};
pub use provider::ConfigProvider;
pub use types::{AclConfig, ShardLeaderConfig};

/// Directory name searched for configuration files
pub const CONFIG_DIR_NAME: &str = ".shardlead";

/// Base file name (without extension) of configuration files
pub const CONFIG_FILE_STEM: &str = "shardlead";

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "SHARDLEAD_";

/// Load configuration from all default sources
pub fn load_configuration() -> ConfigResult<ShardLeaderConfig> {
    ConfigProvider::new().load()
}
