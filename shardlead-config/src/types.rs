//! Configuration types

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default root under which per-collection coordination nodes live
pub const DEFAULT_ROOT: &str = "/collections";

/// Default shard name
pub const DEFAULT_SHARD: &str = "shard1";

/// Identity and publishing settings of one shard leader candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardLeaderConfig {
    /// Root path of the per-collection tree in the coordination service
    pub root: String,
    /// Collection the shard belongs to
    pub collection: String,
    /// Shard name within the collection
    pub shard: String,
    /// Identifier of the registering replica
    pub core_node_name: String,
    /// Name of the node hosting the replica
    pub node_name: String,
    /// Base URL other participants use to reach the leader
    pub base_url: String,
    /// Core name on the hosting node
    pub core: String,
    /// Access control applied to the leader marker
    pub acl: AclConfig,
}

impl Default for ShardLeaderConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            collection: String::new(),
            shard: DEFAULT_SHARD.to_string(),
            core_node_name: String::new(),
            node_name: String::new(),
            base_url: String::new(),
            core: String::new(),
            acl: AclConfig::default(),
        }
    }
}

impl ShardLeaderConfig {
    /// Check the fields every candidate must have
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.root.starts_with('/') {
            return Err(ConfigError::validation(format!(
                "root must be an absolute path, got '{}'",
                self.root
            )));
        }
        for (name, value) in [
            ("collection", &self.collection),
            ("shard", &self.shard),
            ("core_node_name", &self.core_node_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::validation(format!("{name} must not be empty")));
            }
            if value.contains('/') {
                return Err(ConfigError::validation(format!(
                    "{name} must not contain '/', got '{value}'"
                )));
            }
        }
        self.acl.validate()
    }
}

/// Digest credentials for the leader marker's ACL
///
/// Digests are given pre-computed, in the coordination service's
/// `user:base64(sha1(user:password))` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// User granted all permissions
    pub all_user: Option<String>,
    /// Digest for `all_user`
    pub all_digest: Option<String>,
    /// User granted read permission only
    pub readonly_user: Option<String>,
    /// Digest for `readonly_user`
    pub readonly_digest: Option<String>,
}

impl AclConfig {
    /// Whether any digest credentials are configured
    pub fn is_configured(&self) -> bool {
        self.all_user.is_some() || self.readonly_user.is_some()
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.all_user.is_some() != self.all_digest.is_some() {
            return Err(ConfigError::validation(
                "acl.all_user and acl.all_digest must be set together",
            ));
        }
        if self.readonly_user.is_some() != self.readonly_digest.is_some() {
            return Err(ConfigError::validation(
                "acl.readonly_user and acl.readonly_digest must be set together",
            ));
        }
        Ok(())
    }
}
