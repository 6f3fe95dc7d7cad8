//! Leader metadata published in the marker node

use serde::{Deserialize, Serialize};
use shardlead_config::ShardLeaderConfig;

use crate::error::Result;

/// Connection info of a shard leader, serialized as JSON into the leader marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderProps {
    pub core_node_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub core: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub shard: String,
}

impl LeaderProps {
    pub fn from_config(config: &ShardLeaderConfig) -> Self {
        Self {
            core_node_name: config.core_node_name.clone(),
            node_name: config.node_name.clone(),
            base_url: config.base_url.clone(),
            core: config.core.clone(),
            collection: config.collection.clone(),
            shard: config.shard.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
