//! Layout of the per-shard election nodes

use crate::error::{ElectionError, Result};

/// Paths shared by every candidate of one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionPaths {
    /// Parent of the candidates' queue entries
    pub election_path: String,
    /// The single leader marker
    pub leader_path: String,
}

impl ElectionPaths {
    pub fn for_shard(root: &str, collection: &str, shard: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            election_path: format!("{root}/{collection}/leader_elect/{shard}/election"),
            leader_path: format!("{root}/{collection}/leaders/{shard}/leader"),
        }
    }

    /// Node whose data version acts as the ownership token
    pub fn leader_parent(&self) -> Result<&str> {
        parent_path(&self.leader_path)
    }
}

/// Parent of an absolute node path
///
/// `/a/b` has parent `/a`, and `/a` has parent `/`.
pub fn parent_path(path: &str) -> Result<&str> {
    if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') || path.contains("//") {
        return Err(ElectionError::InvalidPath(path.to_string()));
    }
    match path.rfind('/') {
        Some(0) => Ok("/"),
        Some(idx) => Ok(&path[..idx]),
        None => Err(ElectionError::InvalidPath(path.to_string())),
    }
}

/// Last segment of a node path
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
