//! Per-shard term table kept in the coordination service
//!
//! A replica may attempt leadership only while its term equals the highest
//! term in the table. The leader raises its own term (and the term of every
//! replica that received a write) whenever a write misses some replica, which
//! leaves the missed replicas behind until they recover from the leader.

use std::collections::BTreeMap;

use shardlead_election::{CoordinationClient, CoordinationError};
use tracing::debug;

use crate::error::Result;

pub type Terms = BTreeMap<String, u64>;

/// Handle to the term node of one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTerms {
    path: String,
}

impl ShardTerms {
    pub fn for_shard(root: &str, collection: &str, shard: &str) -> Self {
        Self {
            path: format!("{root}/{collection}/terms/{shard}"),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create the term node if it does not exist yet
    pub fn ensure(&self, client: &dyn CoordinationClient) -> Result<()> {
        client.make_path(&self.path)?;
        Ok(())
    }

    pub fn read(&self, client: &dyn CoordinationClient) -> Result<Terms> {
        Ok(self.read_versioned(client)?.0)
    }

    fn read_versioned(&self, client: &dyn CoordinationClient) -> Result<(Terms, i32)> {
        let (data, stat) = client.get_data(&self.path)?;
        let terms = if data.is_empty() {
            Terms::new()
        } else {
            serde_json::from_slice(&data)?
        };
        Ok((terms, stat.version))
    }

    /// Apply `change` with a compare-and-set on the node version, retrying on conflict
    pub fn update<F>(&self, client: &dyn CoordinationClient, mut change: F) -> Result<Terms>
    where
        F: FnMut(&mut Terms),
    {
        loop {
            let (mut terms, version) = self.read_versioned(client)?;
            change(&mut terms);
            let data = serde_json::to_vec(&terms)?;
            match client.set_data(&self.path, data, Some(version)) {
                Ok(_) => return Ok(terms),
                Err(CoordinationError::BadVersion { .. }) => {
                    debug!("Term table changed underneath us, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Register a replica at term zero unless it already has a term
    pub fn register(&self, client: &dyn CoordinationClient, core_node_name: &str) -> Result<()> {
        self.update(client, |terms| {
            terms.entry(core_node_name.to_string()).or_insert(0);
        })?;
        Ok(())
    }

    /// Whether `core_node_name` holds the highest term
    pub fn can_become_leader(
        &self,
        client: &dyn CoordinationClient,
        core_node_name: &str,
    ) -> Result<bool> {
        let terms = self.read(client)?;
        Ok(is_up_to_date(&terms, core_node_name))
    }

    /// Move the leader and every replica in `reached` past the current highest term
    pub fn ensure_highest(
        &self,
        client: &dyn CoordinationClient,
        leader: &str,
        reached: &[String],
    ) -> Result<u64> {
        let terms = self.update(client, |terms| {
            let next = max_term(terms) + 1;
            for name in std::iter::once(leader).chain(reached.iter().map(String::as_str)) {
                terms.insert(name.to_string(), next);
            }
        })?;
        Ok(max_term(&terms))
    }

    /// Set `core_node_name` to `term` after it caught up with the leader
    pub fn set_term(
        &self,
        client: &dyn CoordinationClient,
        core_node_name: &str,
        term: u64,
    ) -> Result<()> {
        self.update(client, |terms| {
            terms.insert(core_node_name.to_string(), term);
        })?;
        Ok(())
    }
}

pub fn max_term(terms: &Terms) -> u64 {
    terms.values().copied().max().unwrap_or(0)
}

pub fn is_up_to_date(terms: &Terms, core_node_name: &str) -> bool {
    terms.get(core_node_name).copied().unwrap_or(0) == max_term(terms)
}
