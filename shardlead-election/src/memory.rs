//! In-process coordination service
//!
//! A linearizable, single-process implementation of [`CoordinationClient`]:
//! one [`InMemoryCoordinator`] plays the ensemble and hands out
//! [`InMemoryClient`]s, each bound to its own session. Sessions can be
//! expired, connections dropped, and failures injected, which is what the
//! registration protocol has to survive.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::acl::{Acl, AclProvider, OpenAclProvider};
use crate::coordination::{
    CoordinationClient, CoordinationError, CoordinationResult, CreateMode, ErrorCode, Op,
    OpResult, SessionId, Stat,
};
use crate::paths::parent_path;

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    stat: Stat,
}

impl Node {
    fn new(data: Vec<u8>, acl: Vec<Acl>, ephemeral_owner: Option<SessionId>) -> Self {
        Self {
            data,
            acl,
            stat: Stat {
                ephemeral_owner,
                ..Stat::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Expired,
    Closed,
}

type Tree = BTreeMap<String, Node>;

#[derive(Debug)]
struct Ensemble {
    nodes: Tree,
    sessions: HashMap<SessionId, SessionState>,
    next_session: SessionId,
}

impl Default for Ensemble {
    fn default() -> Self {
        let mut nodes = Tree::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), Acl::open_unsafe(), None));
        Self {
            nodes,
            sessions: HashMap::new(),
            next_session: 1,
        }
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

fn children_of<'a>(tree: &'a Tree, path: &str) -> impl Iterator<Item = &'a str> + 'a {
    let prefix = child_prefix(path);
    let len = prefix.len();
    tree.range(prefix.clone()..)
        .take_while(move |(key, _)| key.starts_with(prefix.as_str()))
        .filter_map(move |(key, _)| {
            let rest = &key[len..];
            (!rest.is_empty() && !rest.contains('/')).then_some(rest)
        })
}

fn check_version(path: &str, node: &Node, expected: Option<i32>) -> CoordinationResult<()> {
    match expected {
        Some(expected) if expected != node.stat.version => Err(CoordinationError::BadVersion {
            path: path.to_string(),
            expected,
            actual: node.stat.version,
        }),
        _ => Ok(()),
    }
}

fn no_node(path: &str) -> CoordinationError {
    CoordinationError::NoNode {
        path: path.to_string(),
    }
}

fn parent_of(path: &str) -> CoordinationResult<&str> {
    parent_path(path).map_err(|_| no_node(path))
}

/// Apply one operation to a staged tree
fn apply(tree: &mut Tree, session: SessionId, op: Op) -> CoordinationResult<OpResult> {
    match op {
        Op::Check { path, version } => {
            let node = tree.get(&path).ok_or_else(|| no_node(&path))?;
            check_version(&path, node, version)?;
            Ok(OpResult::Check)
        }
        Op::Create {
            path,
            data,
            acl,
            mode,
        } => {
            let parent = parent_of(&path)?.to_string();
            let parent_node = tree.get_mut(&parent).ok_or_else(|| no_node(&path))?;
            if parent_node.stat.ephemeral_owner.is_some() {
                return Err(CoordinationError::NoChildrenForEphemerals { path });
            }
            let actual = if mode.is_sequential() {
                format!("{path}{:010}", parent_node.stat.cversion)
            } else {
                path
            };
            if tree.contains_key(&actual) {
                return Err(CoordinationError::NodeExists { path: actual });
            }
            let owner = mode.is_ephemeral().then_some(session);
            tree.insert(actual.clone(), Node::new(data, acl, owner));
            if let Some(parent_node) = tree.get_mut(&parent) {
                parent_node.stat.cversion += 1;
            }
            Ok(OpResult::Create { path: actual })
        }
        Op::SetData {
            path,
            data,
            version,
        } => {
            let node = tree.get_mut(&path).ok_or_else(|| no_node(&path))?;
            check_version(&path, node, version)?;
            if let Some(data) = data {
                node.data = data;
            }
            node.stat.version += 1;
            Ok(OpResult::SetData { stat: node.stat })
        }
        Op::Delete { path, version } => {
            let node = tree.get(&path).ok_or_else(|| no_node(&path))?;
            check_version(&path, node, version)?;
            if path == "/" || children_of(tree, &path).next().is_some() {
                return Err(CoordinationError::NotEmpty { path });
            }
            tree.remove(&path);
            let parent = parent_of(&path)?.to_string();
            if let Some(parent_node) = tree.get_mut(&parent) {
                parent_node.stat.cversion += 1;
            }
            Ok(OpResult::Delete)
        }
    }
}

impl Ensemble {
    /// Session liveness, checked under the same lock that applies or reads the tree
    fn ensure_active(&self, session: SessionId) -> CoordinationResult<()> {
        match self.sessions.get(&session) {
            Some(SessionState::Active) => Ok(()),
            Some(SessionState::Closed) => Err(CoordinationError::Closed),
            Some(SessionState::Expired) | None => Err(CoordinationError::SessionExpired),
        }
    }

    fn multi(&mut self, session: SessionId, ops: Vec<Op>) -> CoordinationResult<Vec<OpResult>> {
        self.ensure_active(session)?;
        let count = ops.len();
        let mut staged = self.nodes.clone();
        let mut results = Vec::with_capacity(count);

        for (index, op) in ops.into_iter().enumerate() {
            match apply(&mut staged, session, op) {
                Ok(result) => results.push(result),
                Err(source) => {
                    let mut results = vec![OpResult::Error(ErrorCode::Ok); index];
                    results.push(OpResult::Error(
                        source.code().unwrap_or(ErrorCode::RuntimeInconsistency),
                    ));
                    results.resize(count, OpResult::Error(ErrorCode::RuntimeInconsistency));
                    trace!("Batch rolled back at operation {}: {}", index, source);
                    return Err(CoordinationError::Transaction {
                        index,
                        results,
                        source: Box::new(source),
                    });
                }
            }
        }

        self.nodes = staged;
        Ok(results)
    }

    fn end_session(&mut self, session: SessionId, state: SessionState) {
        match self.sessions.get(&session) {
            Some(SessionState::Active) => {}
            _ => return,
        }
        self.sessions.insert(session, state);

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &owned {
            self.nodes.remove(path);
            if let Ok(parent) = parent_path(path) {
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.stat.cversion += 1;
                }
            }
        }
        debug!(
            "Session {} ended ({:?}), removed {} ephemeral node(s)",
            session,
            state,
            owned.len()
        );
    }
}

/// The in-process ensemble; clones share the same tree
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordinator {
    state: Arc<Mutex<Ensemble>>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ensemble> {
        self.state.lock().expect("coordination state mutex poisoned")
    }

    /// Open a session with open ACLs
    pub fn connect(&self) -> InMemoryClient {
        self.connect_with_acl(Arc::new(OpenAclProvider))
    }

    /// Open a session whose created nodes carry ACLs from `acl_provider`
    pub fn connect_with_acl(&self, acl_provider: Arc<dyn AclProvider>) -> InMemoryClient {
        let session = {
            let mut ensemble = self.lock();
            let session = ensemble.next_session;
            ensemble.next_session += 1;
            ensemble.sessions.insert(session, SessionState::Active);
            session
        };
        debug!("Opened session {}", session);
        InMemoryClient {
            ensemble: self.clone(),
            session,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            acl_provider,
            pending_failure: Mutex::new(None),
        }
    }

    /// Expire a session: its ephemeral nodes vanish and its client sees
    /// `SessionExpired` on the next operation
    pub fn expire_session(&self, session: SessionId) {
        self.lock().end_session(session, SessionState::Expired);
    }

    fn close_session(&self, session: SessionId) {
        self.lock().end_session(session, SessionState::Closed);
    }

    pub fn node_exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    pub fn node_data(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(path).map(|node| node.data.clone())
    }

    pub fn node_stat(&self, path: &str) -> Option<Stat> {
        self.lock().nodes.get(path).map(|node| node.stat)
    }

    pub fn node_acl(&self, path: &str) -> Option<Vec<Acl>> {
        self.lock().nodes.get(path).map(|node| node.acl.clone())
    }
}

/// A client handle bound to one session of an [`InMemoryCoordinator`]
pub struct InMemoryClient {
    ensemble: InMemoryCoordinator,
    session: SessionId,
    connected: AtomicBool,
    closed: AtomicBool,
    acl_provider: Arc<dyn AclProvider>,
    pending_failure: Mutex<Option<CoordinationError>>,
}

impl InMemoryClient {
    /// Drop the connection; the session stays alive on the ensemble
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Close the handle and end the session, removing its ephemeral nodes
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.ensemble.close_session(self.session);
        }
    }

    /// Make the next `multi` fail with `error` without touching the tree
    pub fn fail_next_multi(&self, error: CoordinationError) {
        *self
            .pending_failure
            .lock()
            .expect("pending failure mutex poisoned") = Some(error);
    }

    pub fn ensemble(&self) -> &InMemoryCoordinator {
        &self.ensemble
    }

    /// Lock the ensemble for this session's use
    ///
    /// The session is checked while the returned guard is held, so an expiry
    /// cannot slip in between the check and the operation.
    fn usable_ensemble(&self) -> CoordinationResult<MutexGuard<'_, Ensemble>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoordinationError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CoordinationError::ConnectionLoss);
        }
        let ensemble = self.ensemble.lock();
        ensemble.ensure_active(self.session)?;
        Ok(ensemble)
    }
}

impl std::fmt::Debug for InMemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClient")
            .field("session", &self.session)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl CoordinationClient for InMemoryClient {
    fn multi(&self, ops: Vec<Op>) -> CoordinationResult<Vec<OpResult>> {
        let injected = self
            .pending_failure
            .lock()
            .expect("pending failure mutex poisoned")
            .take();
        if let Some(error) = injected {
            return Err(error);
        }
        self.usable_ensemble()?.multi(self.session, ops)
    }

    fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, Stat)> {
        self.usable_ensemble()?
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
            .ok_or_else(|| no_node(path))
    }

    fn exists(&self, path: &str) -> CoordinationResult<Option<Stat>> {
        Ok(self.usable_ensemble()?.nodes.get(path).map(|node| node.stat))
    }

    fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        let ensemble = self.usable_ensemble()?;
        if !ensemble.nodes.contains_key(path) {
            return Err(no_node(path));
        }
        Ok(children_of(&ensemble.nodes, path)
            .map(str::to_string)
            .collect())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> SessionId {
        self.session
    }

    fn acl_provider(&self) -> &dyn AclProvider {
        self.acl_provider.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_path_and_children() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.make_path("/a/b/c").unwrap();
        client.make_path("/a/b/d").unwrap();

        let mut children = client.get_children("/a/b").unwrap();
        children.sort();
        assert_eq!(children, vec!["c", "d"]);
        assert_eq!(client.get_children("/").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_failed_batch_applies_nothing() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.make_path("/a").unwrap();

        let err = client
            .multi(vec![
                Op::create("/a/x", Vec::new(), Acl::open_unsafe(), CreateMode::Persistent),
                Op::set_data("/a", None, None),
                Op::check("/missing", None),
            ])
            .unwrap_err();

        assert!(!coordinator.node_exists("/a/x"));
        assert_eq!(coordinator.node_stat("/a").unwrap().version, 0);
        match err {
            CoordinationError::Transaction { index, results, .. } => {
                assert_eq!(index, 2);
                assert_eq!(
                    results,
                    vec![
                        OpResult::Error(ErrorCode::Ok),
                        OpResult::Error(ErrorCode::Ok),
                        OpResult::Error(ErrorCode::NoNode),
                    ]
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_later_ops_report_runtime_inconsistency() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();

        let err = client
            .multi(vec![Op::delete("/nope", None), Op::check("/", None)])
            .unwrap_err();
        assert_eq!(
            err.results(),
            &[
                OpResult::Error(ErrorCode::NoNode),
                OpResult::Error(ErrorCode::RuntimeInconsistency)
            ]
        );
    }

    #[test]
    fn test_set_data_without_payload_bumps_version_only() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.create("/p", b"keep".to_vec(), CreateMode::Persistent).unwrap();

        let results = client.multi(vec![Op::set_data("/p", None, None)]).unwrap();
        assert_eq!(results[0], OpResult::SetData { stat: coordinator.node_stat("/p").unwrap() });
        assert_eq!(coordinator.node_stat("/p").unwrap().version, 1);
        assert_eq!(coordinator.node_data("/p").unwrap(), b"keep");
    }

    #[test]
    fn test_versioned_delete() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.create("/v", Vec::new(), CreateMode::Persistent).unwrap();
        client.set_data("/v", b"1".to_vec(), Some(0)).unwrap();

        assert!(matches!(
            client.delete("/v", Some(0)),
            Err(CoordinationError::BadVersion { expected: 0, actual: 1, .. })
        ));
        client.delete("/v", Some(1)).unwrap();
        assert!(!coordinator.node_exists("/v"));
    }

    #[test]
    fn test_sequential_nodes_are_ordered() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.make_path("/q").unwrap();

        let first = client.create("/q/n_", Vec::new(), CreateMode::EphemeralSequential).unwrap();
        let second = client.create("/q/n_", Vec::new(), CreateMode::EphemeralSequential).unwrap();

        assert_eq!(first, "/q/n_0000000000");
        assert_eq!(second, "/q/n_0000000001");
    }

    #[test]
    fn test_delete_with_children_fails() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.make_path("/a/b").unwrap();
        assert!(matches!(
            client.delete("/a", None),
            Err(CoordinationError::NotEmpty { .. })
        ));
    }

    #[test]
    fn test_ephemeral_cannot_have_children() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.create("/e", Vec::new(), CreateMode::Ephemeral).unwrap();
        assert!(matches!(
            client.create("/e/child", Vec::new(), CreateMode::Persistent),
            Err(CoordinationError::NoChildrenForEphemerals { .. })
        ));
    }

    #[test]
    fn test_expired_session_loses_ephemerals() {
        let coordinator = InMemoryCoordinator::new();
        let owner = coordinator.connect();
        let observer = coordinator.connect();
        owner.create("/e", Vec::new(), CreateMode::Ephemeral).unwrap();
        owner.create("/p", Vec::new(), CreateMode::Persistent).unwrap();

        coordinator.expire_session(owner.session_id());

        assert!(observer.exists("/e").unwrap().is_none());
        assert!(observer.exists("/p").unwrap().is_some());
        assert!(owner.is_connected());
        assert_eq!(owner.exists("/p"), Err(CoordinationError::SessionExpired));
    }

    #[test]
    fn test_expiry_racing_create_leaves_no_ephemeral_behind() {
        let coordinator = InMemoryCoordinator::new();
        for i in 0..500 {
            let client = coordinator.connect();
            let session = client.session_id();
            let path = format!("/e{i}");

            std::thread::scope(|scope| {
                scope.spawn(|| coordinator.expire_session(session));
                // Either outcome is fine; an expired owner is not
                let _ = client.create(&path, Vec::new(), CreateMode::Ephemeral);
            });

            assert!(
                !coordinator.node_exists(&path),
                "{path} outlived its expired session"
            );
        }
    }

    #[test]
    fn test_batch_from_expired_session_applies_nothing() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        coordinator.expire_session(client.session_id());

        assert_eq!(
            coordinator
                .lock()
                .multi(
                    client.session_id(),
                    vec![Op::create("/e", Vec::new(), Acl::open_unsafe(), CreateMode::Ephemeral)],
                ),
            Err(CoordinationError::SessionExpired)
        );
        assert!(!coordinator.node_exists("/e"));
    }

    #[test]
    fn test_close_ends_session() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.create("/e", Vec::new(), CreateMode::Ephemeral).unwrap();

        client.close();

        assert!(client.is_closed());
        assert!(!client.is_connected());
        assert!(!coordinator.node_exists("/e"));
        assert_eq!(client.exists("/"), Err(CoordinationError::Closed));
    }

    #[test]
    fn test_disconnect_and_reconnect() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.disconnect();
        assert!(!client.is_connected());
        assert_eq!(client.exists("/"), Err(CoordinationError::ConnectionLoss));
        client.reconnect();
        assert!(client.exists("/").unwrap().is_some());
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let coordinator = InMemoryCoordinator::new();
        let client = coordinator.connect();
        client.fail_next_multi(CoordinationError::Interrupted);

        assert_eq!(
            client.create("/x", Vec::new(), CreateMode::Persistent),
            Err(CoordinationError::Interrupted)
        );
        assert!(!coordinator.node_exists("/x"));
        client.create("/x", Vec::new(), CreateMode::Persistent).unwrap();
    }

    #[test]
    fn test_created_nodes_carry_provider_acls() {
        let coordinator = InMemoryCoordinator::new();
        let provider = crate::acl::DigestAclProvider::new().with_all_user("admin", "abc=");
        let client = coordinator.connect_with_acl(Arc::new(provider));
        client.create("/secured", Vec::new(), CreateMode::Persistent).unwrap();

        let acl = coordinator.node_acl("/secured").unwrap();
        assert_eq!(acl[0].scheme, "digest");
    }
}
