//! Claiming the leader marker

mod common;

use common::TestShard;
use shardlead_election::{
    CoordinationClient, CoordinationError, CreateMode, ElectionError, LeaderProps, Registration,
};

#[test_log::test]
fn test_become_leader_publishes_marker_and_captures_token() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    let before = shard.leader_parent_version();

    let registration = candidate.leader.become_leader().unwrap();

    let token = registration.token().expect("registered");
    assert_eq!(token.parent_version(), before + 1);
    assert_eq!(token.parent_version(), shard.leader_parent_version());
    assert_eq!(candidate.leader.ownership_token(), Some(token));
    assert_eq!(shard.current_leader().as_deref(), Some("core_node1"));

    let stat = shard.coordinator.node_stat(&shard.paths.leader_path).unwrap();
    assert_eq!(stat.ephemeral_owner, Some(candidate.client.session_id()));
}

#[test_log::test]
fn test_marker_carries_leader_props() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    candidate.leader.become_leader().unwrap();

    let props = LeaderProps::from_bytes(
        &shard.coordinator.node_data(&shard.paths.leader_path).unwrap(),
    )
    .unwrap();
    assert_eq!(&props, candidate.leader.context().leader_props());
    assert_eq!(props.base_url, "http://127.0.0.1:8983/solr");
    assert_eq!(props.shard, "shard1");
}

#[test_log::test]
fn test_existing_marker_fails_registration_without_side_effects() {
    let shard = TestShard::new();
    let first = shard.candidate("core_node1");
    let second = shard.candidate("core_node2");
    first.leader.become_leader().unwrap();
    let version = shard.leader_parent_version();

    let err = second.leader.become_leader().unwrap_err();

    match err {
        ElectionError::Registration { leader_path, source } => {
            assert_eq!(leader_path, shard.paths.leader_path);
            assert!(matches!(
                source.into_root(),
                CoordinationError::NodeExists { .. }
            ));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(second.leader.ownership_token(), None);
    assert_eq!(shard.leader_parent_version(), version);
    assert_eq!(shard.current_leader().as_deref(), Some("core_node1"));
}

#[test_log::test]
fn test_missing_queue_entry_fails_registration() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    shard.admin().delete(candidate.seq_path(), None).unwrap();

    let err = candidate.leader.become_leader().unwrap_err();

    match err {
        ElectionError::Registration { source, .. } => match source.into_root() {
            CoordinationError::NoNode { path } => assert_eq!(path, candidate.seq_path()),
            other => panic!("unexpected root cause {other:?}"),
        },
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!shard.coordinator.node_exists(&shard.paths.leader_path));
    assert_eq!(shard.leader_parent_version(), 0);
}

#[test_log::test]
fn test_stale_candidate_after_session_expiry_cannot_register() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    shard.coordinator.expire_session(candidate.client.session_id());

    let err = candidate.leader.become_leader().unwrap_err();

    assert!(matches!(err, ElectionError::Registration { .. }));
    assert!(shard.current_leader().is_none());
}

#[test_log::test]
fn test_closed_context_skips_registration() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    candidate.leader.close();

    let registration = candidate.leader.become_leader().unwrap();

    assert_eq!(registration, Registration::SkippedClosed);
    assert!(shard.current_leader().is_none());
    assert_eq!(shard.leader_parent_version(), 0);
}

#[test_log::test]
fn test_closed_client_skips_registration() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    candidate.client.close();

    assert!(candidate.leader.is_closed());
    assert_eq!(
        candidate.leader.become_leader().unwrap(),
        Registration::SkippedClosed
    );
}

#[test_log::test]
fn test_marker_disappears_with_its_session() {
    let shard = TestShard::new();
    let candidate = shard.candidate("core_node1");
    candidate.leader.become_leader().unwrap();

    shard.coordinator.expire_session(candidate.client.session_id());

    assert!(shard.current_leader().is_none());
    assert!(!shard.coordinator.node_exists(candidate.seq_path()));
}

#[test_log::test]
fn test_marker_uses_client_acls() {
    let shard = TestShard::new();
    let provider = shardlead_election::DigestAclProvider::new().with_all_user("admin", "abc=");
    let client = std::sync::Arc::new(shard.coordinator.connect_with_acl(std::sync::Arc::new(provider)));
    let seq_path = client
        .create(
            &format!("{}/core_node1-n_", shard.paths.election_path),
            Vec::new(),
            CreateMode::EphemeralSequential,
        )
        .unwrap();
    let context =
        shardlead_election::ElectionContext::from_config(&shard.config("core_node1"), seq_path)
            .unwrap();
    let leader = shardlead_election::ShardLeaderElectionContext::new(context, client);

    leader.become_leader().unwrap();

    let acl = shard.coordinator.node_acl(&shard.paths.leader_path).unwrap();
    assert_eq!(acl.len(), 1);
    assert_eq!(acl[0].scheme, "digest");
    assert_eq!(acl[0].id, "admin:abc=");
}
