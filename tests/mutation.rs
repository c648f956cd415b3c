//! Integration tests for the mutation applier

mod common;

use std::time::Duration;

use common::{FakeGraph, OWNER_DID, account, accounts, ledger_handles, temp_ledger};
use followtide::atproto::MutationLimiter;
use followtide::data::{Direction, GraphSnapshot, Ledger, LedgerStore};
use followtide::service::{MutationApplier, TESTING_MAX_MUTATIONS};

fn limiter(seconds: u64) -> MutationLimiter {
    MutationLimiter::new(Some(Duration::from_secs(seconds)))
}

#[tokio::test(start_paused = true)]
async fn test_follow_updates_snapshot_and_ledgers() {
    let (_dir, store) = temp_ledger();
    let graph = FakeGraph::new();
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, accounts(&["fan"]), Vec::new());
    let targets = accounts(&["fan", "stranger"]);

    let mut applier = MutationApplier::new(&graph, &store, limiter(3), false);
    let followed = applier
        .apply(&mut snapshot, &targets, Direction::Follow)
        .await;

    assert_eq!(followed, targets);
    assert!(snapshot.is_following("did:plc:fan"));
    assert!(snapshot.is_following("did:plc:stranger"));
    assert!(graph.has_follow_record("did:plc:stranger"));

    let added = store.read_all(Ledger::AddedByEngine).await.unwrap();
    assert_eq!(added.len(), 2);
    assert!(added.iter().all(|entry| entry.added_at.is_some()));
    assert!(added[0].follows_me);
    assert!(!added[1].follows_me);

    assert_eq!(
        ledger_handles(&store, Ledger::AccountsIFollow).await,
        vec!["fan.bsky.social", "stranger.bsky.social"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unfollow_updates_snapshot_and_ledgers() {
    let (_dir, store) = temp_ledger();
    let bob = account("bob");
    let graph = FakeGraph::new().with_operator_graph(Vec::new(), vec![bob.clone()]);
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), vec![bob.clone()]);
    store
        .append_if_absent(
            Ledger::AccountsIFollow,
            &[followtide::data::LedgerEntry::from_account(&bob, None)],
        )
        .await
        .unwrap();

    let mut applier = MutationApplier::new(&graph, &store, limiter(3), false);
    let unfollowed = applier
        .apply(&mut snapshot, &[bob.clone()], Direction::Unfollow)
        .await;

    assert_eq!(unfollowed, vec![bob]);
    assert!(!snapshot.is_following("did:plc:bob"));
    assert!(!graph.has_follow_record("did:plc:bob"));
    assert!(ledger_handles(&store, Ledger::AccountsIFollow).await.is_empty());

    let removed = store.read_all(Ledger::Removed).await.unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].did, "did:plc:bob");
    assert!(removed[0].added_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_skips_account_and_continues() {
    let (_dir, store) = temp_ledger();
    let graph = FakeGraph::new().with_failing_did("did:plc:blocked");
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());
    let targets = accounts(&["blocked", "open"]);

    let mut applier = MutationApplier::new(&graph, &store, limiter(3), false);
    let followed = applier
        .apply(&mut snapshot, &targets, Direction::Follow)
        .await;

    assert_eq!(followed, vec![account("open")]);
    assert!(!snapshot.is_following("did:plc:blocked"));
    assert_eq!(
        graph.mutated_dids(Direction::Follow),
        vec!["did:plc:blocked", "did:plc:open"]
    );
    assert_eq!(
        ledger_handles(&store, Ledger::AddedByEngine).await,
        vec!["open.bsky.social"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unfollow_without_follow_record_fails() {
    let (_dir, store) = temp_ledger();
    let ghost = account("ghost");
    // Followed per snapshot, but the remote holds no record
    let graph = FakeGraph::new();
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), vec![ghost.clone()]);

    let mut applier = MutationApplier::new(&graph, &store, limiter(3), false);
    let unfollowed = applier
        .apply(&mut snapshot, &[ghost], Direction::Unfollow)
        .await;

    assert!(unfollowed.is_empty());
    assert!(snapshot.is_following("did:plc:ghost"));
    assert!(store.read_all(Ledger::Removed).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unfollow_of_unfollowed_account_is_a_no_op() {
    let (_dir, store) = temp_ledger();
    let graph = FakeGraph::new();
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());

    let mut applier = MutationApplier::new(&graph, &store, limiter(3), false);
    let started = tokio::time::Instant::now();
    let unfollowed = applier
        .apply(&mut snapshot, &accounts(&["x", "y"]), Direction::Unfollow)
        .await;

    assert!(unfollowed.is_empty());
    assert!(graph.mutations().is_empty());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_starts_are_spaced_by_interval() {
    let (_dir, store) = temp_ledger();
    let graph = FakeGraph::new().with_failing_did("did:plc:second");
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());

    let mut applier = MutationApplier::new(&graph, &store, limiter(3), false);
    applier
        .apply(
            &mut snapshot,
            &accounts(&["first", "second", "third"]),
            Direction::Follow,
        )
        .await;

    let calls = graph.mutations();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].started_at - pair[0].started_at >= Duration::from_secs(3));
    }
}

#[tokio::test(start_paused = true)]
async fn test_testing_mode_truncates_batch() {
    let (_dir, store) = temp_ledger();
    let graph = FakeGraph::new();
    let mut snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());
    let names: Vec<String> = (0..TESTING_MAX_MUTATIONS + 5).map(|n| format!("t{n}")).collect();
    let targets: Vec<_> = names.iter().map(|name| account(name)).collect();

    let mut applier = MutationApplier::new(&graph, &store, limiter(0), true);
    let followed = applier
        .apply(&mut snapshot, &targets, Direction::Follow)
        .await;

    assert_eq!(followed.len(), TESTING_MAX_MUTATIONS);
    assert_eq!(graph.mutations().len(), TESTING_MAX_MUTATIONS);
}
