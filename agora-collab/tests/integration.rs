//! End-to-end tests of the collection layer over the in-memory store.
//!
//! Several peers share one replica network, each with its own page data,
//! the way separate clients would share a replicated database.

use agora_collab::store::memory::{MemoryDatabase, MemoryPeer, ReplicaNetwork, StoreConfig};
use agora_collab::{
    AppData, CollabError, CollectionOptions, Database, LikeScope, PageData, StoreError,
    SubCollection,
};
use agora_core::{
    count_format, DebateStage, Debate, Entry, EntryMeta, Group, Message, Presentation, Vote,
    VoteDirection, DEFAULT_GROUP_NAME,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

const EPSILON: f64 = 1e-9;

fn network() -> Arc<ReplicaNetwork> {
    Arc::new(ReplicaNetwork::new(StoreConfig::for_testing()))
}

fn connect(network: &Arc<ReplicaNetwork>, key: &str) -> Arc<MemoryDatabase> {
    let peer = MemoryPeer::new(network.clone(), key);
    assert!(peer.connect());
    Arc::new(peer.open_database("agora").unwrap())
}

async fn page(network: &Arc<ReplicaNetwork>, key: &str) -> PageData<MemoryDatabase> {
    let mut page = PageData::new();
    page.init(connect(network, key), key);
    page.debates().load().await.unwrap();
    page
}

async fn propose(page: &PageData<MemoryDatabase>, title: &str, groups: Vec<Group>) -> Debate {
    let outcome = page
        .debates()
        .add_entry(Debate::new(title, "").with_groups(groups))
        .await
        .unwrap()
        .unwrap();
    page.debates().entry(outcome.id()).unwrap()
}

#[tokio::test]
async fn test_last_write_wins_vote() {
    let net = network();
    let mut votes: SubCollection<Vote, MemoryDatabase> =
        SubCollection::new("debate", "votes", CollectionOptions::everyone_update_own());
    votes.init(connect(&net, "x"), "x");
    votes.load("d1", None, None).await.unwrap();

    votes.add_entry("d1", Vote::new(VoteDirection::For, Some(0))).await.unwrap();
    votes.add_entry("d1", Vote::new(VoteDirection::Against, Some(0))).await.unwrap();

    assert_eq!(votes.entry("d1", "x").unwrap().direction, VoteDirection::Against);
    assert_eq!(votes.entries("d1").len(), 1);
}

#[tokio::test]
async fn test_first_write_wins_duplicate_id() {
    let net = network();
    let mut messages: SubCollection<Message, MemoryDatabase> =
        SubCollection::new("debate", "messages-for", CollectionOptions::everyone_append());
    messages.init(connect(&net, "x"), "x");
    messages.load("d1", None, None).await.unwrap();

    let mut first = Message::new("first");
    first.meta = EntryMeta::with_id("m1");
    let mut second = Message::new("second");
    second.meta = EntryMeta::with_id("m1");

    messages.add_entry("d1", first).await.unwrap();
    let outcome = messages.add_entry("d1", second).await.unwrap().unwrap();

    assert!(!outcome.is_applied());
    assert_eq!(messages.entry("d1", "m1").unwrap().description, "first");
}

#[tokio::test]
async fn test_own_record_cannot_be_forged() {
    let net = network();
    let alice = page(&net, "alice").await;
    alice.presentations().load("d1", None, None).await.unwrap();

    // The id is rewritten to the writer's key before it reaches the store.
    let mut forged = Presentation::new("Slides", "https://example.org/slides");
    forged.meta = EntryMeta::with_id("bob");
    alice.presentations().add_entry("d1", forged).await.unwrap();

    assert!(alice.presentations().entry("d1", "bob").is_none());
    assert_eq!(alice.presentations().entry("d1", "alice").unwrap().title, "Slides");
}

#[tokio::test]
async fn test_only_owner_writes_start_code() {
    let net = network();
    let alice = page(&net, "alice").await;
    let bob = page(&net, "bob").await;
    let debate = propose(&alice, "Ownership", Vec::new()).await;

    bob.start_codes()
        .load(debate.id(), None, Some(debate.owner()))
        .await
        .unwrap();
    let err = bob
        .start_codes()
        .add_entry(debate.id(), agora_core::StartCode::generate())
        .await
        .unwrap_err();

    assert!(matches!(err, CollabError::Store(StoreError::AccessDenied { .. })));
    assert!(bob.start_codes().singular_entry(debate.id()).is_none());
}

#[tokio::test]
async fn test_like_toggle_round_trip() {
    let net = network();
    let alice = page(&net, "alice").await;
    let bob = page(&net, "bob").await;
    let scope = LikeScope::Presentations("d1");
    alice.load_likes(scope).await.unwrap();
    bob.load_likes(scope).await.unwrap();

    alice.toggle_liked(scope, "p1").await.unwrap();
    bob.toggle_liked(scope, "p1").await.unwrap();
    assert_eq!(alice.like_count(scope, "p1"), 2);

    alice.toggle_liked(scope, "p1").await.unwrap();
    assert_eq!(bob.like_count(scope, "p1"), 1);
    assert!(!alice.is_liked(scope, "p1"));
    assert!(bob.is_liked(scope, "p1"));

    let record = alice.presentation_likes().entry("d1", "alice").unwrap();
    assert!(record.ids.is_empty());
}

#[tokio::test]
async fn test_close_then_load_gives_fresh_manager() {
    let net = network();
    let alice = page(&net, "alice").await;
    let bob = page(&net, "bob").await;
    alice.messages_for().load("d1", Some("period"), None).await.unwrap();
    alice.messages_for().add_entry("d1", Message::new("hello")).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let _sub = bob.messages_for().on_updated("d1", move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    bob.messages_for().close("d1");
    assert!(bob.messages_for().entries("d1").is_empty());

    // Load into a fresh slot: the listener registered on the old one is gone.
    bob.messages_for().load("d1", Some("period"), None).await.unwrap();
    assert_eq!(bob.messages_for().entries("d1").len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_remote_writes_refresh_listeners() {
    let net = network();
    let alice = page(&net, "alice").await;
    let bob = page(&net, "bob").await;

    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    let _sub = alice.debates().on_updated(move || {
        s.fetch_add(1, Ordering::SeqCst);
    });

    propose(&bob, "From bob", Vec::new()).await;
    propose(&bob, "Again", Vec::new()).await;

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    let titles: Vec<String> = alice.debates().entries().into_iter().map(|d| d.title).collect();
    assert_eq!(titles, vec!["Again", "From bob"]);
}

#[tokio::test]
async fn test_store_change_feed() {
    let net = network();
    let alice = page(&net, "alice").await;
    let db = connect(&net, "watcher");
    let handle = db
        .open_collection("debate", CollectionOptions::everyone_append())
        .await
        .unwrap();
    let mut changes = handle.watch();

    let debate = propose(&alice, "Watched", Vec::new()).await;

    let event = timeout(Duration::from_secs(1), changes.recv()).await.unwrap().unwrap();
    assert_eq!(event.id, debate.id());
    assert_eq!(event.writer, "alice");
    assert_eq!(handle.stats().writes_applied, 1);
}

#[tokio::test]
async fn test_group_weighting_across_peers() {
    let net = network();
    let owner = page(&net, "owner").await;
    let debate = propose(
        &owner,
        "Library hours",
        vec![Group::new("Students", 60.0), Group::new("Staff", 20.0)],
    )
    .await;
    let id = debate.id().to_string();

    // Eight students and two staff turn out; Default stays home.
    let ballots = [
        (0, VoteDirection::For),
        (0, VoteDirection::For),
        (0, VoteDirection::For),
        (0, VoteDirection::For),
        (0, VoteDirection::For),
        (0, VoteDirection::For),
        (0, VoteDirection::Against),
        (0, VoteDirection::Against),
        (1, VoteDirection::Against),
        (1, VoteDirection::Against),
    ];
    for (i, (group, direction)) in ballots.into_iter().enumerate() {
        let voter = page(&net, &format!("voter-{i}")).await;
        voter.votes().load(&id, None, None).await.unwrap();
        voter.cast_vote(&id, direction, Some(group)).await.unwrap();
    }
    // Out-of-range group: ignored by the tally.
    let stray = page(&net, "stray").await;
    stray.votes().load(&id, None, None).await.unwrap();
    stray.cast_vote(&id, VoteDirection::For, Some(7)).await.unwrap();

    owner.votes().load(&id, None, None).await.unwrap();
    let tally = owner.vote_tally(&id);

    // Students: 80% of turnout for a 60% share, weight 0.75.
    // Staff: 20% of turnout for a 20% share, weight 1.
    assert!((tally.votes_for - 4.5).abs() < EPSILON);
    assert!((tally.votes_against - 3.5).abs() < EPSILON);
    assert_eq!(tally.votes_cast(), 10);
    assert_eq!(tally.groups[2].name, DEFAULT_GROUP_NAME);
    assert_eq!(tally.groups[2].weight, 0.0);
    assert_eq!(count_format(tally.votes_for * 100.0), "450");
}

#[tokio::test]
async fn test_full_debate_lifecycle() {
    let net = network();
    let mut owner_app: AppData<MemoryDatabase> = AppData::new();
    owner_app.init(connect(&net, "owner"), "owner");
    let mut voter_app: AppData<MemoryDatabase> = AppData::new();
    voter_app.init(connect(&net, "voter"), "voter");

    let home = owner_app.home();
    home.debates().load().await.unwrap();
    let debate = propose(home, "Bike lanes", vec![Group::new("Cyclists", 50.0)]).await;
    let id = debate.id();
    assert_eq!(home.debate_status(&debate).await.unwrap().stage(), DebateStage::Upcoming);

    let code = home.start_debate(&debate).await.unwrap();

    // The voter's messages screen works on the active period.
    let screen = voter_app.messages();
    let status = screen.debate_status(&debate).await.unwrap();
    assert_eq!(status.stage(), DebateStage::Active);
    let active_code = status.start_code.unwrap().value;
    screen.load_activity(id, &active_code).await.unwrap();
    screen.messages_for().add_entry(id, Message::new("Safer streets")).await.unwrap();
    screen.messages_against().add_entry(id, Message::new("Less parking")).await.unwrap();
    screen.cast_vote(id, VoteDirection::For, Some(0)).await.unwrap();
    assert_eq!(screen.own_vote_direction(id), VoteDirection::For);
    screen.close_activity(id);

    let archived = home.end_debate(&debate).await.unwrap();
    assert_eq!(archived.messages_for[0].description, "Safer streets");
    assert_eq!(archived.messages_against.len(), 1);
    assert!(archived.votes_for > 0.0);
    assert_eq!(code.value, active_code);

    let screen = voter_app.presentations();
    assert_eq!(screen.debate_status(&debate).await.unwrap().stage(), DebateStage::Ended);

    let user = voter_app.user();
    user.archived_votes().load("voter", None, None).await.unwrap();
    let history = user.user_votes("voter");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].debate_id(), id);
    assert_eq!(history[0].writer_public_key(), "owner");
    assert_eq!(user.user_groups("voter"), vec!["Cyclists".to_string()]);
}

#[tokio::test]
async fn test_new_period_starts_empty() {
    let net = network();
    let alice = page(&net, "alice").await;
    alice.load_activity("d1", "first-code").await.unwrap();
    alice.messages_for().add_entry("d1", Message::new("old")).await.unwrap();
    alice.close_activity("d1");

    alice.load_activity("d1", "second-code").await.unwrap();
    assert!(alice.messages_for().entries("d1").is_empty());
}
