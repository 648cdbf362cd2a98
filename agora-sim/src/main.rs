//! Headless debate simulation against the in-memory store.
//!
//! One owner proposes and runs a debate while a crowd of generated peers
//! posts messages, likes them and votes. Set `RUST_LOG=info` (or `debug`
//! for collection lifecycle events) to follow along.

use std::sync::Arc;

use agora_collab::store::memory::{MemoryDatabase, MemoryPeer, ReplicaNetwork, StoreConfig};
use agora_collab::{AppData, CollabError, LikeScope, PageData, StoreError};
use agora_core::{count_format, Debate, Entry, Group, Message, VoteDirection};
use log::{error, info, warn};

const VOTERS_VAR: &str = "AGORA_SIM_VOTERS";

/// Simulation settings.
#[derive(Debug, Clone)]
struct SimConfig {
    voters: usize,
    groups: Vec<Group>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            voters: 12,
            groups: vec![Group::new("Residents", 50.0), Group::new("Business", 30.0)],
        }
    }
}

impl SimConfig {
    fn from_env() -> Self {
        Self::default().with_voters(std::env::var(VOTERS_VAR).ok().as_deref())
    }

    fn with_voters(mut self, value: Option<&str>) -> Self {
        if let Some(value) = value {
            match value.trim().parse() {
                Ok(voters) => self.voters = voters,
                Err(_) => warn!("Ignoring {VOTERS_VAR}={value:?}, keeping {}", self.voters),
            }
        }
        self
    }
}

/// Connect a fresh peer and open its database session.
fn join(network: &Arc<ReplicaNetwork>) -> Result<(String, Arc<MemoryDatabase>), CollabError> {
    let peer = MemoryPeer::generate(network.clone());
    peer.connect();
    let key = peer.public_identity().ok_or(StoreError::NotConnected)?;
    let db = peer.open_database("agora").ok_or(StoreError::NotConnected)?;
    Ok((key, Arc::new(db)))
}

/// Direction for the i-th voter: two in three vote for.
fn direction_for(i: usize) -> VoteDirection {
    if i % 3 == 2 {
        VoteDirection::Against
    } else {
        VoteDirection::For
    }
}

async fn participate(
    network: &Arc<ReplicaNetwork>,
    debate: &Debate,
    group_count: usize,
    i: usize,
) -> Result<String, CollabError> {
    let (key, db) = join(network)?;
    let mut page: PageData<MemoryDatabase> = PageData::new();
    page.init(db, key.clone());

    let id = debate.id();
    let status = page.debate_status(debate).await?;
    let code = status.start_code.ok_or_else(|| CollabError::MissingStartCode(id.to_string()))?;
    page.load_activity(id, &code.value).await?;

    let direction = direction_for(i);
    let side = match direction {
        VoteDirection::Against => page.messages_against(),
        _ => page.messages_for(),
    };
    side.add_entry(id, Message::new(format!("Argument #{i}"))).await?;

    // Everyone likes the oldest argument for.
    let scope = LikeScope::MessagesFor(id);
    page.load_likes(scope).await?;
    if let Some(first) = page.messages_for().entries(id).last() {
        page.toggle_liked(scope, first.id()).await?;
    }
    page.close_likes(scope);

    page.cast_vote(id, direction, Some(i % group_count.max(1))).await?;
    page.close_activity(id);
    Ok(key)
}

async fn run(config: SimConfig) -> Result<(), CollabError> {
    let network = Arc::new(ReplicaNetwork::new(StoreConfig::default()));

    let (owner_key, owner_db) = join(&network)?;
    let mut app: AppData<MemoryDatabase> = AppData::new();
    app.init(owner_db, owner_key.clone());
    let home = app.home();
    home.debates().load().await?;

    let proposal = Debate::new("Car-free city centre", "Close the centre to cars on weekends")
        .with_groups(config.groups.clone());
    let outcome = home
        .debates()
        .add_entry(proposal)
        .await?
        .ok_or(CollabError::NotInitialized)?;
    let debate = home
        .debates()
        .entry(outcome.id())
        .ok_or_else(|| CollabError::UnknownDebate(outcome.id().to_string()))?;
    let groups = home.normalized_groups(debate.id());
    info!("{owner_key} proposed {} with {} groups", debate.id(), groups.len());

    home.start_debate(&debate).await?;

    let mut voters = Vec::with_capacity(config.voters);
    for i in 0..config.voters {
        voters.push(participate(&network, &debate, groups.len(), i).await?);
    }

    let archived = home.end_debate(&debate).await?;
    info!(
        "Final tally: {} for, {} against ({} messages for, {} against)",
        count_format(archived.votes_for),
        count_format(archived.votes_against),
        archived.messages_for.len(),
        archived.messages_against.len()
    );

    if let Some(voter) = voters.first() {
        let user = app.user();
        user.archived_votes().load(voter, None, None).await?;
        info!("{voter} has voted in {:?}", user.user_groups(voter));
        user.archived_votes().close(voter);
    }
    info!("{} collections on the network", network.collection_count().await);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = SimConfig::from_env();
    info!("Starting Agora simulation with {} voters...", config.voters);

    if let Err(e) = run(config).await {
        error!("Simulation failed: {e}");
        std::process::exit(1);
    }
}
