//! Per-screen data façade over the debate collections.
//!
//! ```text
//! PageData
//! ├── debate                                   Collection     everyone appends
//! ├── debate-likes                             Collection     one record per liker
//! ├── debate-{id}-messages-for[-{code}]        SubCollection  everyone appends
//! ├── debate-{id}-messages-against[-{code}]    SubCollection  everyone appends
//! ├── debate-{id}-presentations[-{code}]       SubCollection  one per presenter
//! ├── debate-{id}-votes[-{code}]               SubCollection  one per voter
//! ├── debate-{id}-startcodes                   SubCollection  owner, once
//! ├── debate-{id}-archived                     SubCollection  owner, once
//! ├── debate-{id}-messages-for-likes           SubCollection  one per liker
//! ├── debate-{id}-messages-against-likes       SubCollection  one per liker
//! ├── debate-{id}-presentations-likes          SubCollection  one per liker
//! └── user-{key}-votes                         SubCollection  voting history
//! ```
//!
//! `{code}` is the debate's start code, which keeps one activity period
//! apart from any later one under the same debate id.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::{
    count_likes, normalize_groups, sort_by_likes, tally_votes, toggle_like, ArchivedDebate,
    ArchivedVote, Debate, DebateStatus, Entry, Group, Likes, Message, Presentation, StartCode,
    Vote, VoteDirection, VoteTally,
};

use crate::collection::Collection;
use crate::error::CollabError;
use crate::notifier::{Listener, Notifier, Subscription};
use crate::store::{CollectionOptions, Database, WriteOutcome};
use crate::sub_collection::SubCollection;

const DEBATE_FAMILY: &str = "debate";
const USER_FAMILY: &str = "user";

/// Which like family an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeScope<'a> {
    /// Likes on debates in the global feed
    Debates,
    /// Likes on one debate's messages for
    MessagesFor(&'a str),
    /// Likes on one debate's messages against
    MessagesAgainst(&'a str),
    /// Likes on one debate's presentations
    Presentations(&'a str),
}

/// Load `parent_id` unless it is already loaded. True when this call
/// opened it, so the caller knows to close it again.
async fn open_scoped<T: Entry, D: Database>(
    family: &SubCollection<T, D>,
    parent_id: &str,
    variant: Option<&str>,
    creator: Option<&str>,
) -> Result<bool, CollabError> {
    if family.is_loaded(parent_id) {
        return Ok(false);
    }
    family.load(parent_id, variant, creator).await?;
    Ok(family.is_loaded(parent_id))
}

fn close_scoped<T: Entry, D: Database>(family: &SubCollection<T, D>, parent_id: &str, opened: bool) {
    if opened {
        family.close(parent_id);
    }
}

fn opened(result: &Result<bool, CollabError>) -> bool {
    matches!(result, Ok(true))
}

/// One activity period of a debate, read through detached families so the
/// page's own loads are neither reused nor closed. Closed on drop.
struct ActivityPeriod<D: Database> {
    messages_for: SubCollection<Message, D>,
    messages_against: SubCollection<Message, D>,
    presentations: SubCollection<Presentation, D>,
    votes: SubCollection<Vote, D>,
}

impl<D: Database> ActivityPeriod<D> {
    async fn open(page: &PageData<D>, debate_id: &str, start_code: &str) -> Result<Self, CollabError> {
        let period = Self {
            messages_for: page.messages_for.detached(),
            messages_against: page.messages_against.detached(),
            presentations: page.presentations.detached(),
            votes: page.votes.detached(),
        };
        let code = Some(start_code);
        tokio::try_join!(
            period.messages_for.load(debate_id, code, None),
            period.messages_against.load(debate_id, code, None),
            period.presentations.load(debate_id, code, None),
            period.votes.load(debate_id, code, None),
        )?;
        Ok(period)
    }
}

impl<D: Database> Drop for ActivityPeriod<D> {
    fn drop(&mut self) {
        self.messages_for.close_all();
        self.messages_against.close_all();
        self.presentations.close_all();
        self.votes.close_all();
    }
}

/// The collections one screen works with, plus derived views.
pub struct PageData<D: Database> {
    db: Option<Arc<D>>,
    self_public_key: Option<String>,
    init_listeners: Notifier,
    debates: Collection<Debate, D>,
    debate_likes: Collection<Likes, D>,
    messages_for: SubCollection<Message, D>,
    messages_against: SubCollection<Message, D>,
    presentations: SubCollection<Presentation, D>,
    votes: SubCollection<Vote, D>,
    start_codes: SubCollection<StartCode, D>,
    archived_debates: SubCollection<ArchivedDebate, D>,
    message_for_likes: SubCollection<Likes, D>,
    message_against_likes: SubCollection<Likes, D>,
    presentation_likes: SubCollection<Likes, D>,
    archived_votes: SubCollection<ArchivedVote, D>,
}

impl<D: Database> Default for PageData<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Database> PageData<D> {
    pub fn new() -> Self {
        let append = CollectionOptions::everyone_append();
        let update_own = CollectionOptions::everyone_update_own();
        let write_once = CollectionOptions::self_write_once();
        Self {
            db: None,
            self_public_key: None,
            init_listeners: Notifier::new(),
            debates: Collection::new(DEBATE_FAMILY, append.clone()),
            debate_likes: Collection::new("debate-likes", update_own.clone()),
            messages_for: SubCollection::new(DEBATE_FAMILY, "messages-for", append.clone()),
            messages_against: SubCollection::new(DEBATE_FAMILY, "messages-against", append.clone()),
            presentations: SubCollection::new(DEBATE_FAMILY, "presentations", update_own.clone()),
            votes: SubCollection::new(DEBATE_FAMILY, "votes", update_own.clone()),
            start_codes: SubCollection::singular(DEBATE_FAMILY, "startcodes", write_once.clone()),
            archived_debates: SubCollection::singular(DEBATE_FAMILY, "archived", write_once),
            message_for_likes: SubCollection::new(DEBATE_FAMILY, "messages-for-likes", update_own.clone()),
            message_against_likes: SubCollection::new(DEBATE_FAMILY, "messages-against-likes", update_own.clone()),
            presentation_likes: SubCollection::new(DEBATE_FAMILY, "presentations-likes", update_own),
            archived_votes: SubCollection::new(USER_FAMILY, "votes", append),
        }
    }

    /// Hand the database session and the caller's identity to every
    /// collection, then fire the init listeners.
    pub fn init(&mut self, db: Arc<D>, self_public_key: impl Into<String>) {
        let key = self_public_key.into();
        self.debates.init(db.clone(), key.clone());
        self.debate_likes.init(db.clone(), key.clone());
        self.messages_for.init(db.clone(), key.clone());
        self.messages_against.init(db.clone(), key.clone());
        self.presentations.init(db.clone(), key.clone());
        self.votes.init(db.clone(), key.clone());
        self.start_codes.init(db.clone(), key.clone());
        self.archived_debates.init(db.clone(), key.clone());
        self.message_for_likes.init(db.clone(), key.clone());
        self.message_against_likes.init(db.clone(), key.clone());
        self.presentation_likes.init(db.clone(), key.clone());
        self.archived_votes.init(db.clone(), key.clone());
        self.db = Some(db);
        log::debug!("Page data initialized for {key}");
        self.self_public_key = Some(key);
        self.init_listeners.notify_all();
    }

    /// Run `listener` on init; immediately as well if already initialized.
    pub fn on_init<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let subscription = self.init_listeners.subscribe_listener(listener.clone());
        if self.is_initialized() {
            listener();
        }
        subscription
    }

    pub fn is_initialized(&self) -> bool {
        self.db.is_some()
    }

    pub fn self_public_key(&self) -> Option<&str> {
        self.self_public_key.as_deref()
    }

    fn require_key(&self) -> Result<&str, CollabError> {
        self.self_public_key().ok_or(CollabError::NotInitialized)
    }

    pub fn debates(&self) -> &Collection<Debate, D> {
        &self.debates
    }

    pub fn debate_likes(&self) -> &Collection<Likes, D> {
        &self.debate_likes
    }

    pub fn messages_for(&self) -> &SubCollection<Message, D> {
        &self.messages_for
    }

    pub fn messages_against(&self) -> &SubCollection<Message, D> {
        &self.messages_against
    }

    pub fn presentations(&self) -> &SubCollection<Presentation, D> {
        &self.presentations
    }

    pub fn votes(&self) -> &SubCollection<Vote, D> {
        &self.votes
    }

    pub fn start_codes(&self) -> &SubCollection<StartCode, D> {
        &self.start_codes
    }

    pub fn archived_debates(&self) -> &SubCollection<ArchivedDebate, D> {
        &self.archived_debates
    }

    pub fn message_for_likes(&self) -> &SubCollection<Likes, D> {
        &self.message_for_likes
    }

    pub fn message_against_likes(&self) -> &SubCollection<Likes, D> {
        &self.message_against_likes
    }

    pub fn presentation_likes(&self) -> &SubCollection<Likes, D> {
        &self.presentation_likes
    }

    pub fn archived_votes(&self) -> &SubCollection<ArchivedVote, D> {
        &self.archived_votes
    }

    // Vote tally

    /// A debate's groups with the default remainder applied. Empty when
    /// the debate is not in the loaded feed.
    pub fn normalized_groups(&self, debate_id: &str) -> Vec<Group> {
        self.debates
            .entry(debate_id)
            .map(|debate| normalize_groups(&debate.groups))
            .unwrap_or_default()
    }

    /// Group-weighted tally of the live votes of a debate.
    pub fn vote_tally(&self, debate_id: &str) -> VoteTally {
        let Some(debate) = self.debates.entry(debate_id) else {
            return VoteTally::default();
        };
        tally_votes(&debate.groups, &self.votes.entries(debate_id))
    }

    /// Final totals from the archive once a debate has ended, the live
    /// tally otherwise.
    pub fn vote_totals(&self, debate_id: &str) -> VoteTally {
        match self.archived_debates.singular_entry(debate_id) {
            Some(archived) => VoteTally::from_totals(archived.votes_for, archived.votes_against),
            None => self.vote_tally(debate_id),
        }
    }

    // Own vote

    pub fn own_vote(&self, debate_id: &str) -> Option<Vote> {
        self.votes.entry(debate_id, self.self_public_key()?)
    }

    pub fn own_vote_direction(&self, debate_id: &str) -> VoteDirection {
        self.own_vote(debate_id).map(|vote| vote.direction).unwrap_or_default()
    }

    pub fn own_vote_group_index(&self, debate_id: &str) -> Option<usize> {
        self.own_vote(debate_id).and_then(|vote| vote.group_index)
    }

    /// Replace the caller's vote. Without a group the vote is recorded as
    /// undecided.
    pub async fn cast_vote(
        &self,
        debate_id: &str,
        direction: VoteDirection,
        group_index: Option<usize>,
    ) -> Result<Option<WriteOutcome>, CollabError> {
        let direction = if group_index.is_some() {
            direction
        } else {
            VoteDirection::Undecided
        };
        self.votes.add_entry(debate_id, Vote::new(direction, group_index)).await
    }

    // Debate lifecycle

    /// Read a debate's lifecycle markers.
    pub async fn debate_status(&self, debate: &Debate) -> Result<DebateStatus, CollabError> {
        let id = debate.id();
        let owner = Some(debate.owner());
        let (codes, archive) = tokio::join!(
            open_scoped(&self.start_codes, id, None, owner),
            open_scoped(&self.archived_debates, id, None, owner),
        );
        let (codes_opened, archive_opened) = (opened(&codes), opened(&archive));
        if let Err(e) = codes.and(archive) {
            close_scoped(&self.start_codes, id, codes_opened);
            close_scoped(&self.archived_debates, id, archive_opened);
            return Err(e);
        }

        let status = DebateStatus {
            start_code: self.start_codes.singular_entry(id),
            archived: self.archived_debates.singular_entry(id),
        };

        close_scoped(&self.start_codes, id, codes_opened);
        close_scoped(&self.archived_debates, id, archive_opened);
        Ok(status)
    }

    fn require_owner(&self, debate: &Debate) -> Result<(), CollabError> {
        if self.require_key()? != debate.owner() {
            return Err(CollabError::NotOwner);
        }
        Ok(())
    }

    /// Move a debate from upcoming to active. Returns the start code in
    /// effect, which is the existing one if the debate had already started.
    pub async fn start_debate(&self, debate: &Debate) -> Result<StartCode, CollabError> {
        self.require_owner(debate)?;
        let id = debate.id();
        let opened = open_scoped(&self.start_codes, id, None, Some(debate.owner())).await?;

        let result = match self.start_codes.add_entry(id, StartCode::generate()).await {
            Ok(_) => self
                .start_codes
                .singular_entry(id)
                .ok_or_else(|| CollabError::MissingStartCode(id.to_string())),
            Err(e) => Err(e),
        };

        close_scoped(&self.start_codes, id, opened);
        if let Ok(code) = &result {
            log::info!("Started debate {id} with code {}", code.value);
        }
        result
    }

    /// Open the families a debate writes to while it is active. Families
    /// already loaded for the debate are left as they are, on whatever
    /// period they were loaded under. On error, nothing this call opened
    /// stays open.
    pub async fn load_activity(&self, debate_id: &str, start_code: &str) -> Result<(), CollabError> {
        let code = Some(start_code);
        let (messages_for, messages_against, presentations, votes) = tokio::join!(
            open_scoped(&self.messages_for, debate_id, code, None),
            open_scoped(&self.messages_against, debate_id, code, None),
            open_scoped(&self.presentations, debate_id, code, None),
            open_scoped(&self.votes, debate_id, code, None),
        );
        let flags = [
            opened(&messages_for),
            opened(&messages_against),
            opened(&presentations),
            opened(&votes),
        ];
        if let Err(e) = messages_for.and(messages_against).and(presentations).and(votes) {
            close_scoped(&self.messages_for, debate_id, flags[0]);
            close_scoped(&self.messages_against, debate_id, flags[1]);
            close_scoped(&self.presentations, debate_id, flags[2]);
            close_scoped(&self.votes, debate_id, flags[3]);
            return Err(e);
        }
        Ok(())
    }

    pub fn close_activity(&self, debate_id: &str) {
        self.messages_for.close(debate_id);
        self.messages_against.close(debate_id);
        self.presentations.close(debate_id);
        self.votes.close(debate_id);
    }

    /// Move an active debate to ended.
    ///
    /// Reads the period under the debate's start code, whatever the page
    /// has loaded itself, and writes the archive snapshot with the weighted
    /// totals. Every voter's history gets an entry; votes without a valid
    /// group are not archived. Only what is opened here is closed again.
    pub async fn end_debate(&self, debate: &Debate) -> Result<ArchivedDebate, CollabError> {
        self.require_owner(debate)?;
        let id = debate.id();
        let owner = Some(debate.owner());

        let codes_opened = open_scoped(&self.start_codes, id, None, owner).await?;
        let start_code = self.start_codes.singular_entry(id);
        close_scoped(&self.start_codes, id, codes_opened);
        let start_code = start_code.ok_or_else(|| CollabError::MissingStartCode(id.to_string()))?;

        let period = ActivityPeriod::open(self, id, &start_code.value).await?;
        let archive_opened = open_scoped(&self.archived_debates, id, None, owner).await?;

        let result = self.write_archive(debate, &period).await;

        close_scoped(&self.archived_debates, id, archive_opened);
        result
    }

    async fn write_archive(
        &self,
        debate: &Debate,
        period: &ActivityPeriod<D>,
    ) -> Result<ArchivedDebate, CollabError> {
        let id = debate.id();
        let votes = period.votes.entries(id);
        let tally = tally_votes(&debate.groups, &votes);

        let archived = ArchivedDebate {
            meta: Default::default(),
            messages_for: period.messages_for.entries(id),
            messages_against: period.messages_against.entries(id),
            presentations: period.presentations.entries(id),
            votes_for: tally.votes_for,
            votes_against: tally.votes_against,
        };
        self.archived_debates.add_entry(id, archived).await?;

        let groups = normalize_groups(&debate.groups);
        for vote in &votes {
            let Some(group) = vote.group_index.and_then(|i| groups.get(i)) else {
                log::debug!("Not archiving vote of {} without a valid group", vote.voter());
                continue;
            };
            let voter = vote.voter();
            let opened = open_scoped(&self.archived_votes, voter, None, None).await?;
            let written = self
                .archived_votes
                .add_entry(voter, ArchivedVote::new(id, vote.direction, group.name.clone()))
                .await;
            close_scoped(&self.archived_votes, voter, opened);
            written?;
        }

        log::info!(
            "Ended debate {id}: {:.2} for, {:.2} against from {} votes",
            tally.votes_for,
            tally.votes_against,
            tally.votes_cast()
        );
        self.archived_debates
            .singular_entry(id)
            .ok_or_else(|| CollabError::UnknownDebate(id.to_string()))
    }

    // Likes

    /// Open the like family for `scope`.
    pub async fn load_likes(&self, scope: LikeScope<'_>) -> Result<(), CollabError> {
        match scope {
            LikeScope::Debates => self.debate_likes.load().await,
            LikeScope::MessagesFor(id) => self.message_for_likes.load(id, None, None).await,
            LikeScope::MessagesAgainst(id) => self.message_against_likes.load(id, None, None).await,
            LikeScope::Presentations(id) => self.presentation_likes.load(id, None, None).await,
        }
    }

    pub fn close_likes(&self, scope: LikeScope<'_>) {
        match scope {
            LikeScope::Debates => self.debate_likes.close(),
            LikeScope::MessagesFor(id) => self.message_for_likes.close(id),
            LikeScope::MessagesAgainst(id) => self.message_against_likes.close(id),
            LikeScope::Presentations(id) => self.presentation_likes.close(id),
        }
    }

    fn like_records(&self, scope: LikeScope<'_>) -> Vec<Likes> {
        match scope {
            LikeScope::Debates => self.debate_likes.entries(),
            LikeScope::MessagesFor(id) => self.message_for_likes.entries(id),
            LikeScope::MessagesAgainst(id) => self.message_against_likes.entries(id),
            LikeScope::Presentations(id) => self.presentation_likes.entries(id),
        }
    }

    fn own_likes(&self, scope: LikeScope<'_>) -> Option<Likes> {
        let key = self.self_public_key()?;
        match scope {
            LikeScope::Debates => self.debate_likes.entry(key),
            LikeScope::MessagesFor(id) => self.message_for_likes.entry(id, key),
            LikeScope::MessagesAgainst(id) => self.message_against_likes.entry(id, key),
            LikeScope::Presentations(id) => self.presentation_likes.entry(id, key),
        }
    }

    /// Target id → number of likers, for every liked target in `scope`.
    pub fn like_counts(&self, scope: LikeScope<'_>) -> HashMap<String, usize> {
        count_likes(&self.like_records(scope))
    }

    pub fn like_count(&self, scope: LikeScope<'_>, target_id: &str) -> usize {
        self.like_counts(scope).get(target_id).copied().unwrap_or(0)
    }

    pub fn is_liked(&self, scope: LikeScope<'_>, target_id: &str) -> bool {
        self.own_likes(scope).map_or(false, |likes| likes.contains(target_id))
    }

    /// Like `target_id`, or unlike it if already liked. Replaces the
    /// caller's whole like record; unliking the last id leaves an empty
    /// record in place.
    pub async fn toggle_liked(
        &self,
        scope: LikeScope<'_>,
        target_id: &str,
    ) -> Result<Option<WriteOutcome>, CollabError> {
        let key = self.require_key()?.to_string();
        let current = self.own_likes(scope).map(|likes| likes.ids).unwrap_or_default();
        let record = Likes::new(key, toggle_like(&current, target_id));
        match scope {
            LikeScope::Debates => self.debate_likes.add_entry(record).await,
            LikeScope::MessagesFor(id) => self.message_for_likes.add_entry(id, record).await,
            LikeScope::MessagesAgainst(id) => self.message_against_likes.add_entry(id, record).await,
            LikeScope::Presentations(id) => self.presentation_likes.add_entry(id, record).await,
        }
    }

    /// Loaded debates, most liked first.
    pub fn debates_by_likes(&self) -> Vec<Debate> {
        let mut debates = self.debates.entries();
        sort_by_likes(&mut debates, &self.like_counts(LikeScope::Debates));
        debates
    }

    // User history

    /// A user's decided archived votes, newest first. Needs
    /// `archived_votes().load(user, ..)` first.
    pub fn user_votes(&self, user: &str) -> Vec<ArchivedVote> {
        self.archived_votes
            .entries(user)
            .into_iter()
            .filter(|vote| vote.direction != VoteDirection::Undecided)
            .collect()
    }

    /// Distinct group names a user has voted in.
    pub fn user_groups(&self, user: &str) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for vote in self.user_votes(user) {
            if !groups.contains(&vote.group_name) {
                groups.push(vote.group_name);
            }
        }
        groups
    }
}
