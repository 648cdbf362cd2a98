//! # agora-core — Data model and derived views for Agora debates
//!
//! Pure types and algorithms shared by the collection layer. Nothing here
//! touches a store; see `agora-collab` for that.
//!
//! ## Modules
//!
//! - [`records`] — Record kinds and the shared `_id` / `_clock` / `_identity` triple
//! - [`tally`] — Group-weighted vote tally
//! - [`likes`] — Like counting and toggling
//! - [`stage`] — Debate lifecycle stages
//! - [`format`] — Compact count rendering

pub mod records;
pub mod tally;
pub mod likes;
pub mod stage;
pub mod format;

pub use records::{
    ArchivedDebate, ArchivedVote, Debate, Entry, EntryMeta, Group, Identity, Likes, Message,
    Presentation, StartCode, Vote, VoteDirection,
};
pub use tally::{normalize_groups, tally_votes, GroupTally, VoteTally, DEFAULT_GROUP_NAME};
pub use likes::{count_likes, sort_by_likes, toggle_like};
pub use stage::{DebateStage, DebateStatus};
pub use format::count_format;
