//! Record kinds stored in the replicated collections.
//!
//! Every record embeds the same store-assigned triple ([`EntryMeta`]):
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────────┬─────────────────┐
//! │ _id      │ _clock   │ _identity.publicKey  │ payload fields  │
//! │ string   │ u64      │ writer identity      │ camelCase       │
//! └──────────┴──────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! Records are value types. A client never edits a stored record in place;
//! it writes a complete replacement under the same id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identity of whoever wrote a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "publicKey", default)]
    pub public_key: String,
}

/// Store-managed fields shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Record id (empty until the store assigns one)
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Logical clock assigned per write; ordering only
    #[serde(rename = "_clock", default)]
    pub clock: u64,
    /// Writer identity
    #[serde(rename = "_identity", default)]
    pub identity: Identity,
}

impl EntryMeta {
    /// Meta for a record whose id is chosen by the writer.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A record that can live in a replicated collection.
pub trait Entry: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn meta(&self) -> &EntryMeta;

    fn meta_mut(&mut self) -> &mut EntryMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn clock(&self) -> u64 {
        self.meta().clock
    }

    fn writer_public_key(&self) -> &str {
        &self.meta().identity.public_key
    }
}

macro_rules! impl_entry {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Entry for $ty {
                fn meta(&self) -> &EntryMeta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut EntryMeta {
                    &mut self.meta
                }
            }
        )*
    };
}

/// A voting group declared by a debate, with its share of the final tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub percent: f64,
}

impl Group {
    pub fn new(name: impl Into<String>, percent: f64) -> Self {
        Self {
            name: name.into(),
            percent,
        }
    }
}

/// A proposed debate. Written once by its proposer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debate {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Debate {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_schedule(mut self, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        self.start_time = start_time.into();
        self.end_time = end_time.into();
        self
    }

    /// Public key of the proposer.
    pub fn owner(&self) -> &str {
        self.writer_public_key()
    }
}

/// A message posted on one side of a debate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub description: String,
}

impl Message {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            meta: EntryMeta::default(),
            description: description.into(),
        }
    }
}

/// Stored as its numeric discriminant: 0 undecided, 1 for, 2 against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum VoteDirection {
    #[default]
    Undecided = 0,
    For = 1,
    Against = 2,
}

impl From<VoteDirection> for u8 {
    fn from(direction: VoteDirection) -> Self {
        direction as u8
    }
}

impl TryFrom<u8> for VoteDirection {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteDirection::Undecided),
            1 => Ok(VoteDirection::For),
            2 => Ok(VoteDirection::Against),
            other => Err(format!("unknown vote direction {other}")),
        }
    }
}

/// One voter's current stance on a debate. Stored under the voter's key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub direction: VoteDirection,
    /// Index into the debate's normalized groups; `None` when ungrouped
    #[serde(rename = "groupIdx", default, with = "group_index")]
    pub group_index: Option<usize>,
}

impl Vote {
    pub fn new(direction: VoteDirection, group_index: Option<usize>) -> Self {
        Self {
            meta: EntryMeta::default(),
            direction,
            group_index,
        }
    }

    /// Public key of the voter.
    pub fn voter(&self) -> &str {
        self.writer_public_key()
    }
}

/// Wire form of a group index: a signed integer, negative when ungrouped.
mod group_index {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(index) => serializer.serialize_i64(*index as i64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        let raw = Option::<i64>::deserialize(deserializer)?;
        Ok(raw.and_then(|index| usize::try_from(index).ok()))
    }
}

/// A presentation link attached to a debate, one per presenter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub title: String,
    pub url: String,
}

impl Presentation {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            meta: EntryMeta::default(),
            title: title.into(),
            url: url.into(),
        }
    }
}

/// The full set of ids one liker currently likes in a like family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Likes {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub ids: Vec<String>,
}

impl Likes {
    pub fn new(liker: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            meta: EntryMeta::with_id(liker),
            ids,
        }
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.ids.iter().any(|id| id == target_id)
    }
}

/// Marks a debate as started. The value separates this activity period
/// from any later one under the same debate id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartCode {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub value: String,
}

impl StartCode {
    /// A fresh start code with a random token.
    pub fn generate() -> Self {
        Self {
            meta: EntryMeta::default(),
            value: Uuid::new_v4().to_string(),
        }
    }
}

/// Frozen snapshot of a debate written when it ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedDebate {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub messages_for: Vec<Message>,
    #[serde(default)]
    pub messages_against: Vec<Message>,
    #[serde(default)]
    pub presentations: Vec<Presentation>,
    pub votes_for: f64,
    pub votes_against: f64,
}

/// Permanent entry in a voter's history. The record id is the debate id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedVote {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub direction: VoteDirection,
    pub group_name: String,
}

impl ArchivedVote {
    pub fn new(debate_id: impl Into<String>, direction: VoteDirection, group_name: impl Into<String>) -> Self {
        Self {
            meta: EntryMeta::with_id(debate_id),
            direction,
            group_name: group_name.into(),
        }
    }

    pub fn debate_id(&self) -> &str {
        self.id()
    }
}

impl_entry!(Debate, Message, Vote, Presentation, Likes, StartCode, ArchivedDebate, ArchivedVote);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_uses_store_field_names() {
        let mut message = Message::new("hello");
        message.meta.id = "m1".into();
        message.meta.clock = 7;
        message.meta.identity.public_key = "alice".into();

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "m1",
                "_clock": 7,
                "_identity": { "publicKey": "alice" },
                "description": "hello"
            })
        );
    }

    #[test]
    fn test_decode_without_meta_defaults() {
        let message: Message = serde_json::from_value(json!({ "description": "hi" })).unwrap();
        assert_eq!(message.id(), "");
        assert_eq!(message.clock(), 0);
        assert_eq!(message.writer_public_key(), "");
    }

    #[test]
    fn test_payload_fields_are_camel_case() {
        let debate = Debate::new("Topic", "Body").with_schedule("2026-01-01", "2026-02-01");
        let value = serde_json::to_value(&debate).unwrap();
        assert_eq!(value["startTime"], "2026-01-01");
        assert_eq!(value["endTime"], "2026-02-01");
    }

    #[test]
    fn test_vote_group_index_wire_form() {
        let grouped = serde_json::to_value(Vote::new(VoteDirection::For, Some(2))).unwrap();
        assert_eq!(grouped["groupIdx"], 2);

        let ungrouped = serde_json::to_value(Vote::new(VoteDirection::Undecided, None)).unwrap();
        assert_eq!(ungrouped["groupIdx"], -1);
    }

    #[test]
    fn test_vote_negative_or_missing_index_is_ungrouped() {
        let vote: Vote = serde_json::from_value(json!({ "direction": 1, "groupIdx": -1 })).unwrap();
        assert_eq!(vote.group_index, None);

        let vote: Vote = serde_json::from_value(json!({ "direction": 2 })).unwrap();
        assert_eq!(vote.group_index, None);

        let vote: Vote = serde_json::from_value(json!({ "direction": 1, "groupIdx": 1 })).unwrap();
        assert_eq!(vote.group_index, Some(1));
    }

    #[test]
    fn test_vote_direction_is_numeric() {
        let value = serde_json::to_value(Vote::new(VoteDirection::Against, Some(0))).unwrap();
        assert_eq!(value["direction"], 2);

        let vote: Vote = serde_json::from_value(json!({ "direction": 0 })).unwrap();
        assert_eq!(vote.direction, VoteDirection::Undecided);

        let archived: ArchivedVote =
            serde_json::from_value(json!({ "_id": "d1", "direction": 1, "groupName": "A" })).unwrap();
        assert_eq!(archived.direction, VoteDirection::For);

        assert!(serde_json::from_value::<Vote>(json!({ "direction": 3 })).is_err());
        assert!(serde_json::from_value::<Vote>(json!({ "direction": "For" })).is_err());
    }

    #[test]
    fn test_start_codes_are_unique() {
        let a = StartCode::generate();
        let b = StartCode::generate();
        assert_ne!(a.value, b.value);
        assert!(a.id().is_empty());
    }

    #[test]
    fn test_archived_vote_is_keyed_by_debate() {
        let vote = ArchivedVote::new("debate-7", VoteDirection::Against, "Students");
        assert_eq!(vote.debate_id(), "debate-7");
        let value = serde_json::to_value(&vote).unwrap();
        assert_eq!(value["groupName"], "Students");
    }
}
