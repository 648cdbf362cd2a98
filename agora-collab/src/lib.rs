//! # agora-collab — Replicated collection layer for Agora debates
//!
//! Turns an eventually-consistent key-value store into typed, subscribable
//! record sets, one per debate family, and layers the weighted vote tally
//! and like aggregation on top.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────────┐   ┌───────────────────┐
//! │  AppData  │──►│  PageData  │──►│ SubCollection │──►│ CollectionManager │
//! │ per screen│   │  façade    │   │  per parent   │   │  sorted snapshot  │
//! └───────────┘   └─────┬──────┘   └───────────────┘   └─────────┬─────────┘
//!                       │          ┌───────────────┐             │
//!                       └─────────►│  Collection   │─────────────┤
//!                                  └───────────────┘             ▼
//!                                                     ┌───────────────────┐
//!                                                     │ Database / Handle │
//!                                                     │  (store::memory)  │
//!                                                     └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`notifier`] — Listener registry safe under re-entrant unsubscribe
//! - [`store`] — Store collaborator traits and the in-memory store
//! - [`manager`] — One bound collection, re-read on every change
//! - [`collection`] — Global named collection
//! - [`sub_collection`] — Per-parent collection families and write policies
//! - [`page_data`] — Per-screen façade, tallies, likes, debate lifecycle
//! - [`app_data`] — Every screen's page data
//! - [`error`] — Error types

pub mod error;
pub mod notifier;
pub mod store;
pub mod manager;
pub mod collection;
pub mod sub_collection;
pub mod page_data;
pub mod app_data;

#[cfg(test)]
mod test_support;

pub use app_data::AppData;
pub use collection::Collection;
pub use error::{CollabError, StoreError};
pub use manager::{CollectionManager, ManagerPhase};
pub use notifier::{Listener, Notifier, Subscription};
pub use page_data::{LikeScope, PageData};
pub use store::{
    AccessPolicy, CollectionHandle, CollectionOptions, ConflictPolicy, Database, WriteOutcome,
};
pub use sub_collection::{SubCollection, WritePolicy, DEFAULT_ENTRY_ID};
