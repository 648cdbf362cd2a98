//! Central access point for every screen's data.

use std::sync::Arc;

use crate::page_data::PageData;
use crate::store::Database;

/// One [`PageData`] per screen, initialized together.
///
/// Screens keep separate instances so that one screen closing a family
/// never tears down another screen's view of it.
pub struct AppData<D: Database> {
    home: PageData<D>,
    messages: PageData<D>,
    presentations: PageData<D>,
    user: PageData<D>,
}

impl<D: Database> Default for AppData<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Database> AppData<D> {
    pub fn new() -> Self {
        Self {
            home: PageData::new(),
            messages: PageData::new(),
            presentations: PageData::new(),
            user: PageData::new(),
        }
    }

    pub fn init(&mut self, db: Arc<D>, self_public_key: impl Into<String>) {
        let key = self_public_key.into();
        self.home.init(db.clone(), key.clone());
        self.messages.init(db.clone(), key.clone());
        self.presentations.init(db.clone(), key.clone());
        self.user.init(db, key);
    }

    pub fn home(&self) -> &PageData<D> {
        &self.home
    }

    pub fn messages(&self) -> &PageData<D> {
        &self.messages
    }

    pub fn presentations(&self) -> &PageData<D> {
        &self.presentations
    }

    pub fn user(&self) -> &PageData<D> {
        &self.user
    }
}
