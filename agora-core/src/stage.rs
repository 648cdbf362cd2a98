//! Debate lifecycle stages.
//!
//! ```text
//! Upcoming ──(StartCode written)──► Active ──(ArchivedDebate written)──► Ended
//! ```
//!
//! Both markers are written once by the debate owner and never revised.

use serde::{Deserialize, Serialize};

use crate::records::{ArchivedDebate, StartCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebateStage {
    Upcoming,
    Active,
    Ended,
}

/// Lifecycle markers read for one debate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebateStatus {
    pub start_code: Option<StartCode>,
    pub archived: Option<ArchivedDebate>,
}

impl DebateStatus {
    pub fn stage(&self) -> DebateStage {
        match (&self.start_code, &self.archived) {
            (_, Some(_)) => DebateStage::Ended,
            (Some(_), None) => DebateStage::Active,
            (None, None) => DebateStage::Upcoming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        let mut status = DebateStatus::default();
        assert_eq!(status.stage(), DebateStage::Upcoming);

        status.start_code = Some(StartCode::generate());
        assert_eq!(status.stage(), DebateStage::Active);

        status.archived = Some(ArchivedDebate::default());
        assert_eq!(status.stage(), DebateStage::Ended);
    }
}
