//! Group-weighted vote tally.
//!
//! Each declared group should influence the result in proportion to its
//! declared share, whatever its actual turnout:
//!
//! ```text
//! declared%  ──┐
//!              ├── weight = declared% / actual%   (0 when the group cast no votes)
//! actual%    ──┘
//!
//! votes_for     = Σ group_for[i]     * weight[i]
//! votes_against = Σ group_against[i] * weight[i]
//! ```

use serde::{Deserialize, Serialize};

use crate::records::{Entry as _, Group, Vote, VoteDirection};

/// Name of the synthetic group holding any undeclared share.
pub const DEFAULT_GROUP_NAME: &str = "Default";

/// Shares are expressed out of this total.
pub const FULL_SHARE: f64 = 100.0;

/// Normalize declared groups so their shares sum to exactly 100.
///
/// A total under 100 gets a trailing [`DEFAULT_GROUP_NAME`] group with the
/// remainder. A total over 100 is rescaled proportionally. Negative or
/// non-finite shares count as 0.
pub fn normalize_groups(declared: &[Group]) -> Vec<Group> {
    let mut groups: Vec<Group> = declared
        .iter()
        .map(|g| Group::new(g.name.clone(), sanitize_share(g.percent)))
        .collect();
    let total: f64 = groups.iter().map(|g| g.percent).sum();

    if total < FULL_SHARE {
        groups.push(Group::new(DEFAULT_GROUP_NAME, FULL_SHARE - total));
    } else if total > FULL_SHARE {
        rescale(&mut groups);
    }

    groups
}

/// Scale shares to sum to [`FULL_SHARE`]. Shares are taken relative to the
/// largest one first, so finite shares whose plain sum overflows still
/// rescale.
fn rescale(groups: &mut [Group]) {
    let largest = groups.iter().map(|g| g.percent).fold(0.0, f64::max);
    if largest <= 0.0 {
        return;
    }
    let relative_total: f64 = groups.iter().map(|g| g.percent / largest).sum();
    let scale = FULL_SHARE / relative_total;
    for group in groups {
        group.percent = group.percent / largest * scale;
    }
}

fn sanitize_share(percent: f64) -> f64 {
    if percent.is_finite() && percent > 0.0 {
        percent
    } else {
        0.0
    }
}

/// Per-group breakdown of a tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTally {
    pub name: String,
    pub declared_percent: f64,
    pub votes: u64,
    pub votes_for: u64,
    pub votes_against: u64,
    pub actual_percent: f64,
    pub weight: f64,
}

/// Final weighted totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub votes_for: f64,
    pub votes_against: f64,
    /// Breakdown per normalized group, in group order
    #[serde(default)]
    pub groups: Vec<GroupTally>,
}

impl VoteTally {
    /// Totals without a breakdown, e.g. restored from an archive.
    pub fn from_totals(votes_for: f64, votes_against: f64) -> Self {
        Self {
            votes_for,
            votes_against,
            groups: Vec::new(),
        }
    }

    /// Number of votes that counted towards the tally.
    pub fn votes_cast(&self) -> u64 {
        self.groups.iter().map(|g| g.votes).sum()
    }
}

/// Tally `votes` against a debate's declared groups.
///
/// Votes whose group index does not address a normalized group are left
/// out entirely; they are not folded into the default group.
pub fn tally_votes<'a, I>(declared: &[Group], votes: I) -> VoteTally
where
    I: IntoIterator<Item = &'a Vote>,
{
    let groups = normalize_groups(declared);
    let mut breakdown: Vec<GroupTally> = groups
        .into_iter()
        .map(|g| GroupTally {
            name: g.name,
            declared_percent: g.percent,
            votes: 0,
            votes_for: 0,
            votes_against: 0,
            actual_percent: 0.0,
            weight: 0.0,
        })
        .collect();

    let mut total_cast: u64 = 0;
    for vote in votes {
        let Some(group) = vote.group_index.and_then(|i| breakdown.get_mut(i)) else {
            log::trace!("Skipping vote {} without a valid group", vote.id());
            continue;
        };
        group.votes += 1;
        match vote.direction {
            VoteDirection::For => group.votes_for += 1,
            VoteDirection::Against => group.votes_against += 1,
            VoteDirection::Undecided => {}
        }
        total_cast += 1;
    }

    let mut tally = VoteTally::default();
    for group in &mut breakdown {
        if total_cast > 0 {
            group.actual_percent = FULL_SHARE * group.votes as f64 / total_cast as f64;
        }
        // A group that did not turn out contributes nothing.
        if group.votes > 0 {
            group.weight = group.declared_percent / group.actual_percent;
        }
        tally.votes_for += group.votes_for as f64 * group.weight;
        tally.votes_against += group.votes_against as f64 * group.weight;
    }
    tally.groups = breakdown;
    tally
}
