//! Like aggregation.
//!
//! Each liker owns one [`Likes`] record per like family holding the full
//! list of ids they currently like. Toggling replaces that record; counts
//! are derived by scanning every liker's record.

use std::collections::HashMap;

use crate::records::{Entry, Likes};

/// Number of likers whose record contains each target id.
pub fn count_likes<'a, I>(records: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = &'a Likes>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for likes in records {
        // A liker counts once per target even if their list repeats it.
        let mut seen: Vec<&str> = Vec::with_capacity(likes.ids.len());
        for id in &likes.ids {
            if seen.contains(&id.as_str()) {
                continue;
            }
            seen.push(id.as_str());
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// The liked-id list after toggling `target_id`.
///
/// Removes the target if present, otherwise appends it. Order of the
/// remaining ids is kept.
pub fn toggle_like(current: &[String], target_id: &str) -> Vec<String> {
    if current.iter().any(|id| id == target_id) {
        current.iter().filter(|id| *id != target_id).cloned().collect()
    } else {
        let mut next = current.to_vec();
        next.push(target_id.to_string());
        next
    }
}

/// Sort `entries` most-liked first. Ties keep their existing order.
pub fn sort_by_likes<T: Entry>(entries: &mut [T], counts: &HashMap<String, usize>) {
    entries.sort_by(|a, b| {
        let a_count = counts.get(a.id()).copied().unwrap_or(0);
        let b_count = counts.get(b.id()).copied().unwrap_or(0);
        b_count.cmp(&a_count)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{EntryMeta, Message};

    fn likes(liker: &str, ids: &[&str]) -> Likes {
        Likes::new(liker, ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_count_across_likers() {
        let records = vec![
            likes("alice", &["d1", "d2"]),
            likes("bob", &["d1"]),
            likes("carol", &[]),
        ];
        let counts = count_likes(&records);
        assert_eq!(counts.get("d1"), Some(&2));
        assert_eq!(counts.get("d2"), Some(&1));
        assert_eq!(counts.get("d3"), None);
    }

    #[test]
    fn test_duplicate_ids_count_once_per_liker() {
        let counts = count_likes(&[likes("alice", &["d1", "d1"])]);
        assert_eq!(counts.get("d1"), Some(&1));
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        let once = toggle_like(&[], "t");
        assert_eq!(once, vec!["t".to_string()]);
        let twice = toggle_like(&once, "t");
        assert!(twice.is_empty());
    }

    #[test]
    fn test_toggle_keeps_order_of_others() {
        let current: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(toggle_like(&current, "b"), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(toggle_like(&current, "d").last().map(String::as_str), Some("d"));
    }

    #[test]
    fn test_sort_by_likes_is_stable() {
        let mut messages: Vec<Message> = ["m1", "m2", "m3"]
            .iter()
            .map(|id| Message {
                meta: EntryMeta::with_id(*id),
                description: String::new(),
            })
            .collect();
        let counts = count_likes(&[likes("alice", &["m3"]), likes("bob", &["m3", "m2"])]);
        sort_by_likes(&mut messages, &counts);
        let order: Vec<&str> = messages.iter().map(|m| m.id()).collect();
        assert_eq!(order, vec!["m3", "m2", "m1"]);
    }
}
