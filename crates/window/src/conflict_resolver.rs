//! ConflictResolver (§4.9): reconciles the local window against an
//! authoritative chat history supplied by the frontend.

use crate::sliding_window::SlidingWindow;
use crate::turn::Turn;

/// One turn as reported by the authoritative external history.
#[derive(Debug, Clone)]
pub struct AuthoritativeTurn {
    pub sequence: u64,
    pub user_text: String,
    pub assistant_text: String,
    pub external_message_id: Option<String>,
}

/// Counters returned by [`ConflictResolver::sync`] (§4.9).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCounters {
    pub synced_turns: usize,
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub out_of_window: usize,
    pub new_turns: usize,
    pub updated_turns: usize,
    pub deleted_turns: usize,
    pub window_synced: bool,
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// A lightweight content fingerprint for matching turns that carry no
    /// `external_message_id` (§4.9: "fuzzy text hash").
    fn fuzzy_hash(user_text: &str, assistant_text: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user_text.trim().to_lowercase().hash(&mut hasher);
        assistant_text.trim().to_lowercase().hash(&mut hasher);
        hasher.finish()
    }

    fn matches(local: &Turn, authoritative: &AuthoritativeTurn) -> bool {
        match (&local.external_message_id, &authoritative.external_message_id) {
            (Some(l), Some(a)) => l == a,
            _ => {
                local.sequence == authoritative.sequence
                    || Self::fuzzy_hash(&local.user_text, &local.assistant_text)
                        == Self::fuzzy_hash(&authoritative.user_text, &authoritative.assistant_text)
            }
        }
    }

    fn diverges(local: &Turn, authoritative: &AuthoritativeTurn) -> bool {
        local.user_text.trim() != authoritative.user_text.trim()
            || local.assistant_text.trim() != authoritative.assistant_text.trim()
    }

    /// Synchronizes `window` against `authoritative_history`. Authoritative
    /// always wins on divergence; a turn already `processed` is replaced in
    /// place without reverting the deltas its old content produced (§9
    /// documented limitation).
    pub fn sync(window: &mut SlidingWindow, authoritative_history: &[AuthoritativeTurn]) -> SyncCounters {
        let mut counters = SyncCounters::default();
        let oldest = window.oldest_sequence();

        for authoritative in authoritative_history {
            if let Some(oldest_sequence) = oldest {
                if authoritative.sequence < oldest_sequence {
                    counters.out_of_window += 1;
                    continue;
                }
            }

            let matched_sequence = window
                .iter()
                .find(|local| Self::matches(local, authoritative))
                .map(|local| local.sequence);

            match matched_sequence {
                Some(sequence) => {
                    counters.synced_turns += 1;
                    let local = window.get(sequence).expect("matched sequence exists");
                    if Self::diverges(local, authoritative) {
                        counters.conflicts_detected += 1;
                        let mut replacement = Turn::new(sequence, &authoritative.user_text, &authoritative.assistant_text);
                        replacement.external_message_id = authoritative.external_message_id.clone();
                        replacement.processed = local.processed;
                        if window.replace(sequence, replacement) {
                            counters.conflicts_resolved += 1;
                            counters.updated_turns += 1;
                        }
                    }
                }
                None => {
                    counters.new_turns += 1;
                }
            }
        }

        counters.window_synced = counters.conflicts_detected == counters.conflicts_resolved;
        counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authoritative_wins_on_divergence() {
        let mut window = SlidingWindow::new(4, 0);
        window.push("hello", "hi there");

        let authoritative = vec![AuthoritativeTurn {
            sequence: 1,
            user_text: "hello".into(),
            assistant_text: "hi there, traveler".into(),
            external_message_id: None,
        }];

        let counters = ConflictResolver::sync(&mut window, &authoritative);
        assert_eq!(counters.conflicts_detected, 1);
        assert_eq!(counters.conflicts_resolved, 1);
        assert!(counters.window_synced);
        assert_eq!(window.get(1).unwrap().assistant_text, "hi there, traveler");
    }

    #[test]
    fn identical_turn_is_synced_without_conflict() {
        let mut window = SlidingWindow::new(4, 0);
        window.push("hello", "hi there");

        let authoritative = vec![AuthoritativeTurn {
            sequence: 1,
            user_text: "hello".into(),
            assistant_text: "hi there".into(),
            external_message_id: None,
        }];

        let counters = ConflictResolver::sync(&mut window, &authoritative);
        assert_eq!(counters.synced_turns, 1);
        assert_eq!(counters.conflicts_detected, 0);
    }

    #[test]
    fn turn_before_window_horizon_is_out_of_window() {
        let mut window = SlidingWindow::new(2, 0);
        window.push("a", "A");
        window.push("b", "B");
        window.push("c", "C"); // drops sequence 1

        let authoritative = vec![AuthoritativeTurn {
            sequence: 1,
            user_text: "a".into(),
            assistant_text: "A".into(),
            external_message_id: None,
        }];

        let counters = ConflictResolver::sync(&mut window, &authoritative);
        assert_eq!(counters.out_of_window, 1);
        assert_eq!(counters.synced_turns, 0);
    }

    #[test]
    fn unmatched_authoritative_turn_counts_as_new() {
        let mut window = SlidingWindow::new(4, 0);
        window.push("hello", "hi there");

        let authoritative = vec![AuthoritativeTurn {
            sequence: 2,
            user_text: "goodbye".into(),
            assistant_text: "farewell".into(),
            external_message_id: None,
        }];

        let counters = ConflictResolver::sync(&mut window, &authoritative);
        assert_eq!(counters.new_turns, 1);
    }

    #[test]
    fn matches_by_external_message_id_even_with_different_sequence() {
        let mut window = SlidingWindow::new(4, 0);
        window.push("hello", "hi there");
        {
            let mut t = window.get(1).unwrap().clone();
            t.external_message_id = Some("ext-abc".into());
            window.replace(1, t);
        }

        let authoritative = vec![AuthoritativeTurn {
            sequence: 99,
            user_text: "hello".into(),
            assistant_text: "hi there, friend".into(),
            external_message_id: Some("ext-abc".into()),
        }];

        let counters = ConflictResolver::sync(&mut window, &authoritative);
        assert_eq!(counters.synced_turns, 1);
        assert_eq!(counters.conflicts_resolved, 1);
    }
}
