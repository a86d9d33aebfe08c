use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One turn tracked by a [`crate::sliding_window::SlidingWindow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub sequence: u64,
    pub user_text: String,
    pub assistant_text: String,
    pub timestamp: DateTime<Utc>,
    /// Identifier from an authoritative external chat history, used by
    /// `ConflictResolver` to match turns across syncs.
    #[serde(default)]
    pub external_message_id: Option<String>,
    #[serde(default)]
    pub processed: bool,
}

impl Turn {
    pub fn new(sequence: u64, user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            sequence,
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            timestamp: Utc::now(),
            external_message_id: None,
            processed: false,
        }
    }
}
