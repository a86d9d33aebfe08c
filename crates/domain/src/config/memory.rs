use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// memory / storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "d_hot_memory_size")]
    pub hot_memory_size: usize,
    /// Root directory under which per-character state lives
    /// (`<state_root>/<character_dir>/{graph.json,entities.json,sessions}`).
    #[serde(default = "d_state_root")]
    pub state_root: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            hot_memory_size: d_hot_memory_size(),
            state_root: d_state_root(),
        }
    }
}

fn d_hot_memory_size() -> usize {
    10
}
fn d_state_root() -> PathBuf {
    PathBuf::from("./data/state")
}
