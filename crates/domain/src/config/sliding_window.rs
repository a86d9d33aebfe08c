use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// sliding_window
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    #[serde(default = "d_window_size")]
    pub window_size: usize,
    #[serde(default = "d_processing_delay")]
    pub processing_delay: usize,
    #[serde(default = "d_true")]
    pub enable_enhanced_agent: bool,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size: d_window_size(),
            processing_delay: d_processing_delay(),
            enable_enhanced_agent: true,
        }
    }
}

fn d_window_size() -> usize {
    4
}
fn d_processing_delay() -> usize {
    1
}
fn d_true() -> bool {
    true
}
