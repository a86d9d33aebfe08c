pub mod conflict_resolver;
pub mod delayed_update_coordinator;
pub mod extraction_lock;
pub mod sliding_window;
pub mod turn;

pub use conflict_resolver::{AuthoritativeTurn, ConflictResolver, SyncCounters};
pub use delayed_update_coordinator::{
    apply_delta, graph_snapshot, DelayedUpdateCoordinator, GraphUpdateCounts, ProcessResult,
};
pub use extraction_lock::ExtractionLock;
pub use sliding_window::{SlidingWindow, WindowInfo};
pub use turn::Turn;
