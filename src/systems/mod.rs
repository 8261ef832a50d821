mod aging;
mod reaper;
mod replenish;
mod score;

pub use aging::AgingSystem;
pub use reaper::ReaperSystem;
pub use replenish::{replenish, ReplenishSystem};
pub use score::ScoreMonitor;
