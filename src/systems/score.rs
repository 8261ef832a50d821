/// Watches the score for an exact milestone value.
///
/// Fires once each time the score lands on the milestone; a reset re-arms it.
#[derive(Debug, Clone)]
pub struct ScoreMonitor {
    milestone: u64,
    last_seen: u64,
}

impl ScoreMonitor {
    pub fn new(milestone: u64) -> Self {
        Self {
            milestone,
            last_seen: 0,
        }
    }

    pub fn milestone(&self) -> u64 {
        self.milestone
    }

    /// Returns true when `score` has just become the milestone.
    pub fn observe(&mut self, score: u64) -> bool {
        let fired = score == self.milestone && self.last_seen != self.milestone;
        self.last_seen = score;
        fired
    }

    pub fn reset(&mut self) {
        self.last_seen = 0;
    }
}
