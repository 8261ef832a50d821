//! Creation of new floating tools.

use rand::Rng;

use crate::world::{FloatingTool, Millis, Position, ToolId, ToolKind};

// ============================================================================
// Spawn ranges
// ============================================================================

/// Position bounds, in percent of the playfield on each axis
const POSITION_MIN: f32 = 5.0;
const POSITION_MAX: f32 = 95.0;

/// Glyph size in pixels
const SIZE_MIN: f32 = 40.0;
const SIZE_MAX: f32 = 80.0;

/// Float animation period in seconds
const DURATION_MIN: f32 = 8.0;
const DURATION_MAX: f32 = 20.0;

/// Animation start offset in seconds
const DELAY_MAX: f32 = 5.0;

const OPACITY_MIN: f32 = 0.3;
const OPACITY_MAX: f32 = 0.7;

/// Lifetime range handed to the factory, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimeRange {
    pub min: Millis,
    pub max: Millis,
}

/// Allocates ids and draws the randomized parameters of new tools.
///
/// The id counter is the only state; it is never rewound, so ids stay unique
/// across resets for the lifetime of the factory.
#[derive(Debug, Clone)]
pub struct ToolFactory {
    next_id: u64,
    lifetime: LifetimeRange,
}

impl ToolFactory {
    pub fn new(lifetime: LifetimeRange) -> Self {
        Self {
            next_id: 1,
            lifetime,
        }
    }

    /// Number of tools created so far.
    pub fn issued(&self) -> u64 {
        self.next_id - 1
    }

    pub fn create<R: Rng + ?Sized>(&mut self, now: Millis, rng: &mut R) -> FloatingTool {
        let id = ToolId::new(self.next_id);
        self.next_id += 1;
        let kind = ToolKind::ALL[rng.gen_range(0..ToolKind::ALL.len())];
        FloatingTool {
            id,
            kind,
            position: Position {
                x: rng.gen_range(POSITION_MIN..=POSITION_MAX),
                y: rng.gen_range(POSITION_MIN..=POSITION_MAX),
            },
            size: rng.gen_range(SIZE_MIN..=SIZE_MAX),
            animation_duration: rng.gen_range(DURATION_MIN..=DURATION_MAX),
            animation_delay: rng.gen_range(0.0..=DELAY_MAX),
            opacity: rng.gen_range(OPACITY_MIN..=OPACITY_MAX),
            created_at: now,
            lifetime: rng.gen_range(self.lifetime.min..=self.lifetime.max),
            collected: false,
            fading: false,
            exit_vector: None,
        }
    }

    pub fn create_batch<R: Rng + ?Sized>(
        &mut self,
        count: usize,
        now: Millis,
        rng: &mut R,
    ) -> Vec<FloatingTool> {
        (0..count).map(|_| self.create(now, rng)).collect()
    }

    /// Creates `count` tools whose ages are staggered by up to `backdate_max`.
    pub fn seed_batch<R: Rng + ?Sized>(
        &mut self,
        count: usize,
        now: Millis,
        backdate_max: Millis,
        rng: &mut R,
    ) -> Vec<FloatingTool> {
        (0..count)
            .map(|_| {
                let mut tool = self.create(now, rng);
                tool.created_at = now - rng.gen_range(0..=backdate_max.max(0));
                tool
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn factory() -> ToolFactory {
        ToolFactory::new(LifetimeRange {
            min: 8_000,
            max: 20_000,
        })
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let mut factory = factory();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tools = factory.create_batch(200, 0, &mut rng);
        let ids: HashSet<_> = tools.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 200);
        assert!(tools.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(tools[0].id.raw(), 1);
        assert_eq!(factory.issued(), 200);
    }

    #[test]
    fn parameters_stay_in_bounds() {
        let mut factory = factory();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for tool in factory.create_batch(500, 1_000, &mut rng) {
            assert!((POSITION_MIN..=POSITION_MAX).contains(&tool.position.x));
            assert!((POSITION_MIN..=POSITION_MAX).contains(&tool.position.y));
            assert!((SIZE_MIN..=SIZE_MAX).contains(&tool.size));
            assert!((DURATION_MIN..=DURATION_MAX).contains(&tool.animation_duration));
            assert!((0.0..=DELAY_MAX).contains(&tool.animation_delay));
            assert!((OPACITY_MIN..=OPACITY_MAX).contains(&tool.opacity));
            assert!((8_000..=20_000).contains(&tool.lifetime));
            assert_eq!(tool.created_at, 1_000);
            assert!(tool.is_active());
            assert!(tool.exit_vector.is_none());
        }
    }

    #[test]
    fn same_seed_produces_same_tools() {
        let mut a = factory();
        let mut b = factory();
        let batch_a = a.create_batch(10, 0, &mut ChaCha8Rng::seed_from_u64(5));
        let batch_b = b.create_batch(10, 0, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(batch_a, batch_b);
    }

    #[test]
    fn seed_batch_backdates_within_window() {
        let mut factory = factory();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let tools = factory.seed_batch(100, 500, 10_000, &mut rng);
        assert_eq!(tools.len(), 100);
        assert!(tools
            .iter()
            .all(|t| t.created_at <= 500 && t.created_at >= 500 - 10_000));
        let distinct: HashSet<_> = tools.iter().map(|t| t.created_at).collect();
        assert!(distinct.len() > 1, "seeded ages should be staggered");
    }
}
