use anyhow::Result;
use rand::Rng;

use crate::{
    engine::{System, SystemContext},
    factory::ToolFactory,
    rng::{streams, SystemRng},
    world::{count_active, FloatingTool, Millis, World},
};

/// Computes the population that restores the active floor.
///
/// Returns `None` when the floor already holds. Otherwise the result drops
/// collected tools and appends exactly `floor - active` fresh ones, so
/// running it again on its own output yields `None`.
pub fn replenish<R: Rng + ?Sized>(
    tools: &[FloatingTool],
    floor: usize,
    factory: &mut ToolFactory,
    now: Millis,
    rng: &mut R,
) -> Option<Vec<FloatingTool>> {
    let active = count_active(tools);
    if active >= floor {
        return None;
    }
    let deficit = floor - active;
    let mut next: Vec<FloatingTool> = tools.iter().filter(|tool| !tool.collected).cloned().collect();
    next.extend(factory.create_batch(deficit, now, rng));
    Some(next)
}

/// Tops the active population back up to `min_tools` after every mutation.
pub struct ReplenishSystem;

impl ReplenishSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReplenishSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ReplenishSystem {
    fn name(&self) -> &'static str {
        streams::REPLENISH
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let tools = world.store.snapshot();
        if let Some(next) = replenish(
            &tools,
            ctx.config.min_tools,
            &mut world.factory,
            ctx.now,
            rng,
        ) {
            tracing::debug!(
                now = ctx.now,
                before = tools.len(),
                after = next.len(),
                "replenished population"
            );
            world.store.replace(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::factory::LifetimeRange;
    use crate::world::tests::tool;

    fn factory() -> ToolFactory {
        ToolFactory::new(LifetimeRange {
            min: 8_000,
            max: 20_000,
        })
    }

    #[test]
    fn fills_exact_deficit_and_compacts_collected() {
        let mut collected = tool(100, 0, 10_000);
        collected.collected = true;
        let mut fading = tool(101, 0, 10_000);
        fading.fading = true;
        let tools = vec![tool(102, 0, 10_000), collected, fading];
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut factory = factory();

        let next = replenish(&tools, 5, &mut factory, 1_000, &mut rng).expect("deficit");
        assert_eq!(count_active(&next), 5);
        assert_eq!(next.len(), 6, "one active, one fading, four new");
        assert!(next.iter().all(|t| !t.collected));
        assert_eq!(factory.issued(), 4);
        assert!(next[2..].iter().all(|t| t.created_at == 1_000));
    }

    #[test]
    fn settles_after_one_pass() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut factory = factory();
        let first = replenish(&[], 30, &mut factory, 0, &mut rng).expect("empty store refills");
        assert_eq!(first.len(), 30);
        assert!(replenish(&first, 30, &mut factory, 0, &mut rng).is_none());
        assert_eq!(factory.issued(), 30);
    }

    #[test]
    fn never_trims_surplus() {
        let tools: Vec<_> = (1..=40).map(|id| tool(id, 0, 10_000)).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(replenish(&tools, 30, &mut factory(), 0, &mut rng).is_none());
    }
}
