use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    rng::{streams, SystemRng},
    world::{FloatingTool, World},
};

/// Removes tools that were collected or have outlived their lifetime.
pub struct ReaperSystem;

impl ReaperSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReaperSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ReaperSystem {
    fn name(&self) -> &'static str {
        streams::REAPER
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let tools = world.store.snapshot();
        let survivors: Vec<FloatingTool> = tools
            .iter()
            .filter(|tool| !tool.collected && !tool.is_expired(ctx.now))
            .cloned()
            .collect();
        let reaped = tools.len() - survivors.len();
        if reaped > 0 {
            world.store.replace(survivors);
            tracing::debug!(now = ctx.now, reaped, "reaper sweep");
        }
        Ok(())
    }
}
