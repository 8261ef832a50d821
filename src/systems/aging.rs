use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    rng::{streams, SystemRng},
    world::{FloatingTool, World},
};

/// Flags tools that are close to the end of their lifetime as fading.
pub struct AgingSystem;

impl AgingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AgingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for AgingSystem {
    fn name(&self) -> &'static str {
        streams::AGING
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let lead = ctx.config.fade_lead_ms;
        let tools = world.store.snapshot();
        let due = tools
            .iter()
            .filter(|tool| tool.should_fade(ctx.now, lead))
            .count();
        if due == 0 {
            return Ok(());
        }

        let next: Vec<FloatingTool> = tools
            .iter()
            .map(|tool| {
                if tool.should_fade(ctx.now, lead) {
                    FloatingTool {
                        fading: true,
                        ..tool.clone()
                    }
                } else {
                    tool.clone()
                }
            })
            .collect();
        world.store.replace(next);
        tracing::debug!(now = ctx.now, fading = due, "aging sweep");
        Ok(())
    }
}
