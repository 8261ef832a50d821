use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{ConfigError, PopulationConfig},
    factory::ToolFactory,
    rng::{streams, RngManager, SystemRng},
    scenario::{Action, ScriptStep},
    scheduler::{Scheduler, TimerId, VirtualScheduler},
    systems::{AgingSystem, ReaperSystem, ReplenishSystem, ScoreMonitor},
    view::FrameSnapshot,
    world::{FloatingTool, Millis, Overlay, ToolId, World},
};

/// Upper bound on back-to-back reconciliation passes after one mutation.
const MAX_RECONCILE_PASSES: usize = 4;

pub struct EngineSettings {
    pub config: PopulationConfig,
    pub seed: u64,
}

pub struct SystemContext<'a> {
    pub now: Millis,
    pub config: &'a PopulationConfig,
}

pub trait System: Send {
    fn name(&self) -> &'static str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}

/// Work items the engine hands to its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Run the periodic system registered at this index
    Sweep(usize),
    RemoveCollected(ToolId),
    DismissOverlay,
}

struct PeriodicSystem {
    period: Millis,
    system: Box<dyn System>,
    timer: Option<TimerId>,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    periodic: Vec<(Millis, Box<dyn System>)>,
    reconcilers: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            periodic: Vec::new(),
            reconcilers: Vec::new(),
        }
    }

    /// Aging and reaper sweeps on their configured periods, plus the
    /// replenisher as reconciler.
    pub fn standard(settings: EngineSettings) -> Self {
        let aging = settings.config.aging_period_ms;
        let reaper = settings.config.reaper_period_ms;
        Self::new(settings)
            .with_periodic_system(aging, AgingSystem::new())
            .with_periodic_system(reaper, ReaperSystem::new())
            .with_reconciler(ReplenishSystem::new())
    }

    pub fn with_periodic_system(mut self, period: Millis, system: impl System + 'static) -> Self {
        self.periodic.push((period, Box::new(system)));
        self
    }

    /// Registers a system that runs after every mutation of the world.
    pub fn with_reconciler(mut self, system: impl System + 'static) -> Self {
        self.reconcilers.push(Box::new(system));
        self
    }

    pub fn build(self) -> Result<Engine, ConfigError> {
        self.build_with_scheduler(VirtualScheduler::default())
    }

    pub fn build_with_scheduler<S: Scheduler<Task>>(
        self,
        scheduler: S,
    ) -> Result<Engine<S>, ConfigError> {
        let EngineSettings { config, seed } = self.settings;
        config.validate()?;
        let factory = ToolFactory::new(config.lifetime_range());
        let world = World::new(factory, config.overlay_asset.clone());
        Ok(Engine {
            monitor: ScoreMonitor::new(config.score_milestone),
            world,
            rng: RngManager::new(seed),
            scheduler,
            periodic: self
                .periodic
                .into_iter()
                .map(|(period, system)| PeriodicSystem {
                    period,
                    system,
                    timer: None,
                })
                .collect(),
            reconcilers: self.reconcilers,
            removals: HashMap::new(),
            overlay_timer: None,
            running: false,
            stats: EngineStats::default(),
            config,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub collections: u64,
    pub resets: u64,
    pub overlays_shown: u64,
    pub sweeps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectOutcome {
    pub id: ToolId,
    pub score: u64,
    /// Whether the id named a tool in the store
    pub found: bool,
    pub milestone_reached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ended_at_ms: Millis,
    pub frames: u64,
    pub collect_actions: u64,
    pub skipped_actions: u64,
    pub resets: u64,
    pub final_score: u64,
    pub overlays_shown: u64,
    pub spawned: u64,
    pub final_active: usize,
    pub min_active: usize,
}

/// Owns the population and drives every mutation of it.
///
/// All changes go through `&mut self`: timer dispatch, collect and reset each
/// mutate the world and then run the reconcilers before returning.
pub struct Engine<S = VirtualScheduler<Task>> {
    config: PopulationConfig,
    world: World,
    rng: RngManager,
    scheduler: S,
    periodic: Vec<PeriodicSystem>,
    reconcilers: Vec<Box<dyn System>>,
    monitor: ScoreMonitor,
    removals: HashMap<ToolId, TimerId>,
    overlay_timer: Option<TimerId>,
    running: bool,
    stats: EngineStats,
}

impl<S: Scheduler<Task>> Engine<S> {
    /// Seeds the population and installs the periodic sweeps.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        let now = self.now();
        self.seed_population(now);
        for (index, entry) in self.periodic.iter_mut().enumerate() {
            entry.timer = Some(
                self.scheduler
                    .schedule_periodic(entry.period, Task::Sweep(index)),
            );
        }
        self.running = true;
        info!(
            now,
            tools = self.world.store.len(),
            sweeps = self.periodic.len(),
            "engine started"
        );
        self.reconcile(now)
    }

    /// Cancels every timer the engine installed.
    pub fn stop(&mut self) {
        for entry in &mut self.periodic {
            if let Some(timer) = entry.timer.take() {
                self.scheduler.cancel(timer);
            }
        }
        for (_, timer) in self.removals.drain() {
            self.scheduler.cancel(timer);
        }
        if let Some(timer) = self.overlay_timer.take() {
            self.scheduler.cancel(timer);
        }
        if self.running {
            info!(now = self.now(), "engine stopped");
        }
        self.running = false;
    }

    pub fn advance_to(&mut self, until: Millis) -> Result<()> {
        while let Some(task) = self.scheduler.fire_next(until) {
            self.dispatch(task)?;
        }
        self.scheduler.settle(until);
        Ok(())
    }

    pub fn advance_by(&mut self, delta: Millis) -> Result<()> {
        self.advance_to(self.now().saturating_add(delta.max(0)))
    }

    /// Handles a user collecting tool `id`.
    ///
    /// The score always increments, even for ids that are unknown or already
    /// collected.
    pub fn collect(&mut self, id: ToolId) -> Result<CollectOutcome> {
        let now = self.now();
        self.world.score += 1;
        self.stats.collections += 1;

        let tools = self.world.store.snapshot();
        let found = tools.iter().any(|tool| tool.id == id);
        if found {
            let mut rng = self.rng.stream(streams::EXIT);
            let next = tools
                .iter()
                .map(|tool| {
                    if tool.id == id {
                        tool.clone().into_collected(&mut rng)
                    } else {
                        tool.clone()
                    }
                })
                .collect();
            self.world.store.replace(next);
        }
        // An earlier pending removal for the same id already fires sooner.
        if !self.removals.contains_key(&id) {
            let timer = self.scheduler.schedule_once(
                self.config.collect_removal_delay_ms,
                Task::RemoveCollected(id),
            );
            self.removals.insert(id, timer);
        }

        let milestone_reached = self.observe_score();
        self.reconcile(now)?;
        debug!(now, %id, found, score = self.world.score, "collect");
        Ok(CollectOutcome {
            id,
            score: self.world.score,
            found,
            milestone_reached,
        })
    }

    /// Zeroes the score and reseeds a full, age-staggered population.
    pub fn reset(&mut self) -> Result<()> {
        let now = self.now();
        self.world.score = 0;
        self.monitor.reset();
        self.seed_population(now);
        self.stats.resets += 1;
        info!(now, tools = self.world.store.len(), "population reset");
        self.reconcile(now)
    }

    /// Applies an external mutation, then reconciles.
    pub fn with_world<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut World) -> T,
    {
        let out = f(&mut self.world);
        let now = self.now();
        self.reconcile(now)?;
        Ok(out)
    }

    /// Replays `script` up to `until`, calling `hook` with a frame every
    /// `frame_every` milliseconds (never when zero).
    pub fn run_with_hook<F>(
        &mut self,
        script: &[ScriptStep],
        until: Millis,
        frame_every: Millis,
        mut hook: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&FrameSnapshot) -> Result<()>,
    {
        self.start()?;
        let mut steps: Vec<&ScriptStep> = script.iter().filter(|step| step.at_ms <= until).collect();
        steps.sort_by_key(|step| step.at_ms);
        let mut steps = steps.into_iter().peekable();
        let mut next_frame = (frame_every > 0).then(|| self.now() + frame_every);
        let mut summary = RunSummary {
            min_active: self.active_count(),
            ..RunSummary::default()
        };

        loop {
            let mut target = until;
            if let Some(step) = steps.peek() {
                target = target.min(step.at_ms.max(self.now()));
            }
            if let Some(frame_at) = next_frame {
                target = target.min(frame_at);
            }
            self.advance_to(target)?;

            while let Some(step) = steps.next_if(|step| step.at_ms <= target) {
                self.apply(&step.action, &mut summary)?;
            }
            if next_frame == Some(target) {
                hook(&self.frame())?;
                summary.frames += 1;
                next_frame = Some(target + frame_every);
            }
            summary.min_active = summary.min_active.min(self.active_count());
            if target >= until {
                break;
            }
        }

        summary.ended_at_ms = self.now();
        summary.final_score = self.world.score;
        summary.overlays_shown = self.stats.overlays_shown;
        summary.spawned = self.world.factory.issued();
        summary.final_active = self.active_count();
        Ok(summary)
    }

    fn apply(&mut self, action: &Action, summary: &mut RunSummary) -> Result<()> {
        match action {
            Action::Collect { id } => {
                self.collect(ToolId::new(*id))?;
                summary.collect_actions += 1;
            }
            Action::CollectActive { index } => {
                let target = self
                    .world
                    .store
                    .iter()
                    .filter(|tool| tool.is_active())
                    .nth(*index)
                    .map(|tool| tool.id);
                match target {
                    Some(id) => {
                        self.collect(id)?;
                        summary.collect_actions += 1;
                    }
                    None => {
                        warn!(now = self.now(), index, "no active tool at index, skipping");
                        summary.skipped_actions += 1;
                    }
                }
            }
            Action::Reset => {
                self.reset()?;
                summary.resets += 1;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, task: Task) -> Result<()> {
        let now = self.scheduler.now();
        match task {
            Task::Sweep(index) => {
                let Some(entry) = self.periodic.get_mut(index) else {
                    return Ok(());
                };
                let ctx = SystemContext {
                    now,
                    config: &self.config,
                };
                let mut rng = self.rng.stream(entry.system.name());
                entry
                    .system
                    .run(&ctx, &mut self.world, &mut rng)
                    .with_context(|| format!("system '{}' failed", entry.system.name()))?;
                self.stats.sweeps += 1;
            }
            Task::RemoveCollected(id) => {
                self.removals.remove(&id);
                let tools = self.world.store.snapshot();
                if tools.iter().any(|tool| tool.id == id) {
                    let next = tools.iter().filter(|tool| tool.id != id).cloned().collect();
                    self.world.store.replace(next);
                    debug!(now, %id, "removed collected tool");
                }
            }
            Task::DismissOverlay => {
                self.overlay_timer = None;
                self.world.overlay.visible = false;
                debug!(now, "overlay dismissed");
            }
        }
        self.reconcile(now)
    }

    fn reconcile(&mut self, now: Millis) -> Result<()> {
        for _ in 0..MAX_RECONCILE_PASSES {
            let generation = self.world.store.generation();
            let ctx = SystemContext {
                now,
                config: &self.config,
            };
            for system in self.reconcilers.iter_mut() {
                let mut rng = self.rng.stream(system.name());
                system
                    .run(&ctx, &mut self.world, &mut rng)
                    .with_context(|| format!("reconciler '{}' failed", system.name()))?;
            }
            if self.world.store.generation() == generation {
                return Ok(());
            }
        }
        warn!(
            now,
            passes = MAX_RECONCILE_PASSES,
            "population still changing after reconciliation"
        );
        Ok(())
    }

    fn observe_score(&mut self) -> bool {
        if !self.monitor.observe(self.world.score) {
            return false;
        }
        if let Some(timer) = self.overlay_timer.take() {
            self.scheduler.cancel(timer);
        }
        self.world.overlay.visible = true;
        self.overlay_timer = Some(
            self.scheduler
                .schedule_once(self.config.overlay_duration_ms, Task::DismissOverlay),
        );
        self.stats.overlays_shown += 1;
        info!(score = self.world.score, "score milestone reached");
        true
    }

    fn seed_population(&mut self, now: Millis) {
        let mut rng = self.rng.stream(streams::SEED);
        let batch = self.world.factory.seed_batch(
            self.config.min_tools,
            now,
            self.config.reset_backdate_max_ms,
            &mut rng,
        );
        self.world.store.replace(batch);
    }

    pub fn now(&self) -> Millis {
        self.scheduler.now()
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn score(&self) -> u64 {
        self.world.score
    }

    pub fn overlay(&self) -> &Overlay {
        &self.world.overlay
    }

    pub fn tools(&self) -> Arc<[FloatingTool]> {
        self.world.store.snapshot()
    }

    pub fn active_count(&self) -> usize {
        self.world.store.active_count()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn frame(&self) -> FrameSnapshot {
        FrameSnapshot::capture(self.now(), &self.world)
    }
}
