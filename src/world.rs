use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::factory::ToolFactory;

/// Virtual time in milliseconds. Signed so backdated entities can predate the
/// engine's epoch.
pub type Millis = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolId(u64);

impl ToolId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Hammer,
    Saw,
    Wrench,
    Screwdriver,
    Ruler,
    Bucket,
    Paint,
    Gear,
    Toolbox,
    Square,
    Bolt,
    Ladder,
}

impl ToolKind {
    pub const ALL: [ToolKind; 12] = [
        ToolKind::Hammer,
        ToolKind::Saw,
        ToolKind::Wrench,
        ToolKind::Screwdriver,
        ToolKind::Ruler,
        ToolKind::Bucket,
        ToolKind::Paint,
        ToolKind::Gear,
        ToolKind::Toolbox,
        ToolKind::Square,
        ToolKind::Bolt,
        ToolKind::Ladder,
    ];

    pub fn glyph(self) -> &'static str {
        match self {
            ToolKind::Hammer => "🔨",
            ToolKind::Saw => "🪚",
            ToolKind::Wrench => "🔧",
            ToolKind::Screwdriver => "🪛",
            ToolKind::Ruler => "📏",
            ToolKind::Bucket => "🪣",
            ToolKind::Paint => "🎨",
            ToolKind::Gear => "⚙️",
            ToolKind::Toolbox => "🧰",
            ToolKind::Square => "📐",
            ToolKind::Bolt => "🔩",
            ToolKind::Ladder => "🪜",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Hammer => "hammer",
            ToolKind::Saw => "saw",
            ToolKind::Wrench => "wrench",
            ToolKind::Screwdriver => "screwdriver",
            ToolKind::Ruler => "ruler",
            ToolKind::Bucket => "bucket",
            ToolKind::Paint => "paint",
            ToolKind::Gear => "gear",
            ToolKind::Toolbox => "toolbox",
            ToolKind::Square => "square",
            ToolKind::Bolt => "bolt",
            ToolKind::Ladder => "ladder",
        }
    }
}

/// Percentage coordinates on the playfield.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Pixel offsets a collected tool flies off along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitVector {
    pub dx: f32,
    pub dy: f32,
}

/// Maximum absolute offset on either axis of an exit vector.
pub const EXIT_SPREAD_PX: f32 = 250.0;

impl ExitVector {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            dx: rng.gen_range(-EXIT_SPREAD_PX..=EXIT_SPREAD_PX),
            dy: rng.gen_range(-EXIT_SPREAD_PX..=EXIT_SPREAD_PX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingTool {
    pub id: ToolId,
    pub kind: ToolKind,
    pub position: Position,
    pub size: f32,
    pub animation_duration: f32,
    pub animation_delay: f32,
    pub opacity: f32,
    pub created_at: Millis,
    pub lifetime: Millis,
    pub collected: bool,
    pub fading: bool,
    pub exit_vector: Option<ExitVector>,
}

impl FloatingTool {
    pub fn age(&self, now: Millis) -> Millis {
        now - self.created_at
    }

    /// Neither collected nor fading.
    pub fn is_active(&self) -> bool {
        !self.collected && !self.fading
    }

    pub fn is_expired(&self, now: Millis) -> bool {
        self.age(now) >= self.lifetime
    }

    pub fn should_fade(&self, now: Millis, fade_lead: Millis) -> bool {
        self.is_active() && self.age(now) > self.lifetime - fade_lead
    }

    /// Flags the tool as collected, keeping an exit vector that was already
    /// assigned.
    pub fn into_collected<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.collected = true;
        if self.exit_vector.is_none() {
            self.exit_vector = Some(ExitVector::random(rng));
        }
        self
    }
}

pub fn count_active(tools: &[FloatingTool]) -> usize {
    tools.iter().filter(|tool| tool.is_active()).count()
}

/// Copy-on-write store of live tools.
///
/// Every mutation swaps in a complete new sequence; handles returned by
/// [`PopulationStore::snapshot`] keep observing the version they were taken
/// from.
#[derive(Debug, Clone)]
pub struct PopulationStore {
    tools: Arc<[FloatingTool]>,
    generation: u64,
}

impl Default for PopulationStore {
    fn default() -> Self {
        Self {
            tools: Arc::from(Vec::new()),
            generation: 0,
        }
    }
}

impl PopulationStore {
    pub fn snapshot(&self) -> Arc<[FloatingTool]> {
        Arc::clone(&self.tools)
    }

    pub fn replace(&mut self, tools: Vec<FloatingTool>) {
        self.tools = Arc::from(tools);
        self.generation += 1;
    }

    /// Bumped on every [`PopulationStore::replace`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn active_count(&self) -> usize {
        count_active(&self.tools)
    }

    pub fn get(&self, id: ToolId) -> Option<&FloatingTool> {
        self.tools.iter().find(|tool| tool.id == id)
    }

    pub fn contains(&self, id: ToolId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FloatingTool> {
        self.tools.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub visible: bool,
    pub asset: String,
}

/// Session state: the population, the score and the celebration overlay.
pub struct World {
    pub(crate) store: PopulationStore,
    pub(crate) score: u64,
    pub(crate) overlay: Overlay,
    pub(crate) factory: ToolFactory,
}

impl World {
    pub fn new(factory: ToolFactory, overlay_asset: impl Into<String>) -> Self {
        Self {
            store: PopulationStore::default(),
            score: 0,
            overlay: Overlay {
                visible: false,
                asset: overlay_asset.into(),
            },
            factory,
        }
    }

    pub fn store(&self) -> &PopulationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PopulationStore {
        &mut self.store
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn factory(&self) -> &ToolFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut ToolFactory {
        &mut self.factory
    }

    pub fn active_count(&self) -> usize {
        self.store.active_count()
    }
}
