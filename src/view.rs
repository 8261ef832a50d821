//! Render descriptors handed to the presentation layer.

use serde::Serialize;

use crate::world::{FloatingTool, Millis, Overlay, Position, World};

/// Length of the fade-out animation of an expiring tool.
pub const FADE_OUT_MS: Millis = 2_000;
/// Length of the fly-off animation of a collected tool.
pub const EXIT_MS: Millis = 800;
const EXIT_ROTATION_DEG: f32 = 720.0;
const EXIT_SCALE: f32 = 0.3;
/// Wobble runs slightly faster than the float cycle.
const WOBBLE_RATIO: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Animation {
    Float {
        float_secs: f32,
        wobble_secs: f32,
        delay_secs: f32,
    },
    FadeOut {
        duration_ms: Millis,
    },
    Exit {
        dx: f32,
        dy: f32,
        rotate_deg: f32,
        scale: f32,
        duration_ms: Millis,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolView {
    pub id: u64,
    pub glyph: &'static str,
    pub name: &'static str,
    pub position: Position,
    pub size: f32,
    pub opacity: f32,
    pub animation: Animation,
    pub interactive: bool,
}

impl ToolView {
    pub fn from_tool(tool: &FloatingTool) -> Self {
        let animation = if tool.collected {
            let exit = tool.exit_vector.unwrap_or_default();
            Animation::Exit {
                dx: exit.dx,
                dy: exit.dy,
                rotate_deg: EXIT_ROTATION_DEG,
                scale: EXIT_SCALE,
                duration_ms: EXIT_MS,
            }
        } else if tool.fading {
            Animation::FadeOut {
                duration_ms: FADE_OUT_MS,
            }
        } else {
            Animation::Float {
                float_secs: tool.animation_duration,
                wobble_secs: tool.animation_duration * WOBBLE_RATIO,
                delay_secs: tool.animation_delay,
            }
        };
        Self {
            id: tool.id.raw(),
            glyph: tool.kind.glyph(),
            name: tool.kind.name(),
            position: tool.position,
            size: tool.size,
            opacity: if tool.is_active() { tool.opacity } else { 0.0 },
            animation,
            interactive: !tool.fading,
        }
    }
}

/// Everything the presentation layer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub now_ms: Millis,
    pub score: u64,
    pub overlay: Overlay,
    pub active: usize,
    pub total: usize,
    pub tools: Vec<ToolView>,
}

impl FrameSnapshot {
    pub fn capture(now: Millis, world: &World) -> Self {
        let store = world.store();
        Self {
            now_ms: now,
            score: world.score(),
            overlay: world.overlay().clone(),
            active: store.active_count(),
            total: store.len(),
            tools: store.iter().map(ToolView::from_tool).collect(),
        }
    }
}
