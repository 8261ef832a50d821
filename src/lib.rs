pub mod config;
pub mod engine;
pub mod factory;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod systems;
pub mod view;
pub mod web;
pub mod world;

pub use config::PopulationConfig;
pub use engine::{Engine, EngineBuilder, EngineSettings, RunSummary};
pub use world::{FloatingTool, Millis, ToolId, ToolKind};
