use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    config::PopulationConfig,
    engine::{Engine, EngineBuilder, EngineSettings},
    world::Millis,
};

fn default_duration_ms() -> Millis {
    60_000
}

fn default_snapshot_interval_ms() -> Millis {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: Millis,
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: Millis,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub actions: Vec<ScriptStep>,
}

/// A user action replayed at a fixed virtual time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    pub at_ms: Millis,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Collect {
        id: u64,
    },
    /// Collect the n-th active tool in store order
    CollectActive {
        #[serde(default)]
        index: usize,
    },
    Reset,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario = Scenario::from_yaml(&data)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(text).context("invalid scenario yaml")?;
        scenario
            .population
            .validate()
            .with_context(|| format!("scenario '{}' has an invalid population", scenario.name))?;
        Ok(scenario)
    }

    pub fn engine(&self) -> Result<Engine> {
        let engine = EngineBuilder::standard(EngineSettings {
            config: self.population.clone(),
            seed: self.seed,
        })
        .build()?;
        Ok(engine)
    }

    pub fn duration(&self, override_ms: Option<Millis>) -> Millis {
        override_ms.unwrap_or(self.duration_ms)
    }
}
