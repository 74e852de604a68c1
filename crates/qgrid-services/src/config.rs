//! Quantizer settings persisted as TOML

use std::path::{Path, PathBuf};

use qgrid_core::{
    AttackPointOptimization, CollapsingGraceHandler, ConcatenatingGraceHandler, DiscardingGraceHandler, Duration,
    GraceHandling, JobHandler, MeasurewiseAttackPointOptimizer, NaiveAttackPointOptimizer, NullAttackPointOptimizer,
    QuantizeError, SerialJobHandler,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parallel::ParallelJobHandler;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid grace settings: {0}")]
    Grace(#[from] QuantizeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Naive,
    Measurewise,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraceKind {
    Collapsing,
    #[default]
    Concatenating,
    Discarding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraceConfig {
    pub kind: GraceKind,
    /// Only read by the concatenating handler
    pub grace_duration: Duration,
    pub discard_grace_rest: bool,
    pub replace_rest_with_final_grace_note: bool,
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            kind: GraceKind::default(),
            grace_duration: Duration::new(1, 16),
            discard_grace_rest: true,
            replace_rest_with_final_grace_note: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub parallel: bool,
    /// Defaults to the available parallelism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    pub attach_tempos: bool,
    pub optimizer: OptimizerKind,
    pub jobs: JobsConfig,
    pub grace: GraceConfig,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            attach_tempos: true,
            optimizer: OptimizerKind::default(),
            jobs: JobsConfig::default(),
            grace: GraceConfig::default(),
        }
    }
}

impl QuantizerConfig {
    pub fn grace_handler(&self) -> Result<GraceHandling, ConfigError> {
        let grace = &self.grace;
        Ok(match grace.kind {
            GraceKind::Collapsing => GraceHandling::Collapsing(CollapsingGraceHandler),
            GraceKind::Concatenating => GraceHandling::Concatenating(ConcatenatingGraceHandler::new(
                grace.discard_grace_rest,
                grace.grace_duration,
                grace.replace_rest_with_final_grace_note,
            )?),
            GraceKind::Discarding => GraceHandling::Discarding(DiscardingGraceHandler::new()),
        })
    }

    pub fn attack_point_optimizer(&self) -> AttackPointOptimization {
        match self.optimizer {
            OptimizerKind::Naive => AttackPointOptimization::Naive(NaiveAttackPointOptimizer),
            OptimizerKind::Measurewise => AttackPointOptimization::Measurewise(MeasurewiseAttackPointOptimizer),
            OptimizerKind::Null => AttackPointOptimization::Null(NullAttackPointOptimizer),
        }
    }

    pub fn job_handler(&self) -> Box<dyn JobHandler> {
        if !self.jobs.parallel {
            return Box::new(SerialJobHandler);
        }
        match self.jobs.workers {
            Some(workers) => Box::new(ParallelJobHandler::new(workers)),
            None => Box::new(ParallelJobHandler::default()),
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qgrid")
        .join("config.toml")
}

/// Load from the default location, falling back to defaults on any failure
pub fn load_config() -> QuantizerConfig {
    load_config_from(&config_path()).unwrap_or_default()
}

pub fn load_config_from(path: &Path) -> Result<QuantizerConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<QuantizerConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

pub fn save_config(config: &QuantizerConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &QuantizerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text)?;
    Ok(())
}
