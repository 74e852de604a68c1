//! qgrid-services: Parallel job handling, configuration, and the quantizer façade

pub mod config;
pub mod parallel;
pub mod quantizer;

pub use config::{config_path, load_config, load_config_from, parse_config, save_config, save_config_to};
pub use config::{ConfigError, GraceConfig, GraceKind, JobsConfig, OptimizerKind, QuantizerConfig};
pub use parallel::{JobHandlerError, ParallelJobHandler, ParallelJobHandlerWorker};
pub use quantizer::{Quantizer, QuantizerError};
