pub mod config;
pub mod ops;

pub use config::{PipelineConfig, PipelineStep, StepOp};
