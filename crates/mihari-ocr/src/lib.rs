pub mod cleanup;
pub mod engine;
pub mod sidecar;

pub use cleanup::clean_recognized;
pub use engine::{DisabledEngine, EngineInfo, RecognitionEngine, RecognitionError, available_engines};
pub use sidecar::SidecarEngine;
