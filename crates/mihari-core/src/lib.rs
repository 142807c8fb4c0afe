pub mod counters;
pub mod diff;
pub mod registry;
pub mod scheduler;
pub mod worker;

pub use registry::{RegionRegistry, RegionSnapshot};
pub use scheduler::{PreviewResult, Scheduler};
pub use worker::{OcrJob, TranslateJob, recognition_worker, translation_worker};

#[cfg(test)]
mod tests;
