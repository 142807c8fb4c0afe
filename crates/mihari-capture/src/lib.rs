pub mod source;

pub use source::{CaptureError, CaptureSource, WindowInfo, WindowSource, find_window, list_windows};
