pub mod settings;

pub use settings::{CaptureConfig, Config, OutputConfig};
