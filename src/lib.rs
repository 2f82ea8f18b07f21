pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod postprocess;
pub mod preprocess;
pub mod render;
pub mod runner;
pub mod selection;

// Re-export commonly used items
pub use cache::CacheRecord;
pub use config::DetectionConfig;
pub use detector::{FaceDetector, ModelOptions, create_detector};
pub use error::{CacheError, Result};
pub use runner::{RunOptions, RunSummary};
pub use selection::{IndexSlice, enumerate_inputs};
