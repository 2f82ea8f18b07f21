use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while selecting, detecting and caching images
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("input is not a path to a file or a directory: {0:?}")]
    InvalidInput(PathBuf),

    #[error("invalid index slice {0:?}: {1}")]
    InvalidSlice(String, String),

    #[error("index {index} is out of range for {len} images")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("padding of {pad} pixels does not fit a dimension of {dim} pixels")]
    InvalidPadding { pad: usize, dim: usize },

    #[error("unexpected detection tensor shape {0:?}, expected [1, classes, top_k, 5]")]
    InvalidDetectionShape(Vec<usize>),

    #[error("unknown detector: {0}")]
    UnknownDetector(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("failed to decode image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("malformed cache file {path:?}: {source}")]
    CacheFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid detection config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
