//! Per-image detection cache files.
//!
//! One JSON file per image, named after the image stem plus a postfix. A
//! file's existence is what marks an image as done, so writes go through a
//! temporary sibling and a rename.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Final detections for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// File name of the source image
    pub image: String,
    pub width: u32,
    pub height: u32,
    /// `[x1, y1, x2, y2]` in source image pixels
    pub boxes: Vec<[f32; 4]>,
}

/// Cache file location for an image: `out_dir/<stem><out_postfix>`
pub fn cache_path(image: &Path, out_dir: &Path, out_postfix: &str) -> PathBuf {
    out_dir.join(format!("{}{}", image_stem(image), out_postfix))
}

/// Image file name without its extension
pub fn image_stem(image: &Path) -> String {
    image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn is_cached(path: &Path) -> bool {
    path.exists()
}

pub fn write(path: &Path, record: &CacheRecord) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let json = serde_json::to_vec(record).map_err(|source| CacheError::CacheFormat {
        path: path.to_path_buf(),
        source,
    })?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn read(path: &Path) -> Result<CacheRecord> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(|source| CacheError::CacheFormat {
        path: path.to_path_buf(),
        source,
    })
}
