use crate::error::{CacheError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// Images selected for processing and where their cache files go
#[derive(Debug, Clone)]
pub struct Inputs {
    pub paths: Vec<PathBuf>,
    pub out_dir: PathBuf,
}

/// Resolve the input argument into a sorted list of images.
///
/// A file is taken as is and caches next to itself. A directory contributes
/// every regular file directly inside it whose name ends with `postfix`,
/// skipping hidden files as a shell glob would.
pub fn enumerate_inputs(input: &Path, postfix: &str, out_dir: Option<&Path>) -> Result<Inputs> {
    if input.is_file() {
        let default_out = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        return Ok(Inputs {
            paths: vec![input.to_path_buf()],
            out_dir: out_dir.map(Path::to_path_buf).unwrap_or(default_out),
        });
    }

    if !input.is_dir() {
        return Err(CacheError::InvalidInput(input.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(input)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter(|e| e.file_name().to_string_lossy().ends_with(postfix))
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    Ok(Inputs {
        paths,
        out_dir: out_dir.map(Path::to_path_buf).unwrap_or_else(|| input.to_path_buf()),
    })
}

/// A Python style index expression: `7`, `-1`, `0:10`, `5:`, `::2`, `::-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSlice {
    Single(i64),
    Range {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
}

impl FromStr for IndexSlice {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CacheError::InvalidSlice(s.to_string(), reason.to_string());
        let parse_part = |part: &str| -> Result<Option<i64>> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse::<i64>()
                .map(Some)
                .map_err(|_| invalid(&format!("{:?} is not an integer", part)))
        };

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [single] => parse_part(single)?
                .map(IndexSlice::Single)
                .ok_or_else(|| invalid("empty index")),
            [start, stop] => Ok(IndexSlice::Range {
                start: parse_part(start)?,
                stop: parse_part(stop)?,
                step: None,
            }),
            [start, stop, step] => {
                let step = parse_part(step)?;
                if step == Some(0) {
                    return Err(invalid("slice step cannot be zero"));
                }
                Ok(IndexSlice::Range {
                    start: parse_part(start)?,
                    stop: parse_part(stop)?,
                    step,
                })
            }
            _ => Err(invalid("too many ':' separators")),
        }
    }
}

impl IndexSlice {
    /// Select items the way Python indexing would
    pub fn apply<T: Clone>(&self, items: &[T]) -> Result<Vec<T>> {
        let len = items.len() as i64;
        match *self {
            IndexSlice::Single(index) => {
                let resolved = if index < 0 { index + len } else { index };
                if resolved < 0 || resolved >= len {
                    return Err(CacheError::IndexOutOfRange { index, len: items.len() });
                }
                Ok(vec![items[resolved as usize].clone()])
            }
            IndexSlice::Range { start, stop, step } => {
                let step = step.unwrap_or(1);
                let mut selected = Vec::new();
                if step > 0 {
                    let start = start.map_or(0, |i| clamp_index(i, len, 0, len));
                    let stop = stop.map_or(len, |i| clamp_index(i, len, 0, len));
                    let mut i = start;
                    while i < stop {
                        selected.push(items[i as usize].clone());
                        match i.checked_add(step) {
                            Some(next) => i = next,
                            None => break,
                        }
                    }
                } else {
                    let start = start.map_or(len - 1, |i| clamp_index(i, len, -1, len - 1));
                    let stop = stop.map_or(-1, |i| clamp_index(i, len, -1, len - 1));
                    let mut i = start;
                    while i > stop {
                        selected.push(items[i as usize].clone());
                        match i.checked_add(step) {
                            Some(next) => i = next,
                            None => break,
                        }
                    }
                }
                Ok(selected)
            }
        }
    }
}

fn clamp_index(index: i64, len: i64, lower: i64, upper: i64) -> i64 {
    let resolved = if index < 0 { index + len } else { index };
    resolved.clamp(lower, upper)
}
