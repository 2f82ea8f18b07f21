use crate::cache::{self, CacheRecord};
use crate::config::DetectionConfig;
use crate::detector::FaceDetector;
use crate::error::{CacheError, Result};
use crate::postprocess;
use crate::preprocess::{self, PreparedInput};
use crate::render;
use image::RgbImage;
use log::{debug, error, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Settings for one caching run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub out_dir: PathBuf,
    pub out_postfix: String,
    /// Reflect padding relative to image size
    pub image_padding: Option<f64>,
    /// Write `<stem>_render.jpg` with the detections drawn
    pub display: bool,
    /// Images decoded and preprocessed together
    pub batch_size: usize,
    pub config: DetectionConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    pub faces: usize,
}

/// One selected image, in list order
struct Entry<'a> {
    position: usize,
    path: &'a Path,
    cache_path: PathBuf,
    cached: bool,
}

fn plan<'a>(paths: &'a [PathBuf], options: &RunOptions) -> Vec<Entry<'a>> {
    paths
        .iter()
        .enumerate()
        .map(|(n, path)| {
            let cache_path = cache::cache_path(path, &options.out_dir, &options.out_postfix);
            Entry {
                position: n + 1,
                path,
                cached: cache::is_cached(&cache_path),
                cache_path,
            }
        })
        .collect()
}

struct Loaded {
    image: RgbImage,
    input: PreparedInput,
}

fn load(path: &Path, options: &RunOptions) -> Result<Loaded> {
    let image = image::open(path)
        .map_err(|source| CacheError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let input = preprocess::prepare(&image, options.config.mean_bgr, options.image_padding)?;
    Ok(Loaded { image, input })
}

fn process(
    entry: &Entry<'_>,
    loaded: Loaded,
    detector: &mut dyn FaceDetector,
    options: &RunOptions,
) -> Result<usize> {
    let detections = detector.detect(&loaded.input.tensor)?;
    let boxes = postprocess::decode(
        detections.view(),
        loaded.input.size(),
        loaded.input.pad,
        &options.config,
    )?;

    if options.display {
        let render_path = render::render_path(entry.path, &options.out_dir);
        render::save_render(&loaded.image, &boxes, &render_path)?;
        debug!("Rendered {:?}", render_path);
    }

    let record = CacheRecord {
        image: entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        width: loaded.image.width(),
        height: loaded.image.height(),
        boxes,
    };
    cache::write(&entry.cache_path, &record)?;
    debug!("Cached {} faces to {:?}", record.boxes.len(), entry.cache_path);

    Ok(record.boxes.len())
}

/// Detect faces in every image without a cache file and write one for each.
///
/// Images that fail are logged and counted; the run carries on with the rest.
pub fn run(detector: &mut dyn FaceDetector, paths: &[PathBuf], options: &RunOptions) -> Result<RunSummary> {
    std::fs::create_dir_all(&options.out_dir)?;

    let total = paths.len();
    let mut summary = RunSummary { total, ..Default::default() };

    let entries = plan(paths, options);
    let pending = entries.iter().filter(|e| !e.cached).count();
    if pending == 0 {
        for entry in &entries {
            info!("[{}/{}] Skipping \"{}\"", entry.position, total, cache::image_stem(entry.path));
        }
        summary.skipped = total;
        info!("Nothing to do, all {} images are cached", total);
        return Ok(summary);
    }

    info!("Running {} on {} images", detector.name(), pending);
    let batch_size = options.batch_size.max(1);
    let start_time = Instant::now();

    // A chunk holds up to `batch_size` uncached entries plus the cached ones
    // between them.
    let mut rest = entries.as_slice();
    while !rest.is_empty() {
        let mut take = 0;
        let mut uncached = 0;
        while take < rest.len() && uncached < batch_size {
            if !rest[take].cached {
                uncached += 1;
            }
            take += 1;
        }
        let (chunk, tail) = rest.split_at(take);
        rest = tail;

        let loaded: Vec<Option<Result<Loaded>>> = chunk
            .par_iter()
            .map(|entry| (!entry.cached).then(|| load(entry.path, options)))
            .collect();

        for (entry, loaded) in chunk.iter().zip(loaded) {
            let name = cache::image_stem(entry.path);
            let Some(loaded) = loaded else {
                info!("[{}/{}] Skipping \"{}\"", entry.position, total, name);
                summary.skipped += 1;
                continue;
            };

            info!("[{}/{}] Processing \"{}\"...", entry.position, total, name);
            match loaded.and_then(|loaded| process(entry, loaded, &mut *detector, options)) {
                Ok(faces) => {
                    summary.processed += 1;
                    summary.faces += faces;
                }
                Err(err) => {
                    error!("Failed to process {:?}: {}", entry.path, err);
                    summary.failed += 1;
                }
            }
        }
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        info!(
            "Processed {} images in {:.1}s ({:.2} images/sec)",
            summary.processed,
            elapsed,
            summary.processed as f64 / elapsed
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use std::fs;
    use tempfile::tempdir;

    /// Returns one fixed box per call and remembers the input sizes it saw
    struct StubDetector {
        rows: Vec<[f32; 5]>,
        seen: Vec<(usize, usize)>,
    }

    impl StubDetector {
        fn new(rows: Vec<[f32; 5]>) -> Self {
            Self { rows, seen: Vec::new() }
        }
    }

    impl FaceDetector for StubDetector {
        fn name(&self) -> &str {
            "stub"
        }

        fn detect(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
            let (_, _, h, w) = input.dim();
            self.seen.push((w, h));
            let mut out = Array4::<f32>::zeros((1, 2, self.rows.len() + 1, 5));
            for (j, row) in self.rows.iter().enumerate() {
                for (k, v) in row.iter().enumerate() {
                    out[[0, 1, j, k]] = *v;
                }
            }
            Ok(out)
        }
    }

    fn options(out_dir: &Path) -> RunOptions {
        RunOptions {
            out_dir: out_dir.to_path_buf(),
            out_postfix: "_dsfd.json".to_string(),
            image_padding: None,
            display: false,
            batch_size: 2,
            config: DetectionConfig::default(),
        }
    }

    fn write_images(dir: &Path, names: &[&str], width: u32, height: u32) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                RgbImage::new(width, height).save(&path).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_caches_then_skips() {
        let dir = tempdir().unwrap();
        let paths = write_images(dir.path(), &["a.png", "b.png", "c.png"], 40, 20);
        let opts = options(dir.path());

        let mut detector = StubDetector::new(vec![[0.9, 0.25, 0.25, 0.75, 0.75]]);
        let summary = run(&mut detector, &paths, &opts).unwrap();
        assert_eq!(
            summary,
            RunSummary { total: 3, skipped: 0, processed: 3, failed: 0, faces: 3 }
        );

        let record = cache::read(&dir.path().join("b_dsfd.json")).unwrap();
        assert_eq!(record.image, "b.png");
        assert_eq!((record.width, record.height), (40, 20));
        assert_eq!(record.boxes, vec![[10.0, 5.0, 30.0, 15.0]]);

        let mut detector = StubDetector::new(vec![]);
        let summary = run(&mut detector, &paths, &opts).unwrap();
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.processed, 0);
        assert!(detector.seen.is_empty());
    }

    #[test]
    fn test_plan_keeps_list_order() {
        let dir = tempdir().unwrap();
        let paths = write_images(dir.path(), &["a.png", "b.png", "c.png", "d.png"], 4, 4);
        let opts = options(dir.path());
        fs::write(dir.path().join("b_dsfd.json"), "{}").unwrap();
        fs::write(dir.path().join("d_dsfd.json"), "{}").unwrap();

        let entries = plan(&paths, &opts);
        let order: Vec<(usize, bool)> = entries.iter().map(|e| (e.position, e.cached)).collect();
        assert_eq!(order, vec![(1, false), (2, true), (3, false), (4, true)]);
    }

    #[test]
    fn test_mixed_cached_and_pending() {
        let dir = tempdir().unwrap();
        let paths = write_images(dir.path(), &["a.png", "b.png", "c.png", "d.png", "e.png"], 8, 8);
        let mut opts = options(dir.path());
        opts.batch_size = 1;
        fs::write(dir.path().join("b_dsfd.json"), "{}").unwrap();
        fs::write(dir.path().join("c_dsfd.json"), "{}").unwrap();

        let mut detector = StubDetector::new(vec![[0.9, 0.0, 0.0, 0.5, 0.5]]);
        let summary = run(&mut detector, &paths, &opts).unwrap();

        assert_eq!(
            summary,
            RunSummary { total: 5, skipped: 2, processed: 3, failed: 0, faces: 3 }
        );
        assert_eq!(detector.seen.len(), 3);
        assert_eq!(fs::read_to_string(dir.path().join("b_dsfd.json")).unwrap(), "{}");
    }

    #[test]
    fn test_padding_is_removed_from_boxes() {
        let dir = tempdir().unwrap();
        let paths = write_images(dir.path(), &["wide.png"], 40, 20);
        let mut opts = options(dir.path());
        opts.image_padding = Some(0.25);

        let mut detector = StubDetector::new(vec![[0.9, 0.25, 0.25, 0.75, 0.75]]);
        run(&mut detector, &paths, &opts).unwrap();

        assert_eq!(detector.seen, vec![(60, 30)]);
        let record = cache::read(&dir.path().join("wide_dsfd.json")).unwrap();
        assert_eq!(record.boxes, vec![[5.0, 2.5, 35.0, 17.5]]);
    }

    #[test]
    fn test_failed_image_does_not_stop_run() {
        let dir = tempdir().unwrap();
        let mut paths = write_images(dir.path(), &["good.png"], 8, 8);
        let broken = dir.path().join("broken.png");
        fs::write(&broken, b"not an image").unwrap();
        paths.insert(0, broken);

        let mut detector = StubDetector::new(vec![]);
        let summary = run(&mut detector, &paths, &options(dir.path())).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(!dir.path().join("broken_dsfd.json").exists());
        assert!(cache::read(&dir.path().join("good_dsfd.json")).unwrap().boxes.is_empty());
    }

    #[test]
    fn test_display_writes_render() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let paths = write_images(dir.path(), &["face.png"], 16, 16);
        let mut opts = options(&out);
        opts.display = true;

        let mut detector = StubDetector::new(vec![[0.8, 0.25, 0.25, 0.5, 0.5]]);
        run(&mut detector, &paths, &opts).unwrap();

        assert!(out.join("face_render.jpg").exists());
        assert!(out.join("face_dsfd.json").exists());
    }
}
