use anyhow::{Context, Result, bail};
use clap::Parser;
use face_cache::detector::{ModelOptions, create_detector};
use face_cache::runner::{self, RunOptions};
use face_cache::selection::{IndexSlice, enumerate_inputs};
use face_cache::DetectionConfig;
use log::{info, warn};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Detect faces in images and cache the bounding boxes per image")]
struct Args {
    /// Path to an input image or a directory of images
    #[clap(value_name = "PATH")]
    input: PathBuf,

    /// Output directory (defaults to the input's directory)
    #[clap(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Python style indices into the sorted image list (e.g. 0:10)
    #[clap(short, long, allow_hyphen_values = true)]
    indices: Option<IndexSlice>,

    /// Path to the face detection model (ONNX)
    #[clap(long, alias = "dm", value_name = "PATH", default_value = "weights/WIDERFace_DSFD_RES152.onnx")]
    detection_model: PathBuf,

    /// Download the model from this URL when the model file is missing
    #[clap(long, value_name = "URL")]
    model_url: Option<String>,

    /// Face detector to use
    #[clap(long, default_value = "dsfd")]
    detector: String,

    /// Input image postfix
    #[clap(short, long, default_value = ".jpg")]
    postfix: String,

    /// Output file postfix
    #[clap(long, alias = "op", default_value = "_dsfd.json")]
    out_postfix: String,

    /// Image padding relative to image size
    #[clap(long, alias = "ip", value_name = "F")]
    image_padding: Option<f64>,

    /// Write a rendering of the detections next to each cache file
    #[clap(short, long)]
    display: bool,

    /// TOML file with detection thresholds
    #[clap(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Candidate confidence threshold (overrides the config file)
    #[clap(long)]
    conf_thresh: Option<f32>,

    /// Final score threshold (overrides the config file)
    #[clap(long)]
    score_thresh: Option<f32>,

    /// Number of images decoded in parallel ahead of inference
    #[clap(short, long, default_value = "4")]
    batch_size: usize,

    /// Inference threads
    #[clap(short, long, default_value = "4")]
    threads: usize,
}

/// Main program logic
fn run(args: Args) -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match &args.config {
        Some(path) => DetectionConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => DetectionConfig::default(),
    };
    let config = config.with_overrides(args.conf_thresh, args.score_thresh)?;

    let inputs = enumerate_inputs(&args.input, &args.postfix, args.output.as_deref())?;
    let paths = match &args.indices {
        Some(slice) => slice.apply(&inputs.paths)?,
        None => inputs.paths,
    };

    info!("Found {} images", paths.len());
    if paths.is_empty() {
        warn!("No images matching \"*{}\" in {:?}", args.postfix, args.input);
        return Ok(());
    }

    // Initialize face detector
    info!("Initializing face detector: {}", args.detector);
    let model = ModelOptions {
        model_path: args.detection_model,
        model_url: args.model_url,
        threads: args.threads,
    };
    let mut detector = create_detector(&args.detector, &model)
        .context("Failed to initialize face detector")?;

    let options = RunOptions {
        out_dir: inputs.out_dir,
        out_postfix: args.out_postfix,
        image_padding: args.image_padding,
        display: args.display,
        batch_size: args.batch_size,
        config,
    };
    let summary = runner::run(detector.as_mut(), &paths, &options)?;

    info!(
        "Finished. {} processed, {} skipped, {} failed, {} faces cached",
        summary.processed, summary.skipped, summary.failed, summary.faces
    );

    if summary.failed > 0 {
        bail!("{} of {} images failed", summary.failed, summary.total);
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    run(args)
}
