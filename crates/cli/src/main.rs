use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::{Args, Parser, Subcommand};

use faceboxes_core::dataset::image_list::create_image_list;
use faceboxes_core::detection::domain::anchor::AnchorConfig;
use faceboxes_core::detection::domain::detection_config::{
    DetectionConfig, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FACEBOX_THRESHOLD,
    DEFAULT_KEEP_TOP_K, DEFAULT_NMS_THRESHOLD, DEFAULT_RESIZE, DEFAULT_TOP_K,
};
use faceboxes_core::detection::domain::inference_provider::InferenceProvider;
use faceboxes_core::detection::domain::post_processor::DetectionPostProcessor;
use faceboxes_core::detection::infrastructure::model_resolver::{self, ModelSource};
use faceboxes_core::detection::infrastructure::onnx_faceboxes_provider::OnnxFaceBoxesProvider;
use faceboxes_core::pipeline::camera_detection_use_case::{
    CameraDetectionUseCase, FrameCallback, FrameOutput,
};
use faceboxes_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use faceboxes_core::rendering::infrastructure::box_annotator::BoxAnnotator;
use faceboxes_core::shared::constants::{
    DEFAULT_CAMERA, DEFAULT_DATA_ROOT, DEFAULT_SAVE_FOLDER, MODEL_NAME,
};
use faceboxes_core::video::domain::frame_source::FrameSource;
use faceboxes_core::video::infrastructure::ffmpeg_camera_reader::FfmpegCameraReader;
use faceboxes_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// FaceBoxes face detection on a live camera feed.
#[derive(Parser)]
#[command(name = "faceboxes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect faces on every frame captured from a camera or stream.
    Camera(CameraArgs),
    /// Write <data-root>/<dataset>/img_list.txt from the dataset's images/ folder.
    ImageList(ImageListArgs),
}

#[derive(Args)]
struct CameraArgs {
    /// Camera device, video file or stream URL.
    #[arg(long, default_value = DEFAULT_CAMERA)]
    source: String,

    /// Explicit FaceBoxes ONNX model; skips the model cache.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model file name inside the cache directory.
    #[arg(long, default_value = MODEL_NAME)]
    model_name: String,

    /// Download URL used when the model is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Save annotated frames as <save-folder>/<n>.jpg.
    #[arg(long)]
    save_result: bool,

    /// Directory for saved frames.
    #[arg(long, default_value = DEFAULT_SAVE_FOLDER)]
    save_folder: PathBuf,

    /// Scale factor applied to frames before inference.
    #[arg(long, default_value_t = DEFAULT_RESIZE)]
    resize: f32,

    /// Minimum face score for a candidate box (exclusive).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    confidence_threshold: f32,

    /// Candidates kept before NMS.
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// IoU above which a lower-scored box is suppressed.
    #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD)]
    nms_threshold: f32,

    /// Detections kept after NMS.
    #[arg(long, default_value_t = DEFAULT_KEEP_TOP_K)]
    keep_top_k: usize,

    /// Minimum score for a box to be drawn (inclusive).
    #[arg(long, default_value_t = DEFAULT_FACEBOX_THRESHOLD)]
    facebox_threshold: f32,

    /// JSON anchor table replacing the FaceBoxes default.
    #[arg(long)]
    anchor_config: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,
}

#[derive(Args)]
struct ImageListArgs {
    /// Dataset directory name, e.g. FDDB or PASCAL.
    dataset: String,

    /// Directory holding the datasets.
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    data_root: PathBuf,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Camera(args) => run_camera(args),
        Command::ImageList(args) => {
            let list = create_image_list(&args.data_root, &args.dataset)?;
            log::info!("Image list written to {}", list.display());
            Ok(())
        }
    }
}

fn run_camera(args: CameraArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;

    let source = ModelSource {
        path: args.model.clone(),
        name: args.model_name.clone(),
        url: args.model_url.clone(),
    };
    log::info!("Resolving model: {}", source.name);
    let model_path = model_resolver::resolve(&source, Some(Box::new(download_progress)))?;
    let provider = OnnxFaceBoxesProvider::new(&model_path, config.anchors.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    spawn_quit_listener(std::io::BufReader::new(std::io::stdin()), stop.clone());
    log::info!("Type q and press Enter to stop");

    let mut use_case = build_use_case(
        &args,
        config,
        Box::new(FfmpegCameraReader::new()),
        Box::new(provider),
        stop,
    );
    let frames = use_case.execute(&args.source)?;
    log::info!("Processed {frames} frames from {}", args.source);
    Ok(())
}

/// Wires the camera loop; `stop` ends it at the next frame boundary.
fn build_use_case(
    args: &CameraArgs,
    config: DetectionConfig,
    source: Box<dyn FrameSource>,
    provider: Box<dyn InferenceProvider>,
    stop: Arc<AtomicBool>,
) -> CameraDetectionUseCase {
    let output = args.save_result.then(|| FrameOutput {
        writer: Box::new(ImageFileWriter::new()),
        folder: args.save_folder.clone(),
    });
    let on_frame: FrameCallback = Box::new(|number, detections| {
        log::debug!("Frame {number}: {} detections", detections.len());
        true
    });

    CameraDetectionUseCase::new(
        source,
        provider,
        DetectionPostProcessor::new(config.clone()),
        Some(Box::new(BoxAnnotator::new(config.facebox_threshold))),
        output,
        Box::new(StdoutPipelineLogger::default()),
        args.max_frames,
        Some(on_frame),
        Some(stop),
    )
}

/// Collects the flags into a validated [`DetectionConfig`].
fn build_config(args: &CameraArgs) -> Result<DetectionConfig, Box<dyn std::error::Error>> {
    let anchors = match &args.anchor_config {
        Some(path) => AnchorConfig::load(path)?,
        None => AnchorConfig::default(),
    };
    let config = DetectionConfig {
        confidence_threshold: args.confidence_threshold,
        top_k: args.top_k,
        nms_threshold: args.nms_threshold,
        keep_top_k: args.keep_top_k,
        facebox_threshold: args.facebox_threshold,
        resize: args.resize,
        anchors,
    };
    config.validate()?;
    Ok(config)
}

/// Sets `stop` once a line reading `q` arrives on `input`.
///
/// The camera loop checks the flag between frames, so the run ends cleanly
/// with the source closed and the summary logged.
fn spawn_quit_listener<R>(input: R, stop: Arc<AtomicBool>) -> thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().eq_ignore_ascii_case("q") {
                stop.store(true, Ordering::Relaxed);
                break;
            }
        }
    })
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading FaceBoxes model... {pct}%");
    } else {
        eprint!("\rDownloading FaceBoxes model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceboxes_core::detection::domain::anchor::ImageSize;
    use faceboxes_core::detection::domain::inference_provider::InferenceOutput;
    use faceboxes_core::shared::frame::Frame;
    use faceboxes_core::shared::stream_metadata::StreamMetadata;
    use std::io::Cursor;

    fn camera_args(extra: &[&str]) -> CameraArgs {
        let argv = ["faceboxes", "camera"].iter().chain(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Camera(args) => args,
            Command::ImageList(_) => panic!("expected camera subcommand"),
        }
    }

    #[test]
    fn test_defaults_match_detection_config() {
        let args = camera_args(&[]);
        assert_eq!(args.source, "/dev/video0");
        assert!(!args.save_result);
        let config = build_config(&args).unwrap();
        let expected = DetectionConfig::default();
        assert_eq!(config.top_k, expected.top_k);
        assert_eq!(config.keep_top_k, expected.keep_top_k);
        assert_eq!(config.nms_threshold, expected.nms_threshold);
        assert_eq!(config.facebox_threshold, expected.facebox_threshold);
        assert_eq!(config.anchors, AnchorConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let args = camera_args(&["--nms-threshold", "0.5", "--top-k", "100", "--resize", "0.5"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.nms_threshold, 0.5);
        assert_eq!(config.top_k, 100);
        assert_eq!(config.resize, 0.5);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let args = camera_args(&["--nms-threshold", "1.5"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_oversized_resize_is_rejected() {
        let args = camera_args(&["--resize", "1000000000"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_quit_line_sets_stop_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        spawn_quit_listener(Cursor::new("\n  Q \nignored\n"), stop.clone())
            .join()
            .unwrap();
        assert!(stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_other_input_leaves_stop_flag_clear() {
        let stop = Arc::new(AtomicBool::new(false));
        spawn_quit_listener(Cursor::new("quit\nx\n"), stop.clone())
            .join()
            .unwrap();
        assert!(!stop.load(Ordering::Relaxed));
    }

    /// Endless black 64x64 camera.
    struct EndlessSource;

    impl FrameSource for EndlessSource {
        fn open(&mut self, source: &str) -> Result<StreamMetadata, Box<dyn std::error::Error>> {
            Ok(StreamMetadata {
                width: 64,
                height: 64,
                fps: 30.0,
                total_frames: None,
                codec: String::new(),
                source: source.to_string(),
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            Box::new((0..).map(|i| Ok(Frame::new(vec![0; 64 * 64 * 3], 64, 64, i))))
        }

        fn close(&mut self) {}
    }

    struct NoFaces(AnchorConfig);

    impl InferenceProvider for NoFaces {
        fn infer(&mut self, image: &Frame) -> Result<InferenceOutput, Box<dyn std::error::Error>> {
            let feature_maps = self
                .0
                .feature_maps_for(ImageSize::new(image.height(), image.width()));
            let n = self.0.anchor_count(&feature_maps);
            Ok(InferenceOutput {
                loc: vec![[0.0; 4]; n],
                conf: vec![[1.0, 0.0]; n],
                feature_maps,
            })
        }
    }

    #[test]
    fn test_quit_line_stops_camera_run() {
        let args = camera_args(&[]);
        let config = build_config(&args).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        spawn_quit_listener(Cursor::new("q\n"), stop.clone())
            .join()
            .unwrap();

        let mut use_case = build_use_case(
            &args,
            config.clone(),
            Box::new(EndlessSource),
            Box::new(NoFaces(config.anchors)),
            stop,
        );
        assert_eq!(use_case.execute("/dev/video0").unwrap(), 0);
    }

    #[test]
    fn test_camera_runs_until_max_frames_without_quit() {
        let args = camera_args(&["--max-frames", "2"]);
        let config = build_config(&args).unwrap();

        let mut use_case = build_use_case(
            &args,
            config.clone(),
            Box::new(EndlessSource),
            Box::new(NoFaces(config.anchors)),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(use_case.execute("/dev/video0").unwrap(), 2);
    }

    #[test]
    fn test_missing_anchor_config_is_rejected() {
        let args = camera_args(&["--anchor-config", "/nonexistent/anchors.json"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_image_list_subcommand() {
        let cli = Cli::try_parse_from(["faceboxes", "image-list", "FDDB"]).unwrap();
        match cli.command {
            Command::ImageList(args) => {
                assert_eq!(args.dataset, "FDDB");
                assert_eq!(args.data_root, PathBuf::from("data"));
            }
            Command::Camera(_) => panic!("expected image-list subcommand"),
        }
    }
}
