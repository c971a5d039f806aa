use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::anchor::ImageSize;
use crate::detection::domain::detection::DetectionSet;
use crate::detection::domain::inference_provider::InferenceProvider;
use crate::detection::domain::post_processor::DetectionPostProcessor;
use crate::rendering::domain::frame_annotator::FrameAnnotator;
use crate::video::domain::frame_source::FrameSource;
use crate::video::domain::image_writer::ImageWriter;

use super::pipeline_logger::{PipelineLogger, DETECTIONS, FORWARD_PASS, MISC};

/// Called after every frame with the 1-based frame number and its
/// detections. Returning `false` stops the run before the next frame.
pub type FrameCallback = Box<dyn Fn(usize, &DetectionSet) -> bool + Send>;

/// Where annotated frames are saved, as `<folder>/<n>.jpg`.
pub struct FrameOutput {
    pub writer: Box<dyn ImageWriter>,
    pub folder: PathBuf,
}

/// Live detection loop: capture → resize → infer → post-process → annotate
/// → save, one frame at a time.
pub struct CameraDetectionUseCase {
    source: Box<dyn FrameSource>,
    provider: Box<dyn InferenceProvider>,
    post_processor: DetectionPostProcessor,
    annotator: Option<Box<dyn FrameAnnotator>>,
    output: Option<FrameOutput>,
    logger: Box<dyn PipelineLogger>,
    max_frames: Option<usize>,
    on_frame: Option<FrameCallback>,
    cancelled: Arc<AtomicBool>,
}

impl CameraDetectionUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        provider: Box<dyn InferenceProvider>,
        post_processor: DetectionPostProcessor,
        annotator: Option<Box<dyn FrameAnnotator>>,
        output: Option<FrameOutput>,
        logger: Box<dyn PipelineLogger>,
        max_frames: Option<usize>,
        on_frame: Option<FrameCallback>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            source,
            provider,
            post_processor,
            annotator,
            output,
            logger,
            max_frames,
            on_frame,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    /// Opens `location` and runs until the stream ends or a stop is
    /// requested. Returns the number of frames processed.
    ///
    /// A source that cannot be opened is an error and no frame is read.
    pub fn execute(&mut self, location: &str) -> Result<usize, Box<dyn std::error::Error>> {
        let metadata = self.source.open(location)?;
        self.logger.info(&format!(
            "Capturing {}x{} from {location}{}",
            metadata.width,
            metadata.height,
            if metadata.is_live() { " (live)" } else { "" }
        ));

        let result = self.run(metadata.total_frames);
        self.source.close();
        self.logger.summary();
        result
    }

    fn run(&mut self, total: Option<usize>) -> Result<usize, Box<dyn std::error::Error>> {
        let resize = self.post_processor.config().resize;
        let mut processed = 0usize;

        for frame in self.source.frames() {
            if self.cancelled.load(Ordering::Relaxed)
                || self.max_frames.is_some_and(|max| processed >= max)
            {
                break;
            }
            let mut frame = frame?;
            let number = processed + 1;

            let input = frame.resized(resize);

            let t0 = Instant::now();
            let raw = self.provider.infer(&input)?;
            self.logger
                .timing(FORWARD_PASS, t0.elapsed().as_secs_f64() * 1000.0);

            let t1 = Instant::now();
            let detections = self
                .post_processor
                .process(&raw, ImageSize::new(input.height(), input.width()));
            self.logger.timing(MISC, t1.elapsed().as_secs_f64() * 1000.0);
            self.logger.metric(DETECTIONS, detections.len() as f64);

            // Boxes are already in the captured frame's pixel space.
            if let Some(annotator) = &self.annotator {
                annotator.annotate(&mut frame, &detections)?;
            }
            if let Some(output) = &self.output {
                output
                    .writer
                    .write(&output.folder.join(format!("{number}.jpg")), &frame)?;
            }

            processed = number;
            self.logger.progress(processed, total);

            if let Some(callback) = &self.on_frame {
                if !callback(processed, &detections) {
                    log::debug!("Stopped by caller after frame {processed}");
                    break;
                }
            }
        }

        Ok(processed)
    }
}
