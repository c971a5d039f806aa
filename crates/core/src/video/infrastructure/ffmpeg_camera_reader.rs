use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;
use crate::video::domain::frame_source::FrameSource;

/// Capture resolution requested from camera devices.
pub const DEFAULT_CAPTURE_SIZE: (u32, u32) = (1280, 720);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no video stream or no camera device at {location}: {error}")]
    Open {
        location: String,
        #[source]
        error: ffmpeg_next::Error,
    },
    #[error("no video stream found in {0}")]
    NoVideoStream(String),
    #[error("failed to set up decoder for {location}: {error}")]
    Decoder {
        location: String,
        #[source]
        error: ffmpeg_next::Error,
    },
    #[error("capture source not opened")]
    NotOpened,
}

/// Reads frames from a camera device (e.g. `/dev/video0`), a video file or
/// a stream URL through ffmpeg-next (libavdevice + libavformat).
///
/// Every decoded frame is converted to RGB24 and wrapped in a [`Frame`].
pub struct FfmpegCameraReader {
    capture_size: Option<(u32, u32)>,
    capture: Option<Capture>,
}

struct Capture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    next_index: usize,
}

// Safety: FfmpegCameraReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCameraReader {}

impl FfmpegCameraReader {
    pub fn new() -> Self {
        Self {
            capture_size: Some(DEFAULT_CAPTURE_SIZE),
            capture: None,
        }
    }

    /// Requested device resolution; `None` leaves the device default.
    ///
    /// Ignored by sources without a configurable size (files, most URLs).
    pub fn with_capture_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.capture_size = size;
        self
    }
}

impl Default for FfmpegCameraReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegCameraReader {
    fn open(&mut self, source: &str) -> Result<StreamMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let mut options = ffmpeg_next::Dictionary::new();
        if let Some((w, h)) = self.capture_size {
            options.set("video_size", &format!("{w}x{h}"));
        }

        let ictx = ffmpeg_next::format::input_with_dictionary(source, options).map_err(|e| {
            CaptureError::Open {
                location: source.to_string(),
                error: e,
            }
        })?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::NoVideoStream(source.to_string()))?;
        let stream_index = stream.index();

        let decoder_err = |e: ffmpeg_next::Error| CaptureError::Decoder {
            location: source.to_string(),
            error: e,
        };
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(decoder_err)?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(decoder_err)?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = match stream.frames() {
            n if n > 0 => Some(n as usize),
            _ => None,
        };

        let metadata = StreamMetadata {
            width,
            height,
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source: source.to_string(),
        };

        log::info!("Opened {source}: {width}x{height} @ {fps:.1} fps");

        self.capture = Some(Capture {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            next_index: 0,
        });

        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(capture) = self.capture.as_mut() else {
            let err: Box<dyn std::error::Error> = Box::new(CaptureError::NotOpened);
            return Box::new(std::iter::once(Err(err)));
        };
        Box::new(CaptureFrames {
            capture,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.capture = None;
    }
}

/// Lazily pulls and decodes one frame at a time from the capture.
struct CaptureFrames<'a> {
    capture: &'a mut Capture,
    flushing: bool,
    done: bool,
}

impl CaptureFrames<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let c = &mut *self.capture;
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if c.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = c.scaler.run(&decoded, &mut rgb_frame) {
            return Some(Err(Box::new(e)));
        }

        let pixels = extract_rgb_pixels(&rgb_frame, c.width, c.height);
        let frame = Frame::new(pixels, c.width, c.height, c.next_index);
        c.next_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for CaptureFrames<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.capture.ictx.packets().next() else {
                let _ = self.capture.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.capture.stream_index {
                continue;
            }

            if self.capture.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
