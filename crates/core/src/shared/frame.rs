use ndarray::ArrayView3;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Capture and file adapters convert to RGB at the I/O boundary; everything
/// downstream (preprocessing, annotation, saving) assumes three channels.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Zero-based position of the frame in its stream.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `(height, width, channel)` view over the pixel buffer.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                Self::CHANNELS,
            ),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Returns a bilinearly rescaled copy, or a plain clone when `factor == 1`.
    ///
    /// Dimensions are rounded to the nearest pixel and never drop below 1.
    pub fn resized(&self, factor: f32) -> Frame {
        if (factor - 1.0).abs() < f32::EPSILON {
            return self.clone();
        }
        let new_w = ((self.width as f32 * factor).round() as u32).max(1);
        let new_h = ((self.height as f32 * factor).round() as u32).max(1);

        let Some(img) = image::RgbImage::from_raw(self.width, self.height, self.data.clone())
        else {
            return self.clone();
        };
        let resized =
            image::imageops::resize(&img, new_w, new_h, image::imageops::FilterType::Triangle);
        Frame::new(resized.into_raw(), new_w, new_h, self.index)
    }
}
