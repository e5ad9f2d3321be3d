//! Color-range segmentation of a frame into a binary mask.

use std::time::{Duration, Instant};

use image::{GrayImage, Luma};
use imageproc::morphology::{Mask as StructuringElement, grayscale_open};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::hsv::{Frame, HsvConverter, HsvFrame};

/// Largest supported morphology kernel edge.
pub const MAX_KERNEL_SIZE: u32 = 31;

/// Default morphology kernel edge.
pub const DEFAULT_KERNEL_SIZE: u32 = 3;

/// Inclusive per-channel HSV bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl Default for ColorRange {
    /// A yellowish-beige band suited to raw dough.
    fn default() -> Self {
        Self {
            lower: [20, 50, 50],
            upper: [40, 255, 255],
        }
    }
}

impl ColorRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Returns true if every channel of `hsv` lies within its bounds.
    ///
    /// Stops at the first channel that falls outside.
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }

    /// Rejects ranges whose lower bound exceeds the upper bound on any channel.
    pub fn validate(&self) -> ConfigResult<()> {
        for channel in 0..3 {
            if self.lower[channel] > self.upper[channel] {
                return Err(ConfigError::InvalidColorRange {
                    channel,
                    lower: self.lower[channel],
                    upper: self.upper[channel],
                });
            }
        }
        Ok(())
    }
}

/// Builds a filled ellipse inscribed in a `size` x `size` square.
///
/// Row `dy` spans `round(sqrt(r² - dy²))` pixels either side of the center,
/// which gives the familiar cross for size 3 and a rounded block for size 5.
pub fn elliptical_element(size: u32) -> GrayImage {
    let radius = (size / 2) as i64;
    let mut image = GrayImage::new(size, size);
    for row in 0..size {
        let dy = row as i64 - radius;
        let half_span = ((radius * radius - dy * dy) as f64).sqrt().round() as i64;
        let first = (radius - half_span).max(0);
        let last = (radius + half_span).min(size as i64 - 1);
        for col in first..=last {
            image.put_pixel(col as u32, row, Luma([255]));
        }
    }
    image
}

/// Turns frames into binary masks using an HSV color range followed by a
/// single morphological opening.
///
/// The HSV buffer is kept between calls and only reallocated when the frame
/// size changes.
pub struct ColorSegmenter {
    converter: HsvConverter,
    range: ColorRange,
    hsv_buffer: HsvFrame,
    kernel_size: u32,
    element: StructuringElement,
    preprocessing: bool,
    last_processing_time: Duration,
}

impl std::fmt::Debug for ColorSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorSegmenter")
            .field("converter", &self.converter)
            .field("range", &self.range)
            .field("kernel_size", &self.kernel_size)
            .field("preprocessing", &self.preprocessing)
            .field("last_processing_time", &self.last_processing_time)
            .finish_non_exhaustive()
    }
}

impl Default for ColorSegmenter {
    fn default() -> Self {
        Self::new(HsvConverter::detect())
    }
}

impl ColorSegmenter {
    pub fn new(converter: HsvConverter) -> Self {
        Self {
            converter,
            range: ColorRange::default(),
            hsv_buffer: HsvFrame::new(0, 0),
            kernel_size: DEFAULT_KERNEL_SIZE,
            element: Self::build_element(DEFAULT_KERNEL_SIZE),
            preprocessing: true,
            last_processing_time: Duration::ZERO,
        }
    }

    fn build_element(size: u32) -> StructuringElement {
        let radius = (size / 2) as u8;
        StructuringElement::from_image(&elliptical_element(size), radius, radius)
    }

    /// Replaces the color range used by subsequent [`segment`](Self::segment) calls.
    pub fn set_color_range(&mut self, range: ColorRange) {
        self.range = range;
    }

    pub fn color_range(&self) -> ColorRange {
        self.range
    }

    /// Sets the morphology kernel edge length.
    ///
    /// Even sizes are bumped to the next odd size. Returns the size in effect.
    pub fn set_morph_kernel_size(&mut self, size: u32) -> ConfigResult<u32> {
        if size == 0 || size > MAX_KERNEL_SIZE {
            return Err(ConfigError::InvalidKernelSize {
                size,
                max: MAX_KERNEL_SIZE,
            });
        }
        let size = if size % 2 == 0 { size + 1 } else { size };
        if size != self.kernel_size {
            self.kernel_size = size;
            self.element = Self::build_element(size);
        }
        Ok(size)
    }

    pub fn morph_kernel_size(&self) -> u32 {
        self.kernel_size
    }

    /// Enables or disables the morphological opening after thresholding.
    pub fn set_preprocessing(&mut self, enabled: bool) {
        self.preprocessing = enabled;
    }

    pub fn preprocessing(&self) -> bool {
        self.preprocessing
    }

    /// HSV conversion of the most recent frame.
    pub fn hsv_frame(&self) -> &HsvFrame {
        &self.hsv_buffer
    }

    pub fn converter(&self) -> &HsvConverter {
        &self.converter
    }

    /// Wall-clock duration of the most recent [`segment`](Self::segment) call.
    pub fn last_processing_time(&self) -> Duration {
        self.last_processing_time
    }

    /// Segments `frame` into `mask`.
    ///
    /// `mask` is reallocated only when its size differs from the frame. An
    /// empty frame leaves an empty mask.
    pub fn segment(&mut self, frame: &Frame, mask: &mut GrayImage) {
        let start = Instant::now();

        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            *mask = GrayImage::new(0, 0);
            self.clear_hsv_frame();
            self.last_processing_time = start.elapsed();
            return;
        }

        self.converter.convert_into(frame, &mut self.hsv_buffer);

        if mask.dimensions() != (width, height) {
            *mask = GrayImage::new(width, height);
        }
        threshold_into(&self.range, &self.hsv_buffer, mask);

        if self.preprocessing {
            self.clean_mask(mask);
        }

        self.last_processing_time = start.elapsed();
    }

    /// Removes speckle noise with one opening pass, writing the result back
    /// into `mask`'s own buffer.
    ///
    /// Opening is idempotent, so applying this twice leaves the mask unchanged.
    pub fn clean_mask(&self, mask: &mut GrayImage) {
        if mask.width() == 0 || mask.height() == 0 {
            return;
        }
        let opened = grayscale_open(mask, &self.element);
        let data: &mut [u8] = &mut **mask;
        data.copy_from_slice(opened.as_raw());
    }

    /// Drops the retained HSV frame, e.g. after a frame was rejected.
    pub fn clear_hsv_frame(&mut self) {
        self.hsv_buffer = HsvFrame::new(0, 0);
    }
}

/// Writes 255 for every pixel of `hsv` inside `range`, 0 otherwise.
pub fn threshold_into(range: &ColorRange, hsv: &HsvFrame, mask: &mut GrayImage) {
    debug_assert_eq!(hsv.dimensions(), mask.dimensions());
    let out: &mut [u8] = &mut **mask;
    for (px, value) in hsv.as_raw().chunks_exact(3).zip(out.iter_mut()) {
        *value = if range.contains([px[0], px[1], px[2]]) {
            255
        } else {
            0
        };
    }
}
