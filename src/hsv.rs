//! Blue-green-red to hue-saturation-value conversion.
//!
//! Output channels use the 8-bit convention common to machine-vision tooling:
//! hue is halved into `0..180`, saturation and value span `0..=255`.
//!
//! Two interchangeable kernels implement [`HsvKernel`]. [`ScalarKernel`] is the
//! reference; the AVX2 kernel (x86_64 only, selected by a runtime CPU probe)
//! evaluates the same `f32` expressions in the same order across eight lanes, so
//! both produce bit-identical bytes.

use image::RgbImage;
use tracing::info;

/// A camera frame. Each pixel holds three bytes in blue, green, red order.
pub type Frame = RgbImage;

/// A converted frame. Each pixel holds hue, saturation, value bytes.
pub type HsvFrame = RgbImage;

/// A strategy that converts packed BGR bytes into packed HSV bytes.
pub trait HsvKernel: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Pixels processed per vector step. Scalar kernels report 1.
    fn lane_width(&self) -> usize;

    /// Converts `bgr` into `hsv`.
    ///
    /// Both slices hold the same number of whole pixels, and that number is a
    /// multiple of [`lane_width`](Self::lane_width).
    fn convert_pixels(&self, bgr: &[u8], hsv: &mut [u8]);
}

/// Converts a single pixel. This is the reference every kernel must match.
///
/// # Examples
///
/// ```
/// use dough_inspect::hsv::bgr_to_hsv;
///
/// // Pure blue.
/// assert_eq!(bgr_to_hsv(255, 0, 0), [120, 255, 255]);
/// // Mid grey has no hue and no saturation.
/// assert_eq!(bgr_to_hsv(128, 128, 128), [0, 0, 128]);
/// ```
#[inline]
pub fn bgr_to_hsv(b: u8, g: u8, r: u8) -> [u8; 3] {
    let (b, g, r) = (f32::from(b), f32::from(g), f32::from(r));

    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { delta / v * 255.0 } else { 0.0 };

    let mut h = 0.0;
    if delta > 0.0 {
        h = if v == r {
            60.0 * (g - b) / delta
        } else if v == g {
            60.0 * (2.0 + (b - r) / delta)
        } else {
            60.0 * (4.0 + (r - g) / delta)
        };
        if h < 0.0 {
            h += 360.0;
        }
    }

    [(h * 0.5) as u8, s as u8, v as u8]
}

/// Pixel-at-a-time reference kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarKernel;

impl HsvKernel for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn lane_width(&self) -> usize {
        1
    }

    fn convert_pixels(&self, bgr: &[u8], hsv: &mut [u8]) {
        for (src, dst) in bgr.chunks_exact(3).zip(hsv.chunks_exact_mut(3)) {
            dst.copy_from_slice(&bgr_to_hsv(src[0], src[1], src[2]));
        }
    }
}

/// Eight-lane AVX2 kernel. Only constructible on CPUs that support AVX2.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct Avx2Kernel {
    _probed: (),
}

#[cfg(target_arch = "x86_64")]
impl Avx2Kernel {
    /// Returns the kernel if the running CPU supports AVX2.
    pub fn detect() -> Option<Self> {
        if std::arch::is_x86_feature_detected!("avx2") {
            Some(Self { _probed: () })
        } else {
            None
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl HsvKernel for Avx2Kernel {
    fn name(&self) -> &'static str {
        "avx2"
    }

    fn lane_width(&self) -> usize {
        avx2::LANES
    }

    fn convert_pixels(&self, bgr: &[u8], hsv: &mut [u8]) {
        // SAFETY: an `Avx2Kernel` only exists after the runtime probe succeeded.
        unsafe { avx2::convert(bgr, hsv) }
    }
}

#[cfg(target_arch = "x86_64")]
mod avx2 {
    use std::arch::x86_64::*;

    pub(super) const LANES: usize = 8;

    /// Converts whole groups of eight pixels.
    ///
    /// # Safety
    ///
    /// The caller must have verified that the CPU supports AVX2.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn convert(bgr: &[u8], hsv: &mut [u8]) {
        debug_assert_eq!(bgr.len(), hsv.len());
        debug_assert_eq!(bgr.len() % (LANES * 3), 0);

        let mut blue = [0f32; LANES];
        let mut green = [0f32; LANES];
        let mut red = [0f32; LANES];
        let mut hue_out = [0i32; LANES];
        let mut sat_out = [0i32; LANES];
        let mut val_out = [0i32; LANES];

        for (src, dst) in bgr
            .chunks_exact(LANES * 3)
            .zip(hsv.chunks_exact_mut(LANES * 3))
        {
            for (lane, px) in src.chunks_exact(3).enumerate() {
                blue[lane] = f32::from(px[0]);
                green[lane] = f32::from(px[1]);
                red[lane] = f32::from(px[2]);
            }

            unsafe {
                let b = _mm256_loadu_ps(blue.as_ptr());
                let g = _mm256_loadu_ps(green.as_ptr());
                let r = _mm256_loadu_ps(red.as_ptr());

                let zero = _mm256_setzero_ps();
                let sixty = _mm256_set1_ps(60.0);

                let v = _mm256_max_ps(_mm256_max_ps(r, g), b);
                let min = _mm256_min_ps(_mm256_min_ps(r, g), b);
                let delta = _mm256_sub_ps(v, min);

                // Lanes with v == 0 divide 0 by 0; the mask clears the NaN.
                let s = _mm256_mul_ps(_mm256_div_ps(delta, v), _mm256_set1_ps(255.0));
                let s = _mm256_and_ps(s, _mm256_cmp_ps::<_CMP_GT_OQ>(v, zero));

                let h_red = _mm256_div_ps(_mm256_mul_ps(sixty, _mm256_sub_ps(g, b)), delta);
                let h_green = _mm256_mul_ps(
                    sixty,
                    _mm256_add_ps(_mm256_set1_ps(2.0), _mm256_div_ps(_mm256_sub_ps(b, r), delta)),
                );
                let h_blue = _mm256_mul_ps(
                    sixty,
                    _mm256_add_ps(_mm256_set1_ps(4.0), _mm256_div_ps(_mm256_sub_ps(r, g), delta)),
                );

                // Red wins ties, then green.
                let h = _mm256_blendv_ps(h_blue, h_green, _mm256_cmp_ps::<_CMP_EQ_OQ>(v, g));
                let h = _mm256_blendv_ps(h, h_red, _mm256_cmp_ps::<_CMP_EQ_OQ>(v, r));
                let wrap = _mm256_and_ps(
                    _mm256_cmp_ps::<_CMP_LT_OQ>(h, zero),
                    _mm256_set1_ps(360.0),
                );
                let h = _mm256_add_ps(h, wrap);
                let h = _mm256_and_ps(h, _mm256_cmp_ps::<_CMP_GT_OQ>(delta, zero));

                let h = _mm256_cvttps_epi32(_mm256_mul_ps(h, _mm256_set1_ps(0.5)));
                let s = _mm256_cvttps_epi32(s);
                let v = _mm256_cvttps_epi32(v);

                _mm256_storeu_si256(hue_out.as_mut_ptr().cast::<__m256i>(), h);
                _mm256_storeu_si256(sat_out.as_mut_ptr().cast::<__m256i>(), s);
                _mm256_storeu_si256(val_out.as_mut_ptr().cast::<__m256i>(), v);
            }

            for (lane, px) in dst.chunks_exact_mut(3).enumerate() {
                px[0] = hue_out[lane] as u8;
                px[1] = sat_out[lane] as u8;
                px[2] = val_out[lane] as u8;
            }
        }
    }
}

/// Frame-level converter that runs a kernel over the bulk of the pixels and
/// finishes any remainder with the scalar reference.
pub struct HsvConverter {
    kernel: Box<dyn HsvKernel>,
}

impl HsvConverter {
    /// Probes the CPU once and picks the fastest available kernel.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        if let Some(kernel) = Avx2Kernel::detect() {
            info!(kernel = kernel.name(), "selected HSV conversion kernel");
            return Self::with_kernel(Box::new(kernel));
        }

        info!(kernel = "scalar", "selected HSV conversion kernel");
        Self::scalar()
    }

    /// A converter that never uses vector instructions.
    pub fn scalar() -> Self {
        Self::with_kernel(Box::new(ScalarKernel))
    }

    pub fn with_kernel(kernel: Box<dyn HsvKernel>) -> Self {
        Self { kernel }
    }

    /// Name of the kernel used for the bulk path.
    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Converts `frame` into a freshly allocated HSV frame.
    pub fn convert(&self, frame: &Frame) -> HsvFrame {
        let mut hsv = HsvFrame::new(0, 0);
        self.convert_into(frame, &mut hsv);
        hsv
    }

    /// Converts `frame` into `hsv`, reallocating `hsv` only when the
    /// dimensions differ.
    pub fn convert_into(&self, frame: &Frame, hsv: &mut HsvFrame) {
        let (width, height) = frame.dimensions();
        if hsv.dimensions() != (width, height) {
            *hsv = HsvFrame::new(width, height);
        }

        let src: &[u8] = frame.as_raw();
        let dst: &mut [u8] = &mut **hsv;

        let pixels = src.len() / 3;
        let lanes = self.kernel.lane_width().max(1);
        let bulk = if pixels >= lanes {
            pixels / lanes * lanes
        } else {
            0
        };

        let (src_bulk, src_tail) = src.split_at(bulk * 3);
        let (dst_bulk, dst_tail) = dst.split_at_mut(bulk * 3);
        if bulk > 0 {
            self.kernel.convert_pixels(src_bulk, dst_bulk);
        }
        ScalarKernel.convert_pixels(src_tail, dst_tail);
    }
}

impl Default for HsvConverter {
    fn default() -> Self {
        Self::detect()
    }
}

impl std::fmt::Debug for HsvConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HsvConverter")
            .field("kernel", &self.kernel.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    /// Every BGR byte triple on a coarse lattice plus the extremes.
    #[cfg(target_arch = "x86_64")]
    fn lattice_bytes() -> Vec<u8> {
        let steps: Vec<u8> = (0..=255u8).step_by(17).chain([1, 2, 127, 128, 254]).collect();
        let mut bytes = Vec::new();
        for &b in &steps {
            for &g in &steps {
                for &r in &steps {
                    bytes.extend_from_slice(&[b, g, r]);
                }
            }
        }
        bytes
    }

    #[test]
    fn reference_primaries() {
        assert_eq!(bgr_to_hsv(0, 0, 255), [0, 255, 255]);
        assert_eq!(bgr_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(bgr_to_hsv(255, 0, 0), [120, 255, 255]);
        assert_eq!(bgr_to_hsv(0, 255, 255), [30, 255, 255]);
        assert_eq!(bgr_to_hsv(255, 0, 255), [150, 255, 255]);
        assert_eq!(bgr_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(bgr_to_hsv(255, 255, 255), [0, 0, 255]);
    }

    #[test]
    fn reference_dough_tone() {
        // A warm beige: r=230, g=200, b=120.
        // h = 60 * (200 - 120) / 110 = 43.6 -> 21, s = 110 / 230 * 255 = 121.9 -> 121.
        assert_eq!(bgr_to_hsv(120, 200, 230), [21, 121, 230]);
    }

    #[test]
    fn hue_wraps_negative_sector() {
        // Red is the maximum and blue exceeds green, so the raw hue is negative.
        let [h, _, _] = bgr_to_hsv(10, 0, 255);
        assert!(h > 170 && h < 180, "hue {h} should wrap near the top of the range");
    }

    #[test]
    fn empty_frame_yields_empty_output() {
        let converter = HsvConverter::detect();
        let hsv = converter.convert(&Frame::new(0, 0));
        assert_eq!(hsv.dimensions(), (0, 0));
    }

    #[test]
    fn convert_reuses_matching_buffer() {
        let converter = HsvConverter::scalar();
        let frame = Frame::from_pixel(4, 3, Rgb([255, 0, 0]));
        let mut hsv = HsvFrame::new(4, 3);
        let ptr = hsv.as_raw().as_ptr();
        converter.convert_into(&frame, &mut hsv);
        assert_eq!(hsv.as_raw().as_ptr(), ptr);
        assert!(hsv.pixels().all(|p| p.0 == [120, 255, 255]));
    }

    #[test]
    fn detected_kernel_matches_scalar_with_remainder() {
        // 13 x 7 = 91 pixels, not a multiple of eight.
        let mut frame = Frame::new(13, 7);
        for (i, px) in frame.pixels_mut().enumerate() {
            let i = i as u32;
            *px = Rgb([(i * 37 % 256) as u8, (i * 91 % 256) as u8, (i * 53 % 256) as u8]);
        }
        let fast = HsvConverter::detect().convert(&frame);
        let reference = HsvConverter::scalar().convert(&frame);
        assert_eq!(fast.as_raw(), reference.as_raw());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn avx2_kernel_is_bit_identical_on_lattice() {
        let Some(kernel) = Avx2Kernel::detect() else {
            return;
        };
        let mut bgr = lattice_bytes();
        let whole = bgr.len() / 3 / avx2::LANES * avx2::LANES;
        bgr.truncate(whole * 3);

        let mut fast = vec![0u8; bgr.len()];
        let mut reference = vec![0u8; bgr.len()];
        kernel.convert_pixels(&bgr, &mut fast);
        ScalarKernel.convert_pixels(&bgr, &mut reference);
        assert_eq!(fast, reference);
    }

    proptest! {
        #[test]
        fn detected_converter_matches_reference(
            bytes in prop::collection::vec(any::<u8>(), 0..600),
        ) {
            let pixels = bytes.len() / 3;
            let Some(frame) = Frame::from_raw(pixels as u32, 1, bytes[..pixels * 3].to_vec()) else {
                return Ok(());
            };
            let fast = HsvConverter::detect().convert(&frame);
            for (src, dst) in frame.pixels().zip(fast.pixels()) {
                prop_assert_eq!(dst.0, bgr_to_hsv(src.0[0], src.0[1], src.0[2]));
            }
        }
    }
}
