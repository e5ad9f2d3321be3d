use image::Rgb;
use palette::{FromColor, Hsl, Srgb};

/// Overlay color for the region of interest (cyan), in frame byte order.
pub(crate) const ROI_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Overlay color for detections that fail their quality checks (red).
pub(crate) const FAULT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// One overlay color per detection, spread evenly around the hue wheel.
///
/// Camera frames store their bytes blue first, so each color is emitted in
/// that order and can be written into a [`Frame`](crate::hsv::Frame) without
/// swapping channels per pixel.
pub(crate) fn generate_contrasting_colors(n: usize) -> Vec<Rgb<u8>> {
    let mut colors = Vec::with_capacity(n);

    for i in 0..n {
        let hue = (i as f32 * 360.0) / n as f32;

        let saturation = 0.9;
        let lightness = 0.5;

        let hsl_color = Hsl::new(hue, saturation, lightness);
        let srgb_linear = Srgb::from_color(hsl_color);
        let srgb_u8: Srgb<u8> = srgb_linear.into_format();

        colors.push(Rgb([srgb_u8.blue, srgb_u8.green, srgb_u8.red]));
    }

    colors
}
