use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};

/// Convert image to grayscale with BT.601 luma weights (0.299, 0.587, 0.114).
///
/// `DynamicImage::to_luma8` uses Rec. 709 weights, which shifts coloured
/// pixels near the threshold. Alpha is ignored.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        Luma([luma as u8])
    })
}

/// Binarize with a fixed global threshold: pixels above `level` become 255, the rest 0
pub fn binarize(img: &GrayImage, level: u8) -> GrayImage {
    threshold(img, level, ThresholdType::Binary)
}
