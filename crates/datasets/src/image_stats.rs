//! Per-image measurements and their aggregation into `ImageStats`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use scoring::ImageStats;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DatasetError, Result};

/// Side length below which an image counts as low resolution.
pub const MIN_RESOLUTION: u32 = 224;
/// Short side at which the resolution score saturates.
const FULL_RESOLUTION: f64 = 640.0;
const LOW_QUALITY_SCORE: f64 = 40.0;
const THUMBNAIL: u32 = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageMeasurement {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub brightness: f64,      // grayscale mean, 0..255
    pub contrast: f64,        // grayscale std dev
    pub sharpness: f64,       // mean Sobel magnitude
    pub color_diversity: f64, // unique colours / pixels on the thumbnail, 0..1
    pub quality_score: f64,
}

impl ImageMeasurement {
    pub fn resolution(&self) -> f64 {
        (self.width as f64 * self.height as f64).sqrt()
    }

    pub fn is_low_resolution(&self) -> bool {
        self.width.min(self.height) < MIN_RESOLUTION
    }

    pub fn is_low_quality(&self) -> bool {
        self.quality_score < LOW_QUALITY_SCORE
    }
}

pub fn measure_image(path: &Path) -> Result<ImageMeasurement> {
    let img = image::open(path).map_err(|e| DatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(measure_dynamic(path, &img))
}

pub fn measure_dynamic(path: &Path, img: &DynamicImage) -> ImageMeasurement {
    let gray = img.to_luma8();
    let (brightness, contrast) = mean_and_std(gray.pixels().map(|p| p.0[0] as f64));
    let sharpness = sobel_mean(&gray);
    let color_diversity = color_diversity(img);

    let quality_score = 0.4 * sharpness.min(100.0)
        + 0.3 * (100.0 - (brightness - 128.0).abs() / 128.0 * 100.0).max(0.0)
        + 0.3 * contrast.min(100.0);

    ImageMeasurement {
        path: path.to_path_buf(),
        width: img.width(),
        height: img.height(),
        brightness,
        contrast,
        sharpness,
        color_diversity,
        quality_score,
    }
}

fn mean_and_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0, 0.0);
    for v in values {
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean, var.sqrt())
}

/// Mean gradient magnitude over interior pixels. Flat or tiny images give 0.
fn sobel_mean(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;
    let mut total = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x, y - 1)
                - px(x + 1, y - 1);
            total += (gx * gx + gy * gy).sqrt();
        }
    }
    total / ((w - 2) as f64 * (h - 2) as f64)
}

fn color_diversity(img: &DynamicImage) -> f64 {
    let thumb = img.resize_exact(THUMBNAIL, THUMBNAIL, FilterType::Triangle).to_rgb8();
    let unique: HashSet<[u8; 3]> = thumb.pixels().map(|p| p.0).collect();
    unique.len() as f64 / (THUMBNAIL * THUMBNAIL) as f64
}

/// Fold measurements into the scorer's input. `corrupted` counts images that
/// failed to decode.
pub fn aggregate(measurements: &[ImageMeasurement], corrupted: usize) -> ImageStats {
    let total = measurements.len() + corrupted;
    if measurements.is_empty() {
        return ImageStats {
            total_images: Some(total as u64),
            corrupted_images_ratio: Some(if total > 0 { 1.0 } else { 0.0 }),
            ..Default::default()
        };
    }

    let n = measurements.len() as f64;
    let avg = |f: fn(&ImageMeasurement) -> f64| measurements.iter().map(f).sum::<f64>() / n;

    let resolution_score =
        avg(|m| (m.width.min(m.height) as f64 / FULL_RESOLUTION * 100.0).min(100.0));
    let (_, quality_std) = mean_and_std(measurements.iter().map(|m| m.quality_score));
    let (average_resolution, resolution_std) =
        mean_and_std(measurements.iter().map(|m| m.resolution()));

    let distinct_sizes: HashSet<(u32, u32)> =
        measurements.iter().map(|m| (m.width, m.height)).collect();
    let resolution_diversity = (50.0 + 10.0 * (distinct_sizes.len() as f64 - 1.0)).min(100.0);

    let stats = ImageStats {
        total_images: Some(total as u64),
        average_resolution: Some(average_resolution),
        resolution_score: Some(resolution_score),
        average_sharpness: Some(avg(|m| m.sharpness)),
        average_brightness: Some(avg(|m| m.brightness)),
        average_contrast: Some(avg(|m| m.contrast)),
        corrupted_images_ratio: Some(corrupted as f64 / total as f64),
        low_quality_ratio: Some(
            measurements.iter().filter(|m| m.is_low_quality()).count() as f64 / n,
        ),
        low_resolution_ratio: Some(
            measurements.iter().filter(|m| m.is_low_resolution()).count() as f64 / n,
        ),
        resolution_diversity_score: Some(resolution_diversity),
        color_diversity_score: Some((avg(|m| m.color_diversity) * 100.0).min(100.0)),
        quality_standard_deviation: Some(quality_std),
        resolution_standard_deviation: Some(resolution_std),
    };
    debug!(images = measurements.len(), corrupted, "aggregated image statistics");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{Luma, Rgb, RgbImage};

    fn flat(w: u32, h: u32, v: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([v])))
    }

    #[test]
    fn test_flat_image_has_no_contrast_or_edges() {
        let m = measure_dynamic(Path::new("flat.png"), &flat(32, 16, 128));
        assert_relative_eq!(m.brightness, 128.0);
        assert_relative_eq!(m.contrast, 0.0);
        assert_relative_eq!(m.sharpness, 0.0);
        assert_relative_eq!(m.color_diversity, 1.0 / 10_000.0);
        // only the brightness term contributes
        assert_relative_eq!(m.quality_score, 30.0);
        assert!(m.is_low_quality());
        assert!(m.is_low_resolution());
    }

    #[test]
    fn test_edges_raise_sharpness() {
        let img = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let m = measure_dynamic(Path::new("edge.png"), &DynamicImage::ImageRgb8(img));
        assert!(m.sharpness > 0.0);
        assert_relative_eq!(m.contrast, 127.5, epsilon = 1e-9);
    }

    #[test]
    fn test_aggregate() {
        let a = measure_dynamic(Path::new("a.png"), &flat(640, 640, 128));
        let b = measure_dynamic(Path::new("b.png"), &flat(100, 100, 0));
        let stats = aggregate(&[a, b], 2);
        assert_eq!(stats.total_images, Some(4));
        assert_relative_eq!(stats.corrupted_images_ratio.unwrap(), 0.5);
        assert_relative_eq!(stats.low_resolution_ratio.unwrap(), 0.5);
        assert_relative_eq!(stats.average_resolution.unwrap(), 370.0);
        assert_relative_eq!(stats.resolution_score.unwrap(), (100.0 + 100.0 / 6.4) / 2.0);
        assert_relative_eq!(stats.resolution_diversity_score.unwrap(), 60.0);
    }

    #[test]
    fn test_aggregate_all_corrupted() {
        let stats = aggregate(&[], 3);
        assert_eq!(stats.total_images, Some(3));
        assert_eq!(stats.corrupted_images_ratio, Some(1.0));
        assert_eq!(stats.average_resolution, None);
    }
}
