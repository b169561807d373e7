//! Class distribution and box statistics over parsed annotations.

use std::collections::{BTreeMap, HashMap};

use scoring::AnnotationStats;
use tracing::debug;

use crate::formats::{AnnotationFormat, ImageAnnotation};

/// Below this imbalance the class balance counts as good.
const BALANCED_IMBALANCE: f64 = 0.3;
const RICH_BOXES_PER_IMAGE: f64 = 2.0;

/// Inputs beyond the parsed annotations themselves.
#[derive(Clone, Debug, Default)]
pub struct AnnotationCounts {
    pub total_images: usize,
    /// Images with no annotation covering them.
    pub unannotated_images: usize,
    pub annotation_files: usize,
    pub unparsable_files: usize,
    /// Format of every successfully parsed file.
    pub formats: Vec<AnnotationFormat>,
    pub image_sizes: HashMap<String, (u32, u32)>,
}

pub fn aggregate(annotations: &[ImageAnnotation], counts: &AnnotationCounts) -> AnnotationStats {
    let mut class_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_boxes = 0u64;
    let mut invalid_boxes = 0u64;
    let mut areas: Vec<f64> = Vec::new();
    let mut all_named = true;

    for ann in annotations {
        let size = ann
            .image_size
            .or_else(|| counts.image_sizes.get(&ann.image_stem).copied());
        for obj in &ann.objects {
            total_boxes += 1;
            all_named &= obj.class_name.is_some();
            *class_counts.entry(obj.class_key()).or_default() += 1;
            if !obj.bbox.is_valid(size) {
                invalid_boxes += 1;
                continue;
            }
            if let Some(a) = obj.bbox.relative_area(size) {
                areas.push(a);
            }
        }
    }

    let class_imbalance_ratio = match (class_counts.values().min(), class_counts.values().max()) {
        (Some(&min), Some(&max)) if max > 0 => 1.0 - min as f64 / max as f64,
        _ => 0.0,
    };
    let invalid_bbox_ratio = ratio(invalid_boxes, total_boxes);
    let cv = coefficient_of_variation(&areas);

    let annotated_images = annotations.iter().filter(|a| !a.objects.is_empty()).count();
    let boxes_per_image = if annotated_images > 0 {
        total_boxes as f64 / annotated_images as f64
    } else {
        0.0
    };

    let stats = AnnotationStats {
        total_annotations: Some(total_boxes),
        num_classes: Some(class_counts.len() as u64),
        class_balance_score: Some(if class_imbalance_ratio < BALANCED_IMBALANCE {
            90.0
        } else {
            60.0
        }),
        bbox_quality_score: Some((1.0 - invalid_bbox_ratio) * 100.0),
        annotation_consistency_score: Some(format_consistency(&counts.formats)),
        class_imbalance_ratio: Some(class_imbalance_ratio),
        invalid_bbox_ratio: Some(invalid_bbox_ratio),
        missing_annotations_ratio: Some(ratio(
            counts.unannotated_images as u64,
            counts.total_images as u64,
        )),
        invalid_annotations_ratio: Some(ratio(
            counts.unparsable_files as u64,
            counts.annotation_files as u64,
        )),
        bbox_size_diversity_score: cv.map(|cv| (40.0 + cv * 60.0).min(100.0)),
        bbox_consistency_score: cv.map(|cv| (100.0 - cv * 40.0).max(0.0)),
        has_rich_annotations: Some(
            total_boxes > 0 && all_named && boxes_per_image >= RICH_BOXES_PER_IMAGE,
        ),
        class_counts,
    };
    debug!(boxes = total_boxes, invalid = invalid_boxes, "aggregated annotation statistics");
    stats
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// std / mean, `None` with fewer than two samples.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(var.sqrt() / mean)
}

/// Share of files in the dominant format, as a score.
fn format_consistency(formats: &[AnnotationFormat]) -> f64 {
    if formats.is_empty() {
        return 0.0;
    }
    let mut by_format: HashMap<AnnotationFormat, usize> = HashMap::new();
    for f in formats {
        *by_format.entry(*f).or_default() += 1;
    }
    let dominant = by_format.values().copied().max().unwrap_or(0);
    dominant as f64 / formats.len() as f64 * 100.0
}
