//! Statistics handed to the scorer by the dataset analyzers.
//!
//! Every numeric field is optional. The scorer substitutes a documented
//! default for anything absent, so a partially filled map still scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_images: Option<u64>,
    /// Mean of sqrt(width * height) over decodable images, in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_resolution: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_sharpness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_brightness: Option<f64>, // 0..255
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrupted_images_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_quality_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_resolution_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_diversity_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_diversity_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_standard_deviation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_standard_deviation: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_annotations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<u64>,
    pub class_counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_balance_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_consistency_score: Option<f64>,
    /// 1 - min/max over per-class counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_imbalance_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_bbox_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_annotations_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_annotations_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_size_diversity_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_consistency_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_rich_annotations: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessStats {
    pub total_images: u64,
    pub total_annotations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_ratio: Option<f64>,
    /// Base score computed by the completeness checker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness_score: Option<f64>,
    pub missing_images: Vec<String>,
    pub missing_annotations: Vec<String>,
    pub corrupted_images: Vec<String>,
    pub corrupted_annotations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_structure_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_score: Option<f64>,
}

impl CompletenessStats {
    pub fn total_files(&self) -> u64 {
        self.total_images + self.total_annotations
    }

    pub fn corrupted_files(&self) -> u64 {
        (self.corrupted_images.len() + self.corrupted_annotations.len()) as u64
    }
}

/// Everything the scorer reads, keyed the way the JSON reports key it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResults {
    #[serde(rename = "image_analysis")]
    pub image: ImageStats,
    #[serde(rename = "annotation_analysis")]
    pub annotation: AnnotationStats,
    #[serde(rename = "completeness_analysis")]
    pub completeness: CompletenessStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_maps_deserialize() {
        let raw = r#"{
            "image_analysis": { "average_resolution": 100 },
            "completeness_analysis": { "total_images": 3, "missing_images": ["a.jpg"] }
        }"#;
        let a: AnalysisResults = serde_json::from_str(raw).unwrap();
        assert_eq!(a.image.average_resolution, Some(100.0));
        assert_eq!(a.image.average_brightness, None);
        assert_eq!(a.annotation, AnnotationStats::default());
        assert_eq!(a.completeness.total_images, 3);
        assert_eq!(a.completeness.missing_images, vec!["a.jpg"]);
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let s = ImageStats {
            low_quality_ratio: Some(0.2),
            ..Default::default()
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v, serde_json::json!({ "low_quality_ratio": 0.2 }));
    }
}
