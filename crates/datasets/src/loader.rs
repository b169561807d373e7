//! One pass over a dataset directory: layout, parsed annotations, and the
//! cheap integrity checks that need no full decode.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use scoring::{AnnotationStats, CompletenessStats, ImageStats};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::annotation_stats::{self, AnnotationCounts};
use crate::completeness::{self, Coverage};
use crate::fingerprint::fingerprint_hex;
use crate::formats::{parse_file, AnnotationFormat, ImageAnnotation};
use crate::image_stats::{self, ImageMeasurement};
use crate::layout::{scan, DatasetLayout, Split};
use crate::{DatasetError, Result};

#[derive(Clone, Debug)]
pub struct LoadedDataset {
    pub layout: DatasetLayout,
    pub fingerprint: String,
    pub annotations: Vec<ImageAnnotation>,
    /// Format of each annotation file that parsed.
    pub formats: Vec<AnnotationFormat>,
    pub coverage: Coverage,
    /// Stem -> (width, height), read from image headers.
    pub image_sizes: HashMap<String, (u32, u32)>,
    pub corrupted_images: Vec<String>,
    pub corrupted_annotations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicStatistics {
    pub fingerprint: String,
    pub total_images: usize,
    pub total_annotation_files: usize,
    pub total_objects: usize,
    pub num_classes: usize,
    pub formats: BTreeMap<AnnotationFormat, usize>,
    pub splits: BTreeMap<Split, usize>,
    pub total_size_bytes: u64,
    pub corrupted_images: usize,
    pub corrupted_annotations: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub stats: ImageStats,
    pub measurements: Vec<ImageMeasurement>,
    /// Rel paths that failed to decode, header failures included.
    pub corrupted: Vec<String>,
}

pub fn load(root: &Path) -> Result<LoadedDataset> {
    let layout = scan(root)?;
    let fingerprint = fingerprint_hex(&layout);

    let mut image_sizes = HashMap::new();
    let mut corrupted_images = Vec::new();
    for file in &layout.images {
        match image::image_dimensions(&file.path) {
            Ok(dims) => {
                image_sizes.insert(file.stem.clone(), dims);
            }
            Err(e) => {
                warn!("unreadable image {}: {e}", file.rel_path);
                corrupted_images.push(file.rel_path.clone());
            }
        }
    }

    let class_names = layout.class_names.as_deref();
    let mut annotations = Vec::new();
    let mut formats = Vec::new();
    let mut coverage = Coverage::default();
    let mut corrupted_annotations = Vec::new();
    for file in &layout.annotations {
        match parse_file(&file.path, class_names) {
            Ok((format, parsed)) => {
                formats.push(format);
                for ann in &parsed {
                    coverage.add(ann.image_stem.clone());
                }
                annotations.extend(parsed);
            }
            Err(e) => {
                warn!("{e}");
                corrupted_annotations.push(file.rel_path.clone());
            }
        }
    }

    info!(
        images = layout.images.len(),
        annotation_files = layout.annotations.len(),
        corrupted_images = corrupted_images.len(),
        corrupted_annotations = corrupted_annotations.len(),
        fingerprint = %fingerprint,
        "loaded dataset {}",
        root.display()
    );

    Ok(LoadedDataset {
        layout,
        fingerprint,
        annotations,
        formats,
        coverage,
        image_sizes,
        corrupted_images,
        corrupted_annotations,
    })
}

impl LoadedDataset {
    pub fn basic_statistics(&self) -> BasicStatistics {
        let mut formats = BTreeMap::new();
        for f in &self.formats {
            *formats.entry(*f).or_insert(0) += 1;
        }
        let mut classes = std::collections::BTreeSet::new();
        let mut total_objects = 0;
        for ann in &self.annotations {
            total_objects += ann.objects.len();
            classes.extend(ann.objects.iter().map(|o| o.class_key()));
        }

        BasicStatistics {
            fingerprint: self.fingerprint.clone(),
            total_images: self.layout.images.len(),
            total_annotation_files: self.layout.annotations.len(),
            total_objects,
            num_classes: classes.len(),
            formats,
            splits: self.layout.split_counts().into_iter().collect(),
            total_size_bytes: self.layout.all_files().map(|f| f.size).sum(),
            corrupted_images: self.corrupted_images.len(),
            corrupted_annotations: self.corrupted_annotations.len(),
        }
    }

    /// Decode and measure every image that passed the header check.
    /// `cancelled` is polled between images.
    pub fn analyze_images(&self, cancelled: impl Fn() -> bool) -> Result<ImageAnalysis> {
        let mut measurements = Vec::with_capacity(self.layout.images.len());
        let mut corrupted = self.corrupted_images.clone();

        for file in &self.layout.images {
            if cancelled() {
                return Err(DatasetError::Cancelled);
            }
            if self.corrupted_images.contains(&file.rel_path) {
                continue;
            }
            match image_stats::measure_image(&file.path) {
                Ok(m) => measurements.push(m),
                Err(e) => {
                    warn!("{e}");
                    corrupted.push(file.rel_path.clone());
                }
            }
        }
        debug!(measured = measurements.len(), corrupted = corrupted.len(), "image analysis");

        Ok(ImageAnalysis {
            stats: image_stats::aggregate(&measurements, corrupted.len()),
            measurements,
            corrupted,
        })
    }

    pub fn analyze_annotations(&self) -> AnnotationStats {
        let unannotated = self
            .layout
            .images
            .iter()
            .filter(|f| !self.coverage.covered_stems.contains(&f.stem))
            .count();
        let counts = AnnotationCounts {
            total_images: self.layout.images.len(),
            unannotated_images: unannotated,
            annotation_files: self.layout.annotations.len(),
            unparsable_files: self.corrupted_annotations.len(),
            formats: self.formats.clone(),
            image_sizes: self.image_sizes.clone(),
        };
        annotation_stats::aggregate(&self.annotations, &counts)
    }

    /// `corrupted_images` overrides the header-check list when a full decode
    /// found more.
    pub fn check_completeness(&self, corrupted_images: Option<&[String]>) -> CompletenessStats {
        let corrupted = corrupted_images
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| self.corrupted_images.clone());
        completeness::check(
            &self.layout,
            &self.coverage,
            corrupted,
            self.corrupted_annotations.clone(),
        )
    }
}
