//! Object-detection dataset inspection
//!
//! Discovers images and annotation files under a directory, parses YOLO,
//! COCO, Pascal VOC and LabelMe annotations, and reduces everything to the
//! statistics the scorer consumes.

pub mod annotation_stats;
pub mod completeness;
pub mod fingerprint;
pub mod formats;
pub mod image_stats;
pub mod layout;
pub mod loader;

pub use completeness::{Coverage, StructureReport};
pub use fingerprint::{fingerprint, fingerprint_hex, Hash32};
pub use formats::{AnnotationFormat, BBox, ImageAnnotation, ObjectAnnotation};
pub use image_stats::{ImageMeasurement, MIN_RESOLUTION};
pub use layout::{DatasetFile, DatasetLayout, Split};
pub use loader::{load, BasicStatistics, ImageAnalysis, LoadedDataset};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("dataset path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {msg}")]
    Parse { path: PathBuf, msg: String },

    #[error("cannot decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DatasetError>;
