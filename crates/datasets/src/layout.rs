//! Walks a dataset directory and sorts files into images and annotations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{DatasetError, Result};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];
pub const ANNOTATION_EXTENSIONS: &[&str] = &["txt", "json", "xml"];
/// Holds YOLO class names, one per line; never an annotation itself.
pub const CLASSES_FILE: &str = "classes.txt";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    fn from_component(c: &str) -> Option<Self> {
        match c.to_ascii_lowercase().as_str() {
            "train" => Some(Split::Train),
            "val" | "valid" | "validation" => Some(Split::Val),
            "test" => Some(Split::Test),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub path: PathBuf,
    pub rel_path: String, // '/'-separated, relative to the root
    pub stem: String,
    pub split: Option<Split>,
    pub size: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub root: PathBuf,
    pub images: Vec<DatasetFile>,
    pub annotations: Vec<DatasetFile>,
    pub class_names: Option<Vec<String>>,
    /// Every directory below the root, root excluded.
    pub directories: Vec<PathBuf>,
    pub empty_directories: usize,
    pub max_depth: usize,
}

impl DatasetLayout {
    pub fn all_files(&self) -> impl Iterator<Item = &DatasetFile> {
        self.images.iter().chain(self.annotations.iter())
    }

    pub fn split_counts(&self) -> Vec<(Split, usize)> {
        let mut out = Vec::new();
        for split in [Split::Train, Split::Val, Split::Test] {
            let n = self.images.iter().filter(|f| f.split == Some(split)).count();
            if n > 0 {
                out.push((split, n));
            }
        }
        out
    }
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn scan(root: &Path) -> Result<DatasetLayout> {
    if !root.exists() {
        return Err(DatasetError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DatasetError::NotADirectory(root.to_path_buf()));
    }

    let mut layout = DatasetLayout {
        root: root.to_path_buf(),
        ..Default::default()
    };
    let mut classes_file: Option<PathBuf> = None;

    // sorted so every list comes out in a stable order
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if entry.depth() == 0 {
            continue;
        }
        layout.max_depth = layout.max_depth.max(entry.depth());

        if entry.file_type().is_dir() {
            let empty = std::fs::read_dir(path)
                .map(|mut it| it.next().is_none())
                .unwrap_or(false);
            if empty {
                layout.empty_directories += 1;
            }
            layout.directories.push(path.to_path_buf());
            continue;
        }

        let is_image = has_extension(path, IMAGE_EXTENSIONS);
        let is_annotation = has_extension(path, ANNOTATION_EXTENSIONS);
        if !is_image && !is_annotation {
            continue;
        }
        if entry.file_name().eq_ignore_ascii_case(CLASSES_FILE) {
            classes_file.get_or_insert_with(|| path.to_path_buf());
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        let split = rel
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .find_map(Split::from_component);
        let file = DatasetFile {
            path: path.to_path_buf(),
            rel_path: rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            stem: crate::formats::file_stem(path),
            split,
            size: entry.metadata().map(|m| m.len()).unwrap_or(0),
        };

        if is_image {
            layout.images.push(file);
        } else {
            layout.annotations.push(file);
        }
    }

    if let Some(path) = classes_file {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let names: Vec<String> = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                debug!(classes = names.len(), "read class names from {}", path.display());
                layout.class_names = Some(names);
            }
            Err(e) => warn!("cannot read {}: {e}", path.display()),
        }
    }

    debug!(
        images = layout.images.len(),
        annotations = layout.annotations.len(),
        "scanned {}",
        root.display()
    );
    Ok(layout)
}
