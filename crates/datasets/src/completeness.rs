//! Image/annotation pairing, file integrity, directory and naming checks.

use std::collections::BTreeSet;
use std::path::Path;

use scoring::{clamp_score, CompletenessStats};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layout::DatasetLayout;

const STANDARD_DIRS: &[&str] = &["images", "labels", "annotations"];
const MAX_DEPTH: usize = 5;
const MAX_NAME_LEN: usize = 100;
const SPECIAL_CHARS: &[char] = &['@', '#', '$', '%', '&', '*'];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub score: f64,
    pub issues: Vec<String>,
}

/// Which image stems each annotation file claims to describe.
#[derive(Clone, Debug, Default)]
pub struct Coverage {
    pub covered_stems: BTreeSet<String>,
}

impl Coverage {
    pub fn add(&mut self, stem: impl Into<String>) {
        self.covered_stems.insert(stem.into());
    }
}

pub fn check(
    layout: &DatasetLayout,
    coverage: &Coverage,
    corrupted_images: Vec<String>,
    corrupted_annotations: Vec<String>,
) -> CompletenessStats {
    let image_stems: BTreeSet<&str> = layout.images.iter().map(|f| f.stem.as_str()).collect();
    let covered: BTreeSet<&str> = coverage.covered_stems.iter().map(String::as_str).collect();

    let missing_annotations: Vec<String> = image_stems
        .difference(&covered)
        .map(|s| s.to_string())
        .collect();
    let missing_images: Vec<String> = covered
        .difference(&image_stems)
        .map(|s| s.to_string())
        .collect();
    let matched = image_stems.intersection(&covered).count();
    let matching_ratio = match image_stems.len().max(covered.len()) {
        0 => 0.0,
        n => matched as f64 / n as f64,
    };

    let structure = directory_structure(layout);
    let naming = naming_conventions(layout);

    let mut stats = CompletenessStats {
        total_images: layout.images.len() as u64,
        total_annotations: layout.annotations.len() as u64,
        matching_ratio: Some(matching_ratio),
        completeness_score: None,
        missing_images,
        missing_annotations,
        corrupted_images,
        corrupted_annotations,
        directory_structure_score: Some(structure.score),
        naming_score: Some(naming.score),
    };
    let expected = image_stems.len().max(covered.len());
    stats.completeness_score = Some(completeness_score(&stats, expected));

    debug!(
        matched,
        missing_images = stats.missing_images.len(),
        missing_annotations = stats.missing_annotations.len(),
        "completeness check"
    );
    stats
}

/// Base score before the scorer applies its own matching and corruption terms.
fn completeness_score(s: &CompletenessStats, expected: usize) -> f64 {
    let mut score = 100.0;
    if expected > 0 {
        let missing = (s.missing_images.len() + s.missing_annotations.len()) as f64;
        score -= missing / (expected as f64 * 2.0) * 100.0;
        score -= s.corrupted_files() as f64 / expected as f64 * 50.0;
    }
    let matching = s.matching_ratio.unwrap_or(0.0);
    if matching < 1.0 {
        score -= (1.0 - matching) * 30.0;
    }
    score *= s.directory_structure_score.unwrap_or(100.0) / 100.0;
    score *= s.naming_score.unwrap_or(100.0) / 100.0;
    clamp_score(score)
}

pub fn directory_structure(layout: &DatasetLayout) -> StructureReport {
    let mut r = StructureReport {
        score: 100.0,
        issues: Vec::new(),
    };

    let top_level: Vec<String> = layout
        .directories
        .iter()
        .filter(|d| d.parent() == Some(layout.root.as_path()))
        .filter_map(|d| d.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase()))
        .collect();
    let has_standard = layout.directories.iter().any(|d| {
        d.file_name()
            .map(|n| STANDARD_DIRS.iter().any(|s| n.eq_ignore_ascii_case(s)))
            .unwrap_or(false)
    });
    if !has_standard {
        r.issues.push(format!(
            "no standard directory ({}) found; top level has [{}]",
            STANDARD_DIRS.join(", "),
            top_level.join(", ")
        ));
        r.score -= 20.0;
    }
    if layout.max_depth > MAX_DEPTH {
        r.issues.push(format!("directory tree is too deep (depth {})", layout.max_depth));
        r.score -= 10.0;
    }
    if layout.empty_directories > 0 {
        r.issues.push(format!("{} empty director(ies)", layout.empty_directories));
        r.score -= 5.0;
    }
    r
}

pub fn naming_conventions(layout: &DatasetLayout) -> StructureReport {
    let mut r = StructureReport {
        score: 100.0,
        issues: Vec::new(),
    };
    let names: Vec<String> = layout
        .all_files()
        .filter_map(|f| {
            Path::new(&f.rel_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .collect();
    if names.is_empty() {
        return r;
    }
    let total = names.len() as f64;

    let special = names.iter().filter(|n| n.contains(SPECIAL_CHARS)).count();
    let spaces = names.iter().filter(|n| n.contains(' ')).count();
    let long = names.iter().filter(|n| n.chars().count() > MAX_NAME_LEN).count();
    let non_ascii = names.iter().filter(|n| !n.is_ascii()).count();

    if special > 0 {
        let ratio = special as f64 / total;
        r.issues.push(format!(
            "{special} file name(s) with special characters ({:.1}%)",
            ratio * 100.0
        ));
        r.score -= (ratio * 100.0).min(20.0);
    }
    if spaces > 0 {
        let ratio = spaces as f64 / total;
        r.issues.push(format!("{spaces} file name(s) with spaces ({:.1}%)", ratio * 100.0));
        r.score -= (ratio * 50.0).min(10.0);
    }
    if long > 0 {
        r.issues.push(format!("{long} file name(s) longer than {MAX_NAME_LEN} characters"));
        r.score -= (long as f64).min(5.0);
    }
    if non_ascii > 0 {
        let ratio = non_ascii as f64 / total;
        r.issues.push(format!(
            "{non_ascii} file name(s) with non-ASCII characters ({:.1}%)",
            ratio * 100.0
        ));
        r.score -= (ratio * 75.0).min(15.0);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DatasetFile;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn file(rel: &str) -> DatasetFile {
        let p = Path::new(rel);
        DatasetFile {
            path: PathBuf::from("/data").join(rel),
            rel_path: rel.to_string(),
            stem: p.file_stem().unwrap().to_string_lossy().into_owned(),
            split: None,
            size: 1,
        }
    }

    fn layout(images: &[&str], annotations: &[&str]) -> DatasetLayout {
        DatasetLayout {
            root: PathBuf::from("/data"),
            images: images.iter().map(|s| file(s)).collect(),
            annotations: annotations.iter().map(|s| file(s)).collect(),
            directories: vec![PathBuf::from("/data/images"), PathBuf::from("/data/labels")],
            max_depth: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_perfect_pairing() {
        let l = layout(&["images/a.jpg", "images/b.jpg"], &["labels/a.txt", "labels/b.txt"]);
        let mut cov = Coverage::default();
        cov.add("a");
        cov.add("b");
        let s = check(&l, &cov, vec![], vec![]);
        assert_eq!(s.matching_ratio, Some(1.0));
        assert!(s.missing_images.is_empty() && s.missing_annotations.is_empty());
        assert_eq!(s.completeness_score, Some(100.0));
        assert_eq!(s.directory_structure_score, Some(100.0));
    }

    #[test]
    fn test_missing_on_both_sides() {
        let l = layout(
            &["images/a.jpg", "images/b.jpg", "images/c.jpg"],
            &["labels/a.txt", "labels/z.txt"],
        );
        let mut cov = Coverage::default();
        cov.add("a");
        cov.add("z");
        let s = check(&l, &cov, vec![], vec![]);
        assert_eq!(s.missing_annotations, vec!["b", "c"]);
        assert_eq!(s.missing_images, vec!["z"]);
        assert_relative_eq!(s.matching_ratio.unwrap(), 1.0 / 3.0);
        // 100 - 3/6*100 - (2/3)*30
        assert_relative_eq!(s.completeness_score.unwrap(), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pairing_ignores_splits() {
        let l = layout(&["train/images/a.jpg", "val/images/a.jpg"], &["train/labels/a.txt"]);
        let mut cov = Coverage::default();
        cov.add("a");
        let s = check(&l, &cov, vec![], vec![]);
        assert!(s.missing_annotations.is_empty());
        assert_eq!(s.matching_ratio, Some(1.0));
    }

    #[test]
    fn test_structure_penalties() {
        let mut l = layout(&[], &[]);
        l.directories = vec![PathBuf::from("/data/stuff")];
        l.max_depth = 7;
        l.empty_directories = 2;
        let r = directory_structure(&l);
        assert_eq!(r.score, 65.0);
        assert_eq!(r.issues.len(), 3);
    }

    #[test]
    fn test_naming_penalties() {
        let l = layout(
            &["images/a b.jpg", "images/ç@.jpg"],
            &["labels/ok.txt", "labels/fine.txt"],
        );
        let r = naming_conventions(&l);
        // special 1/4 -> 20 capped; spaces 1/4 -> 10 capped (12.5);
        // non-ascii 1/4 -> 15 capped (18.75)
        assert_relative_eq!(r.score, 100.0 - 20.0 - 10.0 - 15.0);
        assert_eq!(r.issues.len(), 3);
    }
}
