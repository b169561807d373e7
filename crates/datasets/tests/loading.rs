use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use datasets::{load, AnnotationFormat, DatasetError};
use image::{Rgb, RgbImage};

fn write_png(path: &Path, w: u32, h: u32) {
    let img = RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(path).unwrap();
}

/// images: a, b, c (tiny), broken; labels: a, b, z (orphan), bad (unparsable)
fn fixture(root: &Path) {
    fs::create_dir_all(root.join("images")).unwrap();
    fs::create_dir_all(root.join("labels")).unwrap();
    write_png(&root.join("images/a.png"), 320, 240);
    write_png(&root.join("images/b.png"), 320, 240);
    write_png(&root.join("images/c.png"), 64, 64);
    fs::write(root.join("images/broken.png"), b"definitely not a png").unwrap();

    fs::write(root.join("labels/a.txt"), "0 0.5 0.5 0.2 0.2\n1 0.3 0.3 0.1 0.1\n").unwrap();
    fs::write(root.join("labels/b.txt"), "0 0.5 0.5 0.4 0.4\n").unwrap();
    fs::write(root.join("labels/z.txt"), "1 0.5 0.5 0.1 0.1\n").unwrap();
    fs::write(root.join("labels/bad.txt"), "not a label").unwrap();
    fs::write(root.join("classes.txt"), "car\nperson\n").unwrap();
}

#[test]
fn test_load_and_basic_statistics() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());

    let ds = load(dir.path()).unwrap();
    assert_eq!(ds.layout.images.len(), 4);
    assert_eq!(ds.layout.annotations.len(), 4);
    assert_eq!(ds.corrupted_images, vec!["images/broken.png"]);
    assert_eq!(ds.corrupted_annotations, vec!["labels/bad.txt"]);
    assert_eq!(ds.image_sizes.get("a"), Some(&(320, 240)));

    let basic = ds.basic_statistics();
    assert_eq!(basic.total_images, 4);
    assert_eq!(basic.total_objects, 4);
    assert_eq!(basic.num_classes, 2);
    assert_eq!(basic.formats.get(&AnnotationFormat::Yolo), Some(&3));
    assert_eq!(basic.fingerprint.len(), 64);
}

#[test]
fn test_completeness_pairs_by_stem() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let ds = load(dir.path()).unwrap();

    let c = ds.check_completeness(None);
    assert_eq!(c.missing_annotations, vec!["broken", "c"]);
    assert_eq!(c.missing_images, vec!["z"]);
    assert_relative_eq!(c.matching_ratio.unwrap(), 0.5);
    assert_eq!(c.corrupted_files(), 2);
    assert_eq!(c.directory_structure_score, Some(100.0));
    assert!(c.completeness_score.unwrap() < 100.0);
}

#[test]
fn test_image_and_annotation_analysis() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let ds = load(dir.path()).unwrap();

    let images = ds.analyze_images(|| false).unwrap();
    assert_eq!(images.measurements.len(), 3);
    assert_eq!(images.corrupted, vec!["images/broken.png"]);
    assert_eq!(images.stats.total_images, Some(4));
    assert_relative_eq!(images.stats.corrupted_images_ratio.unwrap(), 0.25);
    assert_relative_eq!(images.stats.low_resolution_ratio.unwrap(), 1.0 / 3.0);

    let ann = ds.analyze_annotations();
    assert_eq!(ann.class_counts.get("car"), Some(&2));
    assert_eq!(ann.class_counts.get("person"), Some(&2));
    assert_relative_eq!(ann.missing_annotations_ratio.unwrap(), 0.5);
    assert_relative_eq!(ann.invalid_annotations_ratio.unwrap(), 0.25);
    assert_eq!(ann.invalid_bbox_ratio, Some(0.0));
}

#[test]
fn test_image_analysis_stops_when_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let ds = load(dir.path()).unwrap();

    let err = ds.analyze_images(|| true).unwrap_err();
    assert!(matches!(err, DatasetError::Cancelled));
}

#[test]
fn test_fingerprint_is_stable_and_tracks_changes() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let first = load(dir.path()).unwrap().fingerprint;
    assert_eq!(load(dir.path()).unwrap().fingerprint, first);

    fs::write(dir.path().join("labels/b.txt"), "0 0.5 0.5 0.4 0.4\n1 0.2 0.2 0.1 0.1\n").unwrap();
    assert_ne!(load(dir.path()).unwrap().fingerprint, first);
}

#[test]
fn test_load_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = load(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, DatasetError::NotFound(_)));
}

#[test]
fn test_coco_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("images")).unwrap();
    fs::create_dir_all(root.join("annotations")).unwrap();
    write_png(&root.join("images/one.png"), 256, 256);
    write_png(&root.join("images/two.png"), 256, 256);
    fs::write(
        root.join("annotations/instances.json"),
        r#"{
            "images": [
                {"id": 1, "file_name": "one.png", "width": 256, "height": 256},
                {"id": 2, "file_name": "two.png", "width": 256, "height": 256}
            ],
            "annotations": [
                {"image_id": 1, "category_id": 1, "bbox": [10, 10, 50, 50]},
                {"image_id": 2, "category_id": 2, "bbox": [200, 200, 100, 100]}
            ],
            "categories": [{"id": 1, "name": "cat"}, {"id": 2, "name": "dog"}]
        }"#,
    )
    .unwrap();

    let ds = load(root).unwrap();
    let c = ds.check_completeness(None);
    assert_eq!(c.matching_ratio, Some(1.0));
    assert!(c.missing_annotations.is_empty());

    let ann = ds.analyze_annotations();
    assert_eq!(ann.num_classes, Some(2));
    // the dog box spills past 256
    assert_relative_eq!(ann.invalid_bbox_ratio.unwrap(), 0.5);
    assert_eq!(ann.annotation_consistency_score, Some(100.0));
}
