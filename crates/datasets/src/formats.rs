//! Annotation file parsers: YOLO txt, COCO json, Pascal VOC xml, LabelMe json.
//!
//! Every parser produces the same shape: one `ImageAnnotation` per image the
//! file describes, boxes converted to XYXY.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DatasetError, Result};

/// Slack for normalized coordinates that round just past the unit square.
const NORMALIZED_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationFormat {
    Yolo,
    Coco,
    Voc,
    LabelMe,
}

/// Axis-aligned box. `normalized` boxes live in the unit square, the rest in
/// pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub normalized: bool,
}

impl BBox {
    pub fn from_yolo(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            x_min: cx - w / 2.0,
            y_min: cy - h / 2.0,
            x_max: cx + w / 2.0,
            y_max: cy + h / 2.0,
            normalized: true,
        }
    }

    pub fn from_coco(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x + w,
            y_max: y + h,
            normalized: false,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Area as a fraction of the image, when that can be known.
    pub fn relative_area(&self, image_size: Option<(u32, u32)>) -> Option<f64> {
        if self.normalized {
            return Some(self.area());
        }
        match image_size {
            Some((w, h)) if w > 0 && h > 0 => Some(self.area() / (w as f64 * h as f64)),
            _ => None,
        }
    }

    /// Non-positive extent, non-finite coordinates, or outside the image.
    /// Pixel boxes are only bounds-checked when the image size is known.
    pub fn is_valid(&self, image_size: Option<(u32, u32)>) -> bool {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        if coords.iter().any(|c| !c.is_finite()) || self.width() <= 0.0 || self.height() <= 0.0 {
            return false;
        }
        if self.normalized {
            let t = NORMALIZED_TOLERANCE;
            return coords.iter().all(|c| *c >= -t && *c <= 1.0 + t);
        }
        match image_size {
            Some((w, h)) => {
                self.x_min >= 0.0
                    && self.y_min >= 0.0
                    && self.x_max <= w as f64
                    && self.y_max <= h as f64
            }
            None => self.x_min >= 0.0 && self.y_min >= 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnnotation {
    pub class_id: Option<u32>,
    pub class_name: Option<String>,
    pub bbox: BBox,
}

impl ObjectAnnotation {
    /// Name when known, otherwise the numeric id.
    pub fn class_key(&self) -> String {
        match (&self.class_name, self.class_id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    /// File stem of the image this annotation describes.
    pub image_stem: String,
    pub image_size: Option<(u32, u32)>,
    pub objects: Vec<ObjectAnnotation>,
}

pub fn detect_format(path: &Path, text: &str) -> Result<AnnotationFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => Ok(AnnotationFormat::Yolo),
        "xml" => Ok(AnnotationFormat::Voc),
        "json" => {
            let v: Value = serde_json::from_str(text).map_err(|e| parse_err(path, e))?;
            if v.get("shapes").is_some() {
                Ok(AnnotationFormat::LabelMe)
            } else if v.get("images").is_some() && v.get("annotations").is_some() {
                Ok(AnnotationFormat::Coco)
            } else {
                Err(parse_err(path, "json is neither COCO nor LabelMe"))
            }
        }
        other => Err(parse_err(path, format!("unsupported annotation extension '{other}'"))),
    }
}

/// Read and parse one annotation file. `class_names` resolves YOLO ids.
pub fn parse_file(
    path: &Path,
    class_names: Option<&[String]>,
) -> Result<(AnnotationFormat, Vec<ImageAnnotation>)> {
    let text = std::fs::read_to_string(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let format = detect_format(path, &text)?;
    let stem = file_stem(path);
    let parsed = match format {
        AnnotationFormat::Yolo => {
            vec![parse_yolo(&stem, &text, class_names).map_err(|e| parse_err(path, e))?]
        }
        AnnotationFormat::Coco => parse_coco(&text).map_err(|e| parse_err(path, e))?,
        AnnotationFormat::Voc => vec![parse_voc(&stem, &text).map_err(|e| parse_err(path, e))?],
        AnnotationFormat::LabelMe => {
            vec![parse_labelme(&stem, &text).map_err(|e| parse_err(path, e))?]
        }
    };
    Ok((format, parsed))
}

/// `class cx cy w h` per line, normalized. Blank lines are skipped.
pub fn parse_yolo(
    stem: &str,
    text: &str,
    class_names: Option<&[String]>,
) -> std::result::Result<ImageAnnotation, String> {
    let mut objects = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            return Err(format!("line {}: expected 5 fields, got {}", i + 1, parts.len()));
        }
        let class_id: u32 = parts[0]
            .parse()
            .map_err(|_| format!("line {}: bad class id '{}'", i + 1, parts[0]))?;
        let mut nums = [0.0f64; 4];
        for (slot, raw) in nums.iter_mut().zip(&parts[1..5]) {
            *slot = raw
                .parse()
                .map_err(|_| format!("line {}: bad coordinate '{raw}'", i + 1))?;
        }
        let class_name = class_names
            .and_then(|names| names.get(class_id as usize))
            .cloned();
        objects.push(ObjectAnnotation {
            class_id: Some(class_id),
            class_name,
            bbox: BBox::from_yolo(nums[0], nums[1], nums[2], nums[3]),
        });
    }
    Ok(ImageAnnotation {
        image_stem: stem.to_string(),
        image_size: None,
        objects,
    })
}

#[derive(Deserialize)]
struct CocoFile {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Deserialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct CocoAnnotation {
    image_id: u64,
    category_id: u32,
    bbox: Vec<f64>,
}

#[derive(Deserialize)]
struct CocoCategory {
    id: u32,
    name: String,
}

pub fn parse_coco(text: &str) -> std::result::Result<Vec<ImageAnnotation>, String> {
    let coco: CocoFile = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let names: HashMap<u32, String> = coco.categories.into_iter().map(|c| (c.id, c.name)).collect();

    let mut index: HashMap<u64, usize> = HashMap::new();
    let mut out: Vec<ImageAnnotation> = Vec::with_capacity(coco.images.len());
    for img in coco.images {
        index.insert(img.id, out.len());
        let image_size = match (img.width, img.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        };
        out.push(ImageAnnotation {
            image_stem: file_stem(Path::new(&img.file_name)),
            image_size,
            objects: Vec::new(),
        });
    }

    for ann in coco.annotations {
        let Some(&slot) = index.get(&ann.image_id) else {
            return Err(format!("annotation refers to unknown image id {}", ann.image_id));
        };
        if ann.bbox.len() != 4 {
            return Err(format!("bbox must have 4 values, got {}", ann.bbox.len()));
        }
        out[slot].objects.push(ObjectAnnotation {
            class_id: Some(ann.category_id),
            class_name: names.get(&ann.category_id).cloned(),
            bbox: BBox::from_coco(ann.bbox[0], ann.bbox[1], ann.bbox[2], ann.bbox[3]),
        });
    }
    Ok(out)
}

pub fn parse_voc(stem: &str, text: &str) -> std::result::Result<ImageAnnotation, String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    let root = doc.root_element();
    if root.tag_name().name() != "annotation" {
        return Err(format!("root element is <{}>, expected <annotation>", root.tag_name().name()));
    }

    let child_text = |node: roxmltree::Node, tag: &str| -> Option<String> {
        node.children()
            .find(|c| c.has_tag_name(tag))
            .and_then(|c| c.text())
            .map(|t| t.trim().to_string())
    };
    let child_num = |node: roxmltree::Node, tag: &str| -> std::result::Result<f64, String> {
        child_text(node, tag)
            .ok_or_else(|| format!("missing <{tag}>"))?
            .parse::<f64>()
            .map_err(|_| format!("<{tag}> is not a number"))
    };

    let image_stem = child_text(root, "filename")
        .map(|f| file_stem(Path::new(&f)))
        .unwrap_or_else(|| stem.to_string());
    let image_size = root.children().find(|c| c.has_tag_name("size")).and_then(|size| {
        let w = child_text(size, "width")?.parse::<f64>().ok()?;
        let h = child_text(size, "height")?.parse::<f64>().ok()?;
        (w > 0.0 && h > 0.0).then_some((w as u32, h as u32))
    });

    let mut objects = Vec::new();
    for obj in root.children().filter(|c| c.has_tag_name("object")) {
        let name = child_text(obj, "name").ok_or("object without <name>")?;
        let bnd = obj
            .children()
            .find(|c| c.has_tag_name("bndbox"))
            .ok_or("object without <bndbox>")?;
        objects.push(ObjectAnnotation {
            class_id: None,
            class_name: Some(name),
            bbox: BBox {
                x_min: child_num(bnd, "xmin")?,
                y_min: child_num(bnd, "ymin")?,
                x_max: child_num(bnd, "xmax")?,
                y_max: child_num(bnd, "ymax")?,
                normalized: false,
            },
        });
    }
    Ok(ImageAnnotation {
        image_stem,
        image_size,
        objects,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelMeFile {
    shapes: Vec<LabelMeShape>,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
}

#[derive(Deserialize)]
struct LabelMeShape {
    label: String,
    points: Vec<[f64; 2]>,
}

/// Shapes of any kind are reduced to their bounding rectangle.
pub fn parse_labelme(stem: &str, text: &str) -> std::result::Result<ImageAnnotation, String> {
    let file: LabelMeFile = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let image_size = match (file.image_width, file.image_height) {
        (Some(w), Some(h)) => Some((w, h)),
        _ => None,
    };

    let mut objects = Vec::with_capacity(file.shapes.len());
    for shape in file.shapes {
        if shape.points.is_empty() {
            return Err(format!("shape '{}' has no points", shape.label));
        }
        let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
        let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for [x, y] in &shape.points {
            x0 = x0.min(*x);
            y0 = y0.min(*y);
            x1 = x1.max(*x);
            y1 = y1.max(*y);
        }
        objects.push(ObjectAnnotation {
            class_id: None,
            class_name: Some(shape.label),
            bbox: BBox {
                x_min: x0,
                y_min: y0,
                x_max: x1,
                y_max: y1,
                normalized: false,
            },
        });
    }

    Ok(ImageAnnotation {
        image_stem: file
            .image_path
            .map(|p| file_stem(Path::new(&p)))
            .unwrap_or_else(|| stem.to_string()),
        image_size,
        objects,
    })
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_err(path: &Path, msg: impl ToString) -> DatasetError {
    DatasetError::Parse {
        path: path.to_path_buf(),
        msg: msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_yolo_lines() {
        let names = vec!["car".to_string(), "person".to_string()];
        let text = "0 0.5 0.5 0.2 0.4\n\n1 0.1 0.1 0.2 0.2\n";
        let ann = parse_yolo("img1", text, Some(&names)).unwrap();
        assert_eq!(ann.objects.len(), 2);
        assert_eq!(ann.objects[0].class_key(), "car");
        let b = ann.objects[0].bbox;
        assert_relative_eq!(b.x_min, 0.4);
        assert_relative_eq!(b.y_max, 0.7);
        assert!(b.is_valid(None));
        // touches the edge exactly
        assert!(ann.objects[1].bbox.is_valid(None));
    }

    #[test]
    fn test_yolo_rejects_short_line() {
        let err = parse_yolo("x", "0 0.5 0.5\n", None).unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn test_yolo_unknown_id_uses_number() {
        let ann = parse_yolo("x", "7 0.5 0.5 0.1 0.1", None).unwrap();
        assert_eq!(ann.objects[0].class_key(), "7");
    }

    #[test]
    fn test_coco() {
        let text = r#"{
            "images": [
                {"id": 1, "file_name": "a.jpg", "width": 100, "height": 50},
                {"id": 2, "file_name": "sub/b.png"}
            ],
            "annotations": [
                {"image_id": 1, "category_id": 3, "bbox": [10, 10, 20, 20]},
                {"image_id": 1, "category_id": 3, "bbox": [90, 40, 20, 20]}
            ],
            "categories": [{"id": 3, "name": "dog"}]
        }"#;
        let anns = parse_coco(text).unwrap();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].image_stem, "a");
        assert_eq!(anns[1].image_stem, "b");
        assert_eq!(anns[0].objects[0].class_key(), "dog");
        assert!(anns[0].objects[0].bbox.is_valid(anns[0].image_size));
        // spills past the right edge
        assert!(!anns[0].objects[1].bbox.is_valid(anns[0].image_size));
    }

    #[test]
    fn test_coco_unknown_image() {
        let text = r#"{"images": [], "annotations": [{"image_id": 9, "category_id": 1, "bbox": [0,0,1,1]}]}"#;
        assert!(parse_coco(text).is_err());
    }

    #[test]
    fn test_voc() {
        let text = r#"<annotation>
            <filename>street.jpg</filename>
            <size><width>640</width><height>480</height><depth>3</depth></size>
            <object><name>car</name><bndbox><xmin>10</xmin><ymin>20</ymin><xmax>110</xmax><ymax>220</ymax></bndbox></object>
            <object><name>car</name><bndbox><xmin>50</xmin><ymin>20</ymin><xmax>40</xmax><ymax>30</ymax></bndbox></object>
        </annotation>"#;
        let ann = parse_voc("fallback", text).unwrap();
        assert_eq!(ann.image_stem, "street");
        assert_eq!(ann.image_size, Some((640, 480)));
        assert_eq!(ann.objects.len(), 2);
        assert!(ann.objects[0].bbox.is_valid(ann.image_size));
        assert!(!ann.objects[1].bbox.is_valid(ann.image_size));
    }

    #[test]
    fn test_voc_missing_bndbox() {
        let text = "<annotation><object><name>x</name></object></annotation>";
        assert!(parse_voc("s", text).is_err());
    }

    #[test]
    fn test_labelme_polygon_bounds() {
        let text = r#"{
            "imagePath": "../images/cat.jpg", "imageWidth": 200, "imageHeight": 100,
            "shapes": [{"label": "cat", "points": [[10, 5], [50, 80], [30, 20]], "shape_type": "polygon"}]
        }"#;
        let ann = parse_labelme("ignored", text).unwrap();
        assert_eq!(ann.image_stem, "cat");
        let b = ann.objects[0].bbox;
        assert_eq!((b.x_min, b.y_min, b.x_max, b.y_max), (10.0, 5.0, 50.0, 80.0));
        assert_relative_eq!(b.relative_area(ann.image_size).unwrap(), 40.0 * 75.0 / 20000.0);
    }

    #[test]
    fn test_detect_format() {
        let p = Path::new("a.json");
        assert_eq!(detect_format(p, r#"{"shapes": []}"#).unwrap(), AnnotationFormat::LabelMe);
        assert_eq!(
            detect_format(p, r#"{"images": [], "annotations": []}"#).unwrap(),
            AnnotationFormat::Coco
        );
        assert!(detect_format(p, r#"{"foo": 1}"#).is_err());
        assert!(detect_format(p, "not json").is_err());
        assert_eq!(detect_format(Path::new("a.TXT"), "").unwrap(), AnnotationFormat::Yolo);
        assert_eq!(detect_format(Path::new("a.xml"), "").unwrap(), AnnotationFormat::Voc);
    }

    #[test]
    fn test_zero_area_box_is_invalid() {
        let b = BBox::from_yolo(0.5, 0.5, 0.0, 0.2);
        assert!(!b.is_valid(None));
        assert_eq!(b.area(), 0.0);
    }
}
