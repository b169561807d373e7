use crate::layout::DatasetLayout;

pub type Hash32 = [u8; 32];

/// Deterministic dataset fingerprint:
/// - sort by rel_path (bytewise)
/// - hash bytes: "<rel_path>\n<size>\n" for each image and annotation file
pub fn fingerprint(layout: &DatasetLayout) -> Hash32 {
    let mut files: Vec<(&str, u64)> = layout
        .all_files()
        .map(|f| (f.rel_path.as_str(), f.size))
        .collect();
    files.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = blake3::Hasher::new();
    for (rel_path, size) in files {
        hasher.update(rel_path.as_bytes());
        hasher.update(b"\n");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}

pub fn fingerprint_hex(layout: &DatasetLayout) -> String {
    hex::encode(fingerprint(layout))
}
