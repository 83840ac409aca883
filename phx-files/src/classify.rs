//! Filename classification
//!
//! Files are first categorised by extension alone. Disk images are then
//! resolved in a second pass: a `.qc2`/`.qcow2` file is a VM disk snapshot
//! only when `{stem}.SNAP` exists in the same catalog, otherwise it is a
//! backing image.

use crate::catalog::Catalog;
use crate::types::{Category, ExperimentFile, ImageKind};

/// Disk image extensions
pub const DISK_IMAGE_EXTENSIONS: [&str; 2] = [".qc2", ".qcow2"];

/// Memory snapshot extensions accepted when pairing snapshots
pub const MEMORY_SNAPSHOT_EXTENSIONS: [&str; 2] = [".SNAP", ".snap"];

/// Memory snapshot extension used for categorisation
pub const SNAP_EXTENSION: &str = ".SNAP";

/// Container filesystem suffix
pub const ROOTFS_SUFFIX: &str = "_rootfs.tgz";

/// Split a filename into stem and extension.
///
/// The extension starts at the final `.` and includes it; a name without a
/// `.` has an empty extension.
pub fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// Final path component of a cluster path
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

pub fn is_disk_image(ext: &str) -> bool {
    DISK_IMAGE_EXTENSIONS.contains(&ext)
}

pub fn is_memory_snapshot(ext: &str) -> bool {
    MEMORY_SNAPSHOT_EXTENSIONS.contains(&ext)
}

/// Image kind for a name in the base files directory, `None` if the name is
/// not an image
pub fn image_kind(name: &str) -> Option<ImageKind> {
    if DISK_IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        Some(ImageKind::VmImage)
    } else if name.ends_with(ROOTFS_SUFFIX) {
        Some(ImageKind::ContainerImage)
    } else {
        None
    }
}

/// Extension-only category
pub fn classify(name: &str) -> Category {
    match split_ext(name).1 {
        ".pcap" => Category::PacketCapture,
        ".elf" => Category::ElfMemorySnapshot,
        SNAP_EXTENSION => Category::VmMemorySnapshot,
        _ => Category::Unknown,
    }
}

/// Resolve disk image categories against their siblings
pub fn refine_categories(files: &mut Catalog<ExperimentFile>) {
    let resolved: Vec<(String, Category)> = files
        .iter()
        .filter_map(|(name, _)| {
            let (stem, ext) = split_ext(name);
            if !is_disk_image(ext) {
                return None;
            }

            let category = if files.contains(&format!("{}{}", stem, SNAP_EXTENSION)) {
                Category::VmDiskSnapshot
            } else {
                Category::BackingImage
            };
            Some((name.to_string(), category))
        })
        .collect();

    for (name, category) in resolved {
        if let Some(file) = files.get_mut(&name) {
            file.category = category;
        }
    }
}
