//! Snapshot pairing
//!
//! A VM snapshot is stored as two files sharing a stem: the disk image
//! (`.qc2`/`.qcow2`) and the memory state (`.SNAP`/`.snap`). Only stems with
//! both halves present are usable for restore.

use crate::classify::{is_disk_image, is_memory_snapshot, split_ext};
use crate::types::ExperimentFile;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct Halves {
    disk: bool,
    memory: bool,
}

/// Stems that have both a disk image and a memory snapshot, in no
/// particular order
pub fn pair_snapshots(files: &[ExperimentFile]) -> Vec<String> {
    let mut seen: HashMap<&str, Halves> = HashMap::new();

    for file in files {
        let (stem, ext) = split_ext(&file.name);
        if is_disk_image(ext) {
            seen.entry(stem).or_default().disk = true;
        } else if is_memory_snapshot(ext) {
            seen.entry(stem).or_default().memory = true;
        }
    }

    seen.into_iter()
        .filter(|(_, halves)| halves.disk && halves.memory)
        .map(|(stem, _)| stem.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn files(names: &[&str]) -> Vec<ExperimentFile> {
        names
            .iter()
            .map(|n| ExperimentFile::new(*n, 0, Category::Unknown))
            .collect()
    }

    #[test]
    fn test_pairs_require_both_halves() {
        let stems = pair_snapshots(&files(&["foo.qc2", "foo.SNAP", "bar.qcow2"]));
        assert_eq!(stems, vec!["foo".to_string()]);
    }

    #[test]
    fn test_order_and_case_of_memory_extension() {
        let mut stems = pair_snapshots(&files(&[
            "b.snap", "a.SNAP", "a.qcow2", "b.qc2", "c.SNAP", "d.pcap",
        ]));
        stems.sort();
        assert_eq!(stems, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_repeated_halves_are_idempotent() {
        let stems = pair_snapshots(&files(&["x.qc2", "x.qcow2", "x.SNAP", "x.snap"]));
        assert_eq!(stems, vec!["x".to_string()]);
    }

    #[test]
    fn test_empty() {
        assert!(pair_snapshots(&[]).is_empty());
    }
}
