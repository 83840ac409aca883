//! Catalog data types

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Kind of base image found in the cluster files directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageKind {
    /// `.qc2` / `.qcow2` disk image
    VmImage,
    /// `_rootfs.tgz` container filesystem
    ContainerImage,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::VmImage => write!(f, "VM_IMAGE"),
            ImageKind::ContainerImage => write!(f, "CONTAINER_IMAGE"),
        }
    }
}

/// Base image available somewhere in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDetails {
    pub name: String,
    pub full_path: String,
    pub kind: ImageKind,
    /// Size in bytes
    pub size: u64,
}

/// Content category of an experiment file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    #[serde(rename = "Packet Capture")]
    PacketCapture,
    #[serde(rename = "ELF Memory Snapshot")]
    ElfMemorySnapshot,
    #[serde(rename = "VM Memory Snapshot")]
    VmMemorySnapshot,
    #[serde(rename = "VM Disk Snapshot")]
    VmDiskSnapshot,
    #[serde(rename = "Backing Image")]
    BackingImage,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Category {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Category::PacketCapture => "Packet Capture",
            Category::ElfMemorySnapshot => "ELF Memory Snapshot",
            Category::VmMemorySnapshot => "VM Memory Snapshot",
            Category::VmDiskSnapshot => "VM Disk Snapshot",
            Category::BackingImage => "Backing Image",
            Category::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// File found in an experiment's files directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentFile {
    /// Base filename, no directory
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub category: Category,
    /// Modification time as listed (`YYYY-MM-DD HH:MM:SS`), empty if unknown
    pub date: String,
    /// Parsed modification time, absent when unknown or unparsable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<NaiveDateTime>,
}

impl ExperimentFile {
    pub fn new(name: impl Into<String>, size: u64, category: Category) -> Self {
        Self {
            name: name.into(),
            size,
            category,
            date: String::new(),
            date_time: None,
        }
    }
}

/// Experiment files in no particular order; sort before comparing
pub type ExperimentFiles = Vec<ExperimentFile>;

/// Transfer progress callback, called with the completed fraction
pub type CopyStatus = dyn Fn(f64) + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serializes_as_label() {
        let json = serde_json::to_string(&Category::VmDiskSnapshot).unwrap();
        assert_eq!(json, "\"VM Disk Snapshot\"");
        assert_eq!(Category::PacketCapture.to_string(), "Packet Capture");
    }

    #[test]
    fn test_image_kind_display() {
        assert_eq!(ImageKind::VmImage.to_string(), "VM_IMAGE");
        let json = serde_json::to_string(&ImageKind::ContainerImage).unwrap();
        assert_eq!(json, "\"CONTAINER_IMAGE\"");
    }
}
