//! phx-files library
//!
//! Cluster-wide catalog of VM images and experiment files, snapshot pairing,
//! file transfer orchestration and deletion across a minimega mesh, plus the
//! thin VM interface bridge used to move interfaces between VLANs.

pub mod catalog;
pub mod classify;
pub mod cluster;
pub mod dates;
pub mod error;
pub mod filter;
pub mod network;
pub mod snapshots;
pub mod transfer;
pub mod types;

pub use crate::catalog::{ClusterFiles, MeshClusterFiles};
pub use crate::cluster::{ClusterRow, ClusterRunner, MinimegaCli, NodeResponse};
pub use crate::error::{FilesError, FilesResult};
pub use crate::network::NetworkBridge;
pub use crate::transfer::TransferOptions;
pub use crate::types::{
    Category, CopyStatus, ExperimentFile, ExperimentFiles, ImageDetails, ImageKind,
};
