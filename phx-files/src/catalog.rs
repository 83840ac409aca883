//! Cluster-wide file catalog
//!
//! Every listing is issued twice, first broadcast to the mesh and then to
//! the headnode, and the rows are folded into one map keyed by filename.
//! The two listings resolve name collisions differently:
//!
//! - images: the headnode row replaces any mesh row ([`Collision::LastWins`])
//! - experiment files: the first mesh row is kept ([`Collision::FirstWins`])

use crate::classify::{self, base_name};
use crate::cluster::{error_response, ClusterRow, ClusterRunner};
use crate::dates;
use crate::error::{FilesError, FilesResult};
use crate::filter;
use crate::snapshots::pair_snapshots;
use crate::transfer::{self, TransferOptions, TransferTarget};
use crate::types::{CopyStatus, ExperimentFile, ExperimentFiles, ImageDetails, ImageKind};
use async_trait::async_trait;
use phx_common::host::is_headnode;
use phx_common::TomlConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a fold resolves a name that is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    /// Later value replaces the stored one (upsert)
    LastWins,
    /// Stored value is kept (insert if absent)
    FirstWins,
}

/// Filename-keyed map with an explicit collision policy
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    entries: HashMap<String, T>,
    collision: Collision,
}

impl<T> Catalog<T> {
    pub fn new(collision: Collision) -> Self {
        Self {
            entries: HashMap::new(),
            collision,
        }
    }

    /// Add `value` under `name` according to the collision policy.
    ///
    /// Returns true when the stored value changed.
    pub fn fold(&mut self, name: String, value: T) -> bool {
        match self.collision {
            Collision::LastWins => {
                self.entries.insert(name, value);
                true
            }
            Collision::FirstWins => {
                if self.entries.contains_key(&name) {
                    return false;
                }
                self.entries.insert(name, value);
                true
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter()
    }

    /// Values in unspecified order
    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.entries.into_values()
    }
}

/// Cluster file operations.
///
/// Callers receive an implementation explicitly; the production one is
/// [`MeshClusterFiles`].
#[async_trait]
pub trait ClusterFiles: Send + Sync {
    /// VM disk images and container filesystems in the base files
    /// directory of any node. `None` returns both kinds.
    async fn get_images(&self, kind: Option<ImageKind>) -> FilesResult<Vec<ImageDetails>>;

    /// Files in `/{exp}/files` on any node, dated, categorised and
    /// filtered by `filter` (empty = no filtering)
    async fn get_experiment_file_names(&self, exp: &str, filter: &str)
        -> FilesResult<ExperimentFiles>;

    /// Snapshot stems that have both a disk image and a memory snapshot
    async fn get_experiment_snapshots(&self, exp: &str) -> FilesResult<Vec<String>> {
        let files = self
            .get_experiment_file_names(exp, "")
            .await
            .map_err(|e| FilesError::nested("getting experiment file names", e))?;
        Ok(pair_snapshots(&files))
    }

    /// Fetch `path` onto `dest` and wait for the transfer to finish
    async fn copy_file(&self, path: &str, dest: &str, status: Option<&CopyStatus>)
        -> FilesResult<()>;

    /// Fetch `path` onto every mesh node
    async fn sync_file(&self, path: &str, status: Option<&CopyStatus>) -> FilesResult<()>;

    /// Delete `path` from every mesh node, then from the headnode
    async fn delete_file(&self, path: &str) -> FilesResult<()>;
}

/// Settings the production catalog reads from configuration
#[derive(Debug, Clone)]
pub struct FilesSettings {
    /// phenix base directory (experiment files live under `images/`)
    pub phenix_base: PathBuf,
    /// Headnode name
    pub headnode: String,
    /// Default transfer poll interval
    pub poll_interval: Duration,
    /// Default transfer time bound
    pub transfer_timeout: Option<Duration>,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

impl FilesSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            phenix_base: config.phenix_base.clone(),
            headnode: config.headnode_name(),
            poll_interval: config.transfer.poll_interval(),
            transfer_timeout: config.transfer.timeout(),
        }
    }

    /// Where `dest` sits relative to the headnode
    pub fn target(&self, dest: &str) -> TransferTarget {
        if is_headnode(dest, &self.headnode) {
            TransferTarget::Headnode
        } else {
            TransferTarget::Mesh(dest.to_string())
        }
    }

    /// Absolute experiment files directory on a node's disk
    pub fn experiment_files_dir(&self, exp: &str) -> PathBuf {
        self.phenix_base.join("images").join(exp).join("files")
    }

    fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            poll_interval: self.poll_interval,
            timeout: self.transfer_timeout,
            cancel: None,
        }
    }
}

/// Production catalog backed by a cluster command runner
#[derive(Clone)]
pub struct MeshClusterFiles {
    runner: Arc<dyn ClusterRunner>,
    settings: FilesSettings,
}

impl MeshClusterFiles {
    pub fn new(runner: Arc<dyn ClusterRunner>, settings: FilesSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &FilesSettings {
        &self.settings
    }

    /// Copy with explicit poll interval, time bound and cancellation
    pub async fn copy_file_with(
        &self,
        path: &str,
        dest: &str,
        status: Option<&CopyStatus>,
        options: &TransferOptions,
    ) -> FilesResult<()> {
        let target = self.settings.target(dest);
        transfer::copy_file(self.runner.as_ref(), path, &target, status, options).await
    }

    async fn list(&self, stage: &'static str, dir: Option<&str>) -> FilesResult<Vec<ClusterRow>> {
        let suffix = dir.map(|d| format!(" {}", d)).unwrap_or_default();
        let commands = [
            format!("mesh send all file list{}", suffix),
            format!("file list{}", suffix),
        ];

        let mut rows = Vec::new();
        for command in &commands {
            let batch = self
                .runner
                .run_tabular(command)
                .await
                .map_err(|e| FilesError::transport(stage, e))?;
            debug!(command = %command, rows = batch.len(), "Listing complete");
            rows.extend(batch);
        }
        Ok(rows)
    }
}

/// Image details for one listing row, `None` when the row is not an image
fn image_from_row(row: &ClusterRow) -> FilesResult<Option<ImageDetails>> {
    // Only the base directory holds images
    if !row.get("dir").is_empty() {
        return Ok(None);
    }

    let name = row.get("name");
    let Some(kind) = classify::image_kind(name) else {
        return Ok(None);
    };

    let size = row
        .get("size")
        .parse::<u64>()
        .map_err(|source| FilesError::InvalidSize {
            name: name.to_string(),
            source,
        })?;

    Ok(Some(ImageDetails {
        name: name.to_string(),
        full_path: format!("/{}", name),
        kind,
        size,
    }))
}

/// Experiment file for one listing row, `None` for directories
fn file_from_row(row: &ClusterRow) -> Option<ExperimentFile> {
    if !row.get("dir").is_empty() {
        return None;
    }

    let name = base_name(row.get("name"));
    if name.is_empty() {
        return None;
    }

    let size = match row.get("size").parse::<u64>() {
        Ok(size) => size,
        Err(e) => {
            warn!(file = name, size = row.get("size"), error = %e, "Unparsable file size, using 0");
            0
        }
    };

    Some(ExperimentFile::new(name, size, classify::classify(name)))
}

#[async_trait]
impl ClusterFiles for MeshClusterFiles {
    async fn get_images(&self, kind: Option<ImageKind>) -> FilesResult<Vec<ImageDetails>> {
        let mut images = Catalog::new(Collision::LastWins);

        for row in self.list("listing images", None).await? {
            if let Some(image) = image_from_row(&row)? {
                images.fold(image.name.clone(), image);
            }
        }

        let images: Vec<ImageDetails> = images
            .into_values()
            .filter(|image| kind.map_or(true, |k| image.kind == k))
            .collect();

        info!(images = images.len(), "Image inventory complete");
        Ok(images)
    }

    async fn get_experiment_file_names(
        &self,
        exp: &str,
        filter: &str,
    ) -> FilesResult<ExperimentFiles> {
        if exp.is_empty() {
            return Err(FilesError::MissingArgument("experiment name"));
        }

        let tree = filter::compile(filter);
        if !filter.is_empty() && tree.is_none() {
            warn!(exp, filter, "Filter did not compile, no files match");
            return Ok(ExperimentFiles::new());
        }

        let dir = format!("/{}/files", exp);
        let mut files = Catalog::new(Collision::FirstWins);
        for row in self.list("listing experiment files", Some(&dir)).await? {
            if let Some(file) = file_from_row(&row) {
                files.fold(file.name.clone(), file);
            }
        }

        dates::fill_in_file_dates(
            self.runner.as_ref(),
            &self.settings.experiment_files_dir(exp),
            &mut files,
        )
        .await?;

        classify::refine_categories(&mut files);

        let matched: ExperimentFiles = files
            .into_values()
            .filter(|file| tree.as_ref().map_or(true, |t| t.evaluate(file)))
            .collect();

        info!(exp, files = matched.len(), "Experiment file inventory complete");
        Ok(matched)
    }

    async fn copy_file(
        &self,
        path: &str,
        dest: &str,
        status: Option<&CopyStatus>,
    ) -> FilesResult<()> {
        let options = self.settings.transfer_options();
        self.copy_file_with(path, dest, status, &options).await
    }

    async fn sync_file(&self, path: &str, status: Option<&CopyStatus>) -> FilesResult<()> {
        transfer::sync_file(self.runner.as_ref(), path, status).await
    }

    async fn delete_file(&self, path: &str) -> FilesResult<()> {
        for command in ["mesh send all file delete", "file delete"] {
            let command = format!("{} {}", command, path);
            debug!(command = %command, "Deleting file");

            let responses = self
                .runner
                .run(&command)
                .await
                .map_err(|e| FilesError::transport("deleting file from cluster nodes", e))?;

            if let Some(err) = error_response(&responses) {
                return Err(FilesError::node("deleting file from cluster nodes", err));
            }
        }

        info!(path, "Deleted file from cluster");
        Ok(())
    }
}
