//! Test Helper Utilities
//!
//! Scripted cluster runner and row builders shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use phx_files::catalog::FilesSettings;
use phx_files::cluster::ClusterError;
use phx_files::{ClusterRow, ClusterRunner, MeshClusterFiles, NodeResponse};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Queue<T> = VecDeque<Result<T, String>>;

/// Runner double answering each command from a per-command queue.
///
/// Unscripted commands, and commands whose queue has run dry, answer with
/// an empty result unless a repeating answer was registered.
#[derive(Default)]
pub struct ScriptedRunner {
    tabular: Mutex<HashMap<String, Queue<Vec<ClusterRow>>>>,
    repeat: Mutex<HashMap<String, Vec<ClusterRow>>>,
    raw: Mutex<HashMap<String, Queue<Vec<NodeResponse>>>>,
    issued: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue tabular rows for the next call of `command`
    pub fn on_tabular(&self, command: &str, rows: Vec<ClusterRow>) -> &Self {
        self.tabular
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(Ok(rows));
        self
    }

    /// Answer every call of `command` with `rows` once its queue is empty
    pub fn repeat_tabular(&self, command: &str, rows: Vec<ClusterRow>) -> &Self {
        self.repeat.lock().unwrap().insert(command.to_string(), rows);
        self
    }

    /// Queue a runner failure for the next tabular call of `command`
    pub fn fail_tabular(&self, command: &str, message: &str) -> &Self {
        self.tabular
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
        self
    }

    /// Queue node responses for the next raw call of `command`
    pub fn on_run(&self, command: &str, responses: Vec<NodeResponse>) -> &Self {
        self.raw
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(Ok(responses));
        self
    }

    /// Queue a runner failure for the next raw call of `command`
    pub fn fail_run(&self, command: &str, message: &str) -> &Self {
        self.raw
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
        self
    }

    /// Every command issued, in order
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    /// Number of times `command` was issued
    pub fn count(&self, command: &str) -> usize {
        self.issued().iter().filter(|c| c.as_str() == command).count()
    }

    fn record(&self, command: &str) {
        self.issued.lock().unwrap().push(command.to_string());
    }
}

#[async_trait]
impl ClusterRunner for ScriptedRunner {
    async fn run_tabular(&self, command: &str) -> Result<Vec<ClusterRow>, ClusterError> {
        self.record(command);
        let next = self
            .tabular
            .lock()
            .unwrap()
            .get_mut(command)
            .and_then(VecDeque::pop_front);

        match next {
            Some(reply) => reply.map_err(ClusterError::Other),
            None => Ok(self
                .repeat
                .lock()
                .unwrap()
                .get(command)
                .cloned()
                .unwrap_or_default()),
        }
    }

    async fn run(&self, command: &str) -> Result<Vec<NodeResponse>, ClusterError> {
        self.record(command);
        let next = self
            .raw
            .lock()
            .unwrap()
            .get_mut(command)
            .and_then(VecDeque::pop_front);

        match next {
            Some(reply) => reply.map_err(ClusterError::Other),
            None => Ok(Vec::new()),
        }
    }
}

/// `file list` row for a plain file
pub fn file_row(host: &str, name: &str, size: &str) -> ClusterRow {
    ClusterRow::from_pairs([("host", host), ("dir", ""), ("name", name), ("size", size)])
}

/// `file list` row for a directory
pub fn dir_row(host: &str, name: &str) -> ClusterRow {
    ClusterRow::from_pairs([("host", host), ("dir", "<dir>"), ("name", name), ("size", "4096")])
}

/// `file status` row
pub fn status_row(filename: &str, completed: &str) -> ClusterRow {
    ClusterRow::from_pairs([("filename", filename), ("completed", completed)])
}

/// `ls -alht --full-time` line for a regular file
pub fn ls_line(name: &str, stamp: &str) -> String {
    format!("-rw-r--r-- 1 root root 1.0K {} -0700 {}", stamp, name)
}

pub fn settings() -> FilesSettings {
    FilesSettings {
        phenix_base: PathBuf::from("/phenix"),
        headnode: "head".to_string(),
        poll_interval: Duration::ZERO,
        transfer_timeout: None,
    }
}

/// Catalog wired to `runner` with [`settings`]
pub fn catalog(runner: &Arc<ScriptedRunner>) -> MeshClusterFiles {
    MeshClusterFiles::new(runner.clone(), settings())
}
