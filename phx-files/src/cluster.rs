//! Cluster command runner boundary
//!
//! Commands are plain minimega command strings. A command either runs on the
//! headnode (`file list`) or is broadcast to the mesh (`mesh send all file
//! list`); either way every responding node contributes one response. The
//! runner is a trait so the catalog can be driven by the real cluster or by
//! a scripted double in tests.

use async_trait::async_trait;
use phx_common::TomlConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runner errors
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Runner binary could not be started
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Runner exited with a failure status
    #[error("command exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    /// Runner output was not the expected JSON
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other runner failure (used by non-process runners)
    #[error("{0}")]
    Other(String),
}

/// One tabular result row: column name to cell value.
///
/// Columns differ per command (`dir`/`name`/`size` for listings,
/// `filename`/`completed` for transfer status). A missing column reads as
/// the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterRow(HashMap<String, String>);

impl ClusterRow {
    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Cell value, empty when the column is absent
    pub fn get(&self, column: &str) -> &str {
        self.0.get(column).map(String::as_str).unwrap_or("")
    }

    /// True when the column is present
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }
}

/// Raw text response from one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeResponse {
    /// Responding node
    pub host: String,
    /// Free-form response text (may span many lines)
    pub response: String,
    /// Failure reported by the node, if any
    pub error: Option<String>,
}

impl NodeResponse {
    pub fn ok(host: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            response: response.into(),
            error: None,
        }
    }

    pub fn failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            response: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Executes commands against the headnode and the mesh
#[async_trait]
pub trait ClusterRunner: Send + Sync {
    /// Run a command and flatten every node's tabular output into rows.
    ///
    /// Responses carrying a node error contribute no rows.
    async fn run_tabular(&self, command: &str) -> Result<Vec<ClusterRow>, ClusterError>;

    /// Run a command and return each node's raw response
    async fn run(&self, command: &str) -> Result<Vec<NodeResponse>, ClusterError>;
}

/// First node-reported failure in a set of responses
pub fn error_response(responses: &[NodeResponse]) -> Option<String> {
    responses.iter().find_map(|r| {
        let err = r.error.as_deref().filter(|e| !e.is_empty())?;
        Some(if r.host.is_empty() {
            err.to_string()
        } else {
            format!("{} (node {})", err, r.host)
        })
    })
}

/// Response object as printed by `minimega -e .json true <command>`
#[derive(Debug, Clone, Default, Deserialize)]
struct RawResponse {
    #[serde(rename = "Host", default)]
    host: Option<String>,
    #[serde(rename = "Response", default)]
    response: Option<String>,
    #[serde(rename = "Header", default)]
    header: Option<Vec<String>>,
    #[serde(rename = "Tabular", default)]
    tabular: Option<Vec<Vec<String>>>,
    #[serde(rename = "Error", default)]
    error: Option<String>,
}

impl RawResponse {
    fn host(&self) -> String {
        self.host.clone().unwrap_or_default()
    }

    fn error(&self) -> Option<String> {
        self.error.clone().filter(|e| !e.is_empty())
    }

    fn rows(&self) -> Vec<ClusterRow> {
        let (Some(header), Some(tabular)) = (&self.header, &self.tabular) else {
            return Vec::new();
        };

        tabular
            .iter()
            .map(|cells| {
                let mut row =
                    ClusterRow::from_pairs(header.iter().cloned().zip(cells.iter().cloned()));
                row.insert("host", self.host());
                row
            })
            .collect()
    }
}

/// Decode runner output: one JSON array of responses per line
fn parse_output(stdout: &str) -> Result<Vec<RawResponse>, ClusterError> {
    let mut responses = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let batch: Vec<RawResponse> = serde_json::from_str(line)?;
        responses.extend(batch);
    }
    Ok(responses)
}

fn tabular_rows(command: &str, responses: &[RawResponse]) -> Vec<ClusterRow> {
    let mut rows = Vec::new();
    for response in responses {
        if let Some(err) = response.error() {
            warn!(
                command,
                host = %response.host(),
                error = %err,
                "Node reported error, skipping its rows"
            );
            continue;
        }
        rows.extend(response.rows());
    }
    rows
}

fn node_responses(responses: Vec<RawResponse>) -> Vec<NodeResponse> {
    responses
        .into_iter()
        .map(|r| NodeResponse {
            host: r.host(),
            error: r.error(),
            response: r.response.unwrap_or_default(),
        })
        .collect()
}

/// Production runner: shells out to the `minimega` binary
#[derive(Debug, Clone)]
pub struct MinimegaCli {
    binary: PathBuf,
    base: PathBuf,
}

impl MinimegaCli {
    pub fn new(binary: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            base: base.into(),
        }
    }

    /// Runner using the configured binary and base directory
    pub fn from_config(config: &TomlConfig) -> Self {
        Self::new(&config.minimega_path, &config.minimega_base)
    }

    async fn exec(&self, command: &str) -> Result<Vec<RawResponse>, ClusterError> {
        debug!(command, "Running minimega command");

        let output = Command::new(&self.binary)
            .arg("-base")
            .arg(&self.base)
            .arg("-e")
            .arg(format!(".json true {}", command))
            .output()
            .await
            .map_err(|source| ClusterError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClusterError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl ClusterRunner for MinimegaCli {
    async fn run_tabular(&self, command: &str) -> Result<Vec<ClusterRow>, ClusterError> {
        let responses = self.exec(command).await?;
        let rows = tabular_rows(command, &responses);
        debug!(command, rows = rows.len(), "Tabular command complete");
        Ok(rows)
    }

    async fn run(&self, command: &str) -> Result<Vec<NodeResponse>, ClusterError> {
        Ok(node_responses(self.exec(command).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[{"Host":"compute1","Response":"","Header":["dir","name","size"],"Tabular":[["","foo.qc2","1024"],["<dir>","bar","4096"]],"Error":""},{"Host":"compute2","Response":"","Header":null,"Tabular":null,"Error":"no such directory"}]"#;

    #[test]
    fn test_row_missing_column_is_empty() {
        let row = ClusterRow::from_pairs([("name", "foo.qc2")]);
        assert_eq!(row.get("name"), "foo.qc2");
        assert_eq!(row.get("dir"), "");
        assert!(!row.contains("dir"));
    }

    #[test]
    fn test_parse_output_tabular() {
        let responses = parse_output(LISTING).unwrap();
        assert_eq!(responses.len(), 2);

        let rows = tabular_rows("file list", &responses);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), "foo.qc2");
        assert_eq!(rows[0].get("size"), "1024");
        assert_eq!(rows[0].get("host"), "compute1");
        assert_eq!(rows[1].get("dir"), "<dir>");
    }

    #[test]
    fn test_parse_output_multiple_lines() {
        let text = format!("{}\n\n{}\n", LISTING, r#"[{"Host":"head","Response":"ok"}]"#);
        let responses = parse_output(&text).unwrap();
        assert_eq!(responses.len(), 3);
    }

    #[test]
    fn test_parse_output_rejects_garbage() {
        assert!(matches!(parse_output("not json"), Err(ClusterError::Decode(_))));
    }

    #[test]
    fn test_node_responses_keep_errors() {
        let responses = node_responses(parse_output(LISTING).unwrap());
        assert_eq!(responses[0].error, None);
        assert_eq!(responses[1].error.as_deref(), Some("no such directory"));
    }

    #[test]
    fn test_error_response() {
        let ok = vec![NodeResponse::ok("head", "")];
        assert_eq!(error_response(&ok), None);

        let failed = vec![
            NodeResponse::ok("head", ""),
            NodeResponse::failed("compute3", "file not found"),
        ];
        assert_eq!(
            error_response(&failed).as_deref(),
            Some("file not found (node compute3)")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = MinimegaCli::new("/nonexistent/minimega", "/tmp/minimega");
        let err = cli.run("file list").await.unwrap_err();
        assert!(matches!(err, ClusterError::Spawn { .. }));
    }
}
