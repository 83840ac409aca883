//! File transfer orchestration
//!
//! A copy is started with `file get` on the destination node. There is no
//! completion event: the destination's `file status` table lists the file
//! while parts are still arriving and drops the row once the transfer is
//! done, so the transfer is polled until its row disappears.

use crate::cluster::{error_response, ClusterRow, ClusterRunner};
use crate::error::{FilesError, FilesResult};
use crate::types::CopyStatus;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Node that should end up holding the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    Headnode,
    Mesh(String),
}

impl TransferTarget {
    pub fn get_command(&self, path: &str) -> String {
        match self {
            TransferTarget::Headnode => format!("file get {}", path),
            TransferTarget::Mesh(node) => format!("mesh send {} file get {}", node, path),
        }
    }

    pub fn status_command(&self) -> String {
        match self {
            TransferTarget::Headnode => "file status".to_string(),
            TransferTarget::Mesh(node) => format!("mesh send {} file status", node),
        }
    }
}

/// Polling behaviour for [`copy_file`]
///
/// The default polls continuously with no time bound and no cancellation.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Stop waiting after this long
    pub timeout: Option<Duration>,
    /// Stop waiting when cancelled
    pub cancel: Option<CancellationToken>,
}

/// Fraction from a `completed` cell written as `done/total`.
///
/// Unparsable numbers count as zero, and a zero total yields 0.0, so the
/// value is not guaranteed to lie in `[0, 1]`.
pub fn parse_completed(completed: &str) -> f64 {
    let mut parts = completed.splitn(2, '/');
    let mut number = || {
        parts
            .next()
            .and_then(|p| p.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let done = number();
    let total = number();

    if total == 0.0 {
        0.0
    } else {
        done / total
    }
}

/// Progress of `path` in a status table, `None` once the row is gone
pub fn find_progress(rows: &[ClusterRow], path: &str) -> Option<f64> {
    rows.iter()
        .find(|row| row.get("filename") == path)
        .map(|row| parse_completed(row.get("completed")))
}

async fn pause(options: &TransferOptions) {
    if options.poll_interval.is_zero() {
        tokio::task::yield_now().await;
        return;
    }

    match &options.cancel {
        Some(cancel) => {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }
        None => tokio::time::sleep(options.poll_interval).await,
    }
}

/// Start fetching `path` onto `target` and wait until it has arrived,
/// reporting each observed progress fraction through `status`
pub async fn copy_file(
    runner: &dyn ClusterRunner,
    path: &str,
    target: &TransferTarget,
    status: Option<&CopyStatus>,
    options: &TransferOptions,
) -> FilesResult<()> {
    let get = target.get_command(path);
    debug!(command = %get, "Starting file transfer");

    let responses = runner
        .run(&get)
        .await
        .map_err(|e| FilesError::transport("copying file to destination", e))?;
    if let Some(err) = error_response(&responses) {
        return Err(FilesError::node("copying file to destination", err));
    }

    let status_command = target.status_command();
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let mut polls = 0u64;

    loop {
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(FilesError::Cancelled(path.to_string()));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(FilesError::TimedOut(path.to_string()));
        }

        let rows = runner
            .run_tabular(&status_command)
            .await
            .map_err(|e| FilesError::transport("polling file transfer status", e))?;
        polls += 1;

        let Some(fraction) = find_progress(&rows, path) else {
            break;
        };

        trace!(file = path, fraction, "Transfer progress");
        if let Some(status) = status {
            status(fraction);
        }

        pause(options).await;
    }

    info!(file = path, polls, "File transfer complete");
    Ok(())
}

/// Fetch `path` onto every mesh node.
///
/// Per-node progress is not tracked; `status` is accepted but never called.
pub async fn sync_file(
    runner: &dyn ClusterRunner,
    path: &str,
    status: Option<&CopyStatus>,
) -> FilesResult<()> {
    let command = format!("mesh send all file get {}", path);
    debug!(command = %command, "Syncing file to mesh");

    let responses = runner
        .run(&command)
        .await
        .map_err(|e| FilesError::transport("syncing file to cluster nodes", e))?;
    if let Some(err) = error_response(&responses) {
        return Err(FilesError::node("syncing file to cluster nodes", err));
    }

    if status.is_some() {
        debug!(file = path, "Sync progress is not reported per node");
    }

    info!(file = path, "File sync started on mesh nodes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        let head = TransferTarget::Headnode;
        assert_eq!(head.get_command("/a.qc2"), "file get /a.qc2");
        assert_eq!(head.status_command(), "file status");

        let mesh = TransferTarget::Mesh("compute2".to_string());
        assert_eq!(mesh.get_command("/a.qc2"), "mesh send compute2 file get /a.qc2");
        assert_eq!(mesh.status_command(), "mesh send compute2 file status");
    }

    #[test]
    fn test_parse_completed() {
        assert_eq!(parse_completed("50/100"), 0.5);
        assert_eq!(parse_completed("3/3"), 1.0);
        assert_eq!(parse_completed("x/100"), 0.0);
        assert_eq!(parse_completed("5/0"), 0.0);
        assert_eq!(parse_completed("5"), 0.0);
        assert_eq!(parse_completed(""), 0.0);
    }

    #[test]
    fn test_find_progress() {
        let rows = vec![
            ClusterRow::from_pairs([("filename", "/other"), ("completed", "1/2")]),
            ClusterRow::from_pairs([("filename", "/a.qc2"), ("completed", "1/4")]),
        ];
        assert_eq!(find_progress(&rows, "/a.qc2"), Some(0.25));
        assert_eq!(find_progress(&rows, "/missing"), None);
    }
}
