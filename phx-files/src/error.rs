//! Error types for phx-files
//!
//! Every cluster call is wrapped with a short stage message naming what was
//! being attempted ("listing images", "deleting file from cluster nodes", ...)
//! so the caller sees where an operation stopped.

use crate::cluster::ClusterError;
use std::num::ParseIntError;
use thiserror::Error;

/// Library error type
#[derive(Debug, Error)]
pub enum FilesError {
    /// Required argument was empty; no cluster command was issued
    #[error("no {0} provided")]
    MissingArgument(&'static str),

    /// The command runner could not execute the command
    #[error("{stage}: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: ClusterError,
    },

    /// A node executed the command and reported a failure
    #[error("{stage}: {message}")]
    Node { stage: &'static str, message: String },

    /// Image size column was not an integer
    #[error("getting size of file {name}: {source}")]
    InvalidSize {
        name: String,
        #[source]
        source: ParseIntError,
    },

    /// Transfer polling stopped by the caller
    #[error("transfer of {0} cancelled")]
    Cancelled(String),

    /// Transfer polling exceeded its time bound
    #[error("transfer of {0} timed out")]
    TimedOut(String),

    /// Nested call failed
    #[error("{stage}: {source}")]
    Nested {
        stage: &'static str,
        #[source]
        source: Box<FilesError>,
    },
}

impl FilesError {
    /// Wrap a runner failure with the stage that issued the command
    pub fn transport(stage: &'static str, source: ClusterError) -> Self {
        FilesError::Transport { stage, source }
    }

    /// Wrap a node-reported failure with the stage that issued the command
    pub fn node(stage: &'static str, message: impl Into<String>) -> Self {
        FilesError::Node {
            stage,
            message: message.into(),
        }
    }

    /// Wrap an error from a nested operation
    pub fn nested(stage: &'static str, source: FilesError) -> Self {
        FilesError::Nested {
            stage,
            source: Box::new(source),
        }
    }
}

/// Result type for library operations
pub type FilesResult<T> = Result<T, FilesError>;
