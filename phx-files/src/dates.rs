//! File modification dates from remote directory listings
//!
//! minimega's `file list` carries no timestamps, so dates come from running
//! `ls -alht --full-time` on every node. Lines look like
//!
//! ```text
//! -rw-r--r-- 1 root root 1.1K 2024-01-02 03:04:05.123456789 -0700 foo.pcap
//! ```
//!
//! Fields are whitespace separated, so filenames containing whitespace are
//! not recovered correctly.

use crate::catalog::Catalog;
use crate::cluster::ClusterRunner;
use crate::error::{FilesError, FilesResult};
use crate::types::ExperimentFile;
use chrono::NaiveDateTime;
use std::path::Path;
use tracing::{debug, warn};

/// Layout of the date/time columns once the fractional seconds are dropped
pub const LISTING_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MIN_FIELDS: usize = 9;
const DATE_FIELD: usize = 5;
const TIME_FIELD: usize = 6;
const NAME_FIELD: usize = 8;

/// One file line of a long listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    /// `YYYY-MM-DD HH:MM:SS`
    pub date: String,
    /// `date` parsed with [`LISTING_DATE_FORMAT`], absent if it did not parse
    pub date_time: Option<NaiveDateTime>,
}

/// Parse one line of `ls -alht --full-time` output.
///
/// Returns `None` for short lines (`total 12`, blank lines) and directories.
pub fn parse_listing_line(line: &str) -> Option<ListingEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS || fields[0].starts_with('d') {
        return None;
    }

    let stamp = format!("{} {}", fields[DATE_FIELD], fields[TIME_FIELD]);
    let date = stamp.split('.').next().unwrap_or_default().to_string();
    let date_time = NaiveDateTime::parse_from_str(&date, LISTING_DATE_FORMAT).ok();

    Some(ListingEntry {
        name: fields[NAME_FIELD].to_string(),
        date,
        date_time,
    })
}

/// Parse every file line of a listing
pub fn parse_listing(text: &str) -> Vec<ListingEntry> {
    text.lines().filter_map(parse_listing_line).collect()
}

/// Attach listed dates to catalog entries with the same name.
///
/// Returns the number of entries updated. Names not in the catalog are
/// ignored; a later entry for the same name overwrites an earlier one.
pub fn apply_dates(files: &mut Catalog<ExperimentFile>, entries: &[ListingEntry]) -> usize {
    let mut updated = 0;
    for entry in entries {
        if let Some(file) = files.get_mut(&entry.name) {
            if entry.date_time.is_none() {
                debug!(file = %entry.name, date = %entry.date, "Unparsable listing date");
            }
            file.date = entry.date.clone();
            file.date_time = entry.date_time;
            updated += 1;
        }
    }
    updated
}

/// Mesh listing first, then the headnode
pub fn listing_commands(dir: &Path) -> [String; 2] {
    let ls = format!("shell ls -alht --full-time {}", dir.display());
    [format!("mesh send all {}", ls), ls]
}

/// Fill in modification dates for every cataloged file found under `dir`
/// on any node.
///
/// Nodes that report an error (typically: the directory does not exist
/// there) are skipped. A runner failure aborts.
pub async fn fill_in_file_dates(
    runner: &dyn ClusterRunner,
    dir: &Path,
    files: &mut Catalog<ExperimentFile>,
) -> FilesResult<()> {
    for command in listing_commands(dir) {
        let responses = runner
            .run(&command)
            .await
            .map_err(|e| FilesError::transport("listing experiment file dates", e))?;

        for response in responses {
            if let Some(err) = &response.error {
                warn!(host = %response.host, error = %err, "Skipping date listing from node");
                continue;
            }
            if response.response.is_empty() {
                continue;
            }

            let entries = parse_listing(&response.response);
            let updated = apply_dates(files, &entries);
            debug!(host = %response.host, listed = entries.len(), updated, "Applied file dates");
        }
    }

    Ok(())
}
