use std::collections::BTreeMap;
use std::fs::File;

use bio::io::fasta;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::ScrapeError;
use crate::fetch::FetchedFile;
use crate::fs_util::write_bytes_atomic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRecord {
    pub id: String,
    pub description: Option<String>,
    pub residues: Vec<u8>,
    /// Segment file the record was read from.
    pub segment_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: Utf8PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryOutcome {
    pub path: Utf8PathBuf,
    pub records: usize,
    pub files_used: usize,
    pub skipped: Vec<SkippedFile>,
    /// Ids seen more than once; every copy is kept in the library.
    pub duplicate_ids: Vec<String>,
}

pub fn read_records(file: &FetchedFile) -> Result<Vec<LibraryRecord>, ScrapeError> {
    let fasta_error = |message: String| ScrapeError::Fasta {
        path: file.local_path.clone(),
        message,
    };
    let handle = File::open(file.local_path.as_std_path())
        .map_err(|err| fasta_error(err.to_string()))?;

    let mut records = Vec::new();
    for result in fasta::Reader::new(handle).records() {
        let record = result.map_err(|err| fasta_error(err.to_string()))?;
        record.check().map_err(|msg| fasta_error(msg.to_string()))?;
        records.push(LibraryRecord {
            id: record.id().to_string(),
            description: record.desc().map(str::to_string),
            residues: record.seq().to_vec(),
            segment_name: file.segment_name.clone(),
        });
    }
    Ok(records)
}

/// Concatenates the records of `files`, in order, into `destination`.
///
/// Unreadable, malformed and empty inputs are skipped with a warning. Only a
/// failure to write the library itself is an error.
pub fn build_library(
    files: &[FetchedFile],
    destination: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<LibraryOutcome, ScrapeError> {
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut files_used = 0usize;

    for file in files {
        match read_records(file) {
            Ok(batch) if batch.is_empty() => {
                sink.event(ProgressEvent::warn(format!(
                    "{} holds no sequences, leaving it out of the library",
                    file.local_path
                )));
                skipped.push(SkippedFile {
                    path: file.local_path.clone(),
                    reason: "no records".to_string(),
                });
            }
            Ok(batch) => {
                sink.event(ProgressEvent::debug(format!(
                    "library.add file={} records={}",
                    file.local_path,
                    batch.len()
                )));
                files_used += 1;
                records.extend(batch);
            }
            Err(err) => {
                sink.event(ProgressEvent::warn(format!(
                    "skipping {}: {err}",
                    file.local_path
                )));
                skipped.push(SkippedFile {
                    path: file.local_path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let duplicate_ids = duplicate_ids(&records);
    if !duplicate_ids.is_empty() {
        sink.event(ProgressEvent::warn(format!(
            "library keeps {} duplicated record id(s): {}",
            duplicate_ids.len(),
            duplicate_ids.join(", ")
        )));
    }

    let buffer = render(&records)?;
    write_bytes_atomic(destination, &buffer)?;

    if records.is_empty() {
        sink.event(ProgressEvent::warn(format!(
            "library {destination} is empty: no sequences were retrieved"
        )));
    } else {
        sink.event(ProgressEvent::info(format!(
            "library {destination} written with {} records from {files_used} files",
            records.len()
        )));
    }

    Ok(LibraryOutcome {
        path: destination.to_path_buf(),
        records: records.len(),
        files_used,
        skipped,
        duplicate_ids,
    })
}

fn render(records: &[LibraryRecord]) -> Result<Vec<u8>, ScrapeError> {
    let mut buffer = Vec::new();
    {
        let mut writer = fasta::Writer::new(&mut buffer);
        for record in records {
            writer
                .write(&record.id, record.description.as_deref(), &record.residues)
                .map_err(|err| ScrapeError::Filesystem(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| ScrapeError::Filesystem(err.to_string()))?;
    }
    Ok(buffer)
}

fn duplicate_ids(records: &[LibraryRecord]) -> Vec<String> {
    let mut counts = BTreeMap::<&str, usize>::new();
    for record in records {
        *counts.entry(record.id.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect()
}
