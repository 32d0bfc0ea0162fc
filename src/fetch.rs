use std::collections::BTreeMap;
use std::fs;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{FrameSelection, ScrapeRequest};
use crate::error::ScrapeError;
use crate::extract::{SegmentLink, extract_fasta};
use crate::fs_util::write_bytes_atomic;
use crate::imgt::{ImgtClient, RetryPolicy, send_with_retries};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedFile {
    pub local_path: Utf8PathBuf,
    pub segment_name: String,
    pub size_bytes: u64,
    /// Already present from an earlier run and not downloaded again.
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSegment {
    pub segment_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchOutcome {
    pub fetched: Vec<FetchedFile>,
    pub failed: Vec<FailedSegment>,
}

pub const FRAME_MANIFEST: &str = ".imgt-frames.json";

/// Frame selection each segment file in an output directory was fetched with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameManifest {
    pub segments: BTreeMap<String, FrameSelection>,
}

impl FrameManifest {
    pub fn path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(FRAME_MANIFEST)
    }

    /// A missing or unreadable manifest counts as empty, so nothing is reused.
    pub fn load(dir: &Utf8Path, sink: &dyn ProgressSink) -> Self {
        let path = Self::path(dir);
        let Ok(content) = fs::read_to_string(path.as_std_path()) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|err| {
            sink.event(ProgressEvent::warn(format!("ignoring unreadable {path}: {err}")));
            Self::default()
        })
    }

    pub fn save(&self, dir: &Utf8Path) -> Result<(), ScrapeError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| ScrapeError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&Self::path(dir), &content)
    }

    fn matches(&self, segment: &str, frame: FrameSelection) -> bool {
        self.segments.get(segment) == Some(&frame)
    }
}

pub fn prepare_output_dir(dir: &Utf8Path) -> Result<(), ScrapeError> {
    if dir.as_std_path().is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir.as_std_path()).map_err(|err| ScrapeError::OutputDir {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })
}

/// Downloads every link into the request's output directory. A failing
/// segment is recorded and skipped; it never aborts the loop. Existing files
/// are reused only when they were fetched with the same frame selection.
pub fn fetch_segments<C: ImgtClient + ?Sized>(
    client: &C,
    links: &[SegmentLink],
    request: &ScrapeRequest,
    policy: RetryPolicy,
    request_delay: Duration,
    sink: &dyn ProgressSink,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();
    let frame = request.frame_selection();
    let mut manifest = FrameManifest::load(request.output_dir(), sink);
    let mut manifest_changed = false;

    for link in links {
        let path = request.segment_path(&link.segment_name);

        if !request.force()
            && let Ok(meta) = fs::metadata(path.as_std_path())
            && meta.is_file()
        {
            if manifest.matches(&link.segment_name, frame) {
                sink.event(ProgressEvent::info(format!(
                    "{}.fasta already exists, skipping download",
                    link.segment_name
                )));
                outcome.fetched.push(FetchedFile {
                    local_path: path,
                    segment_name: link.segment_name.clone(),
                    size_bytes: meta.len(),
                    reused: true,
                });
                continue;
            }
            sink.event(ProgressEvent::info(format!(
                "{}.fasta was not fetched with frame selection {frame}, downloading again",
                link.segment_name
            )));
        }

        if !request_delay.is_zero() {
            sink.event(ProgressEvent::debug(format!(
                "waiting {} ms before the next IMGT request",
                request_delay.as_millis()
            )));
            thread::sleep(request_delay);
        }

        sink.event(ProgressEvent::info(format!(
            "retrieving {} sequences for {}",
            link.segment_name,
            request.species()
        )));
        match fetch_one(client, link, &path, policy, sink) {
            Ok(size_bytes) => {
                sink.event(ProgressEvent::info(format!(
                    "wrote {} ({size_bytes} bytes)",
                    path
                )));
                manifest.segments.insert(link.segment_name.clone(), frame);
                manifest_changed = true;
                outcome.fetched.push(FetchedFile {
                    local_path: path,
                    segment_name: link.segment_name.clone(),
                    size_bytes,
                    reused: false,
                });
            }
            Err(err) => {
                sink.event(ProgressEvent::error(format!(
                    "failed to fetch {} of {}: {err}",
                    link.segment_name,
                    request.species()
                )));
                outcome.failed.push(FailedSegment {
                    segment_name: link.segment_name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    if manifest_changed
        && let Err(err) = manifest.save(request.output_dir())
    {
        sink.event(ProgressEvent::warn(format!(
            "could not record frame selections in {}: {err}",
            FrameManifest::path(request.output_dir())
        )));
    }

    outcome
}

fn fetch_one<C: ImgtClient + ?Sized>(
    client: &C,
    link: &SegmentLink,
    path: &Utf8Path,
    policy: RetryPolicy,
    sink: &dyn ProgressSink,
) -> Result<u64, ScrapeError> {
    let response = send_with_retries(client, &link.url, policy, sink)?;
    let fasta = extract_fasta(&response.body)
        .ok_or_else(|| ScrapeError::MissingFasta(link.url.to_string()))?;
    let content = format!("{fasta}\n");
    write_bytes_atomic(path, content.as_bytes())?;
    Ok(content.len() as u64)
}
