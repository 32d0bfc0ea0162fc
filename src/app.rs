use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::cleanup::{CleanupOutcome, cleanup_fetched};
use crate::config::Settings;
use crate::domain::{FrameSelection, RawRequest, ScrapeRequest, SequenceType};
use crate::error::ScrapeError;
use crate::extract::{SegmentLink, extract_links};
use crate::fetch::{FailedSegment, FetchedFile, fetch_segments, prepare_output_dir};
use crate::imgt::{ImgtClient, RetryPolicy, listing_url, segment_url, send_with_retries};
use crate::library::{LibraryOutcome, build_library};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: Level,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(Level::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Level::Critical, message)
    }
}

/// Logging handle passed down the pipeline.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    Validating,
    Locating,
    Extracting,
    Fetching,
    Building,
    Cleaning,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LibraryStatus {
    NotRequested,
    /// The library was already on disk and `force` was not set.
    Existing { path: Utf8PathBuf },
    Built(LibraryOutcome),
    Failed { path: Utf8PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupStatus {
    NotRequested,
    Skipped { reason: String },
    Done(CleanupOutcome),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub species: String,
    pub sequence_type: SequenceType,
    pub frame_selection: FrameSelection,
    pub output_dir: Utf8PathBuf,
    pub listing_url: Option<String>,
    pub requested: usize,
    pub fetched: Vec<FetchedFile>,
    pub failed: Vec<FailedSegment>,
    pub library: LibraryStatus,
    pub cleanup: CleanupStatus,
    pub stages: Vec<Stage>,
    pub finished_at: String,
}

impl RunReport {
    fn new(request: &ScrapeRequest) -> Self {
        Self {
            species: request.species().to_string(),
            sequence_type: request.sequence_type(),
            frame_selection: request.frame_selection(),
            output_dir: request.output_dir().to_path_buf(),
            listing_url: None,
            requested: 0,
            fetched: Vec::new(),
            failed: Vec::new(),
            library: LibraryStatus::NotRequested,
            cleanup: CleanupStatus::NotRequested,
            stages: vec![Stage::Init, Stage::Validating],
            finished_at: String::new(),
        }
    }

    pub fn downloaded(&self) -> usize {
        self.fetched.iter().filter(|file| !file.reused).count()
    }

    pub fn reused(&self) -> usize {
        self.fetched.iter().filter(|file| file.reused).count()
    }

    pub fn has_warnings(&self) -> bool {
        !self.failed.is_empty()
            || self.requested == 0
            || matches!(self.library, LibraryStatus::Failed { .. })
            || matches!(&self.library, LibraryStatus::Built(outcome) if outcome.records == 0
                || !outcome.skipped.is_empty()
                || !outcome.duplicate_ids.is_empty())
            || matches!(&self.cleanup, CleanupStatus::Done(outcome) if !outcome.warnings.is_empty())
    }
}

#[derive(Clone)]
pub struct App<C: ImgtClient> {
    client: C,
    settings: Settings,
}

impl<C: ImgtClient> App<C> {
    pub fn new(client: C, settings: Settings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Validates `raw` and runs the pipeline. Nothing touches the network or
    /// the filesystem until validation has passed.
    pub fn run(
        &self,
        raw: &RawRequest,
        cwd: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, ScrapeError> {
        sink.event(ProgressEvent::debug("phase=Validating"));
        let request = ScrapeRequest::from_raw(raw, cwd).inspect_err(|err| {
            sink.event(ProgressEvent::critical(format!("phase=Failed; {err}")));
        })?;
        sink.event(ProgressEvent::info(format!(
            "selected species: {} and type: {}",
            request.species(),
            request.sequence_type()
        )));
        self.execute(&request, sink)
    }

    pub fn execute(
        &self,
        request: &ScrapeRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, ScrapeError> {
        let mut report = RunReport::new(request);
        let policy = RetryPolicy::from_settings(&self.settings);
        let library_path = self
            .settings
            .library_dir_for(request.output_dir())
            .join(request.library_file_name());

        if request.create_library() && !request.force() && library_path.as_std_path().exists() {
            sink.event(ProgressEvent::info(format!(
                "{library_path} already exists; remove it or pass --force to download the files again"
            )));
            report.library = LibraryStatus::Existing { path: library_path };
            if request.cleanup() {
                report.cleanup = CleanupStatus::Skipped {
                    reason: "library already exists".to_string(),
                };
            }
            return Ok(finish(report, sink));
        }

        enter(&mut report, Stage::Locating, sink);
        let url = listing_url(&self.settings.base_url, request.species()).inspect_err(|err| {
            fail(sink, err);
        })?;
        report.listing_url = Some(url.to_string());
        let listing = send_with_retries(&self.client, &url, policy, sink).map_err(|err| {
            let err = ScrapeError::ListingUnavailable {
                species: request.species().to_string(),
                url: url.to_string(),
                reason: err.to_string(),
            };
            fail(sink, &err);
            err
        })?;

        enter(&mut report, Stage::Extracting, sink);
        let mut links = extract_links(
            &listing.body,
            &url,
            request.sequence_type(),
            request.frame_selection(),
            sink,
        );
        if links.is_empty() {
            sink.event(ProgressEvent::warn(format!(
                "no {} segment links found for {} ({})",
                request.sequence_type(),
                request.species(),
                request.frame_selection()
            )));
        } else {
            sink.event(ProgressEvent::info(format!(
                "found {} segment links: {}",
                links.len(),
                links
                    .iter()
                    .map(|link| link.segment_name.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            )));
        }

        // catalog segments the listing does not link are queried directly
        let listed = links.len();
        for segment in request.sequence_type().segments() {
            if links.iter().any(|link| link.segment_name == *segment) {
                continue;
            }
            let url = segment_url(
                &self.settings.base_url,
                request.species(),
                request.frame_selection(),
                segment,
            )
            .inspect_err(|err| fail(sink, err))?;
            links.push(SegmentLink {
                url,
                segment_name: segment.to_string(),
            });
        }
        if links.len() > listed {
            sink.event(ProgressEvent::info(format!(
                "listing has no entry for {}; querying GENElect directly",
                links[listed..]
                    .iter()
                    .map(|link| link.segment_name.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            )));
        }
        report.requested = links.len();

        enter(&mut report, Stage::Fetching, sink);
        if !request.output_dir().as_std_path().exists() {
            sink.event(ProgressEvent::info(format!(
                "folder {} does not exist, creating it",
                request.output_dir()
            )));
        }
        prepare_output_dir(request.output_dir()).inspect_err(|err| fail(sink, err))?;
        let outcome = fetch_segments(
            &self.client,
            &links,
            request,
            policy,
            self.settings.request_delay,
            sink,
        );
        report.fetched = outcome.fetched;
        report.failed = outcome.failed;

        let mut library_failed = false;
        if request.create_library() {
            enter(&mut report, Stage::Building, sink);
            sink.event(ProgressEvent::info("creating a library from the retrieved files"));
            report.library = match build_library(&report.fetched, &library_path, sink) {
                Ok(outcome) => LibraryStatus::Built(outcome),
                Err(err) => {
                    library_failed = true;
                    sink.event(ProgressEvent::error(format!(
                        "library build failed: {err}"
                    )));
                    LibraryStatus::Failed {
                        path: library_path,
                        reason: err.to_string(),
                    }
                }
            };
        }

        if request.cleanup() {
            if library_failed {
                sink.event(ProgressEvent::warn(
                    "keeping the segment files because the library was not built",
                ));
                report.cleanup = CleanupStatus::Skipped {
                    reason: "library build failed".to_string(),
                };
            } else {
                enter(&mut report, Stage::Cleaning, sink);
                report.cleanup = CleanupStatus::Done(cleanup_fetched(
                    &report.fetched,
                    request.output_dir(),
                    sink,
                ));
            }
        }

        Ok(finish(report, sink))
    }
}

fn enter(report: &mut RunReport, stage: Stage, sink: &dyn ProgressSink) {
    sink.event(ProgressEvent::debug(format!("phase={stage:?}")));
    report.stages.push(stage);
}

fn fail(sink: &dyn ProgressSink, err: &ScrapeError) {
    sink.event(ProgressEvent::critical(format!("phase=Failed; {err}")));
}

fn finish(mut report: RunReport, sink: &dyn ProgressSink) -> RunReport {
    report.stages.push(Stage::Done);
    report.finished_at = chrono::Utc::now().to_rfc3339();

    let summary = format!(
        "segments requested={} fetched={} failed={}",
        report.requested,
        report.fetched.len(),
        report.failed.len()
    );
    if report.failed.is_empty() {
        sink.event(ProgressEvent::info(summary));
    } else {
        let names = report
            .failed
            .iter()
            .map(|failed| failed.segment_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        sink.event(ProgressEvent::warn(format!("{summary} ({names})")));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imgt::PageResponse;
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    #[derive(Default)]
    struct CountingClient {
        calls: Mutex<usize>,
    }

    impl ImgtClient for CountingClient {
        fn get(&self, _url: &Url) -> Result<PageResponse, ScrapeError> {
            *self.calls.lock().unwrap() += 1;
            Ok(PageResponse {
                status: 404,
                body: String::new(),
            })
        }
    }

    fn settings() -> Settings {
        Settings {
            max_retries: 0,
            retry_base_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            ..Settings::default()
        }
    }

    #[test]
    fn missing_listing_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let cwd = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let app = App::new(CountingClient::default(), settings());
        let raw = RawRequest {
            species: "Mus".to_string(),
            sequence_type: "IG".to_string(),
            ..RawRequest::default()
        };

        let err = app.run(&raw, &cwd, &NullSink).unwrap_err();
        assert!(matches!(err, ScrapeError::ListingUnavailable { ref species, .. } if species == "Mus"));
        assert_eq!(*app.client().calls.lock().unwrap(), 1);
        assert!(!cwd.join("mus").as_std_path().exists());
    }
}
