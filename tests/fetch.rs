use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use url::Url;

use imgt_scrape::app::NullSink;
use imgt_scrape::domain::{RawRequest, ScrapeRequest};
use imgt_scrape::error::ScrapeError;
use imgt_scrape::extract::SegmentLink;
use imgt_scrape::fetch::{fetch_segments, prepare_output_dir};
use imgt_scrape::imgt::{ImgtClient, PageResponse, RetryPolicy};

/// Serves a fixed script of responses per segment url.
#[derive(Default)]
struct ScriptedImgt {
    scripts: Mutex<HashMap<String, Vec<Result<PageResponse, ScrapeError>>>>,
}

impl ScriptedImgt {
    fn script(self, url: &Url, responses: Vec<Result<PageResponse, ScrapeError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }
}

impl ImgtClient for ScriptedImgt {
    fn get(&self, url: &Url) -> Result<PageResponse, ScrapeError> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url.as_str()) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Ok(PageResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

fn page(status: u16, body: &str) -> Result<PageResponse, ScrapeError> {
    Ok(PageResponse {
        status,
        body: body.to_string(),
    })
}

fn timeout(url: &Url) -> Result<PageResponse, ScrapeError> {
    Err(ScrapeError::Http {
        url: url.to_string(),
        message: "operation timed out".to_string(),
        transient: true,
    })
}

fn link(segment: &str) -> SegmentLink {
    SegmentLink {
        url: Url::parse(&format!(
            "http://imgt.test/genedb/GENElect?query=7.2+{segment}&species=Mus"
        ))
        .unwrap(),
        segment_name: segment.to_string(),
    }
}

fn request(cwd: &Utf8Path) -> ScrapeRequest {
    let raw = RawRequest {
        species: "mus".to_string(),
        sequence_type: "IG".to_string(),
        ..RawRequest::default()
    };
    ScrapeRequest::from_raw(&raw, cwd).unwrap()
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::ZERO,
    }
}

#[test]
fn every_link_is_either_fetched_or_failed() {
    let temp = tempfile::tempdir().unwrap();
    let cwd = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let request = request(&cwd);
    prepare_output_dir(request.output_dir()).unwrap();

    let links = vec![
        link("IGHV"),
        link("IGHD"),
        link("IGHJ"),
        link("IGKV"),
        link("IGKJ"),
    ];
    let client = ScriptedImgt::default()
        .script(&links[0].url, vec![page(200, "<pre>&gt;h1\nACGT</pre>")])
        .script(
            &links[1].url,
            vec![timeout(&links[1].url), page(503, ""), page(200, "<pre>&gt;d1\nGG</pre>")],
        )
        .script(&links[2].url, vec![page(200, "<html>No sequence</html>")])
        .script(
            &links[3].url,
            vec![timeout(&links[3].url), timeout(&links[3].url), timeout(&links[3].url)],
        );

    let outcome = fetch_segments(&client, &links, &request, policy(), Duration::ZERO, &NullSink);

    assert_eq!(outcome.fetched.len() + outcome.failed.len(), links.len());
    let fetched: Vec<_> = outcome.fetched.iter().map(|f| f.segment_name.as_str()).collect();
    assert_eq!(fetched, vec!["IGHV", "IGHD"]);
    let failed: Vec<_> = outcome.failed.iter().map(|f| f.segment_name.as_str()).collect();
    assert_eq!(failed, vec!["IGHJ", "IGKV", "IGKJ"]);
    assert!(outcome.failed[0].reason.contains("no FASTA block"));
    assert!(outcome.failed[2].reason.contains("404"));

    let ighv = &outcome.fetched[0];
    assert_eq!(ighv.local_path, cwd.join("mus").join("IGHV.fasta"));
    let content = std::fs::read_to_string(ighv.local_path.as_std_path()).unwrap();
    assert_eq!(content, ">h1\nACGT\n");
    assert_eq!(ighv.size_bytes, content.len() as u64);
    assert!(!ighv.reused);
}

#[test]
fn output_dir_creation_failure_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let cwd = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let blocker = cwd.join("mus");
    std::fs::write(blocker.as_std_path(), "file in the way").unwrap();

    let err = prepare_output_dir(&blocker.join("nested")).unwrap_err();
    assert!(matches!(err, ScrapeError::OutputDir { .. }));
}
