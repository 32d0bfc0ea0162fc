use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::Settings;
use crate::domain::{FrameSelection, Species};
use crate::error::{ScrapeError, is_retryable_status};

const GENELECT_PATH: &str = "genedb/GENElect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking GET against the database. Implementations report transport
/// failures as `ScrapeError::Http` and leave status handling to the caller.
pub trait ImgtClient: Send + Sync {
    fn get(&self, url: &Url) -> Result<PageResponse, ScrapeError>;
}

#[derive(Clone)]
pub struct ImgtHttpClient {
    client: Client,
}

impl ImgtHttpClient {
    pub fn new(settings: &Settings) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("imgt-scrape/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ScrapeError::Http {
                url: settings.base_url.to_string(),
                message: err.to_string(),
                transient: false,
            })?;
        Ok(Self { client })
    }
}

impl ImgtClient for ImgtHttpClient {
    fn get(&self, url: &Url) -> Result<PageResponse, ScrapeError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|err| ScrapeError::Http {
                url: url.to_string(),
                message: err.to_string(),
                transient: is_retryable_error(&err),
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| ScrapeError::Http {
            url: url.to_string(),
            message: err.to_string(),
            transient: err.is_timeout(),
        })?;
        Ok(PageResponse { status, body })
    }
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.retry_base_delay,
        }
    }

    fn delay(&self, attempt: usize) -> Duration {
        self.base_delay * (attempt as u32 + 1)
    }
}

/// GETs `url`, retrying transient failures with linear backoff. Any final
/// non-success status comes back as `ScrapeError::Status`.
pub fn send_with_retries<C: ImgtClient + ?Sized>(
    client: &C,
    url: &Url,
    policy: RetryPolicy,
    sink: &dyn ProgressSink,
) -> Result<PageResponse, ScrapeError> {
    let mut attempt = 0usize;
    loop {
        match client.get(url) {
            Ok(response) => {
                if attempt < policy.max_retries && is_retryable_status(response.status) {
                    sink.event(ProgressEvent::debug(format!(
                        "imgt.retry status={} attempt={} url={url}",
                        response.status,
                        attempt + 1
                    )));
                    thread::sleep(policy.delay(attempt));
                    attempt += 1;
                    continue;
                }
                if !response.is_success() {
                    return Err(ScrapeError::Status {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                return Ok(response);
            }
            Err(err) => {
                if attempt < policy.max_retries && err.is_transient() {
                    sink.event(ProgressEvent::debug(format!(
                        "imgt.retry error=\"{err}\" attempt={}",
                        attempt + 1
                    )));
                    thread::sleep(policy.delay(attempt));
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

/// GENElect endpoint below `base`, tolerating bases with or without a
/// trailing slash.
pub fn genelect_url(base: &Url) -> Result<Url, ScrapeError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(GENELECT_PATH)
        .map_err(|err| ScrapeError::InvalidBaseUrl(err.to_string()))
}

pub fn listing_url(base: &Url, species: &Species) -> Result<Url, ScrapeError> {
    let mut url = genelect_url(base)?;
    url.query_pairs_mut().append_pair("species", species.as_str());
    Ok(url)
}

/// Direct GENElect query for one segment, as the listing page links it.
pub fn segment_url(
    base: &Url,
    species: &Species,
    frame: FrameSelection,
    segment: &str,
) -> Result<Url, ScrapeError> {
    let mut url = genelect_url(base)?;
    url.query_pairs_mut()
        .append_pair("query", &format!("{} {segment}", frame.query_code()))
        .append_pair("species", species.as_str());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::app::NullSink;

    struct Scripted {
        responses: Mutex<Vec<Result<PageResponse, ScrapeError>>>,
        calls: Mutex<usize>,
    }

    impl ImgtClient for Scripted {
        fn get(&self, _url: &Url) -> Result<PageResponse, ScrapeError> {
            *self.calls.lock().unwrap() += 1;
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn ok(status: u16) -> Result<PageResponse, ScrapeError> {
        Ok(PageResponse {
            status,
            body: String::new(),
        })
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn listing_url_encodes_species() {
        let base = Url::parse("https://www.imgt.org").unwrap();
        let species: Species = "homo sapiens".parse().unwrap();
        let url = listing_url(&base, &species).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.imgt.org/genedb/GENElect?species=Homo+sapiens"
        );
    }

    #[test]
    fn segment_url_carries_frame_code() {
        let base = Url::parse("https://www.imgt.org/").unwrap();
        let species: Species = "mus".parse().unwrap();
        let url = segment_url(&base, &species, FrameSelection::InFrameGaps, "IGKV").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.imgt.org/genedb/GENElect?query=7.1+IGKV&species=Mus"
        );
    }

    #[test]
    fn http_client_builds_with_defaults() {
        assert!(ImgtHttpClient::new(&Settings::default()).is_ok());
    }

    #[test]
    fn genelect_url_keeps_base_path() {
        let base = Url::parse("http://mirror.local/imgt").unwrap();
        let url = genelect_url(&base).unwrap();
        assert_eq!(url.as_str(), "http://mirror.local/imgt/genedb/GENElect");
    }

    #[test]
    fn retries_server_errors_then_succeeds() {
        let client = Scripted {
            responses: Mutex::new(vec![ok(503), ok(502), ok(200)]),
            calls: Mutex::new(0),
        };
        let url = Url::parse("http://localhost/x").unwrap();
        let response = send_with_retries(&client, &url, policy(), &NullSink).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(*client.calls.lock().unwrap(), 3);
    }

    #[test]
    fn not_found_is_not_retried() {
        let client = Scripted {
            responses: Mutex::new(vec![ok(404)]),
            calls: Mutex::new(0),
        };
        let url = Url::parse("http://localhost/x").unwrap();
        let err = send_with_retries(&client, &url, policy(), &NullSink).unwrap_err();
        assert!(matches!(err, ScrapeError::Status { status: 404, .. }));
        assert_eq!(*client.calls.lock().unwrap(), 1);
    }

    #[test]
    fn gives_up_after_bound() {
        let transient = || {
            Err(ScrapeError::Http {
                url: "http://localhost/x".to_string(),
                message: "timed out".to_string(),
                transient: true,
            })
        };
        let client = Scripted {
            responses: Mutex::new(vec![transient(), transient(), transient()]),
            calls: Mutex::new(0),
        };
        let url = Url::parse("http://localhost/x").unwrap();
        let err = send_with_retries(&client, &url, policy(), &NullSink).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(*client.calls.lock().unwrap(), 3);
    }
}
