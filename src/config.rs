use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ScrapeError;

pub const DEFAULT_CONFIG_FILE: &str = "imgt-scrape.json";
pub const DEFAULT_BASE_URL: &str = "https://www.imgt.org";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub library_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub request_delay: Duration,
    /// Where the consolidated library goes; `None` means a `library`
    /// directory next to the output directory.
    pub library_dir: Option<Utf8PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            request_delay: Duration::from_millis(2000),
            library_dir: None,
        }
    }
}

impl Settings {
    pub fn library_dir_for(&self, output_dir: &Utf8Path) -> Utf8PathBuf {
        match &self.library_dir {
            Some(dir) => dir.clone(),
            None => output_dir
                .parent()
                .map(|parent| parent.join("library"))
                .unwrap_or_else(|| Utf8PathBuf::from("library")),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads settings from `path`, or from `imgt-scrape.json` in `cwd` when it
    /// exists. An explicit path that cannot be read is an error; a missing
    /// default file just yields defaults.
    pub fn resolve(path: Option<&str>, cwd: &Utf8Path) -> Result<Settings, ScrapeError> {
        let config_path = match path {
            Some(path) => cwd.join(path),
            None => cwd.join(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|err| ScrapeError::ConfigRead {
                path: config_path.clone(),
                message: err.to_string(),
            })?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ScrapeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, cwd)
    }

    pub fn resolve_config(config: Config, cwd: &Utf8Path) -> Result<Settings, ScrapeError> {
        let defaults = Settings::default();

        let base_url = match config.base_url {
            Some(value) => {
                let url = Url::parse(value.trim())
                    .map_err(|err| ScrapeError::InvalidBaseUrl(format!("{value}: {err}")))?;
                if url.cannot_be_a_base() {
                    return Err(ScrapeError::InvalidBaseUrl(value));
                }
                url
            }
            None => defaults.base_url,
        };

        Ok(Settings {
            base_url,
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            retry_base_delay: config
                .retry_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            request_delay: config
                .request_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            library_dir: config.library_dir.map(|dir| cwd.join(dir)),
        })
    }
}
