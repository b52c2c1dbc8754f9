//! Persistence and HTTP session plumbing: the `CrmStore` repository, the
//! cookie-backed dashboard session, and raw page snapshots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::{StatusCode, Url};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

mod pg;
mod store;

pub use pg::PgStore;
pub use store::{CrmStore, MemoryStore, PaymentUpsert, StoreError, UpsertOutcome};

pub const CRATE_NAME: &str = "lcrm-storage";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129 Safari/537.36";

/// Write bytes next to `path` under a unique temp name, then rename into place.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!("renaming {} -> {}", temp_path.display(), path.display())
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed store for raw dashboard pages, kept for selector debugging.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn snapshot_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        source: &str,
        content_hash: &str,
    ) -> PathBuf {
        PathBuf::from(fetched_at.format("%Y%m%d").to_string())
            .join(source)
            .join(format!("{content_hash}.html"))
    }

    pub async fn store_page(
        &self,
        fetched_at: DateTime<Utc>,
        source: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredSnapshot> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.snapshot_relative_path(fetched_at, source, &content_hash);
        let absolute_path = self.root.join(&relative_path);

        let deduplicated = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking snapshot path {}", absolute_path.display()))?;
        if !deduplicated {
            write_atomic(&absolute_path, bytes).await?;
        }

        Ok(StoredSnapshot {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated,
        })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no saved session at {0}; log in first")]
    Missing(PathBuf),
    #[error("session file {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Name/value cookie pairs persisted between process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionCookies(pub BTreeMap<String, String>);

impl SessionCookies {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `Cookie:` header value (`a=1; b=2`).
    pub fn from_header(header: &str) -> Self {
        let pairs = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self(pairs)
    }

    pub async fn load(path: &Path) -> Result<Self, SessionError> {
        if !fs::try_exists(path)
            .await
            .with_context(|| format!("checking session file {}", path.display()))?
        {
            return Err(SessionError::Missing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading session file {}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| SessionError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(self).context("serializing session cookies")?;
        write_atomic(path, &bytes).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub verify_tls: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify_tls: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

/// Cookie-carrying HTTP session against the external dashboard. A single
/// request per call, no retries: a failure belongs to the current tick.
#[derive(Debug, Clone)]
pub struct SessionFetcher {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl SessionFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ru,ru-RU;q=0.9,en;q=0.8"),
        );
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client, jar })
    }

    fn parse_url(url: &str) -> Result<Url, FetchError> {
        Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))
    }

    pub fn install_cookies(&self, cookies: &SessionCookies, url: &str) -> Result<(), FetchError> {
        let url = Self::parse_url(url)?;
        for (name, value) in &cookies.0 {
            self.jar.add_cookie_str(&format!("{name}={value}"), &url);
        }
        Ok(())
    }

    pub fn export_cookies(&self, url: &str) -> Result<SessionCookies, FetchError> {
        let url = Self::parse_url(url)?;
        Ok(self
            .jar
            .cookies(&url)
            .and_then(|header| header.to_str().ok().map(SessionCookies::from_header))
            .unwrap_or_default())
    }

    pub async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let span = info_span!("http_get", url);
        async {
            let resp = self.client.get(url).send().await?;
            Self::into_page(resp).await
        }
        .instrument(span)
        .await
    }

    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<FetchedPage, FetchError> {
        let span = info_span!("http_post_form", url, fields = form.len());
        async {
            let resp = self.client.post(url).form(form).send().await?;
            Self::into_page(resp).await
        }
        .instrument(span)
        .await
    }

    async fn into_page(resp: reqwest::Response) -> Result<FetchedPage, FetchError> {
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = resp.text().await?;
        debug!(%final_url, bytes = body.len(), "fetched page");
        Ok(FetchedPage {
            status,
            final_url,
            body,
            fetched_at: Utc::now(),
        })
    }
}
