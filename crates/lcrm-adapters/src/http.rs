use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use lcrm_core::DashboardItem;
use lcrm_storage::{HttpClientConfig, SessionCookies, SessionFetcher, SnapshotStore};
use tracing::{debug, info, warn};

use crate::parse::{looks_like_login_page, parse_dashboard};
use crate::{SourceError, StatusSource};

async fn keep_snapshot(store: Option<&SnapshotStore>, source: &str, body: &str) {
    let Some(store) = store else {
        return;
    };
    match store.store_page(Utc::now(), source, body.as_bytes()).await {
        Ok(snapshot) => debug!(
            path = %snapshot.relative_path.display(),
            deduplicated = snapshot.deduplicated,
            "stored dashboard snapshot"
        ),
        Err(err) => warn!(error = %err, "failed to store dashboard snapshot"),
    }
}

/// Pulls the dashboard over a cookie session restored from disk.
pub struct HttpDashboardSource {
    fetcher: SessionFetcher,
    dashboard_url: String,
    snapshots: Option<SnapshotStore>,
}

impl HttpDashboardSource {
    /// Restores the saved session. A missing cookie file fails here, once,
    /// rather than on every tick.
    pub async fn connect(
        config: HttpClientConfig,
        cookies_path: &Path,
        dashboard_url: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let dashboard_url = dashboard_url.into();
        let cookies = SessionCookies::load(cookies_path).await?;
        let fetcher = SessionFetcher::new(config)?;
        fetcher.install_cookies(&cookies, &dashboard_url)?;
        info!(
            cookies = cookies.0.len(),
            path = %cookies_path.display(),
            "restored dashboard session"
        );
        Ok(Self {
            fetcher,
            dashboard_url,
            snapshots: None,
        })
    }

    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }
}

#[async_trait]
impl StatusSource for HttpDashboardSource {
    fn source_id(&self) -> &'static str {
        "http"
    }

    async fn fetch_items(&self) -> Result<Vec<DashboardItem>, SourceError> {
        let page = self.fetcher.get(&self.dashboard_url).await?;
        keep_snapshot(self.snapshots.as_ref(), self.source_id(), &page.body).await;

        let items = parse_dashboard(&page.body, &self.dashboard_url)?;
        if items.is_empty() && looks_like_login_page(&page.body) {
            return Err(SourceError::SessionExpired);
        }
        debug!(rows = items.len(), final_url = %page.final_url, "parsed dashboard");
        Ok(items)
    }
}

/// Reads a saved dashboard page from disk. Used to replay snapshots.
#[derive(Debug, Clone)]
pub struct FileDashboardSource {
    path: PathBuf,
    base_url: String,
}

impl FileDashboardSource {
    pub fn new(path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl StatusSource for FileDashboardSource {
    fn source_id(&self) -> &'static str {
        "file"
    }

    async fn fetch_items(&self) -> Result<Vec<DashboardItem>, SourceError> {
        let html = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Read {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        parse_dashboard(&html, &self.base_url)
    }
}
