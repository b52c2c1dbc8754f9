//! Status sources for the external order-tracking dashboard: row parsing,
//! index extraction, status mapping, and the HTTP and browser fetchers.

use std::path::PathBuf;

use async_trait::async_trait;
use lcrm_core::DashboardItem;
use lcrm_storage::{FetchError, SessionError};
use thiserror::Error;

mod browser;
mod http;
pub mod login;
mod parse;
mod status;

pub use browser::{capture_session_cookies, BrowserConfig, BrowserDashboardSource};
pub use http::{FileDashboardSource, HttpDashboardSource};
pub use parse::{
    extract_order_index, looks_like_login_page, parse_dashboard, parse_workshop_price,
    ROW_SELECTOR,
};
pub use status::{StatusMapper, StatusRule};

pub const CRATE_NAME: &str = "lcrm-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("dashboard returned its login form; the saved session has expired")]
    SessionExpired,
    #[error("browser session failed: {0}")]
    Browser(String),
    #[error("invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("reading {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

/// Anything that can produce one batch of dashboard rows per call.
#[async_trait]
pub trait StatusSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_items(&self) -> Result<Vec<DashboardItem>, SourceError>;
}

#[async_trait]
impl<T: StatusSource + ?Sized> StatusSource for Box<T> {
    fn source_id(&self) -> &'static str {
        (**self).source_id()
    }

    async fn fetch_items(&self) -> Result<Vec<DashboardItem>, SourceError> {
        (**self).fetch_items().await
    }
}
