use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use lcrm_core::DashboardItem;
use lcrm_storage::SessionCookies;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::parse::{parse_dashboard, ROW_SELECTOR};
use crate::{SourceError, StatusSource};

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    /// How long to wait for the table after opening the page (login happens
    /// by hand in that window).
    pub wait_for_rows: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: false,
            wait_for_rows: Duration::from_secs(600),
        }
    }
}

fn browser_error(err: impl std::fmt::Display) -> SourceError {
    SourceError::Browser(err.to_string())
}

async fn open_client(config: &BrowserConfig) -> Result<Client, SourceError> {
    let mut args = vec![
        "--disable-notifications",
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
    ];
    if config.headless {
        args.push("--headless=new");
    }
    let mut caps = serde_json::Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({ "args": args, "excludeSwitches": ["enable-logging", "enable-automation"] }),
    );

    let client = ClientBuilder::rustls()
        .map_err(browser_error)?
        .capabilities(caps)
        .connect(&config.webdriver_url)
        .await
        .map_err(browser_error)?;
    info!(webdriver = %config.webdriver_url, headless = config.headless, "browser session opened");
    Ok(client)
}

/// Returns false on timeout; the caller decides whether that is fatal.
async fn wait_for_rows(client: &Client, timeout: Duration) -> bool {
    client
        .wait()
        .at_most(timeout)
        .for_element(Locator::Css(ROW_SELECTOR))
        .await
        .is_ok()
}

/// Keeps one browser window on the dashboard and re-reads it on every call.
pub struct BrowserDashboardSource {
    client: Client,
    dashboard_url: String,
}

impl BrowserDashboardSource {
    pub async fn connect(
        config: &BrowserConfig,
        dashboard_url: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let dashboard_url = dashboard_url.into();
        let client = open_client(config).await?;
        client.goto(&dashboard_url).await.map_err(browser_error)?;
        if !wait_for_rows(&client, config.wait_for_rows).await {
            warn!(
                waited_secs = config.wait_for_rows.as_secs(),
                "dashboard table did not appear; watching anyway"
            );
        }
        Ok(Self {
            client,
            dashboard_url,
        })
    }

    pub async fn close(self) -> Result<(), SourceError> {
        self.client.close().await.map_err(browser_error)
    }
}

#[async_trait]
impl StatusSource for BrowserDashboardSource {
    fn source_id(&self) -> &'static str {
        "browser"
    }

    async fn fetch_items(&self) -> Result<Vec<DashboardItem>, SourceError> {
        self.client.refresh().await.map_err(browser_error)?;
        let html = self.client.source().await.map_err(browser_error)?;
        let items = parse_dashboard(&html, &self.dashboard_url)?;
        debug!(rows = items.len(), "parsed dashboard from browser");
        Ok(items)
    }
}

/// Opens the login page for a manual sign-in (including the second factor),
/// waits for the dashboard table, and returns the browser's cookies. On
/// timeout whatever cookies exist are still returned.
pub async fn capture_session_cookies(
    config: &BrowserConfig,
    login_url: &str,
) -> Result<SessionCookies, SourceError> {
    let client = open_client(config).await?;
    let captured = async {
        client.goto(login_url).await.map_err(browser_error)?;
        if !wait_for_rows(&client, config.wait_for_rows).await {
            warn!("timed out waiting for the dashboard; saving cookies anyway");
        }
        let cookies = client.get_all_cookies().await.map_err(browser_error)?;
        Ok::<_, SourceError>(SessionCookies(
            cookies
                .iter()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect(),
        ))
    }
    .await;

    if let Err(err) = client.close().await {
        warn!(error = %err, "failed to close browser session");
    }
    captured
}
