//! Scripted username/password login against the dashboard, with the optional
//! one-time-code step.

use std::path::Path;

use lcrm_storage::{FetchError, HttpClientConfig, SessionCookies, SessionError, SessionFetcher};
use reqwest::Url;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::info;

const USERNAME_KEYS: [&str; 5] = ["username", "user_name", "login", "email", "phone"];
const PASSWORD_KEYS: [&str; 3] = ["password", "passwd", "pwd"];
const OTP_KEYS: [&str; 4] = ["otp", "code", "sms", "whatsapp"];

#[derive(Debug, Error)]
pub enum LoginError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("the dashboard asks for a one-time code; rerun with --otp <code>")]
    OtpRequired,
    #[error("no form to submit the one-time code into")]
    OtpFormMissing,
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub otp: Option<String>,
}

/// Submission target and named inputs of a page's first form, in document
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl FormFields {
    fn set(&mut self, key: &str, value: &str) {
        match self.fields.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.fields.push((key.to_string(), value.to_string())),
        }
    }

    fn keys(&self) -> impl Iterator<Item = &str> + Clone {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

fn resolve(action: &str, base: &str) -> String {
    if action.starts_with("http") {
        return action.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(action))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| base.to_string())
}

/// First `<form>` of the page, or `None` when there is none.
pub fn first_form(html: &str, page_url: &str) -> Option<FormFields> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").ok()?;
    let input_sel = Selector::parse("input[name]").ok()?;
    let form = document.select(&form_sel).next()?;

    let action = form
        .value()
        .attr("action")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map_or_else(|| page_url.to_string(), |a| resolve(a, page_url));

    let mut fields = FormFields {
        action,
        fields: Vec::new(),
    };
    for input in form.select(&input_sel) {
        let Some(name) = input.value().attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        fields.set(name, input.value().attr("value").unwrap_or_default());
    }
    Some(fields)
}

/// Exact (case-insensitive) key match first, then substring match.
pub fn find_field_key<'a>(
    keys: impl IntoIterator<Item = &'a str> + Clone,
    preferred: &[&str],
) -> Option<&'a str> {
    let exact = keys.clone().into_iter().find(|key| {
        let lower = key.to_lowercase();
        preferred.iter().any(|p| lower == *p)
    });
    exact.or_else(|| {
        keys.into_iter().find(|key| {
            let lower = key.to_lowercase();
            preferred.iter().any(|p| lower.contains(p))
        })
    })
}

pub fn page_requires_otp(html: &str) -> bool {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse("input[name]") else {
        return false;
    };
    document.select(&sel).any(|input| {
        input.value().attr("name").is_some_and(|name| {
            let lower = name.to_lowercase();
            lower.contains("otp") || lower.contains("code")
        })
    })
}

/// Runs the login flow on `fetcher`; its cookie jar holds the session after
/// success.
pub async fn login_with_credentials(
    fetcher: &SessionFetcher,
    login_url: &str,
    credentials: &Credentials,
) -> Result<(), LoginError> {
    let page = fetcher.get(login_url).await?;
    let mut form = first_form(&page.body, login_url).unwrap_or_else(|| FormFields {
        action: login_url.to_string(),
        fields: Vec::new(),
    });

    let username_key = find_field_key(form.keys(), &USERNAME_KEYS)
        .unwrap_or("username")
        .to_string();
    let password_key = find_field_key(form.keys(), &PASSWORD_KEYS)
        .unwrap_or("password")
        .to_string();
    form.set(&username_key, &credentials.username);
    form.set(&password_key, &credentials.password);

    let response = fetcher.post_form(&form.action, &form.fields).await?;
    if !page_requires_otp(&response.body) {
        info!("logged in without a second factor");
        return Ok(());
    }

    let code = credentials.otp.as_deref().ok_or(LoginError::OtpRequired)?;
    let mut otp_form = first_form(&response.body, login_url).ok_or(LoginError::OtpFormMissing)?;
    let otp_key = find_field_key(otp_form.keys(), &OTP_KEYS)
        .unwrap_or("otp")
        .to_string();
    otp_form.set(&otp_key, code);
    fetcher.post_form(&otp_form.action, &otp_form.fields).await?;
    info!("logged in with one-time code");
    Ok(())
}

/// Logs in with a fresh client and persists the resulting cookies.
pub async fn login_and_save(
    config: HttpClientConfig,
    login_url: &str,
    credentials: &Credentials,
    cookies_path: &Path,
) -> Result<SessionCookies, LoginError> {
    let fetcher = SessionFetcher::new(config)?;
    login_with_credentials(&fetcher, login_url, credentials).await?;
    let cookies = fetcher.export_cookies(login_url)?;
    cookies.save(cookies_path).await?;
    info!(
        cookies = cookies.0.len(),
        path = %cookies_path.display(),
        "saved dashboard session"
    );
    Ok(cookies)
}
