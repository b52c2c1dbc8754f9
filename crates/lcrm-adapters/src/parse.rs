use std::str::FromStr;

use lcrm_core::DashboardItem;
use reqwest::Url;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::SourceError;

pub const ROW_SELECTOR: &str = "tr.listing-table-tr";
const LINK_SELECTORS: [&str; 2] = [".item_heading_td .item_heading_link", ".item_heading_link"];
const STATUS_SELECTORS: [&str; 2] = [
    "td.fieldtype_dropdown.field-1284-td",
    ".fieldtype_dropdown.field-1284-td",
];
const PRICE_SELECTORS: [&str; 2] = [
    "td.fieldtype_formula.field-1227-td",
    ".fieldtype_formula.field-1227-td",
];

fn is_dash(ch: char) -> bool {
    matches!(ch, '-' | '\u{2013}' | '\u{2014}')
}

/// Order index embedded in a dashboard title such as `3167ЮВ-393 Гульназ`.
///
/// Takes the digits right after the last hyphen-like separator (`-`, `–`,
/// `—`, optionally followed by whitespace) that is followed by digits. Without
/// such a separator the last run of digits anywhere in the title is used.
pub fn extract_order_index(title: &str) -> Option<String> {
    let chars: Vec<char> = title.chars().collect();

    let mut after_dash = None;
    for (i, ch) in chars.iter().enumerate() {
        if !is_dash(*ch) {
            continue;
        }
        let start = chars[i + 1..]
            .iter()
            .position(|c| !c.is_whitespace())
            .map_or(chars.len(), |offset| i + 1 + offset);
        let digits: String = chars[start..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            after_dash = Some(digits);
        }
    }
    if after_dash.is_some() {
        return after_dash;
    }

    let mut last_run = None;
    let mut current = String::new();
    for ch in chars {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            last_run = Some(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        last_run = Some(current);
    }
    last_run
}

/// First decimal number in a price cell, after dropping whitespace
/// (thousands separators) and reading `,` as the decimal point.
pub fn parse_workshop_price(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let mut number = String::new();
    let mut chars = cleaned.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            number.push(ch);
            continue;
        }
        if number.is_empty() {
            continue;
        }
        if ch == '.' && chars.peek().is_some_and(|next| next.is_ascii_digit()) {
            number.push('.');
            while let Some(next) = chars.next_if(|c| c.is_ascii_digit()) {
                number.push(next);
            }
        }
        break;
    }

    if number.is_empty() {
        return None;
    }
    Decimal::from_str(&number).ok()
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_match<'a>(
    row: ElementRef<'a>,
    selectors: &[Selector],
) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| row.select(sel).next())
}

fn absolute_link(href: &str, base_url: &str) -> String {
    if href.is_empty() {
        return base_url.to_string();
    }
    if href.starts_with("http") {
        return href.to_string();
    }
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Parse the dashboard table into items. Rows without a heading link or an
/// extractable index are dropped; missing status or price cells read as
/// empty text.
pub fn parse_dashboard(html: &str, base_url: &str) -> Result<Vec<DashboardItem>, SourceError> {
    let document = Html::parse_document(html);
    let rows = selector(ROW_SELECTOR)?;
    let links = LINK_SELECTORS
        .iter()
        .map(|css| selector(css))
        .collect::<Result<Vec<_>, _>>()?;
    let statuses = STATUS_SELECTORS
        .iter()
        .map(|css| selector(css))
        .collect::<Result<Vec<_>, _>>()?;
    let prices = PRICE_SELECTORS
        .iter()
        .map(|css| selector(css))
        .collect::<Result<Vec<_>, _>>()?;

    let mut items = Vec::new();
    for row in document.select(&rows) {
        let Some(link) = first_match(row, &links) else {
            continue;
        };
        let title = element_text(link);
        let Some(index) = extract_order_index(&title) else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default().trim();

        items.push(DashboardItem {
            index,
            raw_title: title,
            status_text: first_match(row, &statuses)
                .map(element_text)
                .unwrap_or_default(),
            link: absolute_link(href, base_url),
            workshop_price: first_match(row, &prices)
                .map(element_text)
                .unwrap_or_default(),
        });
    }
    Ok(items)
}

/// True when the page carries a password input, i.e. the dashboard bounced
/// us to its login form.
pub fn looks_like_login_page(html: &str) -> bool {
    let document = Html::parse_document(html);
    Selector::parse(r#"input[type="password"]"#)
        .map(|sel| document.select(&sel).next().is_some())
        .unwrap_or(false)
}
