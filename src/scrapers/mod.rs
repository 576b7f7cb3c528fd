//! Marketplace source clients.
//!
//! One submodule per upstream, each with the same structural contract but
//! different internals:
//!
//! | Source | Module | Primary strategy | Fallback strategy |
//! |--------|--------|------------------|-------------------|
//! | 중고나라 (Joongna) | [`joongna`] | `__NEXT_DATA__` page-state JSON | (none) |
//! | 번개장터 (Bunjang) | [`bunjang`] | public `find_v2` JSON API | `__NEXT_DATA__` page-state JSON |
//! | 당근 (Daangn) | [`daangn`] | `window.__remixContext` JSON | raw HTML card scraping |
//!
//! Every client exposes keyword `search`, sequential `search_all` paging,
//! and (where the upstream supports keyword-less browsing) category-recent
//! collection through the fan-out layer. All outbound requests pass through
//! the client's own [`crate::throttle::Throttle`]. Parse failures degrade to
//! empty results with a logged diagnostic; they are never surfaced as errors
//! from `search`.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub mod bunjang;
pub mod daangn;
pub mod joongna;

/// Browser-like user agent shared by all clients; the upstreams reject
/// obvious bot agents.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Caller-facing sort vocabulary, mapped per source onto upstream tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Recommend,
    Recent,
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    /// Parse a query-string value. Unknown values fall back to the default
    /// ("recommend") rather than failing.
    pub fn from_param(value: &str) -> Self {
        match value {
            "recent" => SortOrder::Recent,
            "price_asc" => SortOrder::PriceAsc,
            "price_desc" => SortOrder::PriceDesc,
            _ => SortOrder::Recommend,
        }
    }

    /// Bunjang `order` token.
    pub fn bunjang_token(self) -> &'static str {
        match self {
            SortOrder::Recommend => "score",
            SortOrder::Recent => "date",
            SortOrder::PriceAsc => "price",
            SortOrder::PriceDesc => "price_desc",
        }
    }

    /// Joongna `sort` token.
    pub fn joongna_token(self) -> &'static str {
        match self {
            SortOrder::Recommend => "RECOMMEND_SORT",
            SortOrder::Recent => "RECENT_SORT",
            SortOrder::PriceAsc => "PRICE_ASC_SORT",
            SortOrder::PriceDesc => "PRICE_DESC_SORT",
        }
    }
}

/// Open upper bound for price filters; a `max_price` at or above this value
/// means "no ceiling" and is omitted from upstream queries.
pub const MAX_PRICE_OPEN: u64 = 100_000_000;

/// Keyword-search parameters shared by the Joongna and Bunjang clients.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// 1-based page, regardless of how the upstream counts pages.
    pub page: u32,
    pub count: u32,
    pub sort: SortOrder,
    pub category: Option<u32>,
    pub min_price: u64,
    pub max_price: u64,
    /// Drop already-sold listings. Defaults on.
    pub exclude_sold: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page: 1,
            count: 50,
            sort: SortOrder::default(),
            category: None,
            min_price: 0,
            max_price: MAX_PRICE_OPEN,
            exclude_sold: true,
        }
    }
}

/// Parameters for keyword-less recent-listing collection via category
/// fan-out.
#[derive(Debug, Clone)]
pub struct RecentOptions {
    /// Per-category fetch count, before the source's own clamp.
    pub count: u32,
    /// Category codes to fan out over; `None` means the source's full set.
    pub categories: Option<Vec<u32>>,
    pub min_price: u64,
    pub max_price: u64,
    pub exclude_sold: bool,
    pub max_workers: usize,
    /// Only keep listings registered within the last N minutes.
    pub within_minutes: Option<u32>,
}

impl Default for RecentOptions {
    fn default() -> Self {
        Self {
            count: 30,
            categories: None,
            min_price: 0,
            max_price: MAX_PRICE_OPEN,
            exclude_sold: true,
            max_workers: 5,
            within_minutes: None,
        }
    }
}

/// Build the per-source HTTP client with the source's header set.
pub(crate) fn build_http_client(
    referer: &str,
    accept_json: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};

    let mut headers = HeaderMap::new();
    let accept = if accept_json {
        "application/json, text/plain, */*"
    } else {
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
    };
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(REFERER, value.clone());
        if accept_json {
            headers.insert(ORIGIN, value);
        }
    }

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

static NEXT_DATA_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script#__NEXT_DATA__").expect("valid __NEXT_DATA__ selector")
});

/// Locate and parse the `__NEXT_DATA__` embedded page-state blob.
pub(crate) fn extract_next_data(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let script = document.select(&NEXT_DATA_SELECTOR).next()?;
    let raw = script.text().collect::<String>();
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "__NEXT_DATA__ present but not valid JSON");
            None
        }
    }
}

/// Walk into `props.pageProps.dehydratedState.queries`, the react-query
/// dehydration array both Next.js upstreams embed their results in.
pub(crate) fn dehydrated_queries(next_data: &Value) -> &[Value] {
    next_data
        .pointer("/props/pageProps/dehydratedState/queries")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Render a JSON value that may be a string or a number as a plain string.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Parse a price field that may arrive as a number, a numeric string, or a
/// decorated string ("1,234원"). Non-digits are stripped; unparseable → 0.
pub(crate) fn parse_price(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Truthiness for upstream flags that may be a bool, `"Y"`, `1`, etc.
pub(crate) fn value_to_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.as_str(), "Y" | "y" | "true" | "1"),
        _ => false,
    }
}
