//! Daangn region directory, cached in memory with a TTL.
//!
//! Daangn scopes searches to administrative regions addressed by opaque
//! `이름-숫자` codes (e.g. `강남구-10`). The only public source for the full
//! code list is the `/kr/regions/` index page, so this module scrapes it:
//! `<h2>` headings name a city, the `<a href="?in=...">` links under it name
//! its districts. One parsed list serves region resolution for searches and
//! the region REST endpoints.
//!
//! A parse that yields zero entries is treated as a structural break in the
//! upstream markup and never populates the cache; it surfaces as
//! [`RegionError::EmptyParse`] (502 at the REST boundary).

use crate::error::RegionError;
use crate::models::RegionEntry;
use crate::scrapers::build_http_client;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

const DEFAULT_PAGE_URL: &str = "https://www.daangn.com/kr/regions/";

/// Region list cache lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

static REGION_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]in=([^&]+)").expect("valid region link regex"));

struct CachedRegions {
    fetched_at: Instant,
    entries: Arc<Vec<RegionEntry>>,
}

/// TTL-cached view of the Daangn region directory.
pub struct RegionCache {
    http: reqwest::Client,
    page_url: String,
    ttl: Duration,
    slot: RwLock<Option<CachedRegions>>,
}

impl RegionCache {
    pub fn new(ttl: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_http_client("https://www.daangn.com/", false)?,
            page_url: DEFAULT_PAGE_URL.to_string(),
            ttl,
            slot: RwLock::new(None),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_page_url(page_url: &str, ttl: Duration) -> Self {
        Self {
            http: build_http_client(page_url, false).expect("client build"),
            page_url: page_url.to_string(),
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Pre-populate the cache, bypassing the network.
    #[cfg(test)]
    pub(crate) async fn seed(&self, entries: Vec<RegionEntry>) {
        *self.slot.write().await = Some(CachedRegions {
            fetched_at: Instant::now(),
            entries: Arc::new(entries),
        });
    }

    /// The full region list, from cache when fresh.
    ///
    /// A fetch or empty-parse failure never replaces a previously cached
    /// list; it only prevents (re)population.
    #[instrument(skip(self))]
    pub async fn entries(&self) -> Result<Arc<Vec<RegionEntry>>, RegionError> {
        if let Some(cached) = self.slot.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.entries));
            }
        }

        let html = self
            .http
            .get(&self.page_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RegionError::Fetch(e.to_string()))?
            .text()
            .await
            .map_err(|e| RegionError::Fetch(e.to_string()))?;

        let entries = parse_regions_page(&html);
        if entries.is_empty() {
            return Err(RegionError::EmptyParse);
        }
        info!(regions = entries.len(), "region directory loaded");

        let entries = Arc::new(entries);
        *self.slot.write().await = Some(CachedRegions {
            fetched_at: Instant::now(),
            entries: Arc::clone(&entries),
        });
        Ok(entries)
    }

    /// Resolve a caller-supplied region to an upstream code.
    ///
    /// Already-coded input passes through untouched. Names are matched
    /// exactly first, then by substring against district name and full
    /// display name. A miss, or a directory fetch failure, passes the
    /// query through unchanged and lets the upstream interpret it; only an
    /// empty parse propagates.
    pub async fn resolve(&self, query: &str) -> Result<String, RegionError> {
        let query = query.trim();
        if query.is_empty() || is_region_code(query) {
            return Ok(query.to_string());
        }

        let entries = match self.entries().await {
            Ok(entries) => entries,
            Err(RegionError::EmptyParse) => return Err(RegionError::EmptyParse),
            Err(e) => {
                warn!(error = %e, query, "region directory unavailable; passing query through");
                return Ok(query.to_string());
            }
        };

        if let Some(entry) = entries.iter().find(|e| e.name == query) {
            return Ok(entry.code.clone());
        }
        if let Some(entry) = entries
            .iter()
            .find(|e| e.name.contains(query) || e.full.contains(query))
        {
            return Ok(entry.code.clone());
        }
        Ok(query.to_string())
    }

    /// Substring search over district and full names, capped at `limit`.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RegionEntry>, RegionError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.entries().await?;
        Ok(entries
            .iter()
            .filter(|e| e.full.contains(query) || e.name.contains(query))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Cities in first-seen page order.
    pub async fn cities(&self) -> Result<Vec<String>, RegionError> {
        let entries = self.entries().await?;
        Ok(entries.iter().map(|e| e.city.clone()).unique().collect())
    }

    /// Districts of one city; empty when the city is unknown.
    pub async fn districts(&self, city: &str) -> Result<Vec<RegionEntry>, RegionError> {
        let entries = self.entries().await?;
        Ok(entries.iter().filter(|e| e.city == city).cloned().collect())
    }
}

/// `이름-숫자` region codes pass through resolution untouched.
pub(crate) fn is_region_code(query: &str) -> bool {
    match query.rsplit_once('-') {
        Some((name, digits)) => {
            !name.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Walk the regions page in document order: each `<h2>` starts a city
/// section, each `?in=` link under it is one district. Codes are deduped
/// first-seen.
fn parse_regions_page(html: &str) -> Vec<RegionEntry> {
    static SECTION_SELECTOR: Lazy<Selector> =
        Lazy::new(|| Selector::parse("main h2, main a").expect("valid region selector"));
    static FALLBACK_SELECTOR: Lazy<Selector> =
        Lazy::new(|| Selector::parse("h2, a").expect("valid region fallback selector"));

    let document = Html::parse_document(html);
    let mut elements: Vec<_> = document.select(&SECTION_SELECTOR).collect();
    if elements.is_empty() {
        elements = document.select(&FALLBACK_SELECTOR).collect();
    }

    let mut results = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut current_city = String::new();

    for element in elements {
        match element.value().name() {
            "h2" => {
                current_city = element.text().collect::<String>().trim().to_string();
            }
            "a" if !current_city.is_empty() => {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let Some(caps) = REGION_CODE_RE.captures(href) else {
                    continue;
                };
                let code = match urlencoding::decode(&caps[1]) {
                    Ok(decoded) => decoded.into_owned(),
                    Err(_) => continue,
                };
                let Some((name, digits)) = code.rsplit_once('-') else {
                    continue;
                };
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    continue;
                }
                if !seen.insert(code.clone()) {
                    continue;
                }
                results.push(RegionEntry {
                    name: name.to_string(),
                    full: format!("{current_city} {name}"),
                    code,
                    city: current_city.clone(),
                });
            }
            _ => {}
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REGIONS_HTML: &str = r#"<html><body><main>
        <h2>서울특별시</h2>
        <ul>
          <li><a href="/kr/buy-sell/?in=%EA%B0%95%EB%82%A8%EA%B5%AC-10">강남구</a></li>
          <li><a href="/kr/buy-sell/?in=%EC%84%9C%EC%B4%88%EA%B5%AC-11">서초구</a></li>
          <li><a href="/kr/buy-sell/?in=%EA%B0%95%EB%82%A8%EA%B5%AC-10">강남구 (중복)</a></li>
          <li><a href="/kr/about">코드 없는 링크</a></li>
        </ul>
        <h2>경기도</h2>
        <ul>
          <li><a href="/kr/buy-sell/?in=%EC%84%B1%EB%82%A8%EC%8B%9C-330">성남시</a></li>
        </ul>
    </main></body></html>"#;

    fn sample_entries() -> Vec<RegionEntry> {
        parse_regions_page(REGIONS_HTML)
    }

    #[test]
    fn test_parse_regions_page() {
        let entries = sample_entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "강남구");
        assert_eq!(entries[0].code, "강남구-10");
        assert_eq!(entries[0].city, "서울특별시");
        assert_eq!(entries[0].full, "서울특별시 강남구");
        assert_eq!(entries[2].city, "경기도");
    }

    #[test]
    fn test_parse_ignores_links_before_first_heading() {
        let html = r#"<main><a href="?in=%EC%96%B4%EB%94%94-1">어디</a><h2>서울</h2></main>"#;
        assert!(parse_regions_page(html).is_empty());
    }

    #[test]
    fn test_is_region_code() {
        assert!(is_region_code("강남구-10"));
        assert!(is_region_code("세종-1"));
        assert!(!is_region_code("강남구"));
        assert!(!is_region_code("강남-구"));
        assert!(!is_region_code("-10"));
    }

    #[tokio::test]
    async fn test_resolve_passthrough_for_codes() {
        let cache = RegionCache::with_page_url("http://unused.invalid/", DEFAULT_TTL);
        assert_eq!(cache.resolve("서초4동-366").await.unwrap(), "서초4동-366");
    }

    #[tokio::test]
    async fn test_resolve_exact_before_substring() {
        let cache = RegionCache::with_page_url("http://unused.invalid/", DEFAULT_TTL);
        cache.seed(sample_entries()).await;
        assert_eq!(cache.resolve("강남구").await.unwrap(), "강남구-10");
        // Substring hit against the full display name.
        assert_eq!(cache.resolve("서초").await.unwrap(), "서초구-11");
        // Unknown names pass through for the upstream to interpret.
        assert_eq!(cache.resolve("판교").await.unwrap(), "판교");
    }

    #[tokio::test]
    async fn test_resolve_passthrough_when_fetch_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let cache = RegionCache::with_page_url(&format!("{}/kr/regions/", server.uri()), DEFAULT_TTL);
        assert_eq!(cache.resolve("강남구").await.unwrap(), "강남구");
    }

    #[tokio::test]
    async fn test_entries_empty_parse_is_error_and_uncached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kr/regions/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let cache = RegionCache::with_page_url(&format!("{}/kr/regions/", server.uri()), DEFAULT_TTL);
        assert!(matches!(cache.entries().await, Err(RegionError::EmptyParse)));
        assert!(cache.slot.read().await.is_none());
    }

    #[tokio::test]
    async fn test_entries_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kr/regions/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REGIONS_HTML))
            .expect(1)
            .mount(&server)
            .await;

        let cache = RegionCache::with_page_url(&format!("{}/kr/regions/", server.uri()), DEFAULT_TTL);
        assert_eq!(cache.entries().await.unwrap().len(), 3);
        // Served from cache; the mock allows exactly one hit.
        assert_eq!(cache.entries().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_entries_refetched_after_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kr/regions/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REGIONS_HTML))
            .expect(2)
            .mount(&server)
            .await;

        let cache =
            RegionCache::with_page_url(&format!("{}/kr/regions/", server.uri()), Duration::ZERO);
        cache.entries().await.unwrap();
        cache.entries().await.unwrap();
    }

    #[tokio::test]
    async fn test_cities_and_districts() {
        let cache = RegionCache::with_page_url("http://unused.invalid/", DEFAULT_TTL);
        cache.seed(sample_entries()).await;

        assert_eq!(cache.cities().await.unwrap(), vec!["서울특별시", "경기도"]);
        let districts = cache.districts("서울특별시").await.unwrap();
        assert_eq!(districts.len(), 2);
        assert!(cache.districts("없는도시").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_limit() {
        let cache = RegionCache::with_page_url("http://unused.invalid/", DEFAULT_TTL);
        cache.seed(sample_entries()).await;

        let hits = cache.search("구", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(cache.search("", 10).await.unwrap().is_empty());
    }
}
