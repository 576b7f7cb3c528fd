//! 당근 (Daangn/Karrot) client.
//!
//! Daangn has no public search API at all. Search results are read from the
//! Remix page state (`window.__remixContext`) embedded in the server-rendered
//! search page; when that blob is missing or unreadable, a best-effort HTML
//! card scrape takes over. The HTML path deals with two upstream quirks:
//! titles occasionally arrive mojibake'd (latin-1 decoded Hangul) and are
//! recovered from the product URL slug, and prices sometimes render inside
//! the title line instead of their own line.
//!
//! Region scoping goes through [`RegionCache`]: callers may pass either a
//! district name ("서초4동") or a ready-made upstream code ("서초4동-366").

use crate::error::SourceError;
use crate::models::{format_price_krw, Listing, ListingStatus};
use crate::regions::RegionCache;
use crate::scrapers::build_http_client;
use crate::throttle::Throttle;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_BASE_URL: &str = "https://www.daangn.com";

/// Category code → display name, from the site's category filter.
pub const CATEGORIES: &[(u32, &str)] = &[
    (1, "디지털기기"),
    (172, "생활가전"),
    (8, "가구/인테리어"),
    (7, "생활/주방"),
    (4, "유아동"),
    (173, "유아도서"),
    (5, "여성의류"),
    (31, "여성잡화"),
    (14, "남성패션/잡화"),
    (6, "뷰티/미용"),
    (3, "스포츠/레저"),
    (2, "취미/게임/음반"),
    (9, "도서"),
    (304, "티켓/교환권"),
    (517, "e쿠폰"),
    (305, "가공식품"),
    (483, "건강기능식품"),
    (16, "반려동물용품"),
    (139, "식물"),
    (13, "기타 중고물품"),
    (32, "삽니다"),
];

static REMIX_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.__remixContext\s*=\s*(\{.*?\});").expect("valid remix-context regex")
});
static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d,]+)\s*원").expect("valid price regex"));
static PRICE_IN_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d,]+)원$").expect("valid trailing-price regex"));
static SLUG_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+$").expect("valid slug-suffix regex"));
/// Location token ending in an administrative suffix, optionally followed by
/// a relative registration time ("진영읍 · 끌올 15분 전").
static CARD_DESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([가-힣\w]+[읍면동구시리])(?:\s*·?\s*(끌올\s*)?((?:\d+(?:분|시간|일|주|개월))? 전|방금 전))?")
        .expect("valid card-desc regex")
});

/// Search parameters for Daangn. Unlike the other sources there is no sort
/// or count control; the upstream decides both.
#[derive(Debug, Clone, Default)]
pub struct DaangnSearchOptions {
    /// District name or region code; resolved through the region directory.
    pub region: Option<String>,
    /// 1-based page.
    pub page: u32,
    pub category: Option<u32>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    /// "거래 가능만 보기" filter.
    pub only_on_sale: bool,
}

/// Daangn marketplace client.
pub struct DaangnClient {
    http: reqwest::Client,
    base_url: String,
    throttle: Arc<Throttle>,
    regions: Arc<RegionCache>,
}

impl DaangnClient {
    pub fn new(
        min_request_interval: Duration,
        regions: Arc<RegionCache>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_http_client("https://www.daangn.com/", false)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            throttle: Arc::new(Throttle::new(min_request_interval)),
            regions,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: &str, regions: Arc<RegionCache>) -> Self {
        Self {
            http: build_http_client(base_url, false).expect("client build"),
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle: Arc::new(Throttle::new(Duration::ZERO)),
            regions,
        }
    }

    /// Static category code → name map.
    pub fn categories(&self) -> &'static [(u32, &'static str)] {
        CATEGORIES
    }

    /// Keyword search, optionally region-scoped.
    ///
    /// Transport failures degrade to empty; only a structurally broken
    /// region directory propagates as an error.
    #[instrument(skip(self, options), fields(page = options.page))]
    pub async fn search(
        &self,
        keyword: &str,
        options: &DaangnSearchOptions,
    ) -> Result<Vec<Listing>, SourceError> {
        let region_code = match &options.region {
            Some(region) => Some(self.regions.resolve(region).await?),
            None => None,
        };

        self.throttle.acquire().await;
        let url = build_search_url(&self.base_url, keyword, region_code.as_deref(), options);
        let html = match self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    warn!(error = %e, "search response unreadable");
                    return Ok(Vec::new());
                }
            },
            Err(e) => {
                warn!(error = %e, "search request failed");
                return Ok(Vec::new());
            }
        };

        let results = parse_listings(&html, &self.base_url);
        info!(keyword, results = results.len(), "search complete");
        Ok(results)
    }

    /// Sequential multi-page search; stops early at the first empty page.
    pub async fn search_all(
        &self,
        keyword: &str,
        max_pages: u32,
        options: &DaangnSearchOptions,
    ) -> Result<Vec<Listing>, SourceError> {
        let mut all = Vec::new();
        for page in 1..=max_pages.max(1) {
            let mut page_options = options.clone();
            page_options.page = page;
            let results = self.search(keyword, &page_options).await?;
            if results.is_empty() {
                break;
            }
            all.extend(results);
        }
        Ok(all)
    }
}

/// Assemble the `/kr/buy-sell/s/` search URL. The price filter is a single
/// `min__max` range parameter with either side omittable.
fn build_search_url(
    base_url: &str,
    keyword: &str,
    region_code: Option<&str>,
    options: &DaangnSearchOptions,
) -> String {
    let mut url = url::Url::parse(&format!("{base_url}/kr/buy-sell/s/"))
        .expect("base search URL is valid");
    {
        let mut query = url.query_pairs_mut();
        if !keyword.is_empty() {
            query.append_pair("search", keyword);
        }
        if let Some(code) = region_code.filter(|c| !c.is_empty()) {
            query.append_pair("in", code);
        }
        if let Some(category) = options.category {
            query.append_pair("category_id", &category.to_string());
        }
        match (options.min_price, options.max_price) {
            (Some(min), Some(max)) => {
                query.append_pair("price", &format!("{min}__{max}"));
            }
            (Some(min), None) => {
                query.append_pair("price", &format!("{min}__"));
            }
            (None, Some(max)) => {
                query.append_pair("price", &format!("0__{max}"));
            }
            (None, None) => {}
        }
        if options.only_on_sale {
            query.append_pair("only_on_sale", "true");
        }
        if options.page > 1 {
            query.append_pair("page", &options.page.to_string());
        }
    }
    url.to_string()
}

/// Parse a search page: Remix page state first, HTML cards as fallback.
fn parse_listings(html: &str, base_url: &str) -> Vec<Listing> {
    if let Some(results) = parse_remix_context(html, base_url) {
        return results;
    }
    debug!("no usable __remixContext; falling back to HTML card scrape");
    parse_html_cards(html, base_url)
}

/// Read `window.__remixContext` and walk to the flea-market article list
/// under the buy-sell route's loader data. `None` means the blob is absent
/// or holds no articles, and the HTML fallback should run.
fn parse_remix_context(html: &str, base_url: &str) -> Option<Vec<Listing>> {
    let caps = REMIX_CONTEXT_RE.captures(html)?;
    let data: Value = serde_json::from_str(&caps[1]).ok()?;

    let loader_data = data.pointer("/state/loaderData")?.as_object()?;
    let articles = loader_data
        .iter()
        .filter(|(route, _)| route.contains("buy-sell"))
        .find_map(|(_, route_data)| {
            route_data
                .pointer("/allPage/fleamarketArticles")
                .and_then(Value::as_array)
                .filter(|articles| !articles.is_empty())
        })?;

    let results = articles
        .iter()
        .filter_map(|art| {
            let title = art
                .get("title")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())?
                .to_string();
            let path = art.get("id").and_then(Value::as_str).unwrap_or("");
            let id = path.trim_matches('/').rsplit('/').next().unwrap_or("").to_string();

            // Prices arrive as float strings ("15000.0").
            let price = art
                .get("price")
                .and_then(|v| match v {
                    Value::String(s) => s.parse::<f64>().ok(),
                    Value::Number(n) => n.as_f64(),
                    _ => None,
                })
                .map(|f| f.max(0.0) as u64)
                .unwrap_or(0);

            let status = match art.get("status").and_then(Value::as_str) {
                Some("Ongoing") | None => ListingStatus::OnSale,
                Some("Reserved") => ListingStatus::Reserved,
                Some("Closed") | Some("Sold") => ListingStatus::Sold,
                Some(_) => ListingStatus::Unknown,
            };

            // Bumped listings sort by their bump time, not creation time.
            let time = art
                .get("boostedAt")
                .and_then(Value::as_str)
                .or_else(|| art.get("createdAt").and_then(Value::as_str))
                .map(str::to_string);

            Some(Listing {
                url: if path.is_empty() {
                    String::new()
                } else {
                    format!("{base_url}{path}")
                },
                id,
                title,
                price_str: daangn_price_str(price),
                price,
                status,
                image_url: art
                    .get("thumbnail")
                    .and_then(Value::as_str)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
                location: art
                    .pointer("/region/name")
                    .and_then(Value::as_str)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
                time,
                seller: None,
                likes: 0,
                views: 0,
                safe_payment: false,
                free_shipping: false,
                category: None,
                source: None,
            })
        })
        .collect();
    Some(results)
}

/// Scrape product anchor cards straight out of the HTML.
fn parse_html_cards(html: &str, base_url: &str) -> Vec<Listing> {
    static ANCHOR_SELECTOR: Lazy<Selector> =
        Lazy::new(|| Selector::parse("a[href]").expect("valid anchor selector"));
    static IMG_SELECTOR: Lazy<Selector> =
        Lazy::new(|| Selector::parse("img").expect("valid img selector"));
    static CARD_DESC_SELECTOR: Lazy<Selector> =
        Lazy::new(|| Selector::parse("div.card-desc").expect("valid card-desc selector"));

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for link in document.select(&ANCHOR_SELECTOR) {
        let href = link.value().attr("href").unwrap_or("");
        if !is_product_href(href) {
            continue;
        }

        let (image_url, img_alt) = link
            .select(&IMG_SELECTOR)
            .next()
            .map(|img| {
                let src = img
                    .value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
                    .unwrap_or("")
                    .to_string();
                let alt = img.value().attr("alt").unwrap_or("").to_string();
                (src, alt)
            })
            .unwrap_or_default();

        let lines = text_lines(&link);
        if lines.is_empty() {
            continue;
        }

        let (status, title_start) = match lines[0].as_str() {
            "예약중" => (ListingStatus::Reserved, 1),
            "판매완료" | "거래완료" => (ListingStatus::Sold, 1),
            _ => (ListingStatus::OnSale, 0),
        };

        let mut title = lines.get(title_start).cloned().unwrap_or_default();
        if title.is_empty() || title == "thumbnail" {
            if !img_alt.is_empty() && img_alt != "thumbnail" {
                title = img_alt;
            } else {
                continue;
            }
        }
        if is_garbled(&title) {
            let slug_title = title_from_slug(href);
            if !slug_title.is_empty() {
                title = slug_title;
            }
        }

        let mut price: u64 = 0;
        let mut price_str = "가격미정".to_string();
        for line in &lines[(title_start + 1).min(lines.len())..] {
            if let Some(caps) = PRICE_RE.captures(line) {
                price = caps[1].replace(',', "").parse().unwrap_or(0);
                price_str = format_price_krw(price);
                break;
            }
            if line.contains("나눔") {
                price_str = "나눔🧡".to_string();
                break;
            }
        }
        // Some cards render the price inside the title line.
        if price == 0 {
            let trailing = PRICE_IN_TITLE_RE
                .captures(&title)
                .map(|caps| (caps[1].replace(',', ""), caps[0].len()));
            if let Some((digits, matched_len)) = trailing {
                price = digits.parse().unwrap_or(0);
                price_str = format_price_krw(price);
                title = title[..title.len() - matched_len].trim().to_string();
            }
        }

        let (location, time_ago) = link
            .select(&CARD_DESC_SELECTOR)
            .next()
            .map(|desc| {
                let text = text_lines(&desc).join(" ");
                match CARD_DESC_RE.captures(&text) {
                    Some(caps) => (
                        caps.get(1).map(|m| m.as_str().to_string()),
                        caps.get(3).map(|m| m.as_str().to_string()),
                    ),
                    None => (None, None),
                }
            })
            .unwrap_or((None, None));

        let full_url = if href.starts_with('/') {
            format!("{base_url}{href}")
        } else {
            href.to_string()
        };
        let id = href.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string();

        results.push(Listing {
            id,
            title,
            price,
            price_str,
            status,
            image_url: Some(image_url).filter(|u| !u.is_empty()),
            location,
            time: time_ago,
            url: full_url,
            seller: None,
            likes: 0,
            views: 0,
            safe_payment: false,
            free_shipping: false,
            category: None,
            source: None,
        });
    }

    results
}

fn daangn_price_str(price: u64) -> String {
    if price == 0 {
        "나눔🧡".to_string()
    } else {
        format_price_krw(price)
    }
}

/// Product detail links, excluding the `/s/` search pages themselves.
fn is_product_href(href: &str) -> bool {
    let Some(rest) = href.strip_prefix("/kr/buy-sell/") else {
        return false;
    };
    if rest.is_empty() || rest.starts_with('?') {
        return false;
    }
    !(rest == "s" || rest.starts_with("s/") || rest.starts_with("s?"))
}

/// Mojibake detector: a run of latin-1 high bytes with no Hangul at all
/// means the title was decoded with the wrong charset.
fn is_garbled(text: &str) -> bool {
    let garbled = text
        .chars()
        .filter(|c| (128..256).contains(&(*c as u32)))
        .count();
    let korean = text
        .chars()
        .filter(|c| ('\u{ac00}'..='\u{d7a3}').contains(c))
        .count();
    garbled > 2 && korean == 0
}

/// Rebuild a readable title from the product URL slug: drop the trailing
/// hash segment (≥8 chars of `[a-z0-9]`) and turn dashes into spaces.
fn title_from_slug(href: &str) -> String {
    let slug = href.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if slug.is_empty() {
        return String::new();
    }
    let decoded = match urlencoding::decode(slug) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => slug.to_string(),
    };
    let base = match decoded.rsplit_once('-') {
        Some((head, tail)) if tail.len() >= 8 && SLUG_SUFFIX_RE.is_match(tail) => head,
        _ => &decoded,
    };
    base.replace('-', " ").trim().to_string()
}

/// All non-empty trimmed text lines of an element, in document order.
fn text_lines(element: &ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::DEFAULT_TTL;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn default_options() -> DaangnSearchOptions {
        DaangnSearchOptions {
            page: 1,
            ..DaangnSearchOptions::default()
        }
    }

    fn test_regions() -> Arc<RegionCache> {
        Arc::new(RegionCache::with_page_url("http://unused.invalid/", DEFAULT_TTL))
    }

    fn remix_page(articles: Value) -> String {
        let context = json!({
            "state": {"loaderData": {
                "routes/kr.buy-sell.s": {"allPage": {"fleamarketArticles": articles}}
            }}
        });
        format!("<html><body><script>window.__remixContext = {context};</script></body></html>")
    }

    #[test]
    fn test_build_search_url_price_ranges() {
        let mut options = default_options();
        options.min_price = Some(1000);
        options.max_price = Some(50000);
        let url = build_search_url(DEFAULT_BASE_URL, "의자", None, &options);
        assert!(url.contains("price=1000__50000"));

        options.max_price = None;
        let url = build_search_url(DEFAULT_BASE_URL, "의자", None, &options);
        assert!(url.contains("price=1000__"));

        options.min_price = None;
        options.max_price = Some(50000);
        let url = build_search_url(DEFAULT_BASE_URL, "의자", None, &options);
        assert!(url.contains("price=0__50000"));
    }

    #[test]
    fn test_build_search_url_flags() {
        let mut options = default_options();
        options.only_on_sale = true;
        options.category = Some(1);
        let url = build_search_url(DEFAULT_BASE_URL, "의자", Some("강남구-10"), &options);
        assert!(url.contains("only_on_sale=true"));
        assert!(url.contains("category_id=1"));
        assert!(url.contains("in=%EA%B0%95%EB%82%A8%EA%B5%AC-10"));
        // Page 1 is the default and stays off the URL.
        assert!(!url.contains("page="));

        options.page = 3;
        let url = build_search_url(DEFAULT_BASE_URL, "의자", None, &options);
        assert!(url.contains("page=3"));
    }

    #[test]
    fn test_parse_remix_context_articles() {
        let html = remix_page(json!([{
            "id": "/kr/buy-sell/중고-의자-1a2b3c4d5e/",
            "title": "중고 의자",
            "price": "15000.0",
            "thumbnail": "https://img.example/d.jpg",
            "status": "Ongoing",
            "region": {"name": "서초동"},
            "boostedAt": "2024-06-15T10:00:00",
            "createdAt": "2024-06-14T08:00:00"
        }, {
            "id": "/kr/buy-sell/나눔-화분-9z8y7x6w5v/",
            "title": "나눔 화분",
            "price": "0",
            "status": "Reserved"
        }]));

        let results = parse_listings(&html, DEFAULT_BASE_URL);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "중고-의자-1a2b3c4d5e");
        assert_eq!(results[0].price, 15_000);
        assert_eq!(results[0].price_str, "15,000원");
        assert_eq!(results[0].status, ListingStatus::OnSale);
        assert_eq!(results[0].location.as_deref(), Some("서초동"));
        // boostedAt wins over createdAt.
        assert_eq!(results[0].time.as_deref(), Some("2024-06-15T10:00:00"));
        assert_eq!(
            results[0].url,
            "https://www.daangn.com/kr/buy-sell/중고-의자-1a2b3c4d5e/"
        );
        assert_eq!(results[1].price_str, "나눔🧡");
        assert_eq!(results[1].status, ListingStatus::Reserved);
    }

    #[test]
    fn test_parse_html_cards_fallback() {
        let html = r#"<html><body>
        <a href="/kr/buy-sell/s/?search=x">검색 페이지 링크</a>
        <a href="/kr/buy-sell/">목록 링크</a>
        <a href="/kr/buy-sell/캠핑-테이블-0f9e8d7c6b/">
            <img src="https://img.example/c.jpg" alt="캠핑 테이블"/>
            <div>예약중</div>
            <div>캠핑 테이블</div>
            <div>45,000 원</div>
            <div class="card-desc">진영읍 · 끌올 15분 전</div>
        </a>
        </body></html>"#;

        let results = parse_listings(html, DEFAULT_BASE_URL);
        assert_eq!(results.len(), 1);
        let item = &results[0];
        assert_eq!(item.id, "캠핑-테이블-0f9e8d7c6b");
        assert_eq!(item.status, ListingStatus::Reserved);
        assert_eq!(item.title, "캠핑 테이블");
        assert_eq!(item.price, 45_000);
        assert_eq!(item.location.as_deref(), Some("진영읍"));
        assert_eq!(item.time.as_deref(), Some("15분 전"));
    }

    #[test]
    fn test_html_fallback_recovers_garbled_title_from_slug() {
        let html = r#"<a href="/kr/buy-sell/%EC%BA%A0%ED%95%91-%EC%9D%98%EC%9E%90-a1b2c3d4e5/">
            <div>Ã­ÂÂÃ­ÂÂ¼Ã¬Â Ã¬ÂÂ´</div>
        </a>"#;
        let results = parse_html_cards(html, DEFAULT_BASE_URL);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "캠핑 의자");
    }

    #[test]
    fn test_html_fallback_price_in_title() {
        let html = r#"<a href="/kr/buy-sell/item-a1b2c3d4e5/">
            <div>선풍기 15,000원</div>
        </a>"#;
        let results = parse_html_cards(html, DEFAULT_BASE_URL);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "선풍기");
        assert_eq!(results[0].price, 15_000);
    }

    #[test]
    fn test_title_from_slug() {
        assert_eq!(
            title_from_slug("/kr/buy-sell/캠핑-의자-a1b2c3d4e5/"),
            "캠핑 의자"
        );
        // Short suffixes are part of the title, not a hash.
        assert_eq!(title_from_slug("/kr/buy-sell/아이폰-16/"), "아이폰 16");
    }

    #[test]
    fn test_is_garbled() {
        assert!(is_garbled("Ã­ÂÂÃ­ÂÂ¼"));
        assert!(!is_garbled("캠핑 의자"));
        assert!(!is_garbled("chair"));
        // Hangul present means the text survived decoding.
        assert!(!is_garbled("캠핑 à 의자"));
    }

    #[test]
    fn test_is_product_href() {
        assert!(is_product_href("/kr/buy-sell/캠핑-의자-abc123/"));
        assert!(!is_product_href("/kr/buy-sell/"));
        assert!(!is_product_href("/kr/buy-sell/s/?search=x"));
        assert!(!is_product_href("/kr/buy-sell/s"));
        assert!(!is_product_href("/kr/about"));
    }

    #[tokio::test]
    async fn test_search_resolves_region_through_directory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kr/buy-sell/s/"))
            .and(query_param("in", "강남구-10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(remix_page(json!([{
                "id": "/kr/buy-sell/의자-abcdef1234/",
                "title": "의자",
                "price": "9000",
                "status": "Ongoing"
            }]))))
            .mount(&server)
            .await;

        let regions = test_regions();
        regions
            .seed(vec![crate::models::RegionEntry {
                name: "강남구".into(),
                code: "강남구-10".into(),
                city: "서울특별시".into(),
                full: "서울특별시 강남구".into(),
            }])
            .await;

        let client = DaangnClient::with_base_url(&server.uri(), regions);
        let mut options = default_options();
        options.region = Some("강남구".into());
        let results = client.search("의자", &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "의자");
    }

    #[tokio::test]
    async fn test_search_all_stops_on_empty_first_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kr/buy-sell/s/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(remix_page(json!([]))))
            .expect(1)
            .mount(&server)
            .await;

        let client = DaangnClient::with_base_url(&server.uri(), test_regions());
        // An empty first page ends the sweep; the mock allows exactly one hit.
        let results = client
            .search_all("의자", 3, &default_options())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_degrades_on_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = DaangnClient::with_base_url(&server.uri(), test_regions());
        let results = client.search("의자", &default_options()).await.unwrap();
        assert!(results.is_empty());
    }
}
