//! 중고나라 (Joongna) client.
//!
//! web.joongna.com is a Next.js app with no externally reachable search API
//! (the internal `search-api` host 404s off-site), so every operation here
//! fetches a server-rendered page and reads the `__NEXT_DATA__` blob.
//!
//! Upstream quirks this module works around:
//! - `/search?sort=RECENT_SORT` with neither keyword nor category is a 500;
//!   keyword-less browsing must always pin a category.
//! - Result records use two naming generations (`seq`/`productSeq`,
//!   `title`/`productTitle`, ...); [`RawJoongnaItem`] carries both.

use crate::error::SourceError;
use crate::fanout;
use crate::models::{format_price_krw, Listing, ListingStatus};
use crate::scrapers::{
    build_http_client, dehydrated_queries, extract_next_data, parse_price, value_to_flag,
    value_to_string, RecentOptions, SearchOptions, MAX_PRICE_OPEN,
};
use crate::throttle::Throttle;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const DEFAULT_BASE_URL: &str = "https://web.joongna.com";

/// Per-page upstream ceiling; requests for more silently return 50.
const MAX_COUNT: u32 = 50;

/// Category code → display name, as shown in the site's own category nav.
pub const CATEGORIES: &[(u32, &str)] = &[
    (1, "수입명품"),
    (2, "패션의류"),
    (3, "패션잡화"),
    (4, "뷰티"),
    (5, "출산/유아동"),
    (6, "모바일/태블릿"),
    (7, "가전제품"),
    (8, "노트북/PC"),
    (9, "카메라/캠코더"),
    (10, "가구/인테리어"),
    (11, "리빙/생활"),
    (12, "게임"),
    (13, "반려동물/취미"),
    (14, "도서/음반/문구"),
    (15, "티켓/쿠폰"),
    (16, "스포츠"),
    (17, "레저/여행"),
    (19, "오토바이"),
    (20, "공구/산업용품"),
    (21, "무료나눔"),
];

fn category_name(code: u32) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// One raw search-result record as embedded in `__NEXT_DATA__`.
///
/// Joongna ships two naming generations side by side depending on which
/// backend rendered the page, so most fields have an alternate twin.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawJoongnaItem {
    seq: Option<Value>,
    product_seq: Option<Value>,
    title: Option<String>,
    product_title: Option<String>,
    price: Option<Value>,
    image_url: Option<String>,
    image_urls: Option<Vec<String>>,
    sale_status: Option<String>,
    location_name: Option<String>,
    area: Option<String>,
    sort_date: Option<String>,
    reg_date: Option<String>,
    store_name: Option<String>,
    seller_name: Option<String>,
    wish_count: Option<u64>,
    like_count: Option<u64>,
    view_count: Option<u64>,
    jn_pay_yn: Option<Value>,
    category_name: Option<String>,
}

impl RawJoongnaItem {
    /// Map to the canonical [`Listing`]. Returns `None` for title-less
    /// records (ad/placeholder padding).
    fn normalize(self, base_url: &str) -> Option<Listing> {
        let title = self
            .title
            .or(self.product_title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;

        let id = self
            .seq
            .as_ref()
            .or(self.product_seq.as_ref())
            .map(value_to_string)
            .unwrap_or_default();

        let price = parse_price(self.price.as_ref());
        let status = match self.sale_status.as_deref() {
            Some("SALE") => ListingStatus::OnSale,
            Some("RSRV") => ListingStatus::Reserved,
            Some("SOLD") | Some("CMPT") => ListingStatus::Sold,
            _ => ListingStatus::OnSale,
        };

        let image_url = self
            .image_url
            .filter(|u| !u.is_empty())
            .or_else(|| self.image_urls.and_then(|urls| urls.into_iter().next()));

        Some(Listing {
            url: format!("{base_url}/product/{id}"),
            id,
            title,
            price,
            price_str: if price > 0 {
                format_price_krw(price)
            } else {
                "가격미정".to_string()
            },
            status,
            image_url,
            location: self
                .location_name
                .or(self.area)
                .filter(|l| !l.is_empty()),
            time: self
                .sort_date
                .or(self.reg_date)
                .filter(|t| !t.is_empty()),
            seller: self
                .store_name
                .or(self.seller_name)
                .filter(|s| !s.is_empty()),
            likes: self.wish_count.or(self.like_count).unwrap_or(0),
            views: self.view_count.unwrap_or(0),
            safe_payment: value_to_flag(self.jn_pay_yn.as_ref()),
            free_shipping: false,
            category: self.category_name.filter(|c| !c.is_empty()),
            source: None,
        })
    }
}

/// Joongna marketplace client.
#[derive(Debug)]
pub struct JoongnaClient {
    http: reqwest::Client,
    base_url: String,
    throttle: Arc<Throttle>,
}

impl JoongnaClient {
    pub fn new(min_request_interval: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_http_client("https://web.joongna.com/", false)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            throttle: Arc::new(Throttle::new(min_request_interval)),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: &str) -> Self {
        Self {
            http: build_http_client(base_url, false).expect("client build"),
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle: Arc::new(Throttle::new(Duration::ZERO)),
        }
    }

    /// Static category code → name map.
    pub fn categories(&self) -> &'static [(u32, &'static str)] {
        CATEGORIES
    }

    /// Keyword search against `/search/{keyword}`.
    ///
    /// Transport and parse failures degrade to an empty result with a logged
    /// diagnostic; the caller cannot distinguish them from "no results".
    #[instrument(skip(self, options), fields(page = options.page))]
    pub async fn search(&self, keyword: &str, options: &SearchOptions) -> Vec<Listing> {
        self.throttle.acquire().await;

        let mut params: Vec<(&str, String)> = vec![
            ("keywordSource", "INPUT_KEYWORD".to_string()),
            ("page", options.page.to_string()),
        ];
        if let Some(category) = options.category {
            params.push(("category", category.to_string()));
        }
        if options.min_price > 0 {
            params.push(("minPrice", options.min_price.to_string()));
        }
        if options.max_price < MAX_PRICE_OPEN {
            params.push(("maxPrice", options.max_price.to_string()));
        }
        if options.sort != crate::scrapers::SortOrder::Recommend {
            params.push(("sort", options.sort.joongna_token().to_string()));
        }
        if !options.exclude_sold {
            params.push(("saleYn", "ALL".to_string()));
        }

        let url = format!(
            "{}/search/{}",
            self.base_url,
            urlencoding::encode(keyword)
        );
        let html = match self.fetch_page(&url, &params).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "search request failed");
                return Vec::new();
            }
        };

        let results = self.parse_search_page(&html, options.count);
        info!(keyword, results = results.len(), "search complete");
        results
    }

    /// Sequential multi-page search; stops early at the first empty page.
    pub async fn search_all(
        &self,
        keyword: &str,
        max_pages: u32,
        options: &SearchOptions,
    ) -> Vec<Listing> {
        let mut all = Vec::new();
        for page in 1..=max_pages.max(1) {
            let mut page_options = options.clone();
            page_options.page = page;
            let results = self.search(keyword, &page_options).await;
            if results.is_empty() {
                break;
            }
            all.extend(results);
        }
        all
    }

    /// Fetch one category's newest listings via
    /// `/search?category=N&sort=RECENT_SORT`.
    ///
    /// A transport failure is an `Err` so the fan-out collector can log and
    /// exclude this category; a parse failure is an empty `Ok` (the page
    /// arrived, it just held nothing usable).
    #[instrument(skip(self, options))]
    pub async fn fetch_category_recent(
        &self,
        category_code: u32,
        options: &RecentOptions,
    ) -> Result<Vec<Listing>, SourceError> {
        self.throttle.acquire().await;

        let mut params: Vec<(&str, String)> = vec![
            ("page", "1".to_string()),
            // Keyword-less RECENT_SORT without a category is an upstream 500.
            ("sort", "RECENT_SORT".to_string()),
            ("category", category_code.to_string()),
        ];
        if options.min_price > 0 {
            params.push(("minPrice", options.min_price.to_string()));
        }
        if options.max_price < MAX_PRICE_OPEN {
            params.push(("maxPrice", options.max_price.to_string()));
        }
        if !options.exclude_sold {
            params.push(("saleYn", "ALL".to_string()));
        }

        let url = format!("{}/search", self.base_url);
        let html = self
            .fetch_page(&url, &params)
            .await
            .map_err(|e| SourceError::Upstream(e.to_string()))?;

        let mut results = self.parse_search_page(&html, options.count);
        if let Some(name) = category_name(category_code) {
            for listing in &mut results {
                if listing.category.is_none() {
                    listing.category = Some(name.to_string());
                }
            }
        }
        Ok(results)
    }

    /// Collect recent listings across categories through the fan-out layer.
    ///
    /// Defaults to the full category table when `options.categories` is
    /// unset. Returned listings are deduped, optionally time-windowed, and
    /// sorted newest first.
    pub async fn get_recent_listings(&self, options: &RecentOptions) -> Vec<Listing> {
        let mut options = options.clone();
        options.count = options.count.min(MAX_COUNT);
        let codes: Vec<u32> = options
            .categories
            .clone()
            .unwrap_or_else(|| CATEGORIES.iter().map(|(code, _)| *code).collect());

        let opts = &options;
        fanout::collect(codes, options.max_workers, options.within_minutes, |code| {
            self.fetch_category_recent(code, opts)
        })
        .await
    }

    /// Fetch one product's raw detail record from its page state.
    ///
    /// Any failure (transport, parse, no matching query) is `None`; the REST
    /// layer maps that to 404.
    #[instrument(skip(self))]
    pub async fn product_detail(&self, product_id: u64) -> Option<Value> {
        self.throttle.acquire().await;

        let url = format!("{}/product/{product_id}", self.base_url);
        let html = match self.fetch_page(&url, &[]).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, product_id, "detail request failed");
                return None;
            }
        };

        let next_data = extract_next_data(&html)?;
        for query in dehydrated_queries(&next_data) {
            let key = query
                .pointer("/queryKey/0")
                .map(value_to_string)
                .unwrap_or_default();
            if key.to_lowercase().contains("product") {
                if let Some(data) = query.pointer("/state/data/data") {
                    if !data.is_null() {
                        return Some(data.clone());
                    }
                }
            }
        }
        None
    }

    async fn fetch_page(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<String, reqwest::Error> {
        self.http
            .get(url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Pull the search-result block out of a rendered page and normalize up
    /// to `count` records.
    fn parse_search_page(&self, html: &str, count: u32) -> Vec<Listing> {
        let Some(next_data) = extract_next_data(html) else {
            warn!("page held no __NEXT_DATA__ blob");
            return Vec::new();
        };
        let Some(block) = search_result_block(&next_data) else {
            return Vec::new();
        };
        let items = block
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        items
            .iter()
            .take(count.min(MAX_COUNT) as usize)
            .filter_map(|raw| {
                serde_json::from_value::<RawJoongnaItem>(raw.clone())
                    .ok()?
                    .normalize(&self.base_url)
            })
            .collect()
    }
}

/// Locate the search-result data block among the dehydrated queries: the
/// `get-search-products` query when present, otherwise the first query whose
/// data carries an `items` array (keyword-less category pages use a
/// different key).
fn search_result_block(next_data: &Value) -> Option<&Value> {
    let queries = dehydrated_queries(next_data);

    for query in queries {
        let is_search = query
            .pointer("/queryKey/0")
            .and_then(Value::as_str)
            .is_some_and(|k| k == "get-search-products");
        if is_search {
            if let Some(data) = query.pointer("/state/data/data") {
                if data.is_object() {
                    return Some(data);
                }
            }
        }
    }
    queries.iter().find_map(|query| {
        query
            .pointer("/state/data/data")
            .filter(|data| data.get("items").is_some())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_with(items: Value) -> String {
        let next_data = json!({
            "props": {"pageProps": {"dehydratedState": {"queries": [{
                "queryKey": ["get-search-products"],
                "state": {"data": {"data": {"items": items, "totalSize": 2}}}
            }]}}}
        });
        format!(
            "<html><body><script id=\"__NEXT_DATA__\" type=\"application/json\">{next_data}</script></body></html>"
        )
    }

    fn sample_item() -> Value {
        json!({
            "seq": 12345,
            "title": "아이패드 프로 11",
            "price": 850000,
            "imageUrl": "https://img.example/1.jpg",
            "saleStatus": "SALE",
            "locationName": "서울 강남구",
            "sortDate": "2024-06-15T11:55:00",
            "storeName": "판매자A",
            "wishCount": 3,
            "viewCount": 120,
            "jnPayYn": true,
            "categoryName": "모바일/태블릿"
        })
    }

    #[test]
    fn test_normalize_maps_fields() {
        let raw: RawJoongnaItem = serde_json::from_value(sample_item()).unwrap();
        let listing = raw.normalize(DEFAULT_BASE_URL).unwrap();
        assert_eq!(listing.id, "12345");
        assert_eq!(listing.title, "아이패드 프로 11");
        assert_eq!(listing.price, 850_000);
        assert_eq!(listing.price_str, "850,000원");
        assert_eq!(listing.status, ListingStatus::OnSale);
        assert_eq!(listing.location.as_deref(), Some("서울 강남구"));
        assert_eq!(listing.seller.as_deref(), Some("판매자A"));
        assert_eq!(listing.likes, 3);
        assert!(listing.safe_payment);
        assert_eq!(listing.url, "https://web.joongna.com/product/12345");
    }

    #[test]
    fn test_normalize_alternate_key_generation() {
        let raw: RawJoongnaItem = serde_json::from_value(json!({
            "productSeq": "777",
            "productTitle": "그래픽카드",
            "price": "1,200,000",
            "imageUrls": ["https://img.example/a.jpg"],
            "saleStatus": "RSRV",
            "area": "부산",
            "regDate": "2024-06-14 09:00:00",
            "sellerName": "판매자B",
            "likeCount": 9
        }))
        .unwrap();
        let listing = raw.normalize(DEFAULT_BASE_URL).unwrap();
        assert_eq!(listing.id, "777");
        assert_eq!(listing.price, 1_200_000);
        assert_eq!(listing.status, ListingStatus::Reserved);
        assert_eq!(listing.image_url.as_deref(), Some("https://img.example/a.jpg"));
        assert_eq!(listing.location.as_deref(), Some("부산"));
        assert_eq!(listing.seller.as_deref(), Some("판매자B"));
        assert_eq!(listing.likes, 9);
    }

    #[test]
    fn test_normalize_drops_titleless_and_zero_price() {
        let raw: RawJoongnaItem = serde_json::from_value(json!({"seq": 1})).unwrap();
        assert!(raw.normalize(DEFAULT_BASE_URL).is_none());

        let raw: RawJoongnaItem =
            serde_json::from_value(json!({"seq": 2, "title": "나눔", "price": 0})).unwrap();
        let listing = raw.normalize(DEFAULT_BASE_URL).unwrap();
        assert_eq!(listing.price_str, "가격미정");
    }

    #[test]
    fn test_sold_statuses_collapse() {
        for status in ["SOLD", "CMPT"] {
            let raw: RawJoongnaItem =
                serde_json::from_value(json!({"seq": 1, "title": "x", "saleStatus": status}))
                    .unwrap();
            assert_eq!(
                raw.normalize(DEFAULT_BASE_URL).unwrap().status,
                ListingStatus::Sold
            );
        }
    }

    #[test]
    fn test_search_result_block_falls_back_to_items_query() {
        let next_data = json!({
            "props": {"pageProps": {"dehydratedState": {"queries": [
                {"queryKey": ["unrelated"], "state": {"data": {"data": {"other": 1}}}},
                {"queryKey": ["category-browse"], "state": {"data": {"data": {"items": [1]}}}}
            ]}}}
        });
        let block = search_result_block(&next_data).unwrap();
        assert!(block.get("items").is_some());
    }

    #[tokio::test]
    async fn test_search_parses_rendered_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/search/{}", urlencoding::encode("아이패드"))))
            .and(query_param("keywordSource", "INPUT_KEYWORD"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_with(json!([sample_item()]))),
            )
            .mount(&server)
            .await;

        let client = JoongnaClient::with_base_url(&server.uri());
        let results = client.search("아이패드", &SearchOptions::default()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "아이패드 프로 11");
    }

    #[tokio::test]
    async fn test_search_all_stops_at_first_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/search/{}", urlencoding::encode("노트북"))))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_with(json!([sample_item()]))),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/search/{}", urlencoding::encode("노트북"))))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with(json!([]))))
            .expect(1)
            .mount(&server)
            .await;

        let client = JoongnaClient::with_base_url(&server.uri());
        let results = client
            .search_all("노트북", 3, &SearchOptions::default())
            .await;
        // Page 2 comes back empty, so page 3 is never requested; each mock
        // allows exactly one hit.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "아이패드 프로 11");
    }

    #[tokio::test]
    async fn test_search_degrades_on_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = JoongnaClient::with_base_url(&server.uri());
        assert!(client
            .search("아이패드", &SearchOptions::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_fetch_category_recent_transport_failure_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = JoongnaClient::with_base_url(&server.uri());
        let result = client
            .fetch_category_recent(6, &RecentOptions::default())
            .await;
        assert!(matches!(result, Err(SourceError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_fetch_category_recent_pins_category_and_sort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("sort", "RECENT_SORT"))
            .and(query_param("category", "6"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_with(json!([
                    {"seq": 1, "title": "폰", "price": 100}
                ]))),
            )
            .mount(&server)
            .await;

        let client = JoongnaClient::with_base_url(&server.uri());
        let results = client
            .fetch_category_recent(6, &RecentOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // Category backfilled from the static map when the record lacks one.
        assert_eq!(results[0].category.as_deref(), Some("모바일/태블릿"));
    }
}
