//! 번개장터 (Bunjang) client.
//!
//! Bunjang is the only upstream with an externally reachable JSON API
//! (`find_v2.json`), so keyword search goes through it first and only falls
//! back to scraping the web app's `__NEXT_DATA__` when the API fails.
//!
//! Keyword-less browsing is category-driven and picky: most top-level codes
//! reject keyword-less queries with a 400 (`ERR_INVALID_PARAMETER`), so
//! [`expand_to_subcategories`] widens them to second-level codes before the
//! fan-out. A separate browse variant (`f_category_id`) does accept top-level
//! ids and backs [`BunjangClient::recent_by_top_categories`].

use crate::error::SourceError;
use crate::fanout;
use crate::models::{format_price_krw, CategoryNode, FlatCategory, Listing, ListingStatus};
use crate::scrapers::{
    build_http_client, dehydrated_queries, extract_next_data, parse_price, value_to_flag,
    value_to_string, RecentOptions, SearchOptions, SortOrder, MAX_PRICE_OPEN,
};
use crate::throttle::Throttle;
use crate::timestamp;
use chrono::{Local, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

const DEFAULT_WEB_BASE_URL: &str = "https://m.bunjang.co.kr";
const DEFAULT_API_BASE_URL: &str = "https://api.bunjang.co.kr";

const SEARCH_API_PATH: &str = "/api/1/find_v2.json";
const CATEGORIES_API_PATH: &str = "/api/1/categories/list.json";

/// Per-page upstream ceiling.
const MAX_COUNT: u32 = 100;

/// Top-level category code → display name.
pub const CATEGORIES: &[(u32, &str)] = &[
    (310, "여성의류"),
    (320, "남성의류"),
    (300, "패션잡화"),
    (400, "뷰티"),
    (500, "출산/유아동"),
    (600, "모바일/태블릿"),
    (601, "스마트폰"),
    (602, "태블릿"),
    (700, "가전제품"),
    (800, "노트북/PC"),
    (900, "카메라"),
    (110, "가구/인테리어"),
    (120, "리빙/생활"),
    (130, "게임"),
    (140, "반려동물/취미"),
    (150, "도서/음반/문구"),
    (160, "티켓/쿠폰"),
    (170, "스포츠/레저"),
    (180, "자동차/오토바이"),
];

/// Second-level category codes accepted by keyword-less `find_v2` queries.
/// Top-level codes mostly are not; see [`expand_to_subcategories`].
pub const SUBCATEGORIES: &[(u32, &str)] = &[
    // 여성의류 (310)
    (310100, "여성 상의"),
    (310200, "여성 하의"),
    (310300, "여성 원피스/스커트"),
    (310400, "여성 아우터"),
    (310500, "여성 정장/세트"),
    // 남성의류 (320)
    (320100, "남성 상의"),
    (320200, "남성 하의"),
    (320300, "남성 아우터"),
    (320400, "남성 정장/세트"),
    // 패션잡화 (300)
    (300100, "신발"),
    (300200, "가방"),
    (300300, "시계"),
    (300400, "패션액세서리"),
    (300500, "모자"),
    // 뷰티 (400)
    (400100, "스킨케어"),
    (400200, "메이크업"),
    (400300, "헤어케어"),
    (400400, "바디케어"),
    (400500, "향수"),
    // 출산/유아동 (500)
    (500100, "유아동 의류"),
    (500200, "유아용품"),
    (500300, "출산용품"),
    (500400, "유아동 장난감"),
    // 모바일/태블릿 (600)
    (601, "스마트폰"),
    (602, "태블릿"),
    (600300, "모바일 액세서리"),
    (600400, "웨어러블"),
    // 가전제품 (700)
    (700100, "주방가전"),
    (700200, "생활가전"),
    (700300, "계절가전"),
    (700400, "영상가전"),
    (700500, "음향가전"),
    // 노트북/PC (800)
    (800100, "노트북"),
    (800200, "데스크탑"),
    (800300, "PC 부품"),
    (800400, "모니터"),
    (800500, "PC 주변기기"),
    // 카메라 (900)
    (900100, "디지털카메라"),
    (900200, "캠코더"),
    (900300, "렌즈"),
    (900400, "카메라 액세서리"),
    // 가구/인테리어 (110)
    (110100, "침대/매트리스"),
    (110200, "책상/테이블"),
    (110300, "의자/소파"),
    (110400, "수납/선반"),
    (110500, "인테리어 소품"),
    // 리빙/생활 (120)
    (120100, "주방용품"),
    (120200, "욕실용품"),
    (120300, "청소용품"),
    (120400, "세탁용품"),
    (120500, "생활잡화"),
    // 게임 (130)
    (130100, "게임기"),
    (130200, "게임 타이틀"),
    (130300, "게임 액세서리"),
    // 반려동물/취미 (140)
    (140100, "반려동물용품"),
    (140200, "키덜트/피규어"),
    (140300, "핸드메이드"),
    (140400, "악기"),
    (140500, "식물"),
    // 도서/음반/문구 (150)
    (150100, "도서"),
    (150200, "음반/DVD"),
    (150300, "문구"),
    (150400, "아이돌 굿즈"),
    // 티켓/쿠폰 (160)
    (160100, "티켓"),
    (160200, "쿠폰"),
    (160300, "상품권"),
    // 스포츠/레저 (170)
    (170100, "골프"),
    (170200, "캠핑"),
    (170300, "자전거"),
    (170400, "헬스/요가"),
    (170500, "수상스포츠"),
    (170600, "스키/보드"),
    (170700, "등산/아웃도어"),
    // 자동차/오토바이 (180)
    (180100, "자동차"),
    (180200, "오토바이"),
    (180300, "자동차 용품"),
];

fn category_name(code: u32) -> Option<&'static str> {
    SUBCATEGORIES
        .iter()
        .chain(CATEGORIES.iter())
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Expand top-level category codes to their second-level codes by decimal
/// prefix; codes that are already second-level pass through, and unknown
/// codes pass through too (the upstream rejects them with a 400, which the
/// fan-out skips).
pub fn expand_to_subcategories(categories: &[u32]) -> Vec<u32> {
    let sub_codes: HashSet<u32> = SUBCATEGORIES.iter().map(|(c, _)| *c).collect();
    let top_codes: HashSet<u32> = CATEGORIES.iter().map(|(c, _)| *c).collect();

    let mut expanded = Vec::new();
    for &cat in categories {
        if sub_codes.contains(&cat) {
            expanded.push(cat);
        } else if top_codes.contains(&cat) {
            let prefix = cat.to_string();
            let children: Vec<u32> = SUBCATEGORIES
                .iter()
                .map(|(c, _)| *c)
                .filter(|c| *c != cat && c.to_string().starts_with(&prefix))
                .collect();
            if children.is_empty() {
                expanded.push(cat);
            } else {
                debug!(category = cat, children = children.len(), "expanded top-level category");
                expanded.extend(children);
            }
        } else {
            expanded.push(cat);
        }
    }
    expanded
}

/// The full category catalog as served by the categories API: the nested
/// top-level tree plus a flat id-indexed view.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryCatalog {
    pub top_categories: Vec<CategoryNode>,
    pub flat: HashMap<String, FlatCategory>,
}

impl CategoryCatalog {
    fn empty() -> Self {
        Self {
            top_categories: Vec::new(),
            flat: HashMap::new(),
        }
    }
}

/// One raw `find_v2` result record. Field names differ between the public
/// API and the web app's embedded state, so alternates are carried here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawBunjangItem {
    pid: Option<Value>,
    product_id: Option<Value>,
    name: Option<String>,
    title: Option<String>,
    price: Option<Value>,
    product_image: Option<String>,
    image: Option<String>,
    img: Option<String>,
    status: Option<Value>,
    location: Option<String>,
    area: Option<String>,
    update_time: Option<Value>,
    updated_at: Option<String>,
    seller_name: Option<String>,
    store_name: Option<String>,
    wish_cnt: Option<u64>,
    like_count: Option<u64>,
    view_cnt: Option<u64>,
    view_count: Option<u64>,
    safe_payment: Option<Value>,
    bunpay: Option<Value>,
    category_name: Option<String>,
    free_shipping: Option<bool>,
}

impl RawBunjangItem {
    fn normalize(self, web_base_url: &str) -> Option<Listing> {
        let title = self
            .name
            .or(self.title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;

        let id = self
            .pid
            .as_ref()
            .or(self.product_id.as_ref())
            .map(value_to_string)
            .unwrap_or_default();

        let price = parse_price(self.price.as_ref());

        // Numeric status codes from the API, Korean strings from page state.
        let status = match &self.status {
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => ListingStatus::OnSale,
                Some(1) => ListingStatus::Reserved,
                Some(2) => ListingStatus::Sold,
                Some(3) => ListingStatus::Hidden,
                _ => ListingStatus::Unknown,
            },
            Some(Value::String(s)) => match s.as_str() {
                "0" | "판매중" => ListingStatus::OnSale,
                "1" | "예약중" => ListingStatus::Reserved,
                "2" | "판매완료" => ListingStatus::Sold,
                "3" | "숨김" => ListingStatus::Hidden,
                "" => ListingStatus::OnSale,
                _ => ListingStatus::Unknown,
            },
            _ => ListingStatus::OnSale,
        };

        let image_url = self
            .product_image
            .or(self.image)
            .or(self.img)
            .filter(|u| !u.is_empty());

        // Epoch seconds from the API; already-formatted strings otherwise.
        let time = match &self.update_time {
            Some(Value::Number(n)) => n
                .as_i64()
                .filter(|secs| *secs > 0)
                .and_then(timestamp::epoch_to_display),
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => self.updated_at.filter(|t| !t.is_empty()),
        };

        Some(Listing {
            url: format!("{web_base_url}/product/{id}"),
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
            location: self.location.or(self.area).filter(|l| !l.is_empty()),
            time,
            seller: self
                .seller_name
                .or(self.store_name)
                .filter(|s| !s.is_empty()),
            likes: self.wish_cnt.or(self.like_count).unwrap_or(0),
            views: self.view_cnt.or(self.view_count).unwrap_or(0),
            safe_payment: value_to_flag(self.safe_payment.as_ref())
                || value_to_flag(self.bunpay.as_ref()),
            free_shipping: self.free_shipping.unwrap_or(false),
            category: self.category_name.filter(|c| !c.is_empty()),
            source: None,
        })
    }
}

/// Options for [`BunjangClient::recent_by_top_categories`].
#[derive(Debug, Clone)]
pub struct RecentByCategoryOptions {
    /// Per-category fetch count, clamped to 100.
    pub count: u32,
    /// Top-level category ids to include; `None` means all of them.
    pub top_category_ids: Option<Vec<String>>,
    pub min_price: u64,
    pub max_price: u64,
    pub exclude_sold: bool,
    pub max_workers: usize,
    pub within_minutes: Option<u32>,
    /// Bypass the cached category catalog.
    pub refresh: bool,
}

impl Default for RecentByCategoryOptions {
    fn default() -> Self {
        Self {
            count: 20,
            top_category_ids: None,
            min_price: 0,
            max_price: MAX_PRICE_OPEN,
            exclude_sold: true,
            max_workers: 5,
            within_minutes: None,
            refresh: false,
        }
    }
}

/// Recent listings for one top-level category.
#[derive(Debug, Serialize)]
pub struct TopCategoryListings {
    pub id: String,
    pub title: String,
    /// Upstream's reported total listing count for the category.
    pub count: u64,
    pub icon_url: String,
    pub listings: Vec<Listing>,
    pub listings_count: usize,
}

/// Grouped result of [`BunjangClient::recent_by_top_categories`].
#[derive(Debug, Serialize)]
pub struct RecentByTopCategories {
    pub top_categories: Vec<TopCategoryListings>,
    pub total_listings: usize,
    pub elapsed_seconds: f64,
}

/// Bunjang marketplace client.
#[derive(Debug)]
pub struct BunjangClient {
    http: reqwest::Client,
    web_base_url: String,
    api_base_url: String,
    throttle: Arc<Throttle>,
    catalog: RwLock<Option<Arc<CategoryCatalog>>>,
}

impl BunjangClient {
    pub fn new(min_request_interval: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_http_client("https://m.bunjang.co.kr/", true)?,
            web_base_url: DEFAULT_WEB_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            throttle: Arc::new(Throttle::new(min_request_interval)),
            catalog: RwLock::new(None),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_urls(web_base_url: &str, api_base_url: &str) -> Self {
        Self {
            http: build_http_client(web_base_url, true).expect("client build"),
            web_base_url: web_base_url.trim_end_matches('/').to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            throttle: Arc::new(Throttle::new(Duration::ZERO)),
            catalog: RwLock::new(None),
        }
    }

    /// Static top-level category code → name map.
    pub fn categories(&self) -> &'static [(u32, &'static str)] {
        CATEGORIES
    }

    /// Keyword search through the public `find_v2` API, falling back to the
    /// web app's `__NEXT_DATA__` when the API call or its JSON fails.
    ///
    /// Degrades to empty when both strategies fail.
    #[instrument(skip(self, options), fields(page = options.page))]
    pub async fn search(&self, keyword: &str, options: &SearchOptions) -> Vec<Listing> {
        self.throttle.acquire().await;

        // The API counts pages from 0; callers count from 1.
        let api_page = options.page.saturating_sub(1);
        let mut params: Vec<(&str, String)> = vec![
            ("q", keyword.to_string()),
            ("order", options.sort.bunjang_token().to_string()),
            ("page", api_page.to_string()),
            ("n", options.count.min(MAX_COUNT).to_string()),
            ("stat", "v2".to_string()),
        ];
        if let Some(category) = options.category {
            params.push(("category", category.to_string()));
        }
        if options.min_price > 0 {
            params.push(("price_min", options.min_price.to_string()));
        }
        if options.max_price < MAX_PRICE_OPEN {
            params.push(("price_max", options.max_price.to_string()));
        }
        if options.exclude_sold {
            params.push(("req_ref", "search".to_string()));
            params.push(("stat_status", "s".to_string()));
        }

        let url = format!("{}{SEARCH_API_PATH}", self.api_base_url);
        let data: Value = match self.fetch_json(&url, &params).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "search API failed; falling back to page scrape");
                return self
                    .search_fallback(keyword, options.page, options.count, options.sort)
                    .await;
            }
        };

        let results: Vec<Listing> = api_item_list(&data)
            .iter()
            .filter_map(|raw| self.normalize_raw(raw))
            .filter(|listing| !(options.exclude_sold && listing.status == ListingStatus::Sold))
            .collect();
        info!(keyword, results = results.len(), "search complete");
        results
    }

    /// Scrape `/search/products` and read results out of `__NEXT_DATA__`.
    /// Handles both the infinite-query `pages` layout and the flat layout.
    async fn search_fallback(
        &self,
        keyword: &str,
        page: u32,
        count: u32,
        sort: SortOrder,
    ) -> Vec<Listing> {
        self.throttle.acquire().await;

        let mut url = format!(
            "{}/search/products?q={}&page={page}",
            self.web_base_url,
            urlencoding::encode(keyword)
        );
        if sort != SortOrder::Recommend {
            url.push_str(&format!("&order={}", sort.bunjang_token()));
        }

        let html = match self.fetch_text(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "fallback page request failed");
                return Vec::new();
            }
        };
        let Some(next_data) = extract_next_data(&html) else {
            warn!("fallback page held no __NEXT_DATA__ blob");
            return Vec::new();
        };

        let mut items: Vec<Value> = Vec::new();
        for query in dehydrated_queries(&next_data) {
            let Some(state_data) = query.pointer("/state/data") else {
                continue;
            };
            if let Some(pages) = state_data.get("pages").and_then(Value::as_array) {
                for p in pages {
                    items.extend(page_item_list(p).iter().cloned());
                }
            }
            if items.is_empty() {
                items.extend(page_item_list(state_data).iter().cloned());
            }
        }

        let results: Vec<Listing> = items
            .iter()
            .take(count as usize)
            .filter_map(|raw| self.normalize_raw(raw))
            .collect();
        info!(keyword, results = results.len(), "fallback search complete");
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

    /// Fetch one category's newest listings, keyword-less.
    ///
    /// `use_f_category` switches to the browse variant that accepts
    /// top-level ids. An upstream 400 means the code rejects keyword-less
    /// queries and is skipped (empty `Ok`); transport failures are `Err` so
    /// the fan-out collector can exclude the worker.
    #[instrument(skip(self, options))]
    pub async fn fetch_category_recent(
        &self,
        category: u32,
        options: &RecentOptions,
        use_f_category: bool,
    ) -> Result<Vec<Listing>, SourceError> {
        self.throttle.acquire().await;

        let count = options.count.min(MAX_COUNT).to_string();
        let mut params: Vec<(&str, String)> = if use_f_category {
            vec![
                ("f_category_id", category.to_string()),
                ("page", "0".to_string()),
                ("order", "date".to_string()),
                ("req_ref", "popular_category".to_string()),
                ("request_id", Utc::now().timestamp().to_string()),
                ("stat_device", "w".to_string()),
                ("n", count),
                ("version", "4".to_string()),
            ]
        } else {
            vec![
                ("order", "date".to_string()),
                ("page", "0".to_string()),
                ("n", count),
                ("stat", "v2".to_string()),
                ("category", category.to_string()),
            ]
        };
        if options.min_price > 0 {
            params.push(("price_min", options.min_price.to_string()));
        }
        if options.max_price < MAX_PRICE_OPEN {
            params.push(("price_max", options.max_price.to_string()));
        }
        if options.exclude_sold && !use_f_category {
            params.push(("req_ref", "search".to_string()));
            params.push(("stat_status", "s".to_string()));
        }

        let url = format!("{}{SEARCH_API_PATH}", self.api_base_url);
        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| SourceError::Upstream(e.to_string()))?;

        // Top-level codes answer keyword-less queries with 400
        // ERR_INVALID_PARAMETER; skip the category instead of failing it.
        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let reason = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("reason").map(value_to_string))
                .unwrap_or_default();
            warn!(category, reason, "category rejected keyword-less query; skipping");
            return Ok(Vec::new());
        }

        let data: Value = response
            .error_for_status()
            .map_err(|e| SourceError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| {
                warn!(category, error = %e, "category response was not JSON");
                e
            })
            .unwrap_or(Value::Null);

        let fallback_name = category_name(category).map(str::to_string);
        let results = api_item_list(&data)
            .iter()
            .filter_map(|raw| self.normalize_raw(raw))
            .filter(|listing| !(options.exclude_sold && listing.status == ListingStatus::Sold))
            .map(|mut listing| {
                if listing.category.is_none() {
                    listing.category = fallback_name.clone();
                }
                listing
            })
            .collect();
        Ok(results)
    }

    /// Collect recent listings across second-level categories through the
    /// fan-out layer. Caller-supplied codes are expanded first; with none
    /// given, the full second-level table is used.
    pub async fn get_recent_listings(&self, options: &RecentOptions) -> Vec<Listing> {
        let mut options = options.clone();
        options.count = options.count.min(MAX_COUNT);
        let codes = match &options.categories {
            Some(codes) => expand_to_subcategories(codes),
            None => SUBCATEGORIES.iter().map(|(code, _)| *code).collect(),
        };

        let opts = &options;
        fanout::collect(codes, options.max_workers, options.within_minutes, |code| {
            self.fetch_category_recent(code, opts, false)
        })
        .await
    }

    /// Fetch the live category tree from the categories API.
    ///
    /// The parsed catalog is cached for the life of the client; `refresh`
    /// bypasses and replaces the cache. API failures degrade to an empty,
    /// uncached catalog.
    #[instrument(skip(self))]
    pub async fn fetch_categories(&self, refresh: bool) -> Arc<CategoryCatalog> {
        if !refresh {
            if let Some(catalog) = self.catalog.read().await.as_ref() {
                return Arc::clone(catalog);
            }
        }

        self.throttle.acquire().await;
        let url = format!("{}{CATEGORIES_API_PATH}", self.api_base_url);
        let data: Value = match self.fetch_json(&url, &[]).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "categories API failed");
                return Arc::new(CategoryCatalog::empty());
            }
        };
        if data.get("result").and_then(Value::as_str) != Some("success") {
            warn!(result = %data.get("result").map(value_to_string).unwrap_or_default(),
                "categories API returned non-success");
            return Arc::new(CategoryCatalog::empty());
        }

        let mut flat = HashMap::new();
        let top_categories: Vec<CategoryNode> = data
            .get("categories")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|node| parse_category_node(node, None, 0, &mut flat))
            .collect();

        info!(
            top = top_categories.len(),
            total = flat.len(),
            "category catalog loaded"
        );
        let catalog = Arc::new(CategoryCatalog {
            top_categories,
            flat,
        });
        *self.catalog.write().await = Some(Arc::clone(&catalog));
        catalog
    }

    /// Top-level (depth 0) categories from the live catalog.
    pub async fn top_categories(&self, refresh: bool) -> Vec<CategoryNode> {
        self.fetch_categories(refresh).await.top_categories.clone()
    }

    /// Recent listings grouped per top-level category, via the
    /// `f_category_id` browse variant. Dedup is shared across categories:
    /// a listing appearing under two tops is kept only where first seen.
    pub async fn recent_by_top_categories(
        &self,
        options: &RecentByCategoryOptions,
    ) -> RecentByTopCategories {
        let start = Instant::now();
        let catalog = self.fetch_categories(options.refresh).await;

        let mut tops: Vec<&CategoryNode> = catalog.top_categories.iter().collect();
        if let Some(ids) = &options.top_category_ids {
            tops.retain(|node| ids.iter().any(|id| id == &node.id));
        }

        let recent = RecentOptions {
            count: options.count.min(MAX_COUNT),
            categories: None,
            min_price: options.min_price,
            max_price: options.max_price,
            exclude_sold: options.exclude_sold,
            max_workers: options.max_workers,
            within_minutes: options.within_minutes,
        };
        info!(tops = tops.len(), per_category = recent.count, "collecting recent by top category");

        let workers: Vec<_> = tops
            .iter()
            .map(|node| {
                let id = node.id.clone();
                let recent = &recent;
                async move {
                    let code: u32 = id.parse().unwrap_or(0);
                    let outcome = self.fetch_category_recent(code, recent, true).await;
                    (id, outcome)
                }
            })
            .collect();
        let outcomes: Vec<(String, Result<Vec<Listing>, SourceError>)> =
            futures::stream::iter(workers)
                .buffer_unordered(options.max_workers.max(1))
                .collect()
                .await;

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut grouped: HashMap<String, Vec<Listing>> = HashMap::new();
        for (top_id, outcome) in outcomes {
            match outcome {
                Ok(items) => {
                    let group = grouped.entry(top_id).or_default();
                    for item in items {
                        if item.id.is_empty() || !seen_ids.insert(item.id.clone()) {
                            continue;
                        }
                        group.push(item);
                    }
                }
                Err(e) => {
                    warn!(top_category = %top_id, error = %e, "top-category worker failed; excluding");
                }
            }
        }

        let now = Local::now().naive_local();
        for group in grouped.values_mut() {
            if let Some(minutes) = options.within_minutes {
                fanout::apply_recency_filter(group, minutes, now);
            }
            fanout::sort_by_recency(group, now);
        }

        let mut total = 0;
        let top_categories: Vec<TopCategoryListings> = tops
            .into_iter()
            .map(|node| {
                let listings = grouped.remove(&node.id).unwrap_or_default();
                total += listings.len();
                TopCategoryListings {
                    id: node.id.clone(),
                    title: node.title.clone(),
                    count: node.count,
                    icon_url: node.icon_url.clone(),
                    listings_count: listings.len(),
                    listings,
                }
            })
            .collect();

        RecentByTopCategories {
            top_categories,
            total_listings: total,
            elapsed_seconds: (start.elapsed().as_millis() as f64) / 1000.0,
        }
    }

    fn normalize_raw(&self, raw: &Value) -> Option<Listing> {
        serde_json::from_value::<RawBunjangItem>(raw.clone())
            .ok()?
            .normalize(&self.web_base_url)
    }

    async fn fetch_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Value, reqwest::Error> {
        self.http
            .get(url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn fetch_text(&self, url: &str) -> Result<String, reqwest::Error> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// `find_v2` responses carry results under `list` or `items`.
fn api_item_list(data: &Value) -> &[Value] {
    data.get("list")
        .or_else(|| data.get("items"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn page_item_list(data: &Value) -> &[Value] {
    api_item_list(data)
}

/// Recursively parse one category node, registering every node in `flat`.
fn parse_category_node(
    node: &Value,
    parent_id: Option<String>,
    depth: u32,
    flat: &mut HashMap<String, FlatCategory>,
) -> Option<CategoryNode> {
    let id = node.get("id").map(value_to_string).filter(|s| !s.is_empty())?;
    let title = node.get("title").map(value_to_string).unwrap_or_default();
    let count = node.get("count").and_then(Value::as_u64).unwrap_or(0);
    let icon_url = node.get("icon_url").map(value_to_string).unwrap_or_default();

    let children: Vec<CategoryNode> = node
        .get("categories")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter_map(|child| parse_category_node(child, Some(id.clone()), depth + 1, flat))
        .collect();

    flat.insert(
        id.clone(),
        FlatCategory {
            id: id.clone(),
            title: title.clone(),
            count,
            parent_id: parent_id.clone(),
            depth,
            icon_url: icon_url.clone(),
            children: children.iter().map(|c| c.id.clone()).collect(),
        },
    );

    Some(CategoryNode {
        id,
        title,
        count,
        parent_id,
        depth,
        icon_url,
        children,
    })
}
