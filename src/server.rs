//! REST boundary.
//!
//! Every response is a JSON envelope: `{"success": true, "data": ...}` plus
//! endpoint-specific metadata on success, `{"success": false, "error": ...}`
//! on failure. Input problems are rejected here with a 400 before any
//! network call; a structurally broken upstream region page maps to 502;
//! everything the scrapers degraded internally still arrives as a 200 with
//! an empty data set.

use crate::aggregator::{Aggregator, SearchParams};
use crate::error::{RegionError, SourceError};
use crate::models::{RegionEntry, Source};
use crate::regions::RegionCache;
use crate::scrapers::bunjang::{self, BunjangClient, RecentByCategoryOptions};
use crate::scrapers::daangn::{DaangnClient, DaangnSearchOptions};
use crate::scrapers::joongna::{self, JoongnaClient};
use crate::scrapers::{RecentOptions, SearchOptions, SortOrder, MAX_PRICE_OPEN};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Shared handler state: one client per source plus the aggregation layer.
pub struct AppState {
    pub joongna: Arc<JoongnaClient>,
    pub bunjang: Arc<BunjangClient>,
    pub daangn: Arc<DaangnClient>,
    pub regions: Arc<RegionCache>,
    pub aggregator: Aggregator,
}

/// Build the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/search", get(combined_search))
        .route("/api/joongna/search", get(joongna_search))
        .route("/api/joongna/recent", get(joongna_recent))
        .route("/api/joongna/product/:id", get(joongna_product))
        .route("/api/joongna/categories", get(joongna_categories))
        .route("/api/bunjang/search", get(bunjang_search))
        .route("/api/bunjang/recent", get(bunjang_recent))
        .route("/api/bunjang/categories", get(bunjang_categories))
        .route("/api/bunjang/categories/top", get(bunjang_top_categories))
        .route("/api/bunjang/recent-by-category", get(bunjang_recent_by_category))
        .route("/api/daangn/search", get(daangn_search))
        .route("/api/daangn/categories", get(daangn_categories))
        .route("/api/daangn/regions/search", get(regions_search))
        .route("/api/daangn/regions/cities", get(regions_cities))
        .route("/api/daangn/regions/districts", get(regions_districts))
        .fallback(not_found)
        .with_state(state)
}

/// Failure envelope with its HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
        };
        (status, Json(json!({"success": false, "error": message}))).into_response()
    }
}

impl From<RegionError> for ApiError {
    fn from(e: RegionError) -> Self {
        ApiError::BadGateway(format!("당근 지역 페이지 요청 실패: {e}"))
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Region(r) => r.into(),
            SourceError::Upstream(m) => ApiError::BadGateway(m),
        }
    }
}

/// Common keyword-search query parameters, shared by all search endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CommonQuery {
    #[serde(default)]
    keyword: String,
    page: Option<u32>,
    /// Sequential page sweep depth; above 1 the search walks pages until one
    /// comes back empty.
    pages: Option<u32>,
    count: Option<u32>,
    sort: Option<String>,
    category: Option<u32>,
    min_price: Option<u64>,
    max_price: Option<u64>,
    exclude_sold: Option<String>,
    region: Option<String>,
}

impl CommonQuery {
    /// Clamp and default into [`SearchParams`]; rejects a missing keyword.
    fn into_params(self) -> Result<SearchParams, ApiError> {
        let keyword = self.keyword.trim().to_string();
        if keyword.is_empty() {
            return Err(ApiError::BadRequest("keyword 파라미터가 필요합니다.".into()));
        }
        Ok(SearchParams {
            keyword,
            page: self.page.unwrap_or(1).max(1),
            count: self.count.unwrap_or(20).clamp(1, 100),
            sort: SortOrder::from_param(self.sort.as_deref().unwrap_or("")),
            category: self.category,
            min_price: self.min_price,
            max_price: self.max_price,
            exclude_sold: parse_bool_default_true(self.exclude_sold.as_deref()),
            region: self
                .region
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        })
    }
}

fn search_options(params: &SearchParams) -> SearchOptions {
    SearchOptions {
        page: params.page,
        count: params.count,
        sort: params.sort,
        category: params.category,
        min_price: params.min_price.unwrap_or(0),
        max_price: params.max_price.unwrap_or(MAX_PRICE_OPEN),
        exclude_sold: params.exclude_sold,
    }
}

/// Query parameters of the category fan-out recent endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecentQuery {
    count: Option<u32>,
    categories: Option<String>,
    top_categories: Option<String>,
    min_price: Option<u64>,
    max_price: Option<u64>,
    exclude_sold: Option<String>,
    within_minutes: Option<u32>,
    workers: Option<usize>,
    refresh: Option<String>,
}

impl RecentQuery {
    fn into_options(self, default_count: u32, max_count: u32) -> RecentOptions {
        RecentOptions {
            count: self.count.unwrap_or(default_count).clamp(1, max_count),
            categories: parse_code_list(self.categories.as_deref()),
            min_price: self.min_price.unwrap_or(0),
            max_price: self.max_price.unwrap_or(MAX_PRICE_OPEN),
            exclude_sold: parse_bool_default_true(self.exclude_sold.as_deref()),
            max_workers: self.workers.unwrap_or(5).clamp(1, 10),
            within_minutes: self.within_minutes,
        }
    }
}

/// `"false"` (any case) is false; anything else, including absence, is true.
pub(crate) fn parse_bool_default_true(value: Option<&str>) -> bool {
    !value.is_some_and(|v| v.eq_ignore_ascii_case("false"))
}

pub(crate) fn parse_bool_default_false(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Comma-separated numeric codes; non-numeric entries are dropped, an empty
/// or absent list means "use the source default".
pub(crate) fn parse_code_list(raw: Option<&str>) -> Option<Vec<u32>> {
    let codes: Vec<u32> = raw?
        .split(',')
        .filter_map(|c| c.trim().parse().ok())
        .collect();
    if codes.is_empty() {
        None
    } else {
        Some(codes)
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": "중고 매물 검색 API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /api/search": "통합 검색 (중고나라 + 번개장터 + 당근)",
            "GET /api/joongna/search": "중고나라 검색",
            "GET /api/joongna/recent": "중고나라 전체 최근 매물 목록 (전체 카테고리 병렬 수집)",
            "GET /api/joongna/product/{id}": "중고나라 상품 상세",
            "GET /api/joongna/categories": "중고나라 카테고리 목록",
            "GET /api/bunjang/search": "번개장터 검색",
            "GET /api/bunjang/recent": "번개장터 전체 최근 매물 목록 (전체 카테고리 병렬 수집)",
            "GET /api/bunjang/categories": "번개장터 카테고리 목록 (공식 API 트리 또는 static)",
            "GET /api/bunjang/categories/top": "번개장터 최상단 카테고리 목록",
            "GET /api/bunjang/recent-by-category": "번개장터 최상단 카테고리별 최근 매물 리스트",
            "GET /api/daangn/search": "당근 검색",
            "GET /api/daangn/categories": "당근 카테고리 목록",
            "GET /api/daangn/regions/search?q=": "당근 지역 검색",
            "GET /api/daangn/regions/cities": "당근 시/도 목록",
            "GET /api/daangn/regions/districts?city=": "당근 특정 시/도의 구/군 목록",
        },
        "common_params": {
            "keyword": "(필수) 검색어",
            "page": "(선택) 페이지 번호, 기본 1",
            "pages": "(선택) 순차 수집할 최대 페이지 수, 기본 1, 최대 10",
            "count": "(선택) 결과 수, 기본 20, 최대 100",
            "sort": "(선택) recommend | recent | price_asc | price_desc",
            "category": "(선택) 카테고리 코드",
            "min_price": "(선택) 최소 가격",
            "max_price": "(선택) 최대 가격",
            "exclude_sold": "(선택) 판매완료 제외, 기본 true",
            "region": "(선택, 당근) 지역명 또는 코드 (예: 서초4동, 강남구, 역삼동-360)",
        },
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("엔드포인트를 찾을 수 없습니다.".into())
}

async fn combined_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommonQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let params = query.into_params()?;
    let result = state.aggregator.search(&params).await;
    Ok(Json(json!({
        "success": true,
        "data": result.listings,
        "keyword": params.keyword,
        "region": params.region,
        "total_count": result.listings.len(),
        "joongna_count": result.joongna_count,
        "bunjang_count": result.bunjang_count,
        "daangn_count": result.daangn_count,
        "elapsed_seconds": result.elapsed_seconds,
    })))
}

async fn joongna_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommonQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pages = query.pages.unwrap_or(1).clamp(1, 10);
    let params = query.into_params()?;
    let start = Instant::now();
    let options = search_options(&params);
    let results = if pages > 1 {
        state.joongna.search_all(&params.keyword, pages, &options).await
    } else {
        state.joongna.search(&params.keyword, &options).await
    };
    Ok(Json(json!({
        "success": true,
        "data": results,
        "keyword": params.keyword,
        "count": results.len(),
        "page": params.page,
        "elapsed_seconds": elapsed_seconds(start),
        "source": Source::Joongna,
    })))
}

async fn joongna_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<serde_json::Value> {
    let options = query.into_options(50, 50);
    let scanned = options
        .categories
        .as_ref()
        .map_or(joongna::CATEGORIES.len(), Vec::len);
    let within_minutes = options.within_minutes;

    let start = Instant::now();
    let results = state.joongna.get_recent_listings(&options).await;
    Json(json!({
        "success": true,
        "data": results,
        "count": results.len(),
        "categories_scanned": scanned,
        "within_minutes": within_minutes,
        "elapsed_seconds": elapsed_seconds(start),
        "source": Source::Joongna,
    }))
}

async fn joongna_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let detail = state
        .joongna
        .product_detail(product_id)
        .await
        .ok_or_else(|| ApiError::NotFound("상품을 찾을 수 없습니다.".into()))?;
    Ok(Json(json!({
        "success": true,
        "data": detail,
        "source": Source::Joongna,
    })))
}

async fn joongna_categories() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": code_name_list(joongna::CATEGORIES),
        "source": Source::Joongna,
    }))
}

async fn bunjang_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommonQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pages = query.pages.unwrap_or(1).clamp(1, 10);
    let params = query.into_params()?;
    let start = Instant::now();
    let options = search_options(&params);
    let results = if pages > 1 {
        state.bunjang.search_all(&params.keyword, pages, &options).await
    } else {
        state.bunjang.search(&params.keyword, &options).await
    };
    Ok(Json(json!({
        "success": true,
        "data": results,
        "keyword": params.keyword,
        "count": results.len(),
        "page": params.page,
        "elapsed_seconds": elapsed_seconds(start),
        "source": Source::Bunjang,
    })))
}

async fn bunjang_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<serde_json::Value> {
    let options = query.into_options(100, 100);
    let scanned = options
        .categories
        .as_ref()
        .map_or(bunjang::SUBCATEGORIES.len(), Vec::len);
    let within_minutes = options.within_minutes;

    let start = Instant::now();
    let results = state.bunjang.get_recent_listings(&options).await;
    Json(json!({
        "success": true,
        "data": results,
        "count": results.len(),
        "categories_scanned": scanned,
        "within_minutes": within_minutes,
        "elapsed_seconds": elapsed_seconds(start),
        "source": Source::Bunjang,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CategoriesQuery {
    source: Option<String>,
    refresh: Option<String>,
}

async fn bunjang_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoriesQuery>,
) -> Json<serde_json::Value> {
    let refresh = parse_bool_default_false(query.refresh.as_deref());

    if query.source.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("static")) {
        let top: Vec<_> = bunjang::CATEGORIES
            .iter()
            .map(|(code, name)| json!({"code": code, "name": name, "level": "top"}))
            .collect();
        let sub: Vec<_> = bunjang::SUBCATEGORIES
            .iter()
            .map(|(code, name)| json!({"code": code, "name": name, "level": "sub"}))
            .collect();
        return Json(json!({
            "success": true,
            "data": top.iter().chain(sub.iter()).collect::<Vec<_>>(),
            "source": Source::Bunjang,
            "data_source": "static",
            "top_count": top.len(),
            "sub_count": sub.len(),
        }));
    }

    let catalog = state.bunjang.fetch_categories(refresh).await;
    Json(json!({
        "success": true,
        "data": catalog.top_categories,
        "source": Source::Bunjang,
        "data_source": "api",
        "top_count": catalog.top_categories.len(),
        "total_count": catalog.flat.len(),
    }))
}

async fn bunjang_top_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoriesQuery>,
) -> Json<serde_json::Value> {
    let refresh = parse_bool_default_false(query.refresh.as_deref());
    let tops = state.bunjang.top_categories(refresh).await;
    let summary: Vec<_> = tops
        .iter()
        .map(|c| json!({"id": c.id, "title": c.title, "count": c.count, "icon_url": c.icon_url}))
        .collect();
    Json(json!({
        "success": true,
        "data": summary,
        "count": summary.len(),
        "source": Source::Bunjang,
    }))
}

async fn bunjang_recent_by_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<serde_json::Value> {
    let options = RecentByCategoryOptions {
        count: query.count.unwrap_or(20).clamp(1, 100),
        top_category_ids: query.top_categories.as_deref().and_then(|raw| {
            let ids: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if ids.is_empty() { None } else { Some(ids) }
        }),
        min_price: query.min_price.unwrap_or(0),
        max_price: query.max_price.unwrap_or(MAX_PRICE_OPEN),
        exclude_sold: parse_bool_default_true(query.exclude_sold.as_deref()),
        max_workers: query.workers.unwrap_or(5).clamp(1, 10),
        within_minutes: query.within_minutes,
        refresh: parse_bool_default_false(query.refresh.as_deref()),
    };
    let within_minutes = options.within_minutes;

    let result = state.bunjang.recent_by_top_categories(&options).await;
    Json(json!({
        "success": true,
        "top_categories": result.top_categories,
        "total_listings": result.total_listings,
        "elapsed_seconds": result.elapsed_seconds,
        "within_minutes": within_minutes,
        "source": Source::Bunjang,
    }))
}

async fn daangn_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommonQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pages = query.pages.unwrap_or(1).clamp(1, 10);
    let params = query.into_params()?;
    let options = DaangnSearchOptions {
        region: params.region.clone(),
        page: params.page,
        category: params.category,
        min_price: params.min_price,
        max_price: params.max_price,
        only_on_sale: params.exclude_sold,
    };

    let start = Instant::now();
    let results = if pages > 1 {
        state.daangn.search_all(&params.keyword, pages, &options).await?
    } else {
        state.daangn.search(&params.keyword, &options).await?
    };
    Ok(Json(json!({
        "success": true,
        "data": results,
        "keyword": params.keyword,
        "region": params.region,
        "count": results.len(),
        "page": params.page,
        "elapsed_seconds": elapsed_seconds(start),
        "source": Source::Daangn,
    })))
}

async fn daangn_categories() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": code_name_list(crate::scrapers::daangn::CATEGORIES),
        "source": Source::Daangn,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RegionQuery {
    q: Option<String>,
    limit: Option<usize>,
    city: Option<String>,
}

async fn regions_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("q 파라미터가 필요합니다. (예: ?q=강남)".into()))?;
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let results: Vec<RegionEntry> = state.regions.search(q, limit).await?;
    Ok(Json(json!({
        "success": true,
        "data": results,
        "query": q,
        "count": results.len(),
        "source": Source::Daangn,
    })))
}

async fn regions_cities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cities = state.regions.cities().await?;
    Ok(Json(json!({
        "success": true,
        "data": cities,
        "count": cities.len(),
        "source": Source::Daangn,
    })))
}

async fn regions_districts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let city = query
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest("city 파라미터가 필요합니다. (예: ?city=서울특별시)".into())
        })?;

    let districts = state.regions.districts(city).await?;
    if districts.is_empty() {
        return Err(ApiError::NotFound(format!(
            "'{city}' 시/도를 찾을 수 없습니다."
        )));
    }
    Ok(Json(json!({
        "success": true,
        "data": districts,
        "city": city,
        "count": districts.len(),
        "source": Source::Daangn,
    })))
}

fn code_name_list(table: &[(u32, &str)]) -> Vec<serde_json::Value> {
    table
        .iter()
        .map(|(code, name)| json!({"code": code, "name": name}))
        .collect()
}

fn elapsed_seconds(start: Instant) -> f64 {
    (start.elapsed().as_millis() as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_default_true() {
        assert!(parse_bool_default_true(None));
        assert!(parse_bool_default_true(Some("true")));
        assert!(parse_bool_default_true(Some("anything")));
        assert!(!parse_bool_default_true(Some("false")));
        assert!(!parse_bool_default_true(Some("FALSE")));
    }

    #[test]
    fn test_parse_code_list() {
        assert_eq!(parse_code_list(Some("6,7,8")), Some(vec![6, 7, 8]));
        assert_eq!(parse_code_list(Some(" 600 , abc , 601 ")), Some(vec![600, 601]));
        assert_eq!(parse_code_list(Some("")), None);
        assert_eq!(parse_code_list(Some("abc")), None);
        assert_eq!(parse_code_list(None), None);
    }

    #[test]
    fn test_common_query_requires_keyword() {
        let query = CommonQuery::default();
        assert!(matches!(
            query.into_params(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_common_query_clamps() {
        let query = CommonQuery {
            keyword: "아이폰".into(),
            page: Some(0),
            count: Some(500),
            sort: Some("recent".into()),
            exclude_sold: Some("false".into()),
            ..CommonQuery::default()
        };
        let params = query.into_params().unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.count, 100);
        assert_eq!(params.sort, SortOrder::Recent);
        assert!(!params.exclude_sold);
    }

    #[test]
    fn test_recent_query_clamps() {
        let query = RecentQuery {
            count: Some(999),
            workers: Some(50),
            categories: Some("6,7".into()),
            ..RecentQuery::default()
        };
        let options = query.into_options(50, 50);
        assert_eq!(options.count, 50);
        assert_eq!(options.max_workers, 10);
        assert_eq!(options.categories, Some(vec![6, 7]));
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(RegionError::EmptyParse).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
