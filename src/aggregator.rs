//! Cross-marketplace combined search.
//!
//! One keyword query fans out to all three source clients concurrently. Legs
//! are isolated: a failing or timed-out source contributes zero results and
//! a zero per-source count while the others proceed. Results are tagged with
//! their source exactly once here, merged, and sorted newest-first.

use crate::fanout;
use crate::models::{Listing, Source};
use crate::scrapers::bunjang::BunjangClient;
use crate::scrapers::daangn::{DaangnClient, DaangnSearchOptions};
use crate::scrapers::joongna::JoongnaClient;
use crate::scrapers::{SearchOptions, SortOrder, MAX_PRICE_OPEN};
use crate::error::SourceError;
use chrono::Local;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Wall-clock budget per source leg.
const LEG_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters of one combined search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub keyword: String,
    pub page: u32,
    pub count: u32,
    pub sort: SortOrder,
    pub category: Option<u32>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub exclude_sold: bool,
    /// Daangn-only region scope; the other sources ignore it.
    pub region: Option<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            page: 1,
            count: 20,
            sort: SortOrder::default(),
            category: None,
            min_price: None,
            max_price: None,
            exclude_sold: true,
            region: None,
        }
    }
}

/// A merged search result with per-source attribution counts.
#[derive(Debug, Serialize)]
pub struct CombinedSearch {
    pub listings: Vec<Listing>,
    pub joongna_count: usize,
    pub bunjang_count: usize,
    pub daangn_count: usize,
    pub elapsed_seconds: f64,
}

/// Fans one query out to all three marketplaces.
pub struct Aggregator {
    joongna: Arc<JoongnaClient>,
    bunjang: Arc<BunjangClient>,
    daangn: Arc<DaangnClient>,
}

impl Aggregator {
    pub fn new(
        joongna: Arc<JoongnaClient>,
        bunjang: Arc<BunjangClient>,
        daangn: Arc<DaangnClient>,
    ) -> Self {
        Self {
            joongna,
            bunjang,
            daangn,
        }
    }

    /// Run the combined search. Never fails; degraded legs show up as zero
    /// counts.
    #[instrument(skip(self, params), fields(keyword = %params.keyword))]
    pub async fn search(&self, params: &SearchParams) -> CombinedSearch {
        let start = Instant::now();
        let search_options = SearchOptions {
            page: params.page,
            count: params.count,
            sort: params.sort,
            category: params.category,
            min_price: params.min_price.unwrap_or(0),
            max_price: params.max_price.unwrap_or(MAX_PRICE_OPEN),
            exclude_sold: params.exclude_sold,
        };
        let daangn_options = DaangnSearchOptions {
            region: params.region.clone(),
            page: params.page,
            category: params.category,
            min_price: params.min_price,
            max_price: params.max_price,
            only_on_sale: params.exclude_sold,
        };

        let (joongna, bunjang, daangn) = tokio::join!(
            run_leg(Source::Joongna, LEG_TIMEOUT, async {
                Ok(self.joongna.search(&params.keyword, &search_options).await)
            }),
            run_leg(Source::Bunjang, LEG_TIMEOUT, async {
                Ok(self.bunjang.search(&params.keyword, &search_options).await)
            }),
            run_leg(Source::Daangn, LEG_TIMEOUT, async {
                self.daangn.search(&params.keyword, &daangn_options).await
            }),
        );

        let counts = (joongna.len(), bunjang.len(), daangn.len());
        let listings = merge_tagged(joongna, bunjang, daangn);
        info!(
            joongna = counts.0,
            bunjang = counts.1,
            daangn = counts.2,
            total = listings.len(),
            "combined search complete"
        );

        CombinedSearch {
            listings,
            joongna_count: counts.0,
            bunjang_count: counts.1,
            daangn_count: counts.2,
            elapsed_seconds: (start.elapsed().as_millis() as f64) / 1000.0,
        }
    }
}

/// Run one source leg under a wall-clock budget. Failures and timeouts both
/// collapse to an empty contribution so sibling legs stay unaffected.
pub(crate) async fn run_leg<Fut>(source: Source, budget: Duration, fut: Fut) -> Vec<Listing>
where
    Fut: Future<Output = Result<Vec<Listing>, SourceError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(Ok(listings)) => listings,
        Ok(Err(e)) => {
            warn!(source = %source, error = %e, "source leg failed; excluding");
            Vec::new()
        }
        Err(_) => {
            warn!(source = %source, budget_secs = budget.as_secs(), "source leg timed out; excluding");
            Vec::new()
        }
    }
}

/// Tag each batch with its source, concatenate, and sort newest-first.
/// The per-source counts are taken before merging, so cross-source listings
/// are never collapsed: identical ids from different markets stay distinct.
pub(crate) fn merge_tagged(
    joongna: Vec<Listing>,
    bunjang: Vec<Listing>,
    daangn: Vec<Listing>,
) -> Vec<Listing> {
    let mut merged: Vec<Listing> =
        Vec::with_capacity(joongna.len() + bunjang.len() + daangn.len());
    for (source, batch) in [
        (Source::Joongna, joongna),
        (Source::Bunjang, bunjang),
        (Source::Daangn, daangn),
    ] {
        merged.extend(batch.into_iter().map(|mut listing| {
            listing.source = Some(source);
            listing
        }));
    }
    fanout::sort_by_recency(&mut merged, Local::now().naive_local());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_listing;
    use crate::regions::{RegionCache, DEFAULT_TTL};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_isolates_failing_source() {
        // Joongna is down; the other two still contribute.
        let joongna_up = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&joongna_up)
            .await;

        let bunjang_up = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/find_v2.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [{"pid": "b1", "name": "번개 매물", "price": 1000, "status": 0}]
            })))
            .mount(&bunjang_up)
            .await;

        let daangn_up = MockServer::start().await;
        let remix = json!({
            "state": {"loaderData": {
                "routes/kr.buy-sell.s": {"allPage": {"fleamarketArticles": [{
                    "id": "/kr/buy-sell/의자-abcdef1234/",
                    "title": "당근 매물",
                    "price": "2000",
                    "status": "Ongoing"
                }]}}
            }}
        });
        Mock::given(method("GET"))
            .and(path("/kr/buy-sell/s/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<html><body><script>window.__remixContext = {remix};</script></body></html>"
            )))
            .mount(&daangn_up)
            .await;

        let regions = Arc::new(RegionCache::with_page_url("http://unused.invalid/", DEFAULT_TTL));
        let aggregator = Aggregator::new(
            Arc::new(JoongnaClient::with_base_url(&joongna_up.uri())),
            Arc::new(BunjangClient::with_base_urls(&bunjang_up.uri(), &bunjang_up.uri())),
            Arc::new(DaangnClient::with_base_url(&daangn_up.uri(), regions)),
        );

        let params = SearchParams {
            keyword: "매물".into(),
            ..SearchParams::default()
        };
        let result = aggregator.search(&params).await;
        assert_eq!(result.joongna_count, 0);
        assert_eq!(result.bunjang_count, 1);
        assert_eq!(result.daangn_count, 1);
        assert_eq!(result.listings.len(), 2);
    }

    #[tokio::test]
    async fn test_run_leg_passes_results_through() {
        let listings = run_leg(Source::Joongna, Duration::from_secs(1), async {
            Ok(vec![test_listing("1", "ok", None)])
        })
        .await;
        assert_eq!(listings.len(), 1);
    }

    #[tokio::test]
    async fn test_run_leg_failure_is_empty() {
        let listings = run_leg(Source::Bunjang, Duration::from_secs(1), async {
            Err(SourceError::Upstream("down".into()))
        })
        .await;
        assert!(listings.is_empty());
    }

    #[tokio::test]
    async fn test_run_leg_timeout_is_empty() {
        let listings = run_leg(Source::Daangn, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![test_listing("1", "late", None)])
        })
        .await;
        assert!(listings.is_empty());
    }

    #[test]
    fn test_merge_tags_each_batch_once() {
        let merged = merge_tagged(
            vec![test_listing("j1", "중고나라", None)],
            vec![test_listing("b1", "번개장터", None)],
            vec![test_listing("d1", "당근", None)],
        );
        assert_eq!(merged.len(), 3);
        for listing in &merged {
            let expected = match listing.id.as_str() {
                "j1" => Source::Joongna,
                "b1" => Source::Bunjang,
                _ => Source::Daangn,
            };
            assert_eq!(listing.source, Some(expected));
        }
    }

    #[test]
    fn test_merge_keeps_same_id_across_sources() {
        // Identical ids from different marketplaces are different items.
        let merged = merge_tagged(
            vec![test_listing("42", "중고나라 매물", None)],
            vec![test_listing("42", "번개장터 매물", None)],
            Vec::new(),
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_sorts_newest_first_across_sources() {
        let merged = merge_tagged(
            vec![test_listing("old", "old", Some("2024-01-01T00:00:00"))],
            vec![test_listing("new", "new", Some("2024-06-01T00:00:00"))],
            vec![test_listing("mid", "mid", Some("2024-03-01T00:00:00"))],
        );
        let ids: Vec<&str> = merged.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }
}
