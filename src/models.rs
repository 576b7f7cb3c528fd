//! Data models for marketplace listings and their supporting lookups.
//!
//! This module defines the core data structures used throughout the service:
//! - [`Listing`]: the canonical, source-agnostic record of one item for sale
//! - [`Source`]: which marketplace a listing came from
//! - [`ListingStatus`]: normalized sale status across all three upstreams
//! - [`CategoryNode`]: one node of an upstream category tree
//! - [`RegionEntry`]: one resolved Daangn region
//!
//! Every scraper maps its own raw upstream records into [`Listing`] so the
//! rest of the pipeline (dedup, time filtering, merge sort, the REST layer)
//! only ever sees one shape. The JSON field names match the upstream-facing
//! API responses, hence the Korean display strings on [`ListingStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The marketplace a [`Listing`] originated from.
///
/// Assigned exactly once, by the aggregation layer after retrieval; the
/// per-source clients never tag their own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Joongna,
    Bunjang,
    Daangn,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Joongna => "joongna",
            Source::Bunjang => "bunjang",
            Source::Daangn => "daangn",
        };
        f.write_str(s)
    }
}

/// Normalized sale status.
///
/// Serialized with the Korean display strings the upstreams themselves use,
/// so API consumers see the same vocabulary regardless of source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    /// 판매중 (on sale).
    #[serde(rename = "판매중")]
    OnSale,
    /// 예약중 (reserved by a buyer).
    #[serde(rename = "예약중")]
    Reserved,
    /// 판매완료 (sold).
    #[serde(rename = "판매완료")]
    Sold,
    /// 숨김 (hidden by the seller).
    #[serde(rename = "숨김")]
    Hidden,
    /// Anything the upstream reports that we do not recognize.
    #[serde(other, rename = "알수없음")]
    Unknown,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListingStatus::OnSale => "판매중",
            ListingStatus::Reserved => "예약중",
            ListingStatus::Sold => "판매완료",
            ListingStatus::Hidden => "숨김",
            ListingStatus::Unknown => "알수없음",
        };
        f.write_str(s)
    }
}

/// Canonical normalized record of one marketplace item.
///
/// Listings are value objects: they carry no back-references and are never
/// mutated after construction, except for the single `source` tag assignment
/// performed during aggregation. A non-empty `title` is the admission
/// criterion: raw records with empty titles are dropped before a `Listing`
/// is ever built (upstreams pad result pages with placeholder/ad records).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Source-local identifier. Unique within one source only; cross-source
    /// dedup never merges by id.
    pub id: String,
    /// Item title. Never empty.
    pub title: String,
    /// Price in won. 0 means free or unspecified.
    pub price: u64,
    /// Pre-formatted display price ("1,234,567원", or a free/unspecified
    /// sentinel such as "나눔🧡" / "가격미정").
    pub price_str: String,
    pub status: ListingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Loosely-typed registration/update time as the upstream reported it.
    /// Resolved into an absolute timestamp by [`crate::timestamp::resolve`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub views: u64,
    /// Escrow-style payment offered (Bunjang 번개페이 / Joongna 중나페이).
    #[serde(default)]
    pub safe_payment: bool,
    #[serde(default)]
    pub free_shipping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Set once by the aggregation layer; absent in single-source output
    /// where the envelope already names the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// One node of an upstream category tree, children nested in upstream order.
///
/// `count` is the upstream's reported listing total and is advisory only.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    pub id: String,
    pub title: String,
    pub count: u64,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub icon_url: String,
    pub children: Vec<CategoryNode>,
}

/// Flat view of a [`CategoryNode`] with children by id, for O(1) lookups.
#[derive(Debug, Clone, Serialize)]
pub struct FlatCategory {
    pub id: String,
    pub title: String,
    pub count: u64,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub icon_url: String,
    pub children: Vec<String>,
}

/// One Daangn region as parsed from the regions index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionEntry {
    /// District name, e.g. "강남구".
    pub name: String,
    /// Stable upstream identifier, e.g. "강남구-10". Opaque.
    pub code: String,
    /// Parent administrative name, e.g. "서울특별시".
    pub city: String,
    /// Display string: city + name.
    pub full: String,
}

/// Format a won amount with thousands separators, e.g. `1234567` →
/// `"1,234,567원"`.
pub fn format_price_krw(price: u64) -> String {
    let digits = price.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push('원');
    out
}

/// Render listings as a human-readable block, one numbered entry per item.
///
/// Title, display price, and URL pass through verbatim; this rendering is
/// lossless for those three fields.
pub fn format_listings(listings: &[Listing], show_url: bool) -> String {
    if listings.is_empty() {
        return "검색 결과가 없습니다.".to_string();
    }

    let mut lines = Vec::new();
    lines.push("=".repeat(60));
    lines.push(format!(" 검색 결과: {}개", listings.len()));
    lines.push("=".repeat(60));

    for (i, item) in listings.iter().enumerate() {
        lines.push(format!("\n[{}] {}", i + 1, item.title));
        lines.push(format!("    💰 가격: {}", item.price_str));
        lines.push(format!("    📌 상태: {}", item.status));
        if let Some(location) = item.location.as_deref().filter(|l| !l.is_empty()) {
            lines.push(format!("    📍 지역: {location}"));
        }
        if let Some(time) = item.time.as_deref().filter(|t| !t.is_empty()) {
            lines.push(format!("    🕐 등록: {time}"));
        }
        if let Some(seller) = item.seller.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("    👤 판매자: {seller}"));
        }
        if item.safe_payment {
            lines.push("    🔒 안전결제: 지원".to_string());
        }
        if show_url {
            lines.push(format!("    🔗 링크: {}", item.url));
        }
        lines.push(format!("    {}", "─".repeat(40)));
    }

    lines.join("\n")
}

#[cfg(test)]
pub(crate) fn test_listing(id: &str, title: &str, time: Option<&str>) -> Listing {
    Listing {
        id: id.to_string(),
        title: title.to_string(),
        price: 10_000,
        price_str: format_price_krw(10_000),
        status: ListingStatus::OnSale,
        image_url: None,
        location: None,
        time: time.map(str::to_string),
        url: format!("https://example.com/product/{id}"),
        seller: None,
        likes: 0,
        views: 0,
        safe_payment: false,
        free_shipping: false,
        category: None,
        source: None,
    }
}
