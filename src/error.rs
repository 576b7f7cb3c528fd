//! Error taxonomy for the collection engine.
//!
//! Transport and structural-parse failures are *not* errors at the client
//! boundary: the scrapers degrade to an empty result set with a logged
//! diagnostic, so callers treat "no results" and "source down" identically.
//! Only two classes of failure propagate as values of these types:
//!
//! - [`SourceError::Upstream`]: a fan-out worker's fetch failed outright;
//!   the collector catches and excludes it without aborting siblings.
//! - [`RegionError`]: the region list fetch failed, or parsed to zero
//!   entries. The empty-parse case means the upstream page structure
//!   changed, which must never silently populate the cache.
//!
//! Bad input (missing keyword, unknown city) is rejected at the REST layer
//! before any network call.

use thiserror::Error;

/// A failure from one marketplace client.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream fetch failed (transport error or non-2xx) with no
    /// fallback strategy left to try.
    #[error("upstream fetch failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Region(#[from] RegionError),
}

/// A failure while loading or consulting the region list.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("region page fetch failed: {0}")]
    Fetch(String),

    /// The regions page parsed to zero entries. Treated as a structural
    /// break in the upstream markup, not as "no regions".
    #[error("region page yielded no entries; page structure may have changed")]
    EmptyParse,
}
