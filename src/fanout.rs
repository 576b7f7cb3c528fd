//! Bounded-parallelism category fan-out with dedup, recency filtering, and
//! merge sorting.
//!
//! Keyword-less "recent listings" queries require one upstream call per
//! category code. [`collect`] runs those calls through a bounded worker pool
//! (each call still passes through its source's [`crate::throttle::Throttle`],
//! which independently bounds true upstream concurrency), merges results as
//! workers complete, drops within-source duplicates by id, optionally applies
//! a recency cutoff, and returns the merged set sorted newest-first.
//!
//! A failing worker is logged and excluded; it never aborts its siblings or
//! the overall call.

use crate::error::SourceError;
use crate::models::Listing;
use crate::timestamp;
use chrono::{Duration, Local, NaiveDateTime};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

/// Fan out one fetch per task, merge, dedup, filter, sort.
///
/// # Arguments
///
/// * `tasks` - category codes (or equivalent task keys) to fetch
/// * `max_workers` - worker-pool width; clamped to at least 1
/// * `within_minutes` - optional recency window; listings older than
///   `now − within_minutes` are dropped, and listings whose timestamp cannot
///   be resolved are dropped too (conservative default)
/// * `fetch` - one `fetchCategoryRecent`-equivalent call per task
pub async fn collect<T, F, Fut>(
    tasks: Vec<T>,
    max_workers: usize,
    within_minutes: Option<u32>,
    fetch: F,
) -> Vec<Listing>
where
    T: Copy + fmt::Display,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<Vec<Listing>, SourceError>>,
{
    let task_count = tasks.len();
    info!(
        tasks = task_count,
        max_workers,
        ?within_minutes,
        "starting category fan-out"
    );

    let outcomes: Vec<(String, Result<Vec<Listing>, SourceError>)> = stream::iter(tasks)
        .map(|task| {
            let fut = fetch(task);
            async move { (task.to_string(), fut.await) }
        })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await;

    // Merge as completed: first occurrence of an id wins, later duplicates
    // from sibling categories are dropped. The set is confined to this task.
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut merged: Vec<Listing> = Vec::new();
    for (task, outcome) in outcomes {
        match outcome {
            Ok(items) => {
                for item in items {
                    if item.id.is_empty() || !seen_ids.insert(item.id.clone()) {
                        continue;
                    }
                    merged.push(item);
                }
            }
            Err(e) => {
                warn!(category = %task, error = %e, "fan-out worker failed; excluding");
            }
        }
    }

    let now = Local::now().naive_local();
    if let Some(minutes) = within_minutes {
        let before = merged.len();
        apply_recency_filter(&mut merged, minutes, now);
        debug!(
            minutes,
            before,
            after = merged.len(),
            "applied recency window"
        );
    }
    sort_by_recency(&mut merged, now);

    info!(collected = merged.len(), tasks = task_count, "fan-out complete");
    merged
}

/// Drop listings older than `now − minutes`. Unresolvable timestamps resolve
/// to the minimum sentinel and therefore never pass the window.
pub fn apply_recency_filter(listings: &mut Vec<Listing>, minutes: u32, now: NaiveDateTime) {
    let cutoff = now - Duration::minutes(i64::from(minutes));
    listings.retain(|item| timestamp::resolve(item.time.as_deref(), now) >= cutoff);
}

/// Stable sort, newest first. Unresolvable timestamps sort last.
pub fn sort_by_recency(listings: &mut Vec<Listing>, now: NaiveDateTime) {
    let mut keyed: Vec<(NaiveDateTime, Listing)> = std::mem::take(listings)
        .into_iter()
        .map(|item| (timestamp::resolve(item.time.as_deref(), now), item))
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    listings.extend(keyed.into_iter().map(|(_, item)| item));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_listing;
    use chrono::NaiveDate;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn iso(dt: NaiveDateTime) -> String {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    #[tokio::test]
    async fn test_collect_dedups_overlapping_ids() {
        let fetch = |category: u32| async move {
            match category {
                1 => Ok(vec![
                    test_listing("a", "첫 번째 a", None),
                    test_listing("b", "b", None),
                ]),
                _ => Ok(vec![
                    test_listing("a", "두 번째 a", None),
                    test_listing("c", "c", None),
                ]),
            }
        };
        // One worker so completion order is deterministic.
        let merged = collect(vec![1u32, 2], 1, None, fetch).await;
        assert_eq!(merged.len(), 3);
        let a = merged.iter().find(|l| l.id == "a").unwrap();
        assert_eq!(a.title, "첫 번째 a");
    }

    #[tokio::test]
    async fn test_collect_excludes_failed_worker() {
        let fetch = |category: u32| async move {
            if category == 2 {
                Err(SourceError::Upstream("boom".into()))
            } else {
                Ok(vec![test_listing(&format!("id{category}"), "ok", None)])
            }
        };
        let merged = collect(vec![1u32, 2, 3], 3, None, fetch).await;
        let mut ids: Vec<_> = merged.iter().map(|l| l.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["id1", "id3"]);
    }

    #[tokio::test]
    async fn test_collect_drops_empty_ids() {
        let fetch = |_: u32| async move { Ok(vec![test_listing("", "무제", None)]) };
        let merged = collect(vec![1u32], 1, None, fetch).await;
        assert!(merged.is_empty());
    }

    #[test]
    fn test_recency_filter_boundaries() {
        let now = reference();
        let three_min = iso(now - Duration::minutes(3));
        let mut items = vec![test_listing("x", "x", Some(&three_min))];

        let mut pass = items.clone();
        apply_recency_filter(&mut pass, 5, now);
        assert_eq!(pass.len(), 1);

        apply_recency_filter(&mut items, 2, now);
        assert!(items.is_empty());
    }

    #[test]
    fn test_recency_filter_excludes_unresolvable() {
        let now = reference();
        let mut items = vec![test_listing("x", "x", Some("최근"))];
        apply_recency_filter(&mut items, 60, now);
        assert!(items.is_empty());
    }

    #[test]
    fn test_sort_newest_first_with_sentinel_last() {
        let now = reference();
        let older = iso(now - Duration::hours(2));
        let newer = iso(now - Duration::minutes(1));
        let mut items = vec![
            test_listing("old", "old", Some(&older)),
            test_listing("junk", "junk", Some("???")),
            test_listing("new", "new", Some(&newer)),
        ];
        sort_by_recency(&mut items, now);
        let ids: Vec<_> = items.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "junk"]);
    }
}
