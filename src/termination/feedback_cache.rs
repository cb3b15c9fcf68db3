use std::collections::HashMap;
use std::sync::RwLock;

use crate::rtcp::remb::Remb;
use crate::rtcp::report_block::ReportBlock;

/// Latest feedback seen from one remote receiver (keyed by the SSRC it sends
/// feedback *as*).
#[derive(Debug, Clone, Default)]
pub struct FeedbackCacheEntry {
    pub reports: Option<Vec<ReportBlock>>,
    pub remb: Option<Remb>,
    pub last_update_ms: i64,
}

/// Per-SSRC cache of reception reports and REMB estimates.
///
/// Concurrent-read/single-writer-per-key; entries are replaced, never
/// accumulated, so the cache size is bounded by the number of distinct
/// remote SSRCs. `expire_ms` of zero disables time-based eviction; a tick
/// then simply consumes whatever is latest.
pub struct FeedbackCache {
    entries: RwLock<HashMap<u32, FeedbackCacheEntry>>,
    expire_ms: i64,
}

impl FeedbackCache {
    #[must_use]
    pub fn new(expire_ms: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expire_ms,
        }
    }

    /// Merge fresh feedback for `ssrc`. Ignored when `ssrc` is zero or both
    /// sides are absent; a missing side inherits the cached one.
    pub fn update(
        &self,
        ssrc: u32,
        reports: Option<Vec<ReportBlock>>,
        remb: Option<Remb>,
        now_ms: i64,
    ) {
        let has_reports = reports.as_ref().is_some_and(|r| !r.is_empty());
        if ssrc == 0 || (!has_reports && remb.is_none()) {
            return;
        }
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        let entry = entries.entry(ssrc).or_default();
        if has_reports {
            entry.reports = reports;
        }
        if remb.is_some() {
            entry.remb = remb;
        }
        entry.last_update_ms = now_ms;
    }

    #[must_use]
    pub fn get(&self, ssrc: u32) -> Option<FeedbackCacheEntry> {
        self.entries.read().ok()?.get(&ssrc).cloned()
    }

    /// All entries still fresh at `now_ms`, keyed by feedback-sender SSRC.
    #[must_use]
    pub fn snapshot(&self, now_ms: i64) -> HashMap<u32, FeedbackCacheEntry> {
        let Ok(entries) = self.entries.read() else {
            return HashMap::new();
        };
        entries
            .iter()
            .filter(|(_, e)| self.expire_ms <= 0 || e.last_update_ms >= now_ms - self.expire_ms)
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Evict entries older than the expiry window (no-op when disabled).
    pub fn gc(&self, now_ms: i64) {
        if self.expire_ms <= 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, e| e.last_update_ms >= now_ms - self.expire_ms);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FeedbackCache {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(ssrc: u32, fraction: u8) -> ReportBlock {
        ReportBlock {
            ssrc,
            fraction_lost: fraction,
            ..Default::default()
        }
    }

    fn remb(bps: u64) -> Remb {
        Remb::from_bitrate(1, bps, vec![2]).unwrap()
    }

    #[test]
    fn zero_ssrc_and_empty_updates_ignored() {
        let cache = FeedbackCache::default();
        cache.update(0, Some(vec![block(2, 0)]), None, 1);
        cache.update(5, None, None, 1);
        cache.update(5, Some(vec![]), None, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn partial_update_inherits_missing_side() {
        let cache = FeedbackCache::default();
        cache.update(5, Some(vec![block(2, 10)]), None, 100);
        cache.update(5, None, Some(remb(1_000_000)), 200);

        let entry = cache.get(5).unwrap();
        assert_eq!(entry.reports.as_ref().unwrap()[0].fraction_lost, 10);
        assert!(entry.remb.is_some());
        assert_eq!(entry.last_update_ms, 200);
    }

    #[test]
    fn repeated_updates_do_not_grow_the_cache() {
        let cache = FeedbackCache::default();
        for i in 0..100 {
            cache.update(5, Some(vec![block(2, i as u8)]), None, i);
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(5).unwrap().reports.unwrap()[0].fraction_lost, 99);
    }

    #[test]
    fn expiry_window_filters_snapshot() {
        let cache = FeedbackCache::new(1000);
        cache.update(1, Some(vec![block(2, 0)]), None, 100);
        cache.update(2, Some(vec![block(3, 0)]), None, 1500);
        let fresh = cache.snapshot(2000);
        assert!(!fresh.contains_key(&1));
        assert!(fresh.contains_key(&2));

        cache.gc(2000);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_expiry_keeps_latest_only_semantics() {
        let cache = FeedbackCache::default();
        cache.update(1, Some(vec![block(2, 0)]), None, 100);
        // snapshot far in the future still sees the latest value
        assert!(cache.snapshot(10_000).contains_key(&1));
    }
}
