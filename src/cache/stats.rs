//! Cache Statistics Module
//!
//! Tracks cache metrics including hits, misses, prune runs and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of touching reads that found a value
    pub hits: u64,
    /// Number of touching reads that found nothing
    pub misses: u64,
    /// Number of prune units removed by eviction
    pub evictions: u64,
    /// Number of prune runs, including ones with nothing to evict
    pub prunes: u64,
    /// Current number of leaves in the cache
    pub total_entries: usize,
    /// Current aggregate size in bytes
    pub total_size: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Prune ==
    /// Counts one prune run and the units it evicted.
    pub fn record_prune(&mut self, evicted: usize) {
        self.prunes += 1;
        self.evictions += evicted as u64;
    }

    // == Update Totals ==
    pub fn set_totals(&mut self, entries: usize, size: usize) {
        self.total_entries = entries;
        self.total_size = size;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.prunes, 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_prune() {
        let mut stats = CacheStats::new();
        stats.record_prune(3);
        stats.record_prune(0);
        assert_eq!(stats.prunes, 2);
        assert_eq!(stats.evictions, 3);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = CacheStats::new();
        stats.set_totals(4, 120);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_entries"], 4);
        assert_eq!(json["total_size"], 120);
    }
}
