//! Detection of per-record association loads.
//!
//! A per-record load happens when an association is read on a record that has
//! no pending bulk loader (or whose loader does not declare that association).
//! Rendering N records that each fall back this way costs N round trips where
//! one batch load would do. The tracker counts these fallbacks per
//! `(table, association)` and warns once a pair reaches the threshold.
//!
//! ```ignore
//! let reader = AssociationReader::new(preloader).with_tracker(N1QueryTracker::new());
//!
//! // Without a bulk loader each read is its own fetch:
//! for post in &posts {
//!     reader.read(post, "author")?;
//! }
//! assert!(reader.n1_stats().potential_n1 > 0);
//! ```

use std::collections::HashMap;
use std::time::Instant;

/// Counts per-record association loads.
#[derive(Debug)]
pub struct N1QueryTracker {
    /// (table, association) -> fallback load count
    counts: HashMap<(String, String), usize>,
    threshold: usize,
    enabled: bool,
    call_sites: Vec<CallSite>,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a per-record load was triggered.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub table: String,
    pub association: String,
    pub file: &'static str,
    pub line: u32,
    pub timestamp: Instant,
}

/// Summary of recorded per-record loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct N1Stats {
    /// Total number of per-record loads recorded
    pub total_loads: usize,
    /// Number of distinct (table, association) pairs loaded
    pub associations_loaded: usize,
    /// Number of pairs that reached the threshold
    pub potential_n1: usize,
}

impl N1QueryTracker {
    /// Create a tracker with the default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            call_sites: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one per-record load of `association` on a `table` record.
    ///
    /// Warns when the count for the pair reaches the threshold.
    #[track_caller]
    pub fn record_load(&mut self, table: &str, association: &str) {
        if !self.enabled {
            return;
        }

        let count = self
            .counts
            .entry((table.to_string(), association.to_string()))
            .or_insert(0);
        *count += 1;
        let count = *count;

        let caller = std::panic::Location::caller();
        self.call_sites.push(CallSite {
            table: table.to_string(),
            association: association.to_string(),
            file: caller.file(),
            line: caller.line(),
            timestamp: Instant::now(),
        });

        if count == self.threshold {
            self.emit_warning(table, association, count);
        }
    }

    fn emit_warning(&self, table: &str, association: &str, count: usize) {
        tracing::warn!(
            target: "rendercache::n1",
            table = table,
            association = association,
            loads = count,
            threshold = self.threshold,
            "Per-record association loads detected; declare '{}' in the relation's bulk load spec",
            association
        );

        let sites = self
            .call_sites
            .iter()
            .filter(|s| s.table == table && s.association == association)
            .take(5);
        for (i, site) in sites.enumerate() {
            tracing::debug!(
                target: "rendercache::n1",
                index = i,
                file = site.file,
                line = site.line,
                "  [{}] {}:{}",
                i,
                site.file,
                site.line
            );
        }
    }

    /// Clear all counts and call sites.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.call_sites.clear();
    }

    #[must_use]
    pub fn count_for(&self, table: &str, association: &str) -> usize {
        self.counts
            .get(&(table.to_string(), association.to_string()))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_loads: self.counts.values().sum(),
            associations_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|&&c| c >= self.threshold)
                .count(),
        }
    }

    #[must_use]
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }
}

/// Captures tracker stats at the start of a unit of work (one render, say) and
/// logs what changed when it finishes.
#[derive(Debug)]
pub struct N1DetectionScope {
    initial_stats: N1Stats,
    threshold: usize,
    verbose: bool,
}

impl N1DetectionScope {
    #[must_use]
    pub fn new(initial_stats: N1Stats, threshold: usize) -> Self {
        tracing::debug!(
            target: "rendercache::n1",
            threshold = threshold,
            "N+1 detection scope started"
        );
        Self {
            initial_stats,
            threshold,
            verbose: false,
        }
    }

    #[must_use]
    pub fn from_tracker(tracker: &N1QueryTracker) -> Self {
        Self::new(tracker.stats(), tracker.threshold())
    }

    /// Log the summary at info level even when nothing was detected.
    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Difference between `final_stats` and the stats captured at creation.
    #[must_use]
    pub fn delta(&self, final_stats: &N1Stats) -> N1Stats {
        N1Stats {
            total_loads: final_stats
                .total_loads
                .saturating_sub(self.initial_stats.total_loads),
            associations_loaded: final_stats
                .associations_loaded
                .saturating_sub(self.initial_stats.associations_loaded),
            potential_n1: final_stats
                .potential_n1
                .saturating_sub(self.initial_stats.potential_n1),
        }
    }

    /// Log what happened since the scope started and return the delta.
    pub fn log_summary(&self, final_stats: &N1Stats) -> N1Stats {
        let delta = self.delta(final_stats);
        if delta.potential_n1 > 0 {
            tracing::warn!(
                target: "rendercache::n1",
                potential_n1 = delta.potential_n1,
                total_loads = delta.total_loads,
                associations = delta.associations_loaded,
                threshold = self.threshold,
                "Per-record association loads detected in this scope"
            );
        } else if self.verbose {
            tracing::info!(
                target: "rendercache::n1",
                total_loads = delta.total_loads,
                associations = delta.associations_loaded,
                "N+1 detection scope completed (no issues)"
            );
        } else {
            tracing::debug!(
                target: "rendercache::n1",
                total_loads = delta.total_loads,
                associations = delta.associations_loaded,
                "N+1 detection scope completed (no issues)"
            );
        }
        delta
    }
}
