//! Per-outcome statistics
//!
//! The XDP program keeps these in a per-CPU array summed by the loader; the
//! software datapath keeps them in atomics. Both end up as an [`HhdStats`].

use hhd_common::stats::{
    STAT_ABORTED, STAT_DROPPED, STAT_ENTRIES, STAT_HEAVY_HITTER, STAT_PASSED, STAT_REDIRECTED,
    STAT_TOTAL,
};
use hhd_common::Verdict;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HhdStats {
    pub total_packets: u64,
    pub passed_packets: u64,
    /// Malformed frames and unsupported ethertypes
    pub dropped_malformed: u64,
    pub dropped_heavy_hitter: u64,
    pub aborted_packets: u64,
    pub redirected_packets: u64,
}

impl HhdStats {
    /// Build from the raw slots, indexed as in `hhd_common::stats`.
    pub fn from_slots(slots: &[u64; STAT_ENTRIES as usize]) -> Self {
        Self {
            total_packets: slots[STAT_TOTAL as usize],
            passed_packets: slots[STAT_PASSED as usize],
            dropped_malformed: slots[STAT_DROPPED as usize],
            dropped_heavy_hitter: slots[STAT_HEAVY_HITTER as usize],
            aborted_packets: slots[STAT_ABORTED as usize],
            redirected_packets: slots[STAT_REDIRECTED as usize],
        }
    }

    pub fn dropped_packets(&self) -> u64 {
        self.dropped_malformed + self.dropped_heavy_hitter
    }

    /// Drop rate percentage, both drop reasons included
    pub fn drop_rate(&self) -> f64 {
        self.percentage(self.dropped_packets())
    }

    pub fn heavy_hitter_rate(&self) -> f64 {
        self.percentage(self.dropped_heavy_hitter)
    }

    pub fn abort_rate(&self) -> f64 {
        self.percentage(self.aborted_packets)
    }

    pub fn redirect_rate(&self) -> f64 {
        self.percentage(self.redirected_packets)
    }

    fn percentage(&self, count: u64) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            (count as f64 / self.total_packets as f64) * 100.0
        }
    }
}

/// Atomic outcome counters for the software datapath
#[derive(Debug, Default)]
pub struct DatapathStats {
    slots: [AtomicU64; STAT_ENTRIES as usize],
}

impl DatapathStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, verdict: &Verdict) {
        self.slots[STAT_TOTAL as usize].fetch_add(1, Ordering::Relaxed);
        self.slots[verdict.stat_index() as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HhdStats {
        let slots = std::array::from_fn(|i| self.slots[i].load(Ordering::Relaxed));
        HhdStats::from_slots(&slots)
    }
}
