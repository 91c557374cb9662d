//! Slots of the per-outcome statistics array shared by the XDP program and
//! the loader.

/// Every frame seen.
pub const STAT_TOTAL: u32 = 0;
pub const STAT_PASSED: u32 = 1;
/// Malformed or unsupported frames.
pub const STAT_DROPPED: u32 = 2;
pub const STAT_HEAVY_HITTER: u32 = 3;
pub const STAT_ABORTED: u32 = 4;
pub const STAT_REDIRECTED: u32 = 5;

pub const STAT_ENTRIES: u32 = 6;
