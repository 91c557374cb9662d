//! Names the loader uses to find the program, its maps and its globals.

pub const PROGRAM_NAME: &str = "hhd_xdp";

pub const COUNTERS_MAP: &str = "HHD_COUNTERS";
pub const ROUTES_MAP: &str = "HHD_ROUTES";
pub const EGRESS_MACS_MAP: &str = "HHD_EGRESS_MACS";
pub const EGRESS_DEVICES_MAP: &str = "HHD_EGRESS_DEVICES";
pub const STATS_MAP: &str = "HHD_STATS";

/// Write-once global holding the heavy-hitter threshold.
pub const THRESHOLD_GLOBAL: &str = "HHD_THRESHOLD";

/// Capacity of the route table.
pub const ROUTE_ENTRIES: u32 = 1024;

/// Capacity of the egress MAC table and the device map. Indexed directly by
/// port number, so slot 0 is never used.
pub const EGRESS_ENTRIES: u32 = crate::forward::MAX_EGRESS_PORT as u32 + 1;
