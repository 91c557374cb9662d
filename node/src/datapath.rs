//! Host-side rendition of the XDP program.
//!
//! [`SoftDatapath`] runs the same `hhd_common` pipeline as the kernel, over
//! plain byte buffers, with in-memory tables standing in for the BPF maps.
//! It is `Sync`: any number of threads may push frames through one instance,
//! the way every CPU runs the XDP program against the same maps.

use crate::config::HhdConfig;
use crate::stats::{DatapathStats, HhdStats};
use hhd_common::{
    CounterTable, EgressMac, FlowKey, ForwardingPlane, HeavyHitterDetector, Observation,
    Pipeline, ProbeLayout, RedirectError, RouteEntry, Trace, Verdict,
};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

// =============================================================================
// COUNTING TABLE
// =============================================================================

/// Fixed-size array of atomic counters, allocated once.
#[derive(Debug)]
pub struct CountingTable {
    slots: Box<[AtomicU64]>,
}

impl CountingTable {
    /// Table sized for `layout`.
    pub fn new(layout: ProbeLayout) -> Self {
        Self::with_len(layout.table_len() as usize)
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<u64> {
        self.slots
            .get(index as usize)
            .map(|slot| slot.load(Ordering::Relaxed))
    }

    /// The `n` largest counters as `(index, value)`, largest first.
    pub fn hottest(&self, n: usize) -> Vec<(u32, u64)> {
        let mut slots: Vec<(u32, u64)> = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (i as u32, slot.load(Ordering::Relaxed)))
            .filter(|&(_, value)| value > 0)
            .collect();
        slots.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        slots.truncate(n);
        slots
    }
}

impl CounterTable for CountingTable {
    #[inline]
    fn increment(&self, index: u32) -> Option<()> {
        self.slots
            .get(index as usize)?
            .fetch_add(1, Ordering::Relaxed);
        Some(())
    }

    #[inline]
    fn load(&self, index: u32) -> Option<u64> {
        self.get(index)
    }
}

// =============================================================================
// FORWARDING TABLES
// =============================================================================

/// Route, egress MAC and egress device tables.
///
/// Routes are keyed by destination address in host byte order here; only the
/// kernel map stores network byte order.
#[derive(Debug, Clone, Default)]
pub struct ForwardingTables {
    routes: HashMap<u32, RouteEntry>,
    egress_macs: HashMap<u16, EgressMac>,
    devices: HashMap<u8, String>,
}

impl ForwardingTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HhdConfig) -> Self {
        let mut tables = Self::new();
        for egress in &config.egress {
            tables.insert_egress(egress.port, egress.mac.octets(), &egress.interface);
        }
        for route in &config.routes {
            tables.insert_route(route.destination, route.egress_port, route.mac.octets());
        }
        tables
    }

    pub fn insert_route(&mut self, destination: Ipv4Addr, egress_port: u8, dst_mac: [u8; 6]) {
        self.routes
            .insert(u32::from(destination), RouteEntry::new(egress_port, dst_mac));
    }

    /// Give `port` a source MAC and bind it to `device`.
    pub fn insert_egress(&mut self, port: u8, src_mac: [u8; 6], device: &str) {
        self.egress_macs
            .insert(u16::from(port), EgressMac { src_mac });
        self.devices.insert(port, device.to_string());
    }

    /// Leave the MAC of `port` in place but unbind its device, so redirects
    /// through it fail.
    pub fn unbind_device(&mut self, port: u8) -> Option<String> {
        self.devices.remove(&port)
    }

    pub fn device(&self, port: u8) -> Option<&str> {
        self.devices.get(&port).map(String::as_str)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl ForwardingPlane for ForwardingTables {
    #[inline]
    fn route(&self, dst_addr: u32) -> Option<RouteEntry> {
        self.routes.get(&dst_addr).copied()
    }

    #[inline]
    fn egress_mac(&self, port: u16) -> Option<EgressMac> {
        self.egress_macs.get(&port).copied()
    }

    #[inline]
    fn redirect(&self, port: u8) -> Result<(), RedirectError> {
        if self.devices.contains_key(&port) {
            Ok(())
        } else {
            Err(RedirectError)
        }
    }
}

// =============================================================================
// SOFTWARE DATAPATH
// =============================================================================

struct TracingTrace;

impl Trace for TracingTrace {
    fn flow(&self, key: &FlowKey) {
        trace!(
            src = %Ipv4Addr::from(key.src_addr),
            src_port = key.src_port,
            dst = %Ipv4Addr::from(key.dst_addr),
            dst_port = key.dst_port,
            protocol = key.protocol,
            "flow identified"
        );
    }

    fn observed(&self, _key: &FlowKey, observation: &Observation) {
        trace!(
            indices = ?observation.indices,
            counts = ?observation.counts,
            threshold = observation.threshold,
            "flow counted"
        );
    }

    fn detector_bypassed(&self, key: &FlowKey) {
        trace!(
            protocol = key.protocol,
            src = %Ipv4Addr::from(key.src_addr),
            dst = %Ipv4Addr::from(key.dst_addr),
            "not tcp/udp, detector skipped"
        );
    }
}

/// The detector and forwarding core over in-memory tables.
pub struct SoftDatapath {
    detector: HeavyHitterDetector,
    counters: CountingTable,
    tables: ForwardingTables,
    stats: DatapathStats,
}

impl SoftDatapath {
    pub fn new(threshold: u64, tables: ForwardingTables) -> Self {
        Self::with_layout(threshold, ProbeLayout::Shared, tables)
    }

    pub fn with_layout(threshold: u64, layout: ProbeLayout, tables: ForwardingTables) -> Self {
        Self {
            detector: HeavyHitterDetector::with_layout(threshold, layout),
            counters: CountingTable::new(layout),
            tables,
            stats: DatapathStats::new(),
        }
    }

    /// Datapath as the XDP program would run with this configuration.
    pub fn from_config(config: &HhdConfig) -> Self {
        Self::new(config.threshold, ForwardingTables::from_config(config))
    }

    /// Run one frame to its outcome. Redirected frames are rewritten in place.
    pub fn process(&self, frame: &mut [u8]) -> Verdict {
        let pipeline = Pipeline::new(self.detector, &self.counters, &self.tables);
        let verdict = pipeline.process(frame, &TracingTrace);

        self.stats.record(&verdict);
        match verdict {
            Verdict::Abort(fault) => warn!(?fault, "abort: {}", fault.label()),
            Verdict::Drop(reason) => debug!(?reason, "drop: {}", reason.label()),
            Verdict::Redirect(port) => {
                debug!(port, device = ?self.tables.device(port), "redirect")
            }
            Verdict::Pass => debug!("pass"),
        }

        verdict
    }

    pub fn detector(&self) -> &HeavyHitterDetector {
        &self.detector
    }

    pub fn counters(&self) -> &CountingTable {
        &self.counters
    }

    pub fn tables(&self) -> &ForwardingTables {
        &self.tables
    }

    pub fn stats(&self) -> HhdStats {
        self.stats.snapshot()
    }
}
