#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::{Array, DevMap, HashMap, PerCpuArray},
    programs::XdpContext,
};
use aya_log_ebpf::{debug, info, warn};

use core::sync::atomic::{AtomicU64, Ordering};

use hhd_common::{
    detector::TABLE_ENTRIES,
    frame::XdpFrame,
    maps::{EGRESS_ENTRIES, ROUTE_ENTRIES},
    stats::{STAT_ENTRIES, STAT_TOTAL},
    CounterTable, DropReason, EgressMac, FlowKey, ForwardingPlane, HeavyHitterDetector,
    Observation, Pipeline, RedirectError, RouteEntry, Trace, Verdict,
};

// =============================================================================
// MAPS
// =============================================================================

// Counting table shared by every CPU. Both detector probes land here.
#[map]
static HHD_COUNTERS: Array<u64> = Array::with_max_entries(TABLE_ENTRIES, 0);

// Destination address (network byte order) -> egress port and next-hop MAC
#[map]
static HHD_ROUTES: HashMap<u32, RouteEntry> = HashMap::with_max_entries(ROUTE_ENTRIES, 0);

// Egress port -> source MAC of that port
#[map]
static HHD_EGRESS_MACS: HashMap<u16, EgressMac> = HashMap::with_max_entries(EGRESS_ENTRIES, 0);

// Egress port -> ifindex, consumed by bpf_redirect_map
#[map]
static HHD_EGRESS_DEVICES: DevMap = DevMap::with_max_entries(EGRESS_ENTRIES, 0);

// Per-outcome statistics
#[map]
static HHD_STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(STAT_ENTRIES, 0);

/// Heavy-hitter threshold. Rewritten by the loader before the program is
/// loaded and never changed afterwards.
#[no_mangle]
static HHD_THRESHOLD: u64 = 0;

// =============================================================================
// PROGRAM
// =============================================================================

#[xdp]
pub fn hhd_xdp(ctx: XdpContext) -> u32 {
    let verdict = try_hhd_xdp(&ctx);

    bump_stat(STAT_TOTAL);
    bump_stat(verdict.stat_index());
    log_verdict(&ctx, &verdict);

    match verdict {
        Verdict::Pass => xdp_action::XDP_PASS,
        Verdict::Drop(_) => xdp_action::XDP_DROP,
        Verdict::Abort(_) => xdp_action::XDP_ABORTED,
        Verdict::Redirect(_) => xdp_action::XDP_REDIRECT,
    }
}

#[inline(always)]
fn try_hhd_xdp(ctx: &XdpContext) -> Verdict {
    // The volatile read keeps the compiler from folding the loader-patched
    // value to its placeholder.
    let threshold = unsafe { core::ptr::read_volatile(&HHD_THRESHOLD) };

    let mut frame = XdpFrame::new(ctx);
    debug!(ctx, "frame received, {} bytes", ctx.data_end() - ctx.data());

    let pipeline = Pipeline::new(HeavyHitterDetector::new(threshold), &KernelCounters, &KernelPlane);
    pipeline.process(&mut frame, &XdpTrace { ctx })
}

#[inline(always)]
fn bump_stat(index: u32) {
    if let Some(counter) = HHD_STATS.get_ptr_mut(index) {
        // Per-CPU slot, no other writer.
        unsafe { *counter += 1 };
    }
}

#[inline(always)]
fn log_verdict(ctx: &XdpContext, verdict: &Verdict) {
    match verdict {
        Verdict::Pass => debug!(ctx, "arp frame, pass"),
        Verdict::Drop(DropReason::HeavyHitter) => info!(ctx, "heavy hitter, drop"),
        Verdict::Drop(DropReason::UnsupportedEtherType(ether_type)) => {
            debug!(ctx, "ethertype {:x} unsupported, drop", *ether_type)
        }
        Verdict::Drop(reason) => debug!(ctx, "malformed frame ({}), drop", reason.label()),
        Verdict::Abort(fault) => warn!(ctx, "abort: {}", fault.label()),
        Verdict::Redirect(port) => debug!(ctx, "redirect to port {}", *port),
    }
}

// =============================================================================
// KERNEL BINDINGS OF THE CORE TRAITS
// =============================================================================

struct KernelCounters;

impl CounterTable for KernelCounters {
    #[inline(always)]
    fn increment(&self, index: u32) -> Option<()> {
        let slot = HHD_COUNTERS.get_ptr_mut(index)?;

        // SAFETY: the pointer comes from a successful array lookup and stays
        // valid for the life of the map. Concurrent CPUs only touch it
        // through atomics.
        unsafe { AtomicU64::from_ptr(slot) }.fetch_add(1, Ordering::Relaxed);
        Some(())
    }

    #[inline(always)]
    fn load(&self, index: u32) -> Option<u64> {
        let slot = HHD_COUNTERS.get_ptr_mut(index)?;

        // SAFETY: as above.
        Some(unsafe { AtomicU64::from_ptr(slot) }.load(Ordering::Relaxed))
    }
}

struct KernelPlane;

impl ForwardingPlane for KernelPlane {
    #[inline(always)]
    fn route(&self, dst_addr: u32) -> Option<RouteEntry> {
        unsafe { HHD_ROUTES.get(&dst_addr.to_be()) }.copied()
    }

    #[inline(always)]
    fn egress_mac(&self, port: u16) -> Option<EgressMac> {
        unsafe { HHD_EGRESS_MACS.get(&port) }.copied()
    }

    #[inline(always)]
    fn redirect(&self, port: u8) -> Result<(), RedirectError> {
        // Flags 0: a failed lookup falls back to XDP_ABORTED, reported as Err.
        HHD_EGRESS_DEVICES
            .redirect(u32::from(port), 0)
            .map(|_| ())
            .map_err(|_| RedirectError)
    }
}

struct XdpTrace<'a> {
    ctx: &'a XdpContext,
}

impl Trace for XdpTrace<'_> {
    #[inline(always)]
    fn flow(&self, key: &FlowKey) {
        debug!(
            self.ctx,
            "flow {:i}:{} -> {:i}:{} proto {}",
            key.src_addr,
            key.src_port,
            key.dst_addr,
            key.dst_port,
            key.protocol
        );
    }

    #[inline(always)]
    fn observed(&self, _key: &FlowKey, observation: &Observation) {
        debug!(
            self.ctx,
            "probes {}={} {}={} threshold {}",
            observation.indices[0],
            observation.counts[0],
            observation.indices[1],
            observation.counts[1],
            observation.threshold
        );
    }

    #[inline(always)]
    fn detector_bypassed(&self, key: &FlowKey) {
        debug!(
            self.ctx,
            "protocol {} {:i} -> {:i} skips detection",
            key.protocol,
            key.src_addr,
            key.dst_addr
        );
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
