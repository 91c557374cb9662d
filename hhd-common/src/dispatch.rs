//! Per-frame state machine and its terminal outcomes.
//!
//! ```text
//! Ethernet --fail--> Drop | ARP --> Pass | other --> Drop
//!    | IPv4
//! IPv4 --fail--> Drop | TCP/UDP --> transport | other --> forward
//! transport --fail--> Drop --> flow key --> detector --heavy--> Drop
//!    |
//! forward --> Redirect(port) | Abort
//! ```

use crate::{
    detector::{CounterTable, HeavyHitterDetector, Observation},
    flow::FlowKey,
    forward::{self, ForwardingPlane},
    frame::Frame,
    parse::{
        parse_ethernet, parse_ipv4, parse_tcp, parse_udp, Cursor, ParseError, Transport,
        ETH_P_ARP, ETH_P_IP, IPPROTO_TCP, IPPROTO_UDP,
    },
    stats,
};

// =============================================================================
// OUTCOMES
// =============================================================================

/// Deliberate filtering decisions. These are normal traffic outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    Malformed(ParseError),
    /// Neither IPv4 nor ARP.
    UnsupportedEtherType(u16),
    /// Both probe counters are above the threshold.
    HeavyHitter,
}

impl DropReason {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Malformed(err) => err.label(),
            Self::UnsupportedEtherType(_) => "unsupported ethertype",
            Self::HeavyHitter => "heavy hitter",
        }
    }
}

/// Operational faults. Each one points at broken configuration or a broken
/// environment, never at the traffic itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    ProbeOutOfRange(u32),
    CounterSlotMissing(u32),
    /// No route for this destination (host byte order).
    RouteMiss(u32),
    EgressPortOutOfRange(u8),
    EgressMacMiss(u8),
    RedirectFailed(u8),
    /// The frame became too short to hold the link-layer addresses.
    RewriteOutOfBounds,
}

impl Fault {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ProbeOutOfRange(_) => "probe index out of range",
            Self::CounterSlotMissing(_) => "counter slot missing",
            Self::RouteMiss(_) => "no route for destination",
            Self::EgressPortOutOfRange(_) => "egress port out of range",
            Self::EgressMacMiss(_) => "no mac for egress port",
            Self::RedirectFailed(_) => "redirect failed",
            Self::RewriteOutOfBounds => "rewrite out of bounds",
        }
    }
}

/// Exactly one of these ends the processing of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the frame to the regular network stack untouched.
    Pass,
    Drop(DropReason),
    /// Discard and surface a fault to the operator.
    Abort(Fault),
    /// Addresses rewritten, frame sent out of this egress port.
    Redirect(u8),
}

impl Verdict {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Drop(_) => "drop",
            Self::Abort(_) => "abort",
            Self::Redirect(_) => "redirect",
        }
    }

    /// Slot of the per-outcome statistics counter this verdict bumps, in
    /// addition to [`stats::STAT_TOTAL`].
    pub const fn stat_index(&self) -> u32 {
        match self {
            Self::Pass => stats::STAT_PASSED,
            Self::Drop(DropReason::HeavyHitter) => stats::STAT_HEAVY_HITTER,
            Self::Drop(_) => stats::STAT_DROPPED,
            Self::Abort(_) => stats::STAT_ABORTED,
            Self::Redirect(_) => stats::STAT_REDIRECTED,
        }
    }
}

// =============================================================================
// TRACING HOOKS
// =============================================================================

/// Observer for the intermediate decisions that never show up in a
/// [`Verdict`]. Every method defaults to doing nothing.
pub trait Trace {
    fn flow(&self, _key: &FlowKey) {}

    fn observed(&self, _key: &FlowKey, _observation: &Observation) {}

    /// An IPv4 packet that is neither TCP nor UDP skipped the detector.
    /// Its key carries no ports.
    fn detector_bypassed(&self, _key: &FlowKey) {}
}

impl Trace for () {}

// =============================================================================
// PIPELINE
// =============================================================================

/// The detector and the forwarding plane wired into one per-frame decision.
pub struct Pipeline<'a, C: ?Sized, P: ?Sized> {
    detector: HeavyHitterDetector,
    counters: &'a C,
    plane: &'a P,
}

impl<'a, C, P> Pipeline<'a, C, P>
where
    C: CounterTable + ?Sized,
    P: ForwardingPlane + ?Sized,
{
    pub const fn new(detector: HeavyHitterDetector, counters: &'a C, plane: &'a P) -> Self {
        Self {
            detector,
            counters,
            plane,
        }
    }

    pub const fn detector(&self) -> &HeavyHitterDetector {
        &self.detector
    }

    /// Run one frame to its terminal outcome.
    #[inline(always)]
    pub fn process<F, T>(&self, frame: &mut F, trace: &T) -> Verdict
    where
        F: Frame + ?Sized,
        T: Trace + ?Sized,
    {
        match self.try_admit(frame, trace) {
            Ok(dst_addr) => forward::resolve(frame, dst_addr, self.plane),
            Err(verdict) => verdict,
        }
    }

    /// Everything up to forwarding. `Ok` carries the destination address of
    /// an admitted packet, `Err` an early terminal outcome.
    #[inline(always)]
    fn try_admit<F, T>(&self, frame: &mut F, trace: &T) -> Result<u32, Verdict>
    where
        F: Frame + ?Sized,
        T: Trace + ?Sized,
    {
        let mut cursor = Cursor::default();

        let eth = parse_ethernet(frame, &mut cursor).map_err(malformed)?;
        match eth.ether_type {
            ETH_P_IP => {}
            ETH_P_ARP => return Err(Verdict::Pass),
            other => return Err(Verdict::Drop(DropReason::UnsupportedEtherType(other))),
        }

        let ip = parse_ipv4(frame, &mut cursor).map_err(malformed)?;
        let transport = match ip.protocol {
            IPPROTO_TCP => Transport::Tcp(parse_tcp(frame, &mut cursor).map_err(malformed)?),
            IPPROTO_UDP => Transport::Udp(parse_udp(frame, &mut cursor).map_err(malformed)?),
            _ => {
                trace.detector_bypassed(&FlowKey::build(&ip, None));
                return Ok(ip.dst_addr);
            }
        };

        let key = FlowKey::build(&ip, Some(&transport));
        trace.flow(&key);

        let observation = self
            .detector
            .observe(&key, self.counters)
            .map_err(Verdict::Abort)?;
        trace.observed(&key, &observation);

        if observation.is_heavy_hitter() {
            return Err(Verdict::Drop(DropReason::HeavyHitter));
        }

        Ok(ip.dst_addr)
    }
}

#[inline(always)]
fn malformed(err: ParseError) -> Verdict {
    Verdict::Drop(DropReason::Malformed(err))
}
