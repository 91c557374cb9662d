//! Shared core of the HHD heavy-hitter detector.
//!
//! Everything here runs once per received frame, inside the XDP program and
//! inside the host-side software datapath alike. The code is `no_std`, never
//! allocates, and every loop and header walk is bounded so the eBPF verifier
//! can admit it.

#![cfg_attr(not(test), no_std)]

pub mod detector;
pub mod dispatch;
pub mod flow;
pub mod forward;
pub mod frame;
pub mod hash;
pub mod maps;
pub mod parse;
pub mod stats;

pub use self::{
    detector::{CounterTable, HeavyHitterDetector, Observation, ProbeLayout},
    dispatch::{DropReason, Fault, Pipeline, Trace, Verdict},
    flow::FlowKey,
    forward::{EgressMac, ForwardingPlane, RedirectError, RouteEntry},
    frame::Frame,
    parse::ParseError,
};
