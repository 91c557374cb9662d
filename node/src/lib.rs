// Host side of the HHD heavy-hitter detector: configuration, the software
// datapath, frame replay and the XDP loader.

pub mod config;
pub mod datapath;
pub mod replay;
pub mod stats;

#[cfg(target_os = "linux")]
pub mod ebpf_loader;
