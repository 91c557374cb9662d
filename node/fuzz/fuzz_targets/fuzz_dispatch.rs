//! Fuzz target for the packet dispatcher
//!
//! Feeds arbitrary bytes to the software datapath and checks that only a
//! redirect modifies the frame, and only its link-layer addresses.
//!
//! Run with: cargo +nightly fuzz run fuzz_dispatch

#![no_main]

use hhd_common::Verdict;
use hhd_node::datapath::{ForwardingTables, SoftDatapath};
use libfuzzer_sys::fuzz_target;
use std::net::Ipv4Addr;

fuzz_target!(|data: &[u8]| {
    let mut tables = ForwardingTables::new();
    tables.insert_egress(1, [0x02, 0, 0, 0, 0, 0x01], "eth1");
    tables.insert_route(Ipv4Addr::new(10, 0, 0, 2), 1, [0xaa; 6]);
    // Port 3 has no MAC, port 9 is out of range.
    tables.insert_route(Ipv4Addr::new(10, 0, 0, 3), 3, [0xbb; 6]);
    tables.insert_route(Ipv4Addr::new(10, 0, 0, 9), 9, [0xcc; 6]);
    let datapath = SoftDatapath::new(2, tables);

    // Run the frame a few times so the detector can trip.
    for _ in 0..4 {
        let mut frame = data.to_vec();
        match datapath.process(&mut frame) {
            Verdict::Redirect(port) => {
                assert_eq!(port, 1);
                assert_eq!(&frame[0..6], &[0xaa; 6]);
                assert_eq!(&frame[12..], &data[12..]);
            }
            _ => assert_eq!(frame, data),
        }
    }

    let stats = datapath.stats();
    assert_eq!(stats.total_packets, 4);
});
