// Dispatcher Integration Tests
//
// Frame-level outcomes of the software datapath: parse failures, ethertype
// handling, forwarding and the link-layer rewrite.

mod common;

use common::*;
use hhd_common::{DropReason, Fault, ParseError, Verdict};
use hhd_node::datapath::{ForwardingTables, SoftDatapath};

fn malformed(err: ParseError) -> Verdict {
    Verdict::Drop(DropReason::Malformed(err))
}

#[test]
fn test_short_frames_dropped() {
    let dp = datapath(10);
    for len in 0..14 {
        let mut frame = vec![0x08u8; len];
        assert_eq!(
            dp.process(&mut frame),
            malformed(ParseError::EthernetTruncated),
            "length {}",
            len
        );
    }
}

#[test]
fn test_arp_passes_regardless_of_payload() {
    let dp = datapath(0);
    for payload in [&[][..], &[0u8; 28][..], &[0xffu8; 1500][..]] {
        let mut frame = ethernet(ETH_P_ARP, payload);
        let original = frame.clone();
        assert_eq!(dp.process(&mut frame), Verdict::Pass);
        assert_eq!(frame, original);
    }
    assert_eq!(dp.stats().passed_packets, 3);
}

#[test]
fn test_other_ethertypes_dropped() {
    let dp = datapath(10);
    for ether_type in [0x0000u16, 0x0801, ETH_P_IPV6, 0x8100, 0x88cc, 0xffff] {
        let mut frame = ethernet(ether_type, &ipv4(IPPROTO_UDP, SRC, DST, &udp(1, 2, &[])));
        assert_eq!(
            dp.process(&mut frame),
            Verdict::Drop(DropReason::UnsupportedEtherType(ether_type))
        );
    }
}

#[test]
fn test_ipv4_header_too_short() {
    let dp = datapath(10);
    for ihl in 0..5 {
        let mut frame = ethernet(ETH_P_IP, &ipv4_with_ihl(ihl, IPPROTO_UDP, SRC, DST, &udp(1, 2, &[])));
        assert_eq!(dp.process(&mut frame), malformed(ParseError::Ipv4HeaderTooShort));
    }
}

#[test]
fn test_ipv4_header_overruns_buffer() {
    let dp = datapath(10);
    let mut frame = udp_frame(4000, &[]);
    // IHL 15 claims 60 bytes; only 28 follow the Ethernet header.
    frame[14] = 0x4f;
    assert_eq!(dp.process(&mut frame), malformed(ParseError::Ipv4HeaderOverrun));

    let mut frame = ethernet(ETH_P_IP, &[0x45; 19]);
    assert_eq!(dp.process(&mut frame), malformed(ParseError::Ipv4Truncated));
}

#[test]
fn test_ipv4_options_are_skipped() {
    let dp = datapath(10);
    let mut frame = ethernet(ETH_P_IP, &ipv4_with_ihl(8, IPPROTO_TCP, SRC, DST, &tcp(1234, 80)));
    assert_eq!(dp.process(&mut frame), Verdict::Redirect(2));
}

#[test]
fn test_tcp_header_length_bounds() {
    let dp = datapath(u64::MAX);
    for doff in 0..5 {
        let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, DST, &tcp_with_doff(1234, 80, doff)));
        assert_eq!(dp.process(&mut frame), malformed(ParseError::TcpHeaderLength));
    }
    for doff in 5..=15 {
        let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, DST, &tcp_with_doff(1234, 80, doff)));
        assert_eq!(dp.process(&mut frame), Verdict::Redirect(2), "doff {}", doff);
    }
}

#[test]
fn test_tcp_options_overrun_buffer() {
    let dp = datapath(10);
    let mut segment = tcp(1234, 80);
    segment[12] = 10 << 4; // 40 bytes claimed, 20 present
    let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, DST, &segment));
    assert_eq!(dp.process(&mut frame), malformed(ParseError::TcpHeaderOverrun));

    let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, DST, &[0u8; 19]));
    assert_eq!(dp.process(&mut frame), malformed(ParseError::TcpTruncated));
}

#[test]
fn test_udp_length_field() {
    let dp = datapath(u64::MAX);
    for length in 0..8 {
        let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, DST, &udp_with_length(1, 53, length, &[])));
        assert_eq!(dp.process(&mut frame), malformed(ParseError::UdpLengthTooShort));
    }

    let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, DST, &udp_with_length(1, 53, 8, &[])));
    assert_eq!(dp.process(&mut frame), Verdict::Redirect(2));

    let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, DST, &[0u8; 7]));
    assert_eq!(dp.process(&mut frame), malformed(ParseError::UdpTruncated));
}

#[test]
fn test_redirect_rewrites_only_link_addresses() {
    let dp = datapath(10);
    for mut frame in [tcp_frame(1234), udp_frame(4000, b"payload bytes"), icmp_frame(DST)] {
        let original = frame.clone();

        assert_eq!(dp.process(&mut frame), Verdict::Redirect(2));
        assert_eq!(&frame[0..6], &NEXT_HOP_MAC);
        assert_eq!(&frame[6..12], &PORT2_MAC);
        assert_eq!(&frame[12..], &original[12..]);
        assert_eq!(frame.len(), original.len());
    }
    assert_eq!(dp.stats().redirected_packets, 3);
}

#[test]
fn test_non_transport_protocol_skips_detector() {
    let dp = datapath(0);
    let mut frame = icmp_frame(DST);
    assert_eq!(dp.process(&mut frame), Verdict::Redirect(2));
    assert!(dp.counters().hottest(1).is_empty());

    // Any TCP/UDP packet is counted and, at threshold 0, dropped.
    let mut frame = udp_frame(4000, &[]);
    assert_eq!(dp.process(&mut frame), Verdict::Drop(DropReason::HeavyHitter));
}

#[test]
fn test_route_miss_aborts() {
    let dp = datapath(10);
    let expected = Verdict::Abort(Fault::RouteMiss(u32::from(UNROUTED)));

    let mut frame = ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, UNROUTED, &udp(4000, 53, &[])));
    let original = frame.clone();
    assert_eq!(dp.process(&mut frame), expected);
    assert_eq!(frame, original);

    let mut frame = icmp_frame(UNROUTED);
    assert_eq!(dp.process(&mut frame), expected);
    assert_eq!(dp.stats().aborted_packets, 2);
}

#[test]
fn test_route_miss_aborts_while_flow_is_counted() {
    // Every admitted packet of a routeless flow aborts, however hot its
    // counters get, until the detector itself drops the flow.
    let dp = datapath(10);
    let route_miss = Verdict::Abort(Fault::RouteMiss(u32::from(UNROUTED)));
    let flow = || ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, UNROUTED, &tcp(4242, 80)));

    for _ in 0..10 {
        assert_eq!(dp.process(&mut flow()), route_miss);
    }
    // Heavy-hitter drops are decided before the route lookup.
    assert_eq!(dp.process(&mut flow()), Verdict::Drop(DropReason::HeavyHitter));
}

#[test]
fn test_forwarding_faults() {
    // Route to a port that has no MAC.
    let mut with_gap = tables();
    with_gap.insert_route(UNROUTED, 3, NEXT_HOP_MAC);
    let dp = SoftDatapath::new(10, with_gap);
    let mut frame = icmp_frame(UNROUTED);
    assert_eq!(dp.process(&mut frame), Verdict::Abort(Fault::EgressMacMiss(3)));

    // Route to a port outside 1..=4.
    let mut with_gap = tables();
    with_gap.insert_route(UNROUTED, 7, NEXT_HOP_MAC);
    let dp = SoftDatapath::new(10, with_gap);
    let mut frame = icmp_frame(UNROUTED);
    assert_eq!(dp.process(&mut frame), Verdict::Abort(Fault::EgressPortOutOfRange(7)));

    // Port 2 has a MAC but no device to redirect to.
    let mut with_gap = tables();
    with_gap.unbind_device(2);
    let dp = SoftDatapath::new(10, with_gap);
    let mut frame = icmp_frame(DST);
    assert_eq!(dp.process(&mut frame), Verdict::Abort(Fault::RedirectFailed(2)));
}

#[test]
fn test_empty_tables_abort_everything_admitted() {
    let dp = SoftDatapath::new(10, ForwardingTables::new());
    let mut frame = tcp_frame(1234);
    assert!(matches!(dp.process(&mut frame), Verdict::Abort(Fault::RouteMiss(_))));
}

#[test]
fn test_malformed_classification_is_repeatable() {
    let dp = datapath(u64::MAX);
    let samples = vec![
        vec![0u8; 5],
        ethernet(ETH_P_IPV6, &[0; 40]),
        ethernet(ETH_P_IP, &[0x43; 40]),
        ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, DST, &tcp_with_doff(1, 2, 3))),
        ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, DST, &udp_with_length(1, 2, 4, &[]))),
        ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, UNROUTED, &udp(1, 2, &[]))),
    ];

    let first: Vec<Verdict> = samples.iter().map(|f| dp.process(&mut f.clone())).collect();
    for _ in 0..50 {
        for (frame, expected) in samples.iter().zip(&first) {
            assert_eq!(dp.process(&mut frame.clone()), *expected);
        }
    }
    assert!(first.iter().all(|v| matches!(v, Verdict::Drop(_) | Verdict::Abort(_))));
}

#[test]
fn test_stats_account_every_frame() {
    let dp = datapath(10);
    dp.process(&mut ethernet(ETH_P_ARP, &[]));
    dp.process(&mut tcp_frame(1234));
    dp.process(&mut vec![0u8; 3]);
    dp.process(&mut icmp_frame(UNROUTED));

    let stats = dp.stats();
    assert_eq!(stats.total_packets, 4);
    assert_eq!(stats.passed_packets, 1);
    assert_eq!(stats.redirected_packets, 1);
    assert_eq!(stats.dropped_malformed, 1);
    assert_eq!(stats.aborted_packets, 1);
    assert_eq!(stats.drop_rate(), 25.0);
}
