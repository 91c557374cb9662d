// Frame builders and a ready-made datapath shared by the integration tests

#![allow(dead_code)]

use hhd_node::datapath::{ForwardingTables, SoftDatapath};
use std::net::Ipv4Addr;

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_ARP: u16 = 0x0806;
pub const ETH_P_IPV6: u16 = 0x86dd;
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

pub const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
/// Routed out of port 2.
pub const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
/// No route.
pub const UNROUTED: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 99);

pub const IN_DST_MAC: [u8; 6] = [0x11; 6];
pub const IN_SRC_MAC: [u8; 6] = [0x22; 6];
pub const NEXT_HOP_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02];
pub const PORT2_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

pub fn ethernet(ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&IN_DST_MAC);
    frame.extend_from_slice(&IN_SRC_MAC);
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// IPv4 header with `ihl` 32-bit words, zero-filled options, then `payload`.
pub fn ipv4_with_ihl(ihl: u8, protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let header_len = usize::from(ihl.max(5)) * 4;
    let mut packet = vec![0u8; header_len];
    packet[0] = 0x40 | (ihl & 0x0f);
    let total_len = (header_len + payload.len()) as u16;
    packet[2..4].copy_from_slice(&total_len.to_be_bytes());
    packet[8] = 64;
    packet[9] = protocol;
    packet[12..16].copy_from_slice(&src.octets());
    packet[16..20].copy_from_slice(&dst.octets());
    packet.extend_from_slice(payload);
    packet
}

pub fn ipv4(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    ipv4_with_ihl(5, protocol, src, dst, payload)
}

/// TCP header whose data offset is `doff`, padded to `doff * 4` bytes
/// (at least 20).
pub fn tcp_with_doff(src_port: u16, dst_port: u16, doff: u8) -> Vec<u8> {
    let len = (usize::from(doff) * 4).max(20);
    let mut segment = vec![0u8; len];
    segment[0..2].copy_from_slice(&src_port.to_be_bytes());
    segment[2..4].copy_from_slice(&dst_port.to_be_bytes());
    segment[12] = doff << 4;
    segment[13] = 0x02; // SYN
    segment[14..16].copy_from_slice(&64240u16.to_be_bytes());
    segment
}

pub fn tcp(src_port: u16, dst_port: u16) -> Vec<u8> {
    tcp_with_doff(src_port, dst_port, 5)
}

pub fn udp_with_length(src_port: u16, dst_port: u16, length: u16, payload: &[u8]) -> Vec<u8> {
    let mut datagram = vec![0u8; 8];
    datagram[0..2].copy_from_slice(&src_port.to_be_bytes());
    datagram[2..4].copy_from_slice(&dst_port.to_be_bytes());
    datagram[4..6].copy_from_slice(&length.to_be_bytes());
    datagram.extend_from_slice(payload);
    datagram
}

pub fn udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    udp_with_length(src_port, dst_port, (8 + payload.len()) as u16, payload)
}

/// TCP SYN from `SRC:src_port` to `DST:80`.
pub fn tcp_frame(src_port: u16) -> Vec<u8> {
    ethernet(ETH_P_IP, &ipv4(IPPROTO_TCP, SRC, DST, &tcp(src_port, 80)))
}

/// UDP from `SRC:src_port` to `DST:53` carrying `payload`.
pub fn udp_frame(src_port: u16, payload: &[u8]) -> Vec<u8> {
    ethernet(ETH_P_IP, &ipv4(IPPROTO_UDP, SRC, DST, &udp(src_port, 53, payload)))
}

pub fn icmp_frame(dst: Ipv4Addr) -> Vec<u8> {
    ethernet(ETH_P_IP, &ipv4(IPPROTO_ICMP, SRC, dst, &[8, 0, 0xf7, 0xff, 0, 0, 0, 0]))
}

/// `DST` routed out of port 2, port 2 bound to `veth2`.
pub fn tables() -> ForwardingTables {
    let mut tables = ForwardingTables::new();
    tables.insert_egress(2, PORT2_MAC, "veth2");
    tables.insert_route(DST, 2, NEXT_HOP_MAC);
    tables
}

pub fn datapath(threshold: u64) -> SoftDatapath {
    SoftDatapath::new(threshold, tables())
}
