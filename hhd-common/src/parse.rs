//! Ethernet, IPv4, TCP and UDP header decoders.
//!
//! Each decoder reads one header at the current cursor position, checks the
//! header's declared length against what is left of the frame, and only then
//! advances the cursor. Failure is reported as a [`ParseError`]; no decoder
//! ever touches a byte past the bound it validated.

use crate::frame::Frame;

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_MIN_HDR_LEN: usize = 20;
pub const TCP_MIN_HDR_LEN: usize = 20;
pub const TCP_MAX_HDR_LEN: usize = 60;
pub const UDP_HDR_LEN: usize = 8;

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_ARP: u16 = 0x0806;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Why a header could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than 14 bytes for the Ethernet header.
    EthernetTruncated,
    /// Fewer than 20 bytes left for the fixed part of the IPv4 header.
    Ipv4Truncated,
    /// IHL declares a header shorter than 20 bytes.
    Ipv4HeaderTooShort,
    /// IHL declares a header longer than the rest of the frame.
    Ipv4HeaderOverrun,
    /// Fewer than 20 bytes left for the fixed part of the TCP header.
    TcpTruncated,
    /// Data offset declares a header outside 20..=60 bytes.
    TcpHeaderLength,
    /// Data offset declares a header longer than the rest of the frame.
    TcpHeaderOverrun,
    /// Fewer than 8 bytes left for the UDP header.
    UdpTruncated,
    /// The UDP length field is below the size of the UDP header itself.
    UdpLengthTooShort,
}

impl ParseError {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::EthernetTruncated => "truncated ethernet header",
            Self::Ipv4Truncated => "truncated ipv4 header",
            Self::Ipv4HeaderTooShort => "ipv4 ihl below minimum",
            Self::Ipv4HeaderOverrun => "ipv4 header overruns frame",
            Self::TcpTruncated => "truncated tcp header",
            Self::TcpHeaderLength => "tcp data offset out of range",
            Self::TcpHeaderOverrun => "tcp header overruns frame",
            Self::UdpTruncated => "truncated udp header",
            Self::UdpLengthTooShort => "udp length below header size",
        }
    }
}

/// Offset of the next undecoded header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    offset: usize,
}

impl Cursor {
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[inline(always)]
    fn advance(&mut self, len: usize) {
        self.offset += len;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst_mac: [u8; 6],
    pub src_mac: [u8; 6],
    /// Host byte order.
    pub ether_type: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes, options included.
    pub header_len: usize,
    pub protocol: u8,
    /// Host byte order.
    pub src_addr: u32,
    /// Host byte order.
    pub dst_addr: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TcpHeader {
    pub header_len: usize,
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header plus payload, as carried in the datagram.
    pub length: u16,
}

/// The decoded layer-4 header of a TCP or UDP packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

impl Transport {
    /// `(source, destination)` ports in host byte order.
    pub const fn ports(&self) -> (u16, u16) {
        match self {
            Self::Tcp(tcp) => (tcp.src_port, tcp.dst_port),
            Self::Udp(udp) => (udp.src_port, udp.dst_port),
        }
    }
}

#[inline(always)]
fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

#[inline(always)]
fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decode the fixed 14-byte Ethernet header.
#[inline(always)]
pub fn parse_ethernet<F: Frame + ?Sized>(
    frame: &mut F,
    cursor: &mut Cursor,
) -> Result<EthernetHeader, ParseError> {
    let bytes = frame
        .slice_from(cursor.offset, ETH_HDR_LEN)
        .ok_or(ParseError::EthernetTruncated)?;

    let mut dst_mac = [0u8; 6];
    let mut src_mac = [0u8; 6];
    dst_mac.copy_from_slice(&bytes[0..6]);
    src_mac.copy_from_slice(&bytes[6..12]);
    let ether_type = be16(bytes, 12);

    cursor.advance(ETH_HDR_LEN);
    Ok(EthernetHeader {
        dst_mac,
        src_mac,
        ether_type,
    })
}

/// Decode an IPv4 header of `IHL * 4` bytes.
#[inline(always)]
pub fn parse_ipv4<F: Frame + ?Sized>(
    frame: &mut F,
    cursor: &mut Cursor,
) -> Result<Ipv4Header, ParseError> {
    let bytes = frame
        .slice_from(cursor.offset, IPV4_MIN_HDR_LEN)
        .ok_or(ParseError::Ipv4Truncated)?;

    let header_len = usize::from(bytes[0] & 0x0f) * 4;
    let protocol = bytes[9];
    let src_addr = be32(bytes, 12);
    let dst_addr = be32(bytes, 16);

    if header_len < IPV4_MIN_HDR_LEN {
        return Err(ParseError::Ipv4HeaderTooShort);
    }
    if frame.slice_from(cursor.offset, header_len).is_none() {
        return Err(ParseError::Ipv4HeaderOverrun);
    }

    cursor.advance(header_len);
    Ok(Ipv4Header {
        header_len,
        protocol,
        src_addr,
        dst_addr,
    })
}

/// Decode a TCP header of `data offset * 4` bytes, options included.
#[inline(always)]
pub fn parse_tcp<F: Frame + ?Sized>(
    frame: &mut F,
    cursor: &mut Cursor,
) -> Result<TcpHeader, ParseError> {
    let bytes = frame
        .slice_from(cursor.offset, TCP_MIN_HDR_LEN)
        .ok_or(ParseError::TcpTruncated)?;

    let src_port = be16(bytes, 0);
    let dst_port = be16(bytes, 2);
    let header_len = usize::from(bytes[12] >> 4) * 4;

    if !(TCP_MIN_HDR_LEN..=TCP_MAX_HDR_LEN).contains(&header_len) {
        return Err(ParseError::TcpHeaderLength);
    }
    if frame.slice_from(cursor.offset, header_len).is_none() {
        return Err(ParseError::TcpHeaderOverrun);
    }

    cursor.advance(header_len);
    Ok(TcpHeader {
        header_len,
        src_port,
        dst_port,
    })
}

/// Decode the fixed 8-byte UDP header.
#[inline(always)]
pub fn parse_udp<F: Frame + ?Sized>(
    frame: &mut F,
    cursor: &mut Cursor,
) -> Result<UdpHeader, ParseError> {
    let bytes = frame
        .slice_from(cursor.offset, UDP_HDR_LEN)
        .ok_or(ParseError::UdpTruncated)?;

    let src_port = be16(bytes, 0);
    let dst_port = be16(bytes, 2);
    let length = be16(bytes, 4);

    if usize::from(length) < UDP_HDR_LEN {
        return Err(ParseError::UdpLengthTooShort);
    }

    cursor.advance(UDP_HDR_LEN);
    Ok(UdpHeader {
        src_port,
        dst_port,
        length,
    })
}
