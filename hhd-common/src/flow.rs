use crate::parse::{Ipv4Header, Transport};

/// Number of bytes a [`FlowKey`] occupies when hashed.
pub const FLOW_KEY_LEN: usize = 13;

/// The 5-tuple identifying a flow. Fields are kept in host byte order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl FlowKey {
    /// Build the key for a packet. Without a TCP/UDP header the ports stay zero.
    #[inline(always)]
    pub fn build(ip: &Ipv4Header, transport: Option<&Transport>) -> Self {
        let (src_port, dst_port) = match transport {
            Some(t) => t.ports(),
            None => (0, 0),
        };

        Self {
            src_addr: ip.src_addr,
            dst_addr: ip.dst_addr,
            src_port,
            dst_port,
            protocol: ip.protocol,
        }
    }

    /// The hashed representation: addresses, ports, protocol, each in
    /// network byte order, packed with no padding.
    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; FLOW_KEY_LEN] {
        let mut out = [0u8; FLOW_KEY_LEN];
        out[0..4].copy_from_slice(&self.src_addr.to_be_bytes());
        out[4..8].copy_from_slice(&self.dst_addr.to_be_bytes());
        out[8..10].copy_from_slice(&self.src_port.to_be_bytes());
        out[10..12].copy_from_slice(&self.dst_port.to_be_bytes());
        out[12] = self.protocol;
        out
    }
}
