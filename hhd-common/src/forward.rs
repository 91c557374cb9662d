//! Egress selection for admitted packets.
//!
//! The destination address picks a route, the route picks an egress port,
//! the port picks the source MAC, and the Ethernet addresses are rewritten
//! in place before the frame is redirected. Any miss along the way is a
//! [`Fault`]: the tables are owned by the control plane, so a hole in them
//! is a configuration error rather than a filtering decision.

use crate::{
    dispatch::{Fault, Verdict},
    frame::Frame,
};

pub const MIN_EGRESS_PORT: u8 = 1;
pub const MAX_EGRESS_PORT: u8 = 4;

/// Value of the route table, keyed by destination IPv4 address.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteEntry {
    pub egress_port: u8,
    pub _pad: u8,
    pub dst_mac: [u8; 6],
}

impl RouteEntry {
    pub const fn new(egress_port: u8, dst_mac: [u8; 6]) -> Self {
        Self {
            egress_port,
            _pad: 0,
            dst_mac,
        }
    }
}

/// Value of the egress MAC table, keyed by egress port.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EgressMac {
    pub src_mac: [u8; 6],
}

// SAFETY: both are plain `repr(C)` byte structs with no implicit padding.
#[cfg(feature = "user")]
unsafe impl aya::Pod for RouteEntry {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for EgressMac {}

pub const fn egress_port_in_range(port: u8) -> bool {
    port >= MIN_EGRESS_PORT && port <= MAX_EGRESS_PORT
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedirectError;

/// Read-only view of the forwarding tables plus the redirect primitive.
pub trait ForwardingPlane {
    /// Route for a destination address in host byte order.
    fn route(&self, dst_addr: u32) -> Option<RouteEntry>;

    fn egress_mac(&self, port: u16) -> Option<EgressMac>;

    /// Hand the frame to the device bound to `port`.
    fn redirect(&self, port: u8) -> Result<(), RedirectError>;
}

/// Resolve the egress for `dst_addr`, rewrite the link-layer addresses and
/// redirect. Only the first 12 bytes of the frame are ever written.
#[inline(always)]
pub fn resolve<F, P>(frame: &mut F, dst_addr: u32, plane: &P) -> Verdict
where
    F: Frame + ?Sized,
    P: ForwardingPlane + ?Sized,
{
    let Some(route) = plane.route(dst_addr) else {
        return Verdict::Abort(Fault::RouteMiss(dst_addr));
    };

    let port = route.egress_port;
    if !egress_port_in_range(port) {
        return Verdict::Abort(Fault::EgressPortOutOfRange(port));
    }

    let Some(egress) = plane.egress_mac(u16::from(port)) else {
        return Verdict::Abort(Fault::EgressMacMiss(port));
    };

    let Some(eth) = frame.slice(12) else {
        return Verdict::Abort(Fault::RewriteOutOfBounds);
    };
    eth[0..6].copy_from_slice(&route.dst_mac);
    eth[6..12].copy_from_slice(&egress.src_mac);

    match plane.redirect(port) {
        Ok(()) => Verdict::Redirect(port),
        Err(RedirectError) => Verdict::Abort(Fault::RedirectFailed(port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DST: u32 = 0x0a00_0002;
    const ROUTE_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02];
    const PORT_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

    struct Plane {
        route: Option<RouteEntry>,
        mac: Option<EgressMac>,
        redirect_ok: bool,
    }

    impl Plane {
        fn healthy(port: u8) -> Self {
            Self {
                route: Some(RouteEntry::new(port, ROUTE_MAC)),
                mac: Some(EgressMac { src_mac: PORT_MAC }),
                redirect_ok: true,
            }
        }
    }

    impl ForwardingPlane for Plane {
        fn route(&self, dst_addr: u32) -> Option<RouteEntry> {
            self.route.filter(|_| dst_addr == DST)
        }

        fn egress_mac(&self, _port: u16) -> Option<EgressMac> {
            self.mac
        }

        fn redirect(&self, _port: u8) -> Result<(), RedirectError> {
            if self.redirect_ok {
                Ok(())
            } else {
                Err(RedirectError)
            }
        }
    }

    fn frame() -> [u8; 20] {
        let mut buf = [0x11u8; 20];
        buf[12] = 0x08;
        buf[13] = 0x00;
        buf
    }

    #[test]
    fn test_rewrite_and_redirect() {
        let mut buf = frame();
        let verdict = resolve(&mut buf[..], DST, &Plane::healthy(2));
        assert_eq!(verdict, Verdict::Redirect(2));
        assert_eq!(&buf[0..6], &ROUTE_MAC);
        assert_eq!(&buf[6..12], &PORT_MAC);
        assert_eq!(&buf[12..], &frame()[12..]);
    }

    #[test]
    fn test_route_miss_aborts_untouched() {
        let mut buf = frame();
        let verdict = resolve(&mut buf[..], 0x0a00_0009, &Plane::healthy(2));
        assert_eq!(verdict, Verdict::Abort(Fault::RouteMiss(0x0a00_0009)));
        assert_eq!(buf, frame());
    }

    #[test]
    fn test_port_range() {
        for port in [0u8, 5, 255] {
            let mut buf = frame();
            assert_eq!(
                resolve(&mut buf[..], DST, &Plane::healthy(port)),
                Verdict::Abort(Fault::EgressPortOutOfRange(port))
            );
        }
        for port in MIN_EGRESS_PORT..=MAX_EGRESS_PORT {
            let mut buf = frame();
            assert_eq!(
                resolve(&mut buf[..], DST, &Plane::healthy(port)),
                Verdict::Redirect(port)
            );
        }
    }

    #[test]
    fn test_missing_egress_mac() {
        let mut plane = Plane::healthy(3);
        plane.mac = None;
        let mut buf = frame();
        assert_eq!(
            resolve(&mut buf[..], DST, &plane),
            Verdict::Abort(Fault::EgressMacMiss(3))
        );
    }

    #[test]
    fn test_redirect_failure() {
        let mut plane = Plane::healthy(1);
        plane.redirect_ok = false;
        let mut buf = frame();
        assert_eq!(
            resolve(&mut buf[..], DST, &plane),
            Verdict::Abort(Fault::RedirectFailed(1))
        );
    }

    #[test]
    fn test_map_value_layouts() {
        assert_eq!(core::mem::size_of::<RouteEntry>(), 8);
        assert_eq!(core::mem::size_of::<EgressMac>(), 6);
    }
}
