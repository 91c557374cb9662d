//! Bounds-checked access to the bytes of a received frame.

/// A frame whose bytes can only be reached through bounds-checked windows.
///
/// Implementations must check `offset + len` against the end of the frame
/// before handing out any byte, in a form the eBPF verifier accepts. Asking
/// for a larger window later is always fine; a failed request never reads.
pub trait Frame {
    /// Request `len` bytes starting `offset` bytes into the frame.
    fn slice_from(&mut self, offset: usize, len: usize) -> Option<&mut [u8]>;

    /// Request the first `len` bytes of the frame.
    #[inline(always)]
    fn slice(&mut self, len: usize) -> Option<&mut [u8]> {
        self.slice_from(0, len)
    }
}

impl Frame for [u8] {
    #[inline]
    fn slice_from(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        self.get_mut(offset..end)
    }
}

#[cfg(feature = "ebpf")]
pub use self::xdp::XdpFrame;

#[cfg(feature = "ebpf")]
mod xdp {
    use aya_ebpf::programs::XdpContext;

    use super::Frame;

    /// The `[data, data_end)` window of an XDP context.
    ///
    /// Holds copies of the two packet pointers so the context itself stays
    /// free for logging while the frame is borrowed mutably.
    pub struct XdpFrame {
        start: usize,
        end: usize,
    }

    impl XdpFrame {
        #[inline(always)]
        pub fn new(ctx: &XdpContext) -> Self {
            Self {
                start: ctx.data(),
                end: ctx.data_end(),
            }
        }
    }

    impl Frame for XdpFrame {
        #[inline(always)]
        fn slice_from(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
            let base = self.start + offset;
            if base + len > self.end {
                return None;
            }

            // SAFETY: [base, base + len) was just checked against data_end.
            Some(unsafe { core::slice::from_raw_parts_mut(base as *mut u8, len) })
        }
    }
}
