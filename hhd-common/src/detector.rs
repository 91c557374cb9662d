//! Approximate heavy-hitter detection over a bounded counting table.
//!
//! Each TCP/UDP flow key is hashed twice, with fasthash and jhash under
//! distinct seeds. Both hashes index into one shared table of
//! [`TABLE_ENTRIES`] counters, both counters are bumped, and the packet is
//! classified as heavy-hitter traffic only when both counters are above the
//! threshold. Counters never decay.

use crate::{
    dispatch::Fault,
    flow::FlowKey,
    hash::{fasthash32, jhash},
};

/// Slots in one row of the counting table.
pub const TABLE_ENTRIES: u32 = 4096;

pub const FASTHASH_SEED: u32 = 0xdead_beef;
pub const JHASH_SEED: u32 = 0x2d31_e867;

/// Atomic counters addressed by slot index. `None` means the slot does not
/// exist.
pub trait CounterTable {
    /// Atomically add one to the counter at `index`.
    fn increment(&self, index: u32) -> Option<()>;

    /// Current value of the counter at `index`. May already include
    /// increments made concurrently by other cores.
    fn load(&self, index: u32) -> Option<u64>;
}

/// Where the two probes of a flow land.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeLayout {
    /// Both probes index the same [`TABLE_ENTRIES`]-slot row. This is what
    /// the XDP program runs; collisions between the two hash functions
    /// share counters.
    #[default]
    Shared,
    /// The second probe gets its own row at offset [`TABLE_ENTRIES`], as in
    /// a canonical two-row Count-Min sketch.
    Split,
}

impl ProbeLayout {
    /// Number of counter slots this layout needs.
    pub const fn table_len(self) -> u32 {
        match self {
            Self::Shared => TABLE_ENTRIES,
            Self::Split => TABLE_ENTRIES * 2,
        }
    }
}

/// Result of counting one packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    pub indices: [u32; 2],
    /// Counter values read back after the increments.
    pub counts: [u64; 2],
    pub threshold: u64,
}

impl Observation {
    /// Both probes agree the flow is above the threshold.
    pub const fn is_heavy_hitter(&self) -> bool {
        self.counts[0] > self.threshold && self.counts[1] > self.threshold
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeavyHitterDetector {
    threshold: u64,
    layout: ProbeLayout,
}

impl HeavyHitterDetector {
    pub const fn new(threshold: u64) -> Self {
        Self::with_layout(threshold, ProbeLayout::Shared)
    }

    pub const fn with_layout(threshold: u64, layout: ProbeLayout) -> Self {
        Self { threshold, layout }
    }

    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    pub const fn layout(&self) -> ProbeLayout {
        self.layout
    }

    /// Counter slots for `key`: the fasthash probe first, then the jhash probe.
    #[inline(always)]
    pub fn probe_indices(&self, key: &FlowKey) -> [u32; 2] {
        let bytes = key.to_bytes();
        let first = fasthash32(&bytes, FASTHASH_SEED) % TABLE_ENTRIES;
        let second = jhash(&bytes, JHASH_SEED) % TABLE_ENTRIES;

        match self.layout {
            ProbeLayout::Shared => [first, second],
            ProbeLayout::Split => [first, TABLE_ENTRIES + second],
        }
    }

    /// Count one packet of `key` and report both post-increment counters.
    #[inline(always)]
    pub fn observe<C: CounterTable + ?Sized>(
        &self,
        key: &FlowKey,
        counters: &C,
    ) -> Result<Observation, Fault> {
        let indices = self.probe_indices(key);

        let table_len = self.layout.table_len();
        if indices[0] >= table_len {
            return Err(Fault::ProbeOutOfRange(indices[0]));
        }
        if indices[1] >= table_len {
            return Err(Fault::ProbeOutOfRange(indices[1]));
        }

        // Both increments land before either read, so a flow whose probes
        // share a slot sees its own two increments on both sides.
        for index in indices {
            counters
                .increment(index)
                .ok_or(Fault::CounterSlotMissing(index))?;
        }
        let first = counters
            .load(indices[0])
            .ok_or(Fault::CounterSlotMissing(indices[0]))?;
        let second = counters
            .load(indices[1])
            .ok_or(Fault::CounterSlotMissing(indices[1]))?;

        Ok(Observation {
            indices,
            counts: [first, second],
            threshold: self.threshold,
        })
    }
}
