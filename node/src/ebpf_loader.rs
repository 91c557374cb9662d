use crate::config::{HhdConfig, XdpMode};
use crate::stats::HhdStats;
use anyhow::{anyhow, Context, Result};
use aya::{
    maps::{Array, DevMap, HashMap, PerCpuArray},
    programs::{xdp::XdpLinkId, Xdp, XdpFlags},
    Bpf, BpfLoader,
};
use aya_log::BpfLogger;
use hhd_common::{
    maps::{
        COUNTERS_MAP, EGRESS_DEVICES_MAP, EGRESS_MACS_MAP, PROGRAM_NAME, ROUTES_MAP, STATS_MAP,
        THRESHOLD_GLOBAL,
    },
    stats::STAT_ENTRIES,
    EgressMac, RouteEntry,
};
use std::path::Path;
use tracing::{info, warn};

impl From<XdpMode> for XdpFlags {
    fn from(mode: XdpMode) -> Self {
        match mode {
            XdpMode::Skb => XdpFlags::SKB_MODE,
            XdpMode::Driver => XdpFlags::DRV_MODE,
            XdpMode::Hw => XdpFlags::HW_MODE,
        }
    }
}

/// Resolve an interface name to its ifindex.
pub fn interface_index(name: &str) -> Result<u32> {
    nix::net::if_::if_nametoindex(name)
        .with_context(|| format!("Interface {} not found", name))
}

/// HHD XDP program loader and manager
pub struct HhdLoader {
    ebpf: Bpf,
    interface: String,
    attached: bool,
    link_id: Option<XdpLinkId>,
}

impl HhdLoader {
    /// Load the XDP object with `threshold` baked into its read-only global.
    ///
    /// The threshold cannot change afterwards; reloading is the only way.
    pub fn load(program_path: &Path, threshold: u64) -> Result<Self> {
        let ebpf_data = std::fs::read(program_path)
            .with_context(|| format!("Failed to read eBPF program from {:?}", program_path))?;

        let ebpf = BpfLoader::new()
            .set_global(THRESHOLD_GLOBAL, &threshold, true)
            .load(&ebpf_data)
            .context("Failed to load eBPF program")?;

        info!("Loaded {:?} with threshold {}", program_path, threshold);
        Ok(Self {
            ebpf,
            interface: String::new(),
            attached: false,
            link_id: None,
        })
    }

    /// Forward the program's aya-log lines to the host logger.
    ///
    /// Must run inside a tokio runtime.
    pub fn init_logging(&mut self) {
        if let Err(e) = BpfLogger::init(&mut self.ebpf) {
            // Objects built without any log statement have no log map.
            warn!("Failed to initialize eBPF logger: {}", e);
        }
    }

    /// Fill the route, egress MAC and egress device maps from `config`.
    pub fn populate(&mut self, config: &HhdConfig) -> Result<()> {
        {
            let mut macs: HashMap<_, u16, EgressMac> = HashMap::try_from(
                self.ebpf
                    .map_mut(EGRESS_MACS_MAP)
                    .ok_or_else(|| anyhow!("{} map not found", EGRESS_MACS_MAP))?,
            )?;
            for egress in &config.egress {
                let value = EgressMac {
                    src_mac: egress.mac.octets(),
                };
                macs.insert(u16::from(egress.port), value, 0)
                    .with_context(|| format!("Failed to set MAC of egress port {}", egress.port))?;
            }
        }

        {
            let mut devices: DevMap<_> = DevMap::try_from(
                self.ebpf
                    .map_mut(EGRESS_DEVICES_MAP)
                    .ok_or_else(|| anyhow!("{} map not found", EGRESS_DEVICES_MAP))?,
            )?;
            for egress in &config.egress {
                let ifindex = interface_index(&egress.interface)?;
                devices
                    .set(u32::from(egress.port), ifindex, None, 0)
                    .with_context(|| format!("Failed to bind egress port {}", egress.port))?;
                info!(
                    "Egress port {} -> {} (ifindex {}, mac {})",
                    egress.port, egress.interface, ifindex, egress.mac
                );
            }
        }

        let mut routes: HashMap<_, u32, RouteEntry> = HashMap::try_from(
            self.ebpf
                .map_mut(ROUTES_MAP)
                .ok_or_else(|| anyhow!("{} map not found", ROUTES_MAP))?,
        )?;
        for route in &config.routes {
            let key = u32::from(route.destination).to_be(); // Network byte order
            let value = RouteEntry::new(route.egress_port, route.mac.octets());
            routes
                .insert(key, value, 0)
                .with_context(|| format!("Failed to add route to {}", route.destination))?;
            info!(
                "Route {} -> port {} via {}",
                route.destination, route.egress_port, route.mac
            );
        }

        Ok(())
    }

    /// Attach XDP program to network interface
    pub fn attach(&mut self, interface: &str, mode: XdpMode) -> Result<()> {
        info!("Attaching XDP program to interface: {} ({} mode)", interface, mode);

        let program: &mut Xdp = self
            .ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| anyhow!("XDP program not found"))?
            .try_into()
            .context("Program is not XDP type")?;

        program.load().context("Failed to load XDP program")?;

        let link_id = program
            .attach(interface, mode.into())
            .context("Failed to attach XDP program to interface")?;

        self.interface = interface.to_string();
        self.attached = true;
        self.link_id = Some(link_id);

        info!("XDP program attached successfully to {}", interface);
        Ok(())
    }

    /// Detach XDP program from interface
    pub fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }

        if let Some(link_id) = self.link_id.take() {
            let program: &mut Xdp = self
                .ebpf
                .program_mut(PROGRAM_NAME)
                .ok_or_else(|| anyhow!("XDP program not found"))?
                .try_into()
                .context("Program is not XDP type")?;

            program.detach(link_id)?;

            self.attached = false;
            info!("XDP program detached from {}", self.interface);
        }
        Ok(())
    }

    /// Current outcome counters, summed over all CPUs
    pub fn get_stats(&self) -> Result<HhdStats> {
        let stats_map: PerCpuArray<_, u64> = PerCpuArray::try_from(
            self.ebpf
                .map(STATS_MAP)
                .ok_or_else(|| anyhow!("{} map not found", STATS_MAP))?,
        )?;

        let mut slots = [0u64; STAT_ENTRIES as usize];
        for (index, slot) in (0..STAT_ENTRIES).zip(slots.iter_mut()) {
            *slot = stats_map
                .get(&index, 0)
                .map(|values| values.iter().sum())
                .unwrap_or(0);
        }

        Ok(HhdStats::from_slots(&slots))
    }

    /// The `n` largest counters of the counting table as `(slot, count)`.
    pub fn hottest_slots(&self, n: usize) -> Result<Vec<(u32, u64)>> {
        let counters: Array<_, u64> = Array::try_from(
            self.ebpf
                .map(COUNTERS_MAP)
                .ok_or_else(|| anyhow!("{} map not found", COUNTERS_MAP))?,
        )?;

        let mut slots = Vec::new();
        for (index, value) in counters.iter().enumerate() {
            let value = value.context("Failed to read counting table")?;
            if value > 0 {
                slots.push((index as u32, value));
            }
        }
        slots.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        slots.truncate(n);
        Ok(slots)
    }

    /// Get attached interface name
    pub fn interface(&self) -> Option<&str> {
        if self.attached {
            Some(&self.interface)
        } else {
            None
        }
    }
}

impl Drop for HhdLoader {
    fn drop(&mut self) {
        if self.attached {
            if let Err(e) = self.detach() {
                warn!("Failed to detach XDP program on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_xdp_mode_flags() {
        assert_eq!(XdpFlags::from(XdpMode::Skb), XdpFlags::SKB_MODE);
        assert_eq!(XdpFlags::from(XdpMode::Driver), XdpFlags::DRV_MODE);
        assert_eq!(XdpFlags::from(XdpMode::Hw), XdpFlags::HW_MODE);
    }

    #[test]
    fn test_route_key_network_byte_order() {
        let key = u32::from(Ipv4Addr::new(10, 0, 0, 2)).to_be();
        // In memory the key reads 10.0.0.2 octet by octet, as the kernel sees it.
        assert_eq!(key.to_ne_bytes(), [10, 0, 0, 2]);
    }

    #[test]
    fn test_loopback_has_an_index() {
        assert!(interface_index("lo").is_ok());
        assert!(interface_index("hhd-missing0").is_err());
    }

    #[test]
    fn test_load_missing_program() {
        let err = HhdLoader::load(Path::new("/nonexistent/hhd-xdp"), 10)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to read eBPF program"));
    }
}
