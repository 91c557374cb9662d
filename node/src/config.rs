use hhd_common::forward::egress_port_in_range;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Linux IFNAMSIZ, terminating NUL included.
const IFNAMSIZ: usize = 16;

pub const DEFAULT_PROGRAM_PATH: &str =
    "node/ebpf/hhd-xdp/target/bpfel-unknown-none/release/hhd-xdp";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid interface name: {0:?}")]
    InvalidInterface(String),

    #[error("Egress port {0} out of range (1..=4)")]
    EgressPortOutOfRange(u8),

    #[error("Egress port {0} declared more than once")]
    DuplicateEgressPort(u8),

    #[error("Route to {0} declared more than once")]
    DuplicateRoute(Ipv4Addr),

    #[error("Route to {destination} uses egress port {port}, which has no [[egress]] entry")]
    MissingEgress { destination: Ipv4Addr, port: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid MAC address: {0:?} (expected six hex octets, e.g. aa:bb:cc:dd:ee:ff)")]
pub struct MacParseError(String);

// =============================================================================
// MAC ADDRESS
// =============================================================================

/// Ethernet address written as `aa:bb:cc:dd:ee:ff` (`-` also accepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| MacParseError(s.to_string()))?;
            if part.len() != 2 {
                return Err(MacParseError(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(MacParseError(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// How the XDP program is attached to the ingress interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XdpMode {
    /// Generic mode, works on any driver.
    #[default]
    Skb,
    /// Native driver mode.
    Driver,
    /// Offloaded to the NIC.
    Hw,
}

impl fmt::Display for XdpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdpMode::Skb => write!(f, "skb"),
            XdpMode::Driver => write!(f, "driver"),
            XdpMode::Hw => write!(f, "hw"),
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub destination: Ipv4Addr,
    pub egress_port: u8,
    /// Next-hop MAC written as the destination address of redirected frames.
    pub mac: MacAddr,
}

/// One egress port: the MAC frames leave with and the device they leave by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressConfig {
    pub port: u8,
    pub mac: MacAddr,
    pub interface: String,
}

/// Detector and forwarding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HhdConfig {
    /// Packets per flow above which both probes mark it a heavy hitter
    pub threshold: u64,
    /// Ingress interface the XDP program is attached to
    pub interface: String,
    #[serde(default)]
    pub xdp_mode: XdpMode,
    /// Compiled XDP object
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub egress: Vec<EgressConfig>,
}

fn default_program() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRAM_PATH)
}

impl Default for HhdConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            interface: "eth0".to_string(),
            xdp_mode: XdpMode::default(),
            program: default_program(),
            routes: Vec::new(),
            egress: Vec::new(),
        }
    }
}

impl HhdConfig {
    /// Load configuration from a TOML file. The result is not validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Load and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_interface(&self.interface)?;

        let mut ports = HashSet::new();
        for egress in &self.egress {
            if !egress_port_in_range(egress.port) {
                return Err(ConfigError::EgressPortOutOfRange(egress.port));
            }
            if !ports.insert(egress.port) {
                return Err(ConfigError::DuplicateEgressPort(egress.port));
            }
            validate_interface(&egress.interface)?;
        }

        let mut destinations = HashSet::new();
        for route in &self.routes {
            if !egress_port_in_range(route.egress_port) {
                return Err(ConfigError::EgressPortOutOfRange(route.egress_port));
            }
            if !destinations.insert(route.destination) {
                return Err(ConfigError::DuplicateRoute(route.destination));
            }
            if !ports.contains(&route.egress_port) {
                return Err(ConfigError::MissingEgress {
                    destination: route.destination,
                    port: route.egress_port,
                });
            }
        }

        Ok(())
    }

    pub fn egress_for(&self, port: u8) -> Option<&EgressConfig> {
        self.egress.iter().find(|e| e.port == port)
    }
}

impl FromStr for HhdConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

fn validate_interface(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() >= IFNAMSIZ || name.contains(['/', ' ', '\0']) {
        return Err(ConfigError::InvalidInterface(name.to_string()));
    }
    Ok(())
}
