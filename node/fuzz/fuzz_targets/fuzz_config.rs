//! Fuzz target for the TOML configuration parser
//!
//! Run with: cargo +nightly fuzz run fuzz_config

#![no_main]

use hhd_node::config::HhdConfig;
use hhd_node::datapath::SoftDatapath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = text.parse::<HhdConfig>() {
            // Anything that validates must build a datapath.
            if config.validate().is_ok() {
                let datapath = SoftDatapath::from_config(&config);
                let _ = datapath.process(&mut [0u8; 64]);
            }
        }
    }
});
