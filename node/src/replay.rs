//! Offline replay of captured frames through the software datapath.
//!
//! The input is text with one hex-encoded frame per line. Whitespace and
//! `:` separators inside a line are ignored; blank lines and lines starting
//! with `#` are skipped.

use crate::datapath::SoftDatapath;
use hhd_common::Verdict;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read frames: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: invalid hex frame: {source}")]
    Hex {
        line: usize,
        source: hex::FromHexError,
    },
}

/// A frame read from the input, with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub line: usize,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub line: usize,
    pub verdict: Verdict,
    /// The frame after processing; differs from the input only on redirect.
    pub frame: Vec<u8>,
}

impl ReplayOutcome {
    /// One-line description of the verdict and its reason.
    pub fn describe(&self) -> String {
        match self.verdict {
            Verdict::Pass => "pass".to_string(),
            Verdict::Drop(reason) => format!("drop ({})", reason.label()),
            Verdict::Abort(fault) => format!("abort ({})", fault.label()),
            Verdict::Redirect(port) => format!("redirect to port {}", port),
        }
    }
}

pub fn parse_frames(text: &str) -> Result<Vec<CapturedFrame>, ReplayError> {
    let mut frames = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let digits: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let bytes = hex::decode(&digits).map_err(|source| ReplayError::Hex { line: i + 1, source })?;
        frames.push(CapturedFrame { line: i + 1, bytes });
    }

    Ok(frames)
}

pub fn read_frames<P: AsRef<Path>>(path: P) -> Result<Vec<CapturedFrame>, ReplayError> {
    let text = fs::read_to_string(path)?;
    parse_frames(&text)
}

/// Push every frame through `datapath`, in order.
pub fn replay(datapath: &SoftDatapath, frames: Vec<CapturedFrame>) -> Vec<ReplayOutcome> {
    frames
        .into_iter()
        .map(|CapturedFrame { line, mut bytes }| {
            let verdict = datapath.process(&mut bytes);
            ReplayOutcome {
                line,
                verdict,
                frame: bytes,
            }
        })
        .collect()
}
