//! Normalized execution traces and loaders for producer log formats.
//!
//! Trace producers (instruction-set simulators, RTL testbenches) emit
//! textual commit logs in their own formats. Each loader here converts one
//! format into the same normalized [`TraceRecord`] sequence the replay core
//! consumes: integer PCs, `x<k>` register writes with integer values, and
//! memory writes as raw bytes in ascending address order. Adding a format
//! means adding a loader; nothing downstream changes.

mod json;
mod record;
mod sifive;
mod spike;

pub use json::{parse_json_trace, write_json_trace};
pub use record::{general_register_index, is_general_register, MemWrite, TraceRecord};
pub use sifive::parse_sifive_rtl_log;
pub use spike::parse_spike_log;

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;

/// Supported on-disk trace formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// The normalized JSON interchange format (see [`parse_json_trace`]).
    Json,
    /// Spike (riscv-isa-sim) commit log.
    Spike,
    /// SiFive RTL testbench commit log.
    SifiveRtl,
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraceFormat::Json => "json",
            TraceFormat::Spike => "spike",
            TraceFormat::SifiveRtl => "sifive-rtl",
        })
    }
}

/// Loader failures. These surface at trace load, before a debugger ever
/// connects; malformed input is never a runtime concern for the server.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid JSON trace: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record {index}: {message}")]
    Record { index: usize, message: String },
    #[error("line {line}: {message}")]
    Line { line: usize, message: String },
}

/// Read and normalize a trace file in the given format.
pub fn load_trace(path: &Path, format: TraceFormat) -> Result<Vec<TraceRecord>, TraceError> {
    let reader = BufReader::new(File::open(path)?);
    match format {
        TraceFormat::Json => parse_json_trace(reader),
        TraceFormat::Spike => parse_spike_log(reader),
        TraceFormat::SifiveRtl => parse_sifive_rtl_log(reader),
    }
}

/// Collapse runs of whitespace in producer disassembly text.
pub(crate) fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
