//! Loader for SiFive RTL testbench commit logs.
//!
//! One line per retired instruction:
//!
//! ```text
//! S0C0:         44 [1] pc=[0000000048000010] W[r 3=0000000048000010][1] R[r 0=...] R[r 0=...] inst=[00000197] auipc   gp, 0x0
//! ```
//!
//! Only the register writeback port is recorded; this format carries no
//! memory traffic, so replayed sessions can follow control flow and
//! registers but memory queries will read back the unset sentinel.

use std::io::BufRead;

use regex::Regex;
use tracing::{debug, warn};

use crate::record::{is_general_register, TraceRecord};
use crate::spike::match_and_strip;
use crate::{collapse_spaces, TraceError};

struct SifivePatterns {
    status: Regex,
    reg_write: Regex,
    inst: Regex,
    testbench_line: Regex,
}

impl SifivePatterns {
    fn new() -> Self {
        Self {
            status: Regex::new(r"^S\d+C\d+: +\d+ \[\d+\] +pc=\[([0-9a-fA-F]+)\] +")
                .expect("valid regex"),
            reg_write: Regex::new(r"^W\[([a-z]+[ 0-9a-zA-Z_]+)=([0-9a-fA-F]+)\]")
                .expect("valid regex"),
            inst: Regex::new(r"inst=\[([0-9a-fA-F]+)\] (.*)$").expect("valid regex"),
            testbench_line: Regex::new(r"^S\d+C\d+:").expect("valid regex"),
        }
    }
}

/// The writeback port names registers `r <k>`; the normalized form is `x<k>`.
fn clean_reg_name(name: &str) -> String {
    match name.strip_prefix('r') {
        Some(index) => format!("x{}", index.trim_start()),
        None => name.to_string(),
    }
}

/// Parse a SiFive RTL commit log into normalized records.
pub fn parse_sifive_rtl_log(reader: impl BufRead) -> Result<Vec<TraceRecord>, TraceError> {
    let patterns = SifivePatterns::new();
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line?;
        let line = line.trim();

        let Some((caps, rest)) = match_and_strip(&patterns.status, line) else {
            if patterns.testbench_line.is_match(line) {
                warn!("line {number}: unexpected testbench line format: {line}");
            } else {
                debug!("line {number}: skipping non-trace line: {line}");
            }
            continue;
        };

        let pc = u64::from_str_radix(&caps[1], 16).map_err(|_| TraceError::Line {
            line: number,
            message: format!("invalid pc value {:?}", &caps[1]),
        })?;
        let mut record = TraceRecord {
            pc,
            instruction: Some(String::new()),
            disasm: Some(String::new()),
            ..Default::default()
        };

        if let Some(inst) = patterns.inst.captures(rest) {
            let mut opcode = inst[1].to_string();
            let disasm = collapse_spaces(&inst[2]);
            // The testbench pads compressed opcodes to full width; shorten
            // them so `ins` width matches other trace formats.
            if disasm.starts_with("c.") && opcode.starts_with("0000") {
                opcode = opcode[4..].to_string();
            }
            record.instruction = Some(opcode);
            record.disasm = Some(disasm);
        }

        let effects = rest.trim_start();
        if !effects.is_empty() {
            let Some((write, _)) = match_and_strip(&patterns.reg_write, effects) else {
                return Err(TraceError::Line {
                    line: number,
                    message: format!("expected a writeback field, got {effects:?}"),
                });
            };
            let name = clean_reg_name(&write[1]);
            if is_general_register(&name) {
                let value = u64::from_str_radix(&write[2], 16).map_err(|_| TraceError::Line {
                    line: number,
                    message: format!("invalid writeback value {:?}", &write[2]),
                })?;
                record.reg_writes.insert(name, value);
            } else {
                debug!("line {number}: dropping write to unmodeled register {name}");
            }
        }

        records.push(record);
    }
    Ok(records)
}
