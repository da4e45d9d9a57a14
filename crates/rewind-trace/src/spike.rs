//! Loader for Spike (riscv-isa-sim) commit logs.
//!
//! Spike interleaves a disassembly line with a status line per retired
//! instruction:
//!
//! ```text
//! core   0: 0x0000000000001000 (0x00000297) auipc   t0, 0x0
//! core   0: 3 0x0000000000001000 (0x00000297) x5  0x0000000000001000
//! core   0: 0x000000000000100c (0x0182b283) ld      t0, 24(t0)
//! core   0: 3 0x000000000000100c (0x0182b283) x5  0x0000000080000000 mem 0x0000000000001018
//! core   0: 0x0000000080004628 (0x0000c8dc) c.sw    a5, 20(s1)
//! core   0: 3 0x0000000080004628 (0xc8dc) mem 0x0000000080010dac 0x00000002
//! ```
//!
//! The status line's suffix lists the architectural effects: register
//! writes (`x5 0x...`), memory writes (`mem <addr> <value>`) and memory
//! reads (`mem <addr>`).

use std::io::BufRead;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::record::{is_general_register, MemWrite, TraceRecord};
use crate::{collapse_spaces, TraceError};

const HEX: &str = "0x[0-9a-fA-F]+";

struct SpikePatterns {
    disasm: Regex,
    status: Regex,
    mem_write: Regex,
    mem_read: Regex,
    reg_write: Regex,
    core_line: Regex,
}

impl SpikePatterns {
    fn new() -> Self {
        Self {
            disasm: Regex::new(&format!(r"^core +\d+: ({HEX}) \(({HEX})\) (.*)$"))
                .expect("valid regex"),
            status: Regex::new(&format!(r"^core +\d+: \d+ ({HEX}) \(({HEX})\)"))
                .expect("valid regex"),
            mem_write: Regex::new(&format!(r"^mem ({HEX}) ({HEX})")).expect("valid regex"),
            mem_read: Regex::new(&format!(r"^mem ({HEX})")).expect("valid regex"),
            reg_write: Regex::new(&format!(r"^([a-z]+[0-9a-zA-Z_]+) +({HEX})"))
                .expect("valid regex"),
            core_line: Regex::new(r"^core +\d+:").expect("valid regex"),
        }
    }
}

/// Match `re` at the start of `line` and return the captures plus the
/// remainder of the line after the match.
pub(crate) fn match_and_strip<'a>(re: &Regex, line: &'a str) -> Option<(Captures<'a>, &'a str)> {
    let caps = re.captures(line)?;
    let end = caps.get(0)?.end();
    Some((caps, &line[end..]))
}

fn hex_u64(line: usize, what: &str, text: &str) -> Result<u64, TraceError> {
    u64::from_str_radix(text.trim_start_matches("0x"), 16).map_err(|_| TraceError::Line {
        line,
        message: format!("invalid {what} value {text:?}"),
    })
}

/// Strip the `0x` prefix but keep the width; opcode width distinguishes
/// compressed from full instructions.
fn sized_hex(text: &str) -> String {
    text.trim_start_matches("0x").to_string()
}

fn decode_effects(
    patterns: &SpikePatterns,
    suffix: &str,
    line_number: usize,
    record: &mut TraceRecord,
) -> Result<(), TraceError> {
    let mut rest = suffix.trim_start();
    while !rest.is_empty() {
        // Most to least specific: a memory effect would also match the
        // register-write pattern.
        if let Some((caps, next)) = match_and_strip(&patterns.mem_write, rest) {
            let addr = hex_u64(line_number, "memory write address", &caps[1])?;
            let bytes = hex::decode(sized_hex(&caps[2])).map_err(|_| TraceError::Line {
                line: line_number,
                message: format!("memory write data {:?} is not even-length hex", &caps[2]),
            })?;
            record.mem_writes.push(MemWrite { addr, bytes });
            rest = next.trim_start();
            continue;
        }
        if let Some((caps, next)) = match_and_strip(&patterns.mem_read, rest) {
            record.mem_reads.push(sized_hex(&caps[1]));
            rest = next.trim_start();
            continue;
        }
        if let Some((caps, next)) = match_and_strip(&patterns.reg_write, rest) {
            let name = &caps[1];
            if is_general_register(name) {
                let value = hex_u64(line_number, "register write", &caps[2])?;
                record.reg_writes.insert(name.to_string(), value);
            } else {
                debug!("line {line_number}: dropping write to unmodeled register {name}");
            }
            rest = next.trim_start();
            continue;
        }
        return Err(TraceError::Line {
            line: line_number,
            message: format!("unrecognized effects {suffix:?} (stuck at {rest:?})"),
        });
    }
    Ok(())
}

/// Parse a Spike commit log into normalized records.
pub fn parse_spike_log(reader: impl BufRead) -> Result<Vec<TraceRecord>, TraceError> {
    let patterns = SpikePatterns::new();
    let mut records = Vec::new();
    let mut pending_disasm: Option<(u64, String)> = None;

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line?;
        let line = line.trim();

        if let Some(caps) = patterns.disasm.captures(line) {
            let pc = hex_u64(number, "pc", &caps[1])?;
            pending_disasm = Some((pc, caps[3].to_string()));
            continue;
        }

        if let Some((caps, rest)) = match_and_strip(&patterns.status, line) {
            let pc = hex_u64(number, "pc", &caps[1])?;
            let mut record = TraceRecord {
                pc,
                instruction: Some(sized_hex(&caps[2])),
                ..Default::default()
            };
            match pending_disasm.take() {
                Some((disasm_pc, text)) if disasm_pc == pc => {
                    record.disasm = Some(collapse_spaces(&text));
                }
                _ => warn!("line {number}: status update without preceding disassembly"),
            }
            decode_effects(&patterns, rest, number, &mut record)?;
            records.push(record);
            continue;
        }

        if patterns.core_line.is_match(line) {
            // Section markers and other per-core chatter, e.g.
            // `core   0: >>>>  MEM_START`.
            debug!("line {number}: skipping unrecognized core line: {line}");
        } else {
            debug!("line {number}: skipping non-trace line: {line}");
        }
    }
    Ok(records)
}
