//! JSON interchange format for normalized traces.
//!
//! A trace is an array of objects with hex-string fields, one record per
//! line when written by [`write_json_trace`]:
//!
//! ```text
//! [{"pc":"1004","ins":"00000297","asm":"auipc t0, 0x0","rw":[["x5","1000"]]}
//! ,{"pc":"1008","mw":[["80000000","deadbeef"]]}
//! ]
//! ```

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::{is_general_register, MemWrite, TraceRecord};
use crate::TraceError;

/// On-disk shape of one record. Values are hex strings; `rw`/`mw` are pair
/// lists rather than maps so record order survives round-trips.
#[derive(Debug, Serialize, Deserialize)]
struct RawRecord {
    pc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ins: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asm: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rw: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    mw: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    mr: Vec<String>,
}

fn parse_hex(field: &str, index: usize, hex: &str) -> Result<u64, TraceError> {
    u64::from_str_radix(hex, 16).map_err(|_| TraceError::Record {
        index,
        message: format!("invalid hex in {field:?}: {hex:?}"),
    })
}

fn normalize(raw: RawRecord, index: usize) -> Result<TraceRecord, TraceError> {
    let mut record = TraceRecord {
        pc: parse_hex("pc", index, &raw.pc)?,
        instruction: raw.ins,
        disasm: raw.asm,
        mem_reads: raw.mr,
        ..Default::default()
    };
    for (name, value) in raw.rw {
        if !is_general_register(&name) {
            debug!("dropping write to unmodeled register {name}");
            continue;
        }
        let value = parse_hex("rw", index, &value)?;
        record.reg_writes.insert(name, value);
    }
    for (addr, data) in raw.mw {
        let addr = parse_hex("mw", index, &addr)?;
        let bytes = hex::decode(&data).map_err(|_| TraceError::Record {
            index,
            message: format!("invalid memory write data (want even-length hex): {data:?}"),
        })?;
        record.mem_writes.push(MemWrite { addr, bytes });
    }
    Ok(record)
}

fn denormalize(record: &TraceRecord) -> RawRecord {
    RawRecord {
        pc: format!("{:x}", record.pc),
        ins: record.instruction.clone(),
        asm: record.disasm.clone(),
        rw: record
            .reg_writes
            .iter()
            .map(|(name, value)| (name.clone(), format!("{value:x}")))
            .collect(),
        mw: record
            .mem_writes
            .iter()
            .map(|write| (format!("{:x}", write.addr), hex::encode(&write.bytes)))
            .collect(),
        mr: record.mem_reads.clone(),
    }
}

/// Parse a JSON trace into normalized records.
pub fn parse_json_trace(reader: impl BufRead) -> Result<Vec<TraceRecord>, TraceError> {
    let raw: Vec<RawRecord> = serde_json::from_reader(reader)?;
    raw.into_iter()
        .enumerate()
        .map(|(index, record)| normalize(record, index))
        .collect()
}

/// Write records as compact JSON, one record per line for easy viewing.
pub fn write_json_trace(
    mut writer: impl Write,
    records: &[TraceRecord],
) -> Result<(), std::io::Error> {
    let mut prefix = "[";
    for record in records {
        let line = serde_json::to_string(&denormalize(record))?;
        writeln!(writer, "{prefix}{line}")?;
        prefix = ",";
    }
    if records.is_empty() {
        writeln!(writer, "[")?;
    }
    writeln!(writer, "]")
}
