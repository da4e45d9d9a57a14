//! Architectural CPU state reconstructed from an execution trace.
//!
//! The state is exactly as rich as the trace: a fixed register file and a
//! sparse byte-addressed memory holding every byte a trace record (or the
//! debugger) has written. Reads of untouched memory return a recognizable
//! sentinel instead of failing, so a debugger can probe freely even when
//! the producer recorded no memory traffic.

use std::collections::HashMap;

use rewind_trace::{general_register_index, MemWrite, TraceRecord};
use tracing::{debug, info, warn};

/// Byte returned when reading memory no trace record or debugger write has
/// ever touched.
pub const UNSET_MEM_BYTE: u8 = 0xCA;

/// Architecture parameters: how many registers the debugger sees in a `g`
/// response and which index is the program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuProfile {
    pub name: &'static str,
    pub num_registers: usize,
    pub pc_register: usize,
}

/// RISC-V 64: `x0..x31` plus the PC, matching gdb's riscv:rv64 register
/// numbering.
pub const RISCV64: CpuProfile = CpuProfile {
    name: "riscv-64",
    num_registers: 33,
    pc_register: 32,
};

/// Register file plus sparse memory for one replay session.
#[derive(Debug, Clone)]
pub struct CpuState {
    profile: CpuProfile,
    registers: Vec<u64>,
    memory: HashMap<u64, u8>,
}

impl CpuState {
    pub fn new(profile: CpuProfile, initial_pc: u64) -> Self {
        let mut state = Self {
            profile,
            registers: vec![0; profile.num_registers],
            memory: HashMap::new(),
        };
        state.set_pc(initial_pc);
        state
    }

    pub fn riscv64(initial_pc: u64) -> Self {
        Self::new(RISCV64, initial_pc)
    }

    pub fn profile(&self) -> &CpuProfile {
        &self.profile
    }

    pub fn pc(&self) -> u64 {
        self.registers[self.profile.pc_register]
    }

    pub fn set_pc(&mut self, value: u64) {
        self.registers[self.profile.pc_register] = value;
    }

    /// All registers in `g`-response order.
    pub fn registers(&self) -> &[u64] {
        &self.registers
    }

    /// Out-of-range reads return 0; gdb probes register numbers beyond the
    /// target's definition and expects the stub to shrug.
    pub fn register(&self, index: usize) -> u64 {
        match self.registers.get(index) {
            Some(&value) => value,
            None => {
                warn!("read of unrecognized register number {index}");
                0
            }
        }
    }

    /// Out-of-range writes are dropped.
    pub fn set_register(&mut self, index: usize, value: u64) {
        match self.registers.get_mut(index) {
            Some(slot) => *slot = value,
            None => warn!("dropping write to unrecognized register number {index}"),
        }
    }

    /// Read `len` bytes starting at `addr`. Untouched bytes read back as
    /// [`UNSET_MEM_BYTE`]; when any are, one coalesced diagnostic is logged
    /// for the whole access.
    pub fn read_mem(&self, addr: u64, len: usize) -> Vec<u8> {
        let (data, missing) = self.peek(addr, len);
        if !missing.is_empty() {
            info!(
                "reading uninitialized memory at {}",
                format_address_ranges(&missing)
            );
        }
        data
    }

    fn peek(&self, addr: u64, len: usize) -> (Vec<u8>, Vec<u64>) {
        let mut data = Vec::with_capacity(len);
        let mut missing = Vec::new();
        for offset in 0..len {
            let address = addr.wrapping_add(offset as u64);
            match self.memory.get(&address) {
                Some(&byte) => data.push(byte),
                None => {
                    data.push(UNSET_MEM_BYTE);
                    missing.push(address);
                }
            }
        }
        (data, missing)
    }

    pub fn write_mem(&mut self, addr: u64, bytes: &[u8]) {
        for (offset, &byte) in bytes.iter().enumerate() {
            self.memory.insert(addr.wrapping_add(offset as u64), byte);
        }
    }

    /// Apply one record: PC, then register writes, then memory writes.
    ///
    /// Returns the reverse delta: a record capturing the pre-write value of
    /// everything this application overwrote (sentinel bytes included for
    /// spans that were untouched). Applying the returned record restores
    /// the observable state exactly, which makes reverse motion the same
    /// operation as forward motion.
    pub fn apply(&mut self, record: &TraceRecord) -> TraceRecord {
        let mut reverse = TraceRecord {
            pc: self.pc(),
            ..Default::default()
        };
        self.set_pc(record.pc);
        for (name, &value) in &record.reg_writes {
            match general_register_index(name) {
                Some(index) => {
                    reverse.reg_writes.insert(name.clone(), self.register(index));
                    self.set_register(index, value);
                }
                None => debug!("ignoring update to register {name}"),
            }
        }
        for write in &record.mem_writes {
            let (old_bytes, _) = self.peek(write.addr, write.bytes.len());
            reverse.mem_writes.push(MemWrite {
                addr: write.addr,
                bytes: old_bytes,
            });
            self.write_mem(write.addr, &write.bytes);
        }
        reverse
    }
}

/// Collapse sorted addresses into `lo..hi` closed intervals for diagnostics:
/// `[0x1000, 0x1001, 0x1002, 0x2000]` formats as `1000..1002, 2000`.
fn format_address_ranges(addresses: &[u64]) -> String {
    let mut parts = Vec::new();
    let mut run: Option<(u64, u64)> = None;
    for &addr in addresses {
        run = match run {
            Some((start, end)) if addr == end.wrapping_add(1) => Some((start, addr)),
            Some((start, end)) => {
                parts.push(format_range(start, end));
                Some((addr, addr))
            }
            None => Some((addr, addr)),
        };
    }
    if let Some((start, end)) = run {
        parts.push(format_range(start, end));
    }
    parts.join(", ")
}

fn format_range(start: u64, end: u64) -> String {
    if start == end {
        format!("{start:x}")
    } else {
        format!("{start:x}..{end:x}")
    }
}
