//! Bidirectional cursor over a recorded execution trace.
//!
//! Forward motion applies trace records to the CPU state and captures a
//! reverse delta per step; reverse motion applies the stored deltas. State
//! is therefore a function of the cursor position alone, no matter which
//! path of forward and reverse moves reached it, and reverse memory cost is
//! proportional to what the trace actually wrote rather than trace length
//! times state size.

use std::collections::HashSet;
use std::sync::Arc;

use rewind_cpu::CpuState;
use rewind_trace::TraceRecord;
use tracing::{info, warn};

/// Why a run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Arrived at a PC with a breakpoint set.
    Breakpoint,
    /// Ran off either end of the trace; the session is over.
    EndOfTrace,
}

/// Replays a trace against a [`CpuState`].
///
/// The cursor `idx` sits in `[0, trace.len()]`; the CPU state always equals
/// the result of applying records `0..idx` once, in order. The trace itself
/// is shared and immutable; everything mutable is owned here.
pub struct ReplayEngine {
    trace: Arc<Vec<TraceRecord>>,
    reverse: Vec<Option<TraceRecord>>,
    cursor: usize,
    breakpoints: HashSet<u64>,
    cpu: CpuState,
    running: bool,
}

impl ReplayEngine {
    pub fn new(trace: Arc<Vec<TraceRecord>>, cpu: CpuState) -> Self {
        let reverse = vec![None; trace.len()];
        Self {
            trace,
            reverse,
            cursor: 0,
            breakpoints: HashSet::new(),
            cpu,
            running: true,
        }
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuState {
        &mut self.cpu
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn trace_len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// End the session; run loops already do this on reaching either end of
    /// the trace, detach does it explicitly.
    pub fn stop(&mut self) {
        if self.running {
            info!("session stopped at trace index {}", self.cursor);
        }
        self.running = false;
    }

    pub fn insert_breakpoint(&mut self, pc: u64) {
        self.breakpoints.insert(pc);
    }

    pub fn remove_breakpoint(&mut self, pc: u64) {
        self.breakpoints.remove(&pc);
    }

    /// Whether the current PC has a breakpoint on it.
    pub fn at_breakpoint(&self) -> bool {
        self.breakpoints.contains(&self.cpu.pc())
    }

    /// Apply the next record. Returns false (and stops the session) when
    /// the cursor is already at the end of the trace.
    pub fn step_forward(&mut self) -> bool {
        if self.cursor >= self.trace.len() {
            self.stop();
            return false;
        }
        let delta = self.cpu.apply(&self.trace[self.cursor]);
        self.reverse[self.cursor] = Some(delta);
        self.cursor += 1;
        true
    }

    /// Undo the previous record by applying its reverse delta. Returns
    /// false (and stops the session) when the cursor is at the start.
    pub fn step_reverse(&mut self) -> bool {
        if self.cursor == 0 {
            self.stop();
            return false;
        }
        self.cursor -= 1;
        match &self.reverse[self.cursor] {
            Some(delta) => {
                self.cpu.apply(delta);
            }
            // Unreachable through the public API: the cursor can only sit
            // above positions that were stepped through forward.
            None => warn!("no reverse delta recorded at trace index {}", self.cursor),
        }
        true
    }

    /// Step forward until arriving at a breakpoint or the end of the trace.
    ///
    /// The breakpoint check runs after each step, against the new PC, so a
    /// breakpoint on the current PC does not fire until execution leaves
    /// and comes back.
    pub fn run_forward(&mut self) -> StopReason {
        while self.step_forward() {
            if self.at_breakpoint() {
                return StopReason::Breakpoint;
            }
        }
        StopReason::EndOfTrace
    }

    /// Step backward until arriving at a breakpoint or the start of the
    /// trace.
    pub fn run_reverse(&mut self) -> StopReason {
        while self.step_reverse() {
            if self.at_breakpoint() {
                return StopReason::Breakpoint;
            }
        }
        StopReason::EndOfTrace
    }
}
