//! RSP command dispatch: decoded payloads in, reply payloads out.
//!
//! The supported command set is small and prefix-disjoint, so dispatch is
//! a chain of prefix matches with hand-rolled extractors. Anything
//! unrecognized or malformed gets the empty reply, which gdb reads as
//! "unsupported" and routes around; no command here replies with an
//! `E<nn>` error packet.

use rewind_replay::{ReplayEngine, StopReason};
use tracing::warn;

use crate::codec::{format_reg, parse_hex_u64, parse_reg, split_hex};

/// Stop reply: signal 5 (SIGTRAP), i.e. stopped inside the trace.
const STOPPED_TRAP: &str = "S05";
/// Exit reply: ran off either end of the trace.
const EXITED: &str = "W00";

/// Feature negotiation reply. Reverse execution is the point of the
/// exercise; no-ack mode, software breakpoints and multiprocess are
/// explicitly declined.
const SUPPORTED: &str = "qXfer:features:read-;swbreak-;hwbreak+;vContSupported+;\
multiprocess-;QStartNoAckMode-;ReverseContinue+;ReverseStep+";

/// One debugger session: the replay engine plus the per-session thread
/// bookkeeping gdb expects to be able to set and query. The target is
/// single-threaded from the debugger's point of view, so the ids are only
/// ever echoed back.
pub struct Session {
    engine: ReplayEngine,
    cont_thread: i64,
    state_query_thread: i64,
}

impl Session {
    pub fn new(engine: ReplayEngine) -> Self {
        Self {
            engine,
            cont_thread: -1,
            state_query_thread: -1,
        }
    }

    pub fn engine(&self) -> &ReplayEngine {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Thread id selected by `Hc`, echoed back on `qC`.
    pub fn cont_thread(&self) -> i64 {
        self.cont_thread
    }

    /// Thread id selected by `Hg` for state queries.
    pub fn state_query_thread(&self) -> i64 {
        self.state_query_thread
    }

    /// Handle one decoded command payload.
    ///
    /// `Some(String::new())` is the "unsupported" empty packet; `None`
    /// means send nothing at all (reserved for notification-style commands,
    /// which the current set does not include).
    pub fn handle(&mut self, command: &str) -> Option<String> {
        if command.starts_with("qSupported") {
            return Some(SUPPORTED.to_string());
        }
        if command == "?" {
            return Some(STOPPED_TRAP.to_string());
        }
        if command == "g" {
            return Some(self.read_all_registers());
        }
        if let Some(hex) = command.strip_prefix('G') {
            return Some(self.write_all_registers(hex));
        }
        if let Some(args) = command.strip_prefix('p') {
            if let Some(reply) = self.read_register(args) {
                return Some(reply);
            }
        } else if let Some(args) = command.strip_prefix('P') {
            if let Some(reply) = self.write_register(args) {
                return Some(reply);
            }
        } else if let Some(args) = command.strip_prefix('m') {
            if let Some(reply) = self.read_memory(args) {
                return Some(reply);
            }
        } else if let Some(args) = command.strip_prefix('M') {
            if let Some(reply) = self.write_memory(args) {
                return Some(reply);
            }
        } else if command.starts_with("bc") {
            return Some(self.reverse_cont());
        } else if command.starts_with("bs") {
            return Some(self.reverse_step());
        } else if command.starts_with('c') {
            return Some(self.cont());
        } else if command.starts_with('s') {
            return Some(self.step());
        } else if command.starts_with('D') {
            self.engine.stop();
            return Some("OK".to_string());
        } else if let Some(args) = command.strip_prefix('H') {
            if let Some(reply) = self.set_thread(args) {
                return Some(reply);
            }
        } else if command == "qC" {
            return Some(self.cont_thread.to_string());
        } else if let Some(args) = command.strip_prefix('Z') {
            if let Some(addr) = parse_breakpoint(args) {
                self.engine.insert_breakpoint(addr);
                return Some("OK".to_string());
            }
        } else if let Some(args) = command.strip_prefix('z') {
            if let Some(addr) = parse_breakpoint(args) {
                self.engine.remove_breakpoint(addr);
                return Some("OK".to_string());
            }
        } else if command == "qSymbol::" {
            // Offer to look up symbols for us; nothing to look up.
            return Some("OK".to_string());
        } else if command == "vMustReplyEmpty" {
            return Some(String::new());
        } else if command == "qAttached" {
            return Some("1".to_string());
        } else if command.starts_with("vCont") {
            return Some(self.vcont(command));
        }

        warn!("unknown command: {command}");
        Some(String::new())
    }

    fn read_all_registers(&self) -> String {
        self.engine
            .cpu()
            .registers()
            .iter()
            .map(|&value| format_reg(value))
            .collect()
    }

    fn write_all_registers(&mut self, hex: &str) -> String {
        let count = self.engine.cpu().profile().num_registers;
        for index in 0..count {
            let Some(Some(value)) = hex.get(index * 16..(index + 1) * 16).map(parse_reg) else {
                warn!("register file write is short or malformed at register {index}");
                break;
            };
            self.engine.cpu_mut().set_register(index, value);
        }
        "OK".to_string()
    }

    fn read_register(&self, args: &str) -> Option<String> {
        let (number, _) = split_hex(args);
        let index = parse_hex_u64(number)?;
        Some(format_reg(self.engine.cpu().register(index as usize)))
    }

    fn write_register(&mut self, args: &str) -> Option<String> {
        let (number, rest) = split_hex(args);
        let index = parse_hex_u64(number)?;
        let (value_hex, _) = split_hex(rest.strip_prefix('=')?);
        let value = parse_reg(value_hex)?;
        self.engine.cpu_mut().set_register(index as usize, value);
        Some("OK".to_string())
    }

    fn read_memory(&self, args: &str) -> Option<String> {
        let (addr_hex, rest) = split_hex(args);
        let addr = parse_hex_u64(addr_hex)?;
        let (len_hex, _) = split_hex(rest.strip_prefix(',')?);
        let len = parse_hex_u64(len_hex)?;
        Some(hex::encode(self.engine.cpu().read_mem(addr, len as usize)))
    }

    fn write_memory(&mut self, args: &str) -> Option<String> {
        let (addr_hex, rest) = split_hex(args);
        let addr = parse_hex_u64(addr_hex)?;
        let (len_hex, rest) = split_hex(rest.strip_prefix(',')?);
        let declared = parse_hex_u64(len_hex)?;
        let data = hex::decode(rest.strip_prefix(':')?).ok()?;
        if data.len() as u64 != declared {
            warn!(
                "memory write declares {declared} bytes but carries {}; writing what was sent",
                data.len()
            );
        }
        self.engine.cpu_mut().write_mem(addr, &data);
        Some("OK".to_string())
    }

    fn step(&mut self) -> String {
        if self.engine.step_forward() {
            STOPPED_TRAP.to_string()
        } else {
            EXITED.to_string()
        }
    }

    fn cont(&mut self) -> String {
        stop_reply(self.engine.run_forward())
    }

    fn reverse_step(&mut self) -> String {
        if self.engine.step_reverse() {
            STOPPED_TRAP.to_string()
        } else {
            EXITED.to_string()
        }
    }

    fn reverse_cont(&mut self) -> String {
        stop_reply(self.engine.run_reverse())
    }

    fn set_thread(&mut self, args: &str) -> Option<String> {
        let op = args.chars().next()?;
        let id: i64 = args[op.len_utf8()..].parse().ok()?;
        match op {
            'c' => self.cont_thread = id,
            'g' => self.state_query_thread = id,
            _ => return None,
        }
        Some("OK".to_string())
    }

    /// `vCont?` advertises the supported actions; `vCont;<act>[:<tid>];...`
    /// runs the actions left to right and replies for the last one.
    fn vcont(&mut self, command: &str) -> String {
        if command == "vCont?" {
            return "vCont;c;s".to_string();
        }
        let actions = command.strip_prefix("vCont;").unwrap_or("");
        let mut reply = "OK".to_string();
        for action in actions.split(';') {
            let (kind, _thread) = action.split_once(':').unwrap_or((action, "-1"));
            match kind {
                "" => {}
                "s" => reply = self.step(),
                "c" => reply = self.cont(),
                other => warn!("ignoring unsupported vCont action {other:?}"),
            }
        }
        reply
    }
}

fn stop_reply(reason: StopReason) -> String {
    match reason {
        StopReason::Breakpoint => STOPPED_TRAP.to_string(),
        StopReason::EndOfTrace => EXITED.to_string(),
    }
}

/// Parse `<type>,<addr>,<kind>` from a `Z`/`z` packet. Type and kind are
/// accepted but not distinguished; all breakpoints are PC matches.
fn parse_breakpoint(args: &str) -> Option<u64> {
    let (bp_type, rest) = args.split_once(',')?;
    if bp_type.len() != 1 || !bp_type.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (addr_hex, kind) = rest.split_once(',')?;
    let (kind_digits, _) = split_hex(kind);
    if kind_digits.is_empty() {
        return None;
    }
    let (addr_hex, trailer) = split_hex(addr_hex);
    if !trailer.is_empty() {
        return None;
    }
    parse_hex_u64(addr_hex)
}
