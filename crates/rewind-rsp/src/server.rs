//! TCP server loop: one debugger connection drives one replay session.
//!
//! The protocol is strictly request/reply with no mid-command preemption,
//! so the loop is plain blocking I/O. In multi-connection mode every
//! accepted connection gets its own thread and its own session (CPU state,
//! cursor, reverse deltas, breakpoints); only the immutable trace is
//! shared.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use rewind_cpu::CpuState;
use rewind_replay::ReplayEngine;
use rewind_trace::TraceRecord;
use tracing::{error, info};

use crate::commands::Session;
use crate::framer::PacketStream;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// PC the debugger sees before the first trace record is applied.
    pub initial_pc: u64,
    /// false: serve exactly one connection, then return.
    /// true: keep accepting; each connection replays independently.
    pub allow_multiple_connections: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1234,
            initial_pc: 0,
            allow_multiple_connections: false,
        }
    }
}

pub struct RspServer {
    listener: TcpListener,
    config: ServerConfig,
    trace: Arc<Vec<TraceRecord>>,
}

impl RspServer {
    /// Bind the listening socket. Port 0 picks an ephemeral port; see
    /// [`RspServer::local_addr`].
    pub fn bind(config: ServerConfig, trace: Arc<Vec<TraceRecord>>) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        info!("RSP server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            config,
            trace,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn new_session(&self) -> Session {
        let cpu = CpuState::riscv64(self.config.initial_pc);
        Session::new(ReplayEngine::new(self.trace.clone(), cpu))
    }

    /// Accept and serve debugger connections. Returns after one connection
    /// in single-connection mode; loops forever otherwise.
    pub fn serve(self) -> io::Result<()> {
        if !self.config.allow_multiple_connections {
            let (stream, peer) = self.listener.accept()?;
            info!("connection from {peer}");
            return serve_client(stream, &mut self.new_session());
        }
        loop {
            let (stream, peer) = self.listener.accept()?;
            info!("connection from {peer}");
            let mut session = self.new_session();
            thread::spawn(move || {
                if let Err(err) = serve_client(stream, &mut session) {
                    error!("client session failed: {err}");
                }
            });
        }
    }
}

/// Packet loop for one connection: runs until the peer disconnects or the
/// session stops (detach or end-of-trace).
fn serve_client(stream: TcpStream, session: &mut Session) -> io::Result<()> {
    let reader = BufReader::new(stream.try_clone()?);
    let mut packets = PacketStream::new(reader, stream);
    while let Some(command) = packets.recv()? {
        if let Some(reply) = session.handle(&command) {
            packets.send(&reply)?;
        }
        if !session.is_running() {
            break;
        }
    }
    info!("client disconnected");
    Ok(())
}
