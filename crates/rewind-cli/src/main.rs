use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rewind_rsp::{RspServer, ServerConfig};
use rewind_trace::{load_trace, write_json_trace, TraceFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rewind",
    about = "Replay a CPU execution trace behind a gdb remote stub"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a trace to gdb over the remote serial protocol.
    Serve {
        /// Trace file to replay.
        trace: PathBuf,
        #[arg(long, value_enum, default_value = "json")]
        format: Format,
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 1234)]
        port: u16,
        /// PC at the start of the trace, in hex.
        #[arg(long, value_parser = parse_hex_pc, default_value = "0")]
        initial_pc: u64,
        /// Keep accepting connections, each replaying independently on its
        /// own thread. Default is to serve one debugger and exit.
        #[arg(long)]
        allow_multiple_connections: bool,
    },
    /// Convert a producer log into the compact JSON trace format.
    Convert {
        /// Log file to convert.
        input: PathBuf,
        #[arg(long, value_enum)]
        format: Format,
        /// Output path; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Spike,
    SifiveRtl,
}

impl From<Format> for TraceFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => TraceFormat::Json,
            Format::Spike => TraceFormat::Spike,
            Format::SifiveRtl => TraceFormat::SifiveRtl,
        }
    }
}

fn parse_hex_pc(text: &str) -> Result<u64, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    // Logs go to stderr; `convert` owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve {
            trace,
            format,
            host,
            port,
            initial_pc,
            allow_multiple_connections,
        } => {
            let records = load_trace(&trace, format.into())
                .with_context(|| format!("loading trace {}", trace.display()))?;
            info!("loaded {} trace records from {}", records.len(), trace.display());
            let config = ServerConfig {
                host,
                port,
                initial_pc,
                allow_multiple_connections,
            };
            let server = RspServer::bind(config, Arc::new(records))
                .context("binding RSP server socket")?;
            server.serve().context("serving debugger connection")?;
        }
        Command::Convert {
            input,
            format,
            output,
        } => {
            let records = load_trace(&input, format.into())
                .with_context(|| format!("loading trace {}", input.display()))?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    write_json_trace(BufWriter::new(file), &records)?;
                    info!("wrote {} records to {}", records.len(), path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    write_json_trace(&mut handle, &records)?;
                    handle.flush()?;
                }
            }
        }
    }
    Ok(())
}
