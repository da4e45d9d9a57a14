//! GDB Remote Serial Protocol front end for trace replay.
//!
//! Everything between the TCP socket and the replay engine lives here: the
//! checksum/hex codec, the `$...#cc` packet framer, the command dispatcher
//! and the server accept loop. The debugger sees an ordinary remote stub;
//! underneath, "execution" is a cursor moving over a recorded trace.

pub mod codec;
pub mod commands;
pub mod framer;
pub mod server;

pub use commands::Session;
pub use framer::PacketStream;
pub use server::{RspServer, ServerConfig};
