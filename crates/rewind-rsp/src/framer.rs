//! Byte-level `$<payload>#<cc>` packet framing with the ack discipline.
//!
//! Receive scans to `$`, collects the payload up to `#`, then checks the
//! two checksum digits: a good packet is acked with `+` and handed up, a
//! bad one is nacked with `-` and re-read. No-ack mode is never negotiated
//! (`qSupported` advertises `QStartNoAckMode-`), so the discipline is
//! always on. The framer knows nothing about payload meaning.

use std::io::{self, Read, Write};

use tracing::{debug, warn};

use crate::codec::checksum;

/// Framed packet transport over a split read/write stream pair.
///
/// The halves are generic so a TCP connection (stream plus `try_clone`)
/// and an in-memory cursor pair both work.
pub struct PacketStream<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> PacketStream<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Tear down into the underlying halves.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Receive the next valid packet payload; `None` means the peer closed
    /// the connection. Checksum failures are nacked and retried internally.
    pub fn recv(&mut self) -> io::Result<Option<String>> {
        loop {
            // Scan to the start marker. Stray bytes (including the peer's
            // own `+` acks) are ignored.
            loop {
                match self.read_byte()? {
                    None => return Ok(None),
                    Some(b'$') => break,
                    Some(_) => {}
                }
            }
            let mut payload = Vec::new();
            loop {
                match self.read_byte()? {
                    None => return Ok(None),
                    Some(b'#') => break,
                    Some(byte) => payload.push(byte),
                }
            }
            let mut declared = [0u8; 2];
            for slot in &mut declared {
                match self.read_byte()? {
                    None => return Ok(None),
                    Some(byte) => *slot = byte,
                }
            }

            let declared = std::str::from_utf8(&declared)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok());
            if declared == Some(checksum(&payload)) {
                self.writer.write_all(b"+")?;
                self.writer.flush()?;
                let payload = String::from_utf8_lossy(&payload).into_owned();
                debug!("<- {payload}");
                return Ok(Some(payload));
            }
            warn!("packet checksum mismatch, requesting retransmit");
            self.writer.write_all(b"-")?;
            self.writer.flush()?;
        }
    }

    /// Frame and send one reply packet as a single write.
    pub fn send(&mut self, payload: &str) -> io::Result<()> {
        let packet = format!("${payload}#{:02x}", checksum(payload.as_bytes()));
        debug!("-> {packet}");
        self.writer.write_all(packet.as_bytes())?;
        self.writer.flush()
    }
}
