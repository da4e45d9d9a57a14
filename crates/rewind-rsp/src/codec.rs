//! RSP checksum and hex conventions.
//!
//! The protocol is text-hex throughout: packets carry a mod-256 checksum of
//! the payload bytes, and register values travel as fixed-width hex in
//! target byte order (little-endian here), i.e. with the byte pairs of the
//! natural hex rendering reversed.

/// Mod-256 sum of the payload bytes, as used in the `$<payload>#<cc>`
/// framing.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Reverse the byte pairs of a hex string: `"ABCDEF01"` -> `"01EFCDAB"`.
///
/// Inputs are expected to have even length; odd-length input is swapped
/// best-effort rather than rejected.
pub fn swap_hex_bytes(hex: &str) -> String {
    let bytes = hex.as_bytes();
    let mut swapped = String::with_capacity(bytes.len());
    for pair in bytes.chunks(2).rev() {
        for &byte in pair {
            swapped.push(byte as char);
        }
    }
    swapped
}

/// Encode a register value as RSP's 16-digit little-endian hex.
pub fn format_reg(value: u64) -> String {
    format!("{:016x}", value.swap_bytes())
}

/// Decode a little-endian hex register value of any even width.
pub fn parse_reg(hex: &str) -> Option<u64> {
    u64::from_str_radix(&swap_hex_bytes(hex), 16).ok()
}

/// Plain big-endian hex, used for addresses, lengths and register numbers.
pub fn parse_hex_u64(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex, 16).ok()
}

/// Split at the end of the leading run of hex digits.
pub fn split_hex(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(text.len());
    text.split_at(end)
}
