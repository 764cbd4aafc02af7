//! Checksum used by NovaStar sending cards
//!
//! Every byte after the 2-byte header is summed as an unsigned value on top
//! of the seed `0x5555`. The low 16 bits are transmitted low byte first.

use super::frame::HEADER_LEN;
use super::ProtocolError;

/// Seed added to the byte sum
pub const CHECKSUM_SEED: u16 = 0x5555;

/// Checksum size in bytes
pub const CHECKSUM_LEN: usize = 2;

/// Seeded 16-bit sum of `data`
pub fn sum16(data: &[u8]) -> u16 {
    data.iter()
        .fold(CHECKSUM_SEED, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// Calculate the checksum of a frame under construction, in wire order.
///
/// `frame` is the complete frame without its checksum, header included.
pub fn checksum(frame: &[u8]) -> Result<[u8; CHECKSUM_LEN], ProtocolError> {
    let domain = frame.get(HEADER_LEN..).ok_or_else(|| {
        ProtocolError::MalformedFrame(format!(
            "{} byte frame is shorter than its header",
            frame.len()
        ))
    })?;

    Ok(sum16(domain).to_le_bytes())
}

/// Verify the trailing checksum of a complete frame
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < HEADER_LEN + CHECKSUM_LEN {
        return false;
    }

    let (body, trailer) = frame.split_at(frame.len() - CHECKSUM_LEN);
    checksum(body).map_or(false, |calculated| calculated == trailer)
}
