//! Big-endian cursors over caller-owned buffers.
//!
//! Every multi-byte field on the SSCP wire is big-endian, including
//! variable payloads of arbitrary width.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// Fold up to the last 8 bytes of `bytes` into an unsigned integer.
pub fn be_uint(bytes: &[u8]) -> u64 {
    let tail = &bytes[bytes.len().saturating_sub(8)..];
    tail.iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Fill `out` with `value`, most significant byte first. Bytes beyond the
/// eighth from the end are zeroed. Returns `false` if `value` does not fit.
pub fn put_be_uint(value: u64, out: &mut [u8]) -> bool {
    let width = out.len();
    if width < 8 && value >> (width * 8) != 0 {
        return false;
    }
    let bytes = value.to_be_bytes();
    let split = width.saturating_sub(8);
    out[..split].fill(0);
    out[split..].copy_from_slice(&bytes[8 - (width - split)..]);
    true
}
