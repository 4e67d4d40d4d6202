use super::put_be_uint;
use crate::EncodeError;

/// Encodes big-endian fields into a caller-owned buffer.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Reserve the next `len` bytes and hand them out for filling.
    fn claim(&mut self, len: usize) -> Result<&mut [u8], EncodeError> {
        if self.remaining() < len {
            return Err(EncodeError::BufferTooSmall);
        }
        let start = self.pos;
        self.pos += len;
        Ok(&mut self.buf[start..self.pos])
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.claim(1)?[0] = value;
        Ok(())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.claim(data.len())?.copy_from_slice(data);
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_be_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_be_u64(&mut self, value: u64) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    /// Write `value` as a `width`-byte big-endian integer.
    pub fn write_be_uint(&mut self, value: u64, width: usize) -> Result<(), EncodeError> {
        if width < 8 && value >> (width * 8) != 0 {
            return Err(EncodeError::ValueOutOfRange);
        }
        put_be_uint(value, self.claim(width)?);
        Ok(())
    }

    /// One length byte, then `data`. Used for user names and serials.
    pub fn write_len_prefixed(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        let len = u8::try_from(data.len()).map_err(|_| EncodeError::FieldTooLong)?;
        self.write_u8(len)?;
        self.write_all(data)
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::EncodeError;

    #[test]
    fn login_style_fields() {
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        w.write_u8(0x07).unwrap();
        w.write_be_u16(0x0800).unwrap();
        w.write_len_prefixed(b"admin").unwrap();
        w.write_be_u32(0x0000_0064).unwrap();
        assert_eq!(
            w.as_written(),
            &[0x07, 0x08, 0x00, 0x05, b'a', b'd', b'm', b'i', b'n', 0, 0, 0, 0x64]
        );
        assert_eq!(w.remaining(), 3);
    }

    #[test]
    fn full_buffer_is_rejected_without_partial_write() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.write_be_u16(0x1234).unwrap();
        assert_eq!(w.write_be_u16(0).unwrap_err(), EncodeError::BufferTooSmall);
        assert_eq!(w.position(), 2);
    }

    #[test]
    fn variable_width_integers() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        w.write_be_uint(1, 1).unwrap();
        w.write_be_uint(0x0203, 3).unwrap();
        assert_eq!(w.write_be_uint(0x100, 1).unwrap_err(), EncodeError::ValueOutOfRange);
        assert_eq!(w.as_written(), &[0x01, 0x00, 0x02, 0x03]);
    }

    #[test]
    fn length_prefix_limit() {
        let mut buf = [0u8; 512];
        let mut w = Writer::new(&mut buf);
        assert_eq!(
            w.write_len_prefixed(&[0u8; 256]).unwrap_err(),
            EncodeError::FieldTooLong
        );
        assert_eq!(w.position(), 0);
    }
}
