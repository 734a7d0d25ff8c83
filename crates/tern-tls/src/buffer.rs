//! Growable byte buffer with independent read and write cursors.
//!
//! One `TlsBuffer` backs both directions of handshake message assembly:
//! writes append at the tail, reads advance a separate cursor, `reread`
//! rewinds the read cursor for another pass, and `wipe` zeroizes the
//! contents before resetting. Borrowed slices never outlive a wipe.

use tern_types::TlsError;
use zeroize::Zeroize;

#[derive(Debug, Default)]
pub struct TlsBuffer {
    data: Vec<u8>,
    read_cursor: usize,
}

impl TlsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written but not yet read.
    pub fn available(&self) -> usize {
        self.data.len() - self.read_cursor
    }

    /// Whether all written bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Total bytes written since the last wipe, read or not.
    pub fn written(&self) -> usize {
        self.data.len()
    }

    /// The whole written region, including already-read bytes.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// The not-yet-read region.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_cursor..]
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u24(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes()[1..]);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    /// Read exactly `n` bytes, advancing the read cursor.
    pub fn read(&mut self, n: usize) -> Result<&[u8], TlsError> {
        if self.available() < n {
            return Err(TlsError::BadMessage("read past end of buffer".into()));
        }
        let start = self.read_cursor;
        self.read_cursor += n;
        Ok(&self.data[start..start + n])
    }

    pub fn read_u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TlsError> {
        let b = self.read(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32, TlsError> {
        let b = self.read(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, TlsError> {
        let b = self.read(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Move exactly `n` bytes from this buffer's read cursor to `dst`'s
    /// write cursor.
    pub fn copy_to(&mut self, dst: &mut TlsBuffer, n: usize) -> Result<(), TlsError> {
        let bytes = self.read(n)?;
        dst.write(bytes);
        Ok(())
    }

    /// Overwrite `bytes.len()` bytes at absolute offset `off` within the
    /// written region. Used to finalize reserved headers.
    pub fn overwrite(&mut self, off: usize, bytes: &[u8]) -> Result<(), TlsError> {
        let end = off
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| TlsError::Internal("overwrite outside written region".into()))?;
        self.data[off..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Rewind the read cursor to the start of the written region.
    pub fn reread(&mut self) {
        self.read_cursor = 0;
    }

    /// Zeroize the contents and reset both cursors.
    pub fn wipe(&mut self) {
        self.data.zeroize();
        self.data.clear();
        self.read_cursor = 0;
    }

    /// Wipe and give the backing allocation back.
    pub fn release(&mut self) {
        self.wipe();
        self.data = Vec::new();
    }
}

impl Drop for TlsBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_advances_cursors() {
        let mut buf = TlsBuffer::new();
        buf.write(b"abcdef");
        assert_eq!(buf.available(), 6);
        assert_eq!(buf.read(2).unwrap(), b"ab");
        assert_eq!(buf.available(), 4);
        assert_eq!(buf.read(4).unwrap(), b"cdef");
        assert!(buf.is_empty());
        assert_eq!(buf.written(), 6);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut buf = TlsBuffer::new();
        buf.write(b"ab");
        assert!(buf.read(3).is_err());
        // The failed read must not move the cursor.
        assert_eq!(buf.read(2).unwrap(), b"ab");
    }

    #[test]
    fn test_typed_reads_and_writes() {
        let mut buf = TlsBuffer::new();
        buf.write_u8(0x16);
        buf.write_u16(0x0303);
        buf.write_u24(0x01_02_03);
        buf.write_u32(0xDEAD_BEEF);
        assert_eq!(buf.raw(), &[0x16, 0x03, 0x03, 0x01, 0x02, 0x03, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(buf.read_u8().unwrap(), 0x16);
        assert_eq!(buf.read_u16().unwrap(), 0x0303);
        assert_eq!(buf.read_u24().unwrap(), 0x01_02_03);
        assert_eq!(buf.read_u32().unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_reread_rewinds_read_cursor() {
        let mut buf = TlsBuffer::new();
        buf.write(b"wxyz");
        buf.read(3).unwrap();
        buf.reread();
        assert_eq!(buf.available(), 4);
        assert_eq!(buf.read(4).unwrap(), b"wxyz");
    }

    #[test]
    fn test_wipe_clears_data_and_cursors() {
        let mut buf = TlsBuffer::new();
        buf.write(b"secret");
        buf.read(2).unwrap();
        buf.wipe();
        assert_eq!(buf.written(), 0);
        assert!(buf.is_empty());
        buf.write(b"ok");
        assert_eq!(buf.read(2).unwrap(), b"ok");
    }

    #[test]
    fn test_copy_to_moves_bytes() {
        let mut src = TlsBuffer::new();
        let mut dst = TlsBuffer::new();
        src.write(b"hello world");
        src.copy_to(&mut dst, 5).unwrap();
        assert_eq!(dst.raw(), b"hello");
        assert_eq!(src.unread(), b" world");
        assert!(src.copy_to(&mut dst, 7).is_err());
    }

    #[test]
    fn test_overwrite_patches_written_region() {
        let mut buf = TlsBuffer::new();
        buf.write(&[0xAA, 0x00, 0x00, 0x00, 0xBB]);
        buf.overwrite(1, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(buf.raw(), &[0xAA, 0x01, 0x02, 0x03, 0xBB]);
        assert!(buf.overwrite(3, &[0, 0, 0]).is_err());
        assert!(buf.overwrite(usize::MAX, &[1]).is_err());
    }

    #[test]
    fn test_release_drops_capacity() {
        let mut buf = TlsBuffer::new();
        buf.write(&[0u8; 4096]);
        buf.release();
        assert_eq!(buf.written(), 0);
        buf.write(b"reusable");
        assert_eq!(buf.read(8).unwrap(), b"reusable");
    }
}
