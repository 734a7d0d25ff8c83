//! TLS record layer framing.
//!
//! Only plaintext framing lives here: 5-byte record headers, fragment
//! accumulation across short reads, SSLv2 compatibility detection, and
//! the outbound record queue. Record encryption and MAC belong to the
//! cipher layer and are not part of the handshake driver.

use std::io::{Read, Write};

use log::trace;
use tern_types::TlsError;

use crate::buffer::TlsBuffer;

pub const RECORD_HEADER_LENGTH: usize = 5;
pub const MAX_FRAGMENT_LENGTH: usize = 16_384;

/// Extra inbound length tolerated beyond the fragment maximum (cipher
/// expansion on encrypted records).
const RECORD_LENGTH_SLACK: usize = 256;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    /// Convert from the wire byte. Unknown content types yield `None`;
    /// the driver skips those records rather than failing.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// Whether the bytes in `in_buf` have already been through record
/// parsing. `Plaintext` means a parsed record is waiting to be consumed;
/// `Encrypted` means the next transport bytes start a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InStatus {
    Plaintext,
    Encrypted,
}

/// Record-layer buffers and framing state for one connection.
pub struct RecordLayer {
    /// Fragment of the record currently being assembled or consumed.
    pub(crate) in_buf: TlsBuffer,
    /// The 5 header bytes of the inbound record.
    pub(crate) header_in: TlsBuffer,
    /// Framed records queued for the transport.
    pub(crate) out: TlsBuffer,
    pub(crate) in_status: InStatus,
    max_fragment_size: usize,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self {
            in_buf: TlsBuffer::new(),
            header_in: TlsBuffer::new(),
            out: TlsBuffer::new(),
            in_status: InStatus::Encrypted,
            max_fragment_size: MAX_FRAGMENT_LENGTH,
        }
    }

    /// Largest payload one outbound record may carry.
    pub fn max_write_payload_size(&self) -> usize {
        self.max_fragment_size
    }

    /// Read one full record from the transport.
    ///
    /// Returns the raw content-type byte and whether the record uses the
    /// SSLv2 framing (high bit of the first header byte). Short reads
    /// leave `header_in`/`in_buf` primed, so a call interrupted by
    /// `WouldBlock` resumes exactly where it suspended.
    pub(crate) fn read_full_record<S: Read>(
        &mut self,
        stream: &mut S,
    ) -> Result<(u8, bool), TlsError> {
        if self.in_status == InStatus::Plaintext {
            // A parsed record is already sitting in `in_buf`; only
            // application data survives past record parsing.
            return Ok((ContentType::ApplicationData as u8, false));
        }

        fill_from(stream, &mut self.header_in, RECORD_HEADER_LENGTH)?;
        let header = self.header_in.raw();
        let is_sslv2 = header[0] & 0x80 != 0;

        let (record_type, fragment_length) = if is_sslv2 {
            let total = (usize::from(header[0] & 0x7F) << 8) | usize::from(header[1]);
            // Three bytes of the v2 payload (message type and version)
            // were consumed as part of the 5-byte header.
            let fragment = total
                .checked_sub(3)
                .ok_or_else(|| TlsError::BadMessage("SSLv2 record too short".into()))?;
            (header[2], fragment)
        } else {
            let length = usize::from(u16::from_be_bytes([header[3], header[4]]));
            (header[0], length)
        };

        if fragment_length > self.max_fragment_size + RECORD_LENGTH_SLACK {
            return Err(TlsError::BadMessage(
                "record length exceeds maximum fragment size".into(),
            ));
        }

        fill_from(stream, &mut self.in_buf, fragment_length)?;
        if !is_sslv2 {
            self.in_status = InStatus::Plaintext;
        }
        trace!("read record type {record_type}, {fragment_length} byte fragment");
        Ok((record_type, is_sslv2))
    }

    /// Frame `payload` as one record and queue it on `out`.
    pub(crate) fn write_record(
        &mut self,
        content_type: ContentType,
        version: (u8, u8),
        payload: &[u8],
    ) -> Result<(), TlsError> {
        if payload.len() > self.max_fragment_size {
            return Err(TlsError::Internal(
                "record payload exceeds maximum fragment size".into(),
            ));
        }
        self.out.write_u8(content_type as u8);
        self.out.write_u8(version.0);
        self.out.write_u8(version.1);
        self.out.write_u16(payload.len() as u16);
        self.out.write(payload);
        Ok(())
    }

    /// Drive queued records into the transport. `WouldBlock` suspends
    /// with the unsent tail still queued.
    pub(crate) fn flush<S: Write>(&mut self, stream: &mut S) -> Result<(), TlsError> {
        while !self.out.is_empty() {
            let n = stream.write(self.out.unread())?;
            if n == 0 {
                return Err(TlsError::ConnectionClosed);
            }
            self.out.read(n)?;
        }
        self.out.wipe();
        stream.flush()?;
        Ok(())
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Top up `buf` to `want` written bytes from the stream. EOF before that
/// point means the peer closed underneath us.
fn fill_from<S: Read>(stream: &mut S, buf: &mut TlsBuffer, want: usize) -> Result<(), TlsError> {
    let mut chunk = [0u8; MAX_FRAGMENT_LENGTH];
    while buf.written() < want {
        let missing = (want - buf.written()).min(chunk.len());
        let n = stream.read(&mut chunk[..missing])?;
        if n == 0 {
            return Err(TlsError::ConnectionClosed);
        }
        buf.write(&chunk[..n]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    /// Reader that serves queued chunks and reports `WouldBlock` between
    /// them, like a non-blocking socket.
    struct ChunkReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkReader {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl Read for ChunkReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Err(io::ErrorKind::WouldBlock.into());
            };
            let n = buf.len().min(chunk.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                chunk.drain(..n);
                self.chunks.push_front(chunk);
            }
            Ok(n)
        }
    }

    fn record_bytes(content_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut rec = vec![content_type, 3, 3];
        rec.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        rec.extend_from_slice(payload);
        rec
    }

    #[test]
    fn test_content_type_values() {
        assert_eq!(ContentType::ChangeCipherSpec as u8, 20);
        assert_eq!(ContentType::Alert as u8, 21);
        assert_eq!(ContentType::Handshake as u8, 22);
        assert_eq!(ContentType::ApplicationData as u8, 23);
        assert_eq!(ContentType::from_u8(22), Some(ContentType::Handshake));
        assert_eq!(ContentType::from_u8(99), None);
    }

    #[test]
    fn test_read_full_record() {
        let mut rl = RecordLayer::new();
        let mut stream = Cursor::new(record_bytes(22, b"hello"));
        let (record_type, is_sslv2) = rl.read_full_record(&mut stream).unwrap();
        assert_eq!(record_type, 22);
        assert!(!is_sslv2);
        assert_eq!(rl.in_buf.unread(), b"hello");
        assert_eq!(rl.in_status, InStatus::Plaintext);
    }

    #[test]
    fn test_read_full_record_plaintext_short_circuit() {
        // Until the buffers are wiped, a second read reports the already
        // parsed record as application data.
        let mut rl = RecordLayer::new();
        let mut stream = Cursor::new(record_bytes(22, b"hi"));
        rl.read_full_record(&mut stream).unwrap();
        let (record_type, is_sslv2) = rl.read_full_record(&mut stream).unwrap();
        assert_eq!(record_type, 23);
        assert!(!is_sslv2);
    }

    #[test]
    fn test_read_resumes_after_would_block() {
        let full = record_bytes(22, &[0xAB; 10]);
        // Header split mid-way, then a gap, then the fragment in two parts.
        let mut stream = ChunkReader::new(&[&full[..3], &full[3..7], &full[7..]]);
        let mut rl = RecordLayer::new();

        let err = rl.read_full_record(&mut stream);
        // First call may suspend part-way depending on chunking.
        let mut done = err.is_ok();
        for _ in 0..4 {
            if done {
                break;
            }
            match rl.read_full_record(&mut stream) {
                Ok(_) => done = true,
                Err(e) if e.is_would_block() => continue,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(done);
        assert_eq!(rl.in_buf.unread(), &[0xAB; 10]);
    }

    #[test]
    fn test_eof_is_connection_closed() {
        let mut rl = RecordLayer::new();
        let mut stream = Cursor::new(vec![22u8, 3]);
        match rl.read_full_record(&mut stream) {
            Err(TlsError::ConnectionClosed) => {}
            other => panic!("expected ConnectionClosed, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut header = vec![22u8, 3, 3];
        header.extend_from_slice(&u16::MAX.to_be_bytes());
        let mut rl = RecordLayer::new();
        let mut stream = Cursor::new(header);
        match rl.read_full_record(&mut stream) {
            Err(TlsError::BadMessage(_)) => {}
            other => panic!("expected BadMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_sslv2_header_detection() {
        // 2-byte length with high bit set, then message type and version.
        // Total length 28 covers type + version + 25 payload bytes.
        let mut bytes = vec![0x80, 28, 0x01, 0x03, 0x03];
        bytes.extend_from_slice(&[0x55; 25]);
        let mut rl = RecordLayer::new();
        let mut stream = Cursor::new(bytes);
        let (record_type, is_sslv2) = rl.read_full_record(&mut stream).unwrap();
        assert!(is_sslv2);
        assert_eq!(record_type, 0x01);
        assert_eq!(rl.in_buf.unread(), &[0x55; 25]);
        // SSLv2 records bypass record parsing, so no plaintext marker.
        assert_eq!(rl.in_status, InStatus::Encrypted);
    }

    #[test]
    fn test_write_record_frames_header() {
        let mut rl = RecordLayer::new();
        rl.write_record(ContentType::Handshake, (3, 3), b"abc").unwrap();
        assert_eq!(rl.out.unread(), &[22, 3, 3, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_write_record_rejects_oversized_payload() {
        let mut rl = RecordLayer::new();
        let payload = vec![0u8; MAX_FRAGMENT_LENGTH + 1];
        assert!(rl
            .write_record(ContentType::Handshake, (3, 3), &payload)
            .is_err());
    }

    #[test]
    fn test_flush_drains_out() {
        let mut rl = RecordLayer::new();
        rl.write_record(ContentType::Alert, (3, 3), &[2, 40]).unwrap();
        let mut sink = Vec::new();
        rl.flush(&mut sink).unwrap();
        assert_eq!(sink, vec![21, 3, 3, 0, 2, 2, 40]);
        assert!(rl.out.is_empty());
        assert_eq!(rl.out.written(), 0);
    }

    /// Writer that accepts a limited number of bytes, then blocks.
    struct ThrottledWriter {
        accepted: Vec<u8>,
        budget: usize,
    }

    impl io::Write for ThrottledWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget);
            self.accepted.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_flush_suspends_and_resumes() {
        let mut rl = RecordLayer::new();
        rl.write_record(ContentType::Handshake, (3, 3), &[0xCC; 16]).unwrap();
        let mut writer = ThrottledWriter {
            accepted: Vec::new(),
            budget: 7,
        };
        let err = rl.flush(&mut writer).unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(writer.accepted.len(), 7);

        writer.budget = usize::MAX;
        rl.flush(&mut writer).unwrap();
        assert_eq!(writer.accepted.len(), 5 + 16);
        assert!(rl.out.is_empty());
    }
}
