//! Handshake message header framing: `msg_type(1) || length(3)`.
//!
//! Outbound messages reserve the header before the body is written and
//! patch the length in afterwards, so encoders never need to know their
//! size up front.

use tern_types::TlsError;

use crate::buffer::TlsBuffer;

use super::{HANDSHAKE_HEADER_LENGTH, MAXIMUM_HANDSHAKE_MESSAGE_LENGTH};

/// Reserve a 4-byte header at the tail of `io`: the message type plus a
/// zeroed length to be patched by [`finish_header`].
pub(crate) fn write_header(io: &mut TlsBuffer, message_type: u8) {
    io.write_u8(message_type);
    io.write_u24(0);
}

/// Patch the reserved header once the body length is known. The header is
/// assumed to sit at the start of `io`, which holds exactly one message.
pub(crate) fn finish_header(io: &mut TlsBuffer) -> Result<(), TlsError> {
    let body_len = io
        .written()
        .checked_sub(HANDSHAKE_HEADER_LENGTH)
        .ok_or_else(|| TlsError::Internal("no handshake header reserved".into()))?;
    if body_len > MAXIMUM_HANDSHAKE_MESSAGE_LENGTH as usize {
        return Err(TlsError::BadMessage(
            "handshake message exceeds maximum length".into(),
        ));
    }
    let length = (body_len as u32).to_be_bytes();
    io.overwrite(1, &length[1..])
}

/// Parse the 4-byte header at the read cursor. Returns the raw message
/// type byte and the body length.
pub(crate) fn parse_header(io: &mut TlsBuffer) -> Result<(u8, u32), TlsError> {
    let message_type = io.read_u8()?;
    let length = io.read_u24()?;
    Ok((message_type, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::HandshakeType;

    #[test]
    fn test_header_reserve_and_finish() {
        let mut io = TlsBuffer::new();
        write_header(&mut io, HandshakeType::ServerHello as u8);
        io.write(&[0xAB; 38]);
        finish_header(&mut io).unwrap();
        assert_eq!(&io.raw()[..4], &[2, 0, 0, 38]);

        let (message_type, length) = parse_header(&mut io).unwrap();
        assert_eq!(message_type, 2);
        assert_eq!(length, 38);
        assert_eq!(io.available(), 38);
    }

    #[test]
    fn test_empty_body_message() {
        let mut io = TlsBuffer::new();
        write_header(&mut io, HandshakeType::ServerHelloDone as u8);
        finish_header(&mut io).unwrap();
        assert_eq!(io.raw(), &[14, 0, 0, 0]);
    }

    #[test]
    fn test_finish_rejects_oversized_body() {
        let mut io = TlsBuffer::new();
        write_header(&mut io, HandshakeType::Certificate as u8);
        io.write(&vec![0u8; MAXIMUM_HANDSHAKE_MESSAGE_LENGTH as usize + 1]);
        assert!(finish_header(&mut io).is_err());
    }

    #[test]
    fn test_parse_header_needs_four_bytes() {
        let mut io = TlsBuffer::new();
        io.write(&[1, 0, 0]);
        assert!(parse_header(&mut io).is_err());
    }
}
