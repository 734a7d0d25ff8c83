//! ChangeCipherSpec and Finished handlers (RFC 5246 §7.1, §7.4.9).
//!
//! ChangeCipherSpec is a one-byte message in its own content type; the
//! pending cipher parameters become active there, under the cipher
//! layer's control. Finished carries the 12-byte verify_data computed by
//! the cipher layer's PRF over the transcript hashes; the driver frames
//! and records it.

use tern_types::TlsError;

use crate::connection::Connection;
use crate::handshake::HandshakeState;

const CHANGE_CIPHER_SPEC_VALUE: u8 = 1;

/// RFC 5246 §7.4.9: verify_data is 12 bytes for every TLS version here.
pub const VERIFY_DATA_LENGTH: usize = 12;

impl<S> Connection<S> {
    fn ccs_send(&mut self, next: HandshakeState) -> Result<(), TlsError> {
        self.handshake.io.write_u8(CHANGE_CIPHER_SPEC_VALUE);
        self.handshake.next_state = next;
        Ok(())
    }

    fn ccs_recv(&mut self, next: HandshakeState) -> Result<(), TlsError> {
        if self.handshake.io.read_u8()? != CHANGE_CIPHER_SPEC_VALUE {
            return Err(TlsError::BadMessage(
                "ChangeCipherSpec value must be 1".into(),
            ));
        }
        self.handshake.next_state = next;
        Ok(())
    }

    fn finished_send(&mut self, next: HandshakeState) -> Result<(), TlsError> {
        let verify_data = self.pending.verify_data;
        self.handshake.io.write(&verify_data);
        self.handshake.next_state = next;
        Ok(())
    }

    fn finished_recv(&mut self, next: HandshakeState) -> Result<(), TlsError> {
        if self.handshake.io.available() != VERIFY_DATA_LENGTH {
            return Err(TlsError::BadMessage(
                "Finished verify_data must be 12 bytes".into(),
            ));
        }
        let mut peer_verify_data = [0u8; VERIFY_DATA_LENGTH];
        peer_verify_data.copy_from_slice(self.handshake.io.read(VERIFY_DATA_LENGTH)?);
        self.pending.peer_verify_data = peer_verify_data;
        self.handshake.next_state = next;
        Ok(())
    }

    pub(crate) fn client_ccs_send(&mut self) -> Result<(), TlsError> {
        self.ccs_send(HandshakeState::ClientFinished)
    }

    pub(crate) fn client_ccs_recv(&mut self) -> Result<(), TlsError> {
        self.ccs_recv(HandshakeState::ClientFinished)
    }

    pub(crate) fn server_ccs_send(&mut self) -> Result<(), TlsError> {
        self.ccs_send(HandshakeState::ServerFinished)
    }

    pub(crate) fn server_ccs_recv(&mut self) -> Result<(), TlsError> {
        self.ccs_recv(HandshakeState::ServerFinished)
    }

    pub(crate) fn client_finished_send(&mut self) -> Result<(), TlsError> {
        self.finished_send(HandshakeState::ServerChangeCipherSpec)
    }

    pub(crate) fn client_finished_recv(&mut self) -> Result<(), TlsError> {
        self.finished_recv(HandshakeState::ServerChangeCipherSpec)
    }

    pub(crate) fn server_finished_send(&mut self) -> Result<(), TlsError> {
        self.finished_send(HandshakeState::HandshakeOver)
    }

    pub(crate) fn server_finished_recv(&mut self) -> Result<(), TlsError> {
        self.finished_recv(HandshakeState::HandshakeOver)
    }
}
