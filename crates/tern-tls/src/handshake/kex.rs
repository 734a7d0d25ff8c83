//! ServerKeyExchange, ServerHelloDone and ClientKeyExchange handlers.
//!
//! The exchanged payloads are opaque to the driver: it frames and
//! sequences them, the cipher layer interprets them when deriving the
//! session keys.

use tern_types::TlsError;

use crate::connection::Connection;
use crate::handshake::HandshakeState;

impl<S> Connection<S> {
    pub(crate) fn server_key_send(&mut self) -> Result<(), TlsError> {
        if self.config.key_exchange_data.is_empty() {
            return Err(TlsError::Internal(
                "no key exchange parameters configured".into(),
            ));
        }
        self.handshake.io.write(&self.config.key_exchange_data);

        // Client authentication is not negotiated, so CertificateRequest
        // never follows.
        self.handshake.next_state = HandshakeState::ServerHelloDone;
        Ok(())
    }

    pub(crate) fn server_key_recv(&mut self) -> Result<(), TlsError> {
        let n = self.handshake.io.available();
        self.pending.server_key_params = self.handshake.io.read(n)?.to_vec();
        self.handshake.next_state = HandshakeState::ServerHelloDone;
        Ok(())
    }

    pub(crate) fn server_done_send(&mut self) -> Result<(), TlsError> {
        // ServerHelloDone has an empty body.
        self.handshake.next_state = HandshakeState::ClientKey;
        Ok(())
    }

    pub(crate) fn server_done_recv(&mut self) -> Result<(), TlsError> {
        if !self.handshake.io.is_empty() {
            return Err(TlsError::BadMessage(
                "ServerHelloDone with a nonempty body".into(),
            ));
        }
        self.handshake.next_state = HandshakeState::ClientKey;
        Ok(())
    }

    pub(crate) fn client_key_send(&mut self) -> Result<(), TlsError> {
        self.handshake.io.write(&self.config.key_exchange_data);
        self.handshake.next_state = HandshakeState::ClientChangeCipherSpec;
        Ok(())
    }

    pub(crate) fn client_key_recv(&mut self) -> Result<(), TlsError> {
        let n = self.handshake.io.available();
        self.pending.client_key_params = self.handshake.io.read(n)?.to_vec();
        self.handshake.next_state = HandshakeState::ClientChangeCipherSpec;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TlsConfig;
    use crate::connection::Connection;
    use crate::handshake::HandshakeState;
    use crate::TlsRole;
    use std::io::Cursor;

    fn conn(role: TlsRole, key_exchange_data: Vec<u8>) -> Connection<Cursor<Vec<u8>>> {
        let config = TlsConfig::builder()
            .key_exchange_data(key_exchange_data)
            .build();
        Connection::new(Cursor::new(Vec::new()), role, config)
    }

    #[test]
    fn test_server_key_roundtrip() {
        let params = vec![0x03, 0x00, 0x17, 0x41, 0x04];
        let mut server = conn(TlsRole::Server, params.clone());
        server.server_key_send().unwrap();
        assert_eq!(server.handshake.next_state, HandshakeState::ServerHelloDone);

        let body = server.handshake.io.unread().to_vec();
        let mut client = conn(TlsRole::Client, Vec::new());
        client.handshake.io.write(&body);
        client.server_key_recv().unwrap();
        assert_eq!(client.pending.server_key_params, params);
        assert_eq!(client.handshake.next_state, HandshakeState::ServerHelloDone);
    }

    #[test]
    fn test_server_key_send_needs_parameters() {
        let mut server = conn(TlsRole::Server, Vec::new());
        assert!(server.server_key_send().is_err());
    }

    #[test]
    fn test_server_done_roundtrip() {
        let mut server = conn(TlsRole::Server, Vec::new());
        server.server_done_send().unwrap();
        assert!(server.handshake.io.is_empty());
        assert_eq!(server.handshake.next_state, HandshakeState::ClientKey);

        let mut client = conn(TlsRole::Client, Vec::new());
        client.server_done_recv().unwrap();
        assert_eq!(client.handshake.next_state, HandshakeState::ClientKey);
    }

    #[test]
    fn test_server_done_recv_rejects_nonempty_body() {
        let mut client = conn(TlsRole::Client, Vec::new());
        client.handshake.io.write(&[0x00]);
        assert!(client.server_done_recv().is_err());
    }

    #[test]
    fn test_client_key_roundtrip() {
        let premaster = vec![0xAA; 48];
        let mut client = conn(TlsRole::Client, premaster.clone());
        client.client_key_send().unwrap();
        assert_eq!(
            client.handshake.next_state,
            HandshakeState::ClientChangeCipherSpec
        );

        let body = client.handshake.io.unread().to_vec();
        let mut server = conn(TlsRole::Server, Vec::new());
        server.handshake.io.write(&body);
        server.client_key_recv().unwrap();
        assert_eq!(server.pending.client_key_params, premaster);
        assert_eq!(
            server.handshake.next_state,
            HandshakeState::ClientChangeCipherSpec
        );
    }
}
