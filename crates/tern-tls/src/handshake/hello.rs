//! ClientHello and ServerHello handlers (RFC 5246 §7.4.1), plus the
//! SSLv2 compatibility hello (RFC 5246 §E.2).
//!
//! ServerHello is where version negotiation lands: the server downgrades
//! to the client's offer when it is lower, the client adopts whatever the
//! server picked after checking it against the supported window.

use std::time::{SystemTime, UNIX_EPOCH};

use tern_types::TlsError;

use crate::connection::Connection;
use crate::handshake::extensions;
use crate::handshake::HandshakeState;
use crate::{version, CipherSuite, SignatureDigest};

/// RFC 5246 §7.4.1.2: NULL is the only compression method.
const COMPRESSION_METHOD_NULL: u8 = 0;

const SESSION_ID_MAX_LEN: usize = 32;

/// First four bytes of a hello random (RFC 5246 §7.4.1.2).
fn gmt_unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// TLS 1.2 signs under SHA-1; earlier versions concatenate MD5 and SHA-1.
fn signature_digest_for(protocol_version: u8) -> SignatureDigest {
    if protocol_version == version::TLS12 {
        SignatureDigest::Sha1
    } else {
        SignatureDigest::Md5Sha1
    }
}

impl<S> Connection<S> {
    pub(crate) fn client_hello_send(&mut self) -> Result<(), TlsError> {
        let mut client_random = [0u8; 32];
        client_random[..4].copy_from_slice(&gmt_unix_time().to_be_bytes());
        self.config.random.fill(&mut client_random[4..])?;
        self.pending.client_random = client_random;
        self.pending.offered_suites = self.config.cipher_suites.clone();

        let (major, minor) = version::to_wire(self.client_protocol_version);
        let request_ocsp = self.config.ocsp_stapling;

        let io = &mut self.handshake.io;
        io.write_u8(major);
        io.write_u8(minor);
        io.write(&client_random);
        io.write_u8(0); // session_id_len; resumption not used
        io.write_u16((self.pending.offered_suites.len() * 2) as u16);
        for suite in &self.pending.offered_suites {
            io.write(&suite.to_wire());
        }
        io.write_u8(1);
        io.write_u8(COMPRESSION_METHOD_NULL);
        extensions::write_client_extensions(io, request_ocsp);

        self.handshake.next_state = HandshakeState::ServerHello;
        Ok(())
    }

    pub(crate) fn client_hello_recv(&mut self) -> Result<(), TlsError> {
        let mut wire = [0u8; 2];
        wire.copy_from_slice(self.handshake.io.read(2)?);
        self.client_protocol_version = version::from_wire(wire[0], wire[1]);
        if self.client_protocol_version < self.config.min_protocol_version {
            return Err(TlsError::BadMessage(
                "client protocol version below minimum".into(),
            ));
        }

        let mut client_random = [0u8; 32];
        client_random.copy_from_slice(self.handshake.io.read(32)?);
        self.pending.client_random = client_random;

        let session_id_len = usize::from(self.handshake.io.read_u8()?);
        if session_id_len > SESSION_ID_MAX_LEN {
            return Err(TlsError::BadMessage("session id too long".into()));
        }
        self.handshake.io.read(session_id_len)?;

        let suites_len = usize::from(self.handshake.io.read_u16()?);
        if suites_len == 0 || suites_len % 2 != 0 {
            return Err(TlsError::BadMessage(
                "malformed cipher suite list".into(),
            ));
        }
        let mut offered = Vec::with_capacity(suites_len / 2);
        for pair in self.handshake.io.read(suites_len)?.chunks_exact(2) {
            offered.push(CipherSuite::from_wire([pair[0], pair[1]]));
        }
        self.select_cipher_as_server(&offered)?;
        self.pending.offered_suites = offered;

        let compression_len = usize::from(self.handshake.io.read_u8()?);
        if compression_len == 0 {
            return Err(TlsError::BadMessage(
                "empty compression method list".into(),
            ));
        }
        let methods = self.handshake.io.read(compression_len)?;
        if !methods.contains(&COMPRESSION_METHOD_NULL) {
            return Err(TlsError::BadMessage(
                "peer does not offer NULL compression".into(),
            ));
        }

        if self.handshake.io.available() >= 2 {
            let extensions_size = usize::from(self.handshake.io.read_u16()?);
            if extensions_size > self.handshake.io.available() {
                return Err(TlsError::BadMessage("extensions overrun message".into()));
            }
            let block = self.handshake.io.read(extensions_size)?.to_vec();
            let parsed = extensions::parse_client_extensions(&block)?;
            self.pending.ocsp_status_requested = parsed.status_request;
        }
        self.pending.ocsp_stapling_active =
            self.pending.ocsp_status_requested && self.config.ocsp_response.is_some();

        self.handshake.next_state = HandshakeState::ServerHello;
        Ok(())
    }

    pub(crate) fn server_hello_send(&mut self) -> Result<(), TlsError> {
        let mut server_random = [0u8; 32];
        server_random[..4].copy_from_slice(&gmt_unix_time().to_be_bytes());
        self.config.random.fill(&mut server_random[4..])?;
        self.pending.server_random = server_random;

        if self.client_protocol_version < self.server_protocol_version {
            self.actual_protocol_version = self.client_protocol_version;
        }
        let (major, minor) = version::to_wire(self.actual_protocol_version);
        self.pending.signature_digest_alg = signature_digest_for(self.actual_protocol_version);

        let suite = self
            .pending
            .cipher_suite
            .ok_or_else(|| TlsError::Internal("no cipher suite selected".into()))?;
        let staple = self.pending.ocsp_stapling_active;

        let io = &mut self.handshake.io;
        io.write_u8(major);
        io.write_u8(minor);
        io.write(&server_random);
        io.write_u8(0); // session_id_len; resumption not used
        io.write(&suite.to_wire());
        io.write_u8(COMPRESSION_METHOD_NULL);
        extensions::write_server_extensions(io, staple);

        self.actual_protocol_version_established = true;
        self.handshake.next_state = HandshakeState::ServerCert;
        Ok(())
    }

    pub(crate) fn server_hello_recv(&mut self) -> Result<(), TlsError> {
        let mut wire = [0u8; 2];
        wire.copy_from_slice(self.handshake.io.read(2)?);
        self.server_protocol_version = version::from_wire(wire[0], wire[1]);

        if self.server_protocol_version > self.actual_protocol_version {
            return Err(TlsError::BadMessage(
                "server negotiated an unsupported protocol version".into(),
            ));
        }
        self.actual_protocol_version = self.server_protocol_version;
        self.actual_protocol_version_established = true;

        if self.actual_protocol_version < self.config.min_protocol_version
            || self.actual_protocol_version > version::TLS12
        {
            return Err(TlsError::BadMessage(
                "negotiated protocol version out of range".into(),
            ));
        }
        self.pending.signature_digest_alg = signature_digest_for(self.actual_protocol_version);

        let mut server_random = [0u8; 32];
        server_random.copy_from_slice(self.handshake.io.read(32)?);
        self.pending.server_random = server_random;

        let session_id_len = usize::from(self.handshake.io.read_u8()?);
        if session_id_len > SESSION_ID_MAX_LEN {
            return Err(TlsError::BadMessage("session id too long".into()));
        }
        self.handshake.io.read(session_id_len)?; // resumption not used

        let mut suite_wire = [0u8; 2];
        suite_wire.copy_from_slice(self.handshake.io.read(2)?);
        self.set_cipher_as_client(suite_wire)?;

        let compression_method = self.handshake.io.read_u8()?;
        if compression_method != COMPRESSION_METHOD_NULL {
            return Err(TlsError::BadMessage("nonzero compression method".into()));
        }

        if self.handshake.io.available() < 2 {
            // No extensions block.
            self.handshake.next_state = HandshakeState::ServerCert;
            return Ok(());
        }
        let extensions_size = usize::from(self.handshake.io.read_u16()?);
        if extensions_size > self.handshake.io.available() {
            return Err(TlsError::BadMessage("extensions overrun message".into()));
        }
        let block = self.handshake.io.read(extensions_size)?.to_vec();
        let parsed = extensions::parse_server_extensions(&block)?;
        self.pending.ocsp_status_expected = parsed.status_request;

        self.handshake.next_state = HandshakeState::ServerCert;
        Ok(())
    }

    /// SSLv2-framed ClientHello body. The record layer has already peeled
    /// the v2 header and captured the client's version from it.
    pub(crate) fn sslv2_client_hello_recv(&mut self) -> Result<(), TlsError> {
        if self.client_protocol_version < self.config.min_protocol_version {
            return Err(TlsError::BadMessage(
                "client protocol version below minimum".into(),
            ));
        }

        let cipher_specs_len = usize::from(self.handshake.io.read_u16()?);
        let session_id_len = usize::from(self.handshake.io.read_u16()?);
        let challenge_len = usize::from(self.handshake.io.read_u16()?);

        if cipher_specs_len == 0 || cipher_specs_len % 3 != 0 {
            return Err(TlsError::BadMessage(
                "malformed SSLv2 cipher spec list".into(),
            ));
        }
        if challenge_len > 32 {
            return Err(TlsError::BadMessage("SSLv2 challenge too long".into()));
        }

        let mut offered = Vec::with_capacity(cipher_specs_len / 3);
        for spec in self.handshake.io.read(cipher_specs_len)?.chunks_exact(3) {
            // Three-byte v2 cipher specs with a zero lead byte carry TLS
            // wire values in the remaining two.
            if spec[0] == 0 {
                offered.push(CipherSuite::from_wire([spec[1], spec[2]]));
            }
        }
        self.select_cipher_as_server(&offered)?;
        self.pending.offered_suites = offered;

        self.handshake.io.read(session_id_len)?;

        // The challenge stands in for the client random, right-aligned.
        let mut client_random = [0u8; 32];
        {
            let challenge = self.handshake.io.read(challenge_len)?;
            client_random[32 - challenge_len..].copy_from_slice(challenge);
        }
        self.pending.client_random = client_random;

        self.handshake.next_state = HandshakeState::ServerHello;
        Ok(())
    }
}
