//! Certificate and CertificateStatus handlers (RFC 5246 §7.4.2,
//! RFC 6066 §8).
//!
//! Chains are carried as opaque DER blobs in the wire framing; chain
//! verification is the certificate layer's job.

use tern_types::TlsError;

use crate::connection::Connection;
use crate::handshake::extensions::CERTIFICATE_STATUS_TYPE_OCSP;
use crate::handshake::HandshakeState;

impl<S> Connection<S> {
    /// Where the server flight goes after the Certificate message: a
    /// granted status_request inserts CertificateStatus first.
    fn state_after_certificate(&self, stapling: bool) -> Result<HandshakeState, TlsError> {
        if stapling {
            return Ok(HandshakeState::ServerCertStatus);
        }
        self.state_after_status()
    }

    /// Ephemeral key exchanges continue with ServerKeyExchange; the rest
    /// jump straight to ServerHelloDone.
    fn state_after_status(&self) -> Result<HandshakeState, TlsError> {
        let suite = self
            .pending
            .cipher_suite
            .ok_or_else(|| TlsError::Internal("no cipher suite selected".into()))?;
        Ok(if suite.ephemeral_key_exchange() {
            HandshakeState::ServerKey
        } else {
            HandshakeState::ServerHelloDone
        })
    }

    pub(crate) fn server_cert_send(&mut self) -> Result<(), TlsError> {
        if self.config.certificate_chain.is_empty() {
            return Err(TlsError::Internal(
                "no certificate chain configured".into(),
            ));
        }
        let total: usize = self
            .config
            .certificate_chain
            .iter()
            .map(|cert| 3 + cert.len())
            .sum();
        self.handshake.io.write_u24(total as u32);
        for cert in &self.config.certificate_chain {
            self.handshake.io.write_u24(cert.len() as u32);
            self.handshake.io.write(cert);
        }

        self.handshake.next_state =
            self.state_after_certificate(self.pending.ocsp_stapling_active)?;
        Ok(())
    }

    pub(crate) fn server_cert_recv(&mut self) -> Result<(), TlsError> {
        let total = self.handshake.io.read_u24()? as usize;
        if total != self.handshake.io.available() {
            return Err(TlsError::BadMessage(
                "certificate list length mismatch".into(),
            ));
        }
        let mut chain = Vec::new();
        while !self.handshake.io.is_empty() {
            let cert_len = self.handshake.io.read_u24()? as usize;
            chain.push(self.handshake.io.read(cert_len)?.to_vec());
        }
        if chain.is_empty() {
            return Err(TlsError::BadMessage("empty certificate chain".into()));
        }
        self.pending.peer_certificates = chain;

        self.handshake.next_state =
            self.state_after_certificate(self.pending.ocsp_status_expected)?;
        Ok(())
    }

    pub(crate) fn server_status_send(&mut self) -> Result<(), TlsError> {
        let response = self
            .config
            .ocsp_response
            .as_ref()
            .ok_or_else(|| TlsError::Internal("no OCSP response configured".into()))?;
        self.handshake.io.write_u8(CERTIFICATE_STATUS_TYPE_OCSP);
        self.handshake.io.write_u24(response.len() as u32);
        self.handshake.io.write(response);

        self.handshake.next_state = self.state_after_status()?;
        Ok(())
    }

    pub(crate) fn server_status_recv(&mut self) -> Result<(), TlsError> {
        let status_type = self.handshake.io.read_u8()?;
        if status_type != CERTIFICATE_STATUS_TYPE_OCSP {
            return Err(TlsError::BadMessage(
                "unknown certificate status type".into(),
            ));
        }
        let response_len = self.handshake.io.read_u24()? as usize;
        if response_len != self.handshake.io.available() {
            return Err(TlsError::BadMessage(
                "certificate status length mismatch".into(),
            ));
        }
        self.pending.ocsp_response = self.handshake.io.read(response_len)?.to_vec();

        self.handshake.next_state = self.state_after_status()?;
        Ok(())
    }
}
