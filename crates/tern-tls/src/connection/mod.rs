//! Connection state and the handshake drive loop.
//!
//! `negotiate` walks the state machine one message at a time, writing
//! when the table says this role transmits and reading otherwise. All
//! I/O is cooperative: a transport that cannot make progress surfaces as
//! a [`Blocked`] status, and the next call picks up mid-message from the
//! buffered cursors.

use std::io::{Read, Write};
use std::thread;

use log::{debug, trace};
use tern_types::TlsError;
use zeroize::Zeroize;

use crate::alert::{Alert, AlertLevel};
use crate::buffer::TlsBuffer;
use crate::config::TlsConfig;
use crate::handshake::transcript::HandshakeHashes;
use crate::handshake::{
    codec, valid_transition, HandshakeState, Writer, HANDSHAKE_HEADER_LENGTH,
    MAXIMUM_HANDSHAKE_MESSAGE_LENGTH,
};
use crate::record::{ContentType, InStatus, RecordLayer, RECORD_HEADER_LENGTH};
use crate::{version, Blocked, CipherSuite, SignatureDigest, TlsRole};


/// Cryptographic parameters negotiated by the handshake but not yet
/// active. They become the live parameters at ChangeCipherSpec; the
/// activation itself belongs to the cipher layer, which treats this
/// struct as its write target.
pub struct Pending {
    pub client_random: [u8; 32],
    pub server_random: [u8; 32],
    pub cipher_suite: Option<CipherSuite>,
    pub signature_digest_alg: SignatureDigest,
    /// Cipher suites offered in the ClientHello: our own offer when
    /// playing client, the peer's offer when playing server.
    pub(crate) offered_suites: Vec<CipherSuite>,
    /// Server side: the client asked for a stapled OCSP response.
    pub(crate) ocsp_status_requested: bool,
    /// Server side: a CertificateStatus message will be sent.
    pub(crate) ocsp_stapling_active: bool,
    /// Client side: the server granted our status_request.
    pub(crate) ocsp_status_expected: bool,
    /// Client side: the stapled OCSP response as received.
    pub ocsp_response: Vec<u8>,
    /// Peer certificate chain, DER-encoded, leaf first.
    pub peer_certificates: Vec<Vec<u8>>,
    /// Opaque key-exchange payloads, carried but not interpreted.
    pub server_key_params: Vec<u8>,
    pub client_key_params: Vec<u8>,
    /// Local Finished payload, filled in by the cipher layer.
    pub verify_data: [u8; 12],
    /// Peer Finished payload as received.
    pub peer_verify_data: [u8; 12],
}

impl Pending {
    fn new() -> Self {
        Self {
            client_random: [0; 32],
            server_random: [0; 32],
            cipher_suite: None,
            signature_digest_alg: SignatureDigest::Md5Sha1,
            offered_suites: Vec::new(),
            ocsp_status_requested: false,
            ocsp_stapling_active: false,
            ocsp_status_expected: false,
            ocsp_response: Vec::new(),
            peer_certificates: Vec::new(),
            server_key_params: Vec::new(),
            client_key_params: Vec::new(),
            verify_data: [0; 12],
            peer_verify_data: [0; 12],
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.client_random.zeroize();
        self.server_random.zeroize();
        self.server_key_params.zeroize();
        self.client_key_params.zeroize();
        self.verify_data.zeroize();
        self.peer_verify_data.zeroize();
    }
}

/// Handshake-scoped state: position in the state machine, the message
/// assembly buffer and the rolling transcript hashes.
pub(crate) struct Handshake {
    pub(crate) state: HandshakeState,
    pub(crate) next_state: HandshakeState,
    /// Holds one outbound message before fragmentation, or one inbound
    /// message while it is reassembled. Empty whenever `state` changes.
    pub(crate) io: TlsBuffer,
    /// Released once the Finished messages are behind us.
    pub(crate) hashes: Option<HandshakeHashes>,
}

/// A TLS connection driving the handshake state machine over `S`.
pub struct Connection<S> {
    pub(crate) stream: S,
    pub(crate) mode: TlsRole,
    pub(crate) config: TlsConfig,
    pub(crate) handshake: Handshake,
    pub(crate) record: RecordLayer,
    pub(crate) pending: Pending,
    /// Reassembles 2-byte alerts that arrive split across records.
    pub(crate) alert_in: TlsBuffer,
    pub(crate) client_protocol_version: u8,
    pub(crate) server_protocol_version: u8,
    pub(crate) actual_protocol_version: u8,
    pub(crate) actual_protocol_version_established: bool,
    pub(crate) closed: bool,
}

impl<S> Connection<S> {
    /// Create a connection in the initial `ClientHello` state.
    pub fn new(stream: S, mode: TlsRole, config: TlsConfig) -> Self {
        let highest = config.max_protocol_version;
        Self {
            stream,
            mode,
            config,
            handshake: Handshake {
                state: HandshakeState::ClientHello,
                next_state: HandshakeState::ClientHello,
                io: TlsBuffer::new(),
                hashes: Some(HandshakeHashes::new()),
            },
            record: RecordLayer::new(),
            pending: Pending::new(),
            alert_in: TlsBuffer::new(),
            client_protocol_version: highest,
            server_protocol_version: highest,
            actual_protocol_version: highest,
            actual_protocol_version_established: false,
            closed: false,
        }
    }

    pub fn role(&self) -> TlsRole {
        self.mode
    }

    pub fn handshake_complete(&self) -> bool {
        self.handshake.state == HandshakeState::HandshakeOver
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The negotiated protocol version, encoded `major * 10 + minor`.
    /// Meaningful once [`Connection::protocol_version_established`] holds.
    pub fn actual_protocol_version(&self) -> u8 {
        self.actual_protocol_version
    }

    pub fn protocol_version_established(&self) -> bool {
        self.actual_protocol_version_established
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.pending.cipher_suite
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    /// Mutable access for the cipher layer: premaster material and the
    /// Finished verify_data land here.
    pub fn pending_mut(&mut self) -> &mut Pending {
        &mut self.pending
    }

    /// Client side: adopt the cipher suite the server echoed, verifying
    /// it was actually offered and is enabled.
    pub(crate) fn set_cipher_as_client(&mut self, wire: [u8; 2]) -> Result<(), TlsError> {
        let suite = CipherSuite::from_wire(wire);
        if !self.pending.offered_suites.contains(&suite)
            || !self.config.cipher_suites.contains(&suite)
        {
            return Err(TlsError::BadMessage(
                "server selected a cipher suite that was not offered".into(),
            ));
        }
        self.pending.cipher_suite = Some(suite);
        Ok(())
    }

    /// Server side: pick the first configured suite the client offered.
    pub(crate) fn select_cipher_as_server(
        &mut self,
        offered: &[CipherSuite],
    ) -> Result<(), TlsError> {
        let suite = self
            .config
            .cipher_suites
            .iter()
            .find(|suite| offered.contains(suite))
            .copied()
            .ok_or(TlsError::NoSharedCipherSuite)?;
        self.pending.cipher_suite = Some(suite);
        Ok(())
    }

    /// Uniform delay before surfacing read-path handler failures, so
    /// error timing does not leak which check rejected the peer's bytes.
    fn sleep_delay(&self) {
        let delay = self.config.error_blinding_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    /// Only the role the state table names may transmit here.
    fn validate_send_state(&self) -> Result<(), TlsError> {
        let expected = match self.mode {
            TlsRole::Client => Writer::Client,
            TlsRole::Server => Writer::Server,
        };
        if self.handshake.state.writer() != expected {
            return Err(TlsError::Internal(format!(
                "{:?} writing in state {:?}",
                self.mode, self.handshake.state
            )));
        }
        Ok(())
    }

    /// Converse of [`Connection::validate_send_state`]: we read only in
    /// states where the peer writes.
    fn validate_recv_state(&self) -> Result<(), TlsError> {
        let peer = match self.mode {
            TlsRole::Client => Writer::Server,
            TlsRole::Server => Writer::Client,
        };
        if self.handshake.state.writer() != peer {
            return Err(TlsError::Internal(format!(
                "{:?} reading in state {:?}",
                self.mode, self.handshake.state
            )));
        }
        Ok(())
    }

    /// Check the transition the handler chose, then take it.
    fn advance_state(&mut self) -> Result<(), TlsError> {
        let from = self.handshake.state;
        let next = self.handshake.next_state;
        if !valid_transition(from, next) {
            return Err(TlsError::Internal(format!(
                "handshake transition {from:?} -> {next:?} is out of sequence"
            )));
        }
        trace!("handshake state {from:?} -> {next:?}");
        self.handshake.state = next;
        Ok(())
    }

    fn wipe_record_buffers(&mut self) {
        self.record.header_in.wipe();
        self.record.in_buf.wipe();
        self.record.in_status = InStatus::Encrypted;
    }

    /// Invoke the per-state handler for our role. Handler selection is
    /// an exhaustive match, so the compiler proves every (state, role)
    /// pair is covered.
    fn dispatch(&mut self) -> Result<(), TlsError> {
        use HandshakeState::*;
        use TlsRole::*;
        match (self.handshake.state, self.mode) {
            (ClientHello, Client) => self.client_hello_send(),
            (ClientHello, Server) => self.client_hello_recv(),
            (ServerHello, Server) => self.server_hello_send(),
            (ServerHello, Client) => self.server_hello_recv(),
            (ServerCert, Server) => self.server_cert_send(),
            (ServerCert, Client) => self.server_cert_recv(),
            (ServerCertStatus, Server) => self.server_status_send(),
            (ServerCertStatus, Client) => self.server_status_recv(),
            (ServerKey, Server) => self.server_key_send(),
            (ServerKey, Client) => self.server_key_recv(),
            (ServerHelloDone, Server) => self.server_done_send(),
            (ServerHelloDone, Client) => self.server_done_recv(),
            (ClientKey, Client) => self.client_key_send(),
            (ClientKey, Server) => self.client_key_recv(),
            (ClientChangeCipherSpec, Client) => self.client_ccs_send(),
            (ClientChangeCipherSpec, Server) => self.client_ccs_recv(),
            (ClientFinished, Client) => self.client_finished_send(),
            (ClientFinished, Server) => self.client_finished_recv(),
            (ServerChangeCipherSpec, Server) => self.server_ccs_send(),
            (ServerChangeCipherSpec, Client) => self.server_ccs_recv(),
            (ServerFinished, Server) => self.server_finished_send(),
            (ServerFinished, Client) => self.server_finished_recv(),
            // Client authentication is not negotiated, so these states
            // are never entered.
            (ServerCertReq, _) | (ClientCert, _) | (ClientCertVerify, _) => Err(
                TlsError::Internal("client authentication messages have no handler".into()),
            ),
            (HandshakeOver, _) => Err(TlsError::Internal(
                "no handler once the handshake is over".into(),
            )),
        }
    }
}

impl<S: Read + Write> Connection<S> {
    /// Drive the handshake until it completes or the transport suspends.
    ///
    /// Returns `Blocked::NotBlocked` once the handshake is over (calling
    /// again is then a no-op), `OnRead`/`OnWrite` when the transport
    /// could not make progress and the call should be repeated, and an
    /// error for every fatal condition, after which the connection is
    /// closed.
    pub fn negotiate(&mut self) -> Result<Blocked, TlsError> {
        if self.closed {
            return Err(TlsError::ConnectionClosed);
        }
        let me = match self.mode {
            TlsRole::Client => Writer::Client,
            TlsRole::Server => Writer::Server,
        };
        while self.handshake.state.writer() != Writer::Both {
            // Flush pending I/O before progressing.
            if let Err(e) = self.record.flush(&mut self.stream) {
                return self.suspend_or_fail(e, Blocked::OnWrite);
            }

            let (result, blocked) = if self.handshake.state.writer() == me {
                (self.handshake_write_io(), Blocked::OnWrite)
            } else {
                (self.handshake_read_io(), Blocked::OnRead)
            };
            if let Err(e) = result {
                return self.suspend_or_fail(e, blocked);
            }

            // If the handshake just ended, free up memory.
            if self.handshake.state.writer() == Writer::Both {
                self.handshake.io.release();
                self.handshake.hashes = None;
            }
        }
        Ok(Blocked::NotBlocked)
    }

    fn suspend_or_fail(&mut self, e: TlsError, blocked: Blocked) -> Result<Blocked, TlsError> {
        if e.is_would_block() {
            return Ok(blocked);
        }
        self.closed = true;
        Err(e)
    }

    /// Send the current state's message, fragmenting into records.
    ///
    /// A message may span several records but a record never carries more
    /// than one message. Suspension leaves the unsent remainder in
    /// `handshake.io`; the next call resumes fragmenting without running
    /// the handler again.
    fn handshake_write_io(&mut self) -> Result<(), TlsError> {
        self.validate_send_state()?;
        let record_type = self.handshake.state.action().record_type;
        let message_type = self.handshake.state.action().message_type;

        // Frame a fresh message only when nothing is queued or draining.
        if self.record.out.is_empty() && self.handshake.io.is_empty() {
            if record_type == ContentType::Handshake {
                codec::write_header(&mut self.handshake.io, message_type);
            }
            self.dispatch()?;
            if record_type == ContentType::Handshake {
                codec::finish_header(&mut self.handshake.io)?;
            }
        }

        // Hand at most one fragment to the record layer.
        let take = self
            .handshake
            .io
            .available()
            .min(self.record.max_write_payload_size());
        let record_version = version::to_wire(self.actual_protocol_version);
        let fragment = self.handshake.io.read(take)?;
        self.record.write_record(record_type, record_version, fragment)?;
        if record_type == ContentType::Handshake {
            if let Some(hashes) = self.handshake.hashes.as_mut() {
                hashes.update(fragment);
            }
        }

        // The whole message is framed and hashed once `handshake.io`
        // drains; advance before flushing so a blocked flush of the last
        // record cannot re-run the handler on resume. The queued bytes
        // still leave through the drive loop's flush.
        if self.handshake.io.is_empty() {
            self.handshake.io.wipe();
            self.advance_state()?;
        }

        self.record.flush(&mut self.stream)?;
        Ok(())
    }

    /// Receive and process one record's worth of handshake progress.
    ///
    /// Content types may interleave at the record layer: alerts and
    /// unknown types are absorbed without touching the state machine,
    /// ChangeCipherSpec and handshake messages advance it, application
    /// data is fatal (renegotiation is not supported).
    fn handshake_read_io(&mut self) -> Result<(), TlsError> {
        self.validate_recv_state()?;

        let (record_type, is_sslv2) = match self.record.read_full_record(&mut self.stream) {
            Ok(v) => v,
            Err(e) => {
                if matches!(e, TlsError::ConnectionClosed) {
                    self.closed = true;
                }
                return Err(e);
            }
        };

        if is_sslv2 {
            return self.sslv2_hello_io();
        }

        match ContentType::from_u8(record_type) {
            Some(ContentType::ApplicationData) => Err(TlsError::BadMessage(
                "application data received during the handshake".into(),
            )),
            Some(ContentType::ChangeCipherSpec) => self.change_cipher_spec_io(),
            Some(ContentType::Alert) => {
                self.process_alert_fragment()?;
                self.wipe_record_buffers();
                Ok(())
            }
            Some(ContentType::Handshake) => self.handshake_messages_io(),
            None => {
                debug!("ignoring record with unknown content type {record_type}");
                self.wipe_record_buffers();
                Ok(())
            }
        }
    }

    /// SSLv2-framed ClientHello, legal only as the very first message.
    fn sslv2_hello_io(&mut self) -> Result<(), TlsError> {
        if self.handshake.state != HandshakeState::ClientHello {
            return Err(TlsError::BadMessage(
                "SSLv2 record outside the initial ClientHello".into(),
            ));
        }

        let header = self.record.header_in.raw();
        self.client_protocol_version = version::from_wire(header[3], header[4]);
        if let Some(hashes) = self.handshake.hashes.as_mut() {
            // The v2 message type and version ride in the record header
            // but still belong to the transcript, then the whole body.
            hashes.update(&header[2..RECORD_HEADER_LENGTH]);
            hashes.update(self.record.in_buf.unread());
        }

        let body_len = self.record.in_buf.available();
        self.record.in_buf.copy_to(&mut self.handshake.io, body_len)?;
        let handled = self.sslv2_client_hello_recv();
        self.handshake.io.wipe();
        if let Err(e) = handled {
            self.sleep_delay();
            return Err(e);
        }

        self.wipe_record_buffers();
        self.advance_state()
    }

    /// A ChangeCipherSpec record: exactly one byte, handled by the
    /// current state's CCS handler.
    fn change_cipher_spec_io(&mut self) -> Result<(), TlsError> {
        if self.handshake.state.action().record_type != ContentType::ChangeCipherSpec {
            return Err(TlsError::BadMessage(format!(
                "ChangeCipherSpec record in state {:?}",
                self.handshake.state
            )));
        }
        if self.record.in_buf.available() != 1 {
            return Err(TlsError::BadMessage(
                "ChangeCipherSpec record must contain exactly one byte".into(),
            ));
        }

        self.record.in_buf.copy_to(&mut self.handshake.io, 1)?;
        let handled = self.dispatch();
        self.handshake.io.wipe();
        if let Err(e) = handled {
            self.sleep_delay();
            return Err(e);
        }

        self.wipe_record_buffers();
        self.advance_state()
    }

    /// Process every handshake message the current record holds. The
    /// record may carry a fragment, one message, or several concatenated
    /// messages; the state machine advances between them.
    fn handshake_messages_io(&mut self) -> Result<(), TlsError> {
        let peer = match self.mode {
            TlsRole::Client => Writer::Server,
            TlsRole::Server => Writer::Client,
        };
        while !self.record.in_buf.is_empty() {
            // A record may hold several messages, but only as long as the
            // peer still holds the pen.
            if self.handshake.state.writer() != peer {
                return Err(TlsError::BadMessage(
                    "handshake data beyond the peer's turn".into(),
                ));
            }
            let message_type = match self.read_full_handshake_message()? {
                Some(message_type) => message_type,
                None => {
                    // Partial message: the outer drive loop will read the
                    // next record into the same assembly buffer.
                    self.wipe_record_buffers();
                    return Ok(());
                }
            };

            let action = self.handshake.state.action();
            if action.record_type != ContentType::Handshake
                || message_type != action.message_type
            {
                return Err(TlsError::BadMessage(format!(
                    "unexpected handshake message type {message_type} in state {:?}",
                    self.handshake.state
                )));
            }

            let handled = self.dispatch();
            self.handshake.io.wipe();
            if let Err(e) = handled {
                self.sleep_delay();
                return Err(e);
            }

            self.advance_state()?;
        }

        self.wipe_record_buffers();
        Ok(())
    }

    /// Assemble one handshake message from the current record, resuming
    /// whatever `handshake.io` already holds from earlier records.
    ///
    /// Returns `Some(message_type)` once the message is complete (and
    /// transcript-hashed), `None` when more records are needed.
    fn read_full_handshake_message(&mut self) -> Result<Option<u8>, TlsError> {
        let buffered = self.handshake.io.available();
        if buffered < HANDSHAKE_HEADER_LENGTH {
            // The header itself may be fragmented: take what this record
            // has and come back for the rest.
            let missing = HANDSHAKE_HEADER_LENGTH - buffered;
            if self.record.in_buf.available() < missing {
                let n = self.record.in_buf.available();
                self.record.in_buf.copy_to(&mut self.handshake.io, n)?;
                return Ok(None);
            }
            self.record.in_buf.copy_to(&mut self.handshake.io, missing)?;
        }

        let (message_type, length) = codec::parse_header(&mut self.handshake.io)?;
        if length > MAXIMUM_HANDSHAKE_MESSAGE_LENGTH {
            return Err(TlsError::BadMessage(
                "handshake message exceeds maximum length".into(),
            ));
        }
        let length = length as usize;

        let body_buffered = self.handshake.io.available();
        let take = length
            .saturating_sub(body_buffered)
            .min(self.record.in_buf.available());
        self.record.in_buf.copy_to(&mut self.handshake.io, take)?;

        if self.handshake.io.available() == length {
            // Header and body both feed the transcript, in wire order.
            let full = &self.handshake.io.raw()[..HANDSHAKE_HEADER_LENGTH + length];
            if let Some(hashes) = self.handshake.hashes.as_mut() {
                hashes.update(full);
            }
            return Ok(Some(message_type));
        }

        // Rewind so the next record's pass re-parses the header.
        self.handshake.io.reread();
        Ok(None)
    }

    /// Alerts may arrive at any point, split across records. Fatal
    /// alerts and close_notify end the connection; other warnings are
    /// noted and dropped.
    fn process_alert_fragment(&mut self) -> Result<(), TlsError> {
        while !self.record.in_buf.is_empty() {
            let take = (2 - self.alert_in.written()).min(self.record.in_buf.available());
            self.record.in_buf.copy_to(&mut self.alert_in, take)?;
            if self.alert_in.written() < 2 {
                return Ok(());
            }

            let level = self.alert_in.raw()[0];
            let description = self.alert_in.raw()[1];
            self.alert_in.wipe();

            let level = AlertLevel::from_u8(level)
                .map_err(|v| TlsError::BadMessage(format!("invalid alert level {v}")))?;
            let alert = Alert { level, description };
            if alert.is_fatal_to_handshake() {
                self.closed = true;
                return Err(TlsError::AlertReceived(description));
            }
            debug!("ignoring warning alert {description}");
        }
        Ok(())
    }
}
