//! TLS handshake protocol state machine (RFC 5246 §7.3, §7.4).

pub mod cert;
pub mod codec;
pub mod extensions;
pub mod finish;
pub mod hello;
pub mod kex;
pub mod transcript;

use crate::record::ContentType;

/// TLS handshake message types (RFC 5246 §7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
    CertificateStatus = 22,
}

pub const HANDSHAKE_HEADER_LENGTH: usize = 4;

/// Upper bound on the 24-bit length field of a single handshake message.
pub const MAXIMUM_HANDSHAKE_MESSAGE_LENGTH: u32 = 65_535;

/// Driver states, in protocol order. The discriminant doubles as the
/// index into [`STATE_MACHINE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    ClientHello,
    ServerHello,
    ServerCert,
    ServerCertStatus,
    ServerKey,
    ServerCertReq,
    ServerHelloDone,
    ClientCert,
    ClientKey,
    ClientCertVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    HandshakeOver,
}

/// The role that transmits in a given state. `Both` marks the terminal
/// state, where neither side has a handshake message left to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Client,
    Server,
    Both,
}

/// One row of the state table: which record and message type the state
/// carries, and who sends it. The per-role handlers are dispatched by an
/// exhaustive match on the connection, so the compiler checks totality.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeAction {
    pub record_type: ContentType,
    /// Expected handshake message type; unused for non-handshake records.
    pub message_type: u8,
    pub writer: Writer,
}

pub(crate) const STATE_MACHINE: [HandshakeAction; 15] = [
    // CLIENT_HELLO
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::ClientHello as u8,
        writer: Writer::Client,
    },
    // SERVER_HELLO
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::ServerHello as u8,
        writer: Writer::Server,
    },
    // SERVER_CERT
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::Certificate as u8,
        writer: Writer::Server,
    },
    // SERVER_CERT_STATUS
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::CertificateStatus as u8,
        writer: Writer::Server,
    },
    // SERVER_KEY
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::ServerKeyExchange as u8,
        writer: Writer::Server,
    },
    // SERVER_CERT_REQ
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::CertificateRequest as u8,
        writer: Writer::Server,
    },
    // SERVER_HELLO_DONE
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::ServerHelloDone as u8,
        writer: Writer::Server,
    },
    // CLIENT_CERT
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::Certificate as u8,
        writer: Writer::Client,
    },
    // CLIENT_KEY
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::ClientKeyExchange as u8,
        writer: Writer::Client,
    },
    // CLIENT_CERT_VERIFY
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::CertificateVerify as u8,
        writer: Writer::Client,
    },
    // CLIENT_CHANGE_CIPHER_SPEC
    HandshakeAction {
        record_type: ContentType::ChangeCipherSpec,
        message_type: 0,
        writer: Writer::Client,
    },
    // CLIENT_FINISHED
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::Finished as u8,
        writer: Writer::Client,
    },
    // SERVER_CHANGE_CIPHER_SPEC
    HandshakeAction {
        record_type: ContentType::ChangeCipherSpec,
        message_type: 0,
        writer: Writer::Server,
    },
    // SERVER_FINISHED
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: HandshakeType::Finished as u8,
        writer: Writer::Server,
    },
    // HANDSHAKE_OVER
    HandshakeAction {
        record_type: ContentType::ApplicationData,
        message_type: 0,
        writer: Writer::Both,
    },
];

impl HandshakeState {
    pub(crate) fn action(self) -> &'static HandshakeAction {
        &STATE_MACHINE[self as usize]
    }

    pub(crate) fn writer(self) -> Writer {
        self.action().writer
    }
}

/// Whether `next` is a legal successor of `from`. Handlers set the next
/// state explicitly; anything outside this relation is a programming
/// error, not a peer-triggered condition.
pub(crate) fn valid_transition(from: HandshakeState, next: HandshakeState) -> bool {
    use HandshakeState::*;
    matches!(
        (from, next),
        (ClientHello, ServerHello)
            | (ServerHello, ServerCert | ServerKey | ServerCertReq | ServerHelloDone)
            | (ServerCert, ServerKey | ServerCertReq | ServerHelloDone | ServerCertStatus)
            | (ServerCertStatus, ServerKey | ServerHelloDone)
            | (ServerKey, ServerCertReq | ServerHelloDone)
            | (ServerCertReq, ServerHelloDone)
            | (ServerHelloDone, ClientCert | ClientKey)
            | (ClientCert, ClientKey)
            | (ClientKey, ClientCertVerify | ClientChangeCipherSpec)
            | (ClientCertVerify, ClientChangeCipherSpec)
            | (ClientChangeCipherSpec, ClientFinished)
            | (ClientFinished, ServerChangeCipherSpec)
            | (ServerChangeCipherSpec, ServerFinished)
            | (ServerFinished, HandshakeOver)
            | (HandshakeOver, _)
    )
}
