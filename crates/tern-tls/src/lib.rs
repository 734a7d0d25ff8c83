#![forbid(unsafe_code)]
#![doc = "TLS 1.0-1.2 handshake protocol implementation for Tern."]

pub mod alert;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod handshake;
pub mod record;

pub use connection::Connection;
pub use tern_types::TlsError;

/// The role of a TLS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

/// Why `negotiate` returned without failing.
///
/// `OnRead` and `OnWrite` are cooperative suspensions: the transport could
/// not make progress and the call should be repeated once it is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocked {
    NotBlocked,
    OnRead,
    OnWrite,
}

/// Digest algorithm used for handshake signatures, fixed by the
/// negotiated protocol version (RFC 5246 §4.7 vs. RFC 4346 §7.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureDigest {
    Md5Sha1,
    Sha1,
}

/// TLS cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x002F);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x0033);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0035);
    pub const TLS_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0x009C);
    pub const TLS_RSA_WITH_AES_256_GCM_SHA384: Self = Self(0x009D);
    pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0xC02F);
    pub const TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: Self = Self(0xC030);

    /// Wire encoding (two bytes, big-endian).
    pub fn to_wire(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Decode from the two-byte wire form.
    pub fn from_wire(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Whether the suite's key exchange is ephemeral, i.e. the server
    /// sends a ServerKeyExchange message.
    pub fn ephemeral_key_exchange(self) -> bool {
        matches!(self.0, 0x0033 | 0xC02F | 0xC030)
    }
}

/// Protocol versions, internally encoded as `major * 10 + minor`.
pub mod version {
    pub const SSLV2: u8 = 20;
    pub const SSLV3: u8 = 30;
    pub const TLS10: u8 = 31;
    pub const TLS11: u8 = 32;
    pub const TLS12: u8 = 33;

    /// Convert a wire `(major, minor)` pair to the internal encoding.
    pub fn from_wire(major: u8, minor: u8) -> u8 {
        major.saturating_mul(10).saturating_add(minor)
    }

    /// Split the internal encoding back into the wire `(major, minor)` pair.
    pub fn to_wire(v: u8) -> (u8, u8) {
        (v / 10, v % 10)
    }
}
