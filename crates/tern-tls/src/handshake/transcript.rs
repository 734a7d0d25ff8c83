//! Rolling transcript hashes over handshake messages.
//!
//! Every handshake message byte, 4-byte header included and in wire
//! order, feeds six incremental digests: client and server copies of
//! MD5, SHA-1 and SHA-256. The Finished computation later draws on whichever pair
//! the negotiated version calls for.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub struct HandshakeHashes {
    client_md5: Md5,
    client_sha1: Sha1,
    client_sha256: Sha256,
    server_md5: Md5,
    server_sha1: Sha1,
    server_sha256: Sha256,
}

impl HandshakeHashes {
    pub fn new() -> Self {
        Self {
            client_md5: Md5::new(),
            client_sha1: Sha1::new(),
            client_sha256: Sha256::new(),
            server_md5: Md5::new(),
            server_sha1: Sha1::new(),
            server_sha256: Sha256::new(),
        }
    }

    /// Feed `data` to all six digests.
    pub fn update(&mut self, data: &[u8]) {
        self.client_md5.update(data);
        self.client_sha1.update(data);
        self.client_sha256.update(data);
        self.server_md5.update(data);
        self.server_sha1.update(data);
        self.server_sha256.update(data);
    }

    /// Current client-transcript MD5 without disturbing the rolling state.
    pub fn client_md5(&self) -> [u8; 16] {
        self.client_md5.clone().finalize().into()
    }

    pub fn client_sha1(&self) -> [u8; 20] {
        self.client_sha1.clone().finalize().into()
    }

    pub fn client_sha256(&self) -> [u8; 32] {
        self.client_sha256.clone().finalize().into()
    }

    pub fn server_md5(&self) -> [u8; 16] {
        self.server_md5.clone().finalize().into()
    }

    pub fn server_sha1(&self) -> [u8; 20] {
        self.server_sha1.clone().finalize().into()
    }

    pub fn server_sha256(&self) -> [u8; 32] {
        self.server_sha256.clone().finalize().into()
    }
}

impl Default for HandshakeHashes {
    fn default() -> Self {
        Self::new()
    }
}
