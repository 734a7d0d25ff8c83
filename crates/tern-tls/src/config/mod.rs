//! Driver configuration with builder pattern.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tern_types::TlsError;

use crate::{version, CipherSuite};

/// Source of cryptographically strong random bytes.
///
/// Injected into the connection rather than reached for globally, so
/// tests can substitute a deterministic source.
pub trait SecureRandom: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), TlsError>;
}

/// Operating-system randomness, the default source.
#[derive(Debug, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), TlsError> {
        OsRng.fill_bytes(buf);
        Ok(())
    }
}

/// TLS driver configuration.
#[derive(Clone)]
pub struct TlsConfig {
    /// Highest protocol version offered or accepted.
    pub max_protocol_version: u8,
    /// Lowest protocol version accepted.
    pub min_protocol_version: u8,
    /// Enabled cipher suites, in preference order.
    pub cipher_suites: Vec<CipherSuite>,
    /// DER-encoded certificate chain, leaf first (server side).
    pub certificate_chain: Vec<Vec<u8>>,
    /// Stapled OCSP response to serve when the client asks (server side).
    pub ocsp_response: Option<Vec<u8>>,
    /// Request a stapled OCSP response (client side).
    pub ocsp_stapling: bool,
    /// Opaque key-exchange payload carried by ServerKeyExchange or
    /// ClientKeyExchange; produced and consumed by the cipher layer.
    pub key_exchange_data: Vec<u8>,
    /// Uniform delay applied before surfacing read-path handshake
    /// failures, damping error-oracle timing channels.
    pub error_blinding_delay: Duration,
    /// Randomness source.
    pub random: Arc<dyn SecureRandom>,
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder {
            config: TlsConfig {
                max_protocol_version: version::TLS12,
                min_protocol_version: version::SSLV3,
                cipher_suites: vec![
                    CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
                    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                    CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                ],
                certificate_chain: Vec::new(),
                ocsp_response: None,
                ocsp_stapling: false,
                key_exchange_data: Vec::new(),
                error_blinding_delay: Duration::from_millis(10),
                random: Arc::new(OsRandom),
            },
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`TlsConfig`].
pub struct TlsConfigBuilder {
    config: TlsConfig,
}

impl TlsConfigBuilder {
    pub fn max_protocol_version(mut self, v: u8) -> Self {
        self.config.max_protocol_version = v;
        self
    }

    pub fn min_protocol_version(mut self, v: u8) -> Self {
        self.config.min_protocol_version = v;
        self
    }

    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config.cipher_suites = suites.to_vec();
        self
    }

    pub fn certificate_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.config.certificate_chain = chain;
        self
    }

    pub fn ocsp_response(mut self, response: Vec<u8>) -> Self {
        self.config.ocsp_response = Some(response);
        self
    }

    pub fn ocsp_stapling(mut self, enabled: bool) -> Self {
        self.config.ocsp_stapling = enabled;
        self
    }

    pub fn key_exchange_data(mut self, data: Vec<u8>) -> Self {
        self.config.key_exchange_data = data;
        self
    }

    pub fn error_blinding_delay(mut self, delay: Duration) -> Self {
        self.config.error_blinding_delay = delay;
        self
    }

    pub fn random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.config.random = random;
        self
    }

    pub fn build(self) -> TlsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = TlsConfig::builder().build();
        assert_eq!(config.max_protocol_version, version::TLS12);
        assert_eq!(config.min_protocol_version, version::SSLV3);
        assert!(!config.cipher_suites.is_empty());
        assert!(config.certificate_chain.is_empty());
        assert!(config.ocsp_response.is_none());
        assert!(!config.ocsp_stapling);
        assert_eq!(config.error_blinding_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_builder_overrides() {
        let config = TlsConfig::builder()
            .max_protocol_version(version::TLS11)
            .min_protocol_version(version::TLS10)
            .cipher_suites(&[CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384])
            .certificate_chain(vec![vec![0x30]])
            .ocsp_response(vec![0x01])
            .ocsp_stapling(true)
            .key_exchange_data(vec![0x02])
            .error_blinding_delay(Duration::ZERO)
            .build();
        assert_eq!(config.max_protocol_version, version::TLS11);
        assert_eq!(config.min_protocol_version, version::TLS10);
        assert_eq!(
            config.cipher_suites,
            vec![CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384]
        );
        assert_eq!(config.certificate_chain, vec![vec![0x30]]);
        assert_eq!(config.ocsp_response, Some(vec![0x01]));
        assert!(config.ocsp_stapling);
        assert_eq!(config.key_exchange_data, vec![0x02]);
        assert!(config.error_blinding_delay.is_zero());
    }

    #[test]
    fn test_os_random_fills_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        OsRandom.fill(&mut a).unwrap();
        OsRandom.fill(&mut b).unwrap();
        // Two pulls from the OS source must differ.
        assert_ne!(a, b);
    }
}
