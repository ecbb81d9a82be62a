// ── Trust anchors ──
//
// The controller presents a certificate chained to the vendor's private
// CA. Only the anchors configured here are trusted; the platform trust
// store never participates.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use rumqttc::TlsConfiguration;
use rustls_pki_types::CertificateDer;

use crate::error::Error;

/// A validated set of PEM-encoded CA certificates.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchors {
    pem: Vec<u8>,
    count: usize,
}

impl TrustAnchors {
    /// Parse and validate PEM bytes. At least one certificate is required.
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let pem = pem.into();
        let certs = parse_certificates(&pem)?;
        if certs.is_empty() {
            return Err(Error::Tls("no certificates found in trust anchor PEM".into()));
        }
        Ok(Self {
            pem,
            count: certs.len(),
        })
    }

    /// Read a PEM bundle from disk.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let pem = std::fs::read(path)
            .map_err(|e| Error::Tls(format!("reading {}: {e}", path.display())))?;
        Self::from_pem(pem)
    }

    /// Number of certificates in the bundle.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// TLS settings for the MQTT client, trusting only these anchors.
    pub(crate) fn tls_configuration(&self) -> TlsConfiguration {
        TlsConfiguration::Simple {
            ca: self.pem.clone(),
            alpn: None,
            client_auth: None,
        }
    }
}

impl fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchors")
            .field("certificates", &self.count)
            .finish_non_exhaustive()
    }
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    rustls_pemfile::certs(&mut Cursor::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("invalid trust anchor PEM: {e}")))
}
