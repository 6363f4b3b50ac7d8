use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::connect_tcp;
use crate::error::ProbeError;
use crate::service::TlsCheck;
use crate::types::ProbeOutcome;

/// Certificates expiring within this many days are always critical.
const CRITICAL_DAYS: i64 = 7;

/// Verified and unverified TLS client configurations.
pub(crate) struct Connectors {
    verified: TlsConnector,
    insecure: TlsConnector,
}

impl Connectors {
    pub(crate) fn new() -> Result<Self, ProbeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let verified = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let insecure = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DisabledVerifier { provider }))
            .with_no_client_auth();

        Ok(Self {
            verified: TlsConnector::from(Arc::new(verified)),
            insecure: TlsConnector::from(Arc::new(insecure)),
        })
    }

    pub(crate) async fn handshake(
        &self,
        stream: TcpStream,
        server_name: &str,
        skip_verify: bool,
        limit: Duration,
    ) -> Result<TlsStream<TcpStream>, ProbeError> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ProbeError::Tls(format!("invalid server name {server_name}: {e}")))?;
        let connector = if skip_verify { &self.insecure } else { &self.verified };

        timeout(limit, connector.connect(name, stream))
            .await
            .map_err(|_| ProbeError::Tls("handshake timed out".to_string()))?
            .map_err(|e| ProbeError::Tls(e.to_string()))
    }
}

/// Accepts any server certificate. Used for `skip_tls_verify` targets.
#[derive(Debug)]
struct DisabledVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Verified handshake followed by a leaf certificate expiry check.
pub(super) async fn probe(
    connectors: &Connectors,
    check: &TlsCheck,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let stream = connect_tcp(&check.endpoint.address, limit)
        .await
        .map_err(|e| ProbeError::Tls(e.to_string()))?;
    let remaining = limit.saturating_sub(start.elapsed());
    let tls = connectors.handshake(stream, &check.server_name, false, remaining).await?;
    let response_time = start.elapsed();

    let (_, session) = tls.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ProbeError::protocol("no certificates found"))?;

    let (_, certificate) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| ProbeError::Tls(format!("unreadable certificate: {e}")))?;
    let not_after = certificate.validity().not_after.timestamp();
    let days = (not_after - chrono::Utc::now().timestamp()) / 86_400;

    Ok(classify_certificate(days, check.warn_days, response_time))
}

/// Classify a certificate by whole days remaining until expiry.
///
/// Expired or within a week is `down`; within `warn_days` is `degraded`. The
/// day count is carried as the outcome code.
pub fn classify_certificate(days: i64, warn_days: i64, response_time: Duration) -> ProbeOutcome {
    let warn_days = if warn_days <= 0 { 30 } else { warn_days };

    if days <= 0 {
        ProbeOutcome::down(response_time, days, "certificate expired")
    } else if days <= CRITICAL_DAYS {
        ProbeOutcome::down(response_time, days, format!("certificate expires in {days} days"))
    } else if days <= warn_days {
        ProbeOutcome::degraded(response_time, days, format!("certificate expires in {days} days"))
    } else {
        ProbeOutcome::operational(response_time, days)
    }
}
