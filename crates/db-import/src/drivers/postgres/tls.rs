//! TLS for PostgreSQL connections, shared by the source dialect and the sink.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::crypto::ring;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::task::JoinHandle;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::warn;

use super::dialect::server_message;
use crate::config::SslMode;
use crate::error::{MigrateError, Result};

/// Connect with `config`, using TLS unless `ssl_mode` is `Disable`.
///
/// The connection future runs on its own task. `target` describes the
/// server in error and log messages.
pub(crate) async fn connect(
    config: &tokio_postgres::Config,
    ssl_mode: SslMode,
    target: &str,
) -> Result<(Client, JoinHandle<()>)> {
    let connected = match client_config(ssl_mode)? {
        Some(tls) => spawn(config, MakeRustlsConnect::new(tls), target).await,
        None => spawn(config, NoTls, target).await,
    };
    connected.map_err(|e| {
        MigrateError::connection_with(
            format!("could not connect to PostgreSQL {}", target),
            server_message(&e),
        )
    })
}

async fn spawn<T>(
    config: &tokio_postgres::Config,
    tls: T,
    target: &str,
) -> std::result::Result<(Client, JoinHandle<()>), tokio_postgres::Error>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = config.connect(tls).await?;
    let target = target.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection to {} failed: {}", target, e);
        }
    });
    Ok((client, handle))
}

/// rustls configuration for `ssl_mode`, `None` when TLS is disabled.
pub(crate) fn client_config(ssl_mode: SslMode) -> Result<Option<ClientConfig>> {
    if ssl_mode == SslMode::Disable {
        return Ok(None);
    }
    let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| MigrateError::Config(format!("invalid TLS configuration: {}", e)))?;

    let config = match ssl_mode {
        SslMode::Require => {
            warn!(
                "ssl_mode=require encrypts the connection but does not verify the server \
                 certificate; use verify-full where man-in-the-middle attacks matter"
            );
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth()
        }
        // rustls always checks the host name, so verify-ca behaves like verify-full.
        _ => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };
    Ok(Some(config))
}

/// Verifier for `ssl_mode=require`: encryption without authentication.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
