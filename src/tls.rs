use std::sync::Arc;

use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{aws_lc_rs, verify_tls12_signature, verify_tls13_signature};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::session::{connect_socket, ConnectionOptions, Session};
use crate::{ClickhouseError, Result};

/// How the server certificate chain is judged at TLS setup. TLS 1.2/1.3
/// only; certificate and key loading is the caller's concern.
pub enum TlsValidation {
    /// Chains must root in the platform trust store.
    SystemDefault,
    /// Chains must root in exactly this CA certificate.
    PinnedCa(CertificateDer<'static>),
    /// Accept any certificate. Testing only.
    Insecure,
}

pub struct TlsOptions {
    pub validation: TlsValidation,
    /// Client certificate chain and key for mTLS.
    pub client_identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        TlsOptions {
            validation: TlsValidation::SystemDefault,
            client_identity: None,
        }
    }
}

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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &aws_lc_rs::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &aws_lc_rs::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn tls_error(e: rustls::Error) -> ClickhouseError {
    ClickhouseError::ProtocolError(format!("tls: {e}"))
}

fn build_config(tls: TlsOptions) -> Result<ClientConfig> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?;
    let builder = match tls.validation {
        TlsValidation::SystemDefault => {
            let mut roots = RootCertStore::empty();
            let certs = rustls_native_certs::load_native_certs();
            for cert in certs.certs {
                // tolerate scattered unparseable platform certs
                let _ = roots.add(cert);
            }
            builder.with_root_certificates(roots)
        }
        TlsValidation::PinnedCa(ca) => {
            let mut roots = RootCertStore::empty();
            roots.add(ca).map_err(tls_error)?;
            builder.with_root_certificates(roots)
        }
        TlsValidation::Insecure => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate)),
    };
    match tls.client_identity {
        Some((chain, key)) => builder.with_client_auth_cert(chain, key).map_err(tls_error),
        None => Ok(builder.with_no_client_auth()),
    }
}

pub type TlsSession = Session<
    tokio::io::ReadHalf<tokio_rustls::client::TlsStream<tokio::net::TcpStream>>,
    tokio::io::WriteHalf<tokio_rustls::client::TlsStream<tokio::net::TcpStream>>,
>;

/// Connect over TLS and perform the protocol handshake.
pub async fn connect_tls(
    destination: impl tokio::net::ToSocketAddrs,
    server_name: ServerName<'static>,
    tls: TlsOptions,
    options: ConnectionOptions,
) -> Result<TlsSession> {
    let stream = connect_socket(&destination, &options).await?;
    let connector = TlsConnector::from(Arc::new(build_config(tls)?));
    let tls_stream = connector.connect(server_name, stream).await?;
    let (read, write) = tokio::io::split(tls_stream);
    Session::connect_stream(read, write, options).await
}
