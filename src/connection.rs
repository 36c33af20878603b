//! Shared IMAP connection and TLS helpers
//!
//! Provides one concrete, encryption-mode-independent session type so
//! the rest of the engine never needs to be generic over the
//! transport. `ssl`/`tls` wrap the TCP stream in TLS before any IMAP
//! traffic; `starttls` upgrades mid-connection; `none` leaves the
//! stream bare (and the caller is expected to have warned the
//! operator that credentials travel in cleartext).

use crate::config::{Encryption, EndpointConfig};
use crate::error::{Error, Result};
use async_imap::Session;
use futures::io::{AsyncRead, AsyncWrite};
use rustls::pki_types::ServerName;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// Either a bare TCP stream or a TLS-wrapped one, behind a single
/// type so `async_imap::Session` doesn't need to be generic
/// everywhere it's threaded through.
pub enum Stream {
    Plain(Compat<TcpStream>),
    Tls(Compat<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_close(cx),
            Stream::Tls(s) => Pin::new(s).poll_close(cx),
        }
    }
}

/// A session over whichever `Stream` variant the endpoint's
/// encryption mode required.
pub type ImapSession = Session<Stream>;

/// Build a TLS connector that accepts any certificate, for
/// `--ssl-no-verify` / self-signed test servers.
fn dangerous_tls_connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Build a TLS connector backed by the platform's trust store,
/// falling back to the bundled Mozilla root set when no native certs
/// are available (containers, minimal base images).
fn verifying_tls_connector() -> Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        warn!("error loading a native certificate: {err}");
    }
    for cert in native.certs {
        let _ = roots.add(cert);
    }
    if roots.is_empty() {
        debug!("no native root certificates found, falling back to webpki-roots");
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Connect to `config`'s host/port under its configured encryption
/// mode, authenticate, and return the live session plus whether the
/// transport ended up encrypted (for the reporter's display).
pub async fn connect(config: &EndpointConfig) -> Result<(ImapSession, bool)> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!("connecting to {} ({})", addr, config.encryption);

    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;

    let (stream, encrypted) = match config.encryption {
        Encryption::Ssl | Encryption::Tls => {
            let tls_stream = tls_handshake(config, tcp_stream).await?;
            (Stream::Tls(tls_stream.compat()), true)
        }
        Encryption::StartTls => {
            let mut client = async_imap::Client::new(tcp_stream.compat());
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
            let inner = client.into_inner().into_inner();
            let tls_stream = tls_handshake(config, inner).await?;
            (Stream::Tls(tls_stream.compat()), true)
        }
        Encryption::None => {
            warn!("connecting to {addr} without encryption; credentials travel in cleartext");
            (Stream::Plain(tcp_stream.compat()), false)
        }
    };

    let client = async_imap::Client::new(stream);
    let session = client
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| Error::Login(e.to_string()))?;

    info!("logged in to {addr} as {}", config.username);
    Ok((session, encrypted))
}

async fn tls_handshake(config: &EndpointConfig, tcp_stream: TcpStream) -> Result<TlsStream<TcpStream>> {
    let connector = if config.tls_verify {
        verifying_tls_connector()?
    } else {
        dangerous_tls_connector()
    };
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("invalid server name {:?}: {e}", config.host)))?;
    connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// SELECT a folder on an existing session.
pub async fn select(session: &mut ImapSession, folder: &str) -> Result<()> {
    session
        .select(folder)
        .await
        .map_err(|e| Error::Imap(format!("failed to select {folder:?}: {e}")))?;
    Ok(())
}

/// EXAMINE (read-only SELECT) a folder, used by the idle keeper so it
/// never risks mutating the folder it idles on.
pub async fn examine(session: &mut ImapSession, folder: &str) -> Result<()> {
    session
        .examine(folder)
        .await
        .map_err(|e| Error::Imap(format!("failed to examine {folder:?}: {e}")))?;
    Ok(())
}

/// Certificate verifier that accepts any certificate. Used only when
/// the operator explicitly passes `--ssl-no-verify`.
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
