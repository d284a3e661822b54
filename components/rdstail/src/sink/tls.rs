//! Establishing the encrypted stream used by the Papertrail sink.

// Local crates
use crate::sink::sink::SinkError;

// External crates
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore, crypto::ring, pki_types::ServerName},
};
use tracing::instrument;

/// Split `host:port`, returning the host used for certificate verification.
pub fn server_name(addr: &str) -> Result<ServerName<'static>, SinkError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| SinkError::InvalidAddress(addr.to_string()))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(SinkError::InvalidAddress(addr.to_string()));
    }

    ServerName::try_from(host.to_string()).map_err(|_| SinkError::InvalidAddress(addr.to_string()))
}

/// Trusted roots: the bundled Mozilla set, or only the certificates in `ca_file`.
pub fn root_store(ca_file: Option<&Path>) -> Result<RootCertStore, SinkError> {
    let mut roots = RootCertStore::empty();

    let Some(path) = ca_file else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(roots);
    };

    let certificate_error = |reason: String| SinkError::Certificate {
        path: path.to_path_buf(),
        reason,
    };

    let pem = std::fs::read(path).map_err(|e| certificate_error(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| certificate_error(e.to_string()))?;

    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(certificate_error(format!(
            "no usable certificates found ({ignored} rejected)"
        )));
    }

    tracing::debug!(added, ignored, ca_file = %path.display(), "Loaded custom root certificates");
    Ok(roots)
}

/// Open a TCP connection to `addr` and complete the TLS handshake.
#[instrument(
    name = "rdstail_sink::tls::connect",
    target = "sink::tls",
    level = "debug",
    skip(ca_file)
)]
pub async fn connect(
    addr: &str,
    ca_file: Option<&Path>,
) -> Result<TlsStream<TcpStream>, SinkError> {
    let domain = server_name(addr)?;
    let roots = root_store(ca_file)?;

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| SinkError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|source| SinkError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    let stream = TlsConnector::from(Arc::new(config))
        .connect(domain, tcp)
        .await
        .map_err(|source| SinkError::Handshake {
            addr: addr.to_string(),
            source,
        })?;

    tracing::info!(addr, "Established TLS connection");
    Ok(stream)
}
