//! TLS material loading (`spec.md` §6): a PEM certificate chain and
//! private key from `<workingDir>/certs/x509-server.{pem,-key.pem}`,
//! wrapped into a `tokio_rustls::TlsAcceptor`.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::{self, Certificate, PrivateKey};
use tokio_rustls::TlsAcceptor;
use zway_proto::{Error, Result};

pub fn load_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::TlsHandshakeFailed(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &str) -> Result<Vec<Certificate>> {
    let file = File::open(path).map_err(Error::TransportIo)?;
    let mut reader = BufReader::new(file);
    let raw = rustls_pemfile::certs(&mut reader).map_err(Error::TransportIo)?;
    Ok(raw.into_iter().map(Certificate).collect())
}

fn load_key(path: &str) -> Result<PrivateKey> {
    let file = File::open(path).map_err(Error::TransportIo)?;
    let mut reader = BufReader::new(file);
    let raw = rustls_pemfile::pkcs8_private_keys(&mut reader).map_err(Error::TransportIo)?;
    let key = raw
        .into_iter()
        .next()
        .ok_or_else(|| Error::TlsHandshakeFailed(format!("no private key found in {}", path)))?;
    Ok(PrivateKey(key))
}
