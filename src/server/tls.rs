use crate::config::Config;
use crate::error::LifecycleError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Builds the acceptor for the HTTPS listener.
///
/// Client certificates are required and checked against `client_ca_file`
/// unless `insecure_skip_verify` is set.
pub(crate) fn acceptor(config: &Config) -> Result<TlsAcceptor, LifecycleError> {
    let cert_file = configured(&config.cert_file).ok_or(LifecycleError::MissingCertificate)?;
    let key_file = configured(&config.key_file).ok_or(LifecycleError::MissingKey)?;

    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let builder = ServerConfig::builder();
    let server_config = match configured(&config.client_ca_file) {
        Some(ca_file) if !config.insecure_skip_verify => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_file)? {
                roots.add(cert)?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|err| tls_error(ca_file, err))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)?
        }
        _ => builder.with_no_client_auth().with_single_cert(certs, key)?,
    };
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn configured(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|path| !path.as_os_str().is_empty())
}

fn tls_error(path: &Path, reason: impl ToString) -> LifecycleError {
    LifecycleError::Tls {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, LifecycleError> {
    let file = File::open(path).map_err(|err| tls_error(path, err))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| tls_error(path, err))?;
    if certs.is_empty() {
        return Err(tls_error(path, "no certificates found"));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, LifecycleError> {
    let file = File::open(path).map_err(|err| tls_error(path, err))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| tls_error(path, err))?
        .ok_or_else(|| tls_error(path, "no private key found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_is_checked_before_key() {
        let config = Config::default();
        assert!(matches!(acceptor(&config), Err(LifecycleError::MissingCertificate)));

        let config = Config {
            cert_file: Some("server.pem".into()),
            ..Config::default()
        };
        assert!(matches!(acceptor(&config), Err(LifecycleError::MissingKey)));
    }

    #[test]
    fn empty_paths_count_as_missing() {
        let config = Config::default().tls("", "");
        assert!(matches!(acceptor(&config), Err(LifecycleError::MissingCertificate)));
    }

    #[test]
    fn unreadable_material_names_the_file() {
        let config = Config::default().tls("/nonexistent/cert.pem", "/nonexistent/key.pem");
        match acceptor(&config) {
            Err(LifecycleError::Tls { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/cert.pem"))
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
