use super::{parse, Reply};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// A throwaway CA plus a server and a client certificate signed by it.
/// The files live as long as this value.
pub struct TlsAssets {
    _dir: TempDir,
    pub ca: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

pub fn generate() -> TlsAssets {
    let dir = tempfile::tempdir().unwrap();

    let (ca_cert, ca_key) = build_ca();
    let (server_cert, server_key) = build_leaf(
        vec!["localhost".to_string(), "127.0.0.1".to_string()],
        "localhost",
        ExtendedKeyUsagePurpose::ServerAuth,
        &ca_cert,
        &ca_key,
    );
    let (client_cert, client_key) = build_leaf(
        Vec::new(),
        "switchyard-test-client",
        ExtendedKeyUsagePurpose::ClientAuth,
        &ca_cert,
        &ca_key,
    );

    let write = |name: &str, pem: String| {
        let path = dir.path().join(name);
        std::fs::write(&path, pem).unwrap();
        path
    };
    TlsAssets {
        ca: write("ca.pem", ca_cert.pem()),
        server_cert: write("server.pem", server_cert.pem()),
        server_key: write("server.key", server_key.serialize_pem()),
        client_cert: write("client.pem", client_cert.pem()),
        client_key: write("client.key", client_key.serialize_pem()),
        _dir: dir,
    }
}

fn build_ca() -> (Certificate, KeyPair) {
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "switchyard-test-ca");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    (cert, key_pair)
}

fn build_leaf(
    names: Vec<String>,
    common_name: &str,
    usage: ExtendedKeyUsagePurpose,
    ca_cert: &Certificate,
    ca_key: &KeyPair,
) -> (Certificate, KeyPair) {
    let mut params = CertificateParams::new(names).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::NoCa;
    params.extended_key_usages = vec![usage];
    let key_pair = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key_pair, ca_cert, ca_key).unwrap();
    (cert, key_pair)
}

fn connector(assets: &TlsAssets, present_client_cert: bool) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(&assets.ca) {
        roots.add(cert).unwrap();
    }
    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = if present_client_cert {
        let key = rustls_pemfile::private_key(&mut BufReader::new(
            File::open(&assets.client_key).unwrap(),
        ))
        .unwrap()
        .unwrap();
        builder
            .with_client_auth_cert(read_certs(&assets.client_cert), key)
            .unwrap()
    } else {
        builder.with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

fn read_certs(path: &Path) -> Vec<rustls::pki_types::CertificateDer<'static>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path).unwrap()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Sends `raw` over TLS. Any handshake or transport failure yields a reply
/// with status 0.
pub async fn send_tls(
    addr: SocketAddr,
    assets: &TlsAssets,
    present_client_cert: bool,
    raw: &str,
) -> Reply {
    let connector = connector(assets, present_client_cert);
    let name = ServerName::try_from("localhost".to_string()).unwrap();
    let mut buf = Vec::new();
    let stream = TcpStream::connect(addr).await.unwrap();
    if let Ok(mut tls) = connector.connect(name, stream).await {
        if tls.write_all(raw.as_bytes()).await.is_ok() {
            let _ = tls.read_to_end(&mut buf).await;
        }
    }
    parse(&String::from_utf8_lossy(&buf))
}
