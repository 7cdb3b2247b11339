//! Shared fixtures for loopback tests: a throwaway PKI and TLS peers.

#![allow(dead_code)]

use pkcs8::der::pem::LineEnding;
use pkcs8::pkcs5::pbes2;
use pkcs8::PrivateKeyInfo;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection, StreamOwned};
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tls_conduit::{ConnectionConfig, TlsConfig};

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A certificate authority able to issue server and client leaves
pub struct TestCa {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    /// Server leaf valid for `localhost` and `127.0.0.1`
    pub fn issue_server(&self) -> Leaf {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "localhost");
        params.subject_alt_names = vec![
            SanType::DnsName("localhost".try_into().unwrap()),
            SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Leaf { cert, key }
    }

    /// Client leaf for mutual authentication
    pub fn issue_client(&self, name: &str) -> Leaf {
        self.issue_client_with_key(name, KeyPair::generate().unwrap())
    }

    /// Client leaf certifying an existing key
    pub fn issue_client_with_key(&self, name: &str, key: KeyPair) -> Leaf {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Leaf { cert, key }
    }
}

/// An issued certificate and its key
pub struct Leaf {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl Leaf {
    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::try_from(self.key.serialize_der()).unwrap()
    }

    /// Certificate and unencrypted key in one blob
    pub fn plain_pem(&self) -> String {
        format!("{}{}", self.cert.pem(), self.key.serialize_pem())
    }

    /// Certificate followed by `key_pem`, which must hold this leaf's key
    pub fn pem_with_key(&self, key_pem: &str) -> String {
        format!("{}{}", self.cert.pem(), key_pem)
    }

    /// Certificate and PKCS#8 key encrypted with `passphrase` in one blob
    pub fn encrypted_pem(&self, passphrase: &str) -> String {
        let der = self.key.serialize_der();
        let info = PrivateKeyInfo::try_from(der.as_slice()).unwrap();
        let salt: [u8; 16] = rand::random();
        let iv: [u8; 16] = rand::random();
        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &salt, &iv).unwrap();
        let encrypted = info.encrypt_with_params(params, passphrase).unwrap();
        let key_pem = encrypted
            .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
            .unwrap();
        format!("{}{}", self.cert.pem(), key_pem.as_str())
    }
}

/// Client configuration trusting `ca`
pub fn client_config(ca: &TestCa, passphrase: &str) -> ConnectionConfig {
    ConnectionConfig::builder()
        .passphrase(passphrase)
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(5))
        .write_timeout(Duration::from_secs(5))
        .tls(TlsConfig::builder().ca_cert_pem(ca.pem()).build().unwrap())
        .build()
}

/// Server configuration presenting `server` and requiring clients issued by `client_ca`
pub fn server_config(server: &Leaf, client_ca: &TestCa) -> Arc<ServerConfig> {
    server_config_with_versions(server, client_ca, rustls::DEFAULT_VERSIONS)
}

/// Same as [`server_config`], limited to TLS 1.2 so client certificate
/// rejection happens inside the client's handshake.
pub fn server_config_tls12(server: &Leaf, client_ca: &TestCa) -> Arc<ServerConfig> {
    server_config_with_versions(server, client_ca, &[&rustls::version::TLS12])
}

/// Same as [`server_config`], limited to TLS 1.3: the client finishes its
/// handshake before the server judges the client certificate.
pub fn server_config_tls13(server: &Leaf, client_ca: &TestCa) -> Arc<ServerConfig> {
    server_config_with_versions(server, client_ca, &[&rustls::version::TLS13])
}

fn server_config_with_versions(
    server: &Leaf,
    client_ca: &TestCa,
    versions: &[&'static rustls::SupportedProtocolVersion],
) -> Arc<ServerConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(client_ca.der()).unwrap();
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .unwrap();

    Arc::new(
        ServerConfig::builder_with_protocol_versions(versions)
            .with_client_cert_verifier(verifier)
            .with_single_cert(vec![server.der()], server.key_der())
            .unwrap(),
    )
}

/// TLS echo peer running on a background thread
pub struct EchoServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl EchoServer {
    pub fn start(config: Arc<ServerConfig>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
        let addr = listener.local_addr().expect("local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let accepted_clone = accepted.clone();
        let finished_clone = finished.clone();
        std::thread::spawn(move || {
            for tcp in listener.incoming() {
                let Ok(tcp) = tcp else { break };
                accepted_clone.fetch_add(1, Ordering::SeqCst);

                let config = config.clone();
                let finished = finished_clone.clone();
                std::thread::spawn(move || {
                    echo(config, tcp);
                    finished.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            accepted,
            finished,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("tls://127.0.0.1:{}", self.addr.port())
    }

    /// TCP connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait until `n` sessions have ended, returning whether that happened in time
    pub fn wait_finished(&self, n: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.finished.load(Ordering::SeqCst) >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

fn echo(config: Arc<ServerConfig>, tcp: TcpStream) {
    let Ok(conn) = ServerConnection::new(config) else {
        return;
    };
    let mut tls = StreamOwned::new(conn, tcp);
    let mut buf = [0u8; 4096];
    loop {
        match tls.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tls.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
        }
    }
}

/// Peer that completes the handshake, sends `close_notify` and hangs up
pub fn start_closing_server(config: Arc<ServerConfig>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
    let addr = listener.local_addr().expect("local addr");

    std::thread::spawn(move || {
        let Ok((mut tcp, _)) = listener.accept() else {
            return;
        };
        let Ok(mut conn) = ServerConnection::new(config) else {
            return;
        };
        while conn.is_handshaking() {
            if conn.complete_io(&mut tcp).is_err() {
                return;
            }
        }
        conn.send_close_notify();
        let _ = conn.complete_io(&mut tcp);
    });

    addr
}

/// Peer that answers like a plaintext HTTP server
pub fn start_plaintext_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
    let addr = listener.local_addr().expect("local addr");

    std::thread::spawn(move || {
        if let Ok((mut tcp, _)) = listener.accept() {
            let _ = tcp.write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
            let _ = tcp.flush();
        }
    });

    addr
}

/// RSA key shared by the OpenSSL-encrypted fixtures, unencrypted (PKCS#8)
pub const RSA_KEY_PKCS8: &str = include_str!("../fixtures/client_rsa.pkcs8.pem");

/// The same RSA key as `openssl rsa -aes128 -traditional`, passphrase `secret`
pub const RSA_KEY_AES128: &str = include_str!("../fixtures/client_rsa.aes128.pem");

/// The same RSA key as `openssl rsa -des3 -traditional`, passphrase `secret`
pub const RSA_KEY_DES3: &str = include_str!("../fixtures/client_rsa.des3.pem");

/// Passphrase of the OpenSSL-encrypted fixtures
pub const RSA_KEY_PASSPHRASE: &str = "secret";

/// A port on 127.0.0.1 with nothing listening
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
