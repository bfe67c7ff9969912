//! End-to-end tests for pg-tls-proxy
//!
//! Each test generates a throwaway PKI with rcgen, starts the proxy on an
//! ephemeral port in front of a fake backend listener, and drives it with a
//! real tokio-rustls client.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

use pg_tls_proxy::protocol::{write_ssl_request, write_startup_message, StartupMessage};
use pg_tls_proxy::{
    CallbackHooks, ListenerStats, Proxy, ProxyConfig, SessionHooks, TlsMaterial, TlsSessionState,
};

const WAIT: Duration = Duration::from_secs(5);

struct Authority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl Authority {
    fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    fn issue(
        &self,
        common_name: &str,
        sans: Vec<String>,
        usage: ExtendedKeyUsagePurpose,
    ) -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(sans).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.extended_key_usages = vec![usage];
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert, key)
    }

    fn client_identity(&self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        let (cert, key) = self.issue("postgres", Vec::new(), ExtendedKeyUsagePurpose::ClientAuth);
        (
            vec![cert.der().clone()],
            PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
        )
    }
}

/// CA plus server certificate written to disk
struct Pki {
    _dir: TempDir,
    ca: Authority,
    material: TlsMaterial,
}

impl Pki {
    fn generate() -> Self {
        let dir = TempDir::new().unwrap();
        let ca = Authority::new("pg-tls-proxy test CA");
        let (server_cert, server_key) = ca.issue(
            "localhost",
            vec!["localhost".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        );

        let write = |name: &str, contents: String| {
            let path = dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        };
        let material = TlsMaterial::new(
            write("server.crt", server_cert.pem()),
            write("server.key", server_key.serialize_pem()),
            write("ca.crt", ca.cert.pem()),
        );

        Self {
            _dir: dir,
            ca,
            material,
        }
    }

    fn connector(&self, identity: &Authority) -> tokio_rustls::TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        roots.add(self.ca.cert.der().clone()).unwrap();
        let (chain, key) = identity.client_identity();

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .unwrap();
        tokio_rustls::TlsConnector::from(Arc::new(config))
    }
}

/// A running proxy in front of a fake backend
struct Harness {
    pki: Pki,
    proxy_addr: std::net::SocketAddr,
    backend: TcpListener,
    stats: Arc<ListenerStats>,
    errors: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|_| Ok(())).await
    }

    async fn start_with<F>(client_state: F) -> Self
    where
        F: Fn(&TlsSessionState) -> Result<(), pg_tls_proxy::HookError> + Send + Sync + 'static,
    {
        let (tx, errors) = mpsc::unbounded_channel();
        let hooks = CallbackHooks::builder()
            .on_client_state(client_state)
            .on_error(move |err| {
                let _ = tx.send(format!("{:?}", err));
            })
            .build();
        Self::start_hooks(hooks, errors).await
    }

    async fn start_hooks<H: SessionHooks>(
        hooks: H,
        errors: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self::start_configured(hooks, errors, |config| config).await
    }

    /// Start with the error-collecting hooks and an adjusted proxy config
    async fn start_with_config<F>(configure: F) -> Self
    where
        F: FnOnce(ProxyConfig) -> ProxyConfig,
    {
        let (tx, errors) = mpsc::unbounded_channel();
        let hooks = CallbackHooks::builder()
            .on_error(move |err| {
                let _ = tx.send(format!("{:?}", err));
            })
            .build();
        Self::start_configured(hooks, errors, configure).await
    }

    async fn start_configured<H, F>(
        hooks: H,
        errors: mpsc::UnboundedReceiver<String>,
        configure: F,
    ) -> Self
    where
        H: SessionHooks,
        F: FnOnce(ProxyConfig) -> ProxyConfig,
    {
        let pki = Pki::generate();
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();

        let config = configure(ProxyConfig::new("127.0.0.1:0", backend_addr.to_string()));
        let proxy = Proxy::from_material(config, &pki.material)
            .unwrap()
            .with_hooks(hooks);
        let listener = proxy.bind().await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();
        let stats = listener.stats();
        tokio::spawn(listener.run());

        Self {
            pki,
            proxy_addr,
            backend,
            stats,
            errors,
        }
    }

    /// Send SSLRequest, expect 'S', then complete the handshake
    async fn connect_tls(&self, identity: &Authority) -> std::io::Result<TlsStream<TcpStream>> {
        let mut tcp = TcpStream::connect(self.proxy_addr).await?;
        write_ssl_request(&mut tcp).await.unwrap();
        let mut marker = [0u8; 1];
        tcp.read_exact(&mut marker).await?;
        assert_eq!(marker[0], b'S');

        let name = ServerName::try_from("localhost").unwrap();
        self.pki.connector(identity).connect(name, tcp).await
    }

    /// Wait until `accepted` connections were seen and none is active
    async fn wait_idle(&self, accepted: u64) {
        timeout(WAIT, async {
            loop {
                let seen = self.stats.connections_accepted.load(Ordering::Relaxed);
                let active = self.stats.connections_active.load(Ordering::Relaxed);
                if seen >= accepted && active == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connections did not finish");
    }

    async fn next_error(&mut self) -> String {
        timeout(WAIT, self.errors.recv())
            .await
            .expect("no error reported")
            .expect("error channel closed")
    }

    fn assert_no_more_errors(&mut self) {
        assert!(
            self.errors.try_recv().is_err(),
            "unexpected extra error reported"
        );
    }

    async fn assert_backend_untouched(&self) {
        let accepted = timeout(Duration::from_millis(200), self.backend.accept()).await;
        assert!(accepted.is_err(), "backend should never be dialed");
    }
}

#[tokio::test]
async fn test_ssl_session_relays_and_reports_reads() {
    let seen = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let reads = Arc::clone(&seen);
    let client_states = Arc::new(Mutex::new(Vec::<TlsSessionState>::new()));
    let states = Arc::clone(&client_states);
    let (tx, errors) = mpsc::unbounded_channel();
    let hooks = CallbackHooks::builder()
        .on_read(move |bytes, _| {
            reads.lock().unwrap().push(bytes.to_vec());
            Ok(())
        })
        .on_client_state(move |state| {
            states.lock().unwrap().push(state.clone());
            Ok(())
        })
        .on_error(move |err| {
            let _ = tx.send(format!("{:?}", err));
        })
        .build();
    let mut harness = Harness::start_hooks(hooks, errors).await;

    let mut client = harness.connect_tls(&harness.pki.ca).await.unwrap();
    client.write_all(&[0x01, 0x02, 0x03]).await.unwrap();
    client.flush().await.unwrap();

    let (mut backend, _) = timeout(WAIT, harness.backend.accept()).await.unwrap().unwrap();
    let mut buf = [0u8; 3];
    backend.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x01, 0x02, 0x03]);

    backend.write_all(b"reply").await.unwrap();
    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"reply");

    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    backend.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    harness.wait_idle(1).await;
    harness.assert_no_more_errors();

    let reads = seen.lock().unwrap();
    assert!(reads.iter().any(|chunk| chunk == &[0x01, 0x02, 0x03]));
    assert!(reads.iter().all(|chunk| !chunk.is_empty()));

    let states = client_states.lock().unwrap();
    assert_eq!(states.len(), 1);
    assert!(states[0].protocol_version.is_some());
    assert!(states[0].cipher_suite.is_some());
    assert_eq!(states[0].peer_certificates.len(), 1);
}

#[tokio::test]
async fn test_plain_startup_rejected_with_n() {
    let mut harness = Harness::start().await;

    let mut tcp = TcpStream::connect(harness.proxy_addr).await.unwrap();
    write_startup_message(&mut tcp, &StartupMessage::new("postgres"))
        .await
        .unwrap();

    let mut reply = Vec::new();
    timeout(WAIT, tcp.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, b"N");

    assert_eq!(harness.next_error().await, "NotSslRequest");
    harness.wait_idle(1).await;
    harness.assert_no_more_errors();
    harness.assert_backend_untouched().await;
}

#[tokio::test]
async fn test_untrusted_client_certificate_rejected() {
    let mut harness = Harness::start().await;
    let rogue = Authority::new("rogue CA");

    if let Ok(mut client) = harness.connect_tls(&rogue).await {
        // TLS 1.3 clients finish before the server has checked their certificate
        let mut buf = [0u8; 1];
        let _ = timeout(WAIT, client.read(&mut buf)).await;
    }

    let err = harness.next_error().await;
    assert!(err.starts_with("Tls(Handshake("), "unexpected error: {}", err);
    harness.wait_idle(1).await;
    harness.assert_no_more_errors();
    harness.assert_backend_untouched().await;
}

#[tokio::test]
async fn test_backend_reset_reports_one_error() {
    let mut harness = Harness::start().await;

    let mut client = harness.connect_tls(&harness.pki.ca).await.unwrap();

    let (backend, _) = timeout(WAIT, harness.backend.accept()).await.unwrap().unwrap();
    socket2::SockRef::from(&backend)
        .set_linger(Some(Duration::ZERO))
        .unwrap();
    drop(backend);

    let err = harness.next_error().await;
    assert!(err.starts_with("Relay {"), "unexpected error: {}", err);

    let mut buf = [0u8; 16];
    let read = timeout(WAIT, client.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "client should be closed");

    harness.wait_idle(1).await;
    harness.assert_no_more_errors();
}

#[tokio::test]
async fn test_backend_dial_failure_closes_client() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap().to_string();
    drop(dead);

    let mut harness = Harness::start_with_config(|config| ProxyConfig {
        backend_address: dead_addr,
        ..config
    })
    .await;

    let mut client = harness.connect_tls(&harness.pki.ca).await.unwrap();
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, client.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0)), "client should see close_notify");

    let err = harness.next_error().await;
    assert!(err.starts_with("BackendConnect {"), "unexpected error: {}", err);
    assert!(err.contains("ConnectionRefused"), "unexpected error: {}", err);
    harness.wait_idle(1).await;
    harness.assert_no_more_errors();
}

#[tokio::test]
async fn test_silent_client_hits_handshake_timeout() {
    let mut harness = Harness::start_with_config(|config| {
        config.with_handshake_timeout(Some(Duration::from_millis(100)))
    })
    .await;

    // Connect but never send a startup message
    let mut tcp = TcpStream::connect(harness.proxy_addr).await.unwrap();

    let err = harness.next_error().await;
    assert!(err.starts_with("Timeout("), "unexpected error: {}", err);

    let mut rest = Vec::new();
    timeout(WAIT, tcp.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    harness.wait_idle(1).await;
    harness.assert_no_more_errors();
    harness.assert_backend_untouched().await;
}

#[tokio::test]
async fn test_client_state_rejection_skips_backend() {
    let mut harness =
        Harness::start_with(|_| Err(pg_tls_proxy::HookError::new("certificate revoked"))).await;

    if let Ok(mut client) = harness.connect_tls(&harness.pki.ca).await {
        let mut buf = [0u8; 1];
        let _ = timeout(WAIT, client.read(&mut buf)).await;
    }

    let err = harness.next_error().await;
    assert!(err.contains("certificate revoked"), "unexpected error: {}", err);
    harness.wait_idle(1).await;
    harness.assert_backend_untouched().await;
}

#[tokio::test]
async fn test_panicking_session_does_not_stop_listener() {
    let panicked = Arc::new(AtomicBool::new(false));
    let first = Arc::clone(&panicked);
    let mut harness = Harness::start_with(move |_| {
        if !first.swap(true, Ordering::SeqCst) {
            panic!("hook exploded");
        }
        Ok(())
    })
    .await;

    if let Ok(mut client) = harness.connect_tls(&harness.pki.ca).await {
        let mut buf = [0u8; 1];
        let _ = timeout(WAIT, client.read(&mut buf)).await;
    }
    assert_eq!(harness.next_error().await, "TaskPanic(\"hook exploded\")");
    harness.wait_idle(1).await;

    // The accept loop keeps serving
    let mut client = harness.connect_tls(&harness.pki.ca).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    client.flush().await.unwrap();
    let (mut backend, _) = timeout(WAIT, harness.backend.accept()).await.unwrap().unwrap();
    let mut buf = [0u8; 4];
    backend.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_bind_failure_is_fatal() {
    let pki = Pki::generate();
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let proxy = Proxy::from_material(ProxyConfig::new(addr, "127.0.0.1:1"), &pki.material).unwrap();
    let err = timeout(WAIT, proxy.serve()).await.unwrap().unwrap_err();
    assert!(matches!(err, pg_tls_proxy::ProxyError::Listen { .. }));
}

#[test]
fn test_material_paths_exist() {
    let pki = Pki::generate();
    for path in [
        &pki.material.cert_path,
        &pki.material.key_path,
        &pki.material.ca_path,
    ] {
        assert!(path.as_deref().is_some_and(Path::exists));
    }
}
