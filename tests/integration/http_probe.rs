//! HTTP probe against a mock server

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rcgen::CertifiedKey;
use rustls::ServerConfig;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use site_sentinel::config::ProbeConfig;
use site_sentinel::probe::{HttpProbe, Probe};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn probe() -> HttpProbe {
    HttpProbe::new(&ProbeConfig {
        timeout_secs: 1,
        insecure_timeout_secs: 1,
        ..ProbeConfig::default()
    })
    .unwrap()
}

async fn serving(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

/// HTTPS server with a self-signed certificate that answers every request
/// with `status`. Returns its URL and the number of requests it answered.
async fn self_signed(status: u16) -> (String, Arc<AtomicUsize>) {
    let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    let CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("https://127.0.0.1:{}/", listener.local_addr().unwrap().port());
    let answered = Arc::new(AtomicUsize::new(0));

    let counter = answered.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                // a validating client hangs up during the handshake
                let Ok(mut tls) = acceptor.accept(stream).await else {
                    return;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = tls.write_all(response.as_bytes()).await;
                let _ = tls.shutdown().await;
            });
        }
    });

    (url, answered)
}

#[tokio::test]
async fn test_success_is_up() {
    let server = serving(200).await;
    assert!(probe().probe(&server.uri()).await);
}

#[tokio::test]
async fn test_client_and_server_errors_are_down() {
    for status in [404, 500, 503] {
        let server = serving(status).await;
        assert!(
            !probe().probe(&server.uri()).await,
            "status {status} counted as up"
        );
    }
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    // the final status decides, not the redirect
    assert!(!probe().probe(&format!("{}/old", server.uri())).await);
}

#[tokio::test]
async fn test_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    assert!(probe().probe(&server.uri()).await);
}

#[tokio::test]
async fn test_slow_response_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&server)
        .await;

    assert!(!probe().probe(&server.uri()).await);
}

#[tokio::test]
async fn test_self_signed_certificate_is_not_downtime() {
    let (url, answered) = self_signed(200).await;

    assert!(probe().probe(&url).await);
    // only the retry without validation got past the handshake
    assert_eq!(answered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_self_signed_server_error_is_down() {
    let (url, answered) = self_signed(500).await;

    assert!(!probe().probe(&url).await);
    assert_eq!(answered.load(Ordering::SeqCst), 1);
}
