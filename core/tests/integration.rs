//! POSTs against the live mock gateway through the real ureq backend.
//!
//! # Design
//! Starts the mock server on a random port in its own runtime thread, then
//! drives `HttpService<UreqBackend, HttpsSettings>` over real HTTP. Each test
//! builds its own `Bootstrap`, so tests never share init state.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use paypost_core::{codes, Bootstrap, HttpService, HttpsSettings, RustlsCrypto, UreqBackend};

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

/// A one-route TLS server on a blocking thread: answers every request with
/// `{"ok":true}` and closes. Returns its address and the certificate PEM.
fn start_tls_server() -> (SocketAddr, String) {
    let cert = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .unwrap();
    let pem = cert.cert.pem();
    let chain = vec![cert.cert.der().clone()];
    let key = rustls::pki_types::PrivateKeyDer::try_from(cert.key_pair.serialize_der()).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .unwrap();
    let config = Arc::new(config);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for tcp in listener.incoming() {
            let Ok(tcp) = tcp else { continue };
            let conn = rustls::ServerConnection::new(Arc::clone(&config)).unwrap();
            let mut tls = rustls::StreamOwned::new(conn, tcp);
            // A client that rejects the certificate fails the handshake here.
            if read_request(&mut tls).is_err() {
                continue;
            }
            let body = br#"{"ok":true}"#;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = tls.write_all(head.as_bytes());
            let _ = tls.write_all(body);
            tls.conn.send_close_notify();
            let _ = tls.flush();
        }
    });

    (addr, pem)
}

/// Read one HTTP/1.1 request (head plus `Content-Length` body).
fn read_request(stream: &mut impl Read) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut byte = [0u8; 1];
    while !data.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte)? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        data.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&data).to_ascii_lowercase();
    let len = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(body)
}

fn initialized_backend() -> UreqBackend {
    let bootstrap = Arc::new(Bootstrap::new(RustlsCrypto::new()));
    bootstrap.init().unwrap();
    UreqBackend::new(bootstrap)
}

fn service(settings: HttpsSettings) -> HttpService<UreqBackend, HttpsSettings> {
    HttpService::new(initialized_backend(), settings)
}

#[test]
fn pay_round_trip_sends_json_content_type() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let mut out = Vec::new();
    let ok = svc.post_into(
        &format!("http://{addr}/pay"),
        br#"{"out_trade_no":"T1001","amount":100}"#,
        &mut out,
        true,
    );
    assert!(ok, "{}: {}", svc.errcode(), svc.errmsg());
    assert_eq!(svc.errcode(), 0);
    assert_eq!(svc.errmsg(), "success");

    // The gateway only accepts application/json, so a parsed reply proves the header.
    let reply: mock_server::PayReply = serde_json::from_slice(&out).unwrap();
    assert_eq!(reply.status, "SUCCESS");
    assert_eq!(reply.request["out_trade_no"], "T1001");

    let info = svc.last_info().unwrap();
    assert_eq!(info.status, 200);
    assert_eq!(info.effective_url, format!("http://{addr}/pay"));
    assert_eq!(info.content_type.as_deref(), Some("application/json"));
}

#[test]
fn echoed_body_matches_request_bytes() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let request = br#"{"sign":"a+b/c==","items":[1,2,3]}"#;
    let body = svc.post(&format!("http://{addr}/echo"), request, false).unwrap();
    assert_eq!(body, request);
}

#[test]
fn large_body_arrives_intact_across_chunks() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let body = svc.post(&format!("http://{addr}/large/200"), b"{}", true).unwrap();
    assert_eq!(body.len(), 200 * 1024);
    assert_eq!(body, mock_server::large_body(200));
}

#[test]
fn server_error_status_is_still_a_successful_post() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let body = svc.post(&format!("http://{addr}/status/500"), b"{}", true).unwrap();
    let reply: mock_server::ErrorReply = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply.error, "Internal Server Error");
    assert_eq!(svc.errcode(), 0);
    assert_eq!(svc.last_info().unwrap().status, 500);
}

#[test]
fn reused_service_returns_each_response_separately() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let first = svc.post(&format!("http://{addr}/echo"), b"{\"n\":1}", true).unwrap();
    let second = svc.post(&format!("http://{addr}/echo"), b"{\"n\":2}", true).unwrap();
    assert_eq!(first, b"{\"n\":1}");
    assert_eq!(second, b"{\"n\":2}");
}

#[test]
fn slow_gateway_hits_the_configured_timeout() {
    let addr = start_server();
    let mut svc = service(HttpsSettings {
        post_timeout: 1,
        ..Default::default()
    });

    let mut out = b"previous".to_vec();
    let ok = svc.post_into(&format!("http://{addr}/slow/3000"), b"{}", &mut out, true);
    assert!(!ok);
    assert_eq!(svc.errcode(), codes::OPERATION_TIMEDOUT, "{}", svc.errmsg());
    assert_eq!(out, b"previous");
}

#[test]
fn refused_connection_is_reported_and_output_untouched() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let mut svc = service(HttpsSettings::default());

    let mut out = b"previous".to_vec();
    let ok = svc.post_into(&format!("http://{addr}/pay"), b"{}", &mut out, true);
    assert!(!ok);
    assert_ne!(svc.errcode(), 0);
    assert_ne!(svc.errmsg(), "success");
    assert!(!svc.errmsg().is_empty());
    assert_eq!(out, b"previous");
}

#[test]
fn verified_https_with_missing_ca_bundle_fails_with_cacert_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service(HttpsSettings {
        root_ca: dir.path().join("roots.pem").display().to_string(),
        ..Default::default()
    });

    let err = svc.post("https://127.0.0.1:9/pay", b"{}", true).unwrap_err();
    assert_eq!(err.code(), codes::SSL_CACERT_BADFILE);
    assert_eq!(svc.errcode(), codes::SSL_CACERT_BADFILE);
    assert_eq!(svc.errmsg(), err.message());
}

#[test]
fn post_without_bootstrap_fails_to_open_a_handle() {
    let backend = UreqBackend::new(Arc::new(Bootstrap::new(RustlsCrypto::new())));
    let mut svc = HttpService::new(backend, HttpsSettings::default());

    let mut out = Vec::new();
    assert!(!svc.post_into("http://127.0.0.1:9/pay", b"{}", &mut out, true));
    assert_eq!(svc.errcode(), codes::HANDLE_INIT);
    assert!(out.is_empty());
}

#[test]
fn settings_file_drives_the_client() {
    let addr = start_server();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paypost.json");
    std::fs::write(&path, r#"{"connect_timeout": 2, "post_timeout": 5}"#).unwrap();

    let settings = HttpsSettings::from_file(&path).unwrap();
    let mut svc = service(settings);
    let body = svc.post(&format!("http://{addr}/echo"), b"[]", true).unwrap();
    assert_eq!(body, b"[]");
}

#[test]
fn redirect_reply_is_returned_instead_of_followed() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let url = format!("http://{addr}/redirect");
    let body = svc.post(&url, b"{\"amount\":1}", true).unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply["moved"], true);

    let info = svc.last_info().unwrap();
    assert_eq!(info.status, 302);
    assert_eq!(info.effective_url, url);
    assert_eq!(svc.errcode(), 0);
}

#[test]
fn body_is_requested_without_content_encoding() {
    let addr = start_server();
    let mut svc = service(HttpsSettings::default());

    let body = svc.post(&format!("http://{addr}/headers"), b"{}", true).unwrap();
    let seen: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(seen["content-type"], "application/json");
    assert!(seen.get("accept-encoding").is_none(), "{seen}");
}

#[test]
fn verified_https_trusts_configured_root() {
    let (addr, pem) = start_tls_server();
    let dir = tempfile::tempdir().unwrap();
    let root_ca = dir.path().join("roots.pem");
    std::fs::write(&root_ca, pem).unwrap();

    let mut svc = service(HttpsSettings {
        root_ca: root_ca.display().to_string(),
        ..Default::default()
    });
    let body = svc
        .post(&format!("https://127.0.0.1:{}/pay", addr.port()), b"{}", true)
        .unwrap_or_else(|e| panic!("{}: {}", e.code(), e.message()));
    assert_eq!(body, br#"{"ok":true}"#);
    assert_eq!(svc.errcode(), 0);
    assert_eq!(svc.errmsg(), "success");
    assert_eq!(svc.last_info().unwrap().status, 200);
}

#[test]
fn verified_https_rejects_unrelated_root() {
    let (addr, _) = start_tls_server();
    let unrelated = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let root_ca = dir.path().join("roots.pem");
    std::fs::write(&root_ca, unrelated.cert.pem()).unwrap();

    let mut svc = service(HttpsSettings {
        root_ca: root_ca.display().to_string(),
        ..Default::default()
    });
    let mut out = b"previous".to_vec();
    let ok = svc.post_into(
        &format!("https://127.0.0.1:{}/pay", addr.port()),
        b"{}",
        &mut out,
        true,
    );
    assert!(!ok);
    assert_eq!(svc.errcode(), codes::PEER_FAILED_VERIFICATION, "{}", svc.errmsg());
    assert_eq!(out, b"previous");
}
