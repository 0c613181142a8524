//! Production transfer backend on `ureq` with rustls.
//!
//! # Design
//! Options are collected on the handle and only turned into a `ureq::Agent`
//! when `perform` runs, which is where libraries of this shape validate their
//! option set too. A fresh agent per transfer means no connection reuse
//! across calls. The crypto provider comes from an initialized
//! `Bootstrap<RustlsCrypto>`; without one no handle can be opened.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::CryptoProvider;
use tracing::debug;
use ureq::tls::{PemItem, RootCerts, TlsConfig};
use ureq::ResponseExt;

use crate::bootstrap::{Bootstrap, RustlsCrypto};
use crate::error::{codes, TransferError};
use crate::transfer::{Transfer, TransferBackend, TransferInfo, TransferOption};

const CHUNK_SIZE: usize = 16 * 1024;

/// Opens `UreqTransfer` handles bound to a bootstrap context.
#[derive(Debug, Clone)]
pub struct UreqBackend {
    bootstrap: Arc<Bootstrap<RustlsCrypto>>,
}

impl UreqBackend {
    pub fn new(bootstrap: Arc<Bootstrap<RustlsCrypto>>) -> Self {
        Self { bootstrap }
    }
}

impl TransferBackend for UreqBackend {
    type Handle = UreqTransfer;

    fn open(&self) -> Result<UreqTransfer, TransferError> {
        if !self.bootstrap.is_initialized() {
            return Err(TransferError::handle_init("tls bootstrap not initialized"));
        }
        let provider = self
            .bootstrap
            .crypto()
            .provider()
            .ok_or_else(|| TransferError::handle_init("no crypto provider"))?;
        Ok(UreqTransfer::new(provider))
    }
}

/// A single POST transfer driven through `ureq`.
#[derive(Debug)]
pub struct UreqTransfer {
    provider: Arc<CryptoProvider>,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    verify_host: Option<bool>,
    verify_peer: Option<bool>,
    ca_info: Option<PathBuf>,
    proxy: Option<String>,
    proxy_user_pwd: Option<String>,
    url: Option<String>,
    post: bool,
    body: Vec<u8>,
    info: Option<TransferInfo>,
}

impl UreqTransfer {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self {
            provider,
            connect_timeout: None,
            timeout: None,
            headers: Vec::new(),
            verify_host: None,
            verify_peer: None,
            ca_info: None,
            proxy: None,
            proxy_user_pwd: None,
            url: None,
            post: false,
            body: Vec::new(),
            info: None,
        }
    }

    fn agent(&self) -> Result<ureq::Agent, TransferError> {
        let mut tls =
            TlsConfig::builder().unversioned_rustls_crypto_provider(Arc::clone(&self.provider));
        if let Some(path) = &self.ca_info {
            tls = tls.root_certs(load_root_certs(path)?);
        }
        // rustls cannot check the chain without the name or vice versa.
        if self.verify_peer == Some(false) || self.verify_host == Some(false) {
            tls = tls.disable_verification(true);
        }

        // Only an explicitly set proxy is used, never one from the environment.
        let proxy = match &self.proxy {
            Some(proxy) => {
                let user_pwd = self.proxy_user_pwd.as_deref().unwrap_or("");
                let proxy = ureq::Proxy::new(&proxy_with_credentials(proxy, user_pwd))
                    .map_err(map_ureq_error)?;
                Some(proxy)
            }
            None => None,
        };

        // A 3xx reply is the answer to this POST; it is never re-sent elsewhere.
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_connect(self.connect_timeout)
            .timeout_global(self.timeout)
            .proxy(proxy)
            .tls_config(tls.build())
            .build();

        Ok(config.new_agent())
    }
}

impl Transfer for UreqTransfer {
    fn set_option(&mut self, option: TransferOption) -> Result<(), TransferError> {
        match option {
            TransferOption::ConnectTimeout(d) => self.connect_timeout = Some(d),
            TransferOption::Timeout(d) => self.timeout = Some(d),
            TransferOption::Headers(headers) => {
                let blank = headers.iter().find(|(name, _)| name.trim().is_empty());
                if let Some((name, _)) = blank {
                    return Err(TransferError::new(
                        codes::BAD_FUNCTION_ARGUMENT,
                        format!("invalid header name {name:?}"),
                    ));
                }
                self.headers = headers;
            }
            TransferOption::VerifyHost(on) => self.verify_host = Some(on),
            TransferOption::VerifyPeer(on) => self.verify_peer = Some(on),
            TransferOption::CaInfo(path) => self.ca_info = Some(path),
            TransferOption::Proxy(url) => self.proxy = Some(url),
            TransferOption::ProxyUserPwd(user_pwd) => self.proxy_user_pwd = Some(user_pwd),
            TransferOption::Url(url) => self.url = Some(url),
            TransferOption::Post => self.post = true,
            TransferOption::PostFields(body) => self.body = body,
        }
        Ok(())
    }

    fn perform(&mut self, sink: &mut dyn FnMut(&[u8])) -> Result<(), TransferError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| TransferError::new(codes::URL_MALFORMAT, "no URL set"))?;
        if !self.post {
            return Err(TransferError::new(
                codes::BAD_FUNCTION_ARGUMENT,
                "only POST transfers are supported",
            ));
        }

        let agent = self.agent()?;
        let mut request = agent.post(url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(bytes = self.body.len(), "sending request body");
        let mut response = request.send(&self.body[..]).map_err(map_ureq_error)?;

        let status = response.status().as_u16();
        let effective_url = response.get_uri().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut reader = response.body_mut().as_reader();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader
                .read(&mut chunk)
                .map_err(|e| map_ureq_error(ureq::Error::Io(e)))?;
            if n == 0 {
                break;
            }
            sink(&chunk[..n]);
        }

        self.info = Some(TransferInfo {
            status,
            effective_url,
            content_type,
        });
        Ok(())
    }

    fn info(&self) -> Result<TransferInfo, TransferError> {
        self.info.clone().ok_or_else(|| {
            TransferError::new(codes::BAD_FUNCTION_ARGUMENT, "no completed transfer")
        })
    }
}

/// Read a PEM bundle into the set of trusted roots.
fn load_root_certs(path: &Path) -> Result<RootCerts, TransferError> {
    let cacert_error = |detail: String| {
        TransferError::new(
            codes::SSL_CACERT_BADFILE,
            format!("problem with the SSL CA cert {}: {detail}", path.display()),
        )
    };

    let pem = std::fs::read(path).map_err(|e| cacert_error(e.to_string()))?;
    let certs = ureq::tls::parse_pem(&pem)
        .filter_map(|item| match item {
            Ok(PemItem::Certificate(cert)) => Some(Ok(cert.to_owned())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cacert_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(cacert_error("no certificates found".to_owned()));
    }

    debug!(path = %path.display(), count = certs.len(), "loaded root certificates");
    Ok(RootCerts::new_with_certs(&certs))
}

/// Fold `user:password` into the proxy URL's authority, which is where
/// `ureq` reads proxy credentials from.
pub(crate) fn proxy_with_credentials(proxy: &str, user_pwd: &str) -> String {
    if user_pwd.is_empty() {
        return proxy.to_owned();
    }
    let (scheme, rest) = match proxy.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", proxy),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.contains('@') {
        return proxy.to_owned();
    }
    format!("{scheme}://{user_pwd}@{rest}")
}

fn map_ureq_error(err: ureq::Error) -> TransferError {
    let code = match &err {
        ureq::Error::BadUri(_) => codes::URL_MALFORMAT,
        ureq::Error::HostNotFound => codes::COULDNT_RESOLVE_HOST,
        ureq::Error::ConnectionFailed => codes::COULDNT_CONNECT,
        ureq::Error::Timeout(_) => codes::OPERATION_TIMEDOUT,
        ureq::Error::InvalidProxyUrl | ureq::Error::ConnectProxyFailed(_) => {
            codes::COULDNT_RESOLVE_PROXY
        }
        ureq::Error::Tls(_) => codes::SSL_CONNECT_ERROR,
        ureq::Error::Io(e) => io_error_code(e),
        _ => codes::RECV_ERROR,
    };
    TransferError::new(code, err.to_string())
}

fn io_error_code(err: &io::Error) -> i32 {
    if let Some(inner) = err.get_ref() {
        if let Some(rustls_err) = inner.downcast_ref::<rustls::Error>() {
            return match rustls_err {
                rustls::Error::InvalidCertificate(_) => codes::PEER_FAILED_VERIFICATION,
                _ => codes::SSL_CONNECT_ERROR,
            };
        }
        if let Some(ureq::Error::Timeout(_)) = inner.downcast_ref::<ureq::Error>() {
            return codes::OPERATION_TIMEDOUT;
        }
    }
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => codes::OPERATION_TIMEDOUT,
        io::ErrorKind::ConnectionRefused => codes::COULDNT_CONNECT,
        _ => codes::RECV_ERROR,
    }
}
