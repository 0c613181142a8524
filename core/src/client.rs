//! Single-shot JSON POST client.
//!
//! # Design
//! `HttpService` opens one transfer handle per call, assigns options in a
//! fixed order, performs the transfer and reads the diagnostic info. The first
//! step that fails ends the call and its code and message become the
//! instance's last error. An HTTP status of 500 is not a failure at this
//! layer; callers inspect the body (or `last_info`) themselves.
//!
//! The response buffer is cleared at the start of every call, so a reused
//! instance returns only the latest response body.

use tracing::{debug, warn};

use crate::config::{effective_root_ca, effective_timeout, ConfigSource};
use crate::error::{codes, TransferError};
use crate::transfer::{Transfer, TransferBackend, TransferInfo, TransferOption};

/// Message reported by a fresh instance before any call.
pub const ERRMSG_NOT_SET: &str = "not set errcode";

/// Message reported after a successful call.
pub const ERRMSG_SUCCESS: &str = "success";

/// POST client over a transfer backend `B`, configured by `S`.
#[derive(Debug)]
pub struct HttpService<B, S> {
    backend: B,
    config: S,
    errcode: i32,
    errmsg: String,
    data: Vec<u8>,
    last_info: Option<TransferInfo>,
}

impl<B: TransferBackend, S: ConfigSource> HttpService<B, S> {
    pub fn new(backend: B, config: S) -> Self {
        Self {
            backend,
            config,
            errcode: codes::NOT_SET,
            errmsg: ERRMSG_NOT_SET.to_owned(),
            data: Vec::new(),
            last_info: None,
        }
    }

    /// POST `request` to `url` and return the full response body.
    ///
    /// Certificate and host verification are applied only when `verify_peer`
    /// is set and `url` contains `https://`.
    pub fn post(
        &mut self,
        url: &str,
        request: &[u8],
        verify_peer: bool,
    ) -> Result<Vec<u8>, TransferError> {
        self.data.clear();
        match self.transfer(url, request, verify_peer) {
            Ok(info) => {
                debug!(
                    status = info.status,
                    effective_url = %info.effective_url,
                    content_type = info.content_type.as_deref().unwrap_or(""),
                    bytes = self.data.len(),
                    "post completed"
                );
                self.errcode = codes::OK;
                self.errmsg = ERRMSG_SUCCESS.to_owned();
                self.last_info = Some(info);
                Ok(std::mem::take(&mut self.data))
            }
            Err(err) => {
                warn!(code = err.code(), message = %err.message(), "post failed");
                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Like `post`, but reports through a flag and an out parameter that is
    /// written only on success.
    pub fn post_into(
        &mut self,
        url: &str,
        request: &[u8],
        response: &mut Vec<u8>,
        verify_peer: bool,
    ) -> bool {
        match self.post(url, request, verify_peer) {
            Ok(body) => {
                *response = body;
                true
            }
            Err(_) => false,
        }
    }

    /// Code of the most recent call: 0 on success, `NOT_SET` before any call.
    pub fn errcode(&self) -> i32 {
        self.errcode
    }

    pub fn errmsg(&self) -> &str {
        &self.errmsg
    }

    /// Status, effective URL and content type of the last successful call.
    pub fn last_info(&self) -> Option<&TransferInfo> {
        self.last_info.as_ref()
    }

    /// Record a failure that happened outside the transfer itself, such as a
    /// bad argument at a language boundary.
    pub fn record_error(&mut self, err: &TransferError) {
        self.errcode = err.code();
        self.errmsg = err.message().to_owned();
    }

    fn transfer(
        &mut self,
        url: &str,
        request: &[u8],
        verify_peer: bool,
    ) -> Result<TransferInfo, TransferError> {
        let mut handle = self.backend.open()?;

        let connect_timeout = effective_timeout(self.config.connect_timeout_secs());
        apply(&mut handle, TransferOption::ConnectTimeout(connect_timeout))?;
        let timeout = effective_timeout(self.config.post_timeout_secs());
        apply(&mut handle, TransferOption::Timeout(timeout))?;

        apply(
            &mut handle,
            TransferOption::Headers(vec![(
                "Content-Type".to_owned(),
                "application/json".to_owned(),
            )]),
        )?;

        if verify_peer && is_https(url) {
            apply(&mut handle, TransferOption::VerifyHost(true))?;
            apply(&mut handle, TransferOption::VerifyPeer(true))?;
            let root_ca = effective_root_ca(&self.config.root_ca());
            apply(&mut handle, TransferOption::CaInfo(root_ca))?;
        }

        // Secure (https) proxies are not supported.
        let proxy_url = self.config.proxy_url();
        if !proxy_url.is_empty() {
            apply(&mut handle, TransferOption::Proxy(proxy_url))?;
            let user_pwd = self.config.proxy_user_pwd();
            apply(&mut handle, TransferOption::ProxyUserPwd(user_pwd))?;
        }

        apply(&mut handle, TransferOption::Url(url.to_owned()))?;
        apply(&mut handle, TransferOption::Post)?;
        apply(&mut handle, TransferOption::PostFields(request.to_vec()))?;

        let data = &mut self.data;
        handle.perform(&mut |chunk| data.extend_from_slice(chunk))?;

        handle.info()
    }
}

fn apply<T: Transfer>(handle: &mut T, option: TransferOption) -> Result<(), TransferError> {
    let name = option.name();
    handle.set_option(option).inspect_err(|err| {
        debug!(option = name, code = err.code(), "option rejected");
    })
}

/// Literal substring match, the same test the transfer setup has always used.
fn is_https(url: &str) -> bool {
    url.contains("https://")
}
