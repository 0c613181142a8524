//! Capability interface over the HTTP transfer library.
//!
//! # Design
//! A transfer is driven the way easy-handle libraries are driven: open a
//! handle, assign options one at a time, perform, then query info. Every step
//! can fail on its own and reports a `TransferError`. `HttpService` only ever
//! talks to these traits, so timeout fallback, verification policy and error
//! mapping are tested against a fake without a network stack.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::TransferError;

/// A single option assignment on a transfer handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOption {
    ConnectTimeout(Duration),
    /// Upper bound on the whole transfer.
    Timeout(Duration),
    Headers(Vec<(String, String)>),
    VerifyHost(bool),
    VerifyPeer(bool),
    /// PEM bundle of trusted roots.
    CaInfo(PathBuf),
    Proxy(String),
    /// `user:password` for the proxy. May be empty.
    ProxyUserPwd(String),
    Url(String),
    Post,
    PostFields(Vec<u8>),
}

impl TransferOption {
    /// Short name for logs. Never includes option values.
    pub fn name(&self) -> &'static str {
        match self {
            TransferOption::ConnectTimeout(_) => "connect_timeout",
            TransferOption::Timeout(_) => "timeout",
            TransferOption::Headers(_) => "headers",
            TransferOption::VerifyHost(_) => "verify_host",
            TransferOption::VerifyPeer(_) => "verify_peer",
            TransferOption::CaInfo(_) => "ca_info",
            TransferOption::Proxy(_) => "proxy",
            TransferOption::ProxyUserPwd(_) => "proxy_userpwd",
            TransferOption::Url(_) => "url",
            TransferOption::Post => "post",
            TransferOption::PostFields(_) => "post_fields",
        }
    }
}

/// What the transfer library reports about a completed transfer.
///
/// None of these values affect the outcome of a POST; a 500 is still a
/// successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInfo {
    pub status: u16,
    pub effective_url: String,
    pub content_type: Option<String>,
}

/// One request's worth of transfer state.
pub trait Transfer {
    fn set_option(&mut self, option: TransferOption) -> Result<(), TransferError>;

    /// Run the transfer, handing every received body chunk to `sink` in
    /// arrival order.
    fn perform(&mut self, sink: &mut dyn FnMut(&[u8])) -> Result<(), TransferError>;

    /// Info about the completed transfer. Fails before `perform` succeeded.
    fn info(&self) -> Result<TransferInfo, TransferError>;
}

/// Factory for transfer handles.
pub trait TransferBackend {
    type Handle: Transfer;

    fn open(&self) -> Result<Self::Handle, TransferError>;
}
