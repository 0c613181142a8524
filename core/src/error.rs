//! Error types for the POST client and its bootstrap.
//!
//! # Design
//! `TransferError` carries a flat numeric code plus the transfer library's own
//! message, which is exactly what `HttpService` records as its last error.
//! Codes follow libcurl's numbering where a counterpart exists so callers that
//! switch on well-known values (timeouts, CA file problems) keep working.

use thiserror::Error;

/// Numeric error codes reported through `HttpService::errcode`.
pub mod codes {
    /// The call succeeded.
    pub const OK: i32 = 0;
    /// A transfer handle could not be created.
    pub const HANDLE_INIT: i32 = -1;
    /// Reported by a fresh client before any call.
    pub const NOT_SET: i32 = -9999;
    pub const FAILED_INIT: i32 = 2;
    pub const URL_MALFORMAT: i32 = 3;
    pub const COULDNT_RESOLVE_PROXY: i32 = 5;
    pub const COULDNT_RESOLVE_HOST: i32 = 6;
    pub const COULDNT_CONNECT: i32 = 7;
    pub const WRITE_ERROR: i32 = 23;
    pub const OPERATION_TIMEDOUT: i32 = 28;
    pub const SSL_CONNECT_ERROR: i32 = 35;
    pub const BAD_FUNCTION_ARGUMENT: i32 = 43;
    pub const RECV_ERROR: i32 = 56;
    pub const PEER_FAILED_VERIFICATION: i32 = 60;
    pub const SSL_CACERT_BADFILE: i32 = 77;
}

/// A failed option assignment or transfer, as reported by the transfer library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransferError {
    code: i32,
    message: String,
}

impl TransferError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The handle could not be created at all.
    pub fn handle_init(reason: &str) -> Self {
        Self::new(
            codes::HANDLE_INIT,
            format!("transfer handle init failed: {reason}"),
        )
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned by `Bootstrap::init`.
#[derive(Debug, Error)]
pub enum InitError {
    /// The lock array required by the crypto library could not be allocated.
    #[error("failed to allocate {count} crypto locks")]
    LockAllocation { count: usize },

    /// The TLS library refused to initialize.
    #[error("TLS library initialization failed: {0}")]
    Crypto(String),
}

impl InitError {
    /// Nonzero status code surfaced through the C `init` entry point.
    pub fn code(&self) -> i32 {
        match self {
            InitError::Crypto(_) => -1,
            InitError::LockAllocation { .. } => -2,
        }
    }
}

/// Errors raised while loading `HttpsSettings`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_displays_library_message() {
        let err = TransferError::new(codes::OPERATION_TIMEDOUT, "timeout: global");
        assert_eq!(err.to_string(), "timeout: global");
        assert_eq!(err.code(), 28);
        assert_eq!(err.message(), "timeout: global");
    }

    #[test]
    fn handle_init_uses_negative_code() {
        let err = TransferError::handle_init("tls bootstrap not initialized");
        assert_eq!(err.code(), codes::HANDLE_INIT);
        assert_eq!(
            err.message(),
            "transfer handle init failed: tls bootstrap not initialized"
        );
    }

    #[test]
    fn init_error_codes_are_nonzero() {
        assert_eq!(InitError::Crypto("no provider".to_owned()).code(), -1);
        assert_eq!(InitError::LockAllocation { count: 41 }.code(), -2);
        assert_eq!(
            InitError::LockAllocation { count: 41 }.to_string(),
            "failed to allocate 41 crypto locks"
        );
    }

    #[test]
    fn config_parse_error_wraps_serde() {
        let err: ConfigError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("invalid settings:"));
    }
}
