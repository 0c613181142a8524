//! Configuration values read by `HttpService` on every call.
//!
//! # Design
//! The client does not own its configuration; it asks a `ConfigSource` for
//! plain values each time it builds a request, so a host can change timeouts
//! or the proxy between calls. Unset values read as `0` or `""` and the
//! fallbacks below fill them in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Used for both timeouts when the configured value is not positive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Root CA bundle used when none is configured.
pub const DEFAULT_ROOT_CA: &str = "./cloudpayrootca.pem";

/// Accessors for the values a POST needs.
pub trait ConfigSource {
    /// Connect timeout in seconds; `<= 0` means unset.
    fn connect_timeout_secs(&self) -> i64;

    /// Whole-request timeout in seconds; `<= 0` means unset.
    fn post_timeout_secs(&self) -> i64;

    fn root_ca(&self) -> String;

    fn proxy_url(&self) -> String;

    /// `user:password` for the proxy.
    fn proxy_user_pwd(&self) -> String;
}

impl<T: ConfigSource + ?Sized> ConfigSource for Box<T> {
    fn connect_timeout_secs(&self) -> i64 {
        (**self).connect_timeout_secs()
    }

    fn post_timeout_secs(&self) -> i64 {
        (**self).post_timeout_secs()
    }

    fn root_ca(&self) -> String {
        (**self).root_ca()
    }

    fn proxy_url(&self) -> String {
        (**self).proxy_url()
    }

    fn proxy_user_pwd(&self) -> String {
        (**self).proxy_user_pwd()
    }
}

/// Timeout actually applied for a configured number of seconds.
pub fn effective_timeout(secs: i64) -> Duration {
    match u64::try_from(secs) {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => DEFAULT_TIMEOUT,
    }
}

/// CA bundle path actually applied for a configured path.
pub fn effective_root_ca(configured: &str) -> PathBuf {
    if configured.is_empty() {
        PathBuf::from(DEFAULT_ROOT_CA)
    } else {
        PathBuf::from(configured)
    }
}

/// Fixed settings, typically loaded from a JSON file.
///
/// Every field is optional in the JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpsSettings {
    pub connect_timeout: i64,
    pub post_timeout: i64,
    pub root_ca: String,
    pub proxy_url: String,
    pub proxy_user_pwd: String,
}

impl HttpsSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }
}

impl ConfigSource for HttpsSettings {
    fn connect_timeout_secs(&self) -> i64 {
        self.connect_timeout
    }

    fn post_timeout_secs(&self) -> i64 {
        self.post_timeout
    }

    fn root_ca(&self) -> String {
        self.root_ca.clone()
    }

    fn proxy_url(&self) -> String {
        self.proxy_url.clone()
    }

    fn proxy_user_pwd(&self) -> String {
        self.proxy_user_pwd.clone()
    }
}

/// Settings read from environment variables at every access.
///
/// With the default prefix the variables are `PAYPOST_HTTPS_CONNECT_TIMEOUT`,
/// `PAYPOST_HTTPS_POST_TIMEOUT`, `PAYPOST_ROOT_CA`, `PAYPOST_HTTPS_PROXY_URL`
/// and `PAYPOST_HTTPS_PROXY_USERPWD`. Numbers that do not parse read as 0.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::with_prefix("PAYPOST")
    }
}

impl EnvConfig {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('_').to_owned(),
        }
    }

    fn var(&self, name: &str) -> String {
        std::env::var(format!("{}_{name}", self.prefix)).unwrap_or_default()
    }

    fn secs(&self, name: &str) -> i64 {
        self.var(name).trim().parse().unwrap_or(0)
    }
}

impl ConfigSource for EnvConfig {
    fn connect_timeout_secs(&self) -> i64 {
        self.secs("HTTPS_CONNECT_TIMEOUT")
    }

    fn post_timeout_secs(&self) -> i64 {
        self.secs("HTTPS_POST_TIMEOUT")
    }

    fn root_ca(&self) -> String {
        self.var("ROOT_CA")
    }

    fn proxy_url(&self) -> String {
        self.var("HTTPS_PROXY_URL")
    }

    fn proxy_user_pwd(&self) -> String {
        self.var("HTTPS_PROXY_USERPWD")
    }
}
