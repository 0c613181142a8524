//! Synchronous HTTPS POST client core for exchanging JSON with a payment
//! gateway.
//!
//! # Overview
//! A host creates one `Bootstrap` at startup and calls `init`, then issues any
//! number of single-shot POSTs through `HttpService` instances, and calls
//! `fini` at exit. Each POST applies timeouts, a JSON content type, optional
//! certificate verification and an optional proxy, and reports a flat
//! error code/message pair.
//!
//! # Design
//! - `Bootstrap` is an explicit context object; nothing here is a hidden
//!   process global.
//! - The transfer library sits behind the `Transfer`/`TransferBackend`
//!   capability traits. `UreqBackend` is the production implementation.
//! - Configuration is read through `ConfigSource` on every call.

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod locks;
pub mod transfer;
pub mod ureq_backend;

pub use bootstrap::{Bootstrap, CryptoLibrary, RustlsCrypto};
pub use client::HttpService;
pub use config::{ConfigSource, EnvConfig, HttpsSettings};
pub use error::{codes, ConfigError, InitError, TransferError};
pub use locks::LockTable;
pub use transfer::{Transfer, TransferBackend, TransferInfo, TransferOption};
pub use ureq_backend::{UreqBackend, UreqTransfer};
