//! One-time TLS/crypto setup and teardown.
//!
//! # Design
//! `Bootstrap` is an explicit context object rather than a hidden process
//! flag: the host creates one, calls `init` at startup and `fini` at exit, and
//! hands it to the transfer backend. Tests build as many independent contexts
//! as they like. The flag transition is guarded by a mutex, so concurrent
//! `init` calls perform the setup once.
//!
//! The crypto library sits behind `CryptoLibrary`. It declares how many locks
//! it needs; the bootstrap owns the resulting `LockTable` and injects it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustls::crypto::CryptoProvider;
use tracing::{debug, info, warn};

use crate::error::InitError;
use crate::locks::LockTable;

/// The process-wide crypto/TLS library as seen by `Bootstrap`.
pub trait CryptoLibrary: Send + Sync {
    /// Number of locks the library wants its host to provide.
    fn num_locks(&self) -> usize;

    /// Install (`Some`) or remove (`None`) the host-provided lock table.
    fn install_locking(&self, locks: Option<Arc<LockTable>>);

    /// Initialize the library's global state.
    fn init(&self) -> Result<(), String>;

    /// Release global and per-thread library state.
    fn cleanup(&self);
}

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    locks: Option<Arc<LockTable>>,
}

/// Owner of the one-time library setup.
#[derive(Debug)]
pub struct Bootstrap<C> {
    crypto: C,
    state: Mutex<State>,
}

impl<C: CryptoLibrary> Bootstrap<C> {
    pub fn new(crypto: C) -> Self {
        Self {
            crypto,
            state: Mutex::new(State::default()),
        }
    }

    /// Set up the crypto library. A second call before `fini` does nothing.
    ///
    /// On failure the lock table is released and the context stays
    /// uninitialized.
    pub fn init(&self) -> Result<(), InitError> {
        let mut state = self.state();
        if state.initialized {
            debug!("tls bootstrap already initialized");
            return Ok(());
        }

        let count = self.crypto.num_locks();
        let locks = if count > 0 {
            let table = Arc::new(LockTable::new(count)?);
            self.crypto.install_locking(Some(Arc::clone(&table)));
            Some(table)
        } else {
            None
        };

        if let Err(reason) = self.crypto.init() {
            if locks.is_some() {
                self.crypto.install_locking(None);
            }
            warn!(%reason, "tls bootstrap failed");
            return Err(InitError::Crypto(reason));
        }

        state.locks = locks;
        state.initialized = true;
        info!(locks = count, "tls bootstrap initialized");
        Ok(())
    }

    /// Tear down what `init` set up. Without a prior `init` this does nothing.
    pub fn fini(&self) {
        let mut state = self.state();
        if !state.initialized {
            return;
        }

        self.crypto.cleanup();
        if state.locks.take().is_some() {
            self.crypto.install_locking(None);
        }
        state.initialized = false;
        info!("tls bootstrap finalized");
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// The lock table installed into the crypto library, if any.
    pub fn locks(&self) -> Option<Arc<LockTable>> {
        self.state().locks.clone()
    }

    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// rustls with the `ring` provider.
///
/// rustls does its own synchronization and asks for no host locks. `init`
/// installs `ring` as the process default provider unless something else in
/// the process already installed one, in which case that one is used.
#[derive(Debug, Default)]
pub struct RustlsCrypto {
    active: Mutex<Option<Arc<CryptoProvider>>>,
}

impl RustlsCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// The provider selected by the last successful `init`.
    pub fn provider(&self) -> Option<Arc<CryptoProvider>> {
        self.active().clone()
    }

    fn active(&self) -> MutexGuard<'_, Option<Arc<CryptoProvider>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CryptoLibrary for RustlsCrypto {
    fn num_locks(&self) -> usize {
        0
    }

    fn install_locking(&self, _locks: Option<Arc<LockTable>>) {}

    fn init(&self) -> Result<(), String> {
        if CryptoProvider::get_default().is_none() {
            // Losing an install race to another thread is fine.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        let provider = CryptoProvider::get_default()
            .cloned()
            .ok_or_else(|| "no rustls crypto provider available".to_owned())?;
        *self.active() = Some(provider);
        Ok(())
    }

    fn cleanup(&self) {
        self.active().take();
    }
}
