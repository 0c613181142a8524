//! C-ABI wrapper around `paypost-core`.
//!
//! # Overview
//! Exposes the bootstrap and the single-shot POST client through
//! `extern "C"` functions:
//!
//! - `paypost_init` / `paypost_fini` once per process,
//! - `paypost_client_new` / `paypost_client_free` per client,
//! - `paypost_client_post` plus `paypost_client_errcode` /
//!   `paypost_client_errmsg` for the result of the last call.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The process-wide `Bootstrap` lives here, at the C boundary; the core
//!   crate itself has no globals.
//! - Response bodies are handed out as owned `FfiBuffer`s that the caller
//!   releases with `paypost_buffer_free`.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use paypost_core::{
    codes, Bootstrap, EnvConfig, HttpsSettings, RustlsCrypto, TransferError, UreqBackend,
};
use tracing::warn;

use types::*;

static BOOTSTRAP: LazyLock<Arc<Bootstrap<RustlsCrypto>>> =
    LazyLock::new(|| Arc::new(Bootstrap::new(RustlsCrypto::new())));

// ---------------------------------------------------------------------------
// Process lifecycle
// ---------------------------------------------------------------------------

/// Initialize the TLS library. Returns 0 on success, nonzero on failure.
///
/// A second call before `paypost_fini` does nothing and returns 0. Not to be
/// called concurrently with `paypost_fini`.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_init() -> i32 {
    catch_unwind(|| match BOOTSTRAP.init() {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "paypost_init failed");
            e.code()
        }
    })
    .unwrap_or(-1)
}

/// Release what `paypost_init` set up. Always returns 0.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_fini() -> i32 {
    catch_unwind(|| {
        BOOTSTRAP.fini();
        0
    })
    .unwrap_or(-1)
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client that reads its settings from `PAYPOST_*` environment
/// variables on every call.
///
/// The caller must free the returned pointer with `paypost_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_client_new() -> *mut FfiHttpService {
    catch_unwind(|| {
        let backend = UreqBackend::new(Arc::clone(&BOOTSTRAP));
        Box::into_raw(Box::new(FfiHttpService::new(
            backend,
            Box::new(EnvConfig::default()),
        )))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Create a client with fixed settings given as a JSON document, e.g.
/// `{"connect_timeout": 5, "root_ca": "/etc/pay/roots.pem"}`.
///
/// Returns null if `settings_json` is null or not valid settings JSON.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_client_new_with_config(
    settings_json: *const c_char,
) -> *mut FfiHttpService {
    catch_unwind(|| {
        if settings_json.is_null() {
            return std::ptr::null_mut();
        }
        let raw = unsafe { CStr::from_ptr(settings_json) }.to_str().unwrap_or("");
        let settings = match HttpsSettings::from_json(raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "rejected client settings");
                return std::ptr::null_mut();
            }
        };
        let backend = UreqBackend::new(Arc::clone(&BOOTSTRAP));
        Box::into_raw(Box::new(FfiHttpService::new(backend, Box::new(settings))))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_client_free(client: *mut FfiHttpService) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// POST
// ---------------------------------------------------------------------------

/// POST `body_len` bytes at `body` to `url` with `Content-Type:
/// application/json`.
///
/// On success writes the response body into `*out` and returns true; the
/// previous contents of `*out` are overwritten, not freed. On failure returns
/// false and leaves `*out` untouched; `paypost_client_errcode` and
/// `paypost_client_errmsg` describe the failure. `body` may be null only
/// when `body_len` is 0.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_client_post(
    client: *mut FfiHttpService,
    url: *const c_char,
    body: *const u8,
    body_len: usize,
    out: *mut FfiBuffer,
    verify_peer: bool,
) -> bool {
    if client.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| {
        let client = unsafe { &mut *client };
        let result = post(client, url, body, body_len, out, verify_peer);
        client.sync_errmsg();
        result
    }))
    .unwrap_or(false)
}

fn post(
    client: &mut FfiHttpService,
    url: *const c_char,
    body: *const u8,
    body_len: usize,
    out: *mut FfiBuffer,
    verify_peer: bool,
) -> bool {
    let bad_argument = |client: &mut FfiHttpService, what: &str| {
        let err = TransferError::new(
            codes::BAD_FUNCTION_ARGUMENT,
            format!("invalid argument: {what}"),
        );
        client.inner.record_error(&err);
        false
    };

    if url.is_null() {
        return bad_argument(client, "url is null");
    }
    if out.is_null() {
        return bad_argument(client, "out is null");
    }
    if body.is_null() && body_len != 0 {
        return bad_argument(client, "body is null");
    }
    let Ok(url) = unsafe { CStr::from_ptr(url) }.to_str() else {
        return bad_argument(client, "url is not UTF-8");
    };
    let request = if body_len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(body, body_len) }
    };

    match client.inner.post(url, request, verify_peer) {
        Ok(response) => {
            unsafe { *out = FfiBuffer::from_vec(response) };
            true
        }
        Err(_) => false,
    }
}

/// Error code of the last call on `client`: 0 after success, -9999 before
/// any call (also returned for a null client).
#[unsafe(no_mangle)]
pub extern "C" fn paypost_client_errcode(client: *const FfiHttpService) -> i32 {
    if client.is_null() {
        return codes::NOT_SET;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*client }.inner.errcode()))
        .unwrap_or(codes::NOT_SET)
}

/// Error message of the last call on `client`, `"success"` after success.
///
/// The string is owned by the client and valid until the next call on it or
/// until it is freed. Returns null for a null client.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_client_errmsg(client: *const FfiHttpService) -> *const c_char {
    if client.is_null() {
        return std::ptr::null();
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*client }.errmsg().as_ptr()))
        .unwrap_or(std::ptr::null())
}

/// Free the memory of a buffer filled by `paypost_client_post` and reset it.
/// Safe to call with null or with an already released buffer.
#[unsafe(no_mangle)]
pub extern "C" fn paypost_buffer_free(buf: *mut FfiBuffer) {
    if !buf.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { (*buf).release() }));
    }
}
