//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! The client handle is opaque to C. It keeps a C copy of the last error
//! message next to the core client so `paypost_client_errmsg` can hand out a
//! borrowed pointer that stays valid until the next call on that handle.

use std::ffi::CString;

use paypost_core::client::ERRMSG_NOT_SET;
use paypost_core::{ConfigSource, HttpService, UreqBackend};

/// Configuration behind a C handle.
pub type BoxedConfig = Box<dyn ConfigSource + Send>;

/// Opaque handle to an `HttpService`. C callers receive a pointer to this
/// and pass it back into every `paypost_client_*` function.
pub struct FfiHttpService {
    pub(crate) inner: HttpService<UreqBackend, BoxedConfig>,
    errmsg: CString,
}

impl FfiHttpService {
    pub(crate) fn new(backend: UreqBackend, config: BoxedConfig) -> Self {
        Self {
            inner: HttpService::new(backend, config),
            errmsg: to_c_string(ERRMSG_NOT_SET),
        }
    }

    /// Refresh the C copy of the error message after a call.
    pub(crate) fn sync_errmsg(&mut self) {
        self.errmsg = to_c_string(self.inner.errmsg());
    }

    pub(crate) fn errmsg(&self) -> &CString {
        &self.errmsg
    }
}

fn to_c_string(msg: &str) -> CString {
    CString::new(msg.replace('\0', " ")).unwrap_or_default()
}

/// An owned byte buffer handed to C.
///
/// Filled by `paypost_client_post` on success. Release with
/// `paypost_buffer_free`, which also resets the fields.
#[repr(C)]
pub struct FfiBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl FfiBuffer {
    pub(crate) fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        let data = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
        Self { data, len }
    }

    /// Free the buffer's memory and reset it to empty.
    ///
    /// # Safety
    /// `data`/`len` must come from `from_vec` (or be null) and not have been
    /// freed already.
    pub(crate) unsafe fn release(&mut self) {
        if !self.data.is_null() {
            let slice = std::ptr::slice_from_raw_parts_mut(self.data, self.len);
            drop(unsafe { Box::from_raw(slice) });
        }
        self.data = std::ptr::null_mut();
        self.len = 0;
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }
    }
}
