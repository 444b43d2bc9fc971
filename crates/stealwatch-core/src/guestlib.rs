//! Hypervisor guest-library binding.
//!
//! The [`GuestLib`] trait is the narrow interface the steal-time provider
//! consumes: open a handle, read stolen milliseconds, close the handle.
//!
//! [`VmGuestLib`] implements it against the VMware guest SDK
//! (`libvmGuestLib.so`), loaded at runtime with `dlopen`. A host without
//! the library simply fails [`VmGuestLib::load`], and the caller falls back
//! to kernel counters.

use std::ffi::{c_char, c_int, c_void, CStr};
use thiserror::Error;
use tracing::debug;

/// Errors from the guest library.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuestLibError {
    /// The shared library could not be loaded.
    #[error("guest library not available: {0}")]
    Unavailable(String),

    /// A required entry point is missing from the library.
    #[error("guest library symbol {symbol} not found: {message}")]
    MissingSymbol {
        /// Symbol name.
        symbol: &'static str,
        /// Loader error text.
        message: String,
    },

    /// A library call returned an error code.
    #[error("{call} failed: {message} (code {code})")]
    Call {
        /// Library function that failed.
        call: &'static str,
        /// Raw library error code.
        code: i32,
        /// Library error text.
        message: String,
    },
}

/// Narrow interface to a hypervisor guest-integration library.
pub trait GuestLib {
    /// Open session handle.
    type Handle;

    /// Open a new handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the hypervisor interface is not reachable.
    fn open(&self) -> Result<Self::Handle, GuestLibError>;

    /// Milliseconds of CPU stolen from this VM since it started.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails; callers treat it as transient.
    fn stolen_ms(&self, handle: &mut Self::Handle) -> Result<u64, GuestLibError>;

    /// Release a handle.
    fn close(&self, handle: Self::Handle);
}

/// Library names tried in order.
pub const VMGUESTLIB_NAMES: [&CStr; 2] = [c"libvmGuestLib.so", c"libvmGuestLib.so.0"];

const VMGUESTLIB_ERROR_SUCCESS: c_int = 0;

type RawHandle = *mut c_void;
type OpenHandleFn = unsafe extern "C" fn(*mut RawHandle) -> c_int;
type HandleFn = unsafe extern "C" fn(RawHandle) -> c_int;
type GetCpuStolenMsFn = unsafe extern "C" fn(RawHandle, *mut u64) -> c_int;
type GetErrorTextFn = unsafe extern "C" fn(c_int) -> *const c_char;

/// VMware guest SDK loaded with `dlopen`.
pub struct VmGuestLib {
    library: *mut c_void,
    open_handle: OpenHandleFn,
    update_info: HandleFn,
    get_cpu_stolen_ms: GetCpuStolenMsFn,
    close_handle: HandleFn,
    get_error_text: GetErrorTextFn,
}

/// Open VMware guest SDK session.
#[derive(Debug)]
pub struct VmGuestHandle(RawHandle);

impl VmGuestLib {
    /// Load the library and resolve its entry points.
    ///
    /// # Errors
    ///
    /// Returns [`GuestLibError::Unavailable`] if no candidate library can
    /// be loaded and [`GuestLibError::MissingSymbol`] if one is incomplete.
    pub fn load() -> Result<Self, GuestLibError> {
        let mut last_error = String::from("no candidate library");

        for name in VMGUESTLIB_NAMES {
            // SAFETY: `name` is a valid NUL-terminated string.
            let library = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
            if library.is_null() {
                last_error = dl_error();
                debug!(library = ?name, error = %last_error, "Guest library not loaded");
                continue;
            }

            // SAFETY: `library` is a live handle returned by dlopen.
            return match unsafe { Self::resolve(library) } {
                Ok(lib) => Ok(lib),
                Err(e) => {
                    // SAFETY: the handle is not used after this point.
                    unsafe { libc::dlclose(library) };
                    Err(e)
                }
            };
        }

        Err(GuestLibError::Unavailable(last_error))
    }

    /// Resolve all entry points from an open library handle.
    ///
    /// # Safety
    ///
    /// `library` must be a live handle returned by `dlopen`.
    unsafe fn resolve(library: *mut c_void) -> Result<Self, GuestLibError> {
        Ok(Self {
            library,
            open_handle: symbol(library, c"VMGuestLib_OpenHandle")?,
            update_info: symbol(library, c"VMGuestLib_UpdateInfo")?,
            get_cpu_stolen_ms: symbol(library, c"VMGuestLib_GetCpuStolenMs")?,
            close_handle: symbol(library, c"VMGuestLib_CloseHandle")?,
            get_error_text: symbol(library, c"VMGuestLib_GetErrorText")?,
        })
    }

    fn call_error(&self, call: &'static str, code: c_int) -> GuestLibError {
        // SAFETY: GetErrorText accepts any code and returns a static string or null.
        let text = unsafe { (self.get_error_text)(code) };
        let message = if text.is_null() {
            String::from("unknown error")
        } else {
            // SAFETY: non-null results point at NUL-terminated static text.
            unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
        };
        GuestLibError::Call {
            call,
            code,
            message,
        }
    }
}

impl GuestLib for VmGuestLib {
    type Handle = VmGuestHandle;

    fn open(&self) -> Result<VmGuestHandle, GuestLibError> {
        let mut raw: RawHandle = std::ptr::null_mut();
        // SAFETY: `raw` is a valid out-pointer for the lifetime of the call.
        let code = unsafe { (self.open_handle)(&mut raw) };
        if code != VMGUESTLIB_ERROR_SUCCESS {
            return Err(self.call_error("VMGuestLib_OpenHandle", code));
        }
        Ok(VmGuestHandle(raw))
    }

    fn stolen_ms(&self, handle: &mut VmGuestHandle) -> Result<u64, GuestLibError> {
        // SAFETY: the handle came from a successful OpenHandle and is not closed.
        let code = unsafe { (self.update_info)(handle.0) };
        if code != VMGUESTLIB_ERROR_SUCCESS {
            return Err(self.call_error("VMGuestLib_UpdateInfo", code));
        }

        let mut stolen_ms: u64 = 0;
        // SAFETY: as above; `stolen_ms` is a valid out-pointer.
        let code = unsafe { (self.get_cpu_stolen_ms)(handle.0, &mut stolen_ms) };
        if code != VMGUESTLIB_ERROR_SUCCESS {
            return Err(self.call_error("VMGuestLib_GetCpuStolenMs", code));
        }
        Ok(stolen_ms)
    }

    fn close(&self, handle: VmGuestHandle) {
        // SAFETY: the handle is consumed, so it cannot be closed twice.
        let code = unsafe { (self.close_handle)(handle.0) };
        if code != VMGUESTLIB_ERROR_SUCCESS {
            let error = self.call_error("VMGuestLib_CloseHandle", code);
            debug!(%error, "Guest handle close failed");
        }
    }
}

impl Drop for VmGuestLib {
    fn drop(&mut self) {
        // SAFETY: `library` came from dlopen and is closed exactly once.
        unsafe { libc::dlclose(self.library) };
    }
}

impl std::fmt::Debug for VmGuestLib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmGuestLib")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

/// Look up `name` and reinterpret it as a function pointer of type `T`.
///
/// # Safety
///
/// `library` must be a live dlopen handle and `T` must be the function
/// pointer type matching the symbol's C signature.
unsafe fn symbol<T: Copy>(library: *mut c_void, name: &'static CStr) -> Result<T, GuestLibError> {
    let sym = libc::dlsym(library, name.as_ptr());
    if sym.is_null() {
        return Err(GuestLibError::MissingSymbol {
            symbol: name.to_str().unwrap_or("<non-utf8>"),
            message: dl_error(),
        });
    }
    Ok(std::mem::transmute_copy::<*mut c_void, T>(&sym))
}

/// Last dynamic loader error text.
fn dl_error() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated thread-local string.
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        String::from("unknown dynamic loader error")
    } else {
        // SAFETY: checked non-null above.
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}
