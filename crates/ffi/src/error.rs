use celeris_core::CelerisError;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

/// Common interface for errors crossing the FFI boundary.
///
/// - `code()` is the value returned to the caller
/// - `msg()` is kept for `celeris_get_last_error`
pub(crate) trait FfiError {
    /// Returns the error code to be returned across the FFI boundary.
    fn code(&self) -> CelerisErrorCode;

    /// Returns the human-readable error message.
    fn msg(&self) -> &str;
}

/// Error code plus message, used for every failure the FFI layer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultFfiError {
    code: CelerisErrorCode,
    msg: String,
}

impl DefaultFfiError {
    /// Null pointer passed where non-null required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_instance"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: CelerisErrorCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Lock poisoned by a panic in another thread.
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: CelerisErrorCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// A string argument is not valid UTF-8.
    pub fn invalid_utf8(param_name: &str) -> Self {
        Self {
            code: CelerisErrorCode::InvalidParameter,
            msg: format!("Parameter '{param_name}' is not valid UTF-8"),
        }
    }

    /// Invalid parameter with a custom message.
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: CelerisErrorCode::InvalidParameter,
            msg: message,
        }
    }
}

impl FfiError for DefaultFfiError {
    fn code(&self) -> CelerisErrorCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

impl From<CelerisError> for DefaultFfiError {
    fn from(error: CelerisError) -> Self {
        let code = match &error {
            CelerisError::Config { .. } | CelerisError::Parse(_) => CelerisErrorCode::InvalidConfig,
            CelerisError::Io { .. } | CelerisError::MissingKernel { .. } => CelerisErrorCode::Io,
            CelerisError::DeviceLost(_) => CelerisErrorCode::DeviceLost,
            CelerisError::Readback { .. } => CelerisErrorCode::Readback,
            CelerisError::Binding { .. }
            | CelerisError::DimensionMismatch { .. }
            | CelerisError::StaleHandle { .. }
            | CelerisError::UnknownPass(_) => CelerisErrorCode::Simulation,
        };
        Self {
            code,
            msg: error.to_string(),
        }
    }
}

/// FFI error codes returned by Celeris functions.
/// Follows standard C convention: 0 = success, non-zero = error.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelerisErrorCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Invalid pointer: null pointer passed where non-null required.
    NullPointer = 1,

    /// Lock poisoned: internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 2,

    /// Scenario or configuration JSON is malformed or out of range.
    InvalidConfig = 3,

    /// Invalid parameter passed to function.
    InvalidParameter = 4,

    /// Kernel source or scenario file could not be read.
    Io = 5,

    /// A pass could not be prepared or run. The instance should be destroyed.
    Simulation = 6,

    /// The compute device was lost. The instance must be destroyed.
    DeviceLost = 7,

    /// A field readback failed. Stepping may continue.
    Readback = 8,
}

impl From<DefaultFfiError> for CelerisErrorCode {
    fn from(error: DefaultFfiError) -> Self {
        error.code
    }
}

thread_local! {
    /// Most recent FFI error on this thread (C string, error code).
    /// The CString is owned here so the pointer handed out stays valid.
    static LAST_ERROR: RefCell<(Option<CString>, CelerisErrorCode)> = const { RefCell::new((None, CelerisErrorCode::Ok)) };
}

/// Read `LAST_ERROR` (cstring, code).
pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, CelerisErrorCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

/// Mutate `LAST_ERROR` (cstring, code).
pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, CelerisErrorCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent FFI error message as a null-terminated C string.
///
/// Returns:
/// - A borrowed pointer to the error message if an error occurred.
/// - `null` if no error has occurred on this thread.
///
/// # Thread Safety
/// Error state is per thread.
///
/// # Lifetime
/// The returned pointer is valid until the next failing FFI call on this
/// thread. **DO NOT FREE THIS POINTER**.
///
/// Example:
/// ```cpp
/// CelerisInstance* sim = nullptr;
/// CelerisErrorCode err = celeris_new(scenario_json, nullptr, &sim);
/// if (err != CelerisErrorCode::Ok) {
///     const char* error = celeris_get_last_error();
///     if (error) {
///         printf("Celeris creation failed: %s\n", error);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn celeris_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent FFI error code.
///
/// Returns `CelerisErrorCode::Ok` if no error has occurred on this thread.
#[no_mangle]
pub extern "C" fn celeris_get_last_error_code() -> CelerisErrorCode {
    with_last_error(|(_cstring, code)| *code)
}

/// Forget the last error on this thread.
#[no_mangle]
pub extern "C" fn celeris_clear_last_error() {
    crate::helpers::clear_last_error();
}
