use crate::error::{with_last_error_mut, CelerisErrorCode, DefaultFfiError, FfiError};
use crate::instance::CelerisInstance;
use celeris_core::Simulation;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Set the thread-local error message and code.
pub(crate) fn set_last_error(error: &impl FfiError) {
    with_last_error_mut(|(cstring, code)| {
        *cstring = CString::new(error.msg()).ok();
        *code = error.code();
    });
}

/// Record `error` and return its code.
#[inline]
pub(crate) fn track_error(error: &impl FfiError) -> CelerisErrorCode {
    set_last_error(error);
    error.code()
}

/// Record the error of a failed result, passing successes through.
pub(crate) fn track_result<T>(result: Result<T, DefaultFfiError>) -> Result<T, CelerisErrorCode> {
    result.map_err(|e| track_error(&e))
}

/// Run `f`, recording any error and collapsing the result into a code.
pub(crate) fn handle_ffi_result<F>(f: F) -> CelerisErrorCode
where
    F: FnOnce() -> Result<(), DefaultFfiError>,
{
    match track_result(f()) {
        Ok(()) => CelerisErrorCode::Ok,
        Err(code) => code,
    }
}

/// Clear the thread-local error message and code.
pub(crate) fn clear_last_error() {
    with_last_error_mut(|(cstring, code)| {
        *cstring = None;
        *code = CelerisErrorCode::Ok;
    });
}

/// Borrow an instance from a raw pointer, rejecting null.
pub(crate) fn instance_from_ptr<'a>(
    ptr: *const CelerisInstance,
) -> Result<&'a CelerisInstance, DefaultFfiError> {
    if ptr.is_null() {
        return Err(DefaultFfiError::null_pointer("instance"));
    }
    // SAFETY: non-null pointers must come from `celeris_new` and not be destroyed yet
    Ok(unsafe { &*ptr })
}

/// Lock the simulation and run `f` on it.
pub(crate) fn with_simulation<F, T>(instance: &CelerisInstance, f: F) -> Result<T, DefaultFfiError>
where
    F: FnOnce(&mut Simulation) -> Result<T, DefaultFfiError>,
{
    let mut sim = instance
        .sim
        .lock()
        .map_err(|_| DefaultFfiError::lock_poisoned("Mutex<Simulation>"))?;
    f(&mut sim)
}

/// Borrow a C string argument as UTF-8.
pub(crate) fn str_from_ptr<'a>(ptr: *const c_char, param_name: &str) -> Result<&'a str, DefaultFfiError> {
    if ptr.is_null() {
        return Err(DefaultFfiError::null_pointer(param_name));
    }
    // SAFETY: the caller passes a null-terminated string that outlives the call
    let cstr = unsafe { CStr::from_ptr(ptr) };
    cstr.to_str().map_err(|_| DefaultFfiError::invalid_utf8(param_name))
}
