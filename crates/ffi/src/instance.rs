use celeris_core::{KernelSources, Scenario, Simulation};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Mutex;
use tracing::info;

use crate::error::{CelerisErrorCode, DefaultFfiError};
use crate::helpers::{str_from_ptr, track_error, track_result};

/// The Celeris simulation context.
///
/// # Thread Safety
/// The simulation sits behind a `Mutex`. Stepping and readback both need
/// exclusive access to the compute backend, so every call takes the lock for
/// its whole duration. Calls from a game thread and a render thread serialize.
///
/// # Usage
/// ```cpp
/// CelerisInstance* sim = nullptr;
/// if (celeris_new(scenario_json, "shaders/", &sim) != CelerisErrorCode::Ok) {
///     fprintf(stderr, "%s\n", celeris_get_last_error());
///     return;
/// }
/// CelerisFrameReport report;
/// celeris_run_frame(sim, &report);
/// // ...
/// celeris_destroy(sim);
/// ```
pub struct CelerisInstance {
    pub(crate) sim: Mutex<Simulation>,
}

impl CelerisInstance {
    /// Build a simulation from scenario JSON, with shaders from `kernel_dir` if given.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a malformed or invalid scenario and `Io` when
    /// the kernel directory cannot be read.
    pub(crate) fn new(scenario_json: &str, kernel_dir: Option<&str>) -> Result<Box<Self>, DefaultFfiError> {
        let scenario = Scenario::from_json(scenario_json)?;
        let sources = kernel_dir.map(KernelSources::from_dir).transpose()?;
        let sim = Simulation::from_scenario(&scenario, sources)?;
        info!(
            "Created Celeris instance: {}x{} on {}",
            scenario.config.width,
            scenario.config.height,
            sim.backend_name()
        );
        Ok(Box::new(Self { sim: Mutex::new(sim) }))
    }
}

/// Create a Celeris instance and return it via out-parameter.
///
/// Parameters
/// - `scenario_json`: null-terminated scenario JSON (`config`, `bathymetry`,
///   `initial_condition`; missing keys use defaults).
/// - `kernel_dir`: directory holding the WGSL kernels, or null to run on the CPU.
///   The GPU backend is used only when every kernel is present there.
/// - `out_instance`: receives the instance on success, null on failure.
///
/// Returns
/// - `CelerisErrorCode::Ok` on success
/// - `CelerisErrorCode::NullPointer` if `scenario_json` or `out_instance` is null
/// - `CelerisErrorCode::InvalidConfig` if the scenario is malformed or invalid
/// - `CelerisErrorCode::Io` if `kernel_dir` cannot be read
///
/// # Safety
///
/// - `scenario_json` and a non-null `kernel_dir` must be valid null-terminated strings.
/// - `out_instance` must be a valid pointer to writable memory.
/// - The caller owns the returned instance and MUST call `celeris_destroy` exactly once.
#[no_mangle]
pub unsafe extern "C" fn celeris_new(
    scenario_json: *const c_char,
    kernel_dir: *const c_char,
    out_instance: *mut *mut CelerisInstance,
) -> CelerisErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultFfiError::null_pointer("out_instance"));
    }

    let created = (|| {
        let json = str_from_ptr(scenario_json, "scenario_json")?;
        let dir = if kernel_dir.is_null() {
            None
        } else {
            Some(str_from_ptr(kernel_dir, "kernel_dir")?)
        };
        CelerisInstance::new(json, dir)
    })();

    match track_result(created) {
        Ok(instance) => {
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            CelerisErrorCode::Ok
        }
        Err(code) => {
            unsafe {
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Destroy an instance created by `celeris_new`, releasing every device resource.
///
/// A null `ptr` is a no-op.
///
/// # Safety
/// - The pointer MUST have been created by `celeris_new` and not destroyed already.
/// - The caller must not use the pointer afterwards.
#[no_mangle]
pub unsafe extern "C" fn celeris_destroy(ptr: *mut CelerisInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: created by `Box::into_raw` in `celeris_new`
    let instance = unsafe { Box::from_raw(ptr) };
    if let Ok(mut sim) = instance.sim.lock() {
        sim.teardown();
    }
    drop(instance);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::celeris_get_last_error_code;
    use std::ffi::CString;

    fn create(json: &str) -> *mut CelerisInstance {
        let json = CString::new(json).unwrap();
        let mut instance = ptr::null_mut();
        let code = unsafe { celeris_new(json.as_ptr(), ptr::null(), &mut instance) };
        assert_eq!(code, CelerisErrorCode::Ok);
        instance
    }

    #[test]
    fn test_create_and_destroy() {
        let instance = create(r#"{ "config": { "width": 16, "height": 16 } }"#);
        assert!(!instance.is_null());
        unsafe { celeris_destroy(instance) };
    }

    #[test]
    fn test_invalid_scenario_reports_config_error() {
        let json = CString::new(r#"{ "config": { "width": 2 } }"#).unwrap();
        let mut instance = ptr::null_mut();
        let code = unsafe { celeris_new(json.as_ptr(), ptr::null(), &mut instance) };
        assert_eq!(code, CelerisErrorCode::InvalidConfig);
        assert!(instance.is_null());
        assert_eq!(celeris_get_last_error_code(), CelerisErrorCode::InvalidConfig);
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        let json = CString::new("{}").unwrap();
        let code = unsafe { celeris_new(json.as_ptr(), ptr::null(), ptr::null_mut()) };
        assert_eq!(code, CelerisErrorCode::NullPointer);

        let mut instance = ptr::null_mut();
        let code = unsafe { celeris_new(ptr::null(), ptr::null(), &mut instance) };
        assert_eq!(code, CelerisErrorCode::NullPointer);
        unsafe { celeris_destroy(ptr::null_mut()) };
    }
}
