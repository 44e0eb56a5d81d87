use celeris_core::{CelerisError, ConfigPatch};
use std::os::raw::c_char;

use crate::error::CelerisErrorCode;
use crate::helpers::{handle_ffi_result, instance_from_ptr, str_from_ptr, with_simulation};
use crate::instance::CelerisInstance;

/// C-compatible summary of one rendered frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CelerisFrameReport {
    /// Full time steps run by the frame
    pub steps: u32,
    /// Steps the next frame will run
    pub render_step: u32,
    /// Simulation time after the frame (seconds)
    pub time: f64,
    /// Wall time of the frame (milliseconds)
    pub frame_ms: f64,
}

/// C-compatible outcome of a configuration patch.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CelerisPatchOutcome {
    /// Every field was reallocated and the run restarted from t = 0
    pub reinitialized: bool,
    /// Dispersion coefficients will be rebuilt on the next step
    pub refresh_coefficients: bool,
    /// Number of settings that changed
    pub changed: u32,
}

/// Run one frame of `render_step` time steps.
///
/// A paused instance returns a report with `steps == 0`.
///
/// Returns
/// - `CelerisErrorCode::Ok` on success
/// - `CelerisErrorCode::DeviceLost` / `Simulation` on fatal errors; destroy the instance
///
/// # Safety
/// - `instance` must be a valid pointer returned by `celeris_new`.
/// - `out_report` may be null; otherwise it must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn celeris_run_frame(
    instance: *const CelerisInstance,
    out_report: *mut CelerisFrameReport,
) -> CelerisErrorCode {
    handle_ffi_result(|| {
        let instance = instance_from_ptr(instance)?;
        let report = with_simulation(instance, |sim| Ok(sim.run_frame()?))?;
        if !out_report.is_null() {
            // SAFETY: caller guarantees a non-null `out_report` is writable
            unsafe {
                *out_report = CelerisFrameReport {
                    steps: report.steps,
                    render_step: report.render_step,
                    time: report.time,
                    frame_ms: report.frame_ms,
                };
            }
        }
        Ok(())
    })
}

/// Advance exactly one time step, ignoring the paused flag.
///
/// # Safety
/// `instance` must be a valid pointer returned by `celeris_new`.
#[no_mangle]
pub unsafe extern "C" fn celeris_step(instance: *const CelerisInstance) -> CelerisErrorCode {
    handle_ffi_result(|| {
        let instance = instance_from_ptr(instance)?;
        with_simulation(instance, |sim| Ok(sim.step()?))
    })
}

/// Pause (`paused == true`) or resume stepping in `celeris_run_frame`.
///
/// # Safety
/// `instance` must be a valid pointer returned by `celeris_new`.
#[no_mangle]
pub unsafe extern "C" fn celeris_set_paused(instance: *const CelerisInstance, paused: bool) -> CelerisErrorCode {
    handle_ffi_result(|| {
        let instance = instance_from_ptr(instance)?;
        with_simulation(instance, |sim| {
            if paused {
                sim.pause();
            } else {
                sim.resume();
            }
            Ok(())
        })
    })
}

/// Restart from the initial condition, reallocating every field.
///
/// # Safety
/// `instance` must be a valid pointer returned by `celeris_new`.
#[no_mangle]
pub unsafe extern "C" fn celeris_reset(instance: *const CelerisInstance) -> CelerisErrorCode {
    handle_ffi_result(|| {
        let instance = instance_from_ptr(instance)?;
        with_simulation(instance, |sim| Ok(sim.reinitialize()?))
    })
}

/// Restart the running means and wave-height statistics.
///
/// # Safety
/// `instance` must be a valid pointer returned by `celeris_new`.
#[no_mangle]
pub unsafe extern "C" fn celeris_reset_statistics(instance: *const CelerisInstance) -> CelerisErrorCode {
    handle_ffi_result(|| {
        let instance = instance_from_ptr(instance)?;
        with_simulation(instance, |sim| Ok(sim.reset_statistics()?))
    })
}

/// Apply a partial configuration given as JSON, e.g. `{"friction": 0.02}`.
///
/// Changes to the grid, equations or enabled subsystems reinitialize the run.
/// On error the configuration is left unchanged.
///
/// Returns
/// - `CelerisErrorCode::Ok` on success
/// - `CelerisErrorCode::InvalidConfig` if the JSON is malformed or the result invalid
///
/// # Safety
/// - `instance` must be a valid pointer returned by `celeris_new`.
/// - `patch_json` must be a valid null-terminated string.
/// - `out_outcome` may be null; otherwise it must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn celeris_apply_patch(
    instance: *const CelerisInstance,
    patch_json: *const c_char,
    out_outcome: *mut CelerisPatchOutcome,
) -> CelerisErrorCode {
    handle_ffi_result(|| {
        let instance = instance_from_ptr(instance)?;
        let json = str_from_ptr(patch_json, "patch_json")?;
        let patch: ConfigPatch = serde_json::from_str(json).map_err(CelerisError::from)?;
        let outcome = with_simulation(instance, |sim| Ok(sim.apply_config_patch(&patch)?))?;
        if !out_outcome.is_null() {
            // SAFETY: caller guarantees a non-null `out_outcome` is writable
            unsafe {
                *out_outcome = CelerisPatchOutcome {
                    reinitialized: outcome.requires_reinit,
                    refresh_coefficients: outcome.refresh_coefficients,
                    changed: u32::try_from(outcome.changed.len()).unwrap_or(u32::MAX),
                };
            }
        }
        Ok(())
    })
}
