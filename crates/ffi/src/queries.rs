use celeris_core::OutputField;
use std::slice;

use crate::error::{CelerisErrorCode, DefaultFfiError};
use crate::helpers::{handle_ffi_result, instance_from_ptr, with_simulation};
use crate::instance::CelerisInstance;

/// Fields that can be read back, mirroring `OutputField`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelerisField {
    /// (eta, P, Q, C)
    State = 0,
    /// (B north face, B east face, B centre, near-land flag)
    Bottom = 1,
    /// (h, near-dry flag, minimum neighbour depth, 0)
    NearDry = 2,
    /// (eddy viscosity, age, foam, 0)
    Breaking = 3,
    /// Running means of (eta, P, Q, eta^2)
    Means = 4,
    /// (max eta, min eta, significant height, max - min)
    WaveHeight = 5,
    /// Sediment concentration, only when sediment transport is enabled
    Sediment = 6,
}

impl From<CelerisField> for OutputField {
    fn from(field: CelerisField) -> Self {
        match field {
            CelerisField::State => Self::State,
            CelerisField::Bottom => Self::Bottom,
            CelerisField::NearDry => Self::NearDry,
            CelerisField::Breaking => Self::Breaking,
            CelerisField::Means => Self::Means,
            CelerisField::WaveHeight => Self::WaveHeight,
            CelerisField::Sediment => Self::Sediment,
        }
    }
}

/// C-compatible simulation status.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CelerisStatus {
    /// Grid width in cells
    pub width: u32,
    /// Grid height in cells
    pub height: u32,
    /// Simulation time (seconds)
    pub time: f64,
    /// Full time steps taken since the last (re)initialization
    pub step_count: u64,
    /// Steps per rendered frame
    pub render_step: u32,
    /// Steps folded into the running means
    pub statistics_samples: u32,
    /// Whether `celeris_run_frame` is paused
    pub paused: bool,
    /// Whether kernels run on the GPU
    pub is_gpu: bool,
}

/// C-compatible gauge sample.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CelerisGaugeSample {
    /// Simulation time (seconds)
    pub time: f64,
    /// Bed elevation
    pub bottom: f32,
    /// Free-surface elevation
    pub eta: f32,
    /// x discharge
    pub p: f32,
    /// y discharge
    pub q: f32,
}

/// Fill `out_status` with the current simulation status.
///
/// # Safety
/// - `instance` must be a valid pointer returned by `celeris_new`.
/// - `out_status` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn celeris_get_status(
    instance: *const CelerisInstance,
    out_status: *mut CelerisStatus,
) -> CelerisErrorCode {
    handle_ffi_result(|| {
        if out_status.is_null() {
            return Err(DefaultFfiError::null_pointer("out_status"));
        }
        let instance = instance_from_ptr(instance)?;
        let status = with_simulation(instance, |sim| {
            Ok(CelerisStatus {
                width: sim.config().width,
                height: sim.config().height,
                time: sim.time(),
                step_count: sim.step_count(),
                render_step: sim.render_step(),
                statistics_samples: sim.statistics_samples(),
                paused: sim.is_paused(),
                is_gpu: sim.is_gpu_accelerated(),
            })
        })?;
        // SAFETY: checked non-null above
        unsafe {
            *out_status = status;
        }
        Ok(())
    })
}

/// Copy one channel of a field into `buffer`, row-major with x fastest.
///
/// `buffer_len` must be at least `width * height`.
///
/// Returns
/// - `CelerisErrorCode::Ok` on success
/// - `CelerisErrorCode::InvalidParameter` if `channel > 3` or the buffer is too small
/// - `CelerisErrorCode::Readback` if the readback failed (stepping may continue)
///
/// # Safety
/// - `instance` must be a valid pointer returned by `celeris_new`.
/// - `buffer` must point to at least `buffer_len` writable floats.
#[no_mangle]
pub unsafe extern "C" fn celeris_read_channel(
    instance: *const CelerisInstance,
    field: CelerisField,
    channel: u32,
    buffer: *mut f32,
    buffer_len: usize,
) -> CelerisErrorCode {
    handle_ffi_result(|| {
        if buffer.is_null() {
            return Err(DefaultFfiError::null_pointer("buffer"));
        }
        if channel > 3 {
            return Err(DefaultFfiError::invalid_parameter(format!(
                "channel must be 0-3, got {channel}"
            )));
        }
        let instance = instance_from_ptr(instance)?;
        let values = with_simulation(instance, |sim| {
            Ok(sim.read_field_channel(field.into(), channel as usize)?)
        })?;
        if buffer_len < values.len() {
            return Err(DefaultFfiError::invalid_parameter(format!(
                "buffer holds {buffer_len} values, field has {}",
                values.len()
            )));
        }
        // SAFETY: caller guarantees `buffer_len` writable floats
        let out = unsafe { slice::from_raw_parts_mut(buffer, buffer_len) };
        out[..values.len()].copy_from_slice(&values);
        Ok(())
    })
}

/// Number of configured gauges.
///
/// # Safety
/// - `instance` must be a valid pointer returned by `celeris_new`.
/// - `out_count` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn celeris_gauge_count(
    instance: *const CelerisInstance,
    out_count: *mut u32,
) -> CelerisErrorCode {
    handle_ffi_result(|| {
        if out_count.is_null() {
            return Err(DefaultFfiError::null_pointer("out_count"));
        }
        let instance = instance_from_ptr(instance)?;
        let count = with_simulation(instance, |sim| Ok(sim.gauge_series().len()))?;
        // SAFETY: checked non-null above
        unsafe {
            *out_count = u32::try_from(count).unwrap_or(u32::MAX);
        }
        Ok(())
    })
}

/// Copy the most recent samples of gauge `index` into `buffer`, oldest first.
///
/// At most `buffer_len` samples are written; the number written goes to
/// `out_written`.
///
/// # Safety
/// - `instance` must be a valid pointer returned by `celeris_new`.
/// - `buffer` must point to at least `buffer_len` writable samples.
/// - `out_written` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn celeris_read_gauge(
    instance: *const CelerisInstance,
    index: u32,
    buffer: *mut CelerisGaugeSample,
    buffer_len: usize,
    out_written: *mut usize,
) -> CelerisErrorCode {
    handle_ffi_result(|| {
        if buffer.is_null() {
            return Err(DefaultFfiError::null_pointer("buffer"));
        }
        if out_written.is_null() {
            return Err(DefaultFfiError::null_pointer("out_written"));
        }
        let instance = instance_from_ptr(instance)?;
        // SAFETY: caller guarantees `buffer_len` writable samples
        let out = unsafe { slice::from_raw_parts_mut(buffer, buffer_len) };
        let written = with_simulation(instance, |sim| {
            let series = sim.gauge_series().get(index as usize).ok_or_else(|| {
                DefaultFfiError::invalid_parameter(format!("no gauge with index {index}"))
            })?;
            let skip = series.samples.len().saturating_sub(buffer_len);
            let recent = &series.samples[skip..];
            for (dst, src) in out.iter_mut().zip(recent) {
                *dst = CelerisGaugeSample {
                    time: src.time,
                    bottom: src.bottom,
                    eta: src.eta,
                    p: src.p,
                    q: src.q,
                };
            }
            Ok(recent.len())
        })?;
        // SAFETY: checked non-null above
        unsafe {
            *out_written = written;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{celeris_destroy, celeris_new};
    use crate::simulation::celeris_run_frame;
    use std::ffi::CString;
    use std::ptr;

    fn create() -> *mut CelerisInstance {
        let json = CString::new(
            r#"{
                "config": {
                    "width": 16, "height": 12, "render_step": 2,
                    "gauges": [{ "name": "mid", "x": 8, "y": 6 }]
                },
                "bathymetry": { "kind": "flat", "depth": 2.0 }
            }"#,
        )
        .unwrap();
        let mut instance = ptr::null_mut();
        let code = unsafe { celeris_new(json.as_ptr(), ptr::null(), &mut instance) };
        assert_eq!(code, CelerisErrorCode::Ok);
        instance
    }

    #[test]
    fn test_status_and_channel_readback() {
        let instance = create();
        let mut status = CelerisStatus::default();
        unsafe {
            assert_eq!(celeris_get_status(instance, &mut status), CelerisErrorCode::Ok);
        }
        assert_eq!((status.width, status.height), (16, 12));
        assert_eq!(status.step_count, 0);
        assert!(!status.is_gpu);

        let mut bottom = vec![0.0_f32; 16 * 12];
        let code = unsafe { celeris_read_channel(instance, CelerisField::Bottom, 2, bottom.as_mut_ptr(), bottom.len()) };
        assert_eq!(code, CelerisErrorCode::Ok);
        assert!(bottom.iter().all(|&b| b == -2.0));

        let mut small = vec![0.0_f32; 10];
        let code = unsafe { celeris_read_channel(instance, CelerisField::State, 0, small.as_mut_ptr(), small.len()) };
        assert_eq!(code, CelerisErrorCode::InvalidParameter);

        let code = unsafe { celeris_read_channel(instance, CelerisField::Sediment, 0, bottom.as_mut_ptr(), bottom.len()) };
        assert_eq!(code, CelerisErrorCode::Readback);
        unsafe { celeris_destroy(instance) };
    }

    #[test]
    fn test_gauge_samples_per_frame() {
        let instance = create();
        unsafe {
            celeris_run_frame(instance, ptr::null_mut());
            celeris_run_frame(instance, ptr::null_mut());
            celeris_run_frame(instance, ptr::null_mut());
        }
        let mut count = 0;
        unsafe {
            assert_eq!(celeris_gauge_count(instance, &mut count), CelerisErrorCode::Ok);
        }
        assert_eq!(count, 1);

        let mut samples = [CelerisGaugeSample::default(); 2];
        let mut written = 0;
        let code = unsafe { celeris_read_gauge(instance, 0, samples.as_mut_ptr(), samples.len(), &mut written) };
        assert_eq!(code, CelerisErrorCode::Ok);
        assert_eq!(written, 2);
        assert!(samples[1].time > samples[0].time);
        assert_eq!(samples[1].bottom, -2.0);

        let code = unsafe { celeris_read_gauge(instance, 5, samples.as_mut_ptr(), samples.len(), &mut written) };
        assert_eq!(code, CelerisErrorCode::InvalidParameter);
        unsafe { celeris_destroy(instance) };
    }
}
