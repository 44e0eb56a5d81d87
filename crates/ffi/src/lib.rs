//! C API for the Celeris wave solver
//!
//! Instances are opaque pointers created from scenario JSON with
//! [`celeris_new`] and released with [`celeris_destroy`]. Every function
//! returns a [`CelerisErrorCode`]; the message of the last failure on the
//! calling thread is available from [`celeris_get_last_error`].
//!
//! The C header `CelerisFFI.h` is generated by the build script.

mod error;
mod helpers;
mod instance;
mod queries;
mod simulation;

pub use error::{celeris_clear_last_error, celeris_get_last_error, celeris_get_last_error_code, CelerisErrorCode};
pub use instance::{celeris_destroy, celeris_new, CelerisInstance};
pub use queries::{
    celeris_gauge_count, celeris_get_status, celeris_read_channel, celeris_read_gauge, CelerisField,
    CelerisGaugeSample, CelerisStatus,
};
pub use simulation::{
    celeris_apply_patch, celeris_reset, celeris_reset_statistics, celeris_run_frame, celeris_set_paused, celeris_step,
    CelerisFrameReport, CelerisPatchOutcome,
};
