//! Adaptive simulation cadence
//!
//! [`CadenceController`] regulates `render_step`, the number of simulation
//! steps executed per rendered frame. Once per measurement window it compares
//! the wall time per step with the previous window: faster steps (or a long
//! stable stretch) probe one step more, slower steps back off by one. The value
//! moves by at most one per window and never drops below 1.

use crate::config::CadenceConfig;
use std::time::Instant;
use tracing::debug;

/// Outcome of one measurement window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceDecision {
    Increase,
    Decrease,
    Hold,
}

/// Closed-loop `render_step` regulator
#[derive(Debug, Clone)]
pub struct CadenceController {
    config: CadenceConfig,
    render_step: u32,
    previous_per_step: Option<f64>,
    stable_windows: u32,
    window_start: Option<Instant>,
    window_steps: u64,
}

impl CadenceController {
    /// Start at `render_step`, clamped to `[1, max_render_step]`
    #[must_use]
    pub fn new(config: CadenceConfig, render_step: u32) -> Self {
        Self {
            render_step: render_step.clamp(1, config.max_render_step.max(1)),
            config,
            previous_per_step: None,
            stable_windows: 0,
            window_start: None,
            window_steps: 0,
        }
    }

    #[must_use]
    pub fn render_step(&self) -> u32 {
        self.render_step
    }

    /// Windows since the last change
    #[must_use]
    pub fn stable_windows(&self) -> u32 {
        self.stable_windows
    }

    /// Replace the tuning, keeping the measurement history
    pub fn set_config(&mut self, config: CadenceConfig) {
        self.config = config;
        self.render_step = self.render_step.clamp(1, config.max_render_step.max(1));
    }

    /// Override `render_step` and restart the measurement
    pub fn set_render_step(&mut self, render_step: u32) {
        self.render_step = render_step.clamp(1, self.config.max_render_step.max(1));
        self.previous_per_step = None;
        self.stable_windows = 0;
        self.window_start = None;
        self.window_steps = 0;
    }

    /// Feed the per-step wall time of one finished window
    ///
    /// The first window only establishes the baseline.
    pub fn evaluate(&mut self, per_step_secs: f64) -> CadenceDecision {
        let Some(previous) = self.previous_per_step.replace(per_step_secs) else {
            return CadenceDecision::Hold;
        };
        let ratio = if previous > 0.0 {
            per_step_secs / previous
        } else {
            1.0
        };

        let decision = if ratio < self.config.speedup_ratio || self.stable_windows > self.config.stable_windows {
            self.stable_windows = 0;
            if self.render_step < self.config.max_render_step.max(1) {
                self.render_step += 1;
                CadenceDecision::Increase
            } else {
                CadenceDecision::Hold
            }
        } else if ratio > self.config.slowdown_ratio {
            self.stable_windows = 0;
            if self.render_step > 1 {
                self.render_step -= 1;
                CadenceDecision::Decrease
            } else {
                CadenceDecision::Hold
            }
        } else {
            self.stable_windows += 1;
            CadenceDecision::Hold
        };
        debug!(
            "Cadence window: ratio {:.4}, {:?}, render_step {}",
            ratio, decision, self.render_step
        );
        decision
    }

    /// Account for a frame that ran `steps` steps, finishing at `now`
    ///
    /// Returns the decision when the frame closes a measurement window.
    pub fn record_frame(&mut self, now: Instant, steps: u32) -> Option<CadenceDecision> {
        let Some(start) = self.window_start else {
            // The first frame opens the window
            self.window_start = Some(now);
            self.window_steps = 0;
            return None;
        };
        self.window_steps += u64::from(steps);
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        if elapsed < self.config.window_secs || self.window_steps == 0 {
            return None;
        }
        let per_step = elapsed / self.window_steps as f64;
        self.window_start = Some(now);
        self.window_steps = 0;
        Some(self.evaluate(per_step))
    }
}
