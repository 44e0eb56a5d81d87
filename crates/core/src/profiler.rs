//! Frame timing
//!
//! [`ProfilerScope`] logs a span at trace level when it ends. [`FrameTimer`] keeps
//! smoothed per-frame and per-step wall times plus how fast the run advances
//! against the wall clock.
use std::time::Instant;
use tracing::trace;

/// Wall-clock span logged at trace level on drop
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!("{} took {:.3} ms", self.name, self.elapsed_ms());
    }
}

/// Smoothed frame statistics
#[derive(Debug, Clone, Default)]
pub struct FrameTimer {
    last_frame_ms: f64,
    frame_ms: f64,
    step_ms: f64,
    simulated_s: f64,
    wall_s: f64,
    frames: u64,
}

impl FrameTimer {
    /// Weight of the newest frame in the moving averages
    const SMOOTHING: f64 = 0.1;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame of `steps` time steps covering `simulated_s` seconds of
    /// simulation in `frame_ms` of wall time
    pub fn record(&mut self, frame_ms: f64, steps: u32, simulated_s: f64) {
        self.last_frame_ms = frame_ms;
        let per_step = if steps == 0 { 0.0 } else { frame_ms / f64::from(steps) };
        if self.frames == 0 {
            self.frame_ms = frame_ms;
            self.step_ms = per_step;
        } else {
            self.frame_ms += Self::SMOOTHING * (frame_ms - self.frame_ms);
            if steps > 0 {
                self.step_ms += Self::SMOOTHING * (per_step - self.step_ms);
            }
        }
        self.simulated_s += simulated_s;
        self.wall_s += frame_ms / 1000.0;
        self.frames += 1;
    }

    #[must_use]
    pub fn last_frame_time_ms(&self) -> f64 {
        self.last_frame_ms
    }

    /// Exponential moving average of the frame time
    #[must_use]
    pub fn average_frame_time_ms(&self) -> f64 {
        self.frame_ms
    }

    /// Exponential moving average of the wall time per time step
    #[must_use]
    pub fn average_step_time_ms(&self) -> f64 {
        self.step_ms
    }

    /// Simulated seconds per wall-clock second over every recorded frame
    #[must_use]
    pub fn realtime_factor(&self) -> f64 {
        if self.wall_s > 0.0 {
            self.simulated_s / self.wall_s
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_profiler_scope_measures_time() {
        let scope = ProfilerScope::new("test");
        thread::sleep(Duration::from_millis(10));
        let elapsed = scope.elapsed_ms();
        assert!(elapsed >= 10.0, "Expected at least 10ms, got {elapsed}");
    }

    #[test]
    fn test_frame_and_step_averages() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.realtime_factor(), 0.0);

        timer.record(16.0, 8, 0.4);
        assert_eq!(timer.average_frame_time_ms(), 16.0);
        assert_eq!(timer.average_step_time_ms(), 2.0);

        timer.record(6.0, 2, 0.1);
        assert_eq!(timer.last_frame_time_ms(), 6.0);
        assert_relative_eq!(timer.average_frame_time_ms(), 15.0, epsilon = 1e-9);
        assert_relative_eq!(timer.average_step_time_ms(), 2.1, epsilon = 1e-9);
        assert_eq!(timer.frames(), 2);

        // 0.5 s simulated in 22 ms
        assert_relative_eq!(timer.realtime_factor(), 0.5 / 0.022, epsilon = 1e-9);
    }

    #[test]
    fn test_paused_frame_keeps_step_average() {
        let mut timer = FrameTimer::new();
        timer.record(10.0, 5, 0.1);
        timer.record(1.0, 0, 0.0);
        assert_eq!(timer.average_step_time_ms(), 2.0);
    }
}
