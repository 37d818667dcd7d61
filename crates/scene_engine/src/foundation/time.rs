//! Frame timing

use std::time::{Duration, Instant};

/// Longest step handed to the application; a stall (debugger, window drag)
/// would otherwise arrive as one huge delta.
const MAX_STEP: Duration = Duration::from_millis(250);

/// Wall-clock frame timer
pub struct Timer {
    last_tick: Instant,
    step: f32,
    elapsed: f64,
    frames: u64,
    max_step: Duration,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Start timing from now
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
            step: 0.0,
            elapsed: 0.0,
            frames: 0,
            max_step: MAX_STEP,
        }
    }

    /// Override the clamp applied to wall-clock steps
    pub fn with_max_step(mut self, max_step: Duration) -> Self {
        self.max_step = max_step;
        self
    }

    /// Sample the clock and return the step in seconds
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let step = now.duration_since(self.last_tick).min(self.max_step);
        self.last_tick = now;
        self.advance(step.as_secs_f32());
        self.step
    }

    /// Count a frame with an explicit step
    pub fn advance(&mut self, step: f32) {
        self.step = step.max(0.0);
        self.elapsed += f64::from(self.step);
        self.frames += 1;
    }

    /// Step of the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.step
    }

    /// Seconds accumulated over all frames
    pub fn total_time(&self) -> f64 {
        self.elapsed
    }

    /// Frames counted so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Mean frame rate, zero before any time has passed
    pub fn average_fps(&self) -> f64 {
        if self.elapsed > 0.0 {
            self.frames as f64 / self.elapsed
        } else {
            0.0
        }
    }
}
