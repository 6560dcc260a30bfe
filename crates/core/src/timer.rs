//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Measures per-frame delta time and total running time.
///
/// Call [`FrameClock::tick`] once per rendered frame.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    last_delta: Duration,
    frame_count: u64,
}

impl FrameClock {
    /// Create a new clock, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            last_delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Total time since the clock was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Total time in seconds since the clock was created or last reset.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Marks the start of a new frame and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.last_delta = now - self.last_tick;
        self.last_tick = now;
        self.frame_count += 1;
        self.last_delta
    }

    /// Delta of the most recent tick in seconds.
    #[inline]
    pub fn delta_secs(&self) -> f32 {
        self.last_delta.as_secs_f32()
    }

    /// Number of ticks since creation or last reset.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average frames per second over the clock's lifetime.
    pub fn average_fps(&self) -> f32 {
        let secs = self.elapsed_secs();
        if secs <= f32::EPSILON {
            0.0
        } else {
            self.frame_count as f32 / secs
        }
    }

    /// Reset the clock to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.last_delta = Duration::ZERO;
        self.frame_count = 0;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_has_no_frames() {
        let clock = FrameClock::new();
        assert_eq!(clock.frame_count(), 0);
        assert_eq!(clock.delta_secs(), 0.0);
    }

    #[test]
    fn test_tick_counts_frames() {
        let mut clock = FrameClock::new();
        std::thread::sleep(Duration::from_millis(2));
        let delta = clock.tick();
        clock.tick();
        assert_eq!(clock.frame_count(), 2);
        assert!(delta >= Duration::from_millis(2));
    }

    #[test]
    fn test_reset() {
        let mut clock = FrameClock::new();
        clock.tick();
        clock.reset();
        assert_eq!(clock.frame_count(), 0);
        assert_eq!(clock.delta_secs(), 0.0);
    }
}
