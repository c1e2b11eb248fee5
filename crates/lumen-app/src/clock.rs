//! Frame timing owned by the run loop.

use std::time::{Duration, Instant};

const FPS_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Elapsed time, frame time and a once-per-second FPS sample.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    frame_time: f32,
    frame_number: u64,
    fps: f32,
    sample_start: Instant,
    sample_frames: u32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Clock whose epoch is `now`.
    pub const fn starting_at(now: Instant) -> Self {
        Self {
            start: now,
            last_tick: now,
            frame_time: 0.0,
            frame_number: 0,
            fps: 0.0,
            sample_start: now,
            sample_frames: 0,
        }
    }

    /// Advance to the next frame.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Advance to the next frame at `now`.
    pub fn tick_at(&mut self, now: Instant) {
        self.frame_time = now.saturating_duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        self.frame_number += 1;
        self.sample_frames += 1;

        let window = now.saturating_duration_since(self.sample_start);
        if window >= FPS_SAMPLE_PERIOD {
            self.fps = self.sample_frames as f32 / window.as_secs_f32();
            self.sample_start = now;
            self.sample_frames = 0;
        }
    }

    /// Seconds since the clock started, as of the last tick.
    pub fn elapsed(&self) -> f32 {
        self.last_tick
            .saturating_duration_since(self.start)
            .as_secs_f32()
    }

    /// Seconds between the last two ticks.
    pub const fn frame_time(&self) -> f32 {
        self.frame_time
    }

    /// Frames per second over the last completed one-second window.
    pub const fn fps(&self) -> f32 {
        self.fps
    }

    /// Number of ticks so far.
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
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
    fn fresh_clock_is_zeroed() {
        let clock = FrameClock::starting_at(Instant::now());
        assert_eq!(clock.frame_number(), 0);
        assert!(clock.frame_time().abs() < f32::EPSILON);
        assert!(clock.fps().abs() < f32::EPSILON);
    }

    #[test]
    fn frame_time_is_delta_between_ticks() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        clock.tick_at(start + Duration::from_millis(16));
        clock.tick_at(start + Duration::from_millis(50));
        assert!((clock.frame_time() - 0.034).abs() < 1e-4);
        assert!((clock.elapsed() - 0.05).abs() < 1e-4);
        assert_eq!(clock.frame_number(), 2);
    }

    #[test]
    fn fps_is_sampled_once_per_second() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        for i in 1..=59 {
            clock.tick_at(start + Duration::from_millis(i * 10));
        }
        // Less than a second has passed: no sample yet.
        assert!(clock.fps().abs() < f32::EPSILON);

        for i in 60..=100 {
            clock.tick_at(start + Duration::from_millis(i * 10));
        }
        assert!((clock.fps() - 100.0).abs() < 0.5);

        // Stays put until the next window closes.
        clock.tick_at(start + Duration::from_millis(1500));
        assert!((clock.fps() - 100.0).abs() < 0.5);
    }
}
