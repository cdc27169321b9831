// Frame timing: FPS display and optional frame-rate cap

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub fps: f32,
    pub frame_ms: f32,
}

/// Counts frames and reports once per second
pub struct FpsCounter {
    frame_count: u32,
    last_report: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_report: now,
            last_frame: now,
        }
    }

    /// Call once per rendered frame
    pub fn tick(&mut self, now: Instant) -> Option<FpsSample> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_report).as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }

        let sample = FpsSample {
            fps: self.frame_count as f32 / elapsed,
            frame_ms: frame_time * 1000.0,
        };
        self.frame_count = 0;
        self.last_report = now;
        Some(sample)
    }
}

/// How the event loop should wait before the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Nothing to draw (minimized); sleep until an event arrives
    Idle,
    /// Capped and early; sleep until the deadline
    Sleep(Instant),
    /// Draw now and keep the loop spinning
    Redraw,
}

/// Paces frames to a target rate. A rate of 0 disables the cap.
pub struct FrameLimiter {
    frame_time: Option<Duration>,
    next_frame: Option<Instant>,
}

impl FrameLimiter {
    pub fn new(fps: u32) -> Self {
        Self {
            frame_time: (fps > 0).then(|| Duration::from_secs(1) / fps),
            next_frame: None,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.frame_time.is_some()
    }

    /// When the next frame may start, or None when uncapped.
    ///
    /// Deadlines advance in fixed steps so the average rate holds; after a
    /// stall of more than one frame it resyncs to `now` instead of bursting.
    pub fn next_deadline(&mut self, now: Instant) -> Option<Instant> {
        let frame_time = self.frame_time?;
        let deadline = match self.next_frame {
            Some(next) if next + frame_time >= now => next,
            _ => now,
        };
        Some(deadline)
    }

    /// Decide how to wait after the current batch of events
    pub fn pacing(&mut self, now: Instant, minimized: bool) -> Pacing {
        if minimized {
            return Pacing::Idle;
        }
        match self.next_deadline(now) {
            Some(deadline) if deadline > now => Pacing::Sleep(deadline),
            _ => Pacing::Redraw,
        }
    }

    /// Record that a frame was started at `now`
    pub fn frame_started(&mut self, now: Instant) {
        if let Some(frame_time) = self.frame_time {
            let base = match self.next_frame {
                Some(next) if next + frame_time >= now => next,
                _ => now,
            };
            self.next_frame = Some(base + frame_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reported_once_per_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for i in 1..60 {
            assert_eq!(counter.tick(start + Duration::from_millis(i * 16)), None);
        }
        let sample = counter.tick(start + Duration::from_millis(1000)).unwrap();
        assert!((sample.fps - 60.0).abs() < 0.01, "{}", sample.fps);
        assert!((sample.frame_ms - 56.0).abs() < 0.01, "{}", sample.frame_ms);

        // Counter restarts after a report
        assert_eq!(counter.tick(start + Duration::from_millis(1016)), None);
    }

    #[test]
    fn unlimited_has_no_deadline() {
        let mut limiter = FrameLimiter::new(0);
        assert!(!limiter.is_limited());
        limiter.frame_started(Instant::now());
        assert_eq!(limiter.next_deadline(Instant::now()), None);
    }

    #[test]
    fn limited_frames_are_spaced_evenly() {
        let start = Instant::now();
        let mut limiter = FrameLimiter::new(50);
        let step = Duration::from_millis(20);

        assert_eq!(limiter.next_deadline(start), Some(start));
        limiter.frame_started(start);
        assert_eq!(limiter.next_deadline(start + Duration::from_millis(5)), Some(start + step));

        // Starting a little late keeps the fixed cadence
        limiter.frame_started(start + step + Duration::from_millis(3));
        assert_eq!(limiter.next_deadline(start + step), Some(start + step * 2));
    }

    #[test]
    fn limiter_resyncs_after_a_stall() {
        let start = Instant::now();
        let mut limiter = FrameLimiter::new(50);
        limiter.frame_started(start);

        let late = start + Duration::from_millis(500);
        assert_eq!(limiter.next_deadline(late), Some(late));
        limiter.frame_started(late);
        assert_eq!(limiter.next_deadline(late), Some(late + Duration::from_millis(20)));
    }

    #[test]
    fn uncapped_loop_redraws_continuously() {
        let mut limiter = FrameLimiter::new(0);
        let now = Instant::now();
        assert_eq!(limiter.pacing(now, false), Pacing::Redraw);
        limiter.frame_started(now);
        assert_eq!(limiter.pacing(now, false), Pacing::Redraw);
    }

    #[test]
    fn capped_loop_sleeps_until_the_deadline() {
        let start = Instant::now();
        let mut limiter = FrameLimiter::new(50);
        assert_eq!(limiter.pacing(start, false), Pacing::Redraw);

        limiter.frame_started(start);
        let early = start + Duration::from_millis(5);
        assert_eq!(limiter.pacing(early, false), Pacing::Sleep(start + Duration::from_millis(20)));

        let due = start + Duration::from_millis(20);
        assert_eq!(limiter.pacing(due, false), Pacing::Redraw);
    }

    #[test]
    fn minimized_window_idles() {
        let now = Instant::now();
        assert_eq!(FrameLimiter::new(0).pacing(now, true), Pacing::Idle);
        assert_eq!(FrameLimiter::new(60).pacing(now, true), Pacing::Idle);
    }
}
