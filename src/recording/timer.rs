//! Recording duration tracking.
//!
//! Elapsed time is recomputed from wall-clock deltas rather than counted
//! by ticks, so display refresh jitter cannot drift the total: while
//! running the duration is `accumulated + (now - run_started)`, and a
//! pause folds the running span into `accumulated`.

use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct RecordingTimer {
    accumulated: Duration,
    run_started: Option<Instant>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh recording; any previous accumulation is discarded.
    pub fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.run_started = Some(Instant::now());
    }

    /// Freezes the timer, folding the running span into the accumulator.
    pub fn pause(&mut self) {
        if let Some(started) = self.run_started.take() {
            self.accumulated += started.elapsed();
        }
    }

    /// Resumes from the accumulated duration. No-op while running.
    pub fn resume(&mut self) {
        if self.run_started.is_none() {
            self.run_started = Some(Instant::now());
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
            + self
                .run_started
                .map(|started| started.elapsed())
                .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn elapsed_is_non_decreasing_while_running() {
        let mut timer = RecordingTimer::new();
        timer.start();
        let mut previous = timer.elapsed();
        for _ in 0..5 {
            sleep(Duration::from_millis(2));
            let now = timer.elapsed();
            assert!(now >= previous);
            previous = now;
        }
    }

    #[test]
    fn elapsed_is_frozen_while_paused() {
        let mut timer = RecordingTimer::new();
        timer.start();
        sleep(Duration::from_millis(5));
        timer.pause();

        let frozen = timer.elapsed();
        sleep(Duration::from_millis(10));
        assert_eq!(timer.elapsed(), frozen);
        assert!(!timer.is_running());
    }

    #[test]
    fn resume_continues_from_accumulated_duration() {
        let mut timer = RecordingTimer::new();
        timer.start();
        sleep(Duration::from_millis(5));
        timer.pause();
        let at_pause = timer.elapsed();

        timer.resume();
        sleep(Duration::from_millis(5));
        assert!(timer.elapsed() > at_pause);
        // The pause gap itself is never counted.
        assert!(timer.elapsed() < at_pause + Duration::from_secs(1));
    }

    #[test]
    fn start_resets_previous_accumulation() {
        let mut timer = RecordingTimer::new();
        timer.start();
        sleep(Duration::from_millis(5));
        timer.pause();
        assert!(timer.elapsed() > Duration::ZERO);

        timer.start();
        assert!(timer.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let mut timer = RecordingTimer::new();
        timer.start();
        timer.pause();
        timer.pause();
        let frozen = timer.elapsed();
        timer.resume();
        timer.resume();
        sleep(Duration::from_millis(2));
        assert!(timer.elapsed() >= frozen);
    }
}
