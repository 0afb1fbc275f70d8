//! Auto-DJ scheduling: when to start the next crossfade.

use std::time::Duration;

use tokio::time::Instant;

/// Shortest delay the timer is armed with.
const MIN_DELAY: Duration = Duration::from_millis(100);

/// Seconds from `position` until the next transition should begin.
///
/// The transition starts `crossfade` seconds before the trimmed end, so the
/// incoming track is at full level when the outgoing one reaches its end cut.
pub fn seconds_until_advance(
    duration_seconds: f64,
    end_cut_seconds: f64,
    crossfade_seconds: f64,
    position_seconds: f64,
) -> f64 {
    let trigger = ((duration_seconds - end_cut_seconds) - crossfade_seconds).max(0.0);
    (trigger - position_seconds).max(0.0)
}

/// One-shot auto-advance timer.
///
/// The engine owns exactly one; rescheduling replaces the old deadline so a
/// stale timer can never fire.
#[derive(Debug, Clone, Default)]
pub struct AutoAdvance {
    deadline: Option<Instant>,
}

impl AutoAdvance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer `delay_seconds` from now.
    pub fn schedule(&mut self, delay_seconds: f64) -> Instant {
        let delay = Duration::from_secs_f64(delay_seconds.max(0.0)).max(MIN_DELAY);
        let deadline = Instant::now() + delay;
        self.deadline = Some(deadline);
        deadline
    }

    /// Disarm. Returns true if a deadline was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return true when the deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
