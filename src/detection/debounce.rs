//! Debouncer: one detection call after the document stops changing

use instant::Instant;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    last_change: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet_ms: u64) -> Self {
        Self { quiet: Duration::from_millis(quiet_ms), last_change: None }
    }

    pub fn quiet_ms(&self) -> u64 {
        self.quiet.as_millis() as u64
    }

    pub fn notify_change(&mut self) {
        self.notify_change_at(Instant::now());
    }

    pub fn notify_change_at(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_change.is_some()
    }

    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    pub fn is_due_at(&self, now: Instant) -> bool {
        match self.last_change {
            Some(changed) => now >= changed + self.quiet,
            None => false,
        }
    }

    /// Consume the pending change if its quiet interval has passed
    pub fn take_due_at(&mut self, now: Instant) -> bool {
        if self.is_due_at(now) {
            self.last_change = None;
            true
        } else {
            false
        }
    }

    pub fn take_due(&mut self) -> bool {
        self.take_due_at(Instant::now())
    }

    pub fn cancel(&mut self) {
        self.last_change = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_pending_is_never_due() {
        let debouncer = Debouncer::new(500);
        assert!(!debouncer.is_due());
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_rapid_edits_coalesce() {
        let mut debouncer = Debouncer::new(500);
        let start = Instant::now();

        debouncer.notify_change_at(start);
        debouncer.notify_change_at(start + Duration::from_millis(300));

        assert!(!debouncer.is_due_at(start + Duration::from_millis(600)));
        assert!(debouncer.take_due_at(start + Duration::from_millis(800)));
        assert!(!debouncer.take_due_at(start + Duration::from_millis(900)));
    }

    #[test]
    fn test_cancel_clears_pending() {
        let mut debouncer = Debouncer::new(10);
        let start = Instant::now();
        debouncer.notify_change_at(start);
        debouncer.cancel();
        assert!(!debouncer.is_due_at(start + Duration::from_secs(1)));
    }
}
