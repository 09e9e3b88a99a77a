use crate::util::{elapsed_between, Instant};
use std::time::Duration;

/// Decides when the welcome banner may be repeated.
///
/// It fires once more than `after_messages` public messages were seen, or once
/// `window` passed since it last fired. Firing resets both.
#[derive(Debug, Clone)]
pub struct AnnounceThrottle {
    after_messages: usize,
    window: Duration,
    messages: usize,
    last: Instant,
}

impl AnnounceThrottle {
    pub const AFTER_MESSAGES: usize = 20;
    pub const WINDOW: Duration = Duration::from_secs(60 * 60);

    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    pub fn new_at(now: Instant) -> Self {
        Self::with_limits(Self::AFTER_MESSAGES, Self::WINDOW, now)
    }

    pub fn with_limits(after_messages: usize, window: Duration, now: Instant) -> Self {
        Self {
            after_messages,
            window,
            messages: 0,
            last: now,
        }
    }

    pub const fn messages(&self) -> usize {
        self.messages
    }

    /// Counts a public message. `true` means the banner should be sent now
    /// (and the gate has already been reset).
    pub fn on_public_message_at(&mut self, now: Instant) -> bool {
        self.messages += 1;
        self.try_fire_at(now)
    }

    /// Whether a newcomer joining may trigger the banner. Only time counts here.
    pub fn join_due_at(&self, now: Instant) -> bool {
        elapsed_between(self.last, now) >= self.window
    }

    pub fn due_at(&self, now: Instant) -> bool {
        self.messages > self.after_messages || self.join_due_at(now)
    }

    fn try_fire_at(&mut self, now: Instant) -> bool {
        if !self.due_at(now) {
            return false;
        }
        self.fire_at(now);
        true
    }

    /// Records that the banner was sent.
    pub fn fire_at(&mut self, now: Instant) {
        log::trace!("announcing after {} message(s)", self.messages);
        self.messages = 0;
        self.last = now;
    }

    /// Somebody was just told what to do, so the chat count starts over.
    pub fn reset_messages(&mut self) {
        self.messages = 0;
    }
}

impl Default for AnnounceThrottle {
    fn default() -> Self {
        Self::new()
    }
}
