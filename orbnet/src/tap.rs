//! Debounced tap detection.
//!
//! The raw sensor level is sampled once per tick. A level change is only
//! accepted after it has been stable for the debounce interval, and every
//! accepted change to the active level counts as one tap. Taps are counted
//! inside a window; reaching the required count outside the cooldown fires
//! a cycle advance.

use tracing::{debug, trace};

use crate::config::ProtocolConfig;
use crate::time::{Duration, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TapTiming {
    pub debounce: Duration,
    pub window: Duration,
    pub hits_required: u8,
    pub cooldown: Duration,
}

impl TapTiming {
    pub fn from_config<C: ProtocolConfig>() -> Self {
        Self {
            debounce: C::DEBOUNCE,
            window: C::TAP_WINDOW,
            hits_required: C::TAP_HITS,
            cooldown: C::TAP_COOLDOWN,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TapDetector {
    debounced_level: bool,
    candidate_level: bool,
    candidate_since: Timestamp,
    last_change_at: Timestamp,
    window_start: Option<Timestamp>,
    hits_in_window: u8,
    last_accepted_tap_at: Option<Timestamp>,
}

impl TapDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounced_level(&self) -> bool {
        self.debounced_level
    }

    pub fn last_change_at(&self) -> Timestamp {
        self.last_change_at
    }

    pub fn hits_in_window(&self) -> u8 {
        self.hits_in_window
    }

    /// Feed one raw sample. Returns true when a cycle advance should fire.
    pub fn sample(&mut self, level: bool, now: Timestamp, timing: &TapTiming) -> bool {
        if let Some(start) = self.window_start {
            if now.since(start) > timing.window {
                trace!(hits = self.hits_in_window, "tap window expired");
                self.close_window();
            }
        }

        if level != self.candidate_level {
            self.candidate_level = level;
            self.candidate_since = now;
        }
        if self.candidate_level == self.debounced_level
            || now.since(self.candidate_since) < timing.debounce
        {
            return false;
        }

        self.debounced_level = self.candidate_level;
        self.last_change_at = now;
        if self.debounced_level {
            self.register_tap(now, timing)
        } else {
            false
        }
    }

    fn register_tap(&mut self, now: Timestamp, timing: &TapTiming) -> bool {
        match self.window_start {
            Some(_) => self.hits_in_window = self.hits_in_window.saturating_add(1),
            None => {
                self.window_start = Some(now);
                self.hits_in_window = 1;
            }
        }
        debug!(hits = self.hits_in_window, "tap");

        if self.hits_in_window < timing.hits_required {
            return false;
        }
        self.close_window();

        let cooled = self
            .last_accepted_tap_at
            .map_or(true, |last| now.since(last) >= timing.cooldown);
        if cooled {
            self.last_accepted_tap_at = Some(now);
        } else {
            debug!("tap ignored during cooldown");
        }
        cooled
    }

    fn close_window(&mut self) {
        self.window_start = None;
        self.hits_in_window = 0;
    }
}
