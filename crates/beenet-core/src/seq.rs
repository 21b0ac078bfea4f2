//! Sequence numbering and anti-replay
//!
//! Each session direction owns a [`SequenceTracker`]: a strictly monotonic
//! send counter and a sliding bitmap window over received sequence numbers.
//! Validation never panics and never raises; a `false` means the caller
//! drops the envelope.

use parking_lot::Mutex;

/// Default replay window size in slots
pub const DEFAULT_WINDOW: u64 = 64;

/// Sliding bitmap of recently accepted sequence numbers.
///
/// Bit `n` of the bitmap represents `highest_seen - n`. Sequence 0 is never
/// valid; duplicates and anything older than `highest_seen - size` are
/// rejected; any higher sequence slides the window forward.
#[derive(Debug)]
pub struct ReplayWindow {
    size: u64,
    highest: u64,
    bitmap: u64,
}

impl ReplayWindow {
    /// Create a window with the given slot count (clamped to 1..=64).
    pub fn new(size: u64) -> Self {
        Self {
            size: size.clamp(1, 64),
            highest: 0,
            bitmap: 0,
        }
    }

    /// Highest sequence number accepted so far.
    pub fn highest_seen(&self) -> u64 {
        self.highest
    }

    /// Validate a received sequence number, recording it on acceptance.
    pub fn validate(&mut self, seq: u64) -> bool {
        if seq == 0 {
            return false;
        }
        if seq > self.highest {
            let shift = seq - self.highest;
            if shift >= self.size {
                // Everything previously tracked falls out of the window.
                self.bitmap = 1;
            } else {
                self.bitmap = (self.bitmap << shift) | 1;
            }
            self.highest = seq;
            return true;
        }
        let age = self.highest - seq;
        if age >= self.size {
            return false;
        }
        let bit = 1u64 << age;
        if self.bitmap & bit != 0 {
            return false;
        }
        self.bitmap |= bit;
        true
    }
}

/// Per-direction sequence state for one session.
pub struct SequenceTracker {
    send_counter: Mutex<u64>,
    recv_window: Mutex<ReplayWindow>,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceTracker {
    /// Create a tracker with the default window size.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Create a tracker with an explicit window size.
    pub fn with_window(size: u64) -> Self {
        Self {
            send_counter: Mutex::new(0),
            recv_window: Mutex::new(ReplayWindow::new(size)),
        }
    }

    /// Next outgoing sequence number; yields 1, 2, 3, ...
    pub fn next_send(&self) -> u64 {
        let mut counter = self.send_counter.lock();
        *counter += 1;
        *counter
    }

    /// Last sequence number handed out, 0 if none yet.
    pub fn last_sent(&self) -> u64 {
        *self.send_counter.lock()
    }

    /// Validate a received sequence number against the replay window.
    pub fn validate_recv(&self, seq: u64) -> bool {
        self.recv_window.lock().validate(seq)
    }

    /// Snapshot of the highest accepted incoming sequence number.
    pub fn highest_recv(&self) -> u64 {
        self.recv_window.lock().highest_seen()
    }
}
