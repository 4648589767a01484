//! Sliding-window send-side state machine.
//!
//! [`SendWindow`] holds one outgoing message, already split into segments,
//! and a window `[base, end)` of segment indexes that may be in flight at
//! once.
//!
//! # Protocol contract
//!
//! - At most `window_size` segments are in flight (`end - base ≤ window`).
//! - ACKs are **selective**: `ACK(n)` acknowledges exactly segment `n`.
//!   Acknowledgements inside the window but above `base` are remembered.
//! - When the segment at `base` is acknowledged the window collapses through
//!   every contiguously acknowledged segment (cumulative slide), and `end`
//!   moves forward by the same amount.
//! - Each unacknowledged segment in the window carries its own
//!   [`RetransmitTimer`]; only those whose timer expired are resent.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.
//!
//! ```text
//!   base                 end
//!    │                    │
//! ───┼──┬──┬──┬──┬──┬──┬──┼──┬──┬──▶ segment index
//!  acked│ in flight (some │ not yet
//!       │ selectively ack)│ eligible
//! ```

use std::time::{Duration, Instant};

use crate::segment::{build_segments, Segment};
use crate::seq::SeqNum;
use crate::timer::RetransmitTimer;

/// What an inbound ACK did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The acknowledged number is outside `[base, end)`.
    Ignored,
    /// The segment was already acknowledged.
    Duplicate,
    /// Recorded above the base; the window did not move.
    Recorded,
    /// The base was acknowledged and the window slid by `count` segments.
    /// `complete` is set when the segment slid past last was the `LST` one.
    Slid { count: usize, complete: bool },
}

/// Send-side window over one message.
#[derive(Debug)]
pub struct SendWindow {
    segments: Vec<Segment>,
    timers: Vec<RetransmitTimer>,
    acked: Vec<bool>,
    /// Index of the oldest unacknowledged segment.
    base: usize,
    /// One past the newest segment allowed in flight.
    end: usize,
}

impl SendWindow {
    /// Split `data` into segments numbered from `start` and open a window of
    /// `window_size` segments, clamped to `[1, segment count]`.
    pub fn new(data: &[u8], start: SeqNum, window_size: usize) -> Self {
        let segments: Vec<Segment> = build_segments(data, start).collect();
        let n = segments.len();
        Self {
            timers: vec![RetransmitTimer::default(); n],
            acked: vec![false; n],
            end: window_size.clamp(1, n),
            base: 0,
            segments,
        }
    }

    /// Total number of segments in the message; never zero.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn segment(&self, index: usize) -> &Segment {
        &self.segments[index]
    }

    /// Segments not yet slid past.
    pub fn remaining(&self) -> usize {
        self.segments.len() - self.base
    }

    /// `true` once every segment has been slid past.
    pub fn is_complete(&self) -> bool {
        self.base == self.segments.len()
    }

    /// Indexes inside the window that are unacknowledged and whose timer has
    /// expired (or that were never sent), oldest first.
    pub fn due(&self, now: Instant, rto: Duration) -> Vec<usize> {
        (self.base..self.end)
            .filter(|&i| !self.acked[i] && self.timers[i].is_due(now, rto))
            .collect()
    }

    /// Record a (re)transmission of segment `index` at `now`.
    pub fn mark_sent(&mut self, index: usize, now: Instant) {
        self.timers[index].stamp(now);
    }

    /// Transmissions of segment `index` beyond the first.
    pub fn retransmissions(&self, index: usize) -> u32 {
        self.timers[index].retransmissions()
    }

    /// The first segment that is due again after already using its whole
    /// budget of `max_retries` retransmissions, as `(seq, transmissions)`.
    pub fn exhausted(&self, now: Instant, rto: Duration, max_retries: u32) -> Option<(SeqNum, u32)> {
        self.due(now, rto)
            .into_iter()
            .find(|&i| self.timers[i].tx_count > max_retries)
            .map(|i| (self.segments[i].seq, self.timers[i].tx_count))
    }

    /// Process an inbound `ACK(seq)`.
    pub fn on_ack(&mut self, seq: SeqNum) -> AckOutcome {
        if self.is_complete() {
            return AckOutcome::Ignored;
        }
        let lo = self.segments[self.base].seq;
        if !seq.in_window(lo, (self.end - self.base) as u32) {
            return AckOutcome::Ignored;
        }
        // in_window guarantees the offset exists.
        let index = self.base + seq.offset_from(lo).unwrap_or(0) as usize;
        if self.acked[index] {
            return AckOutcome::Duplicate;
        }
        self.acked[index] = true;
        if index != self.base {
            return AckOutcome::Recorded;
        }

        let mut count = 0;
        while self.base < self.segments.len() && self.acked[self.base] {
            self.base += 1;
            count += 1;
        }
        self.end = (self.end + count).min(self.segments.len());
        AckOutcome::Slid {
            count,
            complete: self.segments[self.base - 1].is_lst(),
        }
    }
}
