//! Retransmission timing.
//!
//! The protocol uses a single fixed retransmission timeout (RTO); there is
//! no RTT estimation and no back-off.  This module provides:
//! - [`TimerConfig`]: the timeout and the retry budgets.
//! - [`RetransmitTimer`]: the last-send timestamp and transmission count of
//!   one in-flight segment.

use std::time::{Duration, Instant};

/// Default retransmission timeout.
pub const DEFAULT_RTO: Duration = Duration::from_millis(75);

/// Default number of retransmissions a data segment may take.
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Default number of FIN transmissions before a forced close.
pub const DEFAULT_FIN_RETRIES: u32 = 10;

/// Timeout parameters shared by the handshake, transfer and teardown loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Wait before retransmitting an unacknowledged segment, and bound on
    /// every individual wait for an inbound segment while sending.
    pub rto: Duration,
    /// Retransmissions allowed per data segment before `send` gives up.
    pub max_retries: u32,
    /// FIN transmissions before `close` finalizes without an answer.
    pub fin_retries: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            rto: DEFAULT_RTO,
            max_retries: DEFAULT_MAX_RETRIES,
            fin_retries: DEFAULT_FIN_RETRIES,
        }
    }
}

/// Send history of a single segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetransmitTimer {
    /// Time of the most recent transmission; `None` before the first one.
    pub sent_at: Option<Instant>,
    /// Total number of transmissions so far.
    pub tx_count: u32,
}

impl RetransmitTimer {
    /// `true` when the segment was never sent or its last send is at least
    /// `rto` old.
    pub fn is_due(&self, now: Instant, rto: Duration) -> bool {
        match self.sent_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= rto,
        }
    }

    /// Record a transmission at `now`.
    pub fn stamp(&mut self, now: Instant) {
        self.sent_at = Some(now);
        self.tx_count += 1;
    }

    /// Transmissions beyond the first.
    pub fn retransmissions(&self) -> u32 {
        self.tx_count.saturating_sub(1)
    }
}
