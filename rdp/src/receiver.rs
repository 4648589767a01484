//! Sliding-window receive-side state machine.
//!
//! [`ReorderBuffer`] reassembles one inbound message:
//!
//! - Data segments inside `[recv_offset, recv_offset + window)` are
//!   acknowledged individually, even when already seen, and buffered by
//!   sequence number if new.
//! - Segments below `recv_offset` were delivered earlier; the peer is
//!   retrying because our ACK got lost, so they are re-acknowledged and
//!   dropped.
//! - Whenever the buffer holds `recv_offset` that segment is moved to the
//!   output and `recv_offset` advances.  Draining the `LST` segment completes
//!   the message.
//!
//! This module only manages state; the caller sends the ACKs.

use std::collections::BTreeMap;

use crate::segment::Segment;
use crate::seq::SeqNum;

/// What the caller should do with an inbound segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Control segment or out of window: no acknowledgement.
    Ignored,
    /// Already delivered; acknowledge `seq` again.
    Stale,
    /// In window; acknowledge `seq`.  `message` holds the reassembled bytes
    /// once the `LST` segment has been drained.
    Accepted { message: Option<Vec<u8>> },
}

/// Reorder buffer for one `recv` call.
#[derive(Debug)]
pub struct ReorderBuffer {
    recv_offset: SeqNum,
    window: u32,
    pending: BTreeMap<SeqNum, Segment>,
    output: Vec<u8>,
}

impl ReorderBuffer {
    /// `recv_offset` is the next expected sequence number; `window` is
    /// clamped to at least 1.
    pub fn new(recv_offset: SeqNum, window: usize) -> Self {
        Self {
            recv_offset,
            window: window.max(1) as u32,
            pending: BTreeMap::new(),
            output: Vec::new(),
        }
    }

    pub fn recv_offset(&self) -> SeqNum {
        self.recv_offset
    }

    /// Segments held out of order.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn on_segment(&mut self, seg: Segment) -> Delivery {
        if !seg.is_data() {
            return Delivery::Ignored;
        }
        if seg.seq < self.recv_offset {
            return Delivery::Stale;
        }
        if !seg.seq.in_window(self.recv_offset, self.window) {
            return Delivery::Ignored;
        }

        self.pending.entry(seg.seq).or_insert(seg);

        while let Some(next) = self.pending.remove(&self.recv_offset) {
            self.recv_offset = self.recv_offset.advance(1);
            self.output.extend_from_slice(&next.payload);
            if next.is_lst() {
                return Delivery::Accepted {
                    message: Some(std::mem::take(&mut self.output)),
                };
            }
        }
        Delivery::Accepted { message: None }
    }
}
