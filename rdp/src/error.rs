//! Error taxonomy for the transport.

use thiserror::Error;

use crate::seq::SeqNum;

/// Errors surfaced by [`crate::stream::Stream`] and [`crate::listener::Listener`].
#[derive(Debug, Error)]
pub enum RdpError {
    /// The local side already called `close`.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer sent FIN.
    #[error("connection closed by peer")]
    PeerClosed,

    /// A data segment was retransmitted more times than the budget allows.
    #[error("segment {seq} unacknowledged after {attempts} transmissions")]
    RetriesExhausted { seq: SeqNum, attempts: u32 },

    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RdpError {
    /// `true` when either side has hung up.
    pub fn is_hangup(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::PeerClosed)
    }
}

pub type Result<T, E = RdpError> = std::result::Result<T, E>;
