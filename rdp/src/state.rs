//! Connection finite-state machine (FSM) types.
//!
//! Transitions are driven by [`crate::stream::Stream`] and
//! [`crate::listener::Listener`]:
//!
//! ```text
//!  client:  Idle ──SYN sent──▶ SynSent ──SYN+ACK──▶ Established
//!  server:  Idle ──SYN rcvd──▶ SynReceived ──ACK(0)──▶ Established
//!
//!  Established ──peer FIN──▶ CloseWait ─┐
//!       │                               │ close()
//!       └──────── close() ──▶ FinSent ──┴──▶ Closed
//! ```

use std::fmt;

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket allocated, nothing exchanged.
    #[default]
    Idle,
    /// SYN sent; waiting for SYN+ACK.
    SynSent,
    /// SYN received; SYN+ACK being sent until ACK(0) arrives.
    SynReceived,
    /// Handshake complete; data transfer allowed.
    Established,
    /// Peer sent FIN; only `close` remains meaningful.
    CloseWait,
    /// Local FIN sent; waiting for the peer's ACK or FIN.
    FinSent,
    /// Socket released.
    Closed,
}

impl ConnectionState {
    /// `true` while `send`/`recv` may still touch the socket.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Established)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RCVD",
            Self::Established => "ESTABLISHED",
            Self::CloseWait => "CLOSE_WAIT",
            Self::FinSent => "FIN_SENT",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn only_established_is_open() {
        assert!(ConnectionState::Established.is_open());
        for s in [
            ConnectionState::Idle,
            ConnectionState::SynSent,
            ConnectionState::SynReceived,
            ConnectionState::CloseWait,
            ConnectionState::FinSent,
            ConnectionState::Closed,
        ] {
            assert!(!s.is_open(), "{s}");
        }
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(ConnectionState::SynReceived.to_string(), "SYN_RCVD");
        assert_eq!(ConnectionState::CloseWait.to_string(), "CLOSE_WAIT");
    }
}
