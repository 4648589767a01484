//! Segment and lifecycle observation.
//!
//! Endpoints report every segment they send or receive, and every connection
//! milestone, to an [`Observer`].  Observers never influence the protocol.
//! [`Quiet`] drops everything; [`Verbose`] prints one line per event through
//! the `log` facade at `info` level:
//!
//! ```text
//! [CONN] Awaiting connections at: 127.0.0.1:12000
//! [RECV] SYN(0)
//! [SEND] SYNACK(0)
//! [CONN] Established connection with 127.0.0.1:53112
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use crate::segment::Segment;

/// Something worth reporting.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    ConnectionEstablished(SocketAddr),
    AwaitingConnections(SocketAddr),
    SegmentSent(&'a Segment),
    SegmentReceived(&'a Segment),
}

/// Sink for [`Event`]s.
pub trait Observer: Send + Sync {
    fn record(&self, event: Event<'_>);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Quiet;

impl Observer for Quiet {
    fn record(&self, _event: Event<'_>) {}
}

/// Logs every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Verbose;

impl Observer for Verbose {
    fn record(&self, event: Event<'_>) {
        log::info!("{}", describe(&event));
    }
}

/// The log line [`Verbose`] emits for `event`.
pub fn describe(event: &Event<'_>) -> String {
    match event {
        Event::ConnectionEstablished(addr) => format!("[CONN] Established connection with {addr}"),
        Event::AwaitingConnections(addr) => format!("[CONN] Awaiting connections at: {addr}"),
        Event::SegmentSent(seg) => format!("[SEND] {seg}"),
        Event::SegmentReceived(seg) => format!("[RECV] {seg}"),
    }
}

/// Pick the observer matching the `verbose` setting.
pub fn for_verbosity(verbose: bool) -> Arc<dyn Observer> {
    if verbose {
        Arc::new(Verbose)
    } else {
        Arc::new(Quiet)
    }
}
