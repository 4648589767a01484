//! Connection endpoint: handshake, sliding-window transfer and teardown.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(data) / recv() / close()
//!      ▼
//!  Stream ──────────── observer (Quiet | Verbose)
//!    ├── SendWindow     (one per send: selective ACKs, per-segment timers)
//!    ├── ReorderBuffer  (one per recv: out-of-order segments by seq)
//!    └── Socket         (exclusively owned, locked to one peer)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut stream = Stream::connect(server, Config::default()).await?;
//! stream.send(b"hello world").await?;
//! let reply = stream.recv().await?;
//! stream.close().await;
//! ```
//!
//! The server side obtains its streams from [`crate::listener::Listener::accept`].
//! `send` and `recv` take `&mut self`; one stream is driven by one task.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use tokio::time::{timeout, timeout_at};

use crate::config::Config;
use crate::error::{RdpError, Result};
use crate::observer::{self, Event, Observer};
use crate::receiver::{Delivery, ReorderBuffer};
use crate::segment::Segment;
use crate::sender::{AckOutcome, SendWindow};
use crate::seq::SeqNum;
use crate::socket::Socket;
use crate::state::ConnectionState;

/// One side of an established connection.
pub struct Stream {
    /// `None` once the stream has been closed.
    socket: Option<Socket>,
    local: SocketAddr,
    peer: SocketAddr,
    /// Shared by both directions: the next number we send, and the next one
    /// we expect.  A reply continues where the request ended.
    seq_offset: SeqNum,
    /// Accepted by a listener and nothing exchanged yet: a late handshake
    /// `ACK(0)` may still arrive.
    passive: bool,
    state: ConnectionState,
    config: Config,
    observer: Arc<dyn Observer>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("seq_offset", &self.seq_offset)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Stream {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Perform an active open against `addr`.
    ///
    /// The local socket is bound to an ephemeral port on the unspecified
    /// address of `addr`'s family.  `SYN` is retransmitted every
    /// `config.timers.rto` until a `SYN+ACK` arrives; there is no retry
    /// limit.
    pub async fn connect(addr: SocketAddr, config: Config) -> Result<Self> {
        let observer = observer::for_verbosity(config.verbose);
        Self::connect_with(addr, config, observer).await
    }

    /// [`Stream::connect`] with an explicit observer.
    pub async fn connect_with(
        addr: SocketAddr,
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let unspecified = match addr {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let mut stream = Self::bind(SocketAddr::new(unspecified, 0), addr, config, observer).await?;
        stream.active_open().await?;
        Ok(stream)
    }

    /// Bind a fresh socket on `bind_ip` for a connection with `peer`.
    ///
    /// Used by the listener; the handshake is finished with
    /// [`Stream::complete_passive_open`].
    pub(crate) async fn provision(
        peer: SocketAddr,
        bind_ip: IpAddr,
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let mut stream = Self::bind(SocketAddr::new(bind_ip, 0), peer, config, observer).await?;
        stream.state = ConnectionState::SynReceived;
        stream.passive = true;
        Ok(stream)
    }

    async fn bind(
        local: SocketAddr,
        peer: SocketAddr,
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let socket = Socket::bind(local, config.faults).await?;
        Ok(Self {
            local: socket.local_addr,
            socket: Some(socket),
            peer,
            seq_offset: SeqNum::ZERO,
            passive: false,
            state: ConnectionState::Idle,
            config,
            observer,
        })
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    async fn active_open(&mut self) -> Result<()> {
        let syn = Segment::syn();
        let target = self.peer;
        self.state = ConnectionState::SynSent;

        let server = loop {
            self.transmit_to(&syn, target).await?;
            log::debug!("[rdp] → SYN to {target}");
            match timeout(self.config.timers.rto, self.await_syn_ack()).await {
                Ok(res) => break res?,
                Err(_elapsed) => log::debug!("[rdp] SYN timed out; retrying"),
            }
        };

        // Replies come from a socket dedicated to this connection.
        self.peer = server;
        self.transmit(&Segment::ack(SeqNum::ZERO)).await?;
        self.state = ConnectionState::Established;
        self.observer.record(Event::ConnectionEstablished(server));
        log::debug!("[rdp] ← SYN+ACK from {server}; → ACK(0); ESTABLISHED");
        Ok(())
    }

    async fn await_syn_ack(&self) -> Result<SocketAddr> {
        let socket = self.socket()?;
        loop {
            let (seg, from) = socket.recv_from().await?;
            self.observer.record(Event::SegmentReceived(&seg));
            if seg.is_syn_ack() {
                return Ok(from);
            }
        }
    }

    /// Send `SYN+ACK` from this stream's own socket until the peer answers
    /// with `ACK(0)`.
    pub(crate) async fn complete_passive_open(&mut self) -> Result<()> {
        let syn_ack = Segment::syn_ack();
        loop {
            self.transmit(&syn_ack).await?;
            log::debug!("[rdp] → SYN+ACK to {}", self.peer);
            let deadline = tokio::time::Instant::now() + self.config.timers.rto;
            while let Some(seg) = self.next_segment_until(deadline).await? {
                if seg.is_ack() && !seg.is_syn() && seg.seq == SeqNum::ZERO {
                    self.state = ConnectionState::Established;
                    self.observer.record(Event::ConnectionEstablished(self.peer));
                    log::debug!("[rdp] ← ACK(0) from {}; ESTABLISHED", self.peer);
                    return Ok(());
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Send one message using the configured window size.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let window = self.config.window();
        self.send_windowed(data, window).await
    }

    /// Send one message with up to `window` segments in flight.
    ///
    /// Returns once the peer has acknowledged the `LST` segment, or once the
    /// peer shows it has moved on (fresh data or `FIN` from its side).
    /// Fails with [`RdpError::RetriesExhausted`] when a segment outlives its
    /// retransmission budget.
    pub async fn send_windowed(&mut self, data: &[u8], window: usize) -> Result<()> {
        self.ensure_open()?;

        let rto = self.config.timers.rto;
        let max_retries = self.config.timers.max_retries;
        let mut win = SendWindow::new(data, self.seq_offset, window);
        log::debug!(
            "[rdp] send {} bytes as {} segments from seq={} window={}",
            data.len(),
            win.segment_count(),
            self.seq_offset,
            window
        );

        while !win.is_complete() {
            let now = Instant::now();
            if let Some((seq, attempts)) = win.exhausted(now, rto, max_retries) {
                log::debug!("[rdp] giving up on seq={seq} after {attempts} transmissions");
                return Err(RdpError::RetriesExhausted { seq, attempts });
            }
            for i in win.due(now, rto) {
                self.transmit(win.segment(i)).await?;
                win.mark_sent(i, now);
                let resent = win.retransmissions(i);
                if resent > 0 {
                    log::debug!("[rdp] → retransmit seq={} #{resent}", win.segment(i).seq);
                }
            }

            let deadline = tokio::time::Instant::now() + rto;
            let Some(seg) = self.next_segment_until(deadline).await? else {
                continue;
            };

            if seg.is_fin() {
                self.acknowledge_fin(&seg).await?;
                self.seq_offset = self.seq_offset.advance(win.remaining() as u32);
                return Ok(());
            }

            if seg.is_ack() {
                match win.on_ack(seg.seq) {
                    AckOutcome::Slid { count, complete } => {
                        self.seq_offset = self.seq_offset.advance(count as u32);
                        log::debug!(
                            "[rdp] ← ACK({}) slid {count}; seq_offset={}",
                            seg.seq,
                            self.seq_offset
                        );
                        if complete {
                            break;
                        }
                    }
                    AckOutcome::Recorded => log::debug!("[rdp] ← ACK({}) held above base", seg.seq),
                    AckOutcome::Duplicate | AckOutcome::Ignored => {}
                }
                continue;
            }

            if seg.is_data() {
                if seg.seq < self.seq_offset {
                    // Peer is still retrying a message we already delivered.
                    self.transmit(&Segment::ack(seg.seq)).await?;
                    continue;
                }
                // Peer reuses our sequence space for a send of its own, so it
                // has everything of ours.
                let remaining = win.remaining();
                self.seq_offset = self.seq_offset.advance(remaining as u32);
                log::debug!(
                    "[rdp] ← data seq={} while sending; treating {remaining} unacked as delivered",
                    seg.seq
                );
                return Ok(());
            }
        }
        Ok(())
    }

    /// Receive one message using the configured window size.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let window = self.config.window();
        self.recv_windowed(window).await
    }

    /// Receive one message, accepting segments up to `window` ahead of the
    /// next expected one.
    ///
    /// Blocks until the `LST` segment has been reassembled.  Fails with
    /// [`RdpError::PeerClosed`] if the peer sends `FIN` first.
    pub async fn recv_windowed(&mut self, window: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;

        let mut buffer = ReorderBuffer::new(self.seq_offset, window);
        loop {
            let seg = self.next_segment().await?;
            if seg.is_fin() {
                self.acknowledge_fin(&seg).await?;
                return Err(RdpError::PeerClosed);
            }

            let seq = seg.seq;
            match buffer.on_segment(seg) {
                Delivery::Ignored => {}
                Delivery::Stale => {
                    log::debug!("[rdp] ← stale seq={seq}; re-ACK");
                    self.transmit(&Segment::ack(seq)).await?;
                }
                Delivery::Accepted { message } => {
                    self.transmit(&Segment::ack(seq)).await?;
                    if let Some(message) = message {
                        self.seq_offset = buffer.recv_offset();
                        log::debug!(
                            "[rdp] received {} bytes; seq_offset={}",
                            message.len(),
                            self.seq_offset
                        );
                        return Ok(message);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close the connection.
    ///
    /// Sends `FIN(seq_offset)` up to `fin_retries` times and finishes on the
    /// peer's `FIN` or on the matching `ACK`.  If neither arrives the stream
    /// is closed anyway.  Calling `close` again does nothing.
    pub async fn close(&mut self) {
        if self.socket.is_none() {
            return;
        }

        let fin = Segment::fin(self.seq_offset);
        if self.state == ConnectionState::Established {
            self.state = ConnectionState::FinSent;
        }

        let mut answered = false;
        'attempts: for attempt in 1..=self.config.timers.fin_retries {
            if let Err(e) = self.transmit(&fin).await {
                log::debug!("[rdp] FIN send failed: {e}");
                break;
            }
            log::debug!("[rdp] → FIN({}) attempt {attempt}", fin.seq);

            let deadline = tokio::time::Instant::now() + self.config.timers.rto;
            loop {
                let seg = match self.next_segment_until(deadline).await {
                    Ok(Some(seg)) => seg,
                    Ok(None) => continue 'attempts,
                    Err(e) => {
                        log::debug!("[rdp] socket error while closing: {e}");
                        break 'attempts;
                    }
                };
                if seg.is_fin() {
                    let _ = self.transmit(&Segment::ack(seg.seq)).await;
                    log::debug!("[rdp] ← FIN({}); → ACK", seg.seq);
                    answered = true;
                    break 'attempts;
                }
                if seg.is_ack() && seg.seq == fin.seq && !self.awaiting_handshake_ack() {
                    log::debug!("[rdp] ← ACK of FIN");
                    answered = true;
                    break 'attempts;
                }
                if seg.is_data() && seg.seq < self.seq_offset {
                    let _ = self.transmit(&Segment::ack(seg.seq)).await;
                }
            }
        }

        if !answered {
            log::warn!("[rdp] FIN to {} not answered; force-closing", self.peer);
        }
        self.socket = None;
        self.state = ConnectionState::Closed;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Local address of this stream's socket.
    pub fn addr(&self) -> Result<SocketAddr> {
        self.socket().map(|s| s.local_addr)
    }

    /// Address of the peer's socket for this connection.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.socket().map(|_| self.peer)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Next sequence number for either direction.
    pub fn seq_offset(&self) -> SeqNum {
        self.seq_offset
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn socket(&self) -> Result<&Socket> {
        self.socket.as_ref().ok_or(RdpError::ConnectionClosed)
    }

    fn ensure_open(&self) -> Result<()> {
        self.socket()?;
        match self.state {
            s if s.is_open() => Ok(()),
            ConnectionState::CloseWait => Err(RdpError::PeerClosed),
            _ => Err(RdpError::ConnectionClosed),
        }
    }

    /// On a passive stream with nothing exchanged, `ACK(0)` may be the
    /// client's repeated handshake ACK rather than the ACK of `FIN(0)`.
    fn awaiting_handshake_ack(&self) -> bool {
        self.passive && self.seq_offset == SeqNum::ZERO
    }

    async fn transmit(&self, seg: &Segment) -> Result<()> {
        self.transmit_to(seg, self.peer).await
    }

    async fn transmit_to(&self, seg: &Segment, dest: SocketAddr) -> Result<()> {
        self.socket()?.send_to(seg, dest).await?;
        self.observer.record(Event::SegmentSent(seg));
        Ok(())
    }

    /// Next segment from the peer.
    ///
    /// Datagrams from other addresses are dropped.  A duplicate `SYN+ACK`
    /// means our `ACK(0)` was lost; it is answered here and never returned.
    async fn next_segment(&self) -> Result<Segment> {
        let socket = self.socket()?;
        loop {
            let (seg, from) = socket.recv_from().await?;
            if from != self.peer {
                log::trace!("[rdp] ignoring {seg} from stranger {from}");
                continue;
            }
            self.observer.record(Event::SegmentReceived(&seg));
            if seg.is_syn_ack() {
                log::debug!("[rdp] ← duplicate SYN+ACK; → ACK(0)");
                self.transmit(&Segment::ack(SeqNum::ZERO)).await?;
                continue;
            }
            return Ok(seg);
        }
    }

    /// [`Stream::next_segment`] bounded by `deadline`; `None` on timeout.
    async fn next_segment_until(&self, deadline: tokio::time::Instant) -> Result<Option<Segment>> {
        match timeout_at(deadline, self.next_segment()).await {
            Ok(seg) => seg.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn acknowledge_fin(&mut self, fin: &Segment) -> Result<()> {
        self.transmit(&Segment::ack(fin.seq)).await?;
        self.state = ConnectionState::CloseWait;
        log::debug!("[rdp] ← FIN({}); → ACK; CLOSE_WAIT", fin.seq);
        Ok(())
    }
}
