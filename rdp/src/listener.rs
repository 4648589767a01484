//! Passive open.
//!
//! A [`Listener`] owns the rendezvous socket: the well-known address clients
//! send their `SYN` to.  No data ever flows over it.  Each accepted peer gets
//! a [`Stream`] with its own freshly bound socket, and the `SYN+ACK` comes
//! from that socket so the client learns where to talk next.
//!
//! Retransmitted `SYN`s are deduplicated by peer address: an address that
//! has been claimed once is never handed out again.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RdpError, Result};
use crate::observer::{self, Event, Observer};
use crate::socket::Socket;
use crate::stream::Stream;

/// Server-side rendezvous point.
pub struct Listener {
    socket: Option<Socket>,
    addr: SocketAddr,
    /// Peers with an in-progress or completed handshake.
    claimed: HashSet<SocketAddr>,
    config: Config,
    observer: Arc<dyn Observer>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("addr", &self.addr)
            .field("open", &self.socket.is_some())
            .field("claimed", &self.claimed.len())
            .finish_non_exhaustive()
    }
}

impl Listener {
    /// Bind the rendezvous socket to `addr`.
    pub async fn bind(addr: SocketAddr, config: Config) -> Result<Self> {
        let observer = observer::for_verbosity(config.verbose);
        Self::bind_with(addr, config, observer).await
    }

    /// [`Listener::bind`] with an explicit observer shared by every accepted
    /// stream.
    pub async fn bind_with(
        addr: SocketAddr,
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let socket = Socket::bind(addr, config.faults).await?;
        let addr = socket.local_addr;
        log::debug!("[rdp] listening on {addr}");
        Ok(Self {
            socket: Some(socket),
            addr,
            claimed: HashSet::new(),
            config,
            observer,
        })
    }

    /// Wait for a `SYN` from a new peer and complete the handshake with it.
    ///
    /// Returns once the peer's `ACK(0)` has arrived on the new stream's
    /// socket.
    pub async fn accept(&mut self) -> Result<Stream> {
        let socket = self.socket.as_ref().ok_or(RdpError::ConnectionClosed)?;
        self.observer
            .record(Event::AwaitingConnections(socket.local_addr));
        loop {
            let socket = self.socket.as_ref().ok_or(RdpError::ConnectionClosed)?;
            let (seg, from) = socket.recv_from().await?;
            self.observer.record(Event::SegmentReceived(&seg));

            if !seg.is_syn() || seg.is_ack() {
                log::trace!("[rdp] rendezvous ignoring {seg} from {from}");
                continue;
            }
            if !self.claimed.insert(from) {
                log::debug!("[rdp] duplicate SYN from {from}");
                continue;
            }

            log::debug!("[rdp] ← SYN from {from}; provisioning stream");
            let mut stream =
                Stream::provision(from, self.addr.ip(), self.config, Arc::clone(&self.observer))
                    .await?;
            stream.complete_passive_open().await?;
            return Ok(stream);
        }
    }

    /// Address of the rendezvous socket.
    pub fn addr(&self) -> Result<SocketAddr> {
        self.socket
            .as_ref()
            .map(|s| s.local_addr)
            .ok_or(RdpError::ConnectionClosed)
    }

    /// Release the rendezvous socket.  Streams already accepted are
    /// unaffected.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            log::debug!("[rdp] listener on {} closed", self.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use crate::seq::SeqNum;
    use crate::state::ConnectionState;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Observer for Recorder {
        fn record(&self, event: Event<'_>) {
            self.0.lock().unwrap().push(observer::describe(&event));
        }
    }

    impl Recorder {
        fn awaiting(&self) -> usize {
            let lines = self.0.lock().unwrap();
            lines
                .iter()
                .filter(|l| l.starts_with("[CONN] Awaiting connections at:"))
                .count()
        }
    }

    async fn handshake_raw(rendezvous: SocketAddr) -> UdpSocket {
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(&Segment::syn().encode(), rendezvous).await.unwrap();
        let (_, from) = recv_seg(&raw).await;
        raw.send_to(&Segment::ack(SeqNum::ZERO).encode(), from)
            .await
            .unwrap();
        raw
    }

    fn fast() -> Config {
        let mut cfg = Config::default();
        cfg.timers.rto = Duration::from_millis(30);
        cfg
    }

    async fn recv_seg(raw: &UdpSocket) -> (Segment, SocketAddr) {
        let mut buf = [0u8; 2048];
        let (n, from) = tokio::time::timeout(Duration::from_secs(5), raw.recv_from(&mut buf))
            .await
            .expect("timed out")
            .unwrap();
        (Segment::decode(&buf[..n]).unwrap(), from)
    }

    #[tokio::test]
    async fn syn_ack_comes_from_a_fresh_socket() {
        let mut listener = Listener::bind("127.0.0.1:0".parse().unwrap(), fast())
            .await
            .unwrap();
        let rendezvous = listener.addr().unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let client = tokio::spawn(async move {
            raw.send_to(&Segment::syn().encode(), rendezvous).await.unwrap();
            let (syn_ack, from) = recv_seg(&raw).await;
            assert!(syn_ack.is_syn_ack());
            assert_ne!(from, rendezvous);
            raw.send_to(&Segment::ack(SeqNum::ZERO).encode(), from)
                .await
                .unwrap();
            (raw, from)
        });

        let stream = listener.accept().await.unwrap();
        let (raw, server_addr) = client.await.unwrap();
        assert_eq!(stream.state(), ConnectionState::Established);
        assert_eq!(stream.addr().unwrap(), server_addr);
        assert_eq!(stream.peer_addr().unwrap(), raw.local_addr().unwrap());
    }

    #[tokio::test]
    async fn duplicate_syn_does_not_spawn_second_stream() {
        let mut listener = Listener::bind("127.0.0.1:0".parse().unwrap(), fast())
            .await
            .unwrap();
        let rendezvous = listener.addr().unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        raw.send_to(&Segment::syn().encode(), rendezvous).await.unwrap();
        raw.send_to(&Segment::syn().encode(), rendezvous).await.unwrap();

        let client = tokio::spawn(async move {
            let (_, from) = recv_seg(&raw).await;
            raw.send_to(&Segment::ack(SeqNum::ZERO).encode(), from)
                .await
                .unwrap();
            raw
        });

        let _stream = listener.accept().await.unwrap();
        let _raw = client.await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(150), listener.accept()).await;
        assert!(second.is_err(), "second SYN from the same peer was accepted");
    }

    #[tokio::test]
    async fn awaiting_is_reported_once_per_accept() {
        let rec = Arc::new(Recorder::default());
        let mut listener =
            Listener::bind_with("127.0.0.1:0".parse().unwrap(), fast(), rec.clone())
                .await
                .unwrap();
        let rendezvous = listener.addr().unwrap();
        assert_eq!(rec.awaiting(), 0, "binding alone reported awaiting");

        for expected in 1..=2 {
            let client = tokio::spawn(handshake_raw(rendezvous));
            let _stream = listener.accept().await.unwrap();
            let _raw = client.await.unwrap();
            assert_eq!(rec.awaiting(), expected);
        }

        let line = format!("[CONN] Awaiting connections at: {rendezvous}");
        assert!(rec.0.lock().unwrap().contains(&line));
    }

    #[tokio::test]
    async fn closed_listener_refuses_work() {
        let mut listener = Listener::bind("127.0.0.1:0".parse().unwrap(), fast())
            .await
            .unwrap();
        listener.close();
        listener.close();
        assert!(matches!(listener.addr(), Err(RdpError::ConnectionClosed)));
        assert!(matches!(
            listener.accept().await,
            Err(RdpError::ConnectionClosed)
        ));
    }
}
