//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::segment::Segment`] instead of raw bytes.  It owns two pieces of
//! policy that sit below the protocol:
//! - Outbound datagrams pass through a [`Simulator`] and may be dropped.
//! - Inbound datagrams too short to hold a header are discarded here and
//!   never reach the protocol layer.
//!
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::segment::{Segment, MAX_SEGMENT_SIZE};
use crate::simulator::{Simulator, SimulatorConfig};

/// An async, segment-oriented UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    sim: Simulator,
}

impl Socket {
    /// Bind a new socket to `local_addr`, dropping outbound datagrams
    /// according to `faults`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, faults: SimulatorConfig) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            sim: Simulator::new(faults),
        })
    }

    /// Encode `segment` and send it as a single datagram to `dest`.
    ///
    /// A datagram eaten by the fault model still reports success.
    pub async fn send_to(&self, segment: &Segment, dest: SocketAddr) -> io::Result<()> {
        if self.sim.should_drop() {
            log::trace!(
                "[sock {}] dropped {segment} to {dest} (datagram #{})",
                self.local_addr,
                self.sim.attempts()
            );
            return Ok(());
        }
        self.inner.send_to(&segment.encode(), dest).await?;
        Ok(())
    }

    /// Receive the next well-formed segment.
    ///
    /// Returns `(segment, sender_address)`.  Malformed datagrams are skipped.
    pub async fn recv_from(&self) -> io::Result<(Segment, SocketAddr)> {
        let mut buf = vec![0u8; MAX_SEGMENT_SIZE];
        loop {
            let (n, addr) = self.inner.recv_from(&mut buf).await?;
            match Segment::decode(&buf[..n]) {
                Ok(segment) => return Ok((segment, addr)),
                Err(e) => log::trace!("[sock {}] discarding datagram from {addr}: {e}", self.local_addr),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::SeqNum;
    use std::time::Duration;

    async fn loopback(faults: SimulatorConfig) -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap(), faults)
            .await
            .expect("bind")
    }

    #[tokio::test]
    async fn segment_roundtrip_over_loopback() {
        let a = loopback(SimulatorConfig::default()).await;
        let b = loopback(SimulatorConfig::default()).await;

        let seg = Segment::data(SeqNum::new(12), b"payload".to_vec(), true);
        a.send_to(&seg, b.local_addr).await.unwrap();

        let (got, from) = b.recv_from().await.unwrap();
        assert_eq!(got, seg);
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn short_datagrams_are_skipped() {
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = loopback(SimulatorConfig::default()).await;

        raw.send_to(&[0x80, 0], b.local_addr).await.unwrap();
        raw.send_to(&Segment::ack(SeqNum::new(5)).encode(), b.local_addr)
            .await
            .unwrap();

        let (got, _) = b.recv_from().await.unwrap();
        assert_eq!(got, Segment::ack(SeqNum::new(5)));
    }

    #[tokio::test]
    async fn fault_model_drops_outbound() {
        let a = loopback(SimulatorConfig {
            drop_every: Some(2),
            ..Default::default()
        })
        .await;
        let b = loopback(SimulatorConfig::default()).await;

        for i in 1..=4 {
            a.send_to(&Segment::ack(SeqNum::new(i)), b.local_addr)
                .await
                .unwrap();
        }

        let (first, _) = b.recv_from().await.unwrap();
        let (second, _) = b.recv_from().await.unwrap();
        assert_eq!(first.seq, SeqNum::new(1));
        assert_eq!(second.seq, SeqNum::new(3));

        let nothing = tokio::time::timeout(Duration::from_millis(100), b.recv_from()).await;
        assert!(nothing.is_err(), "dropped datagrams must not arrive");
    }
}
