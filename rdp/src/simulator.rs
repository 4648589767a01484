//! Fault injection for outbound datagrams.
//!
//! Real networks drop packets.  To exercise the retransmission paths without
//! depending on actual network conditions, every [`crate::socket::Socket`]
//! consults a [`Simulator`] before each send and silently discards the
//! datagram when told to.  Two fault models are supported and may be
//! combined:
//!
//! | Fault            | Description                                       |
//! |------------------|---------------------------------------------------|
//! | Periodic loss    | Drop every `drop_every`-th datagram (1-based).    |
//! | Random loss      | Drop with probability `loss_rate`, seeded RNG.    |
//!
//! The default configuration is a transparent pass-through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Seed used when none is configured, so runs are reproducible.
pub const DEFAULT_SEED: u64 = 0xBAD5EED;

/// Configuration for the fault model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorConfig {
    /// Drop the n-th, 2n-th, … datagram sent by each socket.
    pub drop_every: Option<u64>,
    /// Probability in `[0.0, 1.0]` that a datagram is dropped.
    pub loss_rate: f64,
    /// Seed for the random-loss generator.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            drop_every: None,
            loss_rate: 0.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl SimulatorConfig {
    /// `true` when no fault is configured.
    pub fn is_passthrough(&self) -> bool {
        self.drop_every.is_none() && self.loss_rate <= 0.0
    }
}

/// Per-socket fault-injection state.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    sent: AtomicU64,
    rng: Mutex<SmallRng>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(config.seed)),
            sent: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Decide the fate of the next outbound datagram.
    ///
    /// Every call counts as one attempted send, dropped or not.
    pub fn should_drop(&self) -> bool {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(every) = self.config.drop_every {
            if every > 0 && n % every == 0 {
                return true;
            }
        }
        if self.config.loss_rate > 0.0 {
            let p = self.config.loss_rate.min(1.0);
            // A poisoned lock only means another sender panicked mid-draw.
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            return rng.gen_bool(p);
        }
        false
    }

    /// Datagrams offered so far, including dropped ones.
    pub fn attempts(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}
