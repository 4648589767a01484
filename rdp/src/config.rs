//! Settings injected into every [`crate::stream::Stream`] and
//! [`crate::listener::Listener`].

use crate::simulator::SimulatorConfig;
use crate::timer::TimerConfig;

/// Window size used when none is given: stop-and-wait.
pub const DEFAULT_WINDOW: usize = 1;

/// Endpoint configuration.
///
/// Build with struct update syntax:
///
/// ```
/// use rdp::config::Config;
///
/// let cfg = Config { window_size: 8, verbose: true, ..Config::default() };
/// assert_eq!(cfg.window_size, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Segments in flight per `send`, and acceptance window per `recv`.
    pub window_size: usize,
    /// Report segments and lifecycle events through the verbose observer.
    pub verbose: bool,
    pub timers: TimerConfig,
    pub faults: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW,
            verbose: false,
            timers: TimerConfig::default(),
            faults: SimulatorConfig::default(),
        }
    }
}

impl Config {
    /// `window_size`, never below 1.
    pub fn window(&self) -> usize {
        self.window_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stop_and_wait_and_quiet() {
        let cfg = Config::default();
        assert_eq!(cfg.window(), 1);
        assert!(!cfg.verbose);
        assert!(cfg.faults.is_passthrough());
    }

    #[test]
    fn zero_window_is_treated_as_one() {
        let cfg = Config {
            window_size: 0,
            ..Config::default()
        };
        assert_eq!(cfg.window(), 1);
    }
}
