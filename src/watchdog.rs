//! Idle watchdog
//!
//! Flags a quiet wire. The monitor loop touches the watchdog on every
//! packet and polls it per packet and on a timer tick; expiry is a normal
//! termination signal, not an error.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks time since the last received packet
#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    idle_timeout: Duration,
    last_packet: Option<Instant>,
    armed_at: Instant,
}

impl IdleWatchdog {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            last_packet: None,
            armed_at: Instant::now(),
        }
    }

    /// Record packet arrival
    pub fn touch(&mut self) {
        self.last_packet = Some(Instant::now());
    }

    /// True once no packet has arrived within the idle interval. Before the
    /// first packet the clock runs from arming, so an entirely silent wire
    /// still times out.
    pub fn expired(&self) -> bool {
        let reference = self.last_packet.unwrap_or(self.armed_at);
        reference.elapsed() >= self.idle_timeout
    }

    /// Configured idle interval
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}
