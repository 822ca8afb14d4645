pub mod control;
pub mod doctor;
pub mod initiator;
pub mod responder;
mod stop;

use serde::Deserialize;
use std::time::Duration;

pub use control::{ControlState, KeyAction};
pub use initiator::{Initiator, LinkHealth};
pub use responder::{LinkState, Responder, SessionEnd};
pub use stop::StopFlag;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Responder address the initiator connects to.
    pub host: String,
    /// Address the responder listens on.
    pub bind: String,
    pub port: u16,
    /// Largest frame read in one receive call.
    pub buffer_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "10.0.0.1".into(),
            bind: "0.0.0.0".into(),
            port: 5123,
            buffer_size: 1024,
        }
    }
}

impl LinkConfig {
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub send_period_ms: u64,
    pub recv_timeout_ms: u64,
    pub landing_step_ms: u64,
    pub arm_hold_ms: u64,

    /// Pause between reconnect attempts. 0 retries immediately.
    pub reconnect_delay_ms: u64,

    /// Bound on the initiator's echo wait. 0 waits forever.
    pub echo_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            send_period_ms: 1000,
            recv_timeout_ms: 5000,
            landing_step_ms: 500,
            arm_hold_ms: 3000,
            reconnect_delay_ms: 0,
            echo_timeout_ms: 0,
        }
    }
}

impl TimingConfig {
    pub fn send_period(&self) -> Duration {
        Duration::from_millis(self.send_period_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn landing_step(&self) -> Duration {
        Duration::from_millis(self.landing_step_ms)
    }

    pub fn arm_hold(&self) -> Duration {
        Duration::from_millis(self.arm_hold_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn echo_timeout(&self) -> Option<Duration> {
        (self.echo_timeout_ms > 0).then(|| Duration::from_millis(self.echo_timeout_ms))
    }
}
