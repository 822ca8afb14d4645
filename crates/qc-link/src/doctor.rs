use anyhow::Result;

use crate::{LinkConfig, TimingConfig};

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    anyhow::ensure!(!cfg.host.is_empty(), "link.host missing");
    anyhow::ensure!(!cfg.bind.is_empty(), "link.bind missing");
    anyhow::ensure!(cfg.port > 0, "link.port must be non-zero");
    anyhow::ensure!(cfg.buffer_size >= 64, "link.buffer_size too small; a control frame needs up to ~40 bytes");
    Ok(())
}

pub fn check_timing(t: &TimingConfig) -> Result<()> {
    anyhow::ensure!(t.send_period_ms > 0, "timing.send_period_ms must be > 0");
    anyhow::ensure!(t.recv_timeout_ms > 0, "timing.recv_timeout_ms must be > 0");
    anyhow::ensure!(t.landing_step_ms > 0, "timing.landing_step_ms must be > 0");
    anyhow::ensure!(t.arm_hold_ms > 0, "timing.arm_hold_ms must be > 0");
    if t.recv_timeout_ms <= t.send_period_ms {
        tracing::warn!(
            "timing.recv_timeout_ms ({}) <= send_period_ms ({}): a healthy link will time out",
            t.recv_timeout_ms,
            t.send_period_ms
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        check_link(&LinkConfig::default()).unwrap();
        check_timing(&TimingConfig::default()).unwrap();
    }

    #[test]
    fn zero_values_fail() {
        assert!(check_link(&LinkConfig { port: 0, ..LinkConfig::default() }).is_err());
        assert!(check_link(&LinkConfig { buffer_size: 16, ..LinkConfig::default() }).is_err());
        assert!(check_timing(&TimingConfig { landing_step_ms: 0, ..TimingConfig::default() }).is_err());
        assert!(check_timing(&TimingConfig { send_period_ms: 0, ..TimingConfig::default() }).is_err());
    }
}
