use anyhow::Result;

use crate::{SinkConfig, SinkKind};

pub fn check_sink(cfg: &SinkConfig) -> Result<()> {
    if cfg.kind == SinkKind::Serial {
        anyhow::ensure!(
            cfg.serial_dev.as_ref().map(|s| !s.is_empty()).unwrap_or(false),
            "sink.serial_dev missing"
        );
        anyhow::ensure!(cfg.baud > 0, "sink.baud invalid");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        check_sink(&SinkConfig::default()).unwrap();
    }

    #[test]
    fn serial_without_device_fails() {
        let cfg = SinkConfig { serial_dev: Some(String::new()), ..SinkConfig::default() };
        assert!(check_sink(&cfg).is_err());
        let cfg = SinkConfig { baud: 0, ..SinkConfig::default() };
        assert!(check_sink(&cfg).is_err());
    }

    #[test]
    fn log_sink_ignores_serial_fields() {
        let cfg = SinkConfig { kind: SinkKind::Log, serial_dev: None, baud: 0 };
        check_sink(&cfg).unwrap();
    }
}
