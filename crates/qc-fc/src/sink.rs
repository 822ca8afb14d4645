use anyhow::{Context, Result};
use qc_proto::ControlCommand;
use std::future::Future;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::{SinkConfig, SinkKind};

/// Render a command in the flight controller's `sa` syntax:
/// `sa <roll*10> <-pitch*10> <throttle*20-1000> <-yaw*10> <+/-1000>\n`.
pub fn sa_line(cmd: &ControlCommand) -> String {
    format!(
        "sa {} {} {} {} {}\n",
        cmd.roll * 10,
        -cmd.pitch * 10,
        cmd.throttle * 20 - 1000,
        -cmd.yaw * 10,
        if cmd.autolevel { 1000 } else { -1000 },
    )
}

/// Consumer of actuator commands. Writes are applied in call order and never concurrently.
pub trait ActuatorSink {
    fn apply(&mut self, cmd: &ControlCommand) -> impl Future<Output = Result<()>> + Send;
}

/// Writes `sa` lines to any byte stream.
pub struct LineSink<W> {
    port: W,
}

impl<W: AsyncWrite + Unpin + Send> LineSink<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }

    pub fn into_inner(self) -> W {
        self.port
    }
}

impl<W: AsyncWrite + Unpin + Send> ActuatorSink for LineSink<W> {
    async fn apply(&mut self, cmd: &ControlCommand) -> Result<()> {
        let line = sa_line(cmd);
        self.port.write_all(line.as_bytes()).await.context("write actuator line")?;
        self.port.flush().await.context("flush actuator line")?;
        debug!("sink: {}", line.trim_end());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogSink {
    written: u64,
}

impl ActuatorSink for LogSink {
    async fn apply(&mut self, cmd: &ControlCommand) -> Result<()> {
        self.written += 1;
        info!("sink[{}]: {}", self.written, sa_line(cmd).trim_end());
        Ok(())
    }
}

pub enum AnySink {
    Serial(LineSink<SerialStream>),
    Log(LogSink),
}

impl AnySink {
    pub fn open(cfg: &SinkConfig) -> Result<Self> {
        match cfg.kind {
            SinkKind::Serial => {
                let dev = cfg.serial_dev.as_deref().context("sink.serial_dev missing")?;
                let port = tokio_serial::new(dev, cfg.baud)
                    .open_native_async()
                    .with_context(|| format!("open actuator serial device {}", dev))?;
                info!("sink: serial {} @ {}", dev, cfg.baud);
                Ok(Self::Serial(LineSink::new(port)))
            }
            SinkKind::Log => {
                info!("sink: log only, no actuator attached");
                Ok(Self::Log(LogSink::default()))
            }
        }
    }
}

impl ActuatorSink for AnySink {
    async fn apply(&mut self, cmd: &ControlCommand) -> Result<()> {
        match self {
            AnySink::Serial(s) => s.apply(cmd).await,
            AnySink::Log(s) => s.apply(cmd).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_line() {
        assert_eq!(sa_line(&ControlCommand::NEUTRAL), "sa 0 0 -1000 0 1000\n");
    }

    #[test]
    fn scaling_is_linear_per_axis() {
        let c = ControlCommand { throttle: 57, pitch: 10, roll: -10, yaw: 3, autolevel: false };
        assert_eq!(sa_line(&c), format!("sa -100 -100 {} -30 -1000\n", 57 * 20 - 1000));

        let full = ControlCommand::with_throttle(100);
        assert_eq!(sa_line(&full), "sa 0 0 1000 0 1000\n");
    }

    #[tokio::test]
    async fn line_sink_writes_one_line_per_command() {
        let mut sink = LineSink::new(Vec::new());
        sink.apply(&ControlCommand::with_throttle(50)).await.unwrap();
        sink.apply(&ControlCommand::NEUTRAL).await.unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "sa 0 0 0 0 1000\nsa 0 0 -1000 0 1000\n");
    }

    #[test]
    fn log_sink_needs_no_device() {
        let cfg: SinkConfig = toml::from_str("kind = \"log\"").unwrap();
        assert!(matches!(AnySink::open(&cfg), Ok(AnySink::Log(_))));
    }

    #[test]
    fn serial_sink_requires_device() {
        let cfg = SinkConfig { kind: SinkKind::Serial, serial_dev: None, baud: 9600 };
        assert!(AnySink::open(&cfg).is_err());
    }
}
