pub mod arming;
pub mod doctor;
pub mod sink;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use serde::Deserialize;

pub use sink::{sa_line, ActuatorSink, AnySink, LineSink, LogSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// `sa ...` lines on a serial port to the flight controller.
    Serial,
    /// Log every line instead of writing it (bench runs without hardware).
    Log,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,

    /// Serial device of the flight controller, e.g. "/dev/ttyAMA0".
    pub serial_dev: Option<String>,
    pub baud: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Serial,
            serial_dev: Some("/dev/ttyAMA0".into()),
            baud: 9600,
        }
    }
}
