use anyhow::Result;
use qc_proto::ControlCommand;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::sink::ActuatorSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub cmd: ControlCommand,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    applied: Vec<Applied>,
    fail_at: Option<usize>,
}

/// Records every applied command with its (tokio) timestamp.
///
/// Clones share the same record, so a test can keep one handle while the
/// responder owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the n-th apply call (0-based, counted from now) fail with an I/O error.
    pub fn fail_at(&self, n: usize) {
        let mut g = self.lock();
        g.fail_at = Some(g.applied.len() + n);
    }

    pub fn applied(&self) -> Vec<Applied> {
        self.lock().applied.clone()
    }

    pub fn commands(&self) -> Vec<ControlCommand> {
        self.lock().applied.iter().map(|a| a.cmd).collect()
    }

    pub fn throttles(&self) -> Vec<i32> {
        self.lock().applied.iter().map(|a| a.cmd.throttle).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ActuatorSink for RecordingSink {
    async fn apply(&mut self, cmd: &ControlCommand) -> Result<()> {
        let mut g = self.lock();
        if g.fail_at == Some(g.applied.len()) {
            g.fail_at = None;
            anyhow::bail!("actuator port write failed");
        }
        g.applied.push(Applied { cmd: *cmd, at: Instant::now() });
        Ok(())
    }
}
