//! Operator-side control state and the keyboard mapping that mutates it.
//!
//! The sender reads a whole `ControlCommand` under one lock, so it never observes
//! a half-applied keypress. Most recent write wins; a value that is one send
//! period stale is harmless.

use qc_proto::command::{AXIS_LIMIT, THROTTLE_MAX};
use qc_proto::ControlCommand;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::StopFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Updated(ControlCommand),
    Quit,
}

pub const HELP: &str = "\
Pitch Fwd:   W    Back: S       Roll Left:  A    Right: D
Yaw CCW:     Q    CW:   E       Centre Pitch/Roll/Yaw:  X
Throttle Up: P    Down: L       Quit: SPACE
Keys are read line by line: follow each key (or a run of keys) with Enter.
";

#[derive(Debug, Clone, Default)]
pub struct ControlState {
    inner: Arc<Mutex<ControlCommand>>,
}

impl ControlState {
    pub fn new(initial: ControlCommand) -> Self {
        Self { inner: Arc::new(Mutex::new(initial)) }
    }

    pub fn snapshot(&self) -> ControlCommand {
        *self.lock()
    }

    pub fn set(&self, cmd: ControlCommand) {
        *self.lock() = cmd;
    }

    /// Apply one keypress. Any key that is not an axis key recentres that axis;
    /// throttle only moves on `p`/`l`.
    pub fn apply_key(&self, key: char) -> KeyAction {
        let mut c = self.lock();
        c.roll = match key {
            'a' => -AXIS_LIMIT,
            'd' => AXIS_LIMIT,
            _ => 0,
        };
        c.pitch = match key {
            'w' => AXIS_LIMIT,
            's' => -AXIS_LIMIT,
            _ => 0,
        };
        c.yaw = match key {
            'q' => -AXIS_LIMIT,
            'e' => AXIS_LIMIT,
            _ => 0,
        };
        match key {
            'p' if c.throttle < THROTTLE_MAX => c.throttle += 1,
            'l' if c.throttle > 0 => c.throttle -= 1,
            _ => {}
        }
        if key == ' ' {
            return KeyAction::Quit;
        }
        KeyAction::Updated(*c)
    }

    fn lock(&self) -> MutexGuard<'_, ControlCommand> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Feed keypresses from `input` into `state` until quit or end of input.
///
/// Line terminators are skipped so a cooked terminal behaves like a raw one.
/// Quit raises `stop`; end of input leaves the last state in place.
pub fn run_keyboard<R: Read>(input: R, state: &ControlState, stop: &StopFlag) -> std::io::Result<()> {
    for byte in input.bytes() {
        let key = byte? as char;
        if key == '\n' || key == '\r' {
            continue;
        }
        match state.apply_key(key.to_ascii_lowercase()) {
            KeyAction::Quit => {
                info!("input: quit requested");
                stop.raise();
                return Ok(());
            }
            KeyAction::Updated(c) => debug!("input: {}", c),
        }
    }
    info!("input: end of input, holding last command");
    Ok(())
}
