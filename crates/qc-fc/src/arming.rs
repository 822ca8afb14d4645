//! Timed arm/disarm handshakes.
//!
//! The flight controller arms on full-right yaw at zero throttle and disarms on
//! full-left yaw, each held for a few seconds. Both sequences end back at neutral.
//! They are not interruptible.

use anyhow::Result;
use qc_proto::ControlCommand;
use std::time::Duration;
use tracing::info;

use crate::sink::ActuatorSink;

/// Yaw stick deflection used for the handshakes, in the command's percent units.
pub const SPIN_YAW: i32 = 100;

pub fn arm_command() -> ControlCommand {
    ControlCommand { yaw: SPIN_YAW, ..ControlCommand::NEUTRAL }
}

pub fn disarm_command() -> ControlCommand {
    ControlCommand { yaw: -SPIN_YAW, ..ControlCommand::NEUTRAL }
}

pub async fn idle<S: ActuatorSink>(sink: &mut S) -> Result<()> {
    sink.apply(&ControlCommand::NEUTRAL).await
}

pub async fn arm<S: ActuatorSink>(sink: &mut S, hold: Duration) -> Result<()> {
    info!("fc: arming (hold {:?})", hold);
    hold_then_idle(sink, arm_command(), hold).await
}

pub async fn disarm<S: ActuatorSink>(sink: &mut S, hold: Duration) -> Result<()> {
    info!("fc: disarming (hold {:?})", hold);
    hold_then_idle(sink, disarm_command(), hold).await
}

async fn hold_then_idle<S: ActuatorSink>(sink: &mut S, cmd: ControlCommand, hold: Duration) -> Result<()> {
    sink.apply(&cmd).await?;
    tokio::time::sleep(hold).await;
    idle(sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSink;
    use crate::sa_line;

    #[test]
    fn handshake_lines() {
        assert_eq!(sa_line(&arm_command()), "sa 0 0 -1000 -1000 1000\n");
        assert_eq!(sa_line(&disarm_command()), "sa 0 0 -1000 1000 1000\n");
    }

    #[tokio::test(start_paused = true)]
    async fn arm_holds_then_returns_to_neutral() {
        let mut sink = RecordingSink::new();
        let t0 = tokio::time::Instant::now();
        arm(&mut sink, Duration::from_secs(3)).await.unwrap();

        let applied = sink.applied();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].cmd, arm_command());
        assert_eq!(applied[1].cmd, ControlCommand::NEUTRAL);
        assert_eq!(applied[0].at - t0, Duration::ZERO);
        assert_eq!(applied[1].at - applied[0].at, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_uses_opposite_yaw() {
        let mut sink = RecordingSink::new();
        disarm(&mut sink, Duration::from_millis(10)).await.unwrap();
        assert_eq!(sink.commands(), vec![disarm_command(), ControlCommand::NEUTRAL]);
    }
}
