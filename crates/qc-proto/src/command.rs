use serde::{Deserialize, Serialize};
use std::fmt;

use crate::frame::{self, Frame};
use crate::ProtoError;

/// Message kind for periodic control frames.
pub const CONTROL_TAG: &str = "QCCON";

pub const THROTTLE_MAX: i32 = 100;
/// Pitch/roll/yaw are bounded to +/- this by the input side; the codec does not enforce it.
pub const AXIS_LIMIT: i32 = 10;

const FIELDS: usize = 5;

/// Most recent desired command: throttle in percent, attitude axes in the operator's units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub throttle: i32,
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
    pub autolevel: bool,
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl ControlCommand {
    pub const NEUTRAL: ControlCommand =
        ControlCommand { throttle: 0, pitch: 0, roll: 0, yaw: 0, autolevel: true };

    /// Throttle only, every other axis centred and autolevel on.
    pub fn with_throttle(throttle: i32) -> Self {
        Self { throttle, ..Self::NEUTRAL }
    }

    pub fn values(&self) -> [i32; FIELDS] {
        [self.throttle, self.pitch, self.roll, self.yaw, self.autolevel as i32]
    }

    pub fn to_frame(&self) -> String {
        frame::encode(CONTROL_TAG, &self.values())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtoError> {
        if frame.tag != CONTROL_TAG {
            return Err(ProtoError::UnknownTag(frame.tag.clone()));
        }
        match *frame.values.as_slice() {
            [throttle, pitch, roll, yaw, level] => {
                Ok(Self { throttle, pitch, roll, yaw, autolevel: level > 0 })
            }
            _ => Err(ProtoError::WrongArity { expected: FIELDS, found: frame.values.len() }),
        }
    }

    /// Decode a raw `$QCCON,...*CS` frame. The tag is checked before any value
    /// is parsed, so a foreign sentence is `UnknownTag` whatever its fields hold.
    pub fn parse(raw: &str) -> Result<Self, ProtoError> {
        let frame = frame::decode_raw(raw)?;
        if frame.tag != CONTROL_TAG {
            return Err(ProtoError::UnknownTag(frame.tag.to_string()));
        }
        Self::from_frame(&Frame { tag: frame.tag.to_string(), values: frame.values()? })
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "THR {:03}  PIT {:03}  ROL {:03}  YAW {:03}  LEV {:03}",
            self.throttle, self.pitch, self.roll, self.yaw, self.autolevel as i32
        )
    }
}
