//! # Science module control
//!
//! Operator actions on the science module are turned into [`ScienceInputs`], the raw slider and
//! button values, and those are assembled into a [`ScienceCommand`]. Every action produces a full
//! command, fields not touched by the action are zero.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use thiserror::Error;

use comms_if::tc::{ScienceCommand, PWM_MAX, ROTATE_MAX};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Raw values from the science controls.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct ScienceInputs {
    /// Drill slider, `[-255, 255]`
    pub drill: f64,

    /// Elevator slider, `[-255, 255]`
    pub elev: f64,

    /// Conveyor direction, `-1`, `0` or `1`
    pub conv: i32,

    /// Research sequence button
    pub res_seq: bool,

    /// Carousel rotation slider, `[0, 16000]`
    pub rotate: f64,

    /// Reset button
    pub reset: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Actions the operator can take on the science module.
#[derive(Debug, Clone, PartialEq, StructOpt, Serialize, Deserialize)]
#[structopt(
    name = "science",
    global_setting = structopt::clap::AppSettings::AllowNegativeNumbers
)]
pub enum ScienceAction {
    /// Run the drill at the given speed, in [-255, 255]
    Drill { speed: f64 },

    /// Run the elevator at the given speed, in [-255, 255]
    Elev { speed: f64 },

    /// Run the conveyor (-1 reverse, 0 stop, 1 forward)
    Conv { dir: i32 },

    /// Stop all science motors
    Stop,

    /// Start the research sequence
    Seq,

    /// Rotate the carousel to the given target, in [0, 16000]
    Rotate { target: f64 },

    /// Rotate the carousel to the mirror of the given target (16000 - target)
    RotateMirror { target: f64 },

    /// Reset the science module
    Reset,
}

#[derive(Debug, Error, PartialEq)]
pub enum SciCtrlError {
    #[error("Motor speed {0} is outside [-255, 255]")]
    SpeedOutOfRange(f64),

    #[error("Conveyor direction must be -1, 0 or 1, found {0}")]
    InvalidConvDir(i32),

    #[error("Rotation target {0} is outside [0, 16000]")]
    RotateOutOfRange(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScienceAction {
    /// Check the action's values are within the science module's ranges.
    ///
    /// The module does not clamp what it is sent, so out of range actions must not be published.
    pub fn validate(&self) -> Result<(), SciCtrlError> {
        let max_speed = PWM_MAX as f64;

        match *self {
            ScienceAction::Drill { speed } | ScienceAction::Elev { speed } => {
                if !(-max_speed..=max_speed).contains(&speed) {
                    return Err(SciCtrlError::SpeedOutOfRange(speed));
                }
            }
            ScienceAction::Conv { dir } => {
                if !(-1..=1).contains(&dir) {
                    return Err(SciCtrlError::InvalidConvDir(dir));
                }
            }
            ScienceAction::Rotate { target } | ScienceAction::RotateMirror { target } => {
                if !(0.0..=ROTATE_MAX as f64).contains(&target) {
                    return Err(SciCtrlError::RotateOutOfRange(target));
                }
            }
            ScienceAction::Stop | ScienceAction::Seq | ScienceAction::Reset => (),
        }

        Ok(())
    }

    /// True if the operator must confirm the action before it is sent.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, ScienceAction::Reset)
    }

    /// The control values this action corresponds to.
    pub fn to_inputs(&self) -> ScienceInputs {
        let mut inputs = ScienceInputs::default();

        match *self {
            ScienceAction::Drill { speed } => inputs.drill = speed,
            ScienceAction::Elev { speed } => inputs.elev = speed,
            ScienceAction::Conv { dir } => inputs.conv = dir,
            ScienceAction::Stop => (),
            ScienceAction::Seq => inputs.res_seq = true,
            ScienceAction::Rotate { target } => inputs.rotate = target,
            ScienceAction::RotateMirror { target } => inputs.rotate = ROTATE_MAX as f64 - target,
            ScienceAction::Reset => inputs.reset = true,
        }

        inputs
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Assemble the science command for the given inputs.
///
/// Slider values are truncated toward zero, nothing is clamped.
pub fn map_science(inputs: &ScienceInputs) -> ScienceCommand {
    ScienceCommand {
        drill: inputs.drill as i32,
        elev: inputs.elev as i32,
        conv: inputs.conv,
        res_seq: inputs.res_seq as i32,
        rotate: inputs.rotate as i32,
        reset: inputs.reset as i32,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn parse(line: &str) -> ScienceAction {
        ScienceAction::from_iter_safe(
            std::iter::once("science").chain(line.split_whitespace()),
        )
        .unwrap()
    }

    #[test]
    fn test_actions_to_commands() {
        let cmd = map_science(&parse("drill -120.7").to_inputs());
        assert_eq!(
            cmd,
            ScienceCommand {
                drill: -120,
                ..Default::default()
            }
        );

        let cmd = map_science(&parse("conv -1").to_inputs());
        assert_eq!(cmd.conv, -1);
        assert_eq!(cmd.drill, 0);

        assert_eq!(map_science(&parse("seq").to_inputs()).res_seq, 1);
        assert_eq!(map_science(&parse("reset").to_inputs()).reset, 1);
        assert_eq!(map_science(&parse("stop").to_inputs()), ScienceCommand::default());
    }

    #[test]
    fn test_rotate_shapes() {
        assert_eq!(map_science(&parse("rotate 2666").to_inputs()).rotate, 2666);
        assert_eq!(
            map_science(&parse("rotate-mirror 2666").to_inputs()).rotate,
            16000 - 2666
        );
        assert_eq!(map_science(&parse("rotate-mirror 0").to_inputs()).rotate, 16000);
    }

    #[test]
    fn test_validate() {
        assert!(parse("drill 255").validate().is_ok());
        assert_eq!(
            parse("elev -256").validate(),
            Err(SciCtrlError::SpeedOutOfRange(-256.0))
        );
        assert_eq!(parse("conv 2").validate(), Err(SciCtrlError::InvalidConvDir(2)));
        assert_eq!(
            parse("rotate 16001").validate(),
            Err(SciCtrlError::RotateOutOfRange(16001.0))
        );
        assert!(parse("rotate-mirror 16000").validate().is_ok());
    }

    #[test]
    fn test_confirmation() {
        assert!(parse("reset").requires_confirmation());
        assert!(!parse("seq").requires_confirmation());
    }
}
