//! Implementations for the ChassisCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace};
use serde::Serialize;

// Internal
use super::{map_chassis, ChassisCtrlError, ChassisMapping, WheelLockSet};
use crate::input::{resolve_input, DeviceRoleTable, DeviceSnapshot, InputSource, ManualInput};
use comms_if::tc::NUM_WHEELS;
use util::{module::State, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Chassis control module state
#[derive(Default)]
pub struct ChassisCtrl {
    device_roles: DeviceRoleTable,

    report: StatusReport,
}

/// Input data to Chassis Control.
#[derive(Debug, Default, Clone)]
pub struct InputData {
    /// Devices attached this cycle.
    pub devices: Vec<DeviceSnapshot>,

    /// Fallback input if no recognised device is attached.
    pub manual: ManualInput,

    pub locks: WheelLockSet,
}

/// Status report for ChassisCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug, PartialEq)]
pub struct StatusReport {
    /// Where this cycle's input came from.
    pub source: InputSource,

    /// Wheels which were forced to zero by a lock.
    pub wheel_locked: [bool; NUM_WHEELS],

    /// A side's demand had to be limited to the PWM range.
    pub demand_limited: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for ChassisCtrl {
    type InitData = DeviceRoleTable;
    type InitError = ChassisCtrlError;

    type InputData = InputData;
    type OutputData = ChassisMapping;
    type StatusReport = StatusReport;
    type ProcError = ChassisCtrlError;

    /// Initialise the ChassisCtrl module.
    ///
    /// Expected init data is the table used to recognise the attached devices, which is archived
    /// in the session.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        init_data
            .validate()
            .map_err(ChassisCtrlError::InvalidDeviceRoles)?;

        for entry in init_data.entries.iter() {
            info!(
                "    {:?} device: \"{}\" (drive axis {}, speed axis {:?})",
                entry.role, entry.name_contains, entry.drive_axis, entry.speed_axis
            );
        }

        session.save("chassis_ctrl/device_roles.json", init_data.clone());

        self.device_roles = init_data;

        Ok(())
    }

    /// Perform cyclic processing of Chassis Control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        // Clear the status report
        self.report = StatusReport::default();

        let input = resolve_input(&self.device_roles, &input_data.devices, &input_data.manual);

        let output = map_chassis(input.left, input.right, input.speed_factor, &input_data.locks);

        self.report.source = input.source;
        self.report.wheel_locked = input_data.locks.flags();
        self.report.demand_limited = output.clamped;

        trace!(
            "ChassisCtrl output: {:?} (max {}) from {:?}",
            output.cmd.wheels(),
            output.dynamic_max,
            input
        );

        Ok((output, self.report))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::{ChassisCommand, Wheel};

    #[test]
    fn test_proc_manual() {
        let mut cc = ChassisCtrl::default();

        let mut input = InputData::default();
        input.manual.set_left(1.0);
        input.manual.set_right(-1.0);
        input.locks.set(Wheel::FrontLeft, true);

        let (output, report) = cc.proc(&input).unwrap();

        assert_eq!(output.cmd, ChassisCommand::from_wheels([0, -127, 127, -127]));
        assert_eq!(output.dynamic_max, 127);
        assert_eq!(report.source, InputSource::Manual);
        assert_eq!(report.wheel_locked, [true, false, false, false]);
        assert!(!report.demand_limited);
    }

    #[test]
    fn test_proc_devices() {
        let mut cc = ChassisCtrl {
            device_roles: DeviceRoleTable::default(),
            ..Default::default()
        };

        let input = InputData {
            devices: vec![DeviceSnapshot {
                name: "T.Flight Hotas X".into(),
                axes: vec![0.0, -1.0, -1.0],
            }],
            ..Default::default()
        };

        let (output, report) = cc.proc(&input).unwrap();

        assert_eq!(output.cmd, ChassisCommand::from_wheels([0, 255, 0, 255]));
        assert_eq!(output.dynamic_max, 255);
        assert_eq!(report.source, InputSource::Devices);
    }
}
