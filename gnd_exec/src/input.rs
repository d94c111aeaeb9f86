//! # Chassis input sources
//!
//! The chassis is driven from two joysticks, one per side of the rover. Devices are recognised by
//! name using a [`DeviceRoleTable`]:
//!
//! - the `Left` device supplies the left axis,
//! - the `Right` device supplies the right axis and the speed slider.
//!
//! If no recognised device is attached, the [`ManualInput`] state supplies all three values.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use comms_if::tc::Wheel;
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Speed factor used when no device provides a speed slider, and the initial manual speed.
pub const DEFAULT_SPEED_FACTOR: f64 = 0.5;

/// Change in manual speed factor for one `faster` or `slower` command.
pub const SPEED_NUDGE: f64 = 0.1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identifies a device by name and gives its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRoleEntry {
    /// The device is recognised if its name contains this string.
    pub name_contains: String,

    pub role: DeviceRole,

    /// Index of the axis driving this side.
    #[serde(default = "default_drive_axis")]
    pub drive_axis: usize,

    /// Index of the speed slider axis, if this device has one.
    #[serde(default)]
    pub speed_axis: Option<usize>,

    /// Negate the drive axis, joysticks usually report forwards as negative.
    #[serde(default = "default_invert_drive")]
    pub invert_drive: bool,
}

/// Ordered table of recognised devices. The first entry matching a device's name gives its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRoleTable {
    pub entries: Vec<DeviceRoleEntry>,
}

/// The state of an attached device, sampled this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub name: String,

    /// Axis values, each in `[-1, 1]`.
    pub axes: Vec<f64>,
}

/// Operator input used when no device is attached.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualInput {
    left: f64,
    right: f64,
    speed_factor: f64,
}

/// The values actually used to drive the chassis this cycle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct ResolvedInput {
    pub left: f64,
    pub right: f64,
    pub speed_factor: f64,
    pub source: InputSource,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Left,
    Right,
}

/// Where the chassis input came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum InputSource {
    Devices,
    Manual,
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Manual
    }
}

/// An event changing the chassis controller's input state.
///
/// Events are applied to [`Controls`](crate::data_store::Controls), either from a script or from
/// the operator console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlEvent {
    /// Set the manual left axis.
    SetLeft(f64),

    /// Set the manual right axis.
    SetRight(f64),

    /// Set both manual axes.
    SetAxes { left: f64, right: f64 },

    /// Set the manual speed factor.
    SetSpeed(f64),

    /// Change the manual speed factor by the given amount.
    NudgeSpeed(f64),

    /// Lock a wheel if unlocked, or unlock it if locked.
    ToggleLock(Wheel),

    /// Replace the attached devices.
    SetDevices(Vec<DeviceSnapshot>),
}

/// Commands typed at the chassis controller's console.
#[derive(Debug, Clone, PartialEq, StructOpt)]
#[structopt(
    name = "chassis",
    global_setting = structopt::clap::AppSettings::AllowNegativeNumbers
)]
pub enum OperatorCmd {
    /// Set the left axis, in [-1, 1]
    Left { value: f64 },

    /// Set the right axis, in [-1, 1]
    Right { value: f64 },

    /// Set both axes
    Axes { left: f64, right: f64 },

    /// Zero both axes
    Stop,

    /// Set the speed factor, in [0, 1]
    Speed { value: f64 },

    /// Increase the speed factor by 0.1
    Faster,

    /// Decrease the speed factor by 0.1
    Slower,

    /// Toggle the lock on a wheel (fl, fr, rl, rr)
    Lock { wheel: Wheel },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DeviceRoleTable {
    /// The rover's driving setup: a Logitech Extreme 3D on the left and a T.Flight Hotas X, whose
    /// throttle is the speed slider, on the right.
    fn default() -> Self {
        Self {
            entries: vec![
                DeviceRoleEntry {
                    name_contains: "T.Flight Hotas X".into(),
                    role: DeviceRole::Right,
                    drive_axis: 1,
                    speed_axis: Some(2),
                    invert_drive: true,
                },
                DeviceRoleEntry {
                    name_contains: "Logitech Extreme 3D".into(),
                    role: DeviceRole::Left,
                    drive_axis: 1,
                    speed_axis: None,
                    invert_drive: true,
                },
            ],
        }
    }
}

impl DeviceRoleTable {
    /// Find the entry recognising a device name.
    pub fn role_of(&self, device_name: &str) -> Option<&DeviceRoleEntry> {
        self.entries
            .iter()
            .find(|e| device_name.contains(e.name_contains.as_str()))
    }

    /// Check the table can be used.
    pub fn validate(&self) -> Result<(), String> {
        for (i, e) in self.entries.iter().enumerate() {
            if e.name_contains.is_empty() {
                return Err(format!("entry {} has an empty name, it would match every device", i));
            }
            if e.speed_axis == Some(e.drive_axis) {
                return Err(format!(
                    "entry {} ({}) uses axis {} for both drive and speed",
                    i, e.name_contains, e.drive_axis
                ));
            }
        }

        Ok(())
    }
}

impl DeviceRoleEntry {
    /// Number of axes a device needs to fill this role.
    pub fn required_axes(&self) -> usize {
        self.speed_axis.unwrap_or(0).max(self.drive_axis) + 1
    }

    fn drive(&self, device: &DeviceSnapshot) -> f64 {
        let v = device.axes[self.drive_axis];
        if self.invert_drive {
            -v
        } else {
            v
        }
    }

    fn speed(&self, device: &DeviceSnapshot) -> Option<f64> {
        self.speed_axis
            .map(|i| clamp(lin_map((1.0, -1.0), (0.0, 1.0), device.axes[i]), 0.0, 1.0))
    }
}

impl Default for ManualInput {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            speed_factor: DEFAULT_SPEED_FACTOR,
        }
    }
}

impl ManualInput {
    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    /// Set the left axis, limited to `[-1, 1]`. Non-finite values are ignored.
    pub fn set_left(&mut self, value: f64) {
        self.left = limit_or_keep("left", value, self.left, -1.0, 1.0);
    }

    /// Set the right axis, limited to `[-1, 1]`. Non-finite values are ignored.
    pub fn set_right(&mut self, value: f64) {
        self.right = limit_or_keep("right", value, self.right, -1.0, 1.0);
    }

    /// Set the speed factor, limited to `[0, 1]`. Non-finite values are ignored.
    pub fn set_speed(&mut self, value: f64) {
        self.speed_factor = limit_or_keep("speed", value, self.speed_factor, 0.0, 1.0);
    }

    /// Change the speed factor, keeping it within `[0, 1]`.
    pub fn nudge_speed(&mut self, delta: f64) {
        self.set_speed(self.speed_factor + delta);
    }
}

impl From<OperatorCmd> for ControlEvent {
    fn from(cmd: OperatorCmd) -> Self {
        match cmd {
            OperatorCmd::Left { value } => ControlEvent::SetLeft(value),
            OperatorCmd::Right { value } => ControlEvent::SetRight(value),
            OperatorCmd::Axes { left, right } => ControlEvent::SetAxes { left, right },
            OperatorCmd::Stop => ControlEvent::SetAxes {
                left: 0.0,
                right: 0.0,
            },
            OperatorCmd::Speed { value } => ControlEvent::SetSpeed(value),
            OperatorCmd::Faster => ControlEvent::NudgeSpeed(SPEED_NUDGE),
            OperatorCmd::Slower => ControlEvent::NudgeSpeed(-SPEED_NUDGE),
            OperatorCmd::Lock { wheel } => ControlEvent::ToggleLock(wheel),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Pick the chassis input for this cycle.
///
/// If any attached device is recognised the devices are used, with a missing role giving a zero
/// axis and a missing speed slider the default speed factor. Devices with too few axes for their
/// role are ignored. If several devices share a role the last one attached is used.
pub fn resolve_input(
    table: &DeviceRoleTable,
    devices: &[DeviceSnapshot],
    manual: &ManualInput,
) -> ResolvedInput {
    let mut left_dev = None;
    let mut right_dev = None;

    for device in devices {
        if let Some(entry) = table.role_of(&device.name) {
            if device.axes.len() < entry.required_axes() {
                continue;
            }

            match entry.role {
                DeviceRole::Left => left_dev = Some((entry, device)),
                DeviceRole::Right => right_dev = Some((entry, device)),
            }
        }
    }

    if left_dev.is_none() && right_dev.is_none() {
        return ResolvedInput {
            left: manual.left,
            right: manual.right,
            speed_factor: manual.speed_factor,
            source: InputSource::Manual,
        };
    }

    let mut input = ResolvedInput {
        left: 0.0,
        right: 0.0,
        speed_factor: DEFAULT_SPEED_FACTOR,
        source: InputSource::Devices,
    };

    if let Some((entry, device)) = right_dev {
        input.right = entry.drive(device);
        if let Some(s) = entry.speed(device) {
            input.speed_factor = s;
        }
    }

    if let Some((entry, device)) = left_dev {
        input.left = entry.drive(device);
    }

    input
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_drive_axis() -> usize {
    1
}

fn default_invert_drive() -> bool {
    true
}

/// Clamp `value` into `[min, max]`, or keep `current` if `value` is NaN or infinite.
fn limit_or_keep(name: &str, value: f64, current: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        clamp(value, min, max)
    } else {
        warn!("Ignoring non-finite {} value {}", name, value);
        current
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn hotas(drive: f64, slider: f64) -> DeviceSnapshot {
        DeviceSnapshot {
            name: "Thrustmaster T.Flight Hotas X".into(),
            axes: vec![0.0, drive, slider, 0.0],
        }
    }

    fn logitech(drive: f64) -> DeviceSnapshot {
        DeviceSnapshot {
            name: "Logitech Extreme 3D pro".into(),
            axes: vec![0.0, drive],
        }
    }

    #[test]
    fn test_both_devices() {
        let table = DeviceRoleTable::default();
        let input = resolve_input(
            &table,
            &[hotas(-1.0, -1.0), logitech(0.5)],
            &ManualInput::default(),
        );

        assert_eq!(input.source, InputSource::Devices);
        assert_eq!(input.right, 1.0);
        assert_eq!(input.left, -0.5);
        assert_eq!(input.speed_factor, 1.0);
    }

    #[test]
    fn test_missing_role_defaults() {
        let table = DeviceRoleTable::default();

        // Only the left stick, the manual state is not used
        let mut manual = ManualInput::default();
        manual.set_right(1.0);
        let input = resolve_input(&table, &[logitech(-1.0)], &manual);
        assert_eq!(input.source, InputSource::Devices);
        assert_eq!(input.left, 1.0);
        assert_eq!(input.right, 0.0);
        assert_eq!(input.speed_factor, DEFAULT_SPEED_FACTOR);

        // Only the right stick, slider centred
        let input = resolve_input(&table, &[hotas(0.5, 0.0)], &manual);
        assert_eq!(input.left, 0.0);
        assert_eq!(input.right, -0.5);
        assert_eq!(input.speed_factor, 0.5);
    }

    #[test]
    fn test_manual_fallback() {
        let table = DeviceRoleTable::default();
        let mut manual = ManualInput::default();
        manual.set_left(1.0);
        manual.set_right(-1.0);

        let unknown = DeviceSnapshot {
            name: "Gamepad".into(),
            axes: vec![0.3; 6],
        };

        // Too few axes for the right role
        let short_hotas = DeviceSnapshot {
            name: "T.Flight Hotas X".into(),
            axes: vec![0.0, 1.0],
        };

        for devices in [vec![], vec![unknown], vec![short_hotas]].iter() {
            let input = resolve_input(&table, devices, &manual);
            assert_eq!(input.source, InputSource::Manual);
            assert_eq!((input.left, input.right), (1.0, -1.0));
            assert_eq!(input.speed_factor, 0.5);
        }
    }

    #[test]
    fn test_manual_limits() {
        let mut manual = ManualInput::default();

        for _ in 0..10 {
            manual.nudge_speed(SPEED_NUDGE);
        }
        assert_eq!(manual.speed_factor(), 1.0);

        for _ in 0..20 {
            manual.nudge_speed(-SPEED_NUDGE);
        }
        assert_eq!(manual.speed_factor(), 0.0);

        manual.set_left(-3.0);
        assert_eq!(manual.left(), -1.0);
    }

    #[test]
    fn test_manual_rejects_non_finite() {
        let mut manual = ManualInput::default();
        manual.set_speed(0.5);
        manual.set_left(0.25);

        manual.set_speed(f64::NAN);
        manual.set_left(f64::INFINITY);
        manual.set_right(f64::NEG_INFINITY);
        assert_eq!(manual.speed_factor(), 0.5);
        assert_eq!(manual.left(), 0.25);
        assert_eq!(manual.right(), 0.0);

        // Nudging still works afterwards
        manual.nudge_speed(SPEED_NUDGE);
        assert!(manual.speed_factor() > 0.5);
    }

    #[test]
    fn test_validate() {
        assert!(DeviceRoleTable::default().validate().is_ok());

        let mut table = DeviceRoleTable::default();
        table.entries[0].speed_axis = Some(1);
        assert!(table.validate().is_err());

        table.entries[0].speed_axis = None;
        table.entries[1].name_contains = String::new();
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_operator_cmd() {
        let cmd = OperatorCmd::from_iter_safe(vec!["chassis", "axes", "-1", "0.5"]).unwrap();
        assert_eq!(
            ControlEvent::from(cmd),
            ControlEvent::SetAxes {
                left: -1.0,
                right: 0.5
            }
        );

        let cmd = OperatorCmd::from_iter_safe(vec!["chassis", "lock", "rl"]).unwrap();
        assert_eq!(ControlEvent::from(cmd), ControlEvent::ToggleLock(Wheel::RearLeft));

        assert!(OperatorCmd::from_iter_safe(vec!["chassis", "lock", "middle"]).is_err());
    }

    #[test]
    fn test_event_json() {
        let event: ControlEvent = serde_json::from_str(r#"{"ToggleLock": "front_left"}"#).unwrap();
        assert_eq!(event, ControlEvent::ToggleLock(Wheel::FrontLeft));

        let event: ControlEvent =
            serde_json::from_str(r#"{"SetAxes": {"left": 1.0, "right": -1.0}}"#).unwrap();
        assert_eq!(
            event,
            ControlEvent::SetAxes {
                left: 1.0,
                right: -1.0
            }
        );
    }
}
