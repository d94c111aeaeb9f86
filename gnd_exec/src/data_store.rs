//! # Data Store
//!
//! [`SharedControls`] holds the operator's wheel locks, manual input and attached devices. It is
//! written by whichever thread handles the operator and read by the main loop each cycle.
//! [`DataStore`] holds everything else the chassis controller's main loop carries between cycles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use serde::Serialize;

use crate::{
    chassis_ctrl::{self, ChassisMapping, WheelLockSet},
    input::{ControlEvent, DeviceSnapshot, ManualInput},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Operator controlled state of the chassis controller.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Controls {
    pub locks: WheelLockSet,
    pub manual: ManualInput,
    pub devices: Vec<DeviceSnapshot>,
}

/// Handle to controls shared between threads.
#[derive(Debug, Default, Clone)]
pub struct SharedControls {
    inner: Arc<Mutex<Controls>>,
}

/// Data store for the chassis controller executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    // ChassisCtrl
    pub chassis_ctrl: chassis_ctrl::ChassisCtrl,
    pub chassis_ctrl_input: chassis_ctrl::InputData,
    pub chassis_ctrl_output: ChassisMapping,
    pub chassis_ctrl_status_rpt: chassis_ctrl::StatusReport,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Controls {
    /// Apply an operator event.
    pub fn apply(&mut self, event: &ControlEvent) {
        match event {
            ControlEvent::SetLeft(v) => self.manual.set_left(*v),
            ControlEvent::SetRight(v) => self.manual.set_right(*v),
            ControlEvent::SetAxes { left, right } => {
                self.manual.set_left(*left);
                self.manual.set_right(*right);
            }
            ControlEvent::SetSpeed(v) => self.manual.set_speed(*v),
            ControlEvent::NudgeSpeed(d) => self.manual.nudge_speed(*d),
            ControlEvent::ToggleLock(wheel) => {
                let locked = self.locks.toggle(*wheel);
                info!(
                    "{} wheel {}",
                    wheel.name(),
                    if locked { "LOCKED" } else { "unlocked" }
                );
            }
            ControlEvent::SetDevices(devices) => self.devices = devices.clone(),
        }
    }
}

impl SharedControls {
    pub fn new(controls: Controls) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controls)),
        }
    }

    /// Apply an operator event.
    pub fn apply(&self, event: &ControlEvent) {
        self.lock().apply(event)
    }

    /// Copy of the current controls.
    pub fn snapshot(&self) -> Controls {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Controls> {
        // Events are applied whole, a poisoned lock still holds consistent controls
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DataStore {
    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        let cycles_per_second = (cycle_frequency_hz as u128).max(1);
        self.is_1_hz_cycle = self.num_cycles % cycles_per_second == 0;

        self.chassis_ctrl_input = chassis_ctrl::InputData::default();
        self.chassis_ctrl_output = ChassisMapping::default();
        self.chassis_ctrl_status_rpt = chassis_ctrl::StatusReport::default();
    }

    /// Perform actions required at the end of a cycle.
    pub fn cycle_end(&mut self) {
        self.num_cycles += 1;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::Wheel;

    #[test]
    fn test_apply_events() {
        let shared = SharedControls::default();
        let other = shared.clone();

        other.apply(&ControlEvent::SetAxes {
            left: 1.0,
            right: -2.0,
        });
        other.apply(&ControlEvent::NudgeSpeed(0.2));
        other.apply(&ControlEvent::ToggleLock(Wheel::FrontRight));
        other.apply(&ControlEvent::ToggleLock(Wheel::RearLeft));
        other.apply(&ControlEvent::ToggleLock(Wheel::RearLeft));

        let c = shared.snapshot();
        assert_eq!(c.manual.left(), 1.0);
        assert_eq!(c.manual.right(), -1.0);
        assert!((c.manual.speed_factor() - 0.7).abs() < 1e-9);
        assert_eq!(c.locks.locked_wheels(), vec![Wheel::FrontRight]);
    }

    #[test]
    fn test_cycle_flags() {
        let mut ds = DataStore::default();

        let mut one_hz = 0;
        for _ in 0..40 {
            ds.cycle_start(20.0);
            if ds.is_1_hz_cycle {
                one_hz += 1;
            }
            ds.cycle_end();
        }

        assert_eq!(one_hz, 2);
        assert_eq!(ds.num_cycles, 40);
    }

    #[test]
    fn test_drive_square_script() {
        use util::script_interpreter::{PendingItems, ScriptInterpreter};

        let mut si: ScriptInterpreter<ControlEvent> = ScriptInterpreter::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../scripts/drive_square.txt"
        ))
        .unwrap();

        let mut controls = Controls::default();

        match si.get_pending_at(12.0) {
            PendingItems::Some(events) => events.iter().for_each(|e| controls.apply(e)),
            p => panic!("Expected events, got {:?}", p),
        }
        assert_eq!(controls.locks.locked_wheels(), vec![Wheel::RearRight]);
        assert!((controls.manual.speed_factor() - 0.3).abs() < 1e-9);

        match si.get_pending_at(20.0) {
            PendingItems::Some(events) => events.iter().for_each(|e| controls.apply(e)),
            p => panic!("Expected events, got {:?}", p),
        }
        assert!(controls.locks.locked_wheels().is_empty());
        assert_eq!((controls.manual.left(), controls.manual.right()), (0.0, 0.0));
        assert_eq!(si.get_pending_at(20.0), PendingItems::EndOfScript);
    }
}
