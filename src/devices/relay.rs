//! Relay: monitors a value (its own inputs, typically a bus or link output)
//! against a threshold and raises a root when it crosses, then emits a
//! breaker command message on trigger.

use super::relay_message::{RelayMessage, RelayMessageKind};
use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::flags::Flags;
use crate::object::{Core, ObjectId, ObjectKind};
use crate::offsets::OffsetTable;
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::{impl_identity, impl_zero_state_sizing};

#[derive(Debug, Clone)]
pub struct Relay {
    pub core: Core,
    pub offsets: OffsetTable,
    /// Weak reference to the object this relay watches; resolved by lookup
    /// through the owning area's registry, never stored as a lifetime.
    pub target: Option<ObjectId>,
    pub field: String,
    pub threshold: f64,
    pub trip_on_rising: bool,
    pub log: Vec<RelayMessage>,
}

impl_identity!(Relay, ObjectKind::Relay);
impl_zero_state_sizing!(Relay);

impl Relay {
    pub fn new(name: impl Into<String>) -> Relay {
        Relay {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            target: None,
            field: String::new(),
            threshold: 0.0,
            trip_on_rising: true,
            log: Vec::new(),
        }
    }
}

impl DeviceCapability for Relay {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, _inputs: &[f64], _sd: &StateData, _resid: &mut [f64], _mode: &SolverMode) {}

    fn root_test(&self, inputs: &[f64], _sd: &StateData, roots: &mut [f64], _mode: &SolverMode) {
        if let (Some(slot), Some(&v)) = (roots.first_mut(), inputs.first()) {
            *slot = v - self.threshold;
        }
    }

    fn root_trigger(&mut self, t: f64, _inputs: &[f64], rising: &[bool], _mode: &SolverMode) {
        let crossed_correct_direction = rising.first().copied().unwrap_or(false) == self.trip_on_rising;
        if crossed_correct_direction {
            self.core.flags.insert(Flags::ARMED);
            self.log.push(RelayMessage::new(RelayMessageKind::BreakerTripCommand, t as i32));
        }
    }

    fn root_check(&self, inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<bool> {
        vec![inputs.first().map(|&v| v > self.threshold).unwrap_or(false)]
    }

    fn get_outputs(&self, _inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        Vec::new()
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        Vec::new()
    }

    fn get_variable_type(&self, _types: &mut [VariableType], _mode: &SolverMode) {}

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "threshold" => self.threshold = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "threshold" => Ok(self.threshold),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_test_reports_zero_crossing_at_threshold() {
        let r = Relay { threshold: 0.8, ..Relay::new("r1") };
        let sd = StateData::new(0.0, &[], &[], 0);
        let mut roots = [0.0];
        r.root_test(&[0.8], &sd, &mut roots, &SolverMode::local());
        assert!(roots[0].abs() < 1e-12);
    }

    #[test]
    fn trigger_on_rising_crossing_logs_a_trip_command() {
        let mut r = Relay::new("r1");
        r.root_trigger(1.5, &[], &[true], &SolverMode::local());
        assert_eq!(r.log.len(), 1);
        assert_eq!(r.log[0].kind, RelayMessageKind::BreakerTripCommand);
    }

    #[test]
    fn trigger_on_wrong_direction_does_not_log() {
        let mut r = Relay::new("r1");
        r.root_trigger(1.5, &[], &[false], &SolverMode::local());
        assert!(r.log.is_empty());
    }
}
