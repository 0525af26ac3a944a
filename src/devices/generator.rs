//! Generator: a scheduled real/reactive power injection with PQ limits and
//! a power-flow-adjustment path for reactive capability and slack promotion.

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::flags::{ChangeCode, Flags};
use crate::object::{Core, ObjectKind};
use crate::offsets::OffsetTable;
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::units::Limit;
use crate::{impl_identity, impl_zero_state_sizing};

#[derive(Debug, Clone)]
pub struct Generator {
    pub core: Core,
    pub offsets: OffsetTable,
    pub p_set: f64,
    pub q_set: f64,
    pub q_limits: Limit<f64>,
    pub p_limits: Limit<f64>,
    /// `true` when this generator regulates bus voltage (PV-capable).
    pub voltage_control: bool,
}

impl_identity!(Generator, ObjectKind::Generator);
impl_zero_state_sizing!(Generator);

impl Generator {
    pub fn new(name: impl Into<String>) -> Generator {
        Generator {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            p_set: 0.0,
            q_set: 0.0,
            q_limits: Limit { min: -1.0, max: 1.0 },
            p_limits: Limit { min: 0.0, max: 1.0 },
            voltage_control: true,
        }
    }

    /// Upward real-power headroom, used when the area promotes the largest
    /// PV capacity to slack.
    pub fn upward_capacity(&self) -> f64 {
        (self.p_limits.max - self.p_set).max(0.0)
    }
}

impl DeviceCapability for Generator {
    fn pflow_initialize_a(&mut self, _t0: f64, flags: InitFlags) {
        if flags.make_slack {
            self.core.flags.insert(Flags::VOLTAGE_CONTROL_CHANGE);
        }
    }
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, _inputs: &[f64], _sd: &StateData, _resid: &mut [f64], _mode: &SolverMode) {}

    fn get_outputs(&self, _inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        vec![self.p_set, self.q_set]
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        vec![None, None]
    }

    fn power_flow_adjust(&mut self, _inputs: &[f64], _flags: InitFlags, _level: u32) -> ChangeCode {
        if !self.q_limits.contains(self.q_set) {
            self.q_set = self.q_limits.clamp(self.q_set);
            return ChangeCode::JacobianChange;
        }
        ChangeCode::NoChange
    }

    fn get_variable_type(&self, _types: &mut [VariableType], _mode: &SolverMode) {}

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "p" => self.p_set = value,
            "q" => self.q_set = value,
            "qmin" => self.q_limits.min = value,
            "qmax" => self.q_limits.max = value,
            "pmin" => self.p_limits.min = value,
            "pmax" => self.p_limits.max = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "p" => Ok(self.p_set),
            "q" => Ok(self.q_set),
            "qmin" => Ok(self.q_limits.min),
            "qmax" => Ok(self.q_limits.max),
            "pmin" => Ok(self.p_limits.min),
            "pmax" => Ok(self.p_limits.max),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_flow_adjust_clamps_reactive_power_to_limits() {
        let mut g = Generator { q_set: 2.0, ..Generator::new("g1") };
        let code = g.power_flow_adjust(&[], InitFlags::default(), 0);
        assert_eq!(code, ChangeCode::JacobianChange);
        assert_eq!(g.q_set, 1.0);
    }

    #[test]
    fn upward_capacity_is_headroom_to_pmax() {
        let g = Generator { p_set: 0.6, p_limits: Limit { min: 0.0, max: 1.0 }, ..Generator::new("g1") };
        assert!((g.upward_capacity() - 0.4).abs() < 1e-12);
    }
}
