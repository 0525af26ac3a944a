//! Constant-power/current/impedance load, and a composite load that
//! distributes a set of fractions across inner loads.

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::flags::ChangeCode;
use crate::object::{Core, ObjectKind};
use crate::offsets::OffsetTable;
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::{impl_identity, impl_zero_state_sizing};

/// A simple ZIP load: constant-power, constant-current, and
/// constant-impedance fractions at a bus-supplied voltage.
#[derive(Debug, Clone)]
pub struct Load {
    pub core: Core,
    pub offsets: OffsetTable,
    pub p: f64,
    pub q: f64,
    pub ip: f64,
    pub iq: f64,
    pub yp: f64,
    pub yq: f64,
}

impl_identity!(Load, ObjectKind::Load);
impl_zero_state_sizing!(Load);

impl Load {
    pub fn new(name: impl Into<String>) -> Load {
        Load {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            p: 0.0,
            q: 0.0,
            ip: 0.0,
            iq: 0.0,
            yp: 0.0,
            yq: 0.0,
        }
    }

    /// Real power drawn at terminal voltage `v` (pu).
    pub fn real_power(&self, v: f64) -> f64 {
        self.p + self.ip * v + self.yp * v * v
    }

    /// Reactive power drawn at terminal voltage `v` (pu).
    pub fn reactive_power(&self, v: f64) -> f64 {
        self.q + self.iq * v + self.yq * v * v
    }
}

impl DeviceCapability for Load {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, _inputs: &[f64], _sd: &StateData, _resid: &mut [f64], _mode: &SolverMode) {}

    fn get_outputs(&self, inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        let v = inputs.first().copied().unwrap_or(1.0);
        vec![self.real_power(v), self.reactive_power(v)]
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        vec![None, None]
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "p" => self.p = value,
            "q" => self.q = value,
            "ip" => self.ip = value,
            "iq" => self.iq = value,
            "yp" => self.yp = value,
            "yq" => self.yq = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "p" => Ok(self.p),
            "q" => Ok(self.q),
            "ip" => Ok(self.ip),
            "iq" => Ok(self.iq),
            "yp" => Ok(self.yp),
            "yq" => Ok(self.yq),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }

    fn get_variable_type(&self, _types: &mut [VariableType], _mode: &SolverMode) {}
}

/// One fraction-weighted member of a [`CompositeLoad`].
#[derive(Debug, Clone)]
pub struct LoadFraction {
    pub load: Load,
    pub fraction: f64,
}

/// Distributes a set of fractions across inner loads, optionally absorbing
/// an existing bus load into the split.
#[derive(Debug, Clone)]
pub struct CompositeLoad {
    pub core: Core,
    pub offsets: OffsetTable,
    pub members: Vec<LoadFraction>,
    pub absorb_existing: bool,
}

impl_identity!(CompositeLoad, ObjectKind::Load);
impl_zero_state_sizing!(CompositeLoad);

impl CompositeLoad {
    pub fn new(name: impl Into<String>) -> CompositeLoad {
        CompositeLoad {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            members: Vec::new(),
            absorb_existing: false,
        }
    }

    /// Normalizes member fractions to sum to 1.0 (no-op if already empty
    /// or already normalized).
    pub fn normalize(&mut self) {
        let total: f64 = self.members.iter().map(|m| m.fraction).sum();
        if total > 0.0 {
            for m in &mut self.members {
                m.fraction /= total;
            }
        }
    }

    pub fn real_power(&self, v: f64) -> f64 {
        self.members.iter().map(|m| m.fraction * m.load.real_power(v)).sum()
    }

    pub fn reactive_power(&self, v: f64) -> f64 {
        self.members
            .iter()
            .map(|m| m.fraction * m.load.reactive_power(v))
            .sum()
    }
}

impl DeviceCapability for CompositeLoad {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {
        self.normalize();
    }
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, _inputs: &[f64], _sd: &StateData, _resid: &mut [f64], _mode: &SolverMode) {}

    fn get_outputs(&self, inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        let v = inputs.first().copied().unwrap_or(1.0);
        vec![self.real_power(v), self.reactive_power(v)]
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        vec![None, None]
    }

    fn power_flow_adjust(&mut self, _inputs: &[f64], _flags: InitFlags, _level: u32) -> ChangeCode {
        ChangeCode::NoChange
    }

    fn set_param(&mut self, name: &str, _value: f64) -> Result<()> {
        Err(GridError::UnrecognizedParameter(name.to_string()))
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        Err(GridError::UnrecognizedParameter(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_load_reduces_to_constant_power_at_unity_voltage_when_ic_zero() {
        let l = Load { p: 1.2, q: 0.4, ..Load::new("l1") };
        assert_eq!(l.real_power(1.0), 1.2);
        assert_eq!(l.reactive_power(1.0), 0.4);
    }

    #[test]
    fn zip_load_scales_constant_impedance_term_quadratically() {
        let l = Load { yp: 0.5, ..Load::new("l1") };
        assert!((l.real_power(0.5) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn composite_load_normalizes_fractions_and_sums_members() {
        let mut c = CompositeLoad::new("c1");
        c.members.push(LoadFraction { load: Load { p: 1.0, ..Load::new("a") }, fraction: 1.0 });
        c.members.push(LoadFraction { load: Load { p: 3.0, ..Load::new("b") }, fraction: 3.0 });
        c.normalize();
        let total_fraction: f64 = c.members.iter().map(|m| m.fraction).sum();
        assert!((total_fraction - 1.0).abs() < 1e-12);
        assert!((c.real_power(1.0) - (0.25 * 1.0 + 0.75 * 3.0)).abs() < 1e-12);
    }
}
