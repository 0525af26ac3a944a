//! Simple automatic voltage regulator: a single differential state
//! (field voltage) driven by the terminal-voltage error.

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::object::{Core, ObjectKind};
use crate::offsets::{OffsetTable, Sizing};
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::impl_identity;

#[derive(Debug, Clone)]
pub struct Exciter {
    pub core: Core,
    pub offsets: OffsetTable,
    pub gain: f64,
    pub time_constant: f64,
    pub v_ref: f64,
    pub efd_min: f64,
    pub efd_max: f64,
}

impl_identity!(Exciter, ObjectKind::Exciter);

impl Exciter {
    pub fn new(name: impl Into<String>) -> Exciter {
        Exciter {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            gain: 200.0,
            time_constant: 0.02,
            v_ref: 1.0,
            efd_min: -3.0,
            efd_max: 3.0,
        }
    }
}

impl Sizing for Exciter {
    fn local_alg_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn local_diff_size(&self, mode: &SolverMode) -> usize {
        if mode.dynamic { 1 } else { 0 }
    }
    fn local_root_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn local_jac_size(&self, mode: &SolverMode) -> usize {
        if mode.dynamic { 2 } else { 0 }
    }
    fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }
    fn offsets_mut(&mut self) -> &mut OffsetTable {
        &mut self.offsets
    }
    fn children_mut(&mut self) -> Vec<&mut dyn Sizing> {
        Vec::new()
    }
    fn children(&self) -> Vec<&dyn Sizing> {
        Vec::new()
    }
}

impl DeviceCapability for Exciter {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}
    fn pflow_initialize_b(&mut self) {}

    fn dyn_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}

    fn residual(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        if let Some(o) = self.offsets.get(mode.offset_index) {
            if let Some(diff) = (o.diff_offset != crate::offsets::NULL_LOCATION).then_some(o.diff_offset) {
                let efd = sd.state[diff];
                let defd_dt = sd.dstate_dt[diff];
                let vt = inputs.first().copied().unwrap_or(self.v_ref);
                let target = self.gain * (self.v_ref - vt);
                resid[diff] = defd_dt - (target - efd) / self.time_constant;
            }
        }
    }

    fn get_outputs(&self, _inputs: &[f64], sd: &StateData, mode: &SolverMode) -> Vec<f64> {
        let efd = self
            .offsets
            .get(mode.offset_index)
            .filter(|o| o.diff_offset != crate::offsets::NULL_LOCATION)
            .map(|o| sd.state[o.diff_offset])
            .unwrap_or(0.0);
        vec![efd.clamp(self.efd_min, self.efd_max)]
    }

    fn get_output_locs(&self, mode: &SolverMode) -> Vec<Option<usize>> {
        vec![self
            .offsets
            .get(mode.offset_index)
            .filter(|o| o.diff_offset != crate::offsets::NULL_LOCATION)
            .map(|o| o.diff_offset)]
    }

    fn get_variable_type(&self, types: &mut [VariableType], _mode: &SolverMode) {
        if let Some(t) = types.first_mut() {
            *t = VariableType::Differential;
        }
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "gain" => self.gain = value,
            "tconst" => self.time_constant = value,
            "vref" => self.v_ref = value,
            "efdmin" => self.efd_min = value,
            "efdmax" => self.efd_max = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "gain" => Ok(self.gain),
            "tconst" => Ok(self.time_constant),
            "vref" => Ok(self.v_ref),
            "efdmin" => Ok(self.efd_min),
            "efdmax" => Ok(self.efd_max),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_is_zero_at_steady_state_field_voltage() {
        let e = Exciter::new("e1");
        let mode = SolverMode::dae(1);
        let mut offsets = e.offsets.clone();
        let o = offsets.ensure(mode.offset_index);
        o.diff_offset = 0;
        let e = Exciter { offsets, ..e };

        let vt = 0.98;
        let efd = e.gain * (e.v_ref - vt);
        let state = [efd];
        let dstate = [0.0];
        let sd = StateData::new(0.0, &state, &dstate, 1);
        let mut resid = [0.0];
        e.residual(&[vt], &sd, &mut resid, &mode);
        assert!(resid[0].abs() < 1e-9);
    }
}
