//! Simple turbine-governor: a single differential state (mechanical power)
//! driven by speed deviation through a droop characteristic.

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::object::{Core, ObjectKind};
use crate::offsets::{OffsetTable, Sizing, NULL_LOCATION};
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::impl_identity;

#[derive(Debug, Clone)]
pub struct Governor {
    pub core: Core,
    pub offsets: OffsetTable,
    pub droop: f64,
    pub time_constant: f64,
    pub p_ref: f64,
    pub p_min: f64,
    pub p_max: f64,
}

impl_identity!(Governor, ObjectKind::Governor);

impl Governor {
    pub fn new(name: impl Into<String>) -> Governor {
        Governor {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            droop: 0.05,
            time_constant: 0.5,
            p_ref: 1.0,
            p_min: 0.0,
            p_max: 1.2,
        }
    }
}

impl Sizing for Governor {
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

impl DeviceCapability for Governor {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        if let Some(o) = self.offsets.get(mode.offset_index) {
            if o.diff_offset != NULL_LOCATION {
                let diff = o.diff_offset;
                let pm = sd.state[diff];
                let dpm_dt = sd.dstate_dt[diff];
                let omega = inputs.first().copied().unwrap_or(1.0);
                let target = (self.p_ref - (omega - 1.0) / self.droop).clamp(self.p_min, self.p_max);
                resid[diff] = dpm_dt - (target - pm) / self.time_constant;
            }
        }
    }

    fn get_outputs(&self, _inputs: &[f64], sd: &StateData, mode: &SolverMode) -> Vec<f64> {
        let pm = self
            .offsets
            .get(mode.offset_index)
            .filter(|o| o.diff_offset != NULL_LOCATION)
            .map(|o| sd.state[o.diff_offset])
            .unwrap_or(self.p_ref);
        vec![pm]
    }

    fn get_output_locs(&self, mode: &SolverMode) -> Vec<Option<usize>> {
        vec![self
            .offsets
            .get(mode.offset_index)
            .filter(|o| o.diff_offset != NULL_LOCATION)
            .map(|o| o.diff_offset)]
    }

    fn get_variable_type(&self, types: &mut [VariableType], _mode: &SolverMode) {
        if let Some(t) = types.first_mut() {
            *t = VariableType::Differential;
        }
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "droop" => self.droop = value,
            "tconst" => self.time_constant = value,
            "pref" => self.p_ref = value,
            "pmin" => self.p_min = value,
            "pmax" => self.p_max = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "droop" => Ok(self.droop),
            "tconst" => Ok(self.time_constant),
            "pref" => Ok(self.p_ref),
            "pmin" => Ok(self.p_min),
            "pmax" => Ok(self.p_max),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_is_zero_at_nominal_speed_steady_state() {
        let g = Governor::new("g1");
        let mode = SolverMode::dae(1);
        let mut offsets = g.offsets.clone();
        offsets.ensure(mode.offset_index).diff_offset = 0;
        let g = Governor { offsets, ..g };

        let state = [g.p_ref];
        let dstate = [0.0];
        let sd = StateData::new(0.0, &state, &dstate, 1);
        let mut resid = [0.0];
        g.residual(&[1.0], &sd, &mut resid, &mode);
        assert!(resid[0].abs() < 1e-9);
    }
}
