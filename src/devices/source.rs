//! Scheduled power source: a fixed real/reactive injection, used for DC
//! terminals and simplified equivalents.

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::object::{Core, ObjectKind};
use crate::offsets::OffsetTable;
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::{impl_identity, impl_zero_state_sizing};

#[derive(Debug, Clone)]
pub struct Source {
    pub core: Core,
    pub offsets: OffsetTable,
    pub p: f64,
    pub q: f64,
}

impl_identity!(Source, ObjectKind::Source);
impl_zero_state_sizing!(Source);

impl Source {
    pub fn new(name: impl Into<String>) -> Source {
        Source {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            p: 0.0,
            q: 0.0,
        }
    }
}

impl DeviceCapability for Source {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, _inputs: &[f64], _sd: &StateData, _resid: &mut [f64], _mode: &SolverMode) {}

    fn get_outputs(&self, _inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        vec![self.p, self.q]
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        vec![None, None]
    }

    fn get_variable_type(&self, _types: &mut [VariableType], _mode: &SolverMode) {}

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "p" => self.p = value,
            "q" => self.q = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "p" => Ok(self.p),
            "q" => Ok(self.q),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}
