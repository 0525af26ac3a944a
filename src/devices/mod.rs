//! Sub-devices: objects owned by a bus (or another sub-device) that expose
//! the same residual/Jacobian/root contract as a primary object but consume
//! their parent's output vector as inputs, per [`SubDevice`]'s
//! forwarding-impl dispatch.

pub mod exciter;
pub mod generator;
pub mod governor;
pub mod load;
pub mod relay;
pub mod relay_message;
pub mod source;

pub use exciter::Exciter;
pub use generator::Generator;
pub use governor::Governor;
pub use load::{CompositeLoad, Load};
pub use relay::Relay;
pub use source::Source;

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::Result;
use crate::flags::ChangeCode;
use crate::object::{Core, Identity, ObjectKind};
use crate::offsets::Sizing;
use crate::solver_mode::SolverMode;
use crate::state_data::{MatrixData, StateData};

/// The closed `SubModel` tagged variant (generator, load, exciter, governor,
/// source, internal relay block). Each concrete type implements
/// [`DeviceCapability`] on its own; this enum just recovers the category
/// and forwards every call to the active variant.
#[derive(Debug, Clone)]
pub enum SubDevice {
    Generator(Generator),
    Load(Load),
    CompositeLoad(CompositeLoad),
    Exciter(Exciter),
    Governor(Governor),
    Source(Source),
    RelayBlock(Relay),
}

/// Dispatches `self.$method(args...)` to whichever variant is active.
/// Defined once so every trait method below is one line instead of a
/// seven-armed match.
macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            SubDevice::Generator(x) => x.$method($($arg),*),
            SubDevice::Load(x) => x.$method($($arg),*),
            SubDevice::CompositeLoad(x) => x.$method($($arg),*),
            SubDevice::Exciter(x) => x.$method($($arg),*),
            SubDevice::Governor(x) => x.$method($($arg),*),
            SubDevice::Source(x) => x.$method($($arg),*),
            SubDevice::RelayBlock(x) => x.$method($($arg),*),
        }
    };
}

impl Identity for SubDevice {
    fn core(&self) -> &Core {
        dispatch!(self, core)
    }
    fn core_mut(&mut self) -> &mut Core {
        dispatch!(self, core_mut)
    }
    fn kind(&self) -> ObjectKind {
        dispatch!(self, kind)
    }
}

impl Sizing for SubDevice {
    fn local_alg_size(&self, mode: &SolverMode) -> usize {
        dispatch!(self, local_alg_size, mode)
    }
    fn local_diff_size(&self, mode: &SolverMode) -> usize {
        dispatch!(self, local_diff_size, mode)
    }
    fn local_root_size(&self, mode: &SolverMode) -> usize {
        dispatch!(self, local_root_size, mode)
    }
    fn local_jac_size(&self, mode: &SolverMode) -> usize {
        dispatch!(self, local_jac_size, mode)
    }
    fn offsets(&self) -> &crate::offsets::OffsetTable {
        dispatch!(self, offsets)
    }
    fn offsets_mut(&mut self) -> &mut crate::offsets::OffsetTable {
        dispatch!(self, offsets_mut)
    }
    fn children_mut(&mut self) -> Vec<&mut dyn Sizing> {
        dispatch!(self, children_mut)
    }
    fn children(&self) -> Vec<&dyn Sizing> {
        dispatch!(self, children)
    }
}

impl DeviceCapability for SubDevice {
    fn pflow_initialize_a(&mut self, t0: f64, flags: InitFlags) {
        dispatch!(self, pflow_initialize_a, t0, flags)
    }
    fn pflow_initialize_b(&mut self) {
        dispatch!(self, pflow_initialize_b)
    }
    fn dyn_initialize_a(&mut self, t0: f64, flags: InitFlags) {
        dispatch!(self, dyn_initialize_a, t0, flags)
    }
    fn dyn_initialize_b(&mut self, inputs: &[f64], desired_out: &[f64], fields_set_out: &mut [bool]) {
        dispatch!(self, dyn_initialize_b, inputs, desired_out, fields_set_out)
    }

    fn residual(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        dispatch!(self, residual, inputs, sd, resid, mode)
    }
    fn derivative(&self, inputs: &[f64], sd: &StateData, deriv: &mut [f64], mode: &SolverMode) {
        dispatch!(self, derivative, inputs, sd, deriv, mode)
    }
    fn jacobian_elements(
        &self,
        inputs: &[f64],
        sd: &StateData,
        matrix: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolverMode,
    ) {
        dispatch!(self, jacobian_elements, inputs, sd, matrix, input_locs, mode)
    }
    fn algebraic_update(
        &self,
        inputs: &[f64],
        sd: &StateData,
        update: &mut [f64],
        mode: &SolverMode,
        alpha: f64,
    ) {
        dispatch!(self, algebraic_update, inputs, sd, update, mode, alpha)
    }

    fn root_test(&self, inputs: &[f64], sd: &StateData, roots: &mut [f64], mode: &SolverMode) {
        dispatch!(self, root_test, inputs, sd, roots, mode)
    }
    fn root_trigger(&mut self, t: f64, inputs: &[f64], rising: &[bool], mode: &SolverMode) {
        dispatch!(self, root_trigger, t, inputs, rising, mode)
    }
    fn root_check(&self, inputs: &[f64], sd: &StateData, mode: &SolverMode) -> Vec<bool> {
        dispatch!(self, root_check, inputs, sd, mode)
    }

    fn set_state(&mut self, t: f64, state: &[f64], dstate: &[f64], mode: &SolverMode) {
        dispatch!(self, set_state, t, state, dstate, mode)
    }
    fn guess(&self, t: f64, state: &mut [f64], dstate: &mut [f64], mode: &SolverMode) {
        dispatch!(self, guess, t, state, dstate, mode)
    }
    fn get_tols(&self, tols: &mut [f64], mode: &SolverMode) {
        dispatch!(self, get_tols, tols, mode)
    }
    fn get_variable_type(&self, types: &mut [VariableType], mode: &SolverMode) {
        dispatch!(self, get_variable_type, types, mode)
    }
    fn get_constraints(&self, constraints: &mut [f64], mode: &SolverMode) {
        dispatch!(self, get_constraints, constraints, mode)
    }

    fn get_outputs(&self, inputs: &[f64], sd: &StateData, mode: &SolverMode) -> Vec<f64> {
        dispatch!(self, get_outputs, inputs, sd, mode)
    }
    fn get_output_locs(&self, mode: &SolverMode) -> Vec<Option<usize>> {
        dispatch!(self, get_output_locs, mode)
    }

    fn power_flow_adjust(&mut self, inputs: &[f64], flags: InitFlags, level: u32) -> ChangeCode {
        dispatch!(self, power_flow_adjust, inputs, flags, level)
    }
    fn update_local_cache(&mut self, inputs: &[f64], sd: &StateData, mode: &SolverMode) {
        dispatch!(self, update_local_cache, inputs, sd, mode)
    }

    fn get_state_name(&self, names: &mut Vec<String>, mode: &SolverMode, prefix: &str) {
        dispatch!(self, get_state_name, names, mode, prefix)
    }
    fn find_index(&self, field: &str, mode: &SolverMode) -> Option<usize> {
        dispatch!(self, find_index, field, mode)
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        dispatch!(self, set_param, name, value)
    }
    fn get_param(&self, name: &str) -> Result<f64> {
        dispatch!(self, get_param, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdevice_forwards_identity_to_the_active_variant() {
        let d = SubDevice::Load(Load::new("l1"));
        assert_eq!(d.kind(), ObjectKind::Load);
        assert_eq!(d.name(), "l1");
    }

    #[test]
    fn subdevice_forwards_param_access_to_the_active_variant() {
        let mut d = SubDevice::Generator(Generator::new("g1"));
        d.set_param("p", 0.5).unwrap();
        assert_eq!(d.get_param("p").unwrap(), 0.5);
    }
}
