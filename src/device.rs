//! Device capability contract: the solver-facing surface every object that
//! participates in a residual/Jacobian pass implements.
//!
//! Defaults are provided for the parts most sub-devices don't need (roots,
//! Jacobian contributions, names) so a concrete type only overrides what it
//! actually has — only a line-like model carries a nontrivial Jacobian,
//! while a constant-power load does not.

use crate::error::Result;
use crate::flags::ChangeCode;
use crate::offsets::Sizing;
use crate::solver_mode::SolverMode;
use crate::state_data::{MatrixData, StateData};

/// Flags threaded through the two-phase initialize calls, also reused for
/// `reset`/init granularity.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitFlags {
    pub make_slack: bool,
    pub low_voltage_check: bool,
}

/// Kind of a numerical state, for `getVariableType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Algebraic,
    Differential,
}

pub trait DeviceCapability: Sizing {
    // ---- lifecycle ----

    /// Phase A: sizing and flag propagation.
    fn pflow_initialize_a(&mut self, t0: f64, flags: InitFlags);
    /// Phase B: numerical initialization using neighbour information.
    fn pflow_initialize_b(&mut self);

    fn dyn_initialize_a(&mut self, t0: f64, flags: InitFlags) {
        let _ = (t0, flags);
    }
    /// `desired_out`/`fields_set_out` let a sub-device request that the bus
    /// hold specific output values during initialization.
    fn dyn_initialize_b(&mut self, inputs: &[f64], desired_out: &[f64], fields_set_out: &mut [bool]) {
        let _ = (inputs, desired_out, fields_set_out);
    }

    // ---- assembly ----

    fn residual(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode);

    fn derivative(&self, inputs: &[f64], sd: &StateData, deriv: &mut [f64], mode: &SolverMode) {
        let _ = (inputs, sd, deriv, mode);
    }

    fn jacobian_elements(
        &self,
        inputs: &[f64],
        sd: &StateData,
        matrix: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolverMode,
    ) {
        let _ = (inputs, sd, matrix, input_locs, mode);
    }

    // ---- pre-execution ----

    /// Runs before `residual` for objects flagged `PREEX_REQUESTED`, so a
    /// coupled quantity another object's residual depends on is settled
    /// first.
    fn pre_ex(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        let _ = (inputs, sd, resid, mode);
    }

    /// Runs after the partial list's ordinary residual pass, for objects
    /// flagged `PREEX_REQUESTED` whose contribution depends on that pass.
    fn delayed_residual(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        let _ = (inputs, sd, resid, mode);
    }

    fn delayed_jacobian(
        &self,
        inputs: &[f64],
        sd: &StateData,
        matrix: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolverMode,
    ) {
        let _ = (inputs, sd, matrix, input_locs, mode);
    }

    fn algebraic_update(
        &self,
        inputs: &[f64],
        sd: &StateData,
        update: &mut [f64],
        mode: &SolverMode,
        alpha: f64,
    ) {
        let _ = (inputs, sd, update, mode, alpha);
    }

    // ---- roots ----

    fn root_test(&self, inputs: &[f64], sd: &StateData, roots: &mut [f64], mode: &SolverMode) {
        let _ = (inputs, sd, roots, mode);
    }

    /// `rising[i]` is `true` when root `i` crossed from negative to positive.
    fn root_trigger(&mut self, t: f64, inputs: &[f64], rising: &[bool], mode: &SolverMode) {
        let _ = (t, inputs, rising, mode);
    }

    fn root_check(&self, inputs: &[f64], sd: &StateData, mode: &SolverMode) -> Vec<bool> {
        let _ = (inputs, sd, mode);
        Vec::new()
    }

    // ---- state plumbing ----

    fn set_state(&mut self, t: f64, state: &[f64], dstate: &[f64], mode: &SolverMode) {
        let _ = (t, state, dstate, mode);
    }

    fn guess(&self, t: f64, state: &mut [f64], dstate: &mut [f64], mode: &SolverMode) {
        let _ = (t, state, dstate, mode);
    }

    fn get_tols(&self, tols: &mut [f64], mode: &SolverMode) {
        let _ = (tols, mode);
    }

    fn get_variable_type(&self, types: &mut [VariableType], mode: &SolverMode) {
        let _ = (types, mode);
    }

    fn get_constraints(&self, constraints: &mut [f64], mode: &SolverMode) {
        let _ = (constraints, mode);
    }

    // ---- outputs ----

    fn get_outputs(&self, inputs: &[f64], sd: &StateData, mode: &SolverMode) -> Vec<f64>;

    fn get_output_locs(&self, mode: &SolverMode) -> Vec<Option<usize>>;

    // ---- power-flow-only adjustments ----

    fn power_flow_adjust(&mut self, inputs: &[f64], flags: InitFlags, level: u32) -> ChangeCode {
        let _ = (inputs, flags, level);
        ChangeCode::NoChange
    }

    fn update_local_cache(&mut self, inputs: &[f64], sd: &StateData, mode: &SolverMode) {
        let _ = (inputs, sd, mode);
    }

    // ---- reflection ----

    fn get_state_name(&self, names: &mut Vec<String>, mode: &SolverMode, prefix: &str) {
        let _ = (names, mode, prefix);
    }

    fn find_index(&self, field: &str, mode: &SolverMode) -> Option<usize> {
        let _ = (field, mode);
        None
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()>;
    fn get_param(&self, name: &str) -> Result<f64>;
}
