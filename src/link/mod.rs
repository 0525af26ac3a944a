//! Link: two bus terminals joined by an AC line, with an optional
//! adjustable-transformer control layer.

pub mod ac_line;
pub mod adjustable_transformer;
pub mod approx;

use ac_line::{
    compute_deriv, compute_flows_with_fault, LineParams, LinearBaseline, LinkDeriv, LinkFlows, Terminal,
};
use adjustable_transformer::{AdjustableTransformerControl, ControlMode, SteppingPolicy};
use approx::Approx;

use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::{GridError, Result};
use crate::flags::ChangeCode;
use crate::object::{Core, Identity, ObjectId, ObjectKind};
use crate::offsets::{OffsetTable, Sizing, NULL_LOCATION};
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::impl_identity;

#[derive(Debug, Clone)]
pub struct Link {
    pub core: Core,
    pub offsets: OffsetTable,
    pub bus1: ObjectId,
    pub bus2: ObjectId,
    pub switch1_open: bool,
    pub switch2_open: bool,
    /// `-1` = no fault; an interior value is the fault location along the
    /// line, 0 < f < 1.
    pub fault: f64,
    pub params: LineParams,
    pub rating_a: f64,
    pub rating_b: f64,
    pub rating_e: f64,
    pub scheduled_power: Option<f64>,
    pub approx: Approx,
    pub flows: LinkFlows,
    pub deriv: LinkDeriv,
    pub seq_id: u64,
    pub baseline: Option<LinearBaseline>,
    pub angle_min: f64,
    pub angle_max: f64,
    pub transformer: Option<AdjustableTransformerControl>,
}

impl_identity!(Link, ObjectKind::Link);

impl Link {
    pub fn new(name: impl Into<String>, bus1: ObjectId, bus2: ObjectId) -> Link {
        Link {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            bus1,
            bus2,
            switch1_open: false,
            switch2_open: false,
            fault: -1.0,
            params: LineParams::default(),
            rating_a: f64::INFINITY,
            rating_b: f64::INFINITY,
            rating_e: f64::INFINITY,
            scheduled_power: None,
            approx: Approx::Full,
            flows: LinkFlows::default(),
            deriv: LinkDeriv::default(),
            seq_id: 0,
            baseline: None,
            angle_min: -std::f64::consts::FRAC_PI_2,
            angle_max: std::f64::consts::FRAC_PI_2,
            transformer: None,
        }
    }

    /// `true` iff the link is electrically connected: both switches closed.
    pub fn connected(&self) -> bool {
        !self.switch1_open && !self.switch2_open
    }

    /// Recomputes and caches `flows`/`deriv` from the two terminal states,
    /// skipping the work if `seq_id` already matches.
    pub fn update_flows(&mut self, t1: Terminal, t2: Terminal, seq_id: u64) {
        if self.seq_id == seq_id {
            return;
        }
        self.flows = compute_flows_with_fault(
            &self.params,
            &t1,
            &t2,
            self.fault,
            self.switch1_open,
            self.switch2_open,
            self.approx,
        );
        self.deriv = compute_deriv(&self.params, &t1, &t2, self.approx, self.baseline.as_ref());
        if self.approx == Approx::Linear {
            self.baseline = Some(LinearBaseline {
                t1,
                t2,
                flows: self.flows,
                deriv: self.deriv,
            });
        }
        self.seq_id = seq_id;
    }

    /// Reports, rather than enforces, an out-of-bounds angle difference.
    pub fn angle_violation(&self, theta1: f64) -> Option<f64> {
        if theta1 < self.angle_min {
            Some(self.angle_min - theta1)
        } else if theta1 > self.angle_max {
            Some(theta1 - self.angle_max)
        } else {
            None
        }
    }

    /// Newton-like loop: drives the unfixed terminal's voltage and the tap
    /// angle until the measured (P, Q) at `measure_terminal` match
    /// `(p_target, q_target)`, using a locally computed 2x2 Jacobian block.
    /// Returns the converged `(v_unfixed, tap_angle)`.
    pub fn fix_power(
        &self,
        p_target: f64,
        q_target: f64,
        t1: Terminal,
        t2: Terminal,
        measure_at_terminal1: bool,
        tol: f64,
    ) -> Result<(f64, f64)> {
        let mut v = if measure_at_terminal1 { t2.v } else { t1.v };
        let mut phi = self.params.tap_angle;
        let mut prev_err = f64::INFINITY;

        for _ in 0..50 {
            let mut params = self.params;
            params.tap_angle = phi;
            let (cur_t1, cur_t2) = if measure_at_terminal1 {
                (t1, Terminal { v, theta: t2.theta })
            } else {
                (Terminal { v, theta: t1.theta }, t2)
            };
            let flows = compute_flows_with_fault(
                &params,
                &cur_t1,
                &cur_t2,
                self.fault,
                self.switch1_open,
                self.switch2_open,
                self.approx,
            );
            let (p, q) = if measure_at_terminal1 { (flows.p1, flows.q1) } else { (flows.p2, flows.q2) };
            let dp = p_target - p;
            let dq = q_target - q;
            let err = dp.abs() + dq.abs();
            if err < tol {
                return Ok((v, phi));
            }
            if err > prev_err {
                return Err(GridError::SolverConvergence(format!(
                    "fixPower diverged for link {}",
                    self.name()
                )));
            }
            prev_err = err;

            let deriv = compute_deriv(&params, &cur_t1, &cur_t2, self.approx, None);
            let (dp_dv, dp_dth, dq_dv, dq_dth) = if measure_at_terminal1 {
                (deriv.dp1_dv2, deriv.dp1_dth2, deriv.dq1_dv2, deriv.dq1_dth2)
            } else {
                (deriv.dp2_dv1, deriv.dp2_dth1, deriv.dq2_dv1, deriv.dq2_dth1)
            };
            let det = dp_dv * dq_dth - dp_dth * dq_dv;
            if det.abs() < 1e-12 {
                return Err(GridError::SolverConvergence(format!(
                    "fixPower singular jacobian for link {}",
                    self.name()
                )));
            }
            let dv = (dp * dq_dth - dq * dp_dth) / det;
            let dth = (dq * dp_dv - dp * dq_dv) / det;
            v += dv;
            phi += dth;
        }
        Err(GridError::SolverConvergence(format!(
            "fixPower exceeded iteration limit for link {}",
            self.name()
        )))
    }
}

impl Sizing for Link {
    fn local_alg_size(&self, mode: &SolverMode) -> usize {
        match &self.transformer {
            Some(t) if t.policy == SteppingPolicy::Continuous && t.mode != ControlMode::Manual && !mode.local => 1,
            _ => 0,
        }
    }
    fn local_diff_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn local_root_size(&self, mode: &SolverMode) -> usize {
        match &self.transformer {
            Some(t) if t.policy == SteppingPolicy::Continuous && t.mode != ControlMode::Manual && !mode.local => 2,
            _ => 0,
        }
    }
    fn local_jac_size(&self, mode: &SolverMode) -> usize {
        self.local_alg_size(mode) * 4
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

impl DeviceCapability for Link {
    fn pflow_initialize_a(&mut self, _t0: f64, _flags: InitFlags) {}
    fn pflow_initialize_b(&mut self) {}

    fn residual(&self, inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        let Some(transformer) = &self.transformer else { return };
        if transformer.policy != SteppingPolicy::Continuous || transformer.mode == ControlMode::Manual {
            return;
        }
        let Some(o) = self.offsets.get(mode.offset_index) else { return };
        if o.alg_offset == NULL_LOCATION {
            return;
        }
        let controlled_value = match transformer.mode {
            ControlMode::Mw => self.flows.p1,
            ControlMode::MVar => self.flows.q1,
            ControlMode::Voltage => inputs.first().copied().unwrap_or(1.0),
            ControlMode::Manual => return,
        };
        let _ = sd;
        resid[o.alg_offset] = transformer.continuous_residual(controlled_value);
    }

    fn root_test(&self, _inputs: &[f64], _sd: &StateData, roots: &mut [f64], mode: &SolverMode) {
        let Some(transformer) = &self.transformer else { return };
        if transformer.policy != SteppingPolicy::Continuous {
            return;
        }
        let Some(o) = self.offsets.get(mode.offset_index) else { return };
        if o.root_offset == NULL_LOCATION {
            return;
        }
        let controlled_value = match transformer.mode {
            ControlMode::Mw => self.flows.p1,
            ControlMode::MVar => self.flows.q1,
            _ => return,
        };
        let (lo, hi) = transformer.continuous_roots(controlled_value);
        if roots.len() > o.root_offset + 1 {
            roots[o.root_offset] = lo;
            roots[o.root_offset + 1] = hi;
        }
    }

    fn power_flow_adjust(&mut self, inputs: &[f64], _flags: InitFlags, _level: u32) -> ChangeCode {
        let Some(transformer) = &mut self.transformer else { return ChangeCode::NoChange };
        if transformer.policy != SteppingPolicy::Stepped {
            return ChangeCode::NoChange;
        }
        let controlled_value = match transformer.mode {
            ControlMode::Mw => self.flows.p1,
            ControlMode::MVar => self.flows.q1,
            ControlMode::Voltage => inputs.first().copied().unwrap_or(1.0),
            ControlMode::Manual => return ChangeCode::NoChange,
        };
        let (new_tap, code) = transformer.stepped_adjust(self.params.tap, controlled_value);
        self.params.tap = new_tap;
        code
    }

    fn get_outputs(&self, _inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        vec![self.flows.p1, self.flows.q1, self.flows.p2, self.flows.q2]
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        vec![None, None, None, None]
    }

    fn get_variable_type(&self, types: &mut [VariableType], _mode: &SolverMode) {
        for t in types.iter_mut() {
            *t = VariableType::Algebraic;
        }
    }

    fn get_state_name(&self, names: &mut Vec<String>, mode: &SolverMode, prefix: &str) {
        if self.local_alg_size(mode) > 0 {
            names.push(format!("{prefix}tap"));
        }
    }

    fn find_index(&self, field: &str, mode: &SolverMode) -> Option<usize> {
        if field == "tap" {
            self.offsets.get(mode.offset_index).and_then(|o| {
                (o.alg_offset != NULL_LOCATION).then_some(o.alg_offset)
            })
        } else {
            None
        }
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "r" => self.params.r = value,
            "x" => self.params.x = value,
            "g" => self.params.g_shunt = value,
            "b" => self.params.b_shunt = value,
            "tap" => self.params.tap = value,
            "tapangle" => self.params.tap_angle = value,
            "fault" => self.fault = value,
            "ratinga" => self.rating_a = value,
            "ratingb" => self.rating_b = value,
            "ratinge" => self.rating_e = value,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "r" => Ok(self.params.r),
            "x" => Ok(self.params.x),
            "g" => Ok(self.params.g_shunt),
            "b" => Ok(self.params.b_shunt),
            "tap" => Ok(self.params.tap),
            "tapangle" => Ok(self.params.tap_angle),
            "fault" => Ok(self.fault),
            "ratinga" => Ok(self.rating_a),
            "ratingb" => Ok(self.rating_b),
            "ratinge" => Ok(self.rating_e),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ObjectId, ObjectId) {
        (ObjectId::next(), ObjectId::next())
    }

    #[test]
    fn update_flows_is_noop_when_seq_id_unchanged() {
        let (b1, b2) = ids();
        let mut l = Link::new("l1", b1, b2);
        l.params.x = 0.1;
        let t1 = Terminal { v: 1.0, theta: 0.0 };
        let t2 = Terminal { v: 1.0, theta: -0.05 };
        l.update_flows(t1, t2, 1);
        let flows_first = l.flows;
        l.update_flows(Terminal { v: 2.0, theta: 5.0 }, t2, 1);
        assert_eq!(l.flows, flows_first);
    }

    #[test]
    fn angle_violation_reports_out_of_bounds_difference() {
        let (b1, b2) = ids();
        let l = Link::new("l1", b1, b2);
        assert!(l.angle_violation(0.1).is_none());
        let over = l.angle_violation(std::f64::consts::PI);
        assert!(over.is_some());
    }

    #[test]
    fn fix_power_converges_for_a_simple_reactive_line() {
        let (b1, b2) = ids();
        let mut l = Link::new("l1", b1, b2);
        l.params.r = 0.0;
        l.params.x = 0.1;
        let t1 = Terminal { v: 1.0, theta: 0.05 };
        let t2 = Terminal { v: 1.0, theta: 0.0 };
        let flows = compute_flows_with_fault(&l.params, &t1, &t2, -1.0, false, false, l.approx);
        let result = l.fix_power(flows.p2, flows.q2, t1, t2, false, 1e-8);
        assert!(result.is_ok());
    }
}
