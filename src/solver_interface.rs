//! Consumed solver surface and the Newton-Raphson power-flow solver built
//! on top of it.
//!
//! A [`SolverInterface`] is what the driver holds: an opaque handle the
//! driver allocates, configures with `set`, and drives to convergence with
//! `solve`, without needing to know which numerical method backs it. The
//! driver owns the [`Area`] tree; a solver borrows it only for the duration
//! of a `solve` call.

use crate::area::Area;
use crate::bus::BusType;
use crate::device::DeviceCapability;
use crate::error::{GridError, Result};
use crate::link::ac_line::Terminal;
use crate::object::{Identity, ObjectId};
use crate::solver_mode::SolverMode;
use crate::state_data::{MatrixData, StateData};

/// Outcome of one `solve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Converged,
    MaxIterations,
}

/// The surface a driver uses to run a solver against a tree without
/// depending on its numerical method.
pub trait SolverInterface {
    fn allocate(&mut self, state_size: usize, root_count: usize);
    fn set_max_non_zeros(&mut self, n: usize);
    fn set(&mut self, name: &str, value: f64) -> Result<()>;
    fn initialize(&mut self, t0: f64) -> Result<()>;
    fn is_initialized(&self) -> bool;
    fn state_data(&mut self) -> &mut [f64];
    fn deriv_data(&mut self) -> &mut [f64];
    fn type_data(&mut self) -> &mut [f64];
    fn solve(&mut self, area: &mut Area, t_stop: f64) -> Result<SolverStatus>;
    fn get(&self, name: &str) -> Result<f64>;
    fn name(&self) -> &str;
    fn mode(&self) -> SolverMode;
    fn clone_handle(&self, full_copy: bool) -> Box<dyn SolverInterface>;
    fn non_zeros(&self) -> usize;
}

/// Accumulates Jacobian entries into a dense row-major buffer, summing
/// duplicate `(row, col)` writes the way the triplet accumulator does.
struct DenseJacobian {
    n: usize,
    data: Vec<f64>,
}

impl DenseJacobian {
    fn zeros(n: usize) -> Self {
        DenseJacobian { n, data: vec![0.0; n * n] }
    }

    fn add(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n + col] += value;
    }

    fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.n).map(|r| r.to_vec()).collect()
    }
}

impl MatrixData for DenseJacobian {
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        self.add(row, col, value);
    }
}

/// Per-bus unknown slot assignment for the partitioned Newton system: a
/// theta row/column exists for every non-slack bus, a voltage-magnitude
/// row/column only for PQ buses. Afix buses are solved like PV (angle
/// treated as a local unknown, voltage held fixed) — see DESIGN.md.
#[derive(Debug, Clone, Copy)]
struct BusSlot {
    id: ObjectId,
    theta_idx: Option<usize>,
    v_idx: Option<usize>,
    p_sched: f64,
    q_sched: f64,
}

fn scheduled_injection(bus: &crate::bus::Bus) -> (f64, f64) {
    use crate::object::ObjectKind;
    let outputs = bus.outputs();
    let sd = StateData::new(0.0, &[], &[], 0);
    let mode = SolverMode::local();
    let mut p = 0.0;
    let mut q = 0.0;
    for dev in &bus.sub_devices {
        let out = dev.get_outputs(&outputs, &sd, &mode);
        if out.len() < 2 {
            continue;
        }
        match dev.kind() {
            ObjectKind::Generator | ObjectKind::Source => {
                p -= out[0];
                q -= out[1];
            }
            ObjectKind::Load => {
                p += out[0];
                q += out[1];
            }
            _ => {}
        }
    }
    (p, q)
}

/// Newton-Raphson power flow over an area's direct buses and links,
/// solved on the bus `(V, theta)` fields directly rather than through the
/// generic offset-addressed state vector — a standard bus carries no
/// algebraic offsets of its own (see `bus.rs`), so the global admittance-
/// style power-flow problem is kept as its own self-contained routine,
/// mirroring how power flow sits apart from the device-residual pipeline
/// used for dynamics.
pub struct NewtonPowerFlowSolver {
    name: String,
    mode: SolverMode,
    tolerance: f64,
    max_iter: u32,
    max_non_zeros: usize,
    initialized: bool,
    state: Vec<f64>,
    deriv: Vec<f64>,
    types: Vec<f64>,
    last_iterations: u32,
}

impl NewtonPowerFlowSolver {
    pub fn new(name: impl Into<String>, mode: SolverMode) -> Self {
        NewtonPowerFlowSolver {
            name: name.into(),
            mode,
            tolerance: 1e-8,
            max_iter: 30,
            max_non_zeros: 0,
            initialized: false,
            state: Vec::new(),
            deriv: Vec::new(),
            types: Vec::new(),
            last_iterations: 0,
        }
    }

    pub fn iterations_used(&self) -> u32 {
        self.last_iterations
    }

    fn build_slots(area: &Area) -> Vec<BusSlot> {
        let mut slots: Vec<BusSlot> = Vec::new();
        for bus in area.buses() {
            if !bus.flags().contains(crate::flags::Flags::ENABLED) {
                continue;
            }
            let (p_sched, q_sched) = scheduled_injection(bus);
            slots.push(BusSlot {
                id: bus.id(),
                theta_idx: None,
                v_idx: None,
                p_sched,
                q_sched,
            });
        }
        let mut next = 0usize;
        for (slot, bus) in slots.iter_mut().zip(area.buses()) {
            if bus.bus_type != BusType::Slk {
                slot.theta_idx = Some(next);
                next += 1;
            }
        }
        for (slot, bus) in slots.iter_mut().zip(area.buses()) {
            if bus.bus_type == BusType::Pq {
                slot.v_idx = Some(next);
                next += 1;
            }
        }
        slots
    }

    /// One Newton iteration: assembles mismatch and Jacobian from every
    /// connected link's analytic flow/derivative pair, solves the linear
    /// system, and writes the correction back into `area`'s bus fields.
    /// Returns the max-abs mismatch before the step was taken.
    fn newton_step(area: &mut Area, slots: &[BusSlot], n: usize) -> Result<f64> {
        if n == 0 {
            return Ok(0.0);
        }
        let mut jac = DenseJacobian::zeros(n);
        let mut mismatch = vec![0.0; n];

        let terminal_of = |id: ObjectId| -> Terminal {
            let bus = area.buses().find(|b| b.id() == id).expect("bus in slot list");
            Terminal { v: bus.v, theta: bus.theta }
        };

        for link in area.links() {
            if !link.flags().contains(crate::flags::Flags::ENABLED) || !link.connected() {
                continue;
            }
            let (Some(sa), Some(sb)) = (
                slots.iter().find(|s| s.id == link.bus1),
                slots.iter().find(|s| s.id == link.bus2),
            ) else {
                continue;
            };
            let t1 = terminal_of(sa.id);
            let t2 = terminal_of(sb.id);
            let flows = crate::link::ac_line::compute_flows_with_fault(
                &link.params,
                &t1,
                &t2,
                link.fault,
                link.switch1_open,
                link.switch2_open,
                link.approx,
            );
            let deriv = crate::link::ac_line::compute_deriv(&link.params, &t1, &t2, link.approx, link.baseline.as_ref());

            if let Some(r) = sa.theta_idx {
                mismatch[r] += flows.p1;
                if let Some(c) = sa.theta_idx {
                    jac.add(r, c, deriv.dp1_dth1);
                }
                if let Some(c) = sb.theta_idx {
                    jac.add(r, c, deriv.dp1_dth2);
                }
                if let Some(c) = sa.v_idx {
                    jac.add(r, c, deriv.dp1_dv1);
                }
                if let Some(c) = sb.v_idx {
                    jac.add(r, c, deriv.dp1_dv2);
                }
            }
            if let Some(r) = sa.v_idx {
                mismatch[r] += flows.q1;
                if let Some(c) = sa.theta_idx {
                    jac.add(r, c, deriv.dq1_dth1);
                }
                if let Some(c) = sb.theta_idx {
                    jac.add(r, c, deriv.dq1_dth2);
                }
                if let Some(c) = sa.v_idx {
                    jac.add(r, c, deriv.dq1_dv1);
                }
                if let Some(c) = sb.v_idx {
                    jac.add(r, c, deriv.dq1_dv2);
                }
            }
            if let Some(r) = sb.theta_idx {
                mismatch[r] += flows.p2;
                if let Some(c) = sb.theta_idx {
                    jac.add(r, c, deriv.dp2_dth2);
                }
                if let Some(c) = sa.theta_idx {
                    jac.add(r, c, deriv.dp2_dth1);
                }
                if let Some(c) = sb.v_idx {
                    jac.add(r, c, deriv.dp2_dv2);
                }
                if let Some(c) = sa.v_idx {
                    jac.add(r, c, deriv.dp2_dv1);
                }
            }
            if let Some(r) = sb.v_idx {
                mismatch[r] += flows.q2;
                if let Some(c) = sb.theta_idx {
                    jac.add(r, c, deriv.dq2_dth2);
                }
                if let Some(c) = sa.theta_idx {
                    jac.add(r, c, deriv.dq2_dth1);
                }
                if let Some(c) = sb.v_idx {
                    jac.add(r, c, deriv.dq2_dv2);
                }
                if let Some(c) = sa.v_idx {
                    jac.add(r, c, deriv.dq2_dv1);
                }
            }
        }

        // scheduled_injection returns (load - generation); at the solution
        // the net line flow leaving a bus equals generation minus load, so
        // the two add to zero rather than subtract.
        for slot in slots {
            if let Some(r) = slot.theta_idx {
                mismatch[r] += slot.p_sched;
            }
            if let Some(r) = slot.v_idx {
                mismatch[r] += slot.q_sched;
            }
        }

        let max_mismatch = mismatch.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if max_mismatch < 1e-14 {
            return Ok(max_mismatch);
        }

        let dense = jac.to_rows();
        let mut sparse = rsparse::data::Sprs::new();
        sparse.from_vec(&dense);
        let mut rhs: Vec<f64> = mismatch.iter().map(|m| -m).collect();
        rsparse::lusol(&sparse, &mut rhs, 1, 1e-12)
            .map_err(|e| GridError::SolverConvergence(format!("newton power flow: {e:?}")))?;

        for slot in slots {
            if let Some(idx) = slot.theta_idx
                && let Some(b) = area.buses_mut().find(|b| b.id() == slot.id)
            {
                b.theta += rhs[idx];
            }
            if let Some(idx) = slot.v_idx
                && let Some(b) = area.buses_mut().find(|b| b.id() == slot.id)
            {
                b.v += rhs[idx];
            }
        }

        Ok(max_mismatch)
    }

    /// Runs Newton iterations to convergence or `max_iter`, after first
    /// resolving network topology and slack assignment.
    pub fn run_power_flow(&mut self, area: &mut Area) -> Result<SolverStatus> {
        area.check_network(true)?;
        let slots = Self::build_slots(area);
        let n = slots
            .iter()
            .map(|s| s.theta_idx.map(|_| 1).unwrap_or(0) + s.v_idx.map(|_| 1).unwrap_or(0))
            .sum();

        for iter in 0..self.max_iter {
            let max_mismatch = Self::newton_step(area, &slots, n)?;
            self.last_iterations = iter + 1;
            if max_mismatch < self.tolerance {
                self.initialized = true;
                return Ok(SolverStatus::Converged);
            }
        }
        Err(GridError::SolverConvergence(format!(
            "{} failed to converge within {} iterations",
            self.name, self.max_iter
        )))
    }
}

impl SolverInterface for NewtonPowerFlowSolver {
    fn allocate(&mut self, state_size: usize, root_count: usize) {
        self.state = vec![0.0; state_size];
        self.deriv = vec![0.0; state_size];
        self.types = vec![0.0; root_count];
    }

    fn set_max_non_zeros(&mut self, n: usize) {
        self.max_non_zeros = n;
    }

    fn set(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "tolerance" => self.tolerance = value,
            "maxiterations" | "maxiter" => self.max_iter = value as u32,
            _ => return Err(GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn initialize(&mut self, _t0: f64) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn state_data(&mut self) -> &mut [f64] {
        &mut self.state
    }

    fn deriv_data(&mut self) -> &mut [f64] {
        &mut self.deriv
    }

    fn type_data(&mut self) -> &mut [f64] {
        &mut self.types
    }

    fn solve(&mut self, area: &mut Area, _t_stop: f64) -> Result<SolverStatus> {
        self.run_power_flow(area)
    }

    fn get(&self, name: &str) -> Result<f64> {
        match name {
            "tolerance" => Ok(self.tolerance),
            "maxiterations" | "maxiter" => Ok(self.max_iter as f64),
            "iterations" => Ok(self.last_iterations as f64),
            _ => Err(GridError::UnrecognizedParameter(name.to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> SolverMode {
        self.mode
    }

    fn clone_handle(&self, full_copy: bool) -> Box<dyn SolverInterface> {
        let mut cloned = NewtonPowerFlowSolver::new(self.name.clone(), self.mode);
        cloned.tolerance = self.tolerance;
        cloned.max_iter = self.max_iter;
        cloned.max_non_zeros = self.max_non_zeros;
        if full_copy {
            cloned.state = self.state.clone();
            cloned.deriv = self.deriv.clone();
            cloned.types = self.types.clone();
            cloned.initialized = self.initialized;
        }
        Box::new(cloned)
    }

    fn non_zeros(&self) -> usize {
        self.max_non_zeros
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{Area, Primary};
    use crate::bus::Bus;
    use crate::devices::{Load, SubDevice};
    use crate::link::Link;

    #[test]
    fn two_bus_line_converges_with_slack_and_pq_load() {
        let mut area = Area::new("root");
        let mut slack = Bus::new("slack");
        slack.bus_type = BusType::Slk;
        let slack_id = slack.id();

        let mut load_bus = Bus::new("load");
        load_bus.bus_type = BusType::Pq;
        load_bus.add_sub_device(SubDevice::Load(Load { p: 0.2, q: 0.05, ..Load::new("l1") }));
        let load_id = load_bus.id();

        area.add(Primary::Bus(slack));
        area.add(Primary::Bus(load_bus));
        let mut link = Link::new("line", slack_id, load_id);
        link.params.r = 0.01;
        link.params.x = 0.1;
        area.add(Primary::Link(link));

        let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
        let status = solver.run_power_flow(&mut area).unwrap();
        assert_eq!(status, SolverStatus::Converged);

        let bus = area.buses().find(|b| b.id() == load_id).unwrap();
        assert!(bus.v < 1.0);
        assert!(bus.v > 0.8);
    }

    #[test]
    fn empty_area_converges_trivially() {
        let mut area = Area::new("root");
        let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
        let status = solver.run_power_flow(&mut area);
        assert!(status.is_ok());
    }

    #[test]
    fn no_slack_bus_surfaces_as_error() {
        let mut area = Area::new("root");
        let mut b = Bus::new("b1");
        b.bus_type = BusType::Pq;
        area.add(Primary::Bus(b));
        let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
        assert!(solver.run_power_flow(&mut area).is_err());
    }
}
