//! Assembly pipeline: per-mode execution lists built once per topology
//! change and walked in a fixed three-phase order on every residual,
//! derivative, algebraic-update, and Jacobian pass.

use std::collections::HashMap;

use crate::area::Primary;
use crate::flags::Flags;
use crate::object::Identity;
use crate::offsets::Sizing;
use crate::solver_mode::{ModeIndex, SolverMode};
use crate::state_data::{MatrixData, StateData};

/// Classification of one primary object's role for a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Requests pre-execution and carries state: runs in preEx, partial, full.
    PreExPartial,
    /// Requests pre-execution, no state of its own: runs in preEx and full only.
    PreExOnly,
    /// No pre-execution, carries state: runs in full and partial.
    Partial,
    /// Neither: excluded from every list.
    Excluded,
}

fn classify(obj: &Primary, mode: &SolverMode) -> Role {
    let preex = obj.flags().contains(Flags::PREEX_REQUESTED);
    let multipart = obj.flags().contains(Flags::MULTIPART_CAPABLE);
    let has_state = obj
        .offsets()
        .get(mode.offset_index)
        .map(|o| o.state_size() > 0)
        .unwrap_or(false);

    match (preex, multipart, has_state) {
        (true, true, _) => Role::PreExPartial,
        (true, false, true) => Role::PreExOnly,
        (false, _, true) => Role::Partial,
        _ => Role::Excluded,
    }
}

/// Per-mode execution lists, by index into `Area::children`.
#[derive(Debug, Clone, Default)]
struct ModeLists {
    pre_ex: Vec<usize>,
    full: Vec<usize>,
    partial: Vec<usize>,
    valid: bool,
}

/// Holds, per solver-mode-index, the three cached execution lists and
/// rebuilds them on demand when the topology has changed.
#[derive(Debug, Clone, Default)]
pub struct ListMaintainer {
    lists: HashMap<ModeIndex, ModeLists>,
}

impl ListMaintainer {
    pub fn invalidate(&mut self, mode: ModeIndex) {
        if let Some(l) = self.lists.get_mut(&mode) {
            l.valid = false;
        }
    }

    pub fn invalidate_all(&mut self) {
        for l in self.lists.values_mut() {
            l.valid = false;
        }
    }

    fn is_list_valid(&self, mode: ModeIndex) -> bool {
        self.lists.get(&mode).map(|l| l.valid).unwrap_or(false)
    }

    /// Walks `children` once, classifying each entry into the preEx/full/
    /// partial lists for `mode`.
    pub fn make_list(&mut self, children: &[Primary], mode: &SolverMode) {
        let mut lists = ModeLists::default();
        for (i, child) in children.iter().enumerate() {
            if !child.flags().contains(Flags::ENABLED) {
                continue;
            }
            match classify(child, mode) {
                Role::PreExPartial => {
                    lists.pre_ex.push(i);
                    lists.partial.push(i);
                    lists.full.push(i);
                }
                Role::PreExOnly => {
                    lists.pre_ex.push(i);
                    lists.full.push(i);
                }
                Role::Partial => {
                    lists.partial.push(i);
                    lists.full.push(i);
                }
                Role::Excluded => {}
            }
        }
        lists.valid = true;
        self.lists.insert(mode.offset_index, lists);
    }

    fn ensure(&mut self, children: &[Primary], mode: &SolverMode) {
        if !self.is_list_valid(mode.offset_index) {
            self.make_list(children, mode);
        }
    }

    /// Three-phase residual pass: (1) `preEx` on every `pre_ex` entry, (2)
    /// `residual` on every `partial` entry, (3) `delayedResidual` on every
    /// `pre_ex` entry again. A nested area's own three-phase pass runs
    /// recursively inside its `residual` call, so it takes no `preEx`/
    /// delayed contribution of its own at this level.
    pub fn run_residual(
        &mut self,
        children: &[Primary],
        sd: &StateData,
        resid: &mut [f64],
        mode: &SolverMode,
    ) {
        self.ensure(children, mode);
        let lists = self.lists.get(&mode.offset_index).expect("list just ensured");
        for &i in &lists.pre_ex {
            dispatch_pre_ex(&children[i], sd, resid, mode);
        }
        for &i in &lists.partial {
            dispatch_residual(&children[i], sd, resid, mode);
        }
        for &i in &lists.pre_ex {
            dispatch_delayed_residual(&children[i], sd, resid, mode);
        }
    }

    /// Two-phase Jacobian pass: `jacobian_elements` on every `partial`
    /// entry, then `delayedJacobian` on every `pre_ex` entry. `preEx` has no
    /// Jacobian-phase counterpart here: its only effect is a residual-sink
    /// contribution (see `DeviceCapability::pre_ex`), settled once by
    /// `run_residual` before the Jacobian pass runs against the same state.
    pub fn run_jacobian(
        &mut self,
        children: &[Primary],
        sd: &StateData,
        matrix: &mut dyn MatrixData,
        mode: &SolverMode,
    ) {
        self.ensure(children, mode);
        let lists = self.lists.get(&mode.offset_index).expect("list just ensured");
        for &i in &lists.partial {
            dispatch_jacobian(&children[i], sd, matrix, mode);
        }
        for &i in &lists.pre_ex {
            dispatch_delayed_jacobian(&children[i], sd, matrix, mode);
        }
    }
}

fn dispatch_pre_ex(obj: &Primary, sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
    use crate::device::DeviceCapability;
    match obj {
        Primary::Bus(b) => b.pre_ex(&[], sd, resid, mode),
        Primary::Link(l) => l.pre_ex(&[], sd, resid, mode),
        Primary::Area(_) => {}
        Primary::Relay(_) => {}
    }
}

fn dispatch_residual(obj: &Primary, sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
    use crate::device::DeviceCapability;
    match obj {
        Primary::Bus(b) => b.residual(&[], sd, resid, mode),
        Primary::Link(l) => l.residual(&[], sd, resid, mode),
        Primary::Area(a) => a.residual(sd, resid, mode),
        Primary::Relay(_) => {}
    }
}

fn dispatch_delayed_residual(obj: &Primary, sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
    use crate::device::DeviceCapability;
    match obj {
        Primary::Bus(b) => b.delayed_residual(&[], sd, resid, mode),
        Primary::Link(l) => l.delayed_residual(&[], sd, resid, mode),
        Primary::Area(_) => {}
        Primary::Relay(_) => {}
    }
}

fn dispatch_jacobian(obj: &Primary, sd: &StateData, matrix: &mut dyn MatrixData, mode: &SolverMode) {
    use crate::device::DeviceCapability;
    match obj {
        Primary::Bus(b) => b.jacobian_elements(&[], sd, matrix, &[], mode),
        Primary::Link(_) => {}
        Primary::Area(_) => {}
        Primary::Relay(_) => {}
    }
}

fn dispatch_delayed_jacobian(obj: &Primary, sd: &StateData, matrix: &mut dyn MatrixData, mode: &SolverMode) {
    use crate::device::DeviceCapability;
    match obj {
        Primary::Bus(b) => b.delayed_jacobian(&[], sd, matrix, &[], mode),
        Primary::Link(_) => {}
        Primary::Area(_) => {}
        Primary::Relay(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::devices::{Load, SubDevice};

    #[test]
    fn make_list_excludes_objects_with_no_state_and_no_preex_request() {
        let mut maintainer = ListMaintainer::default();
        let children = vec![Primary::Bus(Bus::new("b1"))];
        let mode = SolverMode::power_flow(1);
        maintainer.make_list(&children, &mode);
        let lists = maintainer.lists.get(&1).unwrap();
        assert!(lists.partial.is_empty());
        assert!(lists.full.is_empty());
    }

    #[test]
    fn run_residual_rebuilds_list_lazily_and_caches_it() {
        let mut maintainer = ListMaintainer::default();
        let mut bus = Bus::new("b1");
        bus.add_sub_device(SubDevice::Load(Load::new("l1")));
        let children = vec![Primary::Bus(bus)];
        let mode = SolverMode::power_flow(2);
        let sd = StateData::new(0.0, &[], &[], 0);
        let mut resid = [0.0; 4];
        maintainer.run_residual(&children, &sd, &mut resid, &mode);
        assert!(maintainer.is_list_valid(2));
    }

    #[test]
    fn preex_requested_object_with_state_lands_in_both_pre_ex_and_partial() {
        let mut bus = Bus::new("b1");
        bus.flags_mut().insert(Flags::PREEX_REQUESTED | Flags::MULTIPART_CAPABLE);
        let mode = SolverMode::power_flow(3);
        bus.offsets_mut().ensure(mode.offset_index).alg_size = 1;
        let children = vec![Primary::Bus(bus)];

        let mut maintainer = ListMaintainer::default();
        maintainer.make_list(&children, &mode);
        let lists = maintainer.lists.get(&3).unwrap();
        assert_eq!(lists.pre_ex, vec![0]);
        assert_eq!(lists.partial, vec![0]);
        assert_eq!(lists.full, vec![0]);
    }

    #[test]
    fn run_residual_executes_preex_and_partial_phases_without_panicking() {
        let mut bus = Bus::new("b1");
        bus.flags_mut().insert(Flags::PREEX_REQUESTED | Flags::MULTIPART_CAPABLE);
        let mode = SolverMode::power_flow(4);
        bus.offsets_mut().ensure(mode.offset_index).alg_size = 1;
        let children = vec![Primary::Bus(bus)];

        let mut maintainer = ListMaintainer::default();
        let sd = StateData::new(0.0, &[], &[], 0);
        let mut resid = [0.0; 4];
        maintainer.run_residual(&children, &sd, &mut resid, &mode);

        let mut matrix = crate::state_data::TripletMatrixData::new();
        maintainer.run_jacobian(&children, &sd, &mut matrix, &mode);
    }
}
