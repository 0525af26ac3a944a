//! Integration coverage for the kernel's seed scenarios: a driver-driven
//! power flow across two buses, tap-change adjustment converging within the
//! expected number of steps, and a power-flow solution round-tripping
//! through the binary persistence format.
//!
//! The IEEE-14 reference-network scenario and the partitioned-vs-DAE
//! dynamic-equivalence scenario are out of scope for this pass: both need a
//! dynamic DAE solver and/or a network-description loader, and this kernel
//! ships one concrete `SolverInterface` (a power-flow-only Newton solver,
//! see `DESIGN.md`) rather than a dynamic-mode implementation.

use griddyn_kernel::area::{Area, Primary};
use griddyn_kernel::bus::{Bus, BusType};
use griddyn_kernel::devices::{Load, SubDevice};
use griddyn_kernel::driver::{Action, Command, Driver, DriverState};
use griddyn_kernel::link::adjustable_transformer::{
    AdjustableTransformerControl, ControlMode, SteppingPolicy,
};
use griddyn_kernel::link::Link;
use griddyn_kernel::object::Identity;
use griddyn_kernel::persistence::TimeSeries;
use griddyn_kernel::solver_interface::{NewtonPowerFlowSolver, SolverStatus};
use griddyn_kernel::solver_mode::SolverMode;
use griddyn_kernel::GridError;

fn two_bus_area(load_p: f64, load_q: f64, r: f64, x: f64) -> (Area, griddyn_kernel::object::ObjectId) {
    let mut area = Area::new("root");

    let mut slack = Bus::new("slack");
    slack.bus_type = BusType::Slk;
    let slack_id = slack.id();

    let mut load_bus = Bus::new("load");
    load_bus.bus_type = BusType::Pq;
    load_bus.add_sub_device(SubDevice::Load(Load { p: load_p, q: load_q, ..Load::new("l1") }));
    let load_id = load_bus.id();

    area.add(Primary::Bus(slack));
    area.add(Primary::Bus(load_bus));

    let mut link = Link::new("line", slack_id, load_id);
    link.params.r = r;
    link.params.x = x;
    area.add(Primary::Link(link));

    (area, load_id)
}

#[test]
fn empty_area_powerflow_succeeds_with_no_buses_to_slack() {
    // An area with no buses has no unresolved network component, so
    // `check_network` succeeds trivially: there is nothing left requiring
    // a slack bus.
    let mut area = Area::new("root");
    assert!(area.check_network(false).is_ok());

    let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
    let status = solver.run_power_flow(&mut area).unwrap();
    assert_eq!(status, SolverStatus::Converged);
}

#[test]
fn lone_pq_bus_without_slack_surfaces_no_slack_bus_found() {
    let mut area = Area::new("root");
    let mut b = Bus::new("b1");
    b.bus_type = BusType::Pq;
    area.add(Primary::Bus(b));

    let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
    let err = solver.run_power_flow(&mut area).unwrap_err();
    assert!(matches!(err, GridError::NoSlackBusFound(_)));
}

#[test]
fn two_bus_line_converges_and_slack_supplies_the_load() {
    let (mut area, load_id) = two_bus_area(0.5, 0.1, 0.01, 0.1);

    let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
    let status = solver.run_power_flow(&mut area).unwrap();
    assert_eq!(status, SolverStatus::Converged);

    let slack = area.buses().find(|b| b.bus_type == BusType::Slk).unwrap();
    let load_bus = area.buses().find(|b| b.id() == load_id).unwrap();

    // With a short, mostly-reactive line the slack's injection to supply a
    // 0.5 pu load is close to 0.5 pu; the load bus sags slightly below 1 pu.
    assert!((slack.v - 1.0).abs() < 1e-9, "slack voltage is held at 1 pu");
    assert!(load_bus.v < 1.0 && load_bus.v > 0.9);
}

#[test]
fn driver_runs_powerflow_action_to_completion_on_a_two_bus_network() {
    let (area, _load_id) = two_bus_area(0.3, 0.05, 0.02, 0.08);
    let mut driver = Driver::new(area);

    driver.enqueue(Action::new(Command::Initialize));
    driver.enqueue(Action::new(Command::Powerflow));
    let result = driver.run();

    assert_eq!(result, griddyn_kernel::driver::ExecResult::Ok);
    assert_eq!(driver.state(), DriverState::PowerflowComplete);
}

#[test]
fn tap_change_adjustment_converges_within_seven_stepped_iterations() {
    // Voltage-controlled adjustable transformer: (Vmin, Vmax, Vtarget) =
    // (0.95, 1.05, 1.0), stepped with step_size = 0.01, starting from a
    // controlled voltage of 0.93. Expect `powerFlowAdjust`-equivalent calls
    // to keep nudging the tap for at most (1.0 - 0.93) / 0.01 = 7 steps,
    // then settle to `NoChange`.
    let mut control = AdjustableTransformerControl {
        mode: ControlMode::Voltage,
        policy: SteppingPolicy::Stepped,
        min: 0.95,
        max: 1.05,
        step_size: 0.01,
        ..Default::default()
    };

    let mut controlled_v = 0.93;
    let mut tap = 1.0;
    let mut changed_iterations = 0;

    for _ in 0..10 {
        let (new_tap, code) = control.stepped_adjust(tap, controlled_v);
        if code == griddyn_kernel::flags::ChangeCode::NoChange {
            break;
        }
        assert_eq!(code, griddyn_kernel::flags::ChangeCode::ParameterChange);
        changed_iterations += 1;
        tap = new_tap;
        // Each step of tap nudges the controlled voltage back toward 1.0 by
        // roughly step_size, the same increment the tap itself moved by.
        controlled_v += control.step_size;
    }

    assert!(changed_iterations <= 7, "converged in {changed_iterations} iterations");
    let (_, final_code) = control.stepped_adjust(tap, controlled_v);
    assert_eq!(final_code, griddyn_kernel::flags::ChangeCode::NoChange);
}

#[test]
fn converged_power_flow_round_trips_through_the_binary_persistence_format() {
    let (mut area, load_id) = two_bus_area(0.4, 0.1, 0.01, 0.1);
    let mut solver = NewtonPowerFlowSolver::new("pf", SolverMode::power_flow(1));
    solver.run_power_flow(&mut area).unwrap();

    let load_bus = area.buses().find(|b| b.id() == load_id).unwrap();
    let (v, theta) = (load_bus.v, load_bus.theta);

    let dir = std::env::temp_dir().join(format!("griddyn-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("pf_result.bin");

    let mut series = TimeSeries::new("converged power flow", vec!["v".to_string(), "theta".to_string()]);
    series.push_row(0.0, &[v, theta]).unwrap();
    series.write_binary(&path).unwrap();

    let loaded = TimeSeries::read_binary(&path).unwrap();
    assert_eq!(loaded.columns[0], vec![v]);
    assert_eq!(loaded.columns[1], vec![theta]);

    std::fs::remove_dir_all(&dir).ok();
}
