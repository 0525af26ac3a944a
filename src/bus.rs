//! Bus: a node with voltage/angle/frequency state, incident links, and
//! attached sub-devices (generators, loads, exciters, governors, relays).

use crate::devices::SubDevice;
use crate::device::{DeviceCapability, InitFlags, VariableType};
use crate::error::Result;
use crate::flags::{AlertCode, Flags};
use crate::object::{Core, Identity, ObjectId, ObjectKind};
use crate::offsets::{OffsetTable, Sizing, NULL_LOCATION};
use crate::solver_mode::SolverMode;
use crate::state_data::{MatrixData, StateData};
use crate::impl_identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Pq,
    Pv,
    Slk,
    Afix,
}

#[derive(Debug, Clone)]
pub struct Bus {
    pub core: Core,
    pub offsets: OffsetTable,
    pub v: f64,
    pub theta: f64,
    pub freq: f64,
    pub base_voltage: f64,
    pub bus_type: BusType,
    pub v_tol: f64,
    pub angle_tol: f64,
    pub network_number: Option<u32>,
    pub sub_devices: Vec<SubDevice>,
    /// Incident links, referenced weakly; resolved through the owning
    /// area's registry, never stored as a borrow.
    pub incident_links: Vec<ObjectId>,
    seq_id: u64,
    cached_p: f64,
    cached_q: f64,
}

impl_identity!(Bus, ObjectKind::Bus);

impl Bus {
    pub fn new(name: impl Into<String>) -> Bus {
        Bus {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            v: 1.0,
            theta: 0.0,
            freq: 1.0,
            base_voltage: 1.0,
            bus_type: BusType::Pq,
            v_tol: 1e-6,
            angle_tol: 1e-6,
            network_number: None,
            sub_devices: Vec::new(),
            incident_links: Vec::new(),
            seq_id: u64::MAX,
            cached_p: 0.0,
            cached_q: 0.0,
        }
    }

    /// Appends a sub-device, returning its index within `sub_devices`
    /// (the `locIndex` the original "loc-index"-based attachment model
    /// assigns on `add`).
    pub fn add_sub_device(&mut self, device: SubDevice) -> usize {
        self.sub_devices.push(device);
        self.sub_devices.len() - 1
    }

    /// The three-element output tuple incident devices read: `(V, theta,
    /// freq)`. A standard bus has no solver-managed state of its own, so its
    /// output locations are always `(None, None, None)`.
    pub fn outputs(&self) -> [f64; 3] {
        [self.v, self.theta, self.freq]
    }

    /// Re-derives `cached_p`/`cached_q` from incident links and sub-devices
    /// if the sequence ID has advanced since the last refresh.
    pub fn update_local_cache(&mut self, link_flows: &[(ObjectId, f64, f64)], seq_id: u64) {
        if self.seq_id == seq_id {
            return;
        }
        let mut p = 0.0;
        let mut q = 0.0;
        for &id in &self.incident_links {
            if let Some((_, lp, lq)) = link_flows.iter().find(|(lid, _, _)| *lid == id) {
                p += lp;
                q += lq;
            }
        }
        let inputs = self.outputs();
        let sd = StateData::new(0.0, &[], &[], seq_id);
        let mode = SolverMode::local();
        for dev in &self.sub_devices {
            let out = dev.get_outputs(&inputs, &sd, &mode);
            match dev.kind() {
                ObjectKind::Generator | ObjectKind::Source => {
                    if out.len() >= 2 {
                        p -= out[0];
                        q -= out[1];
                    }
                }
                ObjectKind::Load => {
                    if out.len() >= 2 {
                        p += out[0];
                        q += out[1];
                    }
                }
                _ => {}
            }
        }
        self.cached_p = p;
        self.cached_q = q;
        self.seq_id = seq_id;
    }

    pub fn cached_power(&self) -> (f64, f64) {
        (self.cached_p, self.cached_q)
    }

    /// Disconnects the bus: sets the flag, zeros the electrical state, and
    /// emits a Jacobian-count-decrease alert.
    pub fn disconnect(&mut self) -> AlertCode {
        self.core.flags.insert(Flags::DISCONNECTED);
        self.offsets.invalidate_all();
        self.v = 0.0;
        self.theta = 0.0;
        AlertCode::JacCountDecrease
    }

    /// Reconnects the bus, optionally copying `(v, theta)` from a reference
    /// bus; emits a Jacobian-count-increase alert.
    pub fn reconnect(&mut self, reference: Option<(f64, f64)>) -> AlertCode {
        self.core.flags.remove(Flags::DISCONNECTED);
        if let Some((v, theta)) = reference {
            self.v = v;
            self.theta = theta;
        } else {
            self.v = 1.0;
            self.theta = 0.0;
        }
        AlertCode::JacCountIncrease
    }

    /// `set("voltage", v)`: emits `PotentialFaultChange` when dropping below
    /// the low-voltage threshold on an already-initialized dynamic bus.
    pub fn set_voltage(&mut self, v: f64, dyn_initialized: bool) -> Option<AlertCode> {
        self.v = v;
        if dyn_initialized && v < 0.25 {
            Some(AlertCode::PotentialFaultChange)
        } else {
            None
        }
    }
}

impl Sizing for Bus {
    fn local_alg_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn local_diff_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn local_root_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn local_jac_size(&self, _mode: &SolverMode) -> usize {
        0
    }
    fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }
    fn offsets_mut(&mut self) -> &mut OffsetTable {
        &mut self.offsets
    }
    fn children_mut(&mut self) -> Vec<&mut dyn Sizing> {
        self.sub_devices.iter_mut().map(|d| d as &mut dyn Sizing).collect()
    }
    fn children(&self) -> Vec<&dyn Sizing> {
        self.sub_devices.iter().map(|d| d as &dyn Sizing).collect()
    }
}

impl DeviceCapability for Bus {
    fn pflow_initialize_a(&mut self, t0: f64, flags: InitFlags) {
        for dev in &mut self.sub_devices {
            dev.pflow_initialize_a(t0, flags);
        }
    }
    fn pflow_initialize_b(&mut self) {
        for dev in &mut self.sub_devices {
            dev.pflow_initialize_b();
        }
    }

    fn residual(&self, _inputs: &[f64], sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        let outputs = self.outputs();
        for dev in &self.sub_devices {
            if !dev.flags().contains(Flags::ENABLED) {
                continue;
            }
            dev.residual(&outputs, sd, resid, mode);
        }
    }

    fn jacobian_elements(
        &self,
        _inputs: &[f64],
        sd: &StateData,
        matrix: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolverMode,
    ) {
        let outputs = self.outputs();
        for dev in &self.sub_devices {
            if !dev.flags().contains(Flags::ENABLED) {
                continue;
            }
            dev.jacobian_elements(&outputs, sd, matrix, input_locs, mode);
        }
    }

    fn get_outputs(&self, _inputs: &[f64], _sd: &StateData, _mode: &SolverMode) -> Vec<f64> {
        self.outputs().to_vec()
    }

    fn get_output_locs(&self, _mode: &SolverMode) -> Vec<Option<usize>> {
        vec![None, None, None]
    }

    fn get_variable_type(&self, types: &mut [VariableType], _mode: &SolverMode) {
        for t in types.iter_mut() {
            *t = VariableType::Algebraic;
        }
    }

    fn power_flow_adjust(
        &mut self,
        _inputs: &[f64],
        flags: InitFlags,
        level: u32,
    ) -> crate::flags::ChangeCode {
        let outputs = self.outputs();
        let mut code = crate::flags::ChangeCode::NoChange;
        for dev in &mut self.sub_devices {
            if !dev.flags().contains(Flags::ENABLED) {
                continue;
            }
            code = code.combine(dev.power_flow_adjust(&outputs, flags, level));
        }
        code
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "voltage" | "v" => self.v = value,
            "angle" => self.theta = value,
            "freq" => self.freq = value,
            "basevoltage" => self.base_voltage = value,
            "vtol" => self.v_tol = value,
            "angletolerance" | "atol" => self.angle_tol = value,
            _ => return Err(crate::error::GridError::UnrecognizedParameter(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<f64> {
        match name {
            "voltage" | "v" => Ok(self.v),
            "angle" => Ok(self.theta),
            "freq" => Ok(self.freq),
            "basevoltage" => Ok(self.base_voltage),
            "vtol" => Ok(self.v_tol),
            "angletolerance" | "atol" => Ok(self.angle_tol),
            _ => Err(crate::error::GridError::UnrecognizedParameter(name.to_string())),
        }
    }
}

/// Sentinel confirming a standard bus never allocates its own algebraic or
/// differential state — a `debug_assert` boundary used by callers that rely
/// on invariant 4 (disabled objects contribute zero size).
pub fn assert_no_self_state(offsets: &OffsetTable, mode_index: usize) {
    if let Some(o) = offsets.get(mode_index) {
        debug_assert_eq!(o.alg_offset == NULL_LOCATION || o.alg_size == 0, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Load;

    #[test]
    fn disconnect_zeros_state_and_sets_flag() {
        let mut b = Bus::new("bus1");
        b.v = 1.0;
        let code = b.disconnect();
        assert_eq!(b.v, 0.0);
        assert!(b.flags().contains(Flags::DISCONNECTED));
        assert_eq!(code, AlertCode::JacCountDecrease);
    }

    #[test]
    fn reconnect_restores_default_state_without_reference() {
        let mut b = Bus::new("bus1");
        b.disconnect();
        let code = b.reconnect(None);
        assert_eq!(b.v, 1.0);
        assert!(!b.flags().contains(Flags::DISCONNECTED));
        assert_eq!(code, AlertCode::JacCountIncrease);
    }

    #[test]
    fn low_voltage_set_emits_potential_fault_change_when_dyn_initialized() {
        let mut b = Bus::new("bus1");
        assert!(b.set_voltage(0.1, true).is_some());
        assert!(b.set_voltage(0.1, false).is_none());
    }

    #[test]
    fn update_local_cache_sums_attached_load_into_bus_power() {
        let mut b = Bus::new("bus1");
        b.add_sub_device(SubDevice::Load(Load { p: 0.5, ..Load::new("l1") }));
        b.update_local_cache(&[], 1);
        let (p, _q) = b.cached_power();
        assert!((p - 0.5).abs() < 1e-12);
    }
}
