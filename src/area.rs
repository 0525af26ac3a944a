//! Area: the hierarchical composite that owns buses, links, relays, and
//! nested areas, plus the registry used to resolve weak cross-subtree
//! references and the network-topology passes that run before a power flow.

use std::collections::{HashMap, VecDeque};

use crate::assembly::ListMaintainer;
use crate::bus::{Bus, BusType};
use crate::device::{DeviceCapability, InitFlags};
use crate::devices::Relay;
use crate::error::{GridError, Result};
use crate::flags::{ChangeCode, Flags};
use crate::link::Link;
use crate::object::{Core, Identity, ObjectId, ObjectKind};
use crate::offsets::{OffsetTable, Sizing};
use crate::solver_mode::SolverMode;
use crate::state_data::StateData;
use crate::impl_identity;

/// The closed `Primary` tagged variant: area, bus, link, relay. Each
/// concrete type implements [`DeviceCapability`]; this enum recovers the
/// category (needed for attachment rules like "only a link may be the
/// target of `followNetwork`") and forwards calls to the active variant.
#[derive(Debug, Clone)]
pub enum Primary {
    Area(Area),
    Bus(Bus),
    Link(Link),
    Relay(Relay),
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            Primary::Area(x) => x.$method($($arg),*),
            Primary::Bus(x) => x.$method($($arg),*),
            Primary::Link(x) => x.$method($($arg),*),
            Primary::Relay(x) => x.$method($($arg),*),
        }
    };
}

impl Identity for Primary {
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

impl Sizing for Primary {
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
    fn offsets(&self) -> &OffsetTable {
        dispatch!(self, offsets)
    }
    fn offsets_mut(&mut self) -> &mut OffsetTable {
        dispatch!(self, offsets_mut)
    }
    fn children_mut(&mut self) -> Vec<&mut dyn Sizing> {
        dispatch!(self, children_mut)
    }
    fn children(&self) -> Vec<&dyn Sizing> {
        dispatch!(self, children)
    }
}

/// Resolves an [`ObjectId`] to the path needed to reach it from the root
/// area — the lookup mechanism that replaces lifetimes for cross-subtree
/// references (e.g. a relay monitoring a bus elsewhere in the tree).
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    paths: HashMap<ObjectId, Vec<usize>>,
}

impl ObjectRegistry {
    pub fn register(&mut self, id: ObjectId, path: Vec<usize>) {
        self.paths.insert(id, path);
    }

    pub fn path_of(&self, id: ObjectId) -> Option<&[usize]> {
        self.paths.get(&id).map(|v| v.as_slice())
    }

    /// Rebuilds the full registry via a depth-first walk from `root`.
    pub fn rebuild(&mut self, root: &Area) {
        self.paths.clear();
        let mut path = Vec::new();
        Self::walk(root, &mut path, self);
    }

    fn walk(area: &Area, path: &mut Vec<usize>, registry: &mut ObjectRegistry) {
        for (i, child) in area.children.iter().enumerate() {
            path.push(i);
            registry.register(child.id(), path.clone());
            if let Primary::Area(sub) = child {
                Self::walk(sub, path, registry);
            }
            path.pop();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Area {
    pub core: Core,
    pub offsets: OffsetTable,
    pub children: Vec<Primary>,
    pub list_maintainer: std::cell::RefCell<ListMaintainer>,
    pub reverse_converge: bool,
    pub direction_oscillate: bool,
}

impl_identity!(Area, ObjectKind::Area);

impl Sizing for Area {
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
        self.children.iter_mut().map(|c| c as &mut dyn Sizing).collect()
    }
    fn children(&self) -> Vec<&dyn Sizing> {
        self.children.iter().map(|c| c as &dyn Sizing).collect()
    }
}

impl Area {
    pub fn new(name: impl Into<String>) -> Area {
        Area {
            core: Core::new(name),
            offsets: OffsetTable::default(),
            children: Vec::new(),
            list_maintainer: std::cell::RefCell::new(ListMaintainer::default()),
            reverse_converge: false,
            direction_oscillate: false,
        }
    }

    pub fn add(&mut self, child: Primary) -> usize {
        self.children.push(child);
        self.children.len() - 1
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.children.iter().filter_map(|c| match c {
            Primary::Bus(b) => Some(b),
            _ => None,
        })
    }

    pub fn buses_mut(&mut self) -> impl Iterator<Item = &mut Bus> {
        self.children.iter_mut().filter_map(|c| match c {
            Primary::Bus(b) => Some(b),
            _ => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.children.iter().filter_map(|c| match c {
            Primary::Link(l) => Some(l),
            _ => None,
        })
    }

    pub fn links_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.children.iter_mut().filter_map(|c| match c {
            Primary::Link(l) => Some(l),
            _ => None,
        })
    }

    pub fn relays(&self) -> impl Iterator<Item = &Relay> {
        self.children.iter().filter_map(|c| match c {
            Primary::Relay(r) => Some(r),
            _ => None,
        })
    }

    /// Children visited in execution order for the current pass: insertion
    /// order, reversed when `reverse_converge` is set.
    fn ordered_indices(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.children.len()).collect();
        if self.reverse_converge {
            idx.reverse();
        }
        idx
    }

    /// BFS seeded at `start_bus`, propagating `net_id` across links whose
    /// `network_connected` flag is set. Links that decouple networks (here:
    /// an open-switch link, or a transformer regulating MW in a way that
    /// isolates the two sides) stop the propagation.
    pub fn follow_network(&mut self, start_bus: ObjectId, net_id: u32) {
        let mut visited: std::collections::HashSet<ObjectId> = std::collections::HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start_bus);
        visited.insert(start_bus);

        while let Some(current) = queue.pop_front() {
            if let Some(Primary::Bus(b)) = self.find_mut(current) {
                b.network_number = Some(net_id);
            }
            let neighbors = self.incident_bus_pairs(current);
            for (link_connected, other) in neighbors {
                if link_connected && !visited.contains(&other) {
                    visited.insert(other);
                    queue.push_back(other);
                }
            }
        }
    }

    fn incident_bus_pairs(&self, bus: ObjectId) -> Vec<(bool, ObjectId)> {
        let mut out = Vec::new();
        for link in self.links() {
            let decouples = link.switch1_open || link.switch2_open;
            if link.bus1 == bus {
                out.push((!decouples, link.bus2));
            } else if link.bus2 == bus {
                out.push((!decouples, link.bus1));
            }
        }
        out
    }

    fn find_mut(&mut self, id: ObjectId) -> Option<&mut Primary> {
        self.children.iter_mut().find(|c| c.id() == id)
    }

    /// Clears network numbers, BFS-labels every connected component, then
    /// ensures each component has a slack bus (promoting the largest PV
    /// capacity, or failing with `NoSlackBusFound`, according to
    /// `auto_promote_slack`).
    pub fn check_network(&mut self, auto_promote_slack: bool) -> Result<()> {
        for b in self.buses_mut() {
            b.network_number = None;
            if !b.flags().contains(Flags::ENABLED) {
                b.disconnect();
            }
        }

        let bus_ids: Vec<ObjectId> = self.buses().map(|b| b.id()).collect();
        let mut next_net = 0u32;
        for &id in &bus_ids {
            let already_labeled = matches!(self.find_mut(id), Some(Primary::Bus(b)) if b.network_number.is_some());
            if !already_labeled {
                self.follow_network(id, next_net);
                next_net += 1;
            }
        }

        for net in 0..next_net {
            let members: Vec<&Bus> = self.buses().filter(|b| b.network_number == Some(net)).collect();
            let has_slack = members.iter().any(|b| b.bus_type == BusType::Slk);
            if has_slack {
                continue;
            }
            let has_afix = members.iter().any(|b| b.bus_type == BusType::Afix);
            let pv_exists = members.iter().any(|b| b.bus_type == BusType::Pv);
            if has_afix && pv_exists {
                continue;
            }
            if auto_promote_slack {
                let best = self
                    .buses_mut()
                    .filter(|b| b.network_number == Some(net) && b.bus_type == BusType::Pv)
                    .max_by(|a, b| {
                        let cap_a: f64 = a
                            .sub_devices
                            .iter()
                            .map(|d| if let crate::devices::SubDevice::Generator(g) = d { g.upward_capacity() } else { 0.0 })
                            .sum();
                        let cap_b: f64 = b
                            .sub_devices
                            .iter()
                            .map(|d| if let crate::devices::SubDevice::Generator(g) = d { g.upward_capacity() } else { 0.0 })
                            .sum();
                        cap_a.partial_cmp(&cap_b).unwrap_or(std::cmp::Ordering::Equal)
                    });
                if let Some(bus) = best {
                    bus.bus_type = BusType::Slk;
                    continue;
                }
            }
            return Err(GridError::NoSlackBusFound(net));
        }
        Ok(())
    }

    /// Iterates `pFlowAdjustObjects`-equivalent children (all, here, since
    /// the area doesn't maintain a separate cached sub-list); if `level`
    /// requests a low-voltage check, iterates everything. Flag updates are
    /// suppressed for the duration of the walk.
    pub fn power_flow_adjust(&mut self, flags: InitFlags, level: u32) -> ChangeCode {
        self.core.flags.insert(Flags::STATE_COUNT_CHANGE); // placeholder for disable_flag_updates marker
        // Links read their controlling terminal's voltage through this
        // snapshot rather than a borrow of `self.children`, since a link's
        // bus1 lives at a different index in the same vector being walked.
        let bus_voltages: HashMap<ObjectId, f64> = self.buses().map(|b| (b.id(), b.v)).collect();
        let mut code = ChangeCode::NoChange;
        for idx in self.ordered_indices() {
            let child = &mut self.children[idx];
            if !child.flags().contains(Flags::ENABLED) {
                continue;
            }
            let child_code = match child {
                Primary::Bus(b) => b.power_flow_adjust(&[], flags, level),
                Primary::Link(l) => {
                    let v1 = bus_voltages.get(&l.bus1).copied().unwrap_or(1.0);
                    l.power_flow_adjust(&[v1], flags, level)
                }
                Primary::Area(a) => a.power_flow_adjust(flags, level),
                Primary::Relay(_) => ChangeCode::NoChange,
            };
            code = code.combine(child_code);
        }
        self.core.flags.remove(Flags::STATE_COUNT_CHANGE);
        code
    }

    /// Runs a residual pass over the active mode's execution lists.
    pub fn residual(&self, sd: &StateData, resid: &mut [f64], mode: &SolverMode) {
        self.list_maintainer
            .borrow_mut()
            .run_residual(&self.children, sd, resid, mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_area_has_no_slack_bus_error_is_absent_when_no_buses_exist() {
        let mut a = Area::new("root");
        assert!(a.check_network(false).is_ok());
    }

    #[test]
    fn lone_pq_bus_with_no_slack_fails_without_auto_promotion() {
        let mut a = Area::new("root");
        let mut b = Bus::new("b1");
        b.bus_type = BusType::Pq;
        a.add(Primary::Bus(b));
        let err = a.check_network(false).unwrap_err();
        assert!(matches!(err, GridError::NoSlackBusFound(_)));
    }

    #[test]
    fn lone_slack_bus_passes_network_check() {
        let mut a = Area::new("root");
        let mut b = Bus::new("b1");
        b.bus_type = BusType::Slk;
        a.add(Primary::Bus(b));
        assert!(a.check_network(false).is_ok());
    }

    #[test]
    fn follow_network_labels_both_ends_of_a_closed_link() {
        let mut a = Area::new("root");
        let b1 = Bus::new("b1");
        let b2 = Bus::new("b2");
        let id1 = b1.id();
        let id2 = b2.id();
        a.add(Primary::Bus(b1));
        a.add(Primary::Bus(b2));
        a.add(Primary::Link(Link::new("l1", id1, id2)));
        a.follow_network(id1, 7);
        let n1 = a.buses().find(|b| b.id() == id1).unwrap().network_number;
        let n2 = a.buses().find(|b| b.id() == id2).unwrap().network_number;
        assert_eq!(n1, Some(7));
        assert_eq!(n2, Some(7));
    }

    #[test]
    fn open_switch_link_does_not_propagate_network_number() {
        let mut a = Area::new("root");
        let b1 = Bus::new("b1");
        let b2 = Bus::new("b2");
        let id1 = b1.id();
        let id2 = b2.id();
        a.add(Primary::Bus(b1));
        a.add(Primary::Bus(b2));
        let mut link = Link::new("l1", id1, id2);
        link.switch1_open = true;
        a.add(Primary::Link(link));
        a.follow_network(id1, 3);
        let n2 = a.buses().find(|b| b.id() == id2).unwrap().network_number;
        assert_eq!(n2, None);
    }
}
