//! Object flags: a typed bitset grouped into structural, status,
//! change-alert, and user-settable flags. Change-alert flags cascade upward
//! (OR'd into the parent) during flag recomputation; the rest do not.

use bitflags::bitflags;

bitflags! {
    /// ~50-flag bitset attached to every [`crate::object::Object`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        // --- structural ---
        const HAS_PFLOW_STATES        = 1 << 0;
        const HAS_DYN_STATES          = 1 << 1;
        const HAS_ROOTS                = 1 << 2;
        const HAS_POWERFLOW_ADJUSTMENTS = 1 << 3;
        const PREEX_REQUESTED          = 1 << 4;
        const MULTIPART_CAPABLE        = 1 << 5;

        // --- status ---
        const ENABLED                  = 1 << 6;
        const DISCONNECTED             = 1 << 7;
        const INITIALIZED_FOR_PFLOW    = 1 << 8;
        const INITIALIZED_FOR_DYN      = 1 << 9;
        const ARMED                    = 1 << 10;

        // --- change alerts (cascade upward; OR'd into parent) ---
        const STATE_COUNT_CHANGE       = 1 << 11;
        const ROOT_COUNT_CHANGE        = 1 << 12;
        const JACOBIAN_COUNT_CHANGE    = 1 << 13;
        const OBJECT_COUNT_CHANGE      = 1 << 14;
        const CONSTRAINT_CHANGE        = 1 << 15;
        const CONNECTIVITY_CHANGE      = 1 << 16;
        const VOLTAGE_CONTROL_CHANGE   = 1 << 17;

        // --- user-settable ---
        const LATE_INIT                = 1 << 18;
        const SAMPLED_ONLY             = 1 << 19;
        const NO_AUTO_DISCONNECT       = 1 << 20;
    }
}

/// The subset of [`Flags`] that cascades (ORs upward into the parent) when
/// recomputed: cascading flags OR upward from sub-objects into the parent
/// during flag recomputation.
pub const CASCADING_FLAGS: Flags = Flags::STATE_COUNT_CHANGE
    .union(Flags::ROOT_COUNT_CHANGE)
    .union(Flags::JACOBIAN_COUNT_CHANGE)
    .union(Flags::OBJECT_COUNT_CHANGE)
    .union(Flags::CONSTRAINT_CHANGE)
    .union(Flags::CONNECTIVITY_CHANGE)
    .union(Flags::VOLTAGE_CONTROL_CHANGE);

/// Closed list of user-settable flags, addressable by name through
/// [`crate::object::Object::set_flag`].
pub const USER_SETTABLE: &[(&str, Flags)] = &[
    ("late_init", Flags::LATE_INIT),
    ("sampled_only", Flags::SAMPLED_ONLY),
    ("no_auto_disconnect", Flags::NO_AUTO_DISCONNECT),
    ("enabled", Flags::ENABLED),
    ("armed", Flags::ARMED),
];

/// Alert codes passed to [`crate::object::Object::alert`]; each maps onto a
/// change-alert flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCode {
    StateCountIncrease,
    StateCountDecrease,
    RootCountIncrease,
    RootCountDecrease,
    JacCountIncrease,
    JacCountDecrease,
    ObjectCountChange,
    ConstraintChange,
    ConnectivityChange,
    VoltageControlChange,
    PotentialFaultChange,
}

impl AlertCode {
    /// The flag this code sets on the receiving object before re-dispatch.
    pub fn flag(self) -> Flags {
        match self {
            AlertCode::StateCountIncrease | AlertCode::StateCountDecrease => {
                Flags::STATE_COUNT_CHANGE
            }
            AlertCode::RootCountIncrease | AlertCode::RootCountDecrease => {
                Flags::ROOT_COUNT_CHANGE
            }
            AlertCode::JacCountIncrease | AlertCode::JacCountDecrease => {
                Flags::JACOBIAN_COUNT_CHANGE
            }
            AlertCode::ObjectCountChange => Flags::OBJECT_COUNT_CHANGE,
            AlertCode::ConstraintChange => Flags::CONSTRAINT_CHANGE,
            AlertCode::ConnectivityChange => Flags::CONNECTIVITY_CHANGE,
            AlertCode::VoltageControlChange | AlertCode::PotentialFaultChange => {
                Flags::VOLTAGE_CONTROL_CHANGE
            }
        }
    }
}

/// Aggregate change severity returned by `powerFlowAdjust` and friends:
/// `no_change < parameter_change < jacobian_change < state_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ChangeCode {
    #[default]
    NoChange = 0,
    ParameterChange = 1,
    JacobianChange = 2,
    StateChange = 3,
}

impl ChangeCode {
    pub fn combine(self, other: ChangeCode) -> ChangeCode {
        self.max(other)
    }
}
