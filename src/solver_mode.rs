//! Solver mode descriptor.
//!
//! A [`SolverMode`] addresses one solver run: whether it is dynamic or
//! power-flow-only, algebraic/differential/both, local (single-object) or
//! global, and which [`Approx`](crate::link::approx::Approx) level a link
//! should evaluate at. Two modes with equal flag tuples compare equal.

use crate::link::approx::Approx;

/// Index into the per-object offset array, and into the driver's solver
/// registry. `0` is reserved for the always-defined `local` mode.
pub type ModeIndex = usize;

pub const LOCAL_MODE_INDEX: ModeIndex = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverMode {
    pub offset_index: ModeIndex,
    pub dynamic: bool,
    pub differential: bool,
    pub algebraic: bool,
    pub local: bool,
    pub extended_state: bool,
    pub dc: bool,
    pub approx: Approx,
    pub paired_offset_index: Option<ModeIndex>,
}

impl SolverMode {
    /// The always-available mode for inspecting a single object without a
    /// global solve; always defined with offset 0.
    pub fn local() -> SolverMode {
        SolverMode {
            offset_index: LOCAL_MODE_INDEX,
            dynamic: false,
            differential: false,
            algebraic: true,
            local: true,
            extended_state: false,
            dc: false,
            approx: Approx::Full,
            paired_offset_index: None,
        }
    }

    pub fn power_flow(offset_index: ModeIndex) -> SolverMode {
        SolverMode {
            offset_index,
            dynamic: false,
            differential: false,
            algebraic: true,
            local: false,
            extended_state: false,
            dc: false,
            approx: Approx::Full,
            paired_offset_index: None,
        }
    }

    pub fn dae(offset_index: ModeIndex) -> SolverMode {
        SolverMode {
            offset_index,
            dynamic: true,
            differential: true,
            algebraic: true,
            local: false,
            extended_state: false,
            dc: false,
            approx: Approx::Full,
            paired_offset_index: None,
        }
    }

    pub fn dyn_algebraic(offset_index: ModeIndex, paired: ModeIndex) -> SolverMode {
        SolverMode {
            offset_index,
            dynamic: true,
            differential: false,
            algebraic: true,
            local: false,
            extended_state: false,
            dc: false,
            approx: Approx::Full,
            paired_offset_index: Some(paired),
        }
    }

    pub fn dyn_differential(offset_index: ModeIndex, paired: ModeIndex) -> SolverMode {
        SolverMode {
            offset_index,
            dynamic: true,
            differential: true,
            algebraic: false,
            local: false,
            extended_state: false,
            dc: false,
            approx: Approx::Full,
            paired_offset_index: Some(paired),
        }
    }

    /// Classifies which of the five buffer layouts this mode resolves to.
    pub fn layout(&self) -> BufferLayout {
        if self.local {
            BufferLayout::Local
        } else if self.paired_offset_index.is_some() {
            BufferLayout::Paired
        } else if self.dynamic && self.differential && !self.algebraic {
            BufferLayout::DifferentialOnly
        } else if self.algebraic && !self.differential {
            BufferLayout::AlgebraicOnly
        } else {
            BufferLayout::Dae
        }
    }
}

/// The five branches a location lookup dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLayout {
    Local,
    Dae,
    AlgebraicOnly,
    DifferentialOnly,
    Paired,
}
