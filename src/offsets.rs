//! Offset table and sizing/layout pass.
//!
//! Each object caches, per [`SolverMode`], its own local state-block size and
//! the summed size of its entire enabled, non-sampled subtree. `load_sizes`
//! computes those sizes bottom-up; `assign_offsets` then walks the same tree
//! top-down, handing out contiguous global offsets, monotone and contiguous
//! across siblings.

use crate::object::Identity;
use crate::solver_mode::{BufferLayout, ModeIndex, SolverMode};

/// Sentinel for "not present in this mode".
pub const NULL_LOCATION: usize = usize::MAX;

/// Per-mode offset record and cached subtree sub-totals.
#[derive(Debug, Clone, Copy)]
pub struct ModeOffsets {
    pub alg_offset: usize,
    pub diff_offset: usize,
    pub root_offset: usize,
    pub jac_offset: usize,

    pub alg_size: usize,
    pub diff_size: usize,
    pub v_size: usize,
    pub a_size: usize,
    pub alg_roots: usize,
    pub diff_roots: usize,
    pub jac_size: usize,

    pub state_loaded: bool,
    pub rj_loaded: bool,
}

impl Default for ModeOffsets {
    fn default() -> Self {
        ModeOffsets {
            alg_offset: NULL_LOCATION,
            diff_offset: NULL_LOCATION,
            root_offset: NULL_LOCATION,
            jac_offset: NULL_LOCATION,
            alg_size: 0,
            diff_size: 0,
            v_size: 0,
            a_size: 0,
            alg_roots: 0,
            diff_roots: 0,
            jac_size: 0,
            state_loaded: false,
            rj_loaded: false,
        }
    }
}

impl ModeOffsets {
    pub fn state_size(&self) -> usize {
        self.alg_size + self.diff_size
    }
}

/// Sparse-by-mode-index table of [`ModeOffsets`], one per object.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    modes: Vec<Option<ModeOffsets>>,
}

impl OffsetTable {
    pub fn get(&self, mode: ModeIndex) -> Option<&ModeOffsets> {
        self.modes.get(mode).and_then(|o| o.as_ref())
    }

    pub fn ensure(&mut self, mode: ModeIndex) -> &mut ModeOffsets {
        if self.modes.len() <= mode {
            self.modes.resize_with(mode + 1, || None);
        }
        self.modes[mode].get_or_insert_with(ModeOffsets::default)
    }

    /// Invalidates the cache for one mode (posted whenever a change-alert
    /// flag is set on that mode's offset table).
    pub fn invalidate(&mut self, mode: ModeIndex) {
        if let Some(slot) = self.modes.get_mut(mode) {
            if let Some(o) = slot {
                o.state_loaded = false;
                o.rj_loaded = false;
            }
        }
    }

    pub fn invalidate_all(&mut self) {
        for slot in self.modes.iter_mut().flatten() {
            slot.state_loaded = false;
            slot.rj_loaded = false;
        }
    }
}

/// Object-safe sizing contract implemented by every [`crate::area::Primary`]
/// and [`crate::devices::SubDevice`] variant, used to drive `load_sizes` and
/// `assign_offsets` generically over the tree.
pub trait Sizing: Identity {
    fn local_alg_size(&self, mode: &SolverMode) -> usize;
    fn local_diff_size(&self, mode: &SolverMode) -> usize;
    fn local_root_size(&self, mode: &SolverMode) -> usize;
    fn local_jac_size(&self, mode: &SolverMode) -> usize;

    fn offsets(&self) -> &OffsetTable;
    fn offsets_mut(&mut self) -> &mut OffsetTable;

    /// `true` for objects flagged `has_pflow_states`; controls the
    /// power-flow-mode early exit in `load_sizes`.
    fn has_pflow_states(&self) -> bool {
        true
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Sizing>;
    fn children(&self) -> Vec<&dyn Sizing>;
}

/// Implements [`Sizing`] for a leaf sub-device with no solver-owned state of
/// its own (a pure function of its parent's outputs, like a ZIP load) and no
/// children.
#[macro_export]
macro_rules! impl_zero_state_sizing {
    ($ty:ty) => {
        impl $crate::offsets::Sizing for $ty {
            fn local_alg_size(&self, _mode: &$crate::solver_mode::SolverMode) -> usize {
                0
            }
            fn local_diff_size(&self, _mode: &$crate::solver_mode::SolverMode) -> usize {
                0
            }
            fn local_root_size(&self, _mode: &$crate::solver_mode::SolverMode) -> usize {
                0
            }
            fn local_jac_size(&self, _mode: &$crate::solver_mode::SolverMode) -> usize {
                0
            }
            fn offsets(&self) -> &$crate::offsets::OffsetTable {
                &self.offsets
            }
            fn offsets_mut(&mut self) -> &mut $crate::offsets::OffsetTable {
                &mut self.offsets
            }
            fn children_mut(&mut self) -> Vec<&mut dyn $crate::offsets::Sizing> {
                Vec::new()
            }
            fn children(&self) -> Vec<&dyn $crate::offsets::Sizing> {
                Vec::new()
            }
        }
    };
}

/// Computes and caches local and subtree sizes for one solver mode.
pub fn load_sizes(obj: &mut dyn Sizing, mode: &SolverMode, dyn_only: bool) {
    use crate::flags::Flags;

    let enabled = obj.flags().contains(Flags::ENABLED);
    let sampled_only = obj.flags().contains(Flags::SAMPLED_ONLY);
    let idx = mode.offset_index;

    if !enabled {
        let o = obj.offsets_mut().ensure(idx);
        *o = ModeOffsets {
            state_loaded: true,
            rj_loaded: true,
            ..ModeOffsets::default()
        };
        return;
    }

    if dyn_only && !mode.dynamic && !obj.has_pflow_states() {
        let o = obj.offsets_mut().ensure(idx);
        *o = ModeOffsets {
            state_loaded: true,
            rj_loaded: true,
            ..ModeOffsets::default()
        };
        return;
    }

    if sampled_only {
        for child in obj.children_mut() {
            child.flags_mut().insert(Flags::SAMPLED_ONLY);
        }
        let o = obj.offsets_mut().ensure(idx);
        *o = ModeOffsets {
            state_loaded: true,
            rj_loaded: true,
            ..ModeOffsets::default()
        };
        return;
    }

    let local_alg = obj.local_alg_size(mode);
    let local_diff = obj.local_diff_size(mode);
    let local_root = obj.local_root_size(mode);
    let local_jac = obj.local_jac_size(mode);

    let mut alg_size = local_alg;
    let mut diff_size = local_diff;
    let mut alg_roots = local_root;
    let mut jac_size = local_jac;

    for child in obj.children_mut() {
        if !child.flags().contains(Flags::ENABLED) || child.flags().contains(Flags::SAMPLED_ONLY)
        {
            continue;
        }
        load_sizes(child, mode, dyn_only);
        if let Some(co) = child.offsets().get(idx) {
            alg_size += co.alg_size;
            diff_size += co.diff_size;
            alg_roots += co.alg_roots + co.diff_roots;
            jac_size += co.jac_size;
        }
    }

    let o = obj.offsets_mut().ensure(idx);
    o.alg_size = alg_size;
    o.diff_size = diff_size;
    o.alg_roots = alg_roots;
    o.diff_roots = 0;
    o.jac_size = jac_size;
    o.state_loaded = true;
    o.rj_loaded = true;
}

/// Running global counters threaded through `assign_offsets`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetCursor {
    pub alg: usize,
    pub diff: usize,
    pub root: usize,
    pub jac: usize,
}

/// Installs this object's local offsets then walks children left-to-right,
/// advancing the running offset by each child's subtree size — producing a
/// contiguous, monotone sibling layout.
pub fn assign_offsets(obj: &mut dyn Sizing, mode: &SolverMode, cursor: &mut OffsetCursor) {
    use crate::flags::Flags;
    let idx = mode.offset_index;

    if !obj.flags().contains(Flags::ENABLED) {
        let o = obj.offsets_mut().ensure(idx);
        o.alg_offset = NULL_LOCATION;
        o.diff_offset = NULL_LOCATION;
        o.root_offset = NULL_LOCATION;
        o.jac_offset = NULL_LOCATION;
        return;
    }

    let local_alg = obj.local_alg_size(mode);
    let local_diff = obj.local_diff_size(mode);
    let local_root = obj.local_root_size(mode);
    let local_jac = obj.local_jac_size(mode);

    {
        let o = obj.offsets_mut().ensure(idx);
        o.alg_offset = cursor.alg;
        o.diff_offset = cursor.diff;
        o.root_offset = cursor.root;
        o.jac_offset = cursor.jac;
    }
    cursor.alg += local_alg;
    cursor.diff += local_diff;
    cursor.root += local_root;
    cursor.jac += local_jac;

    for child in obj.children_mut() {
        if !child.flags().contains(Flags::ENABLED) || child.flags().contains(Flags::SAMPLED_ONLY)
        {
            continue;
        }
        assign_offsets(child, mode, cursor);
    }
}

/// Pointers (indices) into the correct state/derivative buffers for the
/// algebraic, differential, and destination regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Locations {
    pub alg_offset: Option<usize>,
    pub diff_offset: Option<usize>,
    pub dest_alg_offset: Option<usize>,
    pub dest_diff_offset: Option<usize>,
}

/// Resolves an object's buffer locations for a mode, dispatching on the
/// five buffer layouts.
pub fn get_locations(offsets: &ModeOffsets, mode: &SolverMode) -> Locations {
    let alg = (offsets.alg_offset != NULL_LOCATION).then_some(offsets.alg_offset);
    let diff = (offsets.diff_offset != NULL_LOCATION).then_some(offsets.diff_offset);

    match mode.layout() {
        BufferLayout::Local => Locations {
            alg_offset: alg,
            diff_offset: diff,
            dest_alg_offset: alg,
            dest_diff_offset: diff,
        },
        BufferLayout::Dae => Locations {
            alg_offset: alg,
            diff_offset: diff,
            dest_alg_offset: alg,
            dest_diff_offset: diff,
        },
        BufferLayout::AlgebraicOnly => Locations {
            alg_offset: alg,
            diff_offset: None,
            dest_alg_offset: alg,
            dest_diff_offset: None,
        },
        BufferLayout::DifferentialOnly => Locations {
            alg_offset: None,
            diff_offset: diff,
            dest_alg_offset: None,
            dest_diff_offset: diff,
        },
        BufferLayout::Paired => Locations {
            // Algebraic portion lives in one buffer, differential in the
            // paired buffer; a null destination signals "my half isn't
            // being computed in this mode".
            alg_offset: alg,
            diff_offset: diff,
            dest_alg_offset: if mode.algebraic { alg } else { None },
            dest_diff_offset: if mode.differential { diff } else { None },
        },
    }
}
