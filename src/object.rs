//! Object graph & identity.
//!
//! Every model entity carries a stable integer identity, a name, a flag
//! bitset, and a current/next-update time. The cyclic "bus references link,
//! link references bus" graph is *not* modeled
//! with Rust lifetimes: each [`Primary`](crate::area::Primary) is owned by
//! exactly one parent `Area`'s child list, and cross-subtree references are
//! plain [`ObjectId`] values resolved through [`crate::area::ObjectRegistry`]
//! at the moment they're needed — a lookup, never a borrow.

use crate::error::{GridError, Result};
use crate::flags::Flags;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity, unique for the lifetime of the process. Never reused,
/// even if the underlying object is removed — this is what makes an
/// [`ObjectId`] safe to hold as a weak reference past a structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    pub fn next() -> ObjectId {
        ObjectId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The closed tagged hierarchy: `Object -> CoreObject ->
/// (Primary | SubModel)`. Recovering the category from a trait object is
/// occasionally needed for type-specific attachment rules (e.g. only a
/// `Link` may be the target of `followNetwork`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Area,
    Bus,
    Link,
    Relay,
    Generator,
    Load,
    Exciter,
    Governor,
    Source,
    RelayBlock,
}

/// Fields common to every model object, embedded by composition (not
/// inheritance) into each concrete type. Accessed through the [`Identity`]
/// trait so callers don't need to know the concrete type.
#[derive(Debug, Clone)]
pub struct Core {
    pub id: ObjectId,
    pub name: String,
    pub user_id: Option<i64>,
    pub flags: Flags,
    pub t: f64,
    pub next_update: f64,
}

impl Core {
    pub fn new(name: impl Into<String>) -> Core {
        Core {
            id: ObjectId::next(),
            name: name.into(),
            user_id: None,
            flags: Flags::ENABLED,
            t: 0.0,
            next_update: f64::INFINITY,
        }
    }
}

/// Identity accessors common to every object.
pub trait Identity {
    fn core(&self) -> &Core;
    fn core_mut(&mut self) -> &mut Core;
    fn kind(&self) -> ObjectKind;

    fn id(&self) -> ObjectId {
        self.core().id
    }
    fn name(&self) -> &str {
        &self.core().name
    }
    fn set_name(&mut self, name: String) {
        self.core_mut().name = name;
    }
    fn flags(&self) -> Flags {
        self.core().flags
    }
    fn flags_mut(&mut self) -> &mut Flags {
        &mut self.core_mut().flags
    }
    fn enabled(&self) -> bool {
        self.flags().contains(Flags::ENABLED)
    }

    /// Sets a user-settable boolean flag by name, from a closed list.
    fn set_flag(&mut self, name: &str, value: bool) -> Result<()> {
        for (flag_name, flag) in crate::flags::USER_SETTABLE {
            if *flag_name == name {
                self.core_mut().flags.set(*flag, value);
                return Ok(());
            }
        }
        Err(GridError::UnrecognizedParameter(name.to_string()))
    }
}

/// Helper macro implementing [`Identity`] for a type with an embedded
/// `core: Core` field, to avoid repeating the boilerplate across every
/// concrete model type (bus, link, generator, ...).
#[macro_export]
macro_rules! impl_identity {
    ($ty:ty, $kind:expr) => {
        impl $crate::object::Identity for $ty {
            fn core(&self) -> &$crate::object::Core {
                &self.core
            }
            fn core_mut(&mut self) -> &mut $crate::object::Core {
                &mut self.core
            }
            fn kind(&self) -> $crate::object::ObjectKind {
                $kind
            }
        }
    };
}
