//! Transient and steady-state power-system simulation kernel.
//!
//! An [`area::Area`] owns a tree of buses, links, relays, and nested areas.
//! Every model object implements [`offsets::Sizing`] (solver-mode offset
//! bookkeeping) and [`device::DeviceCapability`] (the residual/Jacobian/root
//! contract); an [`assembly::ListMaintainer`] builds the per-mode execution
//! order once and replays it on every assembly pass.

pub mod area;
pub mod assembly;
pub mod bus;
pub mod device;
pub mod devices;
pub mod driver;
pub mod error;
pub mod flags;
pub mod link;
pub mod object;
pub mod offsets;
pub mod persistence;
pub mod solver_interface;
pub mod solver_mode;
pub mod state_data;
pub mod units;

pub use error::{GridError, Result};
