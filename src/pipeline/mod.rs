//! Pipeline module - binning and per-feature diagnostics over labelled samples

pub mod binning;
pub mod correlation;
pub mod frame;
pub mod ks;
pub mod loader;
pub mod profile;
pub mod psi;
pub mod schema;
pub mod significance;
pub mod target;
pub mod weights;

pub use binning::*;
pub use correlation::*;
pub use frame::*;
pub use ks::*;
pub use loader::*;
pub use profile::*;
pub use psi::*;
pub use schema::*;
pub use significance::*;
pub use target::*;
pub use weights::*;
