//! Terminal output helpers shared by the driver and flagged library fallbacks

pub mod progress;
pub mod styling;

pub use progress::*;
pub use styling::*;
