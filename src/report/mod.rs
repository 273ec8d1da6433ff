//! Report module - tables and JSON export of diagnostics and model summaries

pub mod evaluation;
pub mod export;
pub mod tables;

pub use evaluation::*;
pub use export::*;
pub use tables::*;
