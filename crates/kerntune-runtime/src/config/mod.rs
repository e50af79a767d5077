/// Tuning loop config module.
pub mod tune;

mod base;
mod logger;

pub use base::*;
pub use logger::*;
