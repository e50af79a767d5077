mod benchmark;
mod enumerate;
mod error;
mod export;
mod family;
mod genetic;
mod local;
mod persist;
mod profile;
mod shape;
mod store;
mod surrogate;
mod tuner;

#[cfg(test)]
pub(crate) mod testing;

pub use benchmark::*;
pub use enumerate::*;
pub use error::*;
pub use export::*;
pub use family::*;
pub use genetic::*;
pub use local::*;
pub use persist::*;
pub use profile::*;
pub use shape::*;
pub use store::*;
pub use surrogate::*;
pub use tuner::*;
