#![warn(missing_docs)]

//! BLAS kernel families: vector updates and reductions, matrix-vector and matrix-matrix products.

#[macro_use]
extern crate derive_new;

mod family;
mod kernel;
mod sizes;

pub use family::*;
pub use kernel::*;
pub use sizes::*;
