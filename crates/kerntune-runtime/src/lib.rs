#![warn(missing_docs)]

//! Incremental autotuning engine: learns which kernel profile to use for which problem shape.

#[macro_use]
extern crate derive_new;

/// Configuration module.
pub mod config;

/// Autotune module.
pub mod tune;

mod device;
pub use device::*;
