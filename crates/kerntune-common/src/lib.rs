#![warn(missing_docs)]

//! Common crate for kerntune.

/// Rand module contains types for random number generation.
pub mod rand;

/// Stable hashing used to derive reproducible seeds.
pub mod hash;

/// Crash-safe file and directory replacement.
pub mod atomic_file;
