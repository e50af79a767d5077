use core::time::Duration;

use super::{Profile, ProfileSpace, Shape, TuneLevel};

/// A parameterized kernel whose profiles can be tuned, e.g. a matrix product.
///
/// The family defines the configuration space, the constraints a profile must satisfy for a
/// given shape and how raw timings are turned into a performance metric.
pub trait KernelFamily {
    /// Unique name of the kernel, used as persistence and export key.
    fn name(&self) -> &str;

    /// Number of extents of the shapes of this kernel.
    fn shape_arity(&self) -> usize;

    /// The configuration space of the kernel.
    fn space(&self) -> &ProfileSpace;

    /// Whether `profile` can be launched on `shape`.
    fn is_feasible(&self, _shape: &Shape, _profile: &Profile) -> bool {
        true
    }

    /// Resource usage of a profile, lower is preferred when two profiles perform the same.
    fn cost(&self, profile: &Profile) -> u64 {
        profile.codes().iter().map(|code| *code as u64).sum()
    }

    /// Number of bytes the kernel touches for `shape`.
    fn memory_footprint(&self, shape: &Shape) -> u64;

    /// Performance of one execution, higher is better.
    fn performance(&self, shape: &Shape, elapsed: Duration) -> f64;

    /// Unit of [KernelFamily::performance].
    fn metric_name(&self) -> &str;

    /// Candidate shapes for a tuning level.
    fn shapes(&self, level: TuneLevel) -> Vec<Shape>;

    /// Data type key of the exported predictor.
    fn dtype(&self) -> &str {
        "float32"
    }
}
