use core::time::Duration;
use hashbrown::HashMap;
use thiserror::Error;

use super::{KernelFamily, Profile, Shape, TuneError};

/// A failure of one kernel launch that says nothing about the health of the device.
///
/// The profile simply can't run on this shape; it is recorded with a performance of `0`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionFailure {
    /// The device doesn't support an operation required by the profile.
    #[error("Operation not supported")]
    OperationNotSupported,
    /// The launch requested more resources than available.
    #[error("Launch out of resources (host: {host})")]
    LaunchOutOfResources {
        /// Whether the host side ran out of resources.
        host: bool,
    },
    /// A buffer couldn't be allocated.
    #[error("Memory object allocation failure")]
    MemObjectAllocationFailure,
    /// The work-group configuration is invalid for the device.
    #[error("Invalid work-group size")]
    InvalidWorkGroupSize,
    /// The host ran out of memory.
    #[error("Out of host memory")]
    OutOfHostMemory,
    /// A launch parameter has an invalid value.
    #[error("Invalid value")]
    InvalidValue,
}

/// Error returned by a [benchmarker](Benchmarker).
#[derive(Error, Debug, Clone)]
pub enum BenchmarkError {
    /// Tolerated failure, see [ExecutionFailure].
    #[error("The kernel failed to execute\nCaused by:\n  {0}")]
    Execution(#[from] ExecutionFailure),

    /// Any other failure, tuning of the kernel is aborted.
    #[error("A fatal error happened during benchmarking\nCaused by:\n  {reason}")]
    Fatal {
        /// The cause of the error.
        reason: String,
    },
}

/// Executes a kernel with a given profile on a given shape and measures it.
///
/// Implementations own the device context; calls are blocking and never concurrent.
pub trait Benchmarker {
    /// Run `profile` on `shape` and return the elapsed time of one execution.
    fn benchmark(&mut self, shape: &Shape, profile: &Profile) -> Result<Duration, BenchmarkError>;
}

impl<B: Benchmarker + ?Sized> Benchmarker for &mut B {
    fn benchmark(&mut self, shape: &Shape, profile: &Profile) -> Result<Duration, BenchmarkError> {
        (**self).benchmark(shape, profile)
    }
}

/// Measures profiles on one shape.
///
/// Every outcome is remembered, so a profile is benchmarked at most once per probe. Profiles that
/// are infeasible for the shape are never launched.
pub struct Probe<'a, F: ?Sized, B: ?Sized> {
    family: &'a F,
    benchmarker: &'a mut B,
    shape: &'a Shape,
    outcomes: HashMap<Profile, Option<f64>>,
    benchmarks: usize,
}

impl<'a, F: KernelFamily + ?Sized, B: Benchmarker + ?Sized> Probe<'a, F, B> {
    /// Create a new probe for a shape.
    pub fn new(family: &'a F, benchmarker: &'a mut B, shape: &'a Shape) -> Self {
        Self {
            family,
            benchmarker,
            shape,
            outcomes: HashMap::new(),
            benchmarks: 0,
        }
    }

    /// The shape being measured.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// The kernel family being measured.
    pub fn family(&self) -> &'a F {
        self.family
    }

    /// The underlying benchmarker, e.g. to measure another shape.
    pub fn benchmarker(&mut self) -> &mut B {
        self.benchmarker
    }

    /// Number of benchmarks actually executed.
    pub fn benchmarks(&self) -> usize {
        self.benchmarks
    }

    /// Number of distinct profiles measured or rejected so far.
    pub fn evaluations(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether `profile` already has an outcome.
    pub fn is_known(&self, profile: &Profile) -> bool {
        self.outcomes.contains_key(profile)
    }

    /// The performance of `profile`, `None` if it can't execute on the shape.
    pub fn measure(&mut self, profile: &Profile) -> Result<Option<f64>, TuneError> {
        if let Some(outcome) = self.outcomes.get(profile) {
            return Ok(*outcome);
        }

        let outcome = if self.family.is_feasible(self.shape, profile) {
            self.benchmarks += 1;
            match self.benchmarker.benchmark(self.shape, profile) {
                Ok(elapsed) => Some(sanitize(self.family.performance(self.shape, elapsed))),
                Err(BenchmarkError::Execution(failure)) => {
                    log::debug!("Profile ({profile}) failed on shape ({}): {failure}", self.shape);
                    None
                }
                Err(BenchmarkError::Fatal { reason }) => {
                    return Err(TuneError::Fatal {
                        shape: self.shape.clone(),
                        profile: profile.clone(),
                        reason,
                    });
                }
            }
        } else {
            None
        };

        self.outcomes.insert(profile.clone(), outcome);
        Ok(outcome)
    }

    /// The performance of `profile`, `0` if it can't execute on the shape.
    pub fn performance(&mut self, profile: &Profile) -> Result<f64, TuneError> {
        Ok(self.measure(profile)?.unwrap_or(0.0))
    }
}

/// Non finite and negative performances are recorded as `0`.
pub(crate) fn sanitize(performance: f64) -> f64 {
    if performance.is_finite() && performance > 0.0 {
        performance
    } else {
        0.0
    }
}
