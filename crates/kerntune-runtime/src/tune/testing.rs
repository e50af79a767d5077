//! A small vector kernel with an analytic timing model, used by unit tests.

use core::time::Duration;

use super::*;

pub(crate) struct TestFamily {
    space: ProfileSpace,
}

impl TestFamily {
    pub(crate) fn new() -> Self {
        Self {
            space: ProfileSpace::new(vec![
                ParamSpec::new("simd".into(), ParamDomain::Pow2 { min_exp: 0, max_exp: 2 }),
                ParamSpec::new(
                    "local_size".into(),
                    ParamDomain::Pow2 { min_exp: 4, max_exp: 8 },
                ),
            ]),
        }
    }

    pub(crate) fn profile(&self, simd: u32, local_size: u32) -> Profile {
        Profile::new(vec![ParamValue::Int(simd), ParamValue::Int(local_size)])
    }
}

impl KernelFamily for TestFamily {
    fn name(&self) -> &str {
        "vector"
    }

    fn shape_arity(&self) -> usize {
        1
    }

    fn space(&self) -> &ProfileSpace {
        &self.space
    }

    fn is_feasible(&self, shape: &Shape, profile: &Profile) -> bool {
        shape.dims()[0] % profile.code(0) as usize == 0
    }

    fn memory_footprint(&self, shape: &Shape) -> u64 {
        shape.dims()[0] as u64 * 8
    }

    fn performance(&self, shape: &Shape, elapsed: Duration) -> f64 {
        self.memory_footprint(shape) as f64 / elapsed.as_nanos() as f64
    }

    fn metric_name(&self) -> &str {
        "GB/s"
    }

    fn shapes(&self, level: TuneLevel) -> Vec<Shape> {
        match level {
            TuneLevel::Simple => vec![Shape::from([1 << 20])],
            _ => (10..20).map(|exp| Shape::from([1 << exp])).collect(),
        }
    }
}

/// Simulated bandwidth in GB/s: wider vectors are faster, work groups of 64 are optimal.
pub(crate) fn bandwidth(profile: &Profile) -> f64 {
    let simd = profile.code(0) as f64;
    let local_size = profile.code(1) as f64;
    let distance = (local_size.log2() - 6.0).abs();

    100.0 * (0.25 + 0.25 * simd) / (1.0 + distance)
}

enum Mode {
    Healthy,
    Failing(ExecutionFailure),
    Fatal,
}

pub(crate) struct TestBenchmarker {
    mode: Mode,
    failing_profiles: Vec<Profile>,
    pub(crate) calls: usize,
}

impl TestBenchmarker {
    pub(crate) fn new() -> Self {
        Self {
            mode: Mode::Healthy,
            failing_profiles: Vec::new(),
            calls: 0,
        }
    }

    pub(crate) fn failing(mut self, failure: ExecutionFailure) -> Self {
        self.mode = Mode::Failing(failure);
        self
    }

    /// Only the given profiles fail, with an invalid work-group size.
    pub(crate) fn failing_on(mut self, profiles: Vec<Profile>) -> Self {
        self.failing_profiles = profiles;
        self
    }

    pub(crate) fn fatal(mut self) -> Self {
        self.mode = Mode::Fatal;
        self
    }
}

impl Benchmarker for TestBenchmarker {
    fn benchmark(&mut self, shape: &Shape, profile: &Profile) -> Result<Duration, BenchmarkError> {
        self.calls += 1;

        if self.failing_profiles.contains(profile) {
            return Err(ExecutionFailure::InvalidWorkGroupSize.into());
        }

        match self.mode {
            Mode::Healthy => {
                let bytes = shape.dims()[0] as f64 * 8.0;
                Ok(Duration::from_nanos((bytes / bandwidth(profile)) as u64))
            }
            Mode::Failing(failure) => Err(failure.into()),
            Mode::Fatal => Err(BenchmarkError::Fatal {
                reason: "device lost".into(),
            }),
        }
    }
}
