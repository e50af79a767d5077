//! A copy kernel with a block size and a fetch policy, timed by a table instead of a device.

use core::time::Duration;

use kerntune_runtime::tune::{
    BenchmarkError, Benchmarker, ExecutionFailure, FetchPolicy, KernelFamily, ParamDomain,
    ParamSpec, ParamValue, Profile, ProfileSpace, Shape, TuneLevel,
};

pub struct CopyFamily {
    space: ProfileSpace,
}

impl CopyFamily {
    pub fn new() -> Self {
        Self {
            space: ProfileSpace::new(vec![
                ParamSpec::new("block".into(), ParamDomain::Pow2 { min_exp: 5, max_exp: 8 }),
                ParamSpec::new("fetch".into(), ParamDomain::Fetch(FetchPolicy::ALL.to_vec())),
            ]),
        }
    }
}

pub fn profile(block: u32, fetch: FetchPolicy) -> Profile {
    Profile::new(vec![ParamValue::Int(block), ParamValue::Fetch(fetch)])
}

impl KernelFamily for CopyFamily {
    fn name(&self) -> &str {
        "copy"
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

    fn performance(&self, _shape: &Shape, elapsed: Duration) -> f64 {
        1.0 / elapsed.as_secs_f64()
    }

    fn metric_name(&self) -> &str {
        "GB/s"
    }

    fn shapes(&self, level: TuneLevel) -> Vec<Shape> {
        match level {
            TuneLevel::Simple => vec![Shape::from([1 << 20])],
            _ => (16..22).map(|exp| Shape::from([1 << exp])).collect(),
        }
    }
}

/// Performance of a profile: local fetches win, with 64 wide blocks on small copies and 128 wide
/// blocks on large ones.
pub fn expected_performance(shape: &Shape, profile: &Profile) -> f64 {
    let large = shape.dims()[0] >= 1 << 19;

    match (profile.code(0), profile.code(1), large) {
        (128, 0, true) => 200.0,
        (64, 0, _) => 150.0,
        (64, 1, _) => 120.0,
        _ => 60.0,
    }
}

#[derive(Default)]
pub struct DummyBenchmarker {
    failing: Vec<Shape>,
    fatal: Option<Shape>,
    pub calls: usize,
}

impl DummyBenchmarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch on `shape` runs out of resources.
    pub fn failing_on(mut self, shape: Shape) -> Self {
        self.failing.push(shape);
        self
    }

    /// The device is lost as soon as `shape` is launched.
    pub fn fatal_on(mut self, shape: Shape) -> Self {
        self.fatal = Some(shape);
        self
    }
}

impl Benchmarker for DummyBenchmarker {
    fn benchmark(&mut self, shape: &Shape, profile: &Profile) -> Result<Duration, BenchmarkError> {
        self.calls += 1;

        if self.fatal.as_ref() == Some(shape) {
            return Err(BenchmarkError::Fatal {
                reason: "device lost".into(),
            });
        }
        if self.failing.contains(shape) {
            return Err(ExecutionFailure::LaunchOutOfResources { host: false }.into());
        }

        Ok(Duration::from_secs_f64(
            1.0 / expected_performance(shape, profile),
        ))
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= expected * 1e-6,
        "{actual} should be close to {expected}"
    );
}
