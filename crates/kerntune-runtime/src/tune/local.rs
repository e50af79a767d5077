use super::{Benchmarker, KernelFamily, Probe, Profile, TuneError};
use crate::config::tune::LocalOptimumConfig;

/// Checks whether a profile can be improved by changing a single position.
///
/// Ordered positions are moved to their adjacent values, fetch policies are swapped for every
/// other policy. Neighbours that are infeasible or fail to execute are ignored.
#[derive(new, Clone, Debug, PartialEq)]
pub struct LocalOptimumTest {
    /// Relative gain a neighbour must show to beat the candidate.
    tolerance: f64,
}

impl LocalOptimumTest {
    /// Create the test from its configuration.
    pub fn from_config(config: &LocalOptimumConfig) -> Self {
        Self::new(config.tolerance)
    }

    /// Whether no neighbour of `profile` is materially better on the probed shape.
    ///
    /// A candidate that can't execute is never a local optimum.
    pub fn is_local_optimum<F, B>(
        &self,
        probe: &mut Probe<'_, F, B>,
        profile: &Profile,
    ) -> Result<bool, TuneError>
    where
        F: KernelFamily + ?Sized,
        B: Benchmarker + ?Sized,
    {
        let Some(base) = probe.measure(profile)? else {
            return Ok(false);
        };
        let threshold = base * (1.0 + self.tolerance);

        for neighbour in probe.family().space().neighbours(profile) {
            let performance = probe.performance(&neighbour)?;
            if performance > threshold {
                log::debug!(
                    "Profile ({neighbour}) beats ({profile}) on shape ({}): {performance} > {base}",
                    probe.shape()
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tune::ExecutionFailure;
    use crate::tune::Shape;
    use crate::tune::testing::{TestBenchmarker, TestFamily};

    #[test]
    fn best_profile_is_a_local_optimum() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1024]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let test = LocalOptimumTest::new(0.0);

        assert!(test.is_local_optimum(&mut probe, &family.profile(4, 64)).unwrap());
        // The candidate, one simd neighbour and two local size neighbours.
        assert_eq!(probe.benchmarks(), 4);
    }

    #[test]
    fn better_neighbour_fails_the_test() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1024]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let test = LocalOptimumTest::new(0.05);

        assert!(!test.is_local_optimum(&mut probe, &family.profile(1, 64)).unwrap());
        assert!(!test.is_local_optimum(&mut probe, &family.profile(4, 32)).unwrap());
    }

    #[test]
    fn tolerance_hides_small_gains() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1024]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let test = LocalOptimumTest::new(1.5);

        assert!(test.is_local_optimum(&mut probe, &family.profile(4, 32)).unwrap());
    }

    #[test]
    fn failing_candidate_is_not_an_optimum() {
        let family = TestFamily::new();
        let mut benchmarker =
            TestBenchmarker::new().failing(ExecutionFailure::LaunchOutOfResources { host: false });
        let shape = Shape::from([1024]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let test = LocalOptimumTest::new(0.0);

        assert!(!test.is_local_optimum(&mut probe, &family.profile(4, 64)).unwrap());
        assert_eq!(probe.benchmarks(), 1);
    }
}
