use core::cmp::Ordering;

use kerntune_common::rand::{Rng, StdRng, get_rng_from_seed};

use super::{Benchmarker, Genome, KernelFamily, Probe, Profile, ProfileSpace, TuneError};
use crate::config::tune::GeneticConfig;

/// Best profile found by a [GeneticOptimizer].
#[derive(Clone, Debug, PartialEq)]
pub struct GeneticResult {
    /// The fittest profile.
    pub profile: Profile,
    /// Its measured performance.
    pub fitness: f64,
    /// Distinct profiles evaluated during the search.
    pub evaluations: usize,
    /// Generations completed.
    pub generations: usize,
}

#[derive(Clone, Debug)]
struct Individual {
    genome: Genome,
    fitness: f64,
    cost: u64,
}

impl Individual {
    // Fittest first, then cheapest, then lowest genome.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .fitness
            .partial_cmp(&self.fitness)
            .unwrap_or(Ordering::Equal)
            .then(self.cost.cmp(&other.cost))
            .then_with(|| self.genome.cmp(&other.genome))
    }
}

/// A `μ+λ` evolutionary search over the profile space of a kernel for one shape.
///
/// Every generation produces `popsize` offspring by crossover, mutation or reproduction of
/// random parents, then keeps the `popsize` fittest of parents and offspring. Individuals that
/// are infeasible for the shape are never measured: they are resampled, or replaced by a copy of
/// their parent. Given the same seed, device and probe state, the trajectory is reproducible.
#[derive(new, Clone, Debug)]
pub struct GeneticOptimizer {
    config: GeneticConfig,
}

struct Search<'p, 'a, F: ?Sized, B: ?Sized> {
    probe: &'p mut Probe<'a, F, B>,
    space: &'a ProfileSpace,
    config: &'p GeneticConfig,
    rng: StdRng,
    start: usize,
}

impl<F: KernelFamily + ?Sized, B: Benchmarker + ?Sized> Search<'_, '_, F, B> {
    fn evaluations(&self) -> usize {
        self.probe.evaluations() - self.start
    }

    fn is_feasible(&self, genome: &[usize]) -> bool {
        let profile = self.space.decode(genome);
        self.probe.family().is_feasible(self.probe.shape(), &profile)
    }

    fn evaluate(&mut self, genome: Genome) -> Result<Individual, TuneError> {
        let profile = self.space.decode(&genome);
        let fitness = self.probe.performance(&profile)?;
        let cost = self.probe.family().cost(&profile);

        Ok(Individual {
            genome,
            fitness,
            cost,
        })
    }

    fn sample_feasible(&mut self) -> Option<Genome> {
        for _ in 0..self.config.max_resample.max(1) {
            let genome = self.space.sample(&mut self.rng);
            if self.is_feasible(&genome) {
                return Some(genome);
            }
        }
        None
    }

    fn crossover(&mut self, first: &[usize], second: &[usize]) -> Genome {
        first
            .iter()
            .zip(second)
            .map(|(a, b)| if self.rng.random_bool(0.5) { *b } else { *a })
            .collect()
    }

    fn mutate(&mut self, genome: &[usize]) -> Genome {
        let params = self.space.params();
        let probability = 1.0 / params.len().max(1) as f64;
        let mut mutant = genome.to_vec();
        let mut changed = false;

        for (position, param) in params.iter().enumerate() {
            let len = param.domain.len();
            if len > 1 && self.rng.random_bool(probability) {
                mutant[position] = self.resample(mutant[position], len);
                changed = true;
            }
        }

        if !changed {
            let mutable: Vec<usize> = (0..params.len())
                .filter(|position| params[*position].domain.len() > 1)
                .collect();
            if !mutable.is_empty() {
                let position = mutable[self.rng.random_range(0..mutable.len())];
                mutant[position] = self.resample(mutant[position], params[position].domain.len());
            }
        }

        mutant
    }

    // A different index of a domain of `len > 1` values.
    fn resample(&mut self, current: usize, len: usize) -> usize {
        let index = self.rng.random_range(0..len - 1);
        if index >= current { index + 1 } else { index }
    }

    fn offspring(&mut self, population: &[Individual]) -> Genome {
        let parent = &population[self.rng.random_range(0..population.len())].genome;
        let draw: f64 = self.rng.random();

        let vary = |search: &mut Self| {
            if draw < search.config.cxpb {
                let other = &population[search.rng.random_range(0..population.len())].genome;
                search.crossover(parent, other)
            } else if draw < search.config.cxpb + search.config.mutpb {
                search.mutate(parent)
            } else {
                parent.clone()
            }
        };

        for _ in 0..self.config.max_resample.max(1) {
            let child = vary(self);
            if self.is_feasible(&child) {
                return child;
            }
        }

        parent.clone()
    }
}

impl GeneticOptimizer {
    /// Create an optimizer from its configuration.
    pub fn from_config(config: &GeneticConfig) -> Self {
        Self::new(config.clone())
    }

    /// Search the best profile for the probed shape, seeding the population with `prior`.
    ///
    /// Fails with [TuneError::Infeasible] when no feasible profile can be drawn.
    pub fn optimize<F, B>(
        &self,
        probe: &mut Probe<'_, F, B>,
        prior: Option<&Profile>,
        seed: u64,
    ) -> Result<GeneticResult, TuneError>
    where
        F: KernelFamily + ?Sized,
        B: Benchmarker + ?Sized,
    {
        let space = probe.family().space();
        let shape = probe.shape();
        let popsize = self.config.popsize.max(1);

        if space.params().iter().any(|param| param.domain.is_empty()) {
            return Err(TuneError::Infeasible {
                shape: shape.clone(),
            });
        }

        let start = probe.evaluations();
        let mut search = Search {
            probe,
            space,
            config: &self.config,
            rng: get_rng_from_seed(seed),
            start,
        };

        let mut genomes = Vec::with_capacity(popsize);
        if let Some(genome) = prior.and_then(|prior| space.encode(prior)) {
            if search.is_feasible(&genome) {
                genomes.push(genome);
            }
        }
        while genomes.len() < popsize {
            match search.sample_feasible() {
                Some(genome) => genomes.push(genome),
                None if genomes.is_empty() => {
                    return Err(TuneError::Infeasible {
                        shape: shape.clone(),
                    });
                }
                None => {
                    let copy = genomes[search.rng.random_range(0..genomes.len())].clone();
                    genomes.push(copy);
                }
            }
        }

        let mut population = genomes
            .into_iter()
            .map(|genome| search.evaluate(genome))
            .collect::<Result<Vec<_>, _>>()?;
        population.sort_by(Individual::rank);

        let mut best = population[0].fitness;
        let mut stagnation = 0;
        let mut generations = 0;

        while generations < self.config.niter && search.evaluations() < self.config.naccept {
            let mut offspring = Vec::with_capacity(popsize);
            for _ in 0..popsize {
                if search.evaluations() >= self.config.naccept {
                    break;
                }
                let child = search.offspring(&population);
                offspring.push(search.evaluate(child)?);
            }

            population.extend(offspring);
            population.sort_by(Individual::rank);
            population.truncate(popsize);
            generations += 1;

            log::debug!(
                "Generation {generations} on shape ({shape}): best {} ({} evaluations)",
                population[0].fitness,
                search.evaluations()
            );

            if population[0].fitness > best {
                best = population[0].fitness;
                stagnation = 0;
            } else {
                stagnation += 1;
            }
            if self.config.patience.is_some_and(|patience| stagnation >= patience) {
                break;
            }
        }

        let fittest = &population[0];

        Ok(GeneticResult {
            profile: space.decode(&fittest.genome),
            fitness: fittest.fitness,
            evaluations: search.evaluations(),
            generations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tune::testing::{TestBenchmarker, TestFamily};
    use crate::tune::{Shape, TuneLevel};
    use core::time::Duration;

    fn config() -> GeneticConfig {
        GeneticConfig {
            popsize: 6,
            niter: 200,
            naccept: 1000,
            patience: None,
            ..Default::default()
        }
    }

    #[test]
    fn finds_the_best_profile() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1 << 16]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let result = GeneticOptimizer::new(config())
            .optimize(&mut probe, None, 42)
            .unwrap();

        assert_eq!(result.profile, family.profile(4, 64));
        // Every profile of the space is feasible, each is measured once.
        assert!(result.evaluations <= 15);
        assert_eq!(probe.benchmarks(), result.evaluations);
    }

    #[test]
    fn same_seed_same_result() {
        let family = TestFamily::new();
        let shape = Shape::from([1 << 16]);
        let optimizer = GeneticOptimizer::new(GeneticConfig {
            niter: 3,
            ..config()
        });

        let run = |seed| {
            let mut benchmarker = TestBenchmarker::new();
            let mut probe = Probe::new(&family, &mut benchmarker, &shape);
            optimizer.optimize(&mut probe, None, seed).unwrap()
        };

        assert_eq!(run(7), run(7));
    }

    #[test]
    fn prior_is_kept_without_generations() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1 << 16]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);
        let prior = family.profile(4, 64);

        let result = GeneticOptimizer::new(GeneticConfig {
            popsize: 1,
            niter: 0,
            ..config()
        })
        .optimize(&mut probe, Some(&prior), 42)
        .unwrap();

        assert_eq!(result.profile, prior);
        assert_eq!(result.evaluations, 1);
        assert_eq!(result.generations, 0);
    }

    #[test]
    fn evaluation_budget_stops_the_search() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1 << 16]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let result = GeneticOptimizer::new(GeneticConfig {
            naccept: 4,
            ..config()
        })
        .optimize(&mut probe, None, 42)
        .unwrap();

        assert!(result.evaluations <= 6);
        assert!(result.generations < 200);
    }

    #[test]
    fn failures_are_deselected() {
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        // Only vectors of width 1 divide an odd length.
        let shape = Shape::from([(1 << 16) + 1]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let result = GeneticOptimizer::new(config())
            .optimize(&mut probe, None, 42)
            .unwrap();

        assert_eq!(result.profile, family.profile(1, 64));
        assert_eq!(probe.benchmarks(), result.evaluations);
    }

    struct NothingFits(TestFamily);

    impl KernelFamily for NothingFits {
        fn name(&self) -> &str {
            "nothing"
        }

        fn shape_arity(&self) -> usize {
            1
        }

        fn space(&self) -> &ProfileSpace {
            self.0.space()
        }

        fn is_feasible(&self, _shape: &Shape, _profile: &Profile) -> bool {
            false
        }

        fn memory_footprint(&self, shape: &Shape) -> u64 {
            self.0.memory_footprint(shape)
        }

        fn performance(&self, shape: &Shape, elapsed: Duration) -> f64 {
            self.0.performance(shape, elapsed)
        }

        fn metric_name(&self) -> &str {
            "GB/s"
        }

        fn shapes(&self, level: TuneLevel) -> Vec<Shape> {
            self.0.shapes(level)
        }
    }

    #[test]
    fn no_feasible_profile_is_reported() {
        let family = NothingFits(TestFamily::new());
        let mut benchmarker = TestBenchmarker::new();
        let shape = Shape::from([1024]);
        let mut probe = Probe::new(&family, &mut benchmarker, &shape);

        let err = GeneticOptimizer::new(config())
            .optimize(&mut probe, None, 42)
            .unwrap_err();

        assert!(matches!(err, TuneError::Infeasible { .. }));
        assert_eq!(benchmarker.calls, 0);
    }
}
