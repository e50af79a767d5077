use core::fmt::Display;
use std::path::PathBuf;

use kerntune_common::hash::derive_seed;

use super::{
    Benchmarker, ExportedPredictor, Exporter, GeneticOptimizer, KernelFamily, LoadOutcome,
    LocalOptimumTest, Probe, Profile, Shape, StateStore, SurrogateModel, TuneError, TuningState,
    filter_shapes, get_state_path, top_k,
};
use crate::DeviceInfo;
use crate::config::tune::TuneConfig;
use crate::config::{GlobalConfig, Logger};

/// How the profile of a shape was decided.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeOutcome {
    /// The shape was already recorded, nothing was measured.
    Reused,
    /// The predicted profile passed the local optimum test.
    Predicted {
        /// The predicted profile.
        profile: Profile,
    },
    /// A genetic search ran.
    Searched {
        /// The profile found.
        profile: Profile,
        /// Whether it was added to the profile store.
        new_profile: bool,
    },
    /// No profile can run on the shape, it isn't recorded.
    Infeasible,
}

/// Result of tuning one shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeReport {
    /// The tuned shape.
    pub shape: Shape,
    /// How its profile was decided.
    pub outcome: ShapeOutcome,
    /// Best recorded performance of the shape.
    pub best: f64,
    /// Benchmarks executed for this shape, backfill included.
    pub benchmarks: usize,
}

/// Result of tuning a list of shapes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TuneReport {
    /// One report per tuned shape, in order.
    pub shapes: Vec<ShapeReport>,
    /// Total benchmarks executed.
    pub benchmarks: usize,
}

struct Datapoint<'a> {
    shape: &'a Shape,
    best: f64,
    metric: &'a str,
}

impl Display for Datapoint<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} : {:.2} {}", self.shape, self.best, self.metric)
    }
}

/// Incrementally tunes a kernel family on one device.
///
/// For every shape, the profiles discovered so far are ranked by a surrogate model trained on the
/// recorded shapes. When the best of them isn't a local optimum, a genetic search looks for a
/// better profile, which is then measured on every recorded shape. The state is persisted after
/// every shape, so an interrupted run resumes where it stopped.
pub struct Tuner<'a, F: ?Sized, B: ?Sized> {
    family: &'a F,
    benchmarker: &'a mut B,
    device: DeviceInfo,
    config: TuneConfig,
    logger: Logger,
    store: StateStore,
    state: TuningState,
}

impl<'a, F: KernelFamily + ?Sized, B: Benchmarker + ?Sized> Tuner<'a, F, B> {
    /// Create a tuner, loading the persisted state of the kernel on the device.
    pub fn new(family: &'a F, benchmarker: &'a mut B, device: DeviceInfo, config: TuneConfig) -> Self {
        let path = get_state_path(&config.state.root(), &device.name, family.name());
        let store = StateStore::new(family, path);
        let state = match store.load() {
            LoadOutcome::Loaded(state) => {
                log::info!(
                    "Resuming {} from {:?}: {} shape(s), {} profile(s)",
                    family.name(),
                    store.path(),
                    state.matrix().len(),
                    state.profiles().len()
                );
                state
            }
            outcome => outcome.into_state(),
        };
        let logger = Logger::new(&config.logger);

        Self {
            family,
            benchmarker,
            device,
            config,
            logger,
            store,
            state,
        }
    }

    /// Create a tuner using the global configuration.
    pub fn from_global_config(family: &'a F, benchmarker: &'a mut B, device: DeviceInfo) -> Self {
        let config = GlobalConfig::get().tune.clone();
        Self::new(family, benchmarker, device, config)
    }

    /// The current tuning state.
    pub fn state(&self) -> &TuningState {
        &self.state
    }

    /// The directory of the persisted state.
    pub fn state_path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Tune the shapes of the configured level, then export the predictor unless disabled.
    pub fn run(&mut self) -> Result<TuneReport, TuneError> {
        let shapes = self.family.shapes(self.config.level);
        log::info!(
            "Tuning {} on {} with {} candidate shape(s)",
            kernel_label(self.family),
            self.device.name,
            shapes.len()
        );
        let report = self.tune_shapes(shapes)?;

        if !self.config.export.disabled {
            self.export()?;
        }

        Ok(report)
    }

    /// Tune every shape of the list that is well formed and fits the footprint bounds.
    ///
    /// Shapes without any feasible profile are skipped. A fatal benchmark error stops the run, the
    /// shapes tuned before it stay persisted.
    pub fn tune_shapes<I: IntoIterator<Item = Shape>>(
        &mut self,
        shapes: I,
    ) -> Result<TuneReport, TuneError> {
        let shapes = filter_shapes(self.family, &self.device, &self.config.footprint, shapes);
        let mut report = TuneReport::default();

        for shape in shapes {
            let shape_report = match self.tune_shape(&shape) {
                Ok(shape_report) => shape_report,
                Err(TuneError::Infeasible { shape }) => {
                    log::warn!("No feasible profile for shape ({shape}), it is skipped.");
                    ShapeReport {
                        shape,
                        outcome: ShapeOutcome::Infeasible,
                        best: 0.0,
                        benchmarks: 0,
                    }
                }
                Err(err) => return Err(err),
            };

            report.benchmarks += shape_report.benchmarks;
            report.shapes.push(shape_report);
        }

        Ok(report)
    }

    /// Tune one shape, record its performance row and persist the state.
    ///
    /// Fails with [TuneError::Invariant] when the shape isn't well formed for the kernel.
    pub fn tune_shape(&mut self, shape: &Shape) -> Result<ShapeReport, TuneError> {
        let family = self.family;
        let metric = family.metric_name();

        if shape.arity() != family.shape_arity() || !shape.is_positive() {
            return Err(TuneError::Invariant(format!(
                "shape ({shape}) isn't a valid shape of {}",
                family.name()
            )));
        }

        if let Some(row) = self.state.matrix().row_for(shape) {
            let best = best_of(row);
            self.logger.log_tune(&Datapoint {
                shape,
                best,
                metric,
            });
            return Ok(ShapeReport {
                shape: shape.clone(),
                outcome: ShapeOutcome::Reused,
                best,
                benchmarks: 0,
            });
        }

        let seed = derive_seed(self.config.seed, shape);
        let config = &self.config;
        let state = &mut self.state;
        let logger = &mut self.logger;
        let mut probe = Probe::new(family, &mut *self.benchmarker, shape);
        let mut backfilled = 0;

        let (predicted, prediction) = predict(state, &mut probe, config, seed)?;

        let local = LocalOptimumTest::from_config(&config.local);
        let outcome = match predicted {
            Some(profile) if local.is_local_optimum(&mut probe, &profile)? => {
                logger.log_search(&format!("Shape ({shape}): ({profile}) is a local optimum"));
                ShapeOutcome::Predicted { profile }
            }
            predicted => {
                let result = GeneticOptimizer::from_config(&config.genetic).optimize(
                    &mut probe,
                    predicted.as_ref(),
                    seed,
                )?;
                logger.log_search(&format!(
                    "Shape ({shape}): search found ({}) at {:.2} {metric} after {} evaluation(s)",
                    result.profile, result.fitness, result.evaluations
                ));

                let (_, new_profile) = state.add_profile_with(result.profile.clone(), |recorded| {
                    let mut backfill = Probe::new(family, probe.benchmarker(), recorded);
                    let performance = backfill.performance(&result.profile);
                    backfilled += backfill.benchmarks();
                    performance
                })?;

                ShapeOutcome::Searched {
                    profile: result.profile,
                    new_profile,
                }
            }
        };

        let best_prediction = prediction.iter().copied().fold(0.0, f64::max);
        let row = state
            .profiles()
            .iter()
            .enumerate()
            .map(|(index, profile)| {
                let negligible = prediction.get(index).is_some_and(|predicted| {
                    config.materiality.is_negligible(*predicted, best_prediction)
                });
                if negligible && !probe.is_known(profile) {
                    Ok(0.0)
                } else {
                    probe.performance(profile)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let best = best_of(&row);

        state.add_shape(shape.clone(), row)?;
        self.store.save(state)?;
        logger.log_tune(&Datapoint {
            shape,
            best,
            metric,
        });

        Ok(ShapeReport {
            shape: shape.clone(),
            outcome,
            best,
            benchmarks: probe.benchmarks() + backfilled,
        })
    }

    /// Train the final predictor and merge it into the export file of the device.
    pub fn export(&self) -> Result<PathBuf, TuneError> {
        let predictor =
            ExportedPredictor::from_state(&self.state, &self.config.surrogate, self.config.seed)?;
        let exporter = Exporter::for_device(&self.device, &self.config.export);
        exporter.export(self.family, &predictor)?;

        Ok(exporter.path().to_path_buf())
    }
}

/// The profile to start from on a new shape, and the surrogate prediction of every known profile
/// when a model could be trained.
fn predict<F, B>(
    state: &TuningState,
    probe: &mut Probe<'_, F, B>,
    config: &TuneConfig,
    seed: u64,
) -> Result<(Option<Profile>, Vec<f64>), TuneError>
where
    F: KernelFamily + ?Sized,
    B: Benchmarker + ?Sized,
{
    let profiles = state.profiles();

    if profiles.len() <= 1 {
        return Ok((profiles.as_slice().first().cloned(), Vec::new()));
    }

    let matrix = state.matrix();
    let (ranking, prediction) =
        match SurrogateModel::train(matrix.shapes(), matrix.rows(), &config.surrogate, seed) {
            Ok(model) => {
                let prediction = model.predict(probe.shape());
                (top_k(&prediction, config.top_k.max(1)), prediction)
            }
            Err(TuneError::InsufficientData { .. }) => {
                (top_k(&column_means(state), config.top_k.max(1)), Vec::new())
            }
            Err(err) => return Err(err),
        };

    let mut realized: Option<(usize, f64)> = None;
    for index in ranking.iter().copied() {
        let Some(profile) = profiles.get(index) else {
            continue;
        };
        if let Some(performance) = probe.measure(profile)? {
            if realized.is_none_or(|(_, best)| performance > best) {
                realized = Some((index, performance));
            }
        }
    }

    let index = realized.map(|(index, _)| index).or(ranking.first().copied());
    Ok((index.and_then(|index| profiles.get(index)).cloned(), prediction))
}

// Mean recorded performance of every profile, used to rank profiles without a model.
fn column_means(state: &TuningState) -> Vec<f64> {
    let matrix = state.matrix();
    let mut means = vec![0.0; state.profiles().len()];

    for row in matrix.rows() {
        for (mean, value) in means.iter_mut().zip(row) {
            *mean += value / matrix.len() as f64;
        }
    }
    means
}

fn best_of(row: &[f64]) -> f64 {
    row.iter().copied().fold(0.0, f64::max)
}

fn kernel_label<F: KernelFamily + ?Sized>(family: &F) -> String {
    format!("{} ({})", family.name(), family.dtype())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tune::{GeneticConfig, MaterialityPolicy, StateLocation};
    use crate::tune::ExecutionFailure;
    use crate::tune::testing::{TestBenchmarker, TestFamily};

    fn config(root: &std::path::Path) -> TuneConfig {
        TuneConfig {
            state: StateLocation::File(root.to_path_buf()),
            genetic: GeneticConfig {
                popsize: 6,
                niter: 100,
                patience: None,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn device() -> DeviceInfo {
        DeviceInfo::new("test device".into(), 1 << 26)
    }

    #[test]
    fn first_shape_is_searched() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));

        let report = tuner.tune_shape(&Shape::from([1 << 16])).unwrap();

        assert_eq!(
            report.outcome,
            ShapeOutcome::Searched {
                profile: family.profile(4, 64),
                new_profile: true
            }
        );
        assert_eq!(tuner.state().profiles().len(), 1);
        assert_eq!(tuner.state().matrix().len(), 1);
        assert!(report.best > 0.0);
    }

    #[test]
    fn recorded_shape_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));
        let shape = Shape::from([1 << 16]);

        let first = tuner.tune_shape(&shape).unwrap();
        let second = tuner.tune_shape(&shape).unwrap();

        assert_eq!(second.outcome, ShapeOutcome::Reused);
        assert_eq!(second.benchmarks, 0);
        assert_eq!(second.best, first.best);
    }

    #[test]
    fn optimal_prediction_skips_the_search() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));

        tuner.tune_shape(&Shape::from([1 << 16])).unwrap();
        let report = tuner.tune_shape(&Shape::from([1 << 17])).unwrap();

        assert_eq!(
            report.outcome,
            ShapeOutcome::Predicted {
                profile: family.profile(4, 64)
            }
        );
        // The prediction and its three neighbours.
        assert_eq!(report.benchmarks, 4);
    }

    #[test]
    fn failing_shape_records_zeros_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));
        tuner.tune_shape(&Shape::from([1 << 16])).unwrap();
        drop(tuner);

        let mut failing =
            TestBenchmarker::new().failing(ExecutionFailure::LaunchOutOfResources { host: true });
        let mut tuner = Tuner::new(&family, &mut failing, device(), config(dir.path()));
        let report = tuner.tune_shape(&Shape::from([1 << 17])).unwrap();

        assert_eq!(report.best, 0.0);
        let row = tuner.state().matrix().row_for(&Shape::from([1 << 17])).unwrap();
        assert!(row.iter().all(|value| *value == 0.0));
        assert_eq!(row.len(), tuner.state().profiles().len());
    }

    #[test]
    fn negligible_profiles_are_not_measured() {
        let family = TestFamily::new();
        let mut state = TuningState::new();
        state
            .add_profile_with(family.profile(1, 256), |_| Ok::<_, TuneError>(0.0))
            .unwrap();
        state
            .add_profile_with(family.profile(4, 64), |_| Ok::<_, TuneError>(0.0))
            .unwrap();
        state.add_shape(Shape::from([1 << 16]), vec![1.0, 125.0]).unwrap();
        state.add_shape(Shape::from([1 << 18]), vec![1.0, 125.0]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.materiality = MaterialityPolicy::SkipBelow(0.1);
        config.top_k = 1;
        let store = StateStore::new(
            &family,
            get_state_path(dir.path(), &device().name, family.name()),
        );
        store.save(&state).unwrap();

        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config);
        let report = tuner.tune_shape(&Shape::from([1 << 17])).unwrap();

        let row = tuner.state().matrix().row_for(&Shape::from([1 << 17])).unwrap();
        assert_eq!(row[0], 0.0);
        assert!(row[1] > 100.0);
        assert_eq!(report.benchmarks, 4);
    }

    fn save_state(
        root: &std::path::Path,
        family: &TestFamily,
        profiles: Vec<Profile>,
        shapes: Vec<Shape>,
        rows: Vec<Vec<f64>>,
    ) {
        let state = TuningState::from_parts(profiles, shapes, rows).unwrap();
        let store = StateStore::new(
            family,
            get_state_path(root, &device().name, family.name()),
        );
        store.save(&state).unwrap();
    }

    // Two recorded shapes where (4, 64) is predicted well above (4, 32).
    fn save_ranked_state(root: &std::path::Path, family: &TestFamily) {
        save_state(
            root,
            family,
            vec![family.profile(4, 32), family.profile(4, 64)],
            vec![Shape::from([1 << 16]), Shape::from([1 << 18])],
            vec![vec![150.0, 300.0], vec![150.0, 300.0]],
        );
    }

    #[test]
    fn failing_candidate_falls_back_to_the_runner_up() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        save_ranked_state(dir.path(), &family);

        let mut benchmarker = TestBenchmarker::new().failing_on(vec![family.profile(4, 64)]);
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));
        let report = tuner.tune_shape(&Shape::from([1 << 17])).unwrap();

        assert_eq!(
            report.outcome,
            ShapeOutcome::Predicted {
                profile: family.profile(4, 32)
            }
        );
        let row = tuner.state().matrix().row_for(&Shape::from([1 << 17])).unwrap();
        assert!((row[0] - 62.5).abs() < 0.1);
        assert_eq!(row[1], 0.0);
    }

    #[test]
    fn all_candidates_failing_seed_the_search_with_the_top_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        save_ranked_state(dir.path(), &family);

        // A single individual and no generation: the search returns its prior.
        let mut config = config(dir.path());
        config.genetic.popsize = 1;
        config.genetic.niter = 0;

        let mut benchmarker = TestBenchmarker::new()
            .failing_on(vec![family.profile(4, 32), family.profile(4, 64)]);
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config);
        let report = tuner.tune_shape(&Shape::from([1 << 17])).unwrap();

        assert_eq!(
            report.outcome,
            ShapeOutcome::Searched {
                profile: family.profile(4, 64),
                new_profile: false
            }
        );
        assert_eq!(report.best, 0.0);
        assert_eq!(
            tuner.state().matrix().row_for(&Shape::from([1 << 17])),
            Some(&[0.0, 0.0][..])
        );
    }

    #[test]
    fn single_recorded_shape_ranks_by_mean_performance() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        save_state(
            dir.path(),
            &family,
            vec![family.profile(1, 256), family.profile(4, 64)],
            vec![Shape::from([1 << 16])],
            vec![vec![10.0, 125.0]],
        );
        let mut config = config(dir.path());
        config.top_k = 1;

        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config);
        let report = tuner.tune_shape(&Shape::from([1 << 17])).unwrap();

        assert_eq!(
            report.outcome,
            ShapeOutcome::Predicted {
                profile: family.profile(4, 64)
            }
        );
        // The candidate, its three neighbours, then (1, 256) for the row.
        assert_eq!(report.benchmarks, 5);
    }

    #[test]
    fn malformed_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));

        for shape in [Shape::new(Vec::new()), Shape::from([0]), Shape::from([64, 64])] {
            assert!(matches!(
                tuner.tune_shape(&shape),
                Err(TuneError::Invariant(_))
            ));
        }
        assert!(tuner.state().is_empty());
        drop(tuner);
        assert_eq!(benchmarker.calls, 0);
    }

    #[test]
    fn out_of_bounds_shapes_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let family = TestFamily::new();
        let mut benchmarker = TestBenchmarker::new();
        let mut tuner = Tuner::new(&family, &mut benchmarker, device(), config(dir.path()));

        // 8 bytes per element on a 64 MiB device: 2^8 is too small, 2^22 too large.
        let report = tuner
            .tune_shapes([
                Shape::from([1 << 8]),
                Shape::from([1 << 16]),
                Shape::from([1 << 16]),
                Shape::from([1 << 22]),
            ])
            .unwrap();

        assert_eq!(report.shapes.len(), 1);
        assert_eq!(report.shapes[0].shape, Shape::from([1 << 16]));
    }

    #[test]
    fn kernel_label_names_the_dtype() {
        assert_eq!(kernel_label(&TestFamily::new()), "vector (float32)");
    }
}
