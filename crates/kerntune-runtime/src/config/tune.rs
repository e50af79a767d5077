use std::path::PathBuf;

use super::logger::{LogLevel, LoggerConfig};
use crate::tune::{FootprintBounds, TuneLevel};

/// Configuration of the tuning loop.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TuneConfig {
    /// Where progress lines go.
    #[serde(default)]
    pub logger: LoggerConfig<TuneLogLevel>,
    /// How many shapes are enumerated.
    #[serde(default)]
    pub level: TuneLevel,
    /// Base seed of every random decision: bootstrap samples and genetic search.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// How many of the best predicted profiles are measured before picking a prior.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// When a profile can be recorded as `0` without being measured.
    #[serde(default)]
    pub materiality: MaterialityPolicy,
    /// Memory footprint bounds of the tuned shapes.
    #[serde(default)]
    pub footprint: FootprintBounds,
    /// Genetic search hyperparameters.
    #[serde(default)]
    pub genetic: GeneticConfig,
    /// Local optimum test settings.
    #[serde(default)]
    pub local: LocalOptimumConfig,
    /// Surrogate model capacity.
    #[serde(default)]
    pub surrogate: SurrogateConfig,
    /// Where the tuning state is persisted.
    #[serde(default)]
    pub state: StateLocation,
    /// Where the predictor is exported.
    #[serde(default)]
    pub export: ExportConfig,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            logger: Default::default(),
            level: Default::default(),
            seed: default_seed(),
            top_k: default_top_k(),
            materiality: Default::default(),
            footprint: Default::default(),
            genetic: Default::default(),
            local: Default::default(),
            surrogate: Default::default(),
            state: Default::default(),
            export: Default::default(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

fn default_top_k() -> usize {
    5
}

/// Log levels of the tuning loop.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TuneLogLevel {
    /// Nothing is logged.
    #[serde(rename = "disabled")]
    Disabled,
    /// One line per tuned shape.
    #[default]
    #[serde(rename = "minimal")]
    Minimal,
    /// Search decisions and genetic progress are logged as well.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for TuneLogLevel {}

/// Decides which profiles are worth measuring on a new shape.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaterialityPolicy {
    /// Measure every profile.
    #[serde(rename = "always")]
    Always,
    /// Record `0` without measuring for profiles whose predicted performance is below this
    /// fraction of the best prediction.
    #[serde(rename = "skip_below")]
    SkipBelow(f64),
}

impl Default for MaterialityPolicy {
    fn default() -> Self {
        MaterialityPolicy::SkipBelow(0.1)
    }
}

impl MaterialityPolicy {
    /// Whether a profile predicted at `predicted` can be skipped when the best prediction is
    /// `best`.
    pub fn is_negligible(&self, predicted: f64, best: f64) -> bool {
        match self {
            MaterialityPolicy::Always => false,
            MaterialityPolicy::SkipBelow(ratio) => best > 0.0 && predicted / best < *ratio,
        }
    }
}

/// Hyperparameters of the genetic search.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeneticConfig {
    /// Number of individuals kept across generations.
    #[serde(default = "default_popsize")]
    pub popsize: usize,
    /// Maximum number of generations.
    #[serde(default = "default_niter")]
    pub niter: usize,
    /// Maximum number of distinct profiles evaluated.
    #[serde(default = "default_naccept")]
    pub naccept: usize,
    /// Probability that an offspring is produced by crossover.
    #[serde(default = "default_cxpb")]
    pub cxpb: f64,
    /// Probability that an offspring is produced by mutation.
    #[serde(default = "default_mutpb")]
    pub mutpb: f64,
    /// Generations without improvement before stopping, `None` to disable.
    #[serde(default = "default_patience")]
    pub patience: Option<usize>,
    /// Attempts to draw a feasible individual before giving up.
    #[serde(default = "default_max_resample")]
    pub max_resample: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            popsize: default_popsize(),
            niter: default_niter(),
            naccept: default_naccept(),
            cxpb: default_cxpb(),
            mutpb: default_mutpb(),
            patience: default_patience(),
            max_resample: default_max_resample(),
        }
    }
}

fn default_popsize() -> usize {
    20
}

fn default_niter() -> usize {
    1000
}

fn default_naccept() -> usize {
    1000
}

fn default_cxpb() -> f64 {
    0.4
}

fn default_mutpb() -> f64 {
    0.4
}

fn default_patience() -> Option<usize> {
    Some(50)
}

fn default_max_resample() -> usize {
    100
}

/// Settings of the local optimum test.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocalOptimumConfig {
    /// Relative gain a neighbour must show to be considered better.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for LocalOptimumConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

fn default_tolerance() -> f64 {
    0.05
}

/// Capacity ceilings of the surrogate model.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurrogateConfig {
    /// Maximum number of trees.
    #[serde(default = "default_max_trees")]
    pub max_trees: usize,
    /// Maximum depth of a tree.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            max_trees: default_max_trees(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_trees() -> usize {
    10
}

fn default_max_depth() -> usize {
    10
}

/// Root directory of the persisted tuning states.
#[derive(Default, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum StateLocation {
    /// The current directory.
    #[default]
    Local,
    /// The `target` directory of the enclosing cargo project.
    Target,
    /// The user cache directory.
    Global,
    /// A provided directory.
    File(PathBuf),
}

impl StateLocation {
    /// The root directory.
    pub fn root(&self) -> PathBuf {
        let current_dir = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        match self {
            StateLocation::Local => current_dir(),
            StateLocation::Target => {
                let dir_original = current_dir();
                let mut dir = dir_original.clone();

                loop {
                    if let Ok(true) = std::fs::exists(dir.join("Cargo.toml")) {
                        return dir.join("target");
                    }

                    if !dir.pop() {
                        break;
                    }
                }

                dir_original.join("target")
            }
            StateLocation::Global => dirs::cache_dir()
                .map(|dir| dir.join("kerntune"))
                .unwrap_or_else(current_dir),
            StateLocation::File(path_buf) => path_buf.clone(),
        }
    }
}

/// Export settings.
#[derive(Default, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExportConfig {
    /// Destination file, defaults to `<device name>.json` in the current directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Skip the export at the end of a run.
    #[serde(default)]
    pub disabled: bool,
}
