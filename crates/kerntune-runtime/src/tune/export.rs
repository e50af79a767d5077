use std::path::{Path, PathBuf};

use kerntune_common::atomic_file::write_atomic;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{KernelFamily, RegressionTree, SurrogateModel, TuneError, TuningState};
use crate::DeviceInfo;
use crate::config::tune::{ExportConfig, SurrogateConfig};

/// Version of the export layout.
pub const EXPORT_VERSION: &str = "1.0";

/// The deployable predictor of one kernel: the final forest and the profiles it ranks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportedPredictor {
    /// Trees of the final surrogate model, empty when it can't be trained.
    pub predictor: Vec<RegressionTree>,
    /// Profiles as numeric codes, fetch policies included.
    pub profiles: Vec<Vec<u32>>,
}

impl ExportedPredictor {
    /// Train the final surrogate on the complete dataset.
    pub fn from_state(
        state: &TuningState,
        config: &SurrogateConfig,
        seed: u64,
    ) -> Result<Self, TuneError> {
        let profiles = state.profiles().iter().map(|profile| profile.codes()).collect();
        let matrix = state.matrix();

        let predictor = if state.profiles().len() > 1 {
            match SurrogateModel::train(matrix.shapes(), matrix.rows(), config, seed) {
                Ok(model) => model.trees().to_vec(),
                Err(TuneError::InsufficientData { .. }) => Vec::new(),
                Err(err) => return Err(err),
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            predictor,
            profiles,
        })
    }
}

/// Writes predictors into a per-device JSON file.
///
/// The file maps kernel names to data types to predictors, next to a `version` field:
///
/// ```json
/// {"version": "1.0", "gemm_nn": {"float32": {"predictor": [...], "profiles": [...]}}}
/// ```
///
/// Entries of other kernels and data types are preserved.
#[derive(Clone, Debug)]
pub struct Exporter {
    path: PathBuf,
}

impl Exporter {
    /// Export into `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Export into the configured path, or `<device name>.json` in the current directory.
    pub fn for_device(device: &DeviceInfo, config: &ExportConfig) -> Self {
        match &config.path {
            Some(path) => Self::new(path),
            None => Self::new(format!("{}.json", sanitize_filename::sanitize(&device.name))),
        }
    }

    /// The export file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge the predictor of `family` into the export file.
    pub fn export<F: KernelFamily + ?Sized>(
        &self,
        family: &F,
        predictor: &ExportedPredictor,
    ) -> Result<(), TuneError> {
        let mut root = self.read();
        root.insert("version".into(), Value::String(EXPORT_VERSION.into()));

        let entry = root
            .entry(String::from(family.name()))
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(kernel) = entry {
            kernel.insert(family.dtype().into(), serde_json::to_value(predictor)?);
        }

        let content = serde_json::to_string_pretty(&Value::Object(root))?;
        write_atomic(&self.path, content.as_bytes())?;

        log::info!("Exported predictor of {} to {:?}", family.name(), self.path);
        Ok(())
    }

    fn read(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(err) => {
                log::warn!("Unable to read exported predictors. They will be replaced ({err}).");
                return Map::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(Value::Object(root)) => root,
            Ok(_) => {
                log::warn!("Exported predictors are not a JSON object. They will be replaced.");
                Map::new()
            }
            Err(err) => {
                log::warn!("Unable to parse exported predictors. They will be replaced ({err}).");
                Map::new()
            }
        }
    }
}
