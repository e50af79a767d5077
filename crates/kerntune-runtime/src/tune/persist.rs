use std::fs;
use std::path::{Path, PathBuf};

use kerntune_common::atomic_file::AtomicDir;
use thiserror::Error;

use super::{KernelFamily, Profile, ProfileSpace, Shape, TuneError, TuningState};

const SHAPES_FILE: &str = "X.csv";
const ROWS_FILE: &str = "Y.csv";
const PROFILES_FILE: &str = "profiles.csv";
const CHECKSUM_FILE: &str = "space.md5";

/// Return the directory of the persisted state of a kernel on a device.
pub fn get_state_path(root: &Path, device_name: &str, kernel: &str) -> PathBuf {
    let device_name = sanitize_filename::sanitize(device_name);
    let kernel = sanitize_filename::sanitize(kernel);
    root.join("save").join(device_name).join(kernel)
}

/// Error found while loading a persisted state.
#[derive(Error, Debug)]
pub enum PersistError {
    /// The state exists but can't be read.
    #[error("Unable to read tuning state\nCaused by:\n  {0}")]
    Io(#[from] std::io::Error),

    /// The state exists but doesn't describe a valid dataset for the kernel.
    #[error("Malformed tuning state in {path:?}: {reason}")]
    Malformed {
        /// The state directory.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result of loading a persisted state.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Nothing was persisted yet.
    Absent,
    /// Something was persisted but can't be used.
    Malformed(PersistError),
    /// A valid state.
    Loaded(TuningState),
}

impl LoadOutcome {
    /// The loaded state, or an empty one.
    pub fn into_state(self) -> TuningState {
        match self {
            LoadOutcome::Loaded(state) => state,
            LoadOutcome::Absent => TuningState::new(),
            LoadOutcome::Malformed(err) => {
                log::warn!("Unable to load tuning state. It will be ignored ({err}).");
                TuningState::new()
            }
        }
    }
}

/// Persists the tuning state of one kernel as plain comma separated rows.
///
/// - `X.csv`: one shape per line.
/// - `Y.csv`: one performance row per line, parallel to `X.csv`.
/// - `profiles.csv`: one profile per line, fetch policies written by name.
/// - `space.md5`: checksum of the profile space the state was recorded with.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: AtomicDir,
    space: ProfileSpace,
    shape_arity: usize,
}

impl StateStore {
    /// Create a store for `family` in `path`.
    pub fn new<F: KernelFamily + ?Sized, P: Into<PathBuf>>(family: &F, path: P) -> Self {
        Self {
            dir: AtomicDir::new(path),
            space: family.space().clone(),
            shape_arity: family.shape_arity(),
        }
    }

    /// The state directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Load the persisted state.
    pub fn load(&self) -> LoadOutcome {
        let path = match self.dir.resolve() {
            Ok(Some(path)) => path,
            Ok(None) => return LoadOutcome::Absent,
            Err(err) => return LoadOutcome::Malformed(err.into()),
        };

        match self.read(&path) {
            Ok(state) => LoadOutcome::Loaded(state),
            Err(err) => LoadOutcome::Malformed(err),
        }
    }

    /// Persist `state`, replacing the previous snapshot as a whole.
    pub fn save(&self, state: &TuningState) -> Result<(), TuneError> {
        let shapes = to_csv(state.matrix().shapes().iter().map(|shape| {
            shape
                .dims()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        }));
        let rows = to_csv(
            state
                .matrix()
                .rows()
                .iter()
                .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>()),
        );
        let profiles = to_csv(state.profiles().iter().map(|profile| {
            profile
                .values()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        }));

        self.dir.write([
            (SHAPES_FILE, shapes.into_bytes()),
            (ROWS_FILE, rows.into_bytes()),
            (PROFILES_FILE, profiles.into_bytes()),
            (CHECKSUM_FILE, self.space.checksum().into_bytes()),
        ])?;

        Ok(())
    }

    fn read(&self, path: &Path) -> Result<TuningState, PersistError> {
        let malformed = |reason: String| PersistError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let checksum = fs::read_to_string(path.join(CHECKSUM_FILE))?;
        if checksum.trim() != self.space.checksum() {
            return Err(malformed("the profile space changed since it was recorded".into()));
        }

        let shapes = read_lines(&path.join(SHAPES_FILE))?
            .iter()
            .map(|line| self.parse_shape(line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;
        let rows = read_lines(&path.join(ROWS_FILE))?
            .iter()
            .map(|line| parse_row(line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;
        let profiles = read_lines(&path.join(PROFILES_FILE))?
            .iter()
            .map(|line| self.parse_profile(line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;

        TuningState::from_parts(profiles, shapes, rows).map_err(|err| malformed(err.to_string()))
    }

    fn parse_shape(&self, line: &str) -> Result<Shape, String> {
        let dims = line
            .split(',')
            .map(|dim| dim.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| format!("invalid shape '{line}': {err}"))?;
        let shape = Shape::new(dims);

        if shape.arity() != self.shape_arity || !shape.is_positive() {
            return Err(format!("invalid shape '{line}'"));
        }
        Ok(shape)
    }

    fn parse_profile(&self, line: &str) -> Result<Profile, String> {
        let profile: Profile = line.parse()?;

        if !self.space.contains(&profile) {
            return Err(format!("profile '{line}' is outside of the profile space"));
        }
        Ok(profile)
    }
}

fn parse_row(line: &str) -> Result<Vec<f64>, String> {
    if line.is_empty() {
        return Ok(Vec::new());
    }

    line.split(',')
        .map(|value| {
            let value = value
                .trim()
                .parse::<f64>()
                .map_err(|err| format!("invalid performance '{value}': {err}"))?;
            if value.is_finite() && value >= 0.0 {
                Ok(value)
            } else {
                Err(format!("invalid performance '{value}'"))
            }
        })
        .collect()
}

fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().map(str::to_string).collect())
}

fn to_csv<I: IntoIterator<Item = Vec<String>>>(records: I) -> String {
    let mut content = String::new();
    for record in records {
        content += &record.join(",");
        content.push('\n');
    }
    content
}
