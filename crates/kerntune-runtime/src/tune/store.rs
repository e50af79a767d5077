use hashbrown::HashMap;

use super::{Profile, Shape, TuneError};

/// Append-only, deduplicated list of the profiles discovered for one kernel.
///
/// Indices are stable: a profile keeps its index for the whole life of the store.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
    indices: HashMap<Profile, usize>,
}

impl ProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile was discovered yet.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The profile at `index`.
    pub fn get(&self, index: usize) -> Option<&Profile> {
        self.profiles.get(index)
    }

    /// The index of `profile`, if present.
    pub fn index_of(&self, profile: &Profile) -> Option<usize> {
        self.indices.get(profile).copied()
    }

    /// Whether a value-equal profile is present.
    pub fn contains(&self, profile: &Profile) -> bool {
        self.indices.contains_key(profile)
    }

    /// The profiles in index order.
    pub fn as_slice(&self) -> &[Profile] {
        &self.profiles
    }

    /// Iterate over the profiles in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    /// Append `profile` if absent. Returns its index and whether it was appended.
    pub fn add_profile(&mut self, profile: Profile) -> (usize, bool) {
        if let Some(index) = self.indices.get(&profile) {
            return (*index, false);
        }

        let index = self.profiles.len();
        self.indices.insert(profile.clone(), index);
        self.profiles.push(profile);
        (index, true)
    }
}

impl PartialEq for ProfileStore {
    fn eq(&self, other: &Self) -> bool {
        self.profiles == other.profiles
    }
}

impl FromIterator<Profile> for ProfileStore {
    fn from_iter<T: IntoIterator<Item = Profile>>(iter: T) -> Self {
        let mut store = Self::new();
        for profile in iter {
            store.add_profile(profile);
        }
        store
    }
}

/// Measured performance of every recorded shape against every known profile.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMatrix {
    shapes: Vec<Shape>,
    rows: Vec<Vec<f64>>,
    indices: HashMap<Shape, usize>,
}

impl PerformanceMatrix {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Whether no shape was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Whether `shape` has a recorded row.
    pub fn has_shape(&self, shape: &Shape) -> bool {
        self.indices.contains_key(shape)
    }

    /// The recorded row of `shape`.
    pub fn row_for(&self, shape: &Shape) -> Option<&[f64]> {
        self.indices
            .get(shape)
            .map(|index| self.rows[*index].as_slice())
    }

    /// Recorded shapes, in insertion order.
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Recorded rows, parallel to [PerformanceMatrix::shapes].
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Iterate over `(shape, row)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Shape, &[f64])> {
        self.shapes
            .iter()
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    fn add_shape(&mut self, shape: Shape, row: Vec<f64>) -> Result<(), TuneError> {
        if self.has_shape(&shape) {
            return Err(TuneError::Invariant(format!(
                "shape ({shape}) is already recorded"
            )));
        }

        self.indices.insert(shape.clone(), self.shapes.len());
        self.shapes.push(shape);
        self.rows.push(row);
        Ok(())
    }

    fn extend_rows(&mut self, column: Vec<f64>) {
        for (row, value) in self.rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
}

impl PartialEq for PerformanceMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.shapes == other.shapes && self.rows == other.rows
    }
}

/// The tuning dataset of one kernel on one device: the unit of persistence and resumption.
///
/// Every row always has exactly one value per known profile. Adding a profile requires a value for
/// every recorded shape, so the invariant holds before anything can observe or persist the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningState {
    profiles: ProfileStore,
    matrix: PerformanceMatrix,
}

impl TuningState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from its parts, validating every invariant.
    pub fn from_parts(
        profiles: Vec<Profile>,
        shapes: Vec<Shape>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, TuneError> {
        if shapes.len() != rows.len() {
            return Err(TuneError::Invariant(format!(
                "{} shape(s) for {} row(s)",
                shapes.len(),
                rows.len()
            )));
        }

        let mut state = Self::new();
        for profile in profiles {
            let display = profile.to_string();
            if !state.profiles.add_profile(profile).1 {
                return Err(TuneError::Invariant(format!(
                    "profile ({display}) is duplicated"
                )));
            }
        }
        for (shape, row) in shapes.into_iter().zip(rows) {
            state.add_shape(shape, row)?;
        }

        Ok(state)
    }

    /// The discovered profiles.
    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// The performance dataset.
    pub fn matrix(&self) -> &PerformanceMatrix {
        &self.matrix
    }

    /// Whether nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty() && self.matrix.is_empty()
    }

    /// Add `profile`, backfilling the rows of every recorded shape.
    ///
    /// `backfill` is only called when the profile is new, once per recorded shape. When it fails
    /// the state is left untouched. Returns the index of the profile and whether it was added.
    pub fn add_profile_with<E, B>(&mut self, profile: Profile, mut backfill: B) -> Result<(usize, bool), E>
    where
        B: FnMut(&Shape) -> Result<f64, E>,
    {
        if let Some(index) = self.profiles.index_of(&profile) {
            return Ok((index, false));
        }

        let column = self
            .matrix
            .shapes()
            .iter()
            .map(&mut backfill)
            .collect::<Result<Vec<_>, E>>()?;

        let (index, _) = self.profiles.add_profile(profile);
        self.matrix.extend_rows(column);
        Ok((index, true))
    }

    /// Record the row of a new shape.
    pub fn add_shape(&mut self, shape: Shape, row: Vec<f64>) -> Result<(), TuneError> {
        if row.len() != self.profiles.len() {
            return Err(TuneError::Invariant(format!(
                "row of shape ({shape}) has {} value(s) for {} profile(s)",
                row.len(),
                self.profiles.len()
            )));
        }
        if let Some(value) = row.iter().find(|value| !value.is_finite() || **value < 0.0) {
            return Err(TuneError::Invariant(format!(
                "row of shape ({shape}) holds invalid performance {value}"
            )));
        }

        self.matrix.add_shape(shape, row)
    }
}
