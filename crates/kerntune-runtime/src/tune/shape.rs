use core::fmt::Display;
use serde::{Deserialize, Serialize};

/// A problem instance, e.g. a vector length or the `(M, N, K)` of a matrix product.
///
/// Shapes are compared by value and used as keys of the performance matrix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from its extents.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        Self(dims.into())
    }

    /// The extents of the shape.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// The number of extents.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Whether every extent is strictly positive.
    pub fn is_positive(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|dim| *dim > 0)
    }

    /// The shape as regression features.
    pub fn features(&self) -> Vec<f64> {
        self.0.iter().map(|dim| *dim as f64).collect()
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(value: [usize; N]) -> Self {
        Self(value.to_vec())
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_extents() {
        assert_eq!(Shape::from([4096, 256]).to_string(), "4096, 256");
    }

    #[test]
    fn zero_extent_is_not_positive() {
        assert!(Shape::from([16, 16]).is_positive());
        assert!(!Shape::from([16, 0]).is_positive());
        assert!(!Shape::new(Vec::new()).is_positive());
    }
}
