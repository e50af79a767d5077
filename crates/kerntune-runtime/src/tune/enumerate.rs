use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use super::{KernelFamily, Shape};
use crate::DeviceInfo;

/// How many shapes are explored for a kernel.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TuneLevel {
    /// A single representative shape.
    #[serde(rename = "simple")]
    Simple,
    /// A handful of shapes taken from common workloads.
    #[default]
    #[serde(rename = "intermediate")]
    Intermediate,
    /// A dense grid of shapes.
    #[serde(rename = "full")]
    Full,
}

impl core::str::FromStr for TuneLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" | "0" => Ok(TuneLevel::Simple),
            "intermediate" | "1" => Ok(TuneLevel::Intermediate),
            "full" | "2" => Ok(TuneLevel::Full),
            _ => Err(format!("Invalid tune level '{s}'")),
        }
    }
}

/// Fraction of the device memory a shape must use to be worth tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FootprintBounds {
    /// Smallest fraction, smaller shapes are dominated by launch overhead.
    #[serde(default = "default_min_fraction")]
    pub min: f64,
    /// Largest fraction, bigger shapes might not fit next to other allocations.
    #[serde(default = "default_max_fraction")]
    pub max: f64,
}

impl Default for FootprintBounds {
    fn default() -> Self {
        Self {
            min: default_min_fraction(),
            max: default_max_fraction(),
        }
    }
}

fn default_min_fraction() -> f64 {
    1e-4
}

fn default_max_fraction() -> f64 {
    1e-1
}

/// Removes duplicated, malformed and out-of-bounds shapes, preserving the enumeration order.
pub fn filter_shapes<F: KernelFamily + ?Sized>(
    family: &F,
    device: &DeviceInfo,
    bounds: &FootprintBounds,
    shapes: impl IntoIterator<Item = Shape>,
) -> Vec<Shape> {
    let mut seen = HashSet::new();
    let capacity = device.global_memory as f64;

    shapes
        .into_iter()
        .filter(|shape| shape.arity() == family.shape_arity() && shape.is_positive())
        .filter(|shape| seen.insert(shape.clone()))
        .filter(|shape| {
            let fraction = family.memory_footprint(shape) as f64 / capacity;
            bounds.min <= fraction && fraction <= bounds.max
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tune::testing::TestFamily;

    #[test]
    fn shapes_are_deduplicated_in_order() {
        let family = TestFamily::new();
        let device = DeviceInfo::new("test".into(), 1 << 30);
        let shapes = [1 << 20, 1 << 18, 1 << 20, 1 << 19].map(|n| Shape::from([n]));

        let kept = filter_shapes(&family, &device, &FootprintBounds::default(), shapes);

        assert_eq!(kept, [1 << 20, 1 << 18, 1 << 19].map(|n| Shape::from([n])));
    }

    #[test]
    fn malformed_shapes_are_dropped() {
        let family = TestFamily::new();
        let device = DeviceInfo::new("test".into(), 1 << 30);
        let shapes = vec![Shape::new(vec![0]), Shape::from([1 << 20, 2]), Shape::from([1 << 20])];

        let kept = filter_shapes(&family, &device, &FootprintBounds::default(), shapes);

        assert_eq!(kept, vec![Shape::from([1 << 20])]);
    }

    #[test]
    fn footprint_bounds_are_inclusive() {
        let family = TestFamily::new();
        // Each element is 8 bytes.
        let device = DeviceInfo::new("test".into(), 8_000);
        let bounds = FootprintBounds { min: 0.1, max: 0.5 };
        let shapes = [99, 100, 300, 500, 501].map(|n| Shape::from([n]));

        let kept = filter_shapes(&family, &device, &bounds, shapes);

        assert_eq!(kept, [100, 300, 500].map(|n| Shape::from([n])));
    }

    #[test]
    fn levels_parse_from_names_and_numbers() {
        assert_eq!("simple".parse::<TuneLevel>(), Ok(TuneLevel::Simple));
        assert_eq!("1".parse::<TuneLevel>(), Ok(TuneLevel::Intermediate));
        assert_eq!("full".parse::<TuneLevel>(), Ok(TuneLevel::Full));
        assert!("extensive".parse::<TuneLevel>().is_err());
    }
}
