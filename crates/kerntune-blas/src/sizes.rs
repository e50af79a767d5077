use kerntune_runtime::tune::{Shape, TuneLevel};

use crate::BlasCategory;

/// `count` sizes spaced geometrically between `start` and `end`, rounded up to a multiple of
/// `round`.
pub fn expspace(start: f64, end: f64, count: usize, round: usize) -> Vec<usize> {
    let (low, high) = (start.ln(), end.ln());
    let step = if count > 1 {
        (high - low) / (count - 1) as f64
    } else {
        0.0
    };
    let round = round.max(1) as f64;

    (0..count)
        .map(|i| ((low + step * i as f64).exp() / round).ceil() as usize * round as usize)
        .collect()
}

fn pow2range(start: u32, end: u32) -> impl Iterator<Item = usize> + Clone {
    (start..end).map(|exp| 1 << exp)
}

const BLAS2_INTERMEDIATE: [[usize; 2]; 8] = [
    [1000, 256],
    [4096, 256],
    [256, 1000],
    [256, 4096],
    [169, 256],
    [169, 384],
    [729, 256],
    [3025, 96],
];

const BLAS3_INTERMEDIATE: [[usize; 3]; 15] = [
    [32, 32, 16000],
    [3025, 96, 363],
    [729, 128, 1200],
    [169, 384, 2304],
    [169, 192, 1728],
    [169, 128, 1728],
    [169, 1728, 128],
    [169, 1728, 192],
    [169, 2304, 384],
    [729, 1200, 128],
    [1728, 128, 169],
    [1728, 192, 169],
    [2304, 384, 169],
    [1200, 128, 729],
    [363, 96, 3025],
];

/// Candidate shapes of a category for a tuning level.
///
/// The intermediate lists come from common neural network layers.
pub fn level_shapes(category: BlasCategory, level: TuneLevel) -> Vec<Shape> {
    match (category, level) {
        (BlasCategory::Blas1, TuneLevel::Simple) => vec![Shape::from([10_000_000])],
        (BlasCategory::Blas1, TuneLevel::Intermediate) => expspace(1e3, 1e8, 10, 128)
            .into_iter()
            .map(|n| Shape::from([n]))
            .collect(),
        (BlasCategory::Blas1, TuneLevel::Full) => expspace(1e3, 1e8, 30, 128)
            .into_iter()
            .map(|n| Shape::from([n]))
            .collect(),
        (BlasCategory::Blas2, TuneLevel::Simple) => vec![Shape::from([1536, 1536])],
        (BlasCategory::Blas2, TuneLevel::Intermediate) => {
            BLAS2_INTERMEDIATE.into_iter().map(Shape::from).collect()
        }
        (BlasCategory::Blas2, TuneLevel::Full) => pow2range(4, 17)
            .flat_map(|m| pow2range(4, 17).map(move |n| Shape::from([m, n])))
            .collect(),
        (BlasCategory::Blas3, TuneLevel::Simple) => vec![Shape::from([1536, 1536, 1536])],
        (BlasCategory::Blas3, TuneLevel::Intermediate) => {
            BLAS3_INTERMEDIATE.into_iter().map(Shape::from).collect()
        }
        (BlasCategory::Blas3, TuneLevel::Full) => pow2range(5, 12)
            .flat_map(|m| {
                pow2range(5, 12)
                    .flat_map(move |n| pow2range(5, 15).map(move |k| Shape::from([m, n, k])))
            })
            .collect(),
    }
}
