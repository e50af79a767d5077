use thiserror::Error;

use super::{Profile, Shape};

/// An error that stops the tuning of a kernel.
#[derive(Error, Debug)]
pub enum TuneError {
    /// The surrogate model can't be trained on the provided snapshot.
    #[error(
        "Insufficient data to train the surrogate model: {shapes} shape(s), {profiles} profile(s)"
    )]
    InsufficientData {
        /// Number of recorded shapes.
        shapes: usize,
        /// Number of known profiles.
        profiles: usize,
    },

    /// No profile of the space satisfies the constraints of the kernel family for a shape.
    #[error("No feasible profile found for shape ({shape})")]
    Infeasible {
        /// The shape being tuned.
        shape: Shape,
    },

    /// The device failed in a way that isn't a tolerated execution failure.
    #[error("A fatal device error happened on shape ({shape}) with profile ({profile})\nCaused by:\n  {reason}")]
    Fatal {
        /// The shape being measured.
        shape: Shape,
        /// The profile being measured.
        profile: Profile,
        /// The cause reported by the benchmarker.
        reason: String,
    },

    /// A dataset invariant would be broken by the requested mutation.
    #[error("Dataset invariant violated: {0}")]
    Invariant(String),

    /// Can't persist the tuning state or the exported predictor.
    #[error("An io error happened while tuning\nCaused by:\n  {0}")]
    Io(#[from] std::io::Error),

    /// Can't serialize the exported predictor.
    #[error("A serialization error happened while tuning\nCaused by:\n  {0}")]
    Json(#[from] serde_json::Error),
}
