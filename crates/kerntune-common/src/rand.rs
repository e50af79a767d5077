pub use rand::{Rng, SeedableRng, rngs::StdRng};

/// Returns a seeded random number generator using entropy.
#[inline(always)]
pub fn get_seeded_rng() -> StdRng {
    StdRng::from_os_rng()
}

/// Returns a random number generator that replays the same sequence for the same seed.
#[inline(always)]
pub fn get_rng_from_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draws a fresh seed from entropy.
pub fn gen_seed() -> u64 {
    get_seeded_rng().random()
}
