use core::hash::{Hash, Hasher};
use derive_more::{Deref, DerefMut};

pub use u128 as StableHash;

/// Stable hasher, the output doesn't depend on the process or the platform.
///
/// # Important
/// *Do not call the [`Hasher::finish`] method. It will panic.*
/// Use [`StableHasher::finalize`] instead.
#[derive(Default, Deref, DerefMut)]
pub struct StableHasher(xxhash_rust::xxh3::Xxh3);

impl StableHasher {
    /// Create a new stable hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash one value
    pub fn hash_one<T: Hash>(value: &T) -> StableHash {
        let mut hasher = Self::new();
        value.hash(&mut hasher);
        hasher.finalize()
    }

    /// Finalize and return the hash
    pub fn finalize(&self) -> StableHash {
        self.0.digest128()
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        unimplemented!("Can't finish to `u64`, use `StableHasher::finalize`")
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

/// Derive a seed from a base seed and a value.
///
/// The same pair always produces the same seed, across runs and machines.
pub fn derive_seed<T: Hash>(base: u64, value: &T) -> u64 {
    let mut hasher = StableHasher::new();
    hasher.write_u64(base);
    value.hash(&mut hasher);
    hasher.finalize() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_seed_is_stable() {
        let shape = vec![4096usize, 256];

        assert_eq!(derive_seed(42, &shape), derive_seed(42, &shape));
        assert_ne!(derive_seed(42, &shape), derive_seed(43, &shape));
        assert_ne!(derive_seed(42, &shape), derive_seed(42, &vec![256usize, 4096]));
    }
}
