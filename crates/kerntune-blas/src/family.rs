use core::time::Duration;

use kerntune_runtime::tune::{
    FetchPolicy, KernelFamily, ParamDomain, ParamSpec, ParamValue, Profile, ProfileSpace, Shape,
    TuneLevel,
};

use crate::{BlasCategory, BlasKernel, Transpose, level_shapes};

const FLOAT32_SIZE: u64 = 4;

/// Hardware limits a profile must respect to launch.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceLimits {
    /// Maximum number of work items in a work group.
    pub max_work_group_size: u64,
    /// Local memory available to a work group, in bytes.
    pub local_memory: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_work_group_size: 1024,
            local_memory: 32 * 1024,
        }
    }
}

/// A float32 BLAS kernel and its profile space.
///
/// Profiles are laid out per category:
///
/// - BLAS1: `simd, local_size, num_groups, fetch`
/// - BLAS2: `simd, local_size_0, local_size_1, num_groups_0, num_groups_1, fetch`
/// - BLAS3: `simd, local_size_0, kl, local_size_1, ms, ks, ns, a_fetch, b_fetch, local_fetch_0,
///   local_fetch_1`
#[derive(Clone, Debug)]
pub struct BlasFamily {
    kernel: BlasKernel,
    space: ProfileSpace,
    limits: DeviceLimits,
}

fn pow2(name: &str, min_exp: u32, max_exp: u32) -> ParamSpec {
    ParamSpec::new(name.into(), ParamDomain::Pow2 { min_exp, max_exp })
}

fn fetch(name: &str) -> ParamSpec {
    ParamSpec::new(name.into(), ParamDomain::Fetch(FetchPolicy::ALL.to_vec()))
}

fn is_local(value: &ParamValue) -> bool {
    matches!(value, ParamValue::Fetch(FetchPolicy::FetchFromLocal))
}

impl BlasFamily {
    /// Create the family of `kernel` on a device with the given limits.
    pub fn new(kernel: BlasKernel, limits: DeviceLimits) -> Self {
        let space = match kernel.category() {
            BlasCategory::Blas1 => ProfileSpace::new(vec![
                pow2("simd", 0, 2),
                pow2("local_size", 4, 10),
                pow2("num_groups", 2, 10),
                fetch("fetch"),
            ]),
            BlasCategory::Blas2 => ProfileSpace::new(vec![
                pow2("simd", 0, 2),
                pow2("local_size_0", 0, 8),
                pow2("local_size_1", 0, 8),
                pow2("num_groups_0", 0, 8),
                pow2("num_groups_1", 0, 8),
                fetch("fetch"),
            ]),
            BlasCategory::Blas3 => ProfileSpace::new(vec![
                pow2("simd", 0, 2),
                pow2("local_size_0", 2, 5),
                pow2("kl", 0, 5),
                pow2("local_size_1", 2, 5),
                pow2("ms", 0, 3),
                pow2("ks", 0, 3),
                pow2("ns", 0, 3),
                fetch("a_fetch"),
                fetch("b_fetch"),
                pow2("local_fetch_0", 2, 5),
                pow2("local_fetch_1", 2, 5),
            ]),
        };

        Self {
            kernel,
            space,
            limits,
        }
    }

    /// The tuned kernel.
    pub fn kernel(&self) -> BlasKernel {
        self.kernel
    }

    /// The device limits.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn is_blas1_feasible(&self, shape: &Shape, profile: &Profile) -> bool {
        let simd = profile.code(0) as usize;
        let local_size = profile.code(1) as u64;

        local_size <= self.limits.max_work_group_size && shape.dims()[0] % simd == 0
    }

    fn is_blas2_feasible(&self, shape: &Shape, profile: &Profile) -> bool {
        let simd = profile.code(0) as usize;
        let threads = profile.code(1) as u64 * profile.code(2) as u64;
        let reduces = matches!(self.kernel, BlasKernel::GemvN | BlasKernel::GemvT);

        threads <= self.limits.max_work_group_size
            && shape.dims()[0] % simd == 0
            && (!reduces || threads * FLOAT32_SIZE <= self.limits.local_memory)
    }

    fn is_blas3_feasible(&self, shape: &Shape, profile: &Profile) -> bool {
        let BlasKernel::Gemm(a_trans, b_trans) = self.kernel else {
            return false;
        };
        let [m, n, k] = [shape.dims()[0], shape.dims()[1], shape.dims()[2]];
        let codes = profile.codes();
        let [simd, ls0, kl, ls1, ms, ks, ns] = [
            codes[0], codes[1], codes[2], codes[3], codes[4], codes[5], codes[6],
        ]
        .map(|code| code as u64);
        let [lf0, lf1] = [codes[9], codes[10]].map(|code| code as u64);
        let values = profile.values();
        let (a_local, b_local) = (is_local(&values[7]), is_local(&values[8]));

        let threads = ls0 * ls1;
        let (ml, nl) = (ls0 * ms, ls1 * ns);
        if threads > self.limits.max_work_group_size
            || ms % simd != 0
            || ns % simd != 0
            || kl % ks != 0
        {
            return false;
        }

        let local_elements = if a_local { kl * ml } else { 0 } + if b_local { kl * nl } else { 0 };
        if local_elements * FLOAT32_SIZE > self.limits.local_memory {
            return false;
        }

        // Local tiles are stored along the contiguous extent of their operand.
        let tiles_fetch = |(contiguous, other): (u64, u64)| {
            contiguous % (lf0 * simd) == 0 && other % lf1 == 0
        };
        let a_tile = match a_trans {
            Transpose::No => (ml, kl),
            Transpose::Yes => (kl, ml),
        };
        let b_tile = match b_trans {
            Transpose::No => (kl, nl),
            Transpose::Yes => (nl, kl),
        };
        if (a_local || b_local) && lf0 * lf1 != threads {
            return false;
        }
        if (a_local && !tiles_fetch(a_tile)) || (b_local && !tiles_fetch(b_tile)) {
            return false;
        }

        let a_contiguous = match a_trans {
            Transpose::No => m,
            Transpose::Yes => k,
        };
        let b_contiguous = match b_trans {
            Transpose::No => k,
            Transpose::Yes => n,
        };
        let simd = simd as usize;
        a_contiguous % simd == 0 && b_contiguous % simd == 0
    }
}

impl From<BlasKernel> for BlasFamily {
    fn from(kernel: BlasKernel) -> Self {
        Self::new(kernel, DeviceLimits::default())
    }
}

impl KernelFamily for BlasFamily {
    fn name(&self) -> &str {
        self.kernel.name()
    }

    fn shape_arity(&self) -> usize {
        self.kernel.category().shape_arity()
    }

    fn space(&self) -> &ProfileSpace {
        &self.space
    }

    fn is_feasible(&self, shape: &Shape, profile: &Profile) -> bool {
        if shape.arity() != self.shape_arity() || !self.space.contains(profile) {
            return false;
        }

        match self.kernel.category() {
            BlasCategory::Blas1 => self.is_blas1_feasible(shape, profile),
            BlasCategory::Blas2 => self.is_blas2_feasible(shape, profile),
            BlasCategory::Blas3 => self.is_blas3_feasible(shape, profile),
        }
    }

    /// Work items launched, times the register tile for matrix products.
    fn cost(&self, profile: &Profile) -> u64 {
        let codes: Vec<u64> = profile.codes().into_iter().map(u64::from).collect();

        match self.kernel.category() {
            BlasCategory::Blas1 => codes[1] * codes[2],
            BlasCategory::Blas2 => codes[1] * codes[2] * codes[3] * codes[4],
            BlasCategory::Blas3 => codes[1] * codes[3] * codes[4] * codes[5] * codes[6],
        }
    }

    fn memory_footprint(&self, shape: &Shape) -> u64 {
        let dims: Vec<u64> = shape.dims().iter().map(|dim| *dim as u64).collect();

        let elements = match self.kernel {
            BlasKernel::Axpy => 3 * dims[0],
            BlasKernel::Dot => 2 * dims[0] + 1,
            BlasKernel::Ger | BlasKernel::GemvN | BlasKernel::GemvT => {
                dims[0] * dims[1] + dims[0] + dims[1]
            }
            BlasKernel::Gemm(..) => dims[0] * dims[2] + dims[2] * dims[1] + dims[0] * dims[1],
        };
        elements * FLOAT32_SIZE
    }

    /// Bandwidth in GB/s for vector and matrix-vector kernels, GFLOP/s for matrix products.
    fn performance(&self, shape: &Shape, elapsed: Duration) -> f64 {
        let nanos = elapsed.as_nanos() as f64;
        let dims: Vec<f64> = shape.dims().iter().map(|dim| *dim as f64).collect();

        match self.kernel {
            // The matrix is read and written back.
            BlasKernel::Ger => {
                (2.0 * dims[0] * dims[1] + dims[0] + dims[1]) * FLOAT32_SIZE as f64 / nanos
            }
            BlasKernel::Gemm(..) => 2.0 * dims[0] * dims[1] * dims[2] / nanos,
            _ => self.memory_footprint(shape) as f64 / nanos,
        }
    }

    fn metric_name(&self) -> &str {
        match self.kernel.category() {
            BlasCategory::Blas3 => "GFLOPS",
            _ => "GB/s",
        }
    }

    fn shapes(&self, level: TuneLevel) -> Vec<Shape> {
        level_shapes(self.kernel.category(), level)
    }
}
