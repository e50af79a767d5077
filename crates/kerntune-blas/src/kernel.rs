use core::fmt::Display;

/// Whether an operand of a matrix product is read transposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transpose {
    /// The operand is used as stored, column-major.
    No,
    /// The operand is used transposed.
    Yes,
}

/// Groups of kernels sharing their shape arity and tuning levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlasCategory {
    /// Vector operations, shapes are `(N)`.
    Blas1,
    /// Matrix-vector operations, shapes are `(M, N)`.
    Blas2,
    /// Matrix-matrix operations, shapes are `(M, N, K)`.
    Blas3,
}

/// The tunable BLAS kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlasKernel {
    /// `z = a * x + b * y`.
    Axpy,
    /// `sum(x * y)`.
    Dot,
    /// `A = A + a * x * y^T`.
    Ger,
    /// `y = A * x`.
    GemvN,
    /// `y = A^T * x`.
    GemvT,
    /// `C = op(A) * op(B)`.
    Gemm(Transpose, Transpose),
}

impl BlasKernel {
    /// Every kernel.
    pub const ALL: [BlasKernel; 9] = [
        BlasKernel::Axpy,
        BlasKernel::Dot,
        BlasKernel::Ger,
        BlasKernel::GemvN,
        BlasKernel::GemvT,
        BlasKernel::Gemm(Transpose::No, Transpose::No),
        BlasKernel::Gemm(Transpose::Yes, Transpose::No),
        BlasKernel::Gemm(Transpose::No, Transpose::Yes),
        BlasKernel::Gemm(Transpose::Yes, Transpose::Yes),
    ];

    /// Name of the kernel, used as persistence and export key.
    pub fn name(&self) -> &'static str {
        match self {
            BlasKernel::Axpy => "axpy",
            BlasKernel::Dot => "dot",
            BlasKernel::Ger => "ger",
            BlasKernel::GemvN => "gemv_n",
            BlasKernel::GemvT => "gemv_t",
            BlasKernel::Gemm(Transpose::No, Transpose::No) => "gemm_nn",
            BlasKernel::Gemm(Transpose::Yes, Transpose::No) => "gemm_tn",
            BlasKernel::Gemm(Transpose::No, Transpose::Yes) => "gemm_nt",
            BlasKernel::Gemm(Transpose::Yes, Transpose::Yes) => "gemm_tt",
        }
    }

    /// Parse a kernel name, e.g. `gemm_tn`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kernel| kernel.name() == name)
    }

    /// The category of the kernel.
    pub fn category(&self) -> BlasCategory {
        match self {
            BlasKernel::Axpy | BlasKernel::Dot => BlasCategory::Blas1,
            BlasKernel::Ger | BlasKernel::GemvN | BlasKernel::GemvT => BlasCategory::Blas2,
            BlasKernel::Gemm(..) => BlasCategory::Blas3,
        }
    }
}

impl Display for BlasKernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl BlasCategory {
    /// Number of extents of the shapes.
    pub fn shape_arity(&self) -> usize {
        match self {
            BlasCategory::Blas1 => 1,
            BlasCategory::Blas2 => 2,
            BlasCategory::Blas3 => 3,
        }
    }
}
