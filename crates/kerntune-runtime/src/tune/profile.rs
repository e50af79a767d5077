use core::fmt::Display;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use kerntune_common::rand::{Rng, StdRng};

/// How a kernel moves operands from global memory into its working set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FetchPolicy {
    /// Stage operands through local (shared) memory.
    #[serde(rename = "FETCH_FROM_LOCAL")]
    FetchFromLocal,
    /// Read operands directly from global memory with a strided pattern.
    #[serde(rename = "FETCH_FROM_GLOBAL_STRIDED")]
    FetchFromGlobalStrided,
    /// Read operands directly from global memory with a contiguous pattern.
    #[serde(rename = "FETCH_FROM_GLOBAL_CONTIGUOUS")]
    FetchFromGlobalContiguous,
}

impl FetchPolicy {
    /// Every fetch policy, in code order.
    pub const ALL: [FetchPolicy; 3] = [
        FetchPolicy::FetchFromLocal,
        FetchPolicy::FetchFromGlobalStrided,
        FetchPolicy::FetchFromGlobalContiguous,
    ];

    /// The persisted name of the policy.
    pub fn name(&self) -> &'static str {
        match self {
            FetchPolicy::FetchFromLocal => "FETCH_FROM_LOCAL",
            FetchPolicy::FetchFromGlobalStrided => "FETCH_FROM_GLOBAL_STRIDED",
            FetchPolicy::FetchFromGlobalContiguous => "FETCH_FROM_GLOBAL_CONTIGUOUS",
        }
    }

    /// The numeric code used by exported predictors.
    pub fn code(&self) -> u32 {
        match self {
            FetchPolicy::FetchFromLocal => 0,
            FetchPolicy::FetchFromGlobalStrided => 1,
            FetchPolicy::FetchFromGlobalContiguous => 2,
        }
    }

    /// Parse a persisted policy name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.name() == name)
    }
}

/// One position of a [profile](Profile).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamValue {
    /// An integer parameter, e.g. a work-group size.
    Int(u32),
    /// A memory fetch strategy.
    Fetch(FetchPolicy),
}

impl ParamValue {
    /// The numeric code of the value, fetch policies use [FetchPolicy::code].
    pub fn code(&self) -> u32 {
        match self {
            ParamValue::Int(value) => *value,
            ParamValue::Fetch(policy) => policy.code(),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Fetch(policy) => f.write_str(policy.name()),
        }
    }
}

impl FromStr for ParamValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<u32>() {
            return Ok(ParamValue::Int(value));
        }

        FetchPolicy::from_name(s)
            .map(ParamValue::Fetch)
            .ok_or_else(|| format!("Invalid parameter value '{s}'"))
    }
}

/// One way of executing a kernel: tile sizes, vector width, fetch strategy and so on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Profile(Vec<ParamValue>);

impl Profile {
    /// Create a new profile.
    pub fn new<V: Into<Vec<ParamValue>>>(values: V) -> Self {
        Self(values.into())
    }

    /// The parameter values.
    pub fn values(&self) -> &[ParamValue] {
        &self.0
    }

    /// The number of parameters.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// The numeric code of the parameter at `index`, `0` when out of bounds.
    pub fn code(&self, index: usize) -> u32 {
        self.0.get(index).map(ParamValue::code).unwrap_or(0)
    }

    /// Every parameter as its numeric code.
    pub fn codes(&self) -> Vec<u32> {
        self.0.iter().map(ParamValue::code).collect()
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(ParamValue::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Profile)
    }
}

/// The valid values of one profile position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamDomain {
    /// Powers of two from `2^min_exp` to `2^max_exp` inclusive.
    Pow2 {
        /// Smallest exponent.
        min_exp: u32,
        /// Largest exponent.
        max_exp: u32,
    },
    /// An explicit, ordered list of integers.
    Values(Vec<u32>),
    /// An unordered set of fetch policies.
    Fetch(Vec<FetchPolicy>),
}

impl ParamDomain {
    /// The number of values in the domain.
    pub fn len(&self) -> usize {
        match self {
            ParamDomain::Pow2 { min_exp, max_exp } if max_exp >= min_exp => {
                (max_exp - min_exp + 1) as usize
            }
            ParamDomain::Pow2 { .. } => 0,
            ParamDomain::Values(values) => values.len(),
            ParamDomain::Fetch(policies) => policies.len(),
        }
    }

    /// Whether the domain has no value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether neighbouring indices are meaningful, i.e. the domain is not categorical.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, ParamDomain::Fetch(_))
    }

    /// The value at `index`.
    pub fn value(&self, index: usize) -> ParamValue {
        match self {
            ParamDomain::Pow2 { min_exp, .. } => ParamValue::Int(1 << (min_exp + index as u32)),
            ParamDomain::Values(values) => ParamValue::Int(values[index]),
            ParamDomain::Fetch(policies) => ParamValue::Fetch(policies[index]),
        }
    }

    /// The index of `value`, if it belongs to the domain.
    pub fn index_of(&self, value: &ParamValue) -> Option<usize> {
        match (self, value) {
            (ParamDomain::Pow2 { min_exp, max_exp }, ParamValue::Int(value)) => {
                if !value.is_power_of_two() {
                    return None;
                }
                let exp = value.trailing_zeros();
                (*min_exp..=*max_exp)
                    .contains(&exp)
                    .then(|| (exp - min_exp) as usize)
            }
            (ParamDomain::Values(values), ParamValue::Int(value)) => {
                values.iter().position(|v| v == value)
            }
            (ParamDomain::Fetch(policies), ParamValue::Fetch(policy)) => {
                policies.iter().position(|p| p == policy)
            }
            _ => None,
        }
    }
}

impl Display for ParamDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamDomain::Pow2 { min_exp, max_exp } => write!(f, "pow2[{min_exp}..={max_exp}]"),
            ParamDomain::Values(values) => write!(f, "values{values:?}"),
            ParamDomain::Fetch(policies) => {
                let names: Vec<_> = policies.iter().map(FetchPolicy::name).collect();
                write!(f, "fetch{names:?}")
            }
        }
    }
}

/// A named profile position.
#[derive(new, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamSpec {
    /// Name of the parameter, only used for diagnostics.
    pub name: String,
    /// Valid values.
    pub domain: ParamDomain,
}

/// A profile is encoded as one domain index per position while searching.
pub type Genome = Vec<usize>;

/// The configuration space of a kernel family: a fixed number of positions, each with its domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProfileSpace {
    params: Vec<ParamSpec>,
}

impl ProfileSpace {
    /// Create a new space.
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Positions of the space.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// The number of positions.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether every position of `profile` is in its domain.
    pub fn contains(&self, profile: &Profile) -> bool {
        self.encode(profile).is_some()
    }

    /// Decode a genome into a profile.
    pub fn decode(&self, genome: &[usize]) -> Profile {
        Profile(
            self.params
                .iter()
                .zip(genome)
                .map(|(param, index)| param.domain.value(*index))
                .collect(),
        )
    }

    /// Encode a profile into a genome, `None` if it doesn't belong to the space.
    pub fn encode(&self, profile: &Profile) -> Option<Genome> {
        if profile.arity() != self.arity() {
            return None;
        }

        self.params
            .iter()
            .zip(profile.values())
            .map(|(param, value)| param.domain.index_of(value))
            .collect()
    }

    /// Draw a genome uniformly, position by position.
    pub fn sample(&self, rng: &mut StdRng) -> Genome {
        self.params
            .iter()
            .map(|param| rng.random_range(0..param.domain.len()))
            .collect()
    }

    /// Every profile differing from `profile` in exactly one position.
    ///
    /// Ordered domains contribute their adjacent values, fetch positions every other policy.
    pub fn neighbours(&self, profile: &Profile) -> Vec<Profile> {
        let genome = match self.encode(profile) {
            Some(genome) => genome,
            None => return Vec::new(),
        };
        let mut neighbours = Vec::new();

        for (position, param) in self.params.iter().enumerate() {
            let current = genome[position];
            let candidates: Vec<usize> = if param.domain.is_ordered() {
                [current.checked_sub(1), Some(current + 1)]
                    .into_iter()
                    .flatten()
                    .filter(|index| *index < param.domain.len())
                    .collect()
            } else {
                (0..param.domain.len()).filter(|i| *i != current).collect()
            };

            for index in candidates {
                let mut neighbour = genome.clone();
                neighbour[position] = index;
                neighbours.push(self.decode(&neighbour));
            }
        }

        neighbours
    }

    /// A digest of the space layout, persisted with the tuning state to detect stale data.
    pub fn checksum(&self) -> String {
        let description = self
            .params
            .iter()
            .map(|param| format!("{}:{}", param.name, param.domain))
            .collect::<Vec<_>>()
            .join(";");

        format!("{:x}", md5::compute(description))
    }
}
