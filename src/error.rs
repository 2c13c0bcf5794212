//! Error taxonomy shared by every calculator.
//!
//! Failures are reported synchronously and never retried. A failed call never
//! leaves a pool half-updated: balances only move after every check passes.

use num_bigint::BigInt;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by quotes, limits and pool construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Unknown token, malformed parameter or unsupported pool.
    #[error(transparent)]
    Input(#[from] InputError),
    /// The requested amount is larger than the pool can serve.
    #[error("requested amount {requested} exceeds limit {limit}")]
    LimitExceeded {
        /// Amount the caller asked for (18-decimal scale).
        requested: BigInt,
        /// Largest amount the pool accepts (18-decimal scale).
        limit: BigInt,
    },
    /// An iterative solver ran out of iterations.
    #[error("{solver} did not converge within {iterations} iterations")]
    Convergence {
        /// Name of the solver that gave up.
        solver: &'static str,
        /// Iteration budget that was exhausted.
        iterations: usize,
    },
    /// The trade would breach a protocol guard.
    #[error(transparent)]
    InvariantViolation(#[from] Violation),
    /// Arithmetic fault raised by the on-chain math (underflow, bounds, ...).
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Input`].
    Input,
    /// See [`Error::LimitExceeded`].
    LimitExceeded,
    /// See [`Error::Convergence`].
    Convergence,
    /// See [`Error::InvariantViolation`].
    InvariantViolation,
    /// See [`Error::Math`].
    Math,
}

impl Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Input(_) => ErrorKind::Input,
            Error::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Error::Convergence { .. } => ErrorKind::Convergence,
            Error::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Error::Math(_) => ErrorKind::Math,
        }
    }

    pub(crate) fn convergence(solver: &'static str, iterations: usize) -> Self {
        tracing::warn!(solver, iterations, "solver exhausted its iteration budget");
        Error::Convergence { solver, iterations }
    }

    pub(crate) fn limit(requested: BigInt, limit: BigInt) -> Self {
        Error::LimitExceeded { requested, limit }
    }
}

/// Malformed or missing caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The token address is not part of the pool.
    #[error("token {0} is not in the pool")]
    UnknownToken(String),
    /// Token in and token out are the same or otherwise not tradeable.
    #[error("cannot swap {token_in} for {token_out}")]
    UnsupportedPair {
        /// Input token address.
        token_in: String,
        /// Output token address.
        token_out: String,
    },
    /// A curve parameter required by the pool family is absent.
    #[error("pool {pool} is missing parameter `{name}`")]
    MissingParameter {
        /// Pool id.
        pool: String,
        /// Parameter name as it appears in the snapshot.
        name: &'static str,
    },
    /// A parameter is present but out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// A decimal string could not be parsed.
    #[error("cannot parse `{0}` as a decimal number")]
    InvalidDecimal(String),
    /// No factory handles this pool type.
    #[error("unsupported pool type `{0}`")]
    UnsupportedPoolType(String),
    /// The snapshot document could not be decoded.
    #[error("malformed pool snapshot: {0}")]
    Malformed(String),
}

/// Protocol guards that reject a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    /// An FX asset would rise above its upper halt band.
    #[error("FX upper halt")]
    UpperHalt,
    /// An FX asset would fall below its lower halt band.
    #[error("FX lower halt")]
    LowerHalt,
    /// The FX liquidity-minus-fee invariant would decrease.
    #[error("FX swap invariant violation")]
    SwapInvariant,
    /// A Gyro balance would leave the curve's domain.
    #[error("asset bounds exceeded")]
    AssetBoundsExceeded,
    /// E-CLP balances sum above the supported maximum.
    #[error("max assets exceeded")]
    MaxAssetsExceeded,
    /// E-CLP invariant above the supported maximum.
    #[error("max invariant exceeded")]
    MaxInvariantExceeded,
}

/// Arithmetic faults mirroring the contract revert reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// `a - b` with `b > a` on unsigned values.
    #[error("subtraction overflow")]
    SubOverflow,
    /// Division by zero.
    #[error("zero division")]
    ZeroDivision,
    /// `pow` base outside the supported domain.
    #[error("x out of bounds")]
    XOutOfBounds,
    /// `pow` exponent outside the supported domain.
    #[error("y out of bounds")]
    YOutOfBounds,
    /// `y * ln(x)` outside the natural exponent range.
    #[error("product out of bounds")]
    ProductOutOfBounds,
    /// `exp` argument outside the natural exponent range.
    #[error("invalid exponent")]
    InvalidExponent,
    /// Result does not fit the contract's integer width.
    #[error("arithmetic overflow")]
    Overflow,
}
