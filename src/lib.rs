#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(missing_docs)]
//! Library entry for cfmm-quote.
//!
//! Exact off-chain swap math for weighted, linear, stable, Gyro and FX
//! liquidity pools. Every calculator reproduces the rounding of the pool
//! contracts, so a quote here equals the amount the chain would settle.
//!
//! # Modules
//! - [`fixed_point`], [`log_exp`]: 18-decimal arithmetic and real powers
//! - [`xp_math`]: signed 38-decimal arithmetic and square roots
//! - [`abdk`]: 64.64 binary fixed point for FX pools
//! - [`pools`]: one calculator per pool family
//! - [`pool`], [`factory`]: the quoting facade and its constructors
//! - [`raw`], [`token`]: snapshot decoding and precision scaling

/// Error taxonomy.
pub mod error;

/// 18-decimal fixed point.
pub mod fixed_point;

/// `ln`, `exp` and `pow` at 18 decimals.
pub mod log_exp;

/// Signed extended-precision arithmetic.
pub mod xp_math;

/// Signed 64.64 fixed point.
pub mod abdk;

/// Pool tokens and decimal parsing.
pub mod token;

/// Raw pool snapshots.
pub mod raw;

/// Per-family swap calculators.
pub mod pools;

/// Quoting facade.
pub mod pool;

/// Pool construction from snapshots.
pub mod factory;

pub use error::{Error, ErrorKind, InputError, MathError, Result, Violation};
pub use factory::{create_pool, PoolFactory};
pub use pool::{Pool, PoolKind, SwapRequest, SwapResult};
pub use pools::{SwapKind, SwapMath};
pub use raw::{RawPool, RawPoolToken};
pub use token::PoolToken;
