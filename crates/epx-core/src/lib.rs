//! # epx-core: shared foundations for the epx EPEC solver
//!
//! This crate provides the pieces every other `epx` crate leans on:
//!
//! - [`EpxError`]: the unified error type for the workspace
//! - [`matrix`]: size-agnostic sparse matrix edits (pure-function resize,
//!   stacking, block scatter) built on [`sprs`]
//! - [`persist`]: the header/length-framed ascii format used to append
//!   matrices, vectors and scalars to a single state file
//!
//! Dense vectors are plain `Vec<f64>` throughout; everything two-dimensional
//! is a [`SpMat`].

pub mod error;
pub mod matrix;
pub mod persist;

pub use error::{EpxError, EpxResult};

/// Sparse matrix type used across the workspace (CSR storage).
pub type SpMat = sprs::CsMat<f64>;
