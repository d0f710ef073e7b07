//! # epx-game: game-theoretic core of the epx EPEC solver
//!
//! The layers, leaves first:
//!
//! - [`QpParam`]: one player's parametric quadratic program and its KKT
//!   system
//! - [`NashGame`]: a simultaneous game of `QpParam`s plus market-clearing
//!   and leader constraints, rewritten as a linear complementarity problem
//! - [`Lcp`]: the complementarity problem `0 <= x  ⊥  Mx + q >= 0` with
//!   big-M and indicator mixed-integer reformulations
//! - [`PolyLcp`] / [`OuterLcp`]: inner and outer polyhedral approximations
//!   of an LCP's feasible region, with Balas' convex-hull lifting
//! - [`Epec`]: the orchestrator composing one LCP per leader into the
//!   top-level Nash game, plus the four solution algorithms (full
//!   enumeration, inner approximation, combinatorial pure-NE search, outer
//!   approximation)
//!
//! Everything is single-threaded; the only concurrency lives inside the
//! backend solver. Players are shared between a game and the upper-level
//! assembly through `Rc<RefCell<...>>`.

pub mod algorithms;
pub mod epec;
pub mod lcp;
pub mod nash;
pub mod qp;
pub mod tree;

pub use epec::{
    AddPolyMethod, Algorithm, AlgorithmParams, CrossRef, Epec, EpecStatistics, EpecStatus,
    LeaderObjective, McRow, PlayerLcp, RecoverStrategy,
};
pub use lcp::{Lcp, OuterLcp, PolyLcp};
pub use nash::NashGame;
pub use qp::{DummyPosition, QpConstraints, QpObjective, QpParam, QpSolution};
pub use tree::OuterTree;

/// A complementarity pairing: `(equation index, variable index)`.
pub type ComplPair = (usize, usize);

/// Sign vector over complementarities: +1 fixes the equation to zero, -1 the
/// variable, 0 leaves the pair unresolved.
pub type Encoding = Vec<i8>;
