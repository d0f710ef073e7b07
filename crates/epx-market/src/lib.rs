//! # epx-market: the energy-market front end of the epx EPEC solver
//!
//! Each country is a Stackelberg game: the government (leader) fixes taxes
//! and trade quantities while its producers (followers) play a Nash-Cournot
//! game against the domestic demand curve. [`MarketEpec`] assembles one
//! lower-level game per country, wires the countries together through trade
//! balance and market clearing, and drives the `epx-game` engine to an
//! equilibrium.
//!
//! The crate also owns the plain-text instance format ([`EpecInstance`])
//! and the solution writers (structured JSON and a human-readable report).

pub mod instance;
pub mod market;
pub mod output;
pub mod params;

pub use instance::EpecInstance;
pub use market::{LeaderVar, MarketEpec};
pub use output::SolutionReport;
pub use params::{CountryParams, DemandParams, FollowerParams, LeaderParams, TaxParadigm};
