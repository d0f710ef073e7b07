//! Full enumeration: every polyhedron of every country, one solve.

use crate::epec::{Epec, EpecStatus};
use epx_core::EpxResult;
use tracing::info;

pub(crate) fn solve(epec: &mut Epec) -> EpxResult<()> {
    for i in 0..epec.n_countries() {
        let added = epec.player_lcps[i].as_poly_mut()?.enumerate_all(true)?;
        info!(country = i, added, "enumerated feasible polyhedra");
    }
    epec.make_players_qps()?;
    epec.compute_nash_eq(epec.params.pure_nash)?;
    if epec.out_of_time() {
        epec.stats.status = EpecStatus::TimeLimit;
        return Ok(());
    }
    let tol = epec.params.tolerance;
    if epec.is_solved(tol)?.0 {
        epec.stats.status = EpecStatus::NashEqFound;
        epec.stats.pure_nash = epec.is_pure_strategy(1e-5)?;
    } else {
        epec.stats.status = EpecStatus::NashEqNotFound;
    }
    Ok(())
}
