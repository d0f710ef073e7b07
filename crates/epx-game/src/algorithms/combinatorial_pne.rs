//! Combinatorial search for a pure equilibrium: depth-first over the
//! Cartesian product of each country's feasible polyhedra, fixing exactly
//! one polyhedron per country at each leaf.

use crate::epec::{Epec, EpecStatus};
use epx_core::EpxResult;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, trace};

/// `exclude[j]` lists polyhedron identifiers of country `j` whose full
/// combinations were already visited (by a previous inner-approximation
/// run); a leaf is pruned only when *every* country's choice is excluded.
pub(crate) fn solve(epec: &mut Epec, exclude: &[BTreeSet<u64>]) -> EpxResult<()> {
    if epec.init_time.is_none() {
        epec.init_time = Some(Instant::now());
    }
    let combination = vec![None; epec.n_countries()];
    recursion(epec, &combination, exclude)?;
    if epec.stats.status != EpecStatus::NashEqFound
        && epec.stats.status != EpecStatus::TimeLimit
    {
        epec.stats.status = EpecStatus::NashEqNotFound;
    }
    Ok(())
}

fn recursion(
    epec: &mut Epec,
    combination: &[Option<u64>],
    exclude: &[BTreeSet<u64>],
) -> EpxResult<()> {
    if (epec.stats.status == EpecStatus::NashEqFound && epec.stats.pure_nash)
        || epec.stats.status == EpecStatus::TimeLimit
    {
        return Ok(());
    }
    if epec.out_of_time() {
        epec.stats.status = EpecStatus::TimeLimit;
        return Ok(());
    }

    let n = epec.n_countries();
    match combination.iter().position(|c| c.is_none()) {
        Some(i) => {
            let max = epec.player_lcps[i].as_poly_mut()?.max_theoretical();
            for id in 0..max {
                if epec.player_lcps[i].as_poly_mut()?.check_poly_feas(id)? {
                    let mut child = combination.to_vec();
                    child[i] = Some(id);
                    recursion(epec, &child, exclude)?;
                    if (epec.stats.status == EpecStatus::NashEqFound && epec.stats.pure_nash)
                        || epec.stats.status == EpecStatus::TimeLimit
                    {
                        return Ok(());
                    }
                }
            }
            Ok(())
        }
        None => {
            trace!(?combination, "considering a full combination");
            if !exclude.is_empty() {
                let all_seen = (0..n).all(|j| {
                    exclude[j].contains(&combination[j].expect("combination is full"))
                });
                if all_seen {
                    trace!("combination pruned by the exclusion list");
                    return Ok(());
                }
            }
            for j in 0..n {
                let poly = epec.player_lcps[j].as_poly_mut()?;
                poly.clear_polyhedra();
                poly.add_the_poly(combination[j].expect("combination is full"))?;
            }
            epec.make_players_qps()?;
            let solved = epec.compute_nash_eq(false)?;
            if solved {
                let tol = epec.params.tolerance;
                if epec.is_solved(tol)?.0 && epec.is_pure_strategy(1e-5)? {
                    info!(?combination, "found a pure strategy equilibrium");
                    epec.stats.status = EpecStatus::NashEqFound;
                    epec.stats.pure_nash = true;
                    return Ok(());
                }
                debug!("combination solved but not a verified pure equilibrium");
            }
            Ok(())
        }
    }
}
