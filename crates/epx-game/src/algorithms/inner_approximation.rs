//! Inner approximation: grow each country's polyhedron set from
//! best-response deviations until a verified equilibrium appears.
//!
//! Per iteration the algorithm either certifies the current candidate (all
//! best responses within tolerance) or adds, for each deviating country,
//! the polyhedron containing its deviation. When an upper-level solve comes
//! back empty, a batch of heuristically selected polyhedra (size
//! `aggressiveness`) is added instead. A mixed equilibrium under a pure-NE
//! request triggers the configured recovery strategy.

use crate::algorithms::combinatorial_pne;
use crate::epec::{Epec, EpecStatus, RecoverStrategy};
use epx_core::EpxResult;
use tracing::{debug, info, warn};

pub(crate) fn solve(epec: &mut Epec) -> EpxResult<()> {
    let n = epec.n_countries();
    let tol = epec.params.tolerance;
    epec.sol_x = epec.zero_profile();
    epec.nash_eq = false;

    let mut add_rand_poly = false;
    let mut incremental_enumeration = false;

    loop {
        epec.stats.num_iterations += 1;
        info!(iteration = epec.stats.num_iterations, "inner approximation");
        if epec.out_of_time() {
            if !incremental_enumeration {
                epec.stats.status = EpecStatus::TimeLimit;
            }
            return Ok(());
        }

        if add_rand_poly {
            info!("using heuristical polyhedra selection");
            let stop_on_single = epec.stats.num_iterations == 1;
            if !add_random_poly_to_all(epec, stop_on_single)? {
                epec.stats.status = EpecStatus::NashEqNotFound;
                return Ok(());
            }
        } else {
            if epec.nash_eq {
                let (is_eq, _) = epec.is_solved(tol)?;
                if is_eq {
                    epec.stats.status = EpecStatus::NashEqFound;
                    epec.stats.pure_nash = epec.is_pure_strategy(1e-5)?;
                    if epec.params.pure_nash && !epec.stats.pure_nash {
                        match epec.params.recover_strategy {
                            RecoverStrategy::IncrementalEnumeration => {
                                info!("mixed equilibrium found; recovering incrementally");
                                incremental_enumeration = true;
                            }
                            RecoverStrategy::Combinatorial => {
                                info!("mixed equilibrium found; switching to combinatorial PNE");
                                let mut exclude = Vec::with_capacity(n);
                                let mut saved = Vec::with_capacity(n);
                                for i in 0..n {
                                    let poly = epec.player_lcps[i].as_poly_mut()?;
                                    exclude.push(poly.enumerated_ids().clone());
                                    saved.push(poly.polyhedron_ids().to_vec());
                                }
                                combinatorial_pne::solve(epec, &exclude)?;
                                if (epec.stats.status == EpecStatus::NashEqFound
                                    && epec.stats.pure_nash)
                                    || epec.stats.status == EpecStatus::TimeLimit
                                {
                                    return Ok(());
                                }
                                // No pure combination exists: rebuild the
                                // approximations and recover the mixed
                                // equilibrium.
                                info!("no pure combination; restoring the mixed equilibrium");
                                for (i, ids) in saved.iter().enumerate() {
                                    let poly = epec.player_lcps[i].as_poly_mut()?;
                                    poly.clear_polyhedra();
                                    for &id in ids {
                                        poly.add_the_poly(id)?;
                                    }
                                }
                                epec.make_players_qps()?;
                                let solved = epec.compute_nash_eq(false)?;
                                epec.stats.status = if solved {
                                    EpecStatus::NashEqFound
                                } else {
                                    EpecStatus::NashEqNotFound
                                };
                                epec.stats.pure_nash = epec.is_pure_strategy(1e-5)?;
                                return Ok(());
                            }
                        }
                    } else {
                        return Ok(());
                    }
                }
            }
            // Best-response deviations for every country; without a live
            // candidate the zero profile is the deviation target.
            let profile = if epec.nash_eq {
                epec.sol_x.clone()
            } else {
                epec.zero_profile()
            };
            let mut deviations: Vec<Option<Vec<f64>>> = Vec::with_capacity(n);
            for i in 0..n {
                match epec.respond_sol(i, &profile)? {
                    Some((_, dev)) => deviations.push(Some(dev)),
                    None => deviations.push(None),
                }
            }
            let mut added = 0usize;
            let mut infeasibility = false;
            for (i, dev) in deviations.iter().enumerate() {
                match dev {
                    Some(point) => {
                        if epec.player_lcps[i]
                            .as_poly_mut()?
                            .add_poly_from_point(point)?
                        {
                            debug!(country = i, "added deviation polyhedron");
                            added += 1;
                        } else {
                            infeasibility = true;
                        }
                    }
                    None => infeasibility = true,
                }
            }
            if infeasibility && epec.stats.num_iterations == 1 {
                warn!("the problem is infeasible");
                epec.stats.status = EpecStatus::NashEqNotFound;
                return Ok(());
            }
            if added == 0 && epec.stats.num_iterations > 1 && !incremental_enumeration {
                warn!("candidate not solved, but no deviation polyhedron could be added");
                epec.stats.numerical_issues = true;
                epec.stats.status = EpecStatus::Numerical;
                return Ok(());
            }
            if added == 0 && incremental_enumeration {
                // Incremental recovery: enumerate beyond the deviations.
                if !add_random_poly_to_all(epec, false)? {
                    info!("polyhedron space exhausted; only the mixed equilibrium exists");
                    epec.stats.status = EpecStatus::NashEqFound;
                    epec.stats.pure_nash = false;
                    return Ok(());
                }
            }
        }

        epec.make_players_qps()?;
        let solved = epec.compute_nash_eq(epec.params.pure_nash)?;
        add_rand_poly = !solved && !incremental_enumeration;
        if add_rand_poly {
            epec.stats.lost_intermediate_eq += 1;
        }
        for i in 0..n {
            debug!(
                country = i,
                polyhedra = epec.player_lcps[i].poly_count(),
                "approximation size"
            );
        }
    }
}

/// Adds up to `aggressiveness` polyhedra to every country. With
/// `stop_on_single_infeasibility` the function aborts as soon as one country
/// accepts nothing; otherwise it fails only when *no* country accepts
/// anything.
fn add_random_poly_to_all(epec: &mut Epec, stop_on_single_infeasibility: bool) -> EpxResult<bool> {
    debug!("adding heuristically selected polyhedra to every country");
    let method = epec.params.add_poly_method;
    let aggressiveness = epec.params.aggressiveness;
    let mut all_empty = true;
    for i in 0..epec.n_countries() {
        let added = epec.player_lcps[i]
            .as_poly_mut()?
            .add_polyhedra(aggressiveness, method)?;
        if added.is_empty() {
            if stop_on_single_infeasibility {
                info!(country = i, "no polyhedron could be added");
                return Ok(false);
            }
        } else {
            all_empty = false;
        }
    }
    Ok(!all_empty)
}
