//! Outer approximation: per-country branching trees refine outer
//! approximations of the LCP feasible regions until a verified equilibrium
//! appears or every tree is exhausted.
//!
//! The branching location for a country is chosen by a composite rule:
//!
//! 1. with a candidate profile at hand, the complementarity most violated
//!    by the profile (largest `x + z` among strictly infeasible pairs);
//! 2. otherwise a complementarity indicated by the best-response
//!    deviation's encoding;
//! 3. otherwise the largest equation or variable value from a single solve
//!    of the country's own LCP.

use crate::epec::{Epec, EpecStatus};
use crate::tree::OuterTree;
use epx_core::EpxResult;
use tracing::{debug, info, warn};

pub(crate) fn solve(epec: &mut Epec) -> EpxResult<()> {
    let n = epec.n_countries();
    let tol = epec.params.tolerance;
    epec.sol_x = epec.zero_profile();
    epec.nash_eq = false;

    let mut trees: Vec<OuterTree> = (0..n)
        .map(|i| OuterTree::new(epec.player_lcps[i].base().n_rows()))
        .collect();
    let mut incumbent: Vec<usize> = trees.iter().map(|t| t.root()).collect();

    loop {
        if epec.out_of_time() {
            epec.stats.status = EpecStatus::TimeLimit;
            return Ok(());
        }
        epec.stats.num_iterations += 1;
        info!(iteration = epec.stats.num_iterations, "outer approximation");

        let mut stalled = 0usize;
        let mut p = 0usize;
        while p < n {
            let node = incumbent[p];
            if trees[p].node(node).cumulative_branches() == trees[p].encoding_size() {
                stalled += 1;
                p += 1;
                continue;
            }
            let decisions = next_branch_location(epec, p, &trees[p], node)?;
            if epec.stats.num_iterations == 1 && decisions.iter().all(|d| d.is_none()) {
                info!(player = p, "player has an infeasible problem");
                epec.stats.status = EpecStatus::NashEqNotFound;
                return Ok(());
            }
            let (locations, child) = match decisions {
                [Some(a), Some(b), _] if a != b => {
                    debug!(player = p, a, b, "multiple branching");
                    (vec![a, b], trees[p].multiple_branch(&[a, b], node)?)
                }
                [Some(a), _, _] => {
                    debug!(player = p, location = a, "branching on infeasibility");
                    (vec![a], trees[p].single_branch(a, node)?.1)
                }
                [None, Some(b), _] => {
                    debug!(player = p, location = b, "branching on a deviation");
                    (vec![b], trees[p].single_branch(b, node)?.1)
                }
                [None, None, Some(c)] => {
                    debug!(player = p, location = c, "branching on the first available");
                    (vec![c], trees[p].single_branch(c, node)?.1)
                }
                [None, None, None] => {
                    warn!(player = p, "cannot branch on any complementarity");
                    stalled += 1;
                    p += 1;
                    continue;
                }
            };
            let mask = trees[p].node(child).branched_mask();
            let outer = epec.player_lcps[p].as_outer_mut()?;
            outer.outer_approximate(&mask, true)?;
            if !outer.feasible_approximation() {
                // the refinement killed every component: forbid it, restore
                // the incumbent's approximation and retry
                trees[p].deny_branchings(node, &locations)?;
                let parent_mask = trees[p].node(node).branched_mask();
                epec.player_lcps[p]
                    .as_outer_mut()?
                    .outer_approximate(&parent_mask, true)?;
            } else {
                incumbent[p] = child;
                p += 1;
            }
        }
        if stalled == n {
            info!("all branching exhausted without an equilibrium");
            epec.stats.status = EpecStatus::NashEqNotFound;
            return Ok(());
        }

        epec.make_players_qps()?;
        epec.compute_nash_eq(epec.params.pure_nash)?;
        if epec.nash_eq && epec.is_solved(tol)?.0 {
            epec.stats.status = EpecStatus::NashEqFound;
            epec.stats.pure_nash = epec.is_pure_strategy(1e-5)?;
            return Ok(());
        }
    }
}

/// The composite branching rule: `[infeasibility, deviation, fallback]`.
fn next_branch_location(
    epec: &mut Epec,
    player: usize,
    tree: &OuterTree,
    node: usize,
) -> EpxResult<[Option<usize>; 3]> {
    let mut decisions: [Option<usize>; 3] = [None, None, None];
    let allowed = tree.node(node).allowed.clone();
    if epec.nash_eq {
        let x = epec.x_without_hull(player).to_vec();
        let base = epec.player_lcps[player].base();
        let z = base.z_from_x(&x)?;
        let current = base.loose_encoding(&z, &x);
        let eps = base.eps;
        let mut max_infeas = 0.0;
        for i in 0..base.n_rows() {
            let var = base.var_position(i);
            if x[var] > eps && z[i] > eps && allowed[i] && current[i] == 0 {
                let violation = x[var] + z[i];
                if violation > max_infeas {
                    max_infeas = violation;
                    decisions[0] = Some(i);
                }
            }
        }
        let profile = epec.sol_x.clone();
        if let Some((_, dev)) = epec.respond_sol(player, &profile)? {
            let base = epec.player_lcps[player].base();
            if let Ok(enc) = base.solution_encoding(&dev) {
                for i in 0..enc.len() {
                    if enc[i] > 0 && allowed[i] && current[i] == 0 {
                        decisions[1] = Some(i);
                    }
                }
            }
        }
    }
    if decisions[0].is_none() && decisions[1].is_none() {
        decisions[2] = first_branch_location(epec, player, &allowed)?;
    }
    Ok(decisions)
}

/// Solves the player's full LCP once and picks the allowed complementarity
/// with the largest equation or variable value. `None` when that LCP is
/// infeasible.
fn first_branch_location(
    epec: &mut Epec,
    player: usize,
    allowed: &[bool],
) -> EpxResult<Option<usize>> {
    let base = epec.player_lcps[player].base_mut();
    let model = base.as_mip()?;
    let sol = model.optimize().map_err(epx_core::EpxError::from)?;
    let (x, z) = match base.extract(&sol) {
        Some(pair) => pair,
        None => {
            debug!(player, "the player's own LCP is infeasible");
            return Ok(None);
        }
    };
    let mut best: Option<(usize, f64)> = None;
    for i in 0..base.n_rows() {
        if !allowed[i] {
            continue;
        }
        let candidate = x[base.var_position(i)].max(z[i]);
        match best {
            Some((_, v)) if v >= candidate => {}
            _ => best = Some((i, candidate)),
        }
    }
    Ok(best.map(|(i, _)| i))
}
