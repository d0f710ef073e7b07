//! Depth-first branch-and-bound over the binary variables.
//!
//! Node = a chronological list of binary fixings. The relaxation of a node
//! widens free binaries to `[0, 1]` and activates the indicator rows whose
//! guard is fixed to one. A relaxation point becomes an incumbent when every
//! binary is integral within `int_tol` and every indicator whose guard
//! rounds to one holds within `feas_tol`; otherwise the node is split.
//!
//! Branch selection: among violated indicators with a free guard, take the
//! one with the smallest violation and try the enforcing child first (a
//! barely-violated row is the cheapest to close); with no violated
//! indicator, take the most fractional binary, nearest child first.

use crate::model::{MipError, MipModel, ObjSense, Solution, SolveStatus};
use crate::relax::{self, RelaxOutcome};
use std::time::Instant;
use tracing::{debug, trace};

pub(crate) fn optimize(model: &MipModel) -> Result<Solution, MipError> {
    let start = Instant::now();
    let n = model.vars.len();
    let flip = match model.sense.0 {
        ObjSense::Minimize => 1.0,
        ObjSense::Maximize => -1.0,
    };
    let binaries: Vec<usize> = (0..n)
        .filter(|&i| model.vars[i].vtype == crate::model::VarType::Binary)
        .collect();

    // Canonical (minimisation) incumbent.
    let mut incumbent: Option<(f64, Vec<f64>)> = None;
    let mut n_solutions = 0u32;
    let mut nodes_explored = 0usize;

    let mut stack: Vec<Vec<(usize, bool)>> = vec![Vec::new()];

    let finish = |status: SolveStatus, incumbent: Option<(f64, Vec<f64>)>| {
        let (obj, x) = incumbent.unwrap_or((0.0, Vec::new()));
        Ok(Solution {
            status,
            objective: flip * obj,
            x,
        })
    };

    while let Some(fixes) = stack.pop() {
        let remaining = match model.params.time_limit {
            Some(limit) => {
                let left = limit - start.elapsed().as_secs_f64();
                if left <= 0.0 {
                    debug!(nodes_explored, "time limit reached in branch and bound");
                    let status = SolveStatus::TimeLimit;
                    return finish(status, incumbent);
                }
                Some(left)
            }
            None => None,
        };
        nodes_explored += 1;

        let mut bin_fix: Vec<Option<bool>> = vec![None; n];
        for &(var, val) in &fixes {
            bin_fix[var] = Some(val);
        }
        let enforced: Vec<bool> = model
            .indicators
            .iter()
            .map(|ind| bin_fix[ind.bin] == Some(true))
            .collect();

        let outcome = relax::solve(model, &bin_fix, &enforced, remaining)?;
        let (x, obj) = match outcome {
            RelaxOutcome::Infeasible => continue,
            RelaxOutcome::TimedOut => return finish(SolveStatus::TimeLimit, incumbent),
            RelaxOutcome::Unbounded => {
                if fixes.is_empty() && incumbent.is_none() {
                    return finish(SolveStatus::InfeasibleOrUnbounded, None);
                }
                return Err(MipError::Solver(
                    "unbounded relaxation below the root node".into(),
                ));
            }
            RelaxOutcome::Solved { x, obj } => (x, obj),
        };

        if let Some((best, _)) = &incumbent {
            if obj >= best - model.params.opt_tol {
                continue;
            }
        }

        // Indicator-driven branching first: an integral-looking point can
        // still violate an inactive indicator row.
        let mut repair: Option<(usize, f64)> = None; // (guard, violation)
        for (k, ind) in model.indicators.iter().enumerate() {
            if bin_fix[ind.bin].is_some() {
                continue;
            }
            let activity: f64 = ind.coeffs.iter().map(|&(c, v)| v * x[c]).sum();
            let violation = activity - ind.rhs;
            if violation > model.params.feas_tol {
                match repair {
                    Some((_, best_v)) if best_v <= violation => {}
                    _ => repair = Some((ind.bin, violation)),
                }
            }
        }

        let fractional = binaries
            .iter()
            .filter(|&&b| bin_fix[b].is_none())
            .map(|&b| (b, (x[b] - x[b].round()).abs()))
            .filter(|&(_, frac)| frac > model.params.int_tol)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        if let Some((guard, violation)) = repair {
            // Only a real blocker when the guard wants to be up; a guard at
            // zero with a violated (inactive) row is fine.
            if x[guard] > model.params.int_tol {
                trace!(guard, violation, "branching on violated indicator");
                let mut off = fixes.clone();
                off.push((guard, false));
                let mut on = fixes.clone();
                on.push((guard, true));
                stack.push(off);
                stack.push(on); // enforcing child explored first
                continue;
            }
        }

        if let Some((b, frac)) = fractional {
            trace!(var = b, frac, "branching on fractional binary");
            let near = x[b] >= 0.5;
            let mut far_child = fixes.clone();
            far_child.push((b, !near));
            let mut near_child = fixes.clone();
            near_child.push((b, near));
            stack.push(far_child);
            stack.push(near_child);
            continue;
        }

        // Integral and indicator-consistent: a new incumbent.
        trace!(obj, nodes_explored, "incumbent found");
        let better = match &incumbent {
            Some((best, _)) => obj < best - model.params.opt_tol,
            None => true,
        };
        if better {
            incumbent = Some((obj, x));
        }
        n_solutions += 1;
        if let Some(limit) = model.params.solution_limit {
            if n_solutions >= limit {
                return finish(SolveStatus::SolutionLimit, incumbent);
            }
        }
    }

    debug!(nodes_explored, "branch and bound exhausted");
    match incumbent {
        Some(_) => finish(SolveStatus::Optimal, incumbent),
        None => finish(SolveStatus::Infeasible, None),
    }
}
