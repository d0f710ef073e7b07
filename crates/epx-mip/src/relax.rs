//! Continuous relaxations on Clarabel.
//!
//! One relaxation = the model with every free binary widened to `[0, 1]`,
//! every fixed binary pinned by an equality row, and exactly the indicator
//! rows whose guard is fixed to one. Constraints are passed to Clarabel in
//! the conic form `Ax + s = b` with equalities in the zero cone followed by
//! inequalities in the nonnegative cone.

use crate::model::{ConstrSense, MipError, MipModel, ObjSense};
use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

pub(crate) enum RelaxOutcome {
    Solved { x: Vec<f64>, obj: f64 },
    Infeasible,
    Unbounded,
    TimedOut,
}

/// Solves one node relaxation.
///
/// `bin_fix[i]` pins binary variable `i`; `enforced[k]` activates indicator
/// row `k`. The objective is canonicalised to minimisation; the returned
/// objective value is in the canonical sense.
pub(crate) fn solve(
    model: &MipModel,
    bin_fix: &[Option<bool>],
    enforced: &[bool],
    remaining_time: Option<f64>,
) -> Result<RelaxOutcome, MipError> {
    let n = model.vars.len();
    if n == 0 {
        return Ok(RelaxOutcome::Solved {
            x: Vec::new(),
            obj: 0.0,
        });
    }
    let flip = match model.sense.0 {
        ObjSense::Minimize => 1.0,
        ObjSense::Maximize => -1.0,
    };

    // Linear objective.
    let q: Vec<f64> = model.vars.iter().map(|v| flip * v.obj).collect();

    // Quadratic objective, upper triangle of P with 1/2 x' P x convention.
    let mut p_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for &(i, j, v) in &model.quad {
        let (a, b) = if i <= j { (i, j) } else { (j, i) };
        let entry = if a == b { 2.0 * v } else { v };
        p_cols[b].push((a, flip * entry));
    }
    let p_mat = csc_from_cols(n, n, p_cols);

    // Constraint rows: equalities first (zero cone), then inequalities
    // (nonnegative cone).
    let mut a_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut rhs: Vec<f64> = Vec::new();
    let mut n_eq = 0usize;

    let push_row = |coeffs: &[(usize, f64)],
                        b: f64,
                        a_cols: &mut Vec<Vec<(usize, f64)>>,
                        rhs: &mut Vec<f64>| {
        let row = rhs.len();
        for &(col, val) in coeffs {
            a_cols[col].push((row, val));
        }
        rhs.push(b);
    };

    for row in model.rows.iter().filter(|r| r.sense == ConstrSense::Eq) {
        push_row(&row.coeffs, row.rhs, &mut a_cols, &mut rhs);
        n_eq += 1;
    }
    for (i, fix) in bin_fix.iter().enumerate() {
        if let Some(v) = fix {
            push_row(
                &[(i, 1.0)],
                if *v { 1.0 } else { 0.0 },
                &mut a_cols,
                &mut rhs,
            );
            n_eq += 1;
        }
    }

    for row in &model.rows {
        match row.sense {
            ConstrSense::Le => push_row(&row.coeffs, row.rhs, &mut a_cols, &mut rhs),
            ConstrSense::Ge => {
                let negated: Vec<(usize, f64)> =
                    row.coeffs.iter().map(|&(c, v)| (c, -v)).collect();
                push_row(&negated, -row.rhs, &mut a_cols, &mut rhs);
            }
            ConstrSense::Eq => {}
        }
    }
    for (i, var) in model.vars.iter().enumerate() {
        let (lb, ub) = match var.vtype {
            crate::model::VarType::Binary => match bin_fix[i] {
                Some(_) => continue, // pinned by an equality row
                None => (0.0, 1.0),
            },
            crate::model::VarType::Continuous => (var.lb, var.ub),
        };
        if ub.is_finite() {
            push_row(&[(i, 1.0)], ub, &mut a_cols, &mut rhs);
        }
        if lb.is_finite() {
            push_row(&[(i, -1.0)], -lb, &mut a_cols, &mut rhs);
        }
    }
    for (k, ind) in model.indicators.iter().enumerate() {
        if enforced[k] {
            push_row(&ind.coeffs, ind.rhs, &mut a_cols, &mut rhs);
        }
    }

    let n_rows = rhs.len();
    let n_ineq = n_rows - n_eq;
    let a_mat = csc_from_cols(n_rows, n, a_cols);
    let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
    if n_eq > 0 {
        cones.push(SupportedConeT::ZeroConeT(n_eq));
    }
    if n_ineq > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(n_ineq));
    }

    let mut builder = DefaultSettingsBuilder::default();
    builder.verbose(false);
    if let Some(t) = remaining_time {
        builder.time_limit(t.max(0.0));
    }
    let settings = builder
        .build()
        .map_err(|e| MipError::Solver(format!("settings error: {e:?}")))?;

    let mut solver = DefaultSolver::new(&p_mat, &q, &a_mat, &rhs, &cones, settings)
        .map_err(|e| MipError::Solver(format!("initialization failed: {e:?}")))?;
    solver.solve();
    let sol = &solver.solution;

    match sol.status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => Ok(RelaxOutcome::Solved {
            x: sol.x.clone(),
            obj: sol.obj_val,
        }),
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            Ok(RelaxOutcome::Infeasible)
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
            Ok(RelaxOutcome::Unbounded)
        }
        SolverStatus::MaxTime => Ok(RelaxOutcome::TimedOut),
        other => Err(MipError::Solver(format!(
            "interior-point solver returned {other:?}"
        ))),
    }
}

/// Column-major assembly, sorting each column by row index as CSC requires.
fn csc_from_cols(n_rows: usize, n_cols: usize, mut cols: Vec<Vec<(usize, f64)>>) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(n_cols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    let mut nnz = 0usize;
    for col in cols.iter_mut() {
        colptr.push(nnz);
        col.sort_by_key(|&(r, _)| r);
        // merge duplicates within a column
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(col.len());
        for &(r, v) in col.iter() {
            match merged.last_mut() {
                Some(last) if last.0 == r => last.1 += v,
                _ => merged.push((r, v)),
            }
        }
        for (r, v) in merged {
            rowval.push(r);
            nzval.push(v);
            nnz += 1;
        }
    }
    colptr.push(nnz);
    CscMatrix::new(n_rows, n_cols, colptr, rowval, nzval)
}
