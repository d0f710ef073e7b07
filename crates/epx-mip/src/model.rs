//! Model-building facade.

use std::collections::HashMap;
use thiserror::Error;

/// Errors produced by the bundled backend.
#[derive(Error, Debug)]
pub enum MipError {
    /// Ill-formed model (unknown variable, non-binary indicator guard, ...).
    #[error("model error: {0}")]
    Model(String),

    /// The interior-point solver failed on a relaxation.
    #[error("solver failure: {0}")]
    Solver(String),
}

impl From<MipError> for epx_core::EpxError {
    fn from(e: MipError) -> Self {
        epx_core::EpxError::Solver(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstrSense {
    Le,
    Eq,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjSense {
    Minimize,
    Maximize,
}

/// Backend tunables.
#[derive(Debug, Clone)]
pub struct SolveParams {
    /// Thread count hint. The bundled interior-point backend runs
    /// single-threaded; values above one are accepted and ignored.
    pub threads: u32,
    /// Wall-clock budget in seconds for one `optimize` call.
    pub time_limit: Option<f64>,
    /// Integer feasibility tolerance.
    pub int_tol: f64,
    /// Feasibility tolerance for constraint and indicator checks.
    pub feas_tol: f64,
    /// Optimality tolerance used for incumbent pruning.
    pub opt_tol: f64,
    /// Stop after this many incumbents (status `SolutionLimit`).
    pub solution_limit: Option<u32>,
}

impl Default for SolveParams {
    fn default() -> Self {
        SolveParams {
            threads: 0,
            time_limit: None,
            int_tol: 1e-6,
            feas_tol: 1e-6,
            opt_tol: 1e-6,
            solution_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    SubOptimal,
    SolutionLimit,
    Infeasible,
    InfeasibleOrUnbounded,
    TimeLimit,
}

/// Result of one `optimize` call.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    /// Variable values, indexed like the model's variables. Empty when no
    /// incumbent was found.
    pub x: Vec<f64>,
    pub objective: f64,
}

impl Solution {
    /// True for the statuses the engine treats as "a usable point exists".
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            SolveStatus::Optimal | SolveStatus::SubOptimal | SolveStatus::SolutionLimit
        )
    }

    pub fn value(&self, var: usize) -> f64 {
        self.x.get(var).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Var {
    pub name: String,
    pub lb: f64,
    pub ub: f64,
    pub vtype: VarType,
    pub obj: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct LinRow {
    pub name: String,
    pub coeffs: Vec<(usize, f64)>,
    pub sense: ConstrSense,
    pub rhs: f64,
}

/// `bin = 1` implies `coeffs . x <= rhs`.
#[derive(Debug, Clone)]
pub(crate) struct IndicatorRow {
    pub name: String,
    pub bin: usize,
    pub coeffs: Vec<(usize, f64)>,
    pub rhs: f64,
}

/// A mixed-integer model with an optional convex quadratic objective.
#[derive(Debug, Clone, Default)]
pub struct MipModel {
    pub(crate) vars: Vec<Var>,
    pub(crate) rows: Vec<LinRow>,
    pub(crate) indicators: Vec<IndicatorRow>,
    /// Quadratic objective terms: `(i, j, v)` contributes `v * x_i * x_j`
    /// to the objective expression (so a diagonal entry `(i, i, v)` is
    /// `v * x_i^2`, not `v/2 * x_i^2`).
    pub(crate) quad: Vec<(usize, usize, f64)>,
    pub(crate) sense: ObjSenseField,
    pub params: SolveParams,
    name_index: HashMap<String, usize>,
}

/// Newtype wrapper so `MipModel` can derive `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObjSenseField(pub ObjSense);

impl Default for ObjSenseField {
    fn default() -> Self {
        ObjSenseField(ObjSense::Minimize)
    }
}

impl MipModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn n_constrs(&self) -> usize {
        self.rows.len() + self.indicators.len()
    }

    /// Number of nonzero coefficients across linear rows.
    pub fn n_nonzeros(&self) -> usize {
        self.rows.iter().map(|r| r.coeffs.len()).sum::<usize>()
            + self.indicators.iter().map(|r| r.coeffs.len()).sum::<usize>()
    }

    pub fn add_var(&mut self, name: &str, lb: f64, ub: f64, vtype: VarType) -> usize {
        let id = self.vars.len();
        self.vars.push(Var {
            name: name.to_string(),
            lb,
            ub,
            vtype,
            obj: 0.0,
        });
        self.name_index.insert(name.to_string(), id);
        id
    }

    pub fn var_by_name(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn var_name(&self, id: usize) -> &str {
        &self.vars[id].name
    }

    pub fn set_var_lb(&mut self, id: usize, lb: f64) {
        self.vars[id].lb = lb;
    }

    pub fn set_var_ub(&mut self, id: usize, ub: f64) {
        self.vars[id].ub = ub;
    }

    pub fn set_obj_sense(&mut self, sense: ObjSense) {
        self.sense = ObjSenseField(sense);
    }

    pub fn set_obj_coeff(&mut self, id: usize, coeff: f64) {
        self.vars[id].obj = coeff;
    }

    /// Clears linear and quadratic objective terms.
    pub fn clear_objective(&mut self) {
        for v in &mut self.vars {
            v.obj = 0.0;
        }
        self.quad.clear();
        self.sense = ObjSenseField(ObjSense::Minimize);
    }

    /// Adds `coeff * x_i * x_j` to the objective expression.
    pub fn add_quad_obj(&mut self, i: usize, j: usize, coeff: f64) {
        if coeff != 0.0 {
            self.quad.push((i, j, coeff));
        }
    }

    pub fn has_quadratic_objective(&self) -> bool {
        !self.quad.is_empty()
    }

    pub fn add_constr(
        &mut self,
        name: &str,
        coeffs: Vec<(usize, f64)>,
        sense: ConstrSense,
        rhs: f64,
    ) -> usize {
        self.rows.push(LinRow {
            name: name.to_string(),
            coeffs,
            sense,
            rhs,
        });
        self.rows.len() - 1
    }

    /// Adds the indicator constraint `bin = 1  =>  coeffs . x <= rhs`.
    pub fn add_indicator(
        &mut self,
        name: &str,
        bin: usize,
        coeffs: Vec<(usize, f64)>,
        rhs: f64,
    ) -> Result<(), MipError> {
        if self.vars[bin].vtype != VarType::Binary {
            return Err(MipError::Model(format!(
                "indicator guard {} is not binary",
                self.vars[bin].name
            )));
        }
        self.indicators.push(IndicatorRow {
            name: name.to_string(),
            bin,
            coeffs,
            rhs,
        });
        Ok(())
    }

    /// Solves the model. The model itself is not mutated, so a cached model
    /// can be optimized repeatedly under different parameter sets.
    pub fn optimize(&self) -> Result<Solution, MipError> {
        crate::branch::optimize(self)
    }

    /// Writes the model in a textual LP-style format for debugging.
    pub fn write_lp(&self, path: &std::path::Path) -> std::io::Result<()> {
        crate::writer::write_lp(self, path)
    }

    /// Writes a solution file next to the model for debugging.
    pub fn write_sol(&self, path: &std::path::Path, sol: &Solution) -> std::io::Result<()> {
        crate::writer::write_sol(self, path, sol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let mut m = MipModel::new();
        let a = m.add_var("x_0", 0.0, f64::INFINITY, VarType::Continuous);
        let b = m.add_var("u_0", 0.0, 1.0, VarType::Binary);
        assert_eq!(m.var_by_name("x_0"), Some(a));
        assert_eq!(m.var_by_name("u_0"), Some(b));
        assert_eq!(m.var_by_name("nope"), None);
    }

    #[test]
    fn indicator_guard_must_be_binary() {
        let mut m = MipModel::new();
        let x = m.add_var("x", 0.0, 1.0, VarType::Continuous);
        assert!(m.add_indicator("bad", x, vec![(x, 1.0)], 0.0).is_err());
    }

    #[test]
    fn clone_is_independent() {
        let mut m = MipModel::new();
        let x = m.add_var("x", 0.0, 10.0, VarType::Continuous);
        let mut copy = m.clone();
        copy.set_var_ub(x, 0.0);
        assert_eq!(m.vars[x].ub, 10.0);
        assert_eq!(copy.vars[x].ub, 0.0);
    }
}
