//! The EPEC orchestrator.
//!
//! An [`Epec`] holds one lower-level [`NashGame`] per leader ("country"),
//! rewrites each as an [`Lcp`], approximates every LCP's feasible region by
//! polyhedra, lifts each approximation into a parametric QP through the
//! convex hull, and searches for an equilibrium of the resulting top-level
//! Nash game by solving its KKT system as a mixed-integer program.
//!
//! Lifecycle: `add_leader`* -> `finalize` -> algorithm (`find_nash_eq`).
//! After `finalize` the object is sealed; `unlock` reopens it for edits.
//!
//! Leader objectives are kept as position-stable templates ([`LeaderObjective`])
//! and materialised against the current variable layout every time the
//! convex-hull sizes change, so cross-country references stay aligned as
//! hull variables come and go.

use crate::algorithms;
use crate::lcp::{Lcp, OuterLcp, PolyLcp};
use crate::nash::NashGame;
use crate::qp::{DummyPosition, QpObjective, QpParam};
use epx_core::{matrix, EpxError, EpxResult, SpMat};
use epx_mip::{ObjSense, VarType};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub use crate::lcp::PolySelection as AddPolyMethod;

/// Solution algorithms of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Algorithm {
    /// Enumerate every polyhedron of every country, solve once.
    FullEnumeration,
    /// Iteratively grow inner approximations from deviations.
    InnerApproximation,
    /// Depth-first search over combinations of single polyhedra.
    CombinatorialPne,
    /// Branch-and-refine over outer approximations.
    OuterApproximation,
}

/// How to recover a pure equilibrium when the inner approximation finds a
/// mixed one first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoverStrategy {
    IncrementalEnumeration,
    Combinatorial,
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpecStatus {
    Uninitialized,
    NashEqFound,
    NashEqNotFound,
    TimeLimit,
    Numerical,
}

/// Tunables threaded through construction — no process-wide flags.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmParams {
    pub algorithm: Algorithm,
    pub recover_strategy: RecoverStrategy,
    pub add_poly_method: AddPolyMethod,
    /// Seed for the random polyhedron selection; `None` derives one from
    /// the clock and problem size.
    pub add_poly_method_seed: Option<u64>,
    /// Number of polyhedra added per country per iteration when sampling.
    pub aggressiveness: u64,
    /// Indicator constraints (default) or big-M rows for complementarities.
    pub indicators: bool,
    pub big_m: f64,
    /// Wall-clock budget in seconds.
    pub time_limit: Option<f64>,
    /// Thread hint forwarded to the backend.
    pub threads: u32,
    /// Insist on a pure-strategy equilibrium.
    pub pure_nash: bool,
    /// Tolerance for the best-response deviation check.
    pub tolerance: f64,
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        AlgorithmParams {
            algorithm: Algorithm::FullEnumeration,
            recover_strategy: RecoverStrategy::IncrementalEnumeration,
            add_poly_method: AddPolyMethod::Sequential,
            add_poly_method_seed: None,
            aggressiveness: 1,
            indicators: true,
            big_m: 1e7,
            time_limit: None,
            threads: 0,
            pure_nash: false,
            tolerance: 1e-4,
        }
    }
}

/// Run-time statistics of the last solve.
#[derive(Debug, Clone, Serialize)]
pub struct EpecStatistics {
    pub status: EpecStatus,
    pub num_var: Option<usize>,
    pub num_constraints: Option<usize>,
    pub num_nonzero: Option<usize>,
    pub num_iterations: usize,
    /// Times an intermediate equilibrium candidate was lost because no
    /// deviation polyhedron could be added.
    pub lost_intermediate_eq: usize,
    pub numerical_issues: bool,
    /// Feasible polyhedra per country at the end of the run.
    pub feasible_polyhedra: Vec<usize>,
    pub wall_clock_time: f64,
    pub pure_nash: bool,
    pub params: AlgorithmParams,
}

impl EpecStatistics {
    fn new(params: AlgorithmParams) -> Self {
        EpecStatistics {
            status: EpecStatus::Uninitialized,
            num_var: None,
            num_constraints: None,
            num_nonzero: None,
            num_iterations: 0,
            lost_intermediate_eq: 0,
            numerical_issues: false,
            feasible_polyhedra: Vec::new(),
            wall_clock_time: 0.0,
            pure_nash: false,
            params,
        }
    }
}

/// The polyhedral flavour a country's LCP is currently carried in.
pub enum PlayerLcp {
    Poly(PolyLcp),
    Outer(OuterLcp),
}

impl PlayerLcp {
    pub fn base(&self) -> &Lcp {
        match self {
            PlayerLcp::Poly(p) => p.base(),
            PlayerLcp::Outer(o) => o.base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut Lcp {
        match self {
            PlayerLcp::Poly(p) => p.base_mut(),
            PlayerLcp::Outer(o) => o.base_mut(),
        }
    }

    /// Polyhedra (or components) currently in the approximation.
    pub fn poly_count(&self) -> usize {
        match self {
            PlayerLcp::Poly(p) => p.n_polyhedra(),
            PlayerLcp::Outer(o) => o.n_components(),
        }
    }

    pub fn feasible_count(&self) -> usize {
        match self {
            PlayerLcp::Poly(p) => p.feasible_count(),
            PlayerLcp::Outer(o) => o.feasible_count(),
        }
    }

    pub fn make_qp(&mut self, obj: QpObjective, qp: &mut QpParam) -> EpxResult<()> {
        match self {
            PlayerLcp::Poly(p) => p.make_qp(obj, qp),
            PlayerLcp::Outer(o) => o.make_qp(obj, qp),
        }
    }

    pub fn as_poly_mut(&mut self) -> EpxResult<&mut PolyLcp> {
        match self {
            PlayerLcp::Poly(p) => Ok(p),
            PlayerLcp::Outer(_) => Err(EpxError::Unprepared(
                "the current algorithm runs on outer approximations".into(),
            )),
        }
    }

    pub fn as_outer_mut(&mut self) -> EpxResult<&mut OuterLcp> {
        match self {
            PlayerLcp::Outer(o) => Ok(o),
            PlayerLcp::Poly(_) => Err(EpxError::Unprepared(
                "the current algorithm runs on inner approximations".into(),
            )),
        }
    }
}

/// Reference into another part of the global variable vector, used by
/// leader-objective templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossRef {
    /// Market-clearing dual (price) of the given country.
    McDual(usize),
    /// Offset within another country's (pre-hull) block.
    Leader { country: usize, offset: usize },
}

/// Position-stable leader objective template. All own offsets address the
/// country's pre-hull block; cross terms address other blocks symbolically.
#[derive(Debug, Clone, Default)]
pub struct LeaderObjective {
    /// `(own offset, coefficient)` linear terms.
    pub linear: Vec<(usize, f64)>,
    /// `(own offset, own offset, coefficient)` bilinear own terms, as
    /// expression coefficients of `y_a * y_b`.
    pub quadratic: Vec<(usize, usize, f64)>,
    /// `(own offset, cross reference, coefficient)` bilinear cross terms.
    pub cross: Vec<(usize, CrossRef, f64)>,
}

/// One market-clearing row: `Σ coeff * x[country block + offset] = rhs`,
/// complemented by its own price variable.
#[derive(Debug, Clone)]
pub struct McRow {
    pub terms: Vec<(usize, usize, f64)>,
    pub rhs: f64,
}

pub struct Epec {
    pub params: AlgorithmParams,
    countries: Vec<NashGame>,
    lead_objectives: Vec<Option<LeaderObjective>>,
    mc_rows: Vec<McRow>,
    mc_qps: Vec<QpParam>,
    pub(crate) player_lcps: Vec<PlayerLcp>,
    country_qps: Vec<Rc<RefCell<QpParam>>>,
    /// Common (padded) pre-hull width of every country block.
    width: usize,
    /// Country block sizes in the current hull-extended layout.
    hull_sizes: Vec<usize>,
    finalized: bool,
    pub(crate) nash_eq: bool,
    upper_lcp: Option<Lcp>,
    pub(crate) sol_x: Vec<f64>,
    pub(crate) sol_z: Vec<f64>,
    pub stats: EpecStatistics,
    pub(crate) init_time: Option<Instant>,
}

impl Epec {
    pub fn new(params: AlgorithmParams) -> Self {
        let stats = EpecStatistics::new(params.clone());
        Epec {
            params,
            countries: Vec::new(),
            lead_objectives: Vec::new(),
            mc_rows: Vec::new(),
            mc_qps: Vec::new(),
            player_lcps: Vec::new(),
            country_qps: Vec::new(),
            width: 0,
            hull_sizes: Vec::new(),
            finalized: false,
            nash_eq: false,
            upper_lcp: None,
            sol_x: Vec::new(),
            sol_z: Vec::new(),
            stats,
            init_time: None,
        }
    }

    pub fn n_countries(&self) -> usize {
        self.countries.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn nash_eq_found(&self) -> bool {
        self.nash_eq
    }

    pub fn solution_x(&self) -> &[f64] {
        &self.sol_x
    }

    pub fn solution_z(&self) -> &[f64] {
        &self.sol_z
    }

    /// Common pre-hull width of every country block after `finalize`.
    pub fn block_width(&self) -> usize {
        self.width
    }

    /// The market-clearing parametric QP built for country `i` at finalize.
    pub fn market_clearing_qp(&self, i: usize) -> EpxResult<&QpParam> {
        self.mc_qps.get(i).ok_or_else(|| {
            EpxError::Unprepared("market-clearing QPs exist only after finalize".into())
        })
    }

    /// Registers a country's lower-level game. Only before `finalize`.
    pub fn add_leader(&mut self, game: NashGame) -> EpxResult<usize> {
        if self.finalized {
            return Err(EpxError::Unprepared(
                "the EPEC is finalized; call unlock() before editing".into(),
            ));
        }
        self.countries.push(game);
        self.lead_objectives.push(None);
        Ok(self.countries.len() - 1)
    }

    /// Mutable access to a country's game during the build phase.
    pub fn country_mut(&mut self, i: usize) -> EpxResult<&mut NashGame> {
        if self.finalized {
            return Err(EpxError::Unprepared(
                "the EPEC is finalized; call unlock() before editing".into(),
            ));
        }
        self.countries
            .get_mut(i)
            .ok_or_else(|| EpxError::Validation(format!("no country {i}")))
    }

    pub fn country(&self, i: usize) -> &NashGame {
        &self.countries[i]
    }

    pub fn set_leader_objective(&mut self, i: usize, obj: LeaderObjective) -> EpxResult<()> {
        if self.finalized {
            return Err(EpxError::Unprepared(
                "the EPEC is finalized; call unlock() before editing".into(),
            ));
        }
        self.lead_objectives[i] = Some(obj);
        Ok(())
    }

    pub fn set_market_clearing(&mut self, rows: Vec<McRow>) -> EpxResult<()> {
        if self.finalized {
            return Err(EpxError::Unprepared(
                "the EPEC is finalized; call unlock() before editing".into(),
            ));
        }
        self.mc_rows = rows;
        Ok(())
    }

    pub(crate) fn n_mc(&self) -> usize {
        self.mc_rows.len()
    }

    /// Seals the build phase:
    ///
    /// 1. records every country's variable count,
    /// 2. pads every country's game with zero columns so each sees all
    ///    other countries' variables (and the market-clearing duals) as
    ///    parameters — afterwards every block has the same width,
    /// 3. constructs the per-country market-clearing parametric QPs,
    /// 4. checks that every country carries an objective template.
    pub fn finalize(&mut self) -> EpxResult<()> {
        if self.finalized {
            warn!("finalize called on an already finalized EPEC");
            return Ok(());
        }
        if self.countries.is_empty() {
            return Err(EpxError::Unprepared("no countries have been added".into()));
        }
        for (i, obj) in self.lead_objectives.iter().enumerate() {
            if obj.is_none() {
                return Err(EpxError::Unprepared(format!(
                    "country {i} has no leader objective"
                )));
            }
        }
        let sizes: Vec<usize> = self.countries.iter().map(|g| g.n_vars()).collect();
        let width = sizes.iter().sum::<usize>() + self.n_mc();
        for (i, game) in self.countries.iter_mut().enumerate() {
            let pad = width - sizes[i];
            if pad > 0 {
                game.add_dummy(pad, DummyPosition::Append)?;
            }
            debug_assert_eq!(game.n_vars(), width);
            debug!(country = i, pad, width, "padded country block");
        }
        self.width = width;
        self.hull_sizes = vec![width; self.countries.len()];
        self.make_mc_qps()?;
        self.stats.feasible_polyhedra = vec![0; self.countries.len()];
        self.finalized = true;
        Ok(())
    }

    /// Re-enables mutation after `finalize`.
    pub fn unlock(&mut self) -> &mut Self {
        self.finalized = false;
        self.player_lcps.clear();
        self.country_qps.clear();
        self.mc_qps.clear();
        self.upper_lcp = None;
        self.nash_eq = false;
        self
    }

    /// One tiny parametric QP per market-clearing row: the price variable
    /// against the linear clearing expression, whose KKT reproduces the
    /// clearing complementarity.
    fn make_mc_qps(&mut self) -> EpxResult<()> {
        self.mc_qps.clear();
        let n = self.countries.len();
        let nx = n * self.width + self.n_mc() - 1;
        for row in &self.mc_rows {
            let mut tri = sprs::TriMat::new((1, nx));
            for &(country, offset, coeff) in &row.terms {
                tri.add_triplet(0, country * self.width + offset, coeff);
            }
            let mut qp = QpParam::new();
            qp.set(
                matrix::zeros(1, 1),
                tri.to_csr(),
                matrix::zeros(0, nx),
                matrix::zeros(0, 1),
                vec![0.0],
                vec![],
            )?;
            self.mc_qps.push(qp);
        }
        Ok(())
    }

    /// Start of country `i`'s block in the global vector.
    pub fn leader_location(&self, i: usize) -> usize {
        self.hull_sizes[..i].iter().sum()
    }

    /// Size of country `i`'s block in the current layout.
    pub fn block_size(&self, i: usize) -> usize {
        self.hull_sizes[i]
    }

    fn primal_total(&self) -> usize {
        self.hull_sizes.iter().sum()
    }

    /// Rebuilds each country's convex-hull QP from its current polyhedral
    /// approximation and refreshes the global layout.
    pub fn make_players_qps(&mut self) -> EpxResult<()> {
        if !self.finalized {
            return Err(EpxError::Unprepared("finalize the EPEC first".into()));
        }
        if self.player_lcps.len() != self.countries.len() {
            return Err(EpxError::Unprepared(
                "the player LCPs have not been initialised by an algorithm".into(),
            ));
        }
        let n = self.countries.len();
        // Pass 1: future block sizes, from the polyhedron counts alone.
        let w = self.width;
        for i in 0..n {
            let p = self.player_lcps[i].poly_count();
            if p == 0 {
                return Err(EpxError::Unprepared(format!(
                    "country {i} has no polyhedron in its approximation"
                )));
            }
            self.hull_sizes[i] = if p <= 1 { w } else { w * (1 + p) + p };
        }
        // Pass 2: materialise objectives over the new layout and rebuild
        // each QP around its convex hull.
        if self.country_qps.len() != n {
            self.country_qps = (0..n)
                .map(|_| Rc::new(RefCell::new(QpParam::new())))
                .collect();
        }
        for i in 0..n {
            let obj = self.materialize_objective(i)?;
            let qp = Rc::clone(&self.country_qps[i]);
            self.player_lcps[i].make_qp(obj, &mut qp.borrow_mut())?;
            debug_assert_eq!(qp.borrow().ny(), self.hull_sizes[i]);
            self.stats.feasible_polyhedra[i] = self.player_lcps[i].feasible_count();
        }
        debug!(
            total_vars = self.primal_total() + self.n_mc(),
            "players' convex-hull QPs rebuilt"
        );
        Ok(())
    }

    /// Parameter-space index of a cross reference, seen from country `i`.
    fn param_index(&self, i: usize, cross: CrossRef) -> usize {
        match cross {
            CrossRef::McDual(k) => self.primal_total() - self.hull_sizes[i] + k,
            CrossRef::Leader { country, offset } => {
                let mut base = 0;
                for j in 0..country {
                    if j != i {
                        base += self.hull_sizes[j];
                    }
                }
                base + offset
            }
        }
    }

    /// Materialises country `i`'s objective template over its pre-hull rows
    /// and the current parameter layout.
    fn materialize_objective(&self, i: usize) -> EpxResult<QpObjective> {
        let template = self.lead_objectives[i]
            .as_ref()
            .ok_or_else(|| EpxError::Unprepared(format!("country {i} has no objective")))?;
        let w = self.width;
        let nx = self.primal_total() - self.hull_sizes[i] + self.n_mc();
        let mut c = vec![0.0; w];
        for &(off, v) in &template.linear {
            c[off] += v;
        }
        let mut q_tri = sprs::TriMat::new((w, w));
        for &(a, b, v) in &template.quadratic {
            if a == b {
                q_tri.add_triplet(a, a, 2.0 * v);
            } else {
                q_tri.add_triplet(a, b, v);
                q_tri.add_triplet(b, a, v);
            }
        }
        let mut c_tri = sprs::TriMat::new((w, nx));
        for &(off, cross, v) in &template.cross {
            c_tri.add_triplet(off, self.param_index(i, cross), v);
        }
        Ok(QpObjective {
            q: q_tri.to_csr(),
            c_x: c_tri.to_csr(),
            c,
        })
    }

    /// Remaining wall-clock budget, if a limit is set.
    pub fn remaining_time(&self) -> Option<f64> {
        match (self.params.time_limit, self.init_time) {
            (Some(limit), Some(t0)) => Some(limit - t0.elapsed().as_secs_f64()),
            (Some(limit), None) => Some(limit),
            _ => None,
        }
    }

    /// True when the wall-clock budget has expired.
    pub fn out_of_time(&self) -> bool {
        matches!(self.remaining_time(), Some(t) if t <= 0.0)
    }

    /// Builds the upper-level Nash game and solves its LCP as a MIP.
    ///
    /// With `pure` the model carries one binary per convex weight
    /// (indicator: weight forced to zero) and maximises the number of
    /// zeroed weights, steering the search toward pure strategies.
    ///
    /// Returns whether a solution was extracted; the solution vectors and
    /// model statistics are stored on success.
    pub fn compute_nash_eq(&mut self, pure: bool) -> EpxResult<bool> {
        let n = self.countries.len();
        let n_mc = self.n_mc();
        let primal_total = self.primal_total();
        let width = primal_total + n_mc;
        let mut tri = sprs::TriMat::new((self.mc_rows.len(), width));
        for (r, row) in self.mc_rows.iter().enumerate() {
            for &(country, offset, coeff) in &row.terms {
                tri.add_triplet(r, self.leader_location(country) + offset, coeff);
            }
        }
        let mc: SpMat = tri.to_csr();
        let mc_rhs: Vec<f64> = self.mc_rows.iter().map(|r| r.rhs).collect();

        let game = NashGame::new(
            self.country_qps.clone(),
            mc,
            mc_rhs,
            0,
            matrix::zeros(0, 0),
            vec![],
        )?;
        let mut lcp = Lcp::from_nash(&game)?;
        lcp.use_indicators = self.params.indicators;
        lcp.big_m = self.params.big_m;
        let mut model = lcp.as_mip()?;
        if pure {
            let mut push_bins = Vec::new();
            for i in 0..n {
                let count = self.player_lcps[i].poly_count();
                if count <= 1 {
                    continue;
                }
                let block = self.leader_location(i);
                for k in 0..count {
                    let weight = match &self.player_lcps[i] {
                        PlayerLcp::Poly(p) => p.conv_poly_weight(k),
                        PlayerLcp::Outer(_) => self.width * (1 + count) + k,
                    };
                    let pos = block + weight;
                    let bin = model.add_var(
                        &format!("pure_{i}_{k}"),
                        0.0,
                        1.0,
                        VarType::Binary,
                    );
                    model
                        .add_indicator(
                            &format!("pure_ind_{i}_{k}"),
                            bin,
                            vec![(lcp.x_var(pos), 1.0)],
                            0.0,
                        )
                        .map_err(EpxError::from)?;
                    push_bins.push(bin);
                }
            }
            if !push_bins.is_empty() {
                model.clear_objective();
                model.set_obj_sense(ObjSense::Maximize);
                for bin in push_bins {
                    model.set_obj_coeff(bin, 1.0);
                }
                model.params.solution_limit = None;
            }
        }
        model.params.threads = self.params.threads;
        model.params.time_limit = self.remaining_time();

        self.stats.num_var = Some(model.n_vars());
        self.stats.num_constraints = Some(model.n_constrs());
        self.stats.num_nonzero = Some(model.n_nonzeros());

        let sol = model.optimize().map_err(EpxError::from)?;
        self.nash_eq = match lcp.extract(&sol) {
            Some((x, z)) => {
                self.sol_x = x;
                self.sol_z = z;
                true
            }
            None => false,
        };
        if matches!(sol.status, epx_mip::SolveStatus::TimeLimit) && !self.nash_eq {
            info!("upper-level solve hit the time limit");
        }
        self.upper_lcp = Some(lcp);
        Ok(self.nash_eq)
    }

    /// The upper-level LCP of the last `compute_nash_eq` call.
    pub fn upper_lcp(&self) -> Option<&Lcp> {
        self.upper_lcp.as_ref()
    }

    /// A zero profile sized for the current layout — the deviation target
    /// before any solve has produced a candidate.
    pub(crate) fn zero_profile(&self) -> Vec<f64> {
        vec![0.0; self.primal_total() + self.n_mc()]
    }

    /// Country `i`'s full block from the last solution.
    pub fn x_of_i(&self, i: usize) -> &[f64] {
        let start = self.leader_location(i);
        &self.sol_x[start..start + self.hull_sizes[i]]
    }

    /// Country `i`'s pre-hull variables from the last solution — the point
    /// in the country's own LCP space.
    pub fn x_without_hull(&self, i: usize) -> &[f64] {
        let start = self.leader_location(i);
        &self.sol_x[start..start + self.width]
    }

    /// Everything country `i` is parametrized by: the other blocks, then
    /// the market-clearing duals.
    pub fn x_minus_i(&self, i: usize, x: &[f64]) -> Vec<f64> {
        let n = self.countries.len();
        let mut out = Vec::with_capacity(self.primal_total() - self.hull_sizes[i] + self.n_mc());
        for j in 0..n {
            if j == i {
                continue;
            }
            let start = self.leader_location(j);
            out.extend_from_slice(&x[start..start + self.hull_sizes[j]]);
        }
        let mc_start = self.primal_total();
        out.extend_from_slice(&x[mc_start..mc_start + self.n_mc()]);
        out
    }

    /// Market-clearing dual (price) of country `i` in the last solution.
    pub fn mc_dual_value(&self, i: usize) -> f64 {
        self.sol_x[self.primal_total() + i]
    }

    /// Best-response model of country `i` against the profile `x`: its
    /// leader objective optimized over its *true* LCP feasible region.
    pub fn respond(&mut self, i: usize, x: &[f64]) -> EpxResult<epx_mip::MipModel> {
        let x_minus = self.x_minus_i(i, x);
        let obj = self.materialize_objective(i)?;
        let mut model = self.player_lcps[i].base_mut().mpec_as_miqp(
            &obj.q,
            &obj.c_x,
            &obj.c,
            &x_minus,
        )?;
        model.params.time_limit = self.remaining_time();
        model.params.threads = self.params.threads;
        Ok(model)
    }

    /// Solves the best response of country `i`; returns the objective value
    /// and the responding point in the country's LCP space, or `None` when
    /// the country's problem is infeasible.
    pub fn respond_sol(&mut self, i: usize, x: &[f64]) -> EpxResult<Option<(f64, Vec<f64>)>> {
        let model = self.respond(i, x)?;
        let sol = model.optimize().map_err(EpxError::from)?;
        if !sol.is_success() {
            return Ok(None);
        }
        let dev = sol.x[..self.width].to_vec();
        Ok(Some((sol.objective, dev)))
    }

    /// Whether the stored solution is an equilibrium within `tol`: no
    /// country can improve its objective by more than `tol` through a best
    /// response. On failure returns the first deviating country and its
    /// deviation point.
    pub fn is_solved(&mut self, tol: f64) -> EpxResult<(bool, Option<(usize, Vec<f64>)>)> {
        if !self.nash_eq {
            return Ok((false, None));
        }
        let sol_x = self.sol_x.clone();
        for i in 0..self.countries.len() {
            // An outer approximation can hand back a candidate outside the
            // true region; such a profile is never an equilibrium. Inner
            // hull mixtures are true mixed strategies and stay exempt.
            if matches!(self.player_lcps[i], PlayerLcp::Outer(_)) {
                let base = self.player_lcps[i].base();
                let x = self.x_without_hull(i);
                let z = base.z_from_x(x)?;
                let viol_tol = tol.max(base.eps);
                for &(eq, var) in base.compl() {
                    if x[var] > viol_tol && z[eq] > viol_tol {
                        debug!(country = i, eq, "candidate violates complementarity");
                        return Ok((false, Some((i, Vec::new()))));
                    }
                }
            }
            let obj = self.materialize_objective(i)?;
            let x_minus = self.x_minus_i(i, &sol_x);
            let y = self.x_without_hull(i).to_vec();
            let current = evaluate_objective(&obj, &y, &x_minus)?;
            match self.respond_sol(i, &sol_x)? {
                None => {
                    warn!(country = i, "best response is infeasible");
                    return Ok((false, Some((i, Vec::new()))));
                }
                Some((best, dev)) => {
                    if current - best > tol {
                        debug!(country = i, current, best, "profitable deviation found");
                        return Ok((false, Some((i, dev))));
                    }
                }
            }
        }
        Ok((true, None))
    }

    /// Position of the convex weight of polyhedron `k` of country `i` in
    /// the global vector.
    pub fn probability_position(&self, i: usize, k: usize) -> EpxResult<usize> {
        let count = self.player_lcps[i].poly_count();
        if k >= count {
            return Err(EpxError::Validation(format!(
                "country {i} has {count} polyhedra, no index {k}"
            )));
        }
        if count <= 1 {
            return Err(EpxError::Unprepared(
                "a single-polyhedron approximation has no weight variables".into(),
            ));
        }
        Ok(self.leader_location(i) + self.width * (1 + count) + k)
    }

    /// Convex weight of polyhedron `k` of country `i` in the last solution
    /// (1.0 for a single-polyhedron approximation).
    pub fn probability_value(&self, i: usize, k: usize) -> EpxResult<f64> {
        if self.player_lcps[i].poly_count() <= 1 {
            return Ok(1.0);
        }
        Ok(self.sol_x[self.probability_position(i, k)?])
    }

    /// Whether country `i` plays a single polyhedron in the last solution.
    pub fn is_pure_strategy_for(&self, i: usize, tol: f64) -> EpxResult<bool> {
        let count = self.player_lcps[i].poly_count();
        if count <= 1 {
            return Ok(true);
        }
        for k in 0..count {
            if self.probability_value(i, k)? > 1.0 - tol {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether every country plays a pure strategy in the last solution.
    pub fn is_pure_strategy(&self, tol: f64) -> EpxResult<bool> {
        for i in 0..self.countries.len() {
            if !self.is_pure_strategy_for(i, tol)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Polyhedra of country `i` carrying weight above `tol`.
    pub fn mixed_strategy_polyhedra(&self, i: usize, tol: f64) -> EpxResult<Vec<usize>> {
        let count = self.player_lcps[i].poly_count();
        let mut out = Vec::new();
        for k in 0..count {
            if self.probability_value(i, k)? > tol {
                out.push(k);
            }
        }
        Ok(out)
    }

    /// Rebuilds the per-country LCPs in the flavour an algorithm needs.
    fn init_player_lcps(&mut self) -> EpxResult<()> {
        let mut lcps = Vec::with_capacity(self.countries.len());
        for game in &self.countries {
            let mut lcp = Lcp::from_nash(game)?;
            lcp.use_indicators = self.params.indicators;
            lcp.big_m = self.params.big_m;
            match self.params.algorithm {
                Algorithm::OuterApproximation => {
                    lcps.push(PlayerLcp::Outer(OuterLcp::new(lcp)?));
                }
                _ => {
                    let mut poly = PolyLcp::new(lcp);
                    poly.seed = self.params.add_poly_method_seed;
                    lcps.push(PlayerLcp::Poly(poly));
                }
            }
        }
        self.player_lcps = lcps;
        self.hull_sizes = vec![self.width; self.countries.len()];
        Ok(())
    }

    /// Runs the configured algorithm until an equilibrium is found, proved
    /// absent, or the budget expires. The outcome lands in `stats`.
    pub fn find_nash_eq(&mut self) -> EpxResult<EpecStatus> {
        if !self.finalized {
            return Err(EpxError::Unprepared("finalize the EPEC first".into()));
        }
        self.stats = EpecStatistics::new(self.params.clone());
        self.stats.feasible_polyhedra = vec![0; self.countries.len()];
        self.nash_eq = false;
        self.init_time = Some(Instant::now());
        self.init_player_lcps()?;

        info!(
            algorithm = ?self.params.algorithm,
            countries = self.countries.len(),
            "starting the equilibrium search"
        );
        let result = match self.params.algorithm {
            Algorithm::FullEnumeration => algorithms::full_enumeration::solve(self),
            Algorithm::InnerApproximation => algorithms::inner_approximation::solve(self),
            Algorithm::CombinatorialPne => algorithms::combinatorial_pne::solve(self, &[]),
            Algorithm::OuterApproximation => algorithms::outer_approximation::solve(self),
        };
        self.stats.wall_clock_time = self
            .init_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        result?;
        info!(status = ?self.stats.status, time = self.stats.wall_clock_time, "search finished");
        Ok(self.stats.status)
    }
}

/// Evaluates a materialised leader objective at `(y, x)`.
fn evaluate_objective(obj: &QpObjective, y: &[f64], x: &[f64]) -> EpxResult<f64> {
    let qy = matrix::mul_vec(&obj.q, y)?;
    let cx = matrix::mul_vec(&obj.c_x, x)?;
    let mut val = 0.0;
    for i in 0..y.len() {
        val += 0.5 * y[i] * qy[i] + (obj.c[i] + cx[i]) * y[i];
    }
    Ok(val)
}
