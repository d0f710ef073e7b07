//! Country assembly and the market driver.
//!
//! Within one country the followers play Nash-Cournot: follower `j` solves
//!
//! ```text
//! min (1/2)(quad_j + 2 beta) q_j^2 + (lin_j - alpha) q_j
//!     + [beta (q_{-j} + imp - exp) + tax_j] q_j      s.t. q_j <= capacity_j
//! ```
//!
//! where the tax coefficient follows the country's paradigm. The government
//! owns net import, net export, the per-partner import quantities and the
//! tax variables, constrained by tax caps, trade limits, the production
//! balance (exports cannot exceed production plus imports) and an optional
//! price cap. Its objective carries emission costs, transport costs, import
//! price payments and export price revenue (and optionally the bilinear tax
//! revenue).
//!
//! Countries are wired together by trade balance (a country's imports from
//! its partners sum to its net import) and by market clearing (whatever `i`
//! exports is exactly what the others import from `i`), the latter priced
//! by the market-clearing duals.

use crate::params::{CountryParams, TaxParadigm};
use epx_core::{matrix, EpxError, EpxResult, SpMat};
use epx_game::{
    AlgorithmParams, CrossRef, DummyPosition, Epec, EpecStatistics, EpecStatus, LeaderObjective,
    McRow, NashGame, QpParam,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};

/// Variable blocks of a country, in block order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderVar {
    FollowerStart,
    NetImport,
    NetExport,
    CountryImport,
    Tax,
    DualVar,
    End,
}

/// The energy-market EPEC: build with `add_country` /
/// `add_transport_costs`, seal with `finalize`, solve with `find_nash_eq`.
pub struct MarketEpec {
    epec: Epec,
    countries: Vec<CountryParams>,
    transport: SpMat,
    name_index: HashMap<String, usize>,
    /// For country `i`, the ordered list of exporters it imports from.
    import_sources: Vec<Vec<usize>>,
    /// For country `i`, the countries importing from it.
    export_targets: Vec<Vec<usize>>,
    finalized: bool,
}

impl MarketEpec {
    pub fn new(params: AlgorithmParams) -> Self {
        MarketEpec {
            epec: Epec::new(params),
            countries: Vec::new(),
            transport: matrix::zeros(0, 0),
            name_index: HashMap::new(),
            import_sources: Vec::new(),
            export_targets: Vec::new(),
            finalized: false,
        }
    }

    /// Builds and finalizes a market from a loaded instance.
    pub fn from_instance(
        instance: &crate::instance::EpecInstance,
        params: AlgorithmParams,
    ) -> EpxResult<Self> {
        instance.validate()?;
        let mut market = MarketEpec::new(params);
        for country in &instance.countries {
            market.add_country(country.clone())?;
        }
        market.add_transport_costs(instance.transport_costs.clone())?;
        market.finalize()?;
        Ok(market)
    }

    pub fn params(&self) -> &AlgorithmParams {
        &self.epec.params
    }

    pub fn params_mut(&mut self) -> &mut AlgorithmParams {
        &mut self.epec.params
    }

    pub fn n_countries(&self) -> usize {
        self.countries.len()
    }

    pub fn country_params(&self, i: usize) -> &CountryParams {
        &self.countries[i]
    }

    pub fn country_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn statistics(&self) -> &EpecStatistics {
        &self.epec.stats
    }

    /// Adds a country's Stackelberg game from its parameters.
    pub fn add_country(&mut self, params: CountryParams) -> EpxResult<usize> {
        if self.finalized {
            return Err(EpxError::Unprepared(
                "the market is finalized; no further countries can be added".into(),
            ));
        }
        params.validate()?;
        if self.name_index.contains_key(&params.name) {
            return Err(EpxError::Validation(format!(
                "country name {} already used",
                params.name
            )));
        }
        let game = build_country_game(&params)?;
        let index = self.epec.add_leader(game)?;
        self.name_index.insert(params.name.clone(), index);
        self.countries.push(params);
        info!(country = index, "added country");
        Ok(index)
    }

    /// Sets the inter-country transportation cost matrix. Entry `(i, j)` is
    /// the unit cost of shipping from `i` to `j`; a structural zero means
    /// no trade channel. The diagonal is dropped.
    pub fn add_transport_costs(&mut self, costs: SpMat) -> EpxResult<&mut Self> {
        if self.finalized {
            return Err(EpxError::Unprepared("the market is finalized".into()));
        }
        let n = self.countries.len();
        if costs.rows() != n || costs.cols() != n {
            return Err(EpxError::Validation(format!(
                "transportation matrix is {}x{} for {n} countries",
                costs.rows(),
                costs.cols()
            )));
        }
        let mut tri = sprs::TriMat::new((n, n));
        for (&v, (r, c)) in costs.iter() {
            if r != c && v != 0.0 {
                tri.add_triplet(r, c, v);
            }
        }
        self.transport = tri.to_csr();
        Ok(self)
    }

    /// Seals the market:
    ///
    /// - splices each country's per-partner import variables in and adds
    ///   its trade-balance rows (a country without a partner gets imports
    ///   and exports pinned to zero instead, and no trade terms in its
    ///   objective),
    /// - registers the leader objective templates and market clearing,
    /// - finalizes the underlying engine.
    pub fn finalize(&mut self) -> EpxResult<()> {
        if self.finalized {
            return Ok(());
        }
        let n = self.countries.len();
        if n == 0 {
            return Err(EpxError::Unprepared("no countries have been added".into()));
        }
        if self.transport.rows() != n {
            self.transport = matrix::zeros(n, n);
        }
        self.import_sources = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| matrix::get(&self.transport, j, i) != 0.0)
                    .collect()
            })
            .collect();
        self.export_targets = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| matrix::get(&self.transport, i, j) != 0.0)
                    .collect()
            })
            .collect();

        for i in 0..n {
            self.add_trade_balance(i)?;
        }
        for i in 0..n {
            let objective = self.make_leader_objective(i);
            self.epec.set_leader_objective(i, objective)?;
        }
        let mc = self.make_market_clearing();
        self.epec.set_market_clearing(mc)?;
        self.epec.finalize()?;
        self.finalized = true;
        Ok(())
    }

    /// Country `i`'s trade-balance constraints, splicing in one import
    /// variable per partner.
    fn add_trade_balance(&mut self, i: usize) -> EpxResult<()> {
        let n_foll = self.countries[i].n_followers();
        let tax_vars = self.tax_vars(i);
        let n_imp = self.import_sources[i].len();
        let exports = !self.export_targets[i].is_empty();
        let game = self.epec.country_mut(i)?;
        if n_imp > 0 {
            game.add_dummy(n_imp, DummyPosition::At(n_foll + 2))?;
            let width = n_foll + 2 + n_imp + tax_vars;
            let mut a = vec![0.0; width];
            a[n_foll] = -1.0; // net import
            for k in 0..n_imp {
                a[n_foll + 2 + k] = 1.0;
            }
            let minus: Vec<f64> = a.iter().map(|v| -v).collect();
            game.add_lead_cons(&a, 0.0)?;
            game.add_lead_cons(&minus, 0.0)?;
            debug!(country = i, n_imp, "added trade balance");
        } else {
            let width = n_foll + 2 + tax_vars;
            let mut a = vec![0.0; width];
            a[n_foll] = 1.0;
            game.add_lead_cons(&a, 0.0)?;
            debug!(country = i, "no import market: net import pinned to zero");
        }
        if !exports {
            let width = n_foll + 2 + n_imp + tax_vars;
            let mut a = vec![0.0; width];
            a[n_foll + 1] = 1.0;
            self.epec.country_mut(i)?.add_lead_cons(&a, 0.0)?;
            debug!(country = i, "no export market: net export pinned to zero");
        }
        Ok(())
    }

    fn tax_vars(&self, i: usize) -> usize {
        self.countries[i]
            .leader
            .tax_paradigm
            .tax_vars(self.countries[i].n_followers())
    }

    /// Offset of a variable block inside country `i`'s (pre-hull) block.
    pub fn offset(&self, i: usize, var: LeaderVar) -> usize {
        let n = self.countries[i].n_followers();
        let n_imp = self
            .import_sources
            .get(i)
            .map(|s| s.len())
            .unwrap_or(0);
        let tax_vars = self.tax_vars(i);
        match var {
            LeaderVar::FollowerStart => 0,
            LeaderVar::NetImport => n,
            LeaderVar::NetExport => n + 1,
            LeaderVar::CountryImport => n + 2,
            LeaderVar::Tax => n + 2 + n_imp,
            // Once the engine pads the block to the common width, the dual
            // variables sit at its very end, after the padding.
            LeaderVar::DualVar => {
                let duals: usize = self.countries[i]
                    .followers
                    .capacities
                    .iter()
                    .filter(|&&c| c >= 0.0)
                    .count();
                if self.finalized {
                    self.epec.block_width() - duals
                } else {
                    n + 2 + n_imp + tax_vars
                }
            }
            LeaderVar::End => {
                if self.finalized {
                    self.epec.block_width()
                } else {
                    let duals: usize = self.countries[i]
                        .followers
                        .capacities
                        .iter()
                        .filter(|&&c| c >= 0.0)
                        .count();
                    n + 2 + n_imp + tax_vars + duals
                }
            }
        }
    }

    /// Global position of a country's variable in the solution vector.
    pub fn position(&self, i: usize, var: LeaderVar) -> usize {
        self.epec.leader_location(i) + self.offset(i, var)
    }

    fn make_leader_objective(&self, i: usize) -> LeaderObjective {
        let params = &self.countries[i];
        let n = params.n_followers();
        let mut objective = LeaderObjective::default();
        for (j, &e) in params.followers.emission_costs.iter().enumerate() {
            objective.linear.push((j, e));
        }
        let exp_off = self.offset(i, LeaderVar::NetExport);
        let imp_off = self.offset(i, LeaderVar::CountryImport);
        if !self.export_targets[i].is_empty() {
            // export revenue at the own market-clearing price
            objective.cross.push((exp_off, CrossRef::McDual(i), -1.0));
        }
        for (idx, &j) in self.import_sources[i].iter().enumerate() {
            // transport cost plus the exporter's price per imported unit
            objective
                .linear
                .push((imp_off + idx, matrix::get(&self.transport, j, i)));
            objective
                .cross
                .push((imp_off + idx, CrossRef::McDual(j), 1.0));
        }
        if params.leader.tax_revenue {
            let tax_off = self.offset(i, LeaderVar::Tax);
            match params.leader.tax_paradigm {
                TaxParadigm::Standard => {
                    for j in 0..n {
                        objective.quadratic.push((j, tax_off + j, -1.0));
                    }
                }
                TaxParadigm::Single => {
                    for j in 0..n {
                        objective.quadratic.push((j, tax_off, -1.0));
                    }
                }
                TaxParadigm::Carbon => {
                    for (j, &e) in params.followers.emission_costs.iter().enumerate() {
                        objective.quadratic.push((j, tax_off, -e));
                    }
                }
            }
        }
        objective
    }

    /// Market clearing: what country `i` exports is what the others import
    /// from `i`. Only meaningful with at least two countries.
    fn make_market_clearing(&self) -> Vec<McRow> {
        let n = self.countries.len();
        if n <= 1 {
            return Vec::new();
        }
        (0..n)
            .map(|i| {
                let mut terms = vec![(i, self.offset(i, LeaderVar::NetExport), 1.0)];
                for &j in &self.export_targets[i] {
                    let idx = self.import_sources[j]
                        .iter()
                        .position(|&s| s == i)
                        .expect("export target must list the source");
                    terms.push((j, self.offset(j, LeaderVar::CountryImport) + idx, -1.0));
                }
                McRow { terms, rhs: 0.0 }
            })
            .collect()
    }

    /// Runs the configured algorithm.
    pub fn find_nash_eq(&mut self) -> EpxResult<EpecStatus> {
        if !self.finalized {
            return Err(EpxError::Unprepared("finalize the market first".into()));
        }
        self.epec.find_nash_eq()
    }

    /// Post-solve self-verification: every country within `tol` of its best
    /// response.
    pub fn is_solved(&mut self, tol: f64) -> EpxResult<bool> {
        Ok(self.epec.is_solved(tol)?.0)
    }

    pub fn status(&self) -> EpecStatus {
        self.epec.stats.status
    }

    pub fn solution_value(&self, position: usize) -> f64 {
        self.epec.solution_x()[position]
    }

    pub fn follower_production(&self, i: usize, j: usize) -> f64 {
        self.solution_value(self.position(i, LeaderVar::FollowerStart) + j)
    }

    /// Effective tax rate on follower `j`, resolving the paradigm.
    pub fn follower_tax(&self, i: usize, j: usize) -> f64 {
        let tax_pos = self.position(i, LeaderVar::Tax);
        match self.countries[i].leader.tax_paradigm {
            TaxParadigm::Standard => self.solution_value(tax_pos + j),
            TaxParadigm::Single => self.solution_value(tax_pos),
            TaxParadigm::Carbon => {
                self.solution_value(tax_pos) * self.countries[i].followers.emission_costs[j]
            }
        }
    }

    pub fn net_import(&self, i: usize) -> f64 {
        self.solution_value(self.position(i, LeaderVar::NetImport))
    }

    pub fn net_export(&self, i: usize) -> f64 {
        self.solution_value(self.position(i, LeaderVar::NetExport))
    }

    /// Import of country `i` from its `idx`-th partner.
    pub fn country_import(&self, i: usize, idx: usize) -> f64 {
        self.solution_value(self.position(i, LeaderVar::CountryImport) + idx)
    }

    pub fn import_sources(&self, i: usize) -> &[usize] {
        &self.import_sources[i]
    }

    pub fn domestic_production(&self, i: usize) -> f64 {
        (0..self.countries[i].n_followers())
            .map(|j| self.follower_production(i, j))
            .sum()
    }

    pub fn domestic_price(&self, i: usize) -> f64 {
        let d = &self.countries[i].demand;
        let consumed = self.domestic_production(i) + self.net_import(i) - self.net_export(i);
        d.alpha - d.beta * consumed
    }

    /// Market-clearing (export) price of country `i`.
    pub fn export_price(&self, i: usize) -> f64 {
        if self.n_countries() <= 1 {
            return 0.0;
        }
        self.epec.mc_dual_value(i)
    }

    pub fn transport_costs(&self) -> &SpMat {
        &self.transport
    }

    /// The market-clearing parametric QP of country `i` (available after
    /// finalize, one per clearing row).
    pub fn market_clearing_qp(&self, i: usize) -> EpxResult<&QpParam> {
        self.epec.market_clearing_qp(i)
    }

    pub(crate) fn engine(&self) -> &Epec {
        &self.epec
    }
}

/// The lower-level Nash game of one country: follower QPs plus the leader
/// constraint block (tax caps, production balance, trade limits, price
/// cap). Import variables and trade balance arrive at finalize.
fn build_country_game(params: &CountryParams) -> EpxResult<NashGame> {
    let n = params.n_followers();
    let tax_vars = params.leader.tax_paradigm.tax_vars(n);
    let beta = params.demand.beta;
    let alpha = params.demand.alpha;
    let x_width = (n - 1) + 2 + tax_vars;

    let mut players = Vec::with_capacity(n);
    for j in 0..n {
        let mut c_tri = sprs::TriMat::new((1, x_width));
        for k in 0..n - 1 {
            c_tri.add_triplet(0, k, beta); // rivals' quantities
        }
        c_tri.add_triplet(0, n - 1, beta); // net import
        c_tri.add_triplet(0, n, -beta); // net export
        let tax_base = n + 1;
        match params.leader.tax_paradigm {
            TaxParadigm::Standard => c_tri.add_triplet(0, tax_base + j, 1.0),
            TaxParadigm::Single => c_tri.add_triplet(0, tax_base, 1.0),
            TaxParadigm::Carbon => {
                c_tri.add_triplet(0, tax_base, params.followers.emission_costs[j])
            }
        }
        let mut q_tri = sprs::TriMat::new((1, 1));
        q_tri.add_triplet(0, 0, params.followers.costs_quad[j] + 2.0 * beta);

        let capacity = params.followers.capacities[j];
        let (a, b_mat, b) = if capacity >= 0.0 {
            let mut b_tri = sprs::TriMat::new((1, 1));
            b_tri.add_triplet(0, 0, 1.0);
            (matrix::zeros(1, x_width), b_tri.to_csr(), vec![capacity])
        } else {
            (matrix::zeros(0, x_width), matrix::zeros(0, 1), vec![])
        };

        let mut qp = QpParam::new();
        qp.set(
            q_tri.to_csr(),
            c_tri.to_csr(),
            a,
            b_mat,
            vec![params.followers.costs_lin[j] - alpha],
            b,
        )?;
        players.push(Rc::new(RefCell::new(qp)));
    }

    // Leader constraints over [q_1..q_n, imp, exp, taxes].
    let lead_width = n + 2 + tax_vars;
    let imp = n;
    let exp = n + 1;
    let tax0 = n + 2;
    let mut rows: Vec<(Vec<(usize, f64)>, f64)> = Vec::new();
    for (j, &cap) in params.followers.tax_caps.iter().enumerate() {
        if cap < 0.0 {
            continue;
        }
        let row = match params.leader.tax_paradigm {
            TaxParadigm::Standard => vec![(tax0 + j, 1.0)],
            TaxParadigm::Single => vec![(tax0, 1.0)],
            TaxParadigm::Carbon => vec![(tax0, params.followers.emission_costs[j])],
        };
        rows.push((row, cap));
    }
    // exports cannot exceed production plus imports
    let mut balance: Vec<(usize, f64)> = (0..n).map(|j| (j, -1.0)).collect();
    balance.push((exp, 1.0));
    balance.push((imp, -1.0));
    rows.push((balance, 0.0));
    if params.leader.import_limit >= 0.0 {
        rows.push((
            vec![(imp, 1.0), (exp, -1.0)],
            params.leader.import_limit,
        ));
    }
    if params.leader.export_limit >= 0.0 {
        rows.push((
            vec![(exp, 1.0), (imp, -1.0)],
            params.leader.export_limit,
        ));
    }
    if params.leader.price_limit >= 0.0 {
        let mut row: Vec<(usize, f64)> = (0..n).map(|j| (j, -beta)).collect();
        row.push((imp, -beta));
        row.push((exp, beta));
        rows.push((row, params.leader.price_limit - alpha));
    }

    let mut lead_tri = sprs::TriMat::new((rows.len(), lead_width));
    let mut lead_rhs = Vec::with_capacity(rows.len());
    for (r, (coeffs, rhs)) in rows.iter().enumerate() {
        for &(c, v) in coeffs {
            lead_tri.add_triplet(r, c, v);
        }
        lead_rhs.push(*rhs);
    }

    NashGame::new(
        players,
        matrix::zeros(0, 0),
        vec![],
        2 + tax_vars,
        lead_tri.to_csr(),
        lead_rhs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{DemandParams, FollowerParams, LeaderParams};

    fn one_follower_country(name: &str) -> CountryParams {
        CountryParams {
            name: name.into(),
            followers: FollowerParams {
                costs_quad: vec![0.5],
                costs_lin: vec![10.0],
                capacities: vec![100.0],
                emission_costs: vec![1.0],
                tax_caps: vec![20.0],
                names: vec![],
            },
            demand: DemandParams {
                alpha: 300.0,
                beta: 0.05,
            },
            leader: LeaderParams::default(),
        }
    }

    #[test]
    fn country_game_has_expected_shape() {
        let game = build_country_game(&one_follower_country("Solo")).unwrap();
        // variables: q, imp, exp, tax, lambda
        assert_eq!(game.n_primals(), 1);
        assert_eq!(game.n_lead_vars(), 3);
        assert_eq!(game.n_duals(), 1);
        assert_eq!(game.n_vars(), 5);
        let (m, _, pairs) = game.formulate_lcp().unwrap();
        assert_eq!(m.shape(), (2, 5));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn unlimited_capacity_drops_the_constraint() {
        let mut params = one_follower_country("Free");
        params.followers.capacities[0] = -1.0;
        let game = build_country_game(&params).unwrap();
        assert_eq!(game.n_duals(), 0);
    }

    #[test]
    fn offsets_follow_the_block_order() {
        let mut market = MarketEpec::new(AlgorithmParams::default());
        market.add_country(one_follower_country("A")).unwrap();
        market.add_country(one_follower_country("B")).unwrap();
        let mut tri = sprs::TriMat::new((2, 2));
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1.0);
        market.add_transport_costs(tri.to_csr()).unwrap();
        market.finalize().unwrap();
        // [q, imp, exp, country-import, tax, dual]
        assert_eq!(market.offset(0, LeaderVar::FollowerStart), 0);
        assert_eq!(market.offset(0, LeaderVar::NetImport), 1);
        assert_eq!(market.offset(0, LeaderVar::NetExport), 2);
        assert_eq!(market.offset(0, LeaderVar::CountryImport), 3);
        assert_eq!(market.offset(0, LeaderVar::Tax), 4);
        // after finalize the block is padded to the common width and the
        // follower duals move to its end
        assert_eq!(market.offset(0, LeaderVar::End), 14);
        assert_eq!(market.offset(0, LeaderVar::DualVar), 13);
        assert_eq!(market.import_sources(0), &[1]);
        // each clearing row got its parametric QP at finalize
        let mc_qp = market.market_clearing_qp(0).unwrap();
        assert_eq!(mc_qp.ny(), 1);
        assert!(market.market_clearing_qp(2).is_err());
    }

    #[test]
    fn duplicate_country_names_are_rejected() {
        let mut market = MarketEpec::new(AlgorithmParams::default());
        market.add_country(one_follower_country("A")).unwrap();
        assert!(market.add_country(one_follower_country("A")).is_err());
    }

    #[test]
    fn single_tax_paradigm_shares_one_variable() {
        let mut params = one_follower_country("S");
        params.followers = FollowerParams {
            costs_quad: vec![0.5, 0.3],
            costs_lin: vec![130.0, 120.0],
            capacities: vec![100.0, 150.0],
            emission_costs: vec![6.0, 10.0],
            tax_caps: vec![50.0, 80.0],
            names: vec![],
        };
        params.leader.tax_paradigm = TaxParadigm::Single;
        let game = build_country_game(&params).unwrap();
        // q1, q2, imp, exp, one tax
        assert_eq!(game.n_lead_vars(), 3);
        // both tax caps constrain the single rate, plus the balance row
        assert_eq!(game.lead_rhs().len(), 3);
    }
}
