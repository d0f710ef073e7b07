//! Simultaneous games of parametric QPs.
//!
//! A [`NashGame`] is an ordered list of players, each a [`QpParam`] seeing
//! all other players' variables as parameters, plus an optional
//! market-clearing constraint block and optional leader-level constraints.
//! The canonical variable ordering is
//!
//! ```text
//! primals_1 ... primals_n | market-clearing duals | leader vars | duals_1 ... duals_n
//! ```
//!
//! and [`NashGame::formulate_lcp`] interleaves the players' KKT systems into
//! one linear complementarity problem over that ordering.

use crate::qp::{DummyPosition, QpParam, QpSolution};
use crate::ComplPair;
use epx_core::{matrix, persist, EpxError, EpxResult, SpMat};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::trace;

pub struct NashGame {
    players: Vec<Rc<RefCell<QpParam>>>,
    market_clearing: SpMat,
    mc_rhs: Vec<f64>,
    lead_cons: SpMat,
    lead_rhs: Vec<f64>,
    n_lead_var: usize,
    /// Start of each player's primal block; last entry is the primal count.
    primal_position: Vec<usize>,
    /// Start of each player's dual block; last entry is the variable count.
    dual_position: Vec<usize>,
    mc_dual_position: usize,
    leader_position: usize,
}

impl NashGame {
    pub fn new(
        players: Vec<Rc<RefCell<QpParam>>>,
        market_clearing: SpMat,
        mc_rhs: Vec<f64>,
        n_lead_var: usize,
        lead_cons: SpMat,
        lead_rhs: Vec<f64>,
    ) -> EpxResult<Self> {
        if market_clearing.rows() != mc_rhs.len() {
            return Err(EpxError::InvalidShape(format!(
                "market clearing has {} rows against an RHS of length {}",
                market_clearing.rows(),
                mc_rhs.len()
            )));
        }
        if lead_cons.rows() != lead_rhs.len() {
            return Err(EpxError::InvalidShape(format!(
                "leader constraints have {} rows against an RHS of length {}",
                lead_cons.rows(),
                lead_rhs.len()
            )));
        }
        let mut game = NashGame {
            players,
            market_clearing,
            mc_rhs,
            lead_cons,
            lead_rhs,
            n_lead_var,
            primal_position: Vec::new(),
            dual_position: Vec::new(),
            mc_dual_position: 0,
            leader_position: 0,
        };
        game.set_positions();
        game.check_consistency()?;
        Ok(game)
    }

    /// Recomputes the cached variable offsets.
    fn set_positions(&mut self) {
        let n = self.players.len();
        self.primal_position = Vec::with_capacity(n + 1);
        self.dual_position = Vec::with_capacity(n + 1);
        let mut count = 0;
        for player in &self.players {
            self.primal_position.push(count);
            count += player.borrow().ny();
        }
        self.primal_position.push(count);
        self.mc_dual_position = count;
        self.leader_position = count + self.mc_rhs.len();
        count += self.mc_rhs.len() + self.n_lead_var;
        for player in &self.players {
            self.dual_position.push(count);
            count += player.borrow().ncons();
        }
        self.dual_position.push(count);
    }

    fn check_consistency(&self) -> EpxResult<()> {
        let expected_extra = self.mc_rhs.len() + self.n_lead_var;
        for (i, player) in self.players.iter().enumerate() {
            let p = player.borrow();
            let expected = self.n_primals() - p.ny() + expected_extra;
            if p.nx() != expected {
                return Err(EpxError::InvalidShape(format!(
                    "player {i} is parametrized by {} variables, expected {expected}",
                    p.nx()
                )));
            }
        }
        if self.market_clearing.rows() > 0
            && self.market_clearing.cols() != self.dual_position[0]
        {
            return Err(EpxError::InvalidShape(format!(
                "market clearing has {} columns, expected {}",
                self.market_clearing.cols(),
                self.dual_position[0]
            )));
        }
        if self.lead_cons.rows() > 0
            && self.lead_cons.cols() != self.n_primals() + self.n_lead_var
        {
            return Err(EpxError::InvalidShape(format!(
                "leader constraints have {} columns, expected {}",
                self.lead_cons.cols(),
                self.n_primals() + self.n_lead_var
            )));
        }
        Ok(())
    }

    pub fn n_players(&self) -> usize {
        self.players.len()
    }

    /// Sum of all players' own variables.
    pub fn n_primals(&self) -> usize {
        *self.primal_position.last().unwrap_or(&0)
    }

    /// Number of market-clearing shadow prices.
    pub fn n_shadow(&self) -> usize {
        self.mc_rhs.len()
    }

    /// Variables without a complementary equation.
    pub fn n_lead_vars(&self) -> usize {
        self.n_lead_var
    }

    pub fn n_duals(&self) -> usize {
        self.dual_position[self.players.len()] - self.dual_position[0]
    }

    /// Total number of variables in the composite ordering.
    pub fn n_vars(&self) -> usize {
        *self.dual_position.last().unwrap_or(&0)
    }

    pub fn primal_loc(&self, i: usize) -> usize {
        self.primal_position[i]
    }

    pub fn dual_loc(&self, i: usize) -> usize {
        self.dual_position[i]
    }

    pub fn mc_dual_loc(&self) -> usize {
        self.mc_dual_position
    }

    pub fn leader_loc(&self) -> usize {
        self.leader_position
    }

    pub fn players(&self) -> &[Rc<RefCell<QpParam>>] {
        &self.players
    }

    pub fn lead_rhs(&self) -> &[f64] {
        &self.lead_rhs
    }

    /// RHS paired with [`NashGame::rewrite_leader_constraints`]: the leader
    /// rows, then the market clearing as `<=` and `>=`.
    pub fn mc_lead_rhs(&self) -> Vec<f64> {
        let mut rhs = self.lead_rhs.clone();
        rhs.extend_from_slice(&self.mc_rhs);
        rhs.extend(self.mc_rhs.iter().map(|v| -v));
        rhs
    }

    /// Composes the players' KKT systems into the game's LCP
    /// `0 <= v  ⊥  M v + q >= 0` with the complementarity pairing.
    ///
    /// Leader constraints are *not* part of the output; they are recovered
    /// through [`NashGame::rewrite_leader_constraints`].
    pub fn formulate_lcp(&self) -> EpxResult<(SpMat, Vec<f64>, Vec<ComplPair>)> {
        let n_var = self.n_vars();
        let n_rows = n_var - self.n_lead_var;
        let dual0 = self.dual_position[0];
        let mut tri = sprs::TriMat::new((n_rows, n_var));
        let mut q = vec![0.0; n_rows];
        let mut pairs: Vec<ComplPair> = Vec::with_capacity(n_rows);

        for i in 0..self.players.len() {
            let (mi, ni, qi) = self.players[i].borrow().kkt()?;
            let n_prim = self.primal_position[i + 1] - self.primal_position[i];
            let n_dual = self.players[i].borrow().ncons();
            let pp = self.primal_position[i];
            let pp_next = self.primal_position[i + 1];
            let dp = self.dual_position[i];
            let dp_next = self.dual_position[i + 1];

            // Primal stationarity rows.
            if i > 0 {
                matrix::scatter_window(&mut tri, pp, 0, &ni, 0, 0, n_prim, pp);
            }
            matrix::scatter_window(&mut tri, pp, pp, &mi, 0, 0, n_prim, n_prim);
            if pp_next != dual0 {
                matrix::scatter_window(
                    &mut tri,
                    pp,
                    pp_next,
                    &ni,
                    0,
                    pp,
                    n_prim,
                    dual0 - pp_next,
                );
            }
            if n_dual > 0 {
                matrix::scatter_window(&mut tri, pp, dp, &mi, 0, n_prim, n_prim, n_dual);
            }
            q[pp..pp_next].copy_from_slice(&qi[..n_prim]);
            for j in pp..pp_next {
                pairs.push((j, j));
            }

            // Dual (primal-feasibility) rows, shifted before the leader
            // block in the equation indexing.
            if n_dual > 0 {
                let row0 = dp - self.n_lead_var;
                if i > 0 {
                    matrix::scatter_window(&mut tri, row0, 0, &ni, n_prim, 0, n_dual, pp);
                }
                matrix::scatter_window(&mut tri, row0, pp, &mi, n_prim, 0, n_dual, n_prim);
                matrix::scatter_window(
                    &mut tri,
                    row0,
                    pp_next,
                    &ni,
                    n_prim,
                    pp,
                    n_dual,
                    dual0 - pp_next,
                );
                matrix::scatter_window(&mut tri, row0, dp, &mi, n_prim, n_prim, n_dual, n_dual);
                q[row0..row0 + n_dual].copy_from_slice(&qi[n_prim..]);
                for r in row0..row0 + n_dual {
                    pairs.push((r, r + self.n_lead_var));
                }
            }
        }

        // Market clearing block, complementary to its own shadow prices.
        if !self.mc_rhs.is_empty() {
            matrix::scatter(
                &mut tri,
                self.mc_dual_position,
                0,
                &self.market_clearing,
            );
            for (offset, rhs) in self.mc_rhs.iter().enumerate() {
                q[self.mc_dual_position + offset] = -rhs;
                pairs.push((
                    self.mc_dual_position + offset,
                    self.mc_dual_position + offset,
                ));
            }
        }

        trace!(
            rows = n_rows,
            cols = n_var,
            pairs = pairs.len(),
            "formulated the Nash game LCP"
        );
        Ok((tri.to_csr(), q, pairs))
    }

    /// Pads the leader constraints with zero columns up to the composite
    /// width and re-injects each market-clearing row as `<=` and `>=`.
    pub fn rewrite_leader_constraints(&self) -> EpxResult<SpMat> {
        let n_var = self.n_vars();
        let dual0 = self.dual_position[0];
        let n_lead_rows = self.lead_cons.rows();
        let n_mc = self.mc_rhs.len();
        let mut tri = sprs::TriMat::new((n_lead_rows + 2 * n_mc, n_var));
        for (&v, (r, c)) in self.lead_cons.iter() {
            // primal columns stay; leader-variable columns jump past the
            // market-clearing duals
            let col = if c < self.mc_dual_position {
                c
            } else {
                c - self.mc_dual_position + self.leader_position
            };
            tri.add_triplet(r, col, v);
        }
        for (&v, (r, c)) in self.market_clearing.iter() {
            debug_assert!(c < dual0);
            tri.add_triplet(n_lead_rows + r, c, v);
            tri.add_triplet(n_lead_rows + n_mc + r, c, -v);
        }
        Ok(tri.to_csr())
    }

    /// Pads every player with `count` extra parameters so that each still
    /// sees "all others' variables" as parameters, and grows the leader
    /// variable block accordingly.
    ///
    /// `position` addresses the primal-plus-leader column ordering (the one
    /// the leader constraints use); it is translated into each player's own
    /// parameter ordering, which skips that player's primal block and
    /// includes the market-clearing duals.
    pub fn add_dummy(&mut self, count: usize, position: DummyPosition) -> EpxResult<&mut Self> {
        let n_primals = self.n_primals();
        let n_mc = self.mc_rhs.len();
        for (i, player) in self.players.iter().enumerate() {
            let player_position = match position {
                DummyPosition::Append => DummyPosition::Append,
                DummyPosition::At(p) => {
                    let pp = self.primal_position[i];
                    let pp_next = self.primal_position[i + 1];
                    if p < pp {
                        DummyPosition::At(p)
                    } else if p >= pp_next {
                        let shift = pp_next - pp;
                        if p >= n_primals {
                            DummyPosition::At(p - shift + n_mc)
                        } else {
                            DummyPosition::At(p - shift)
                        }
                    } else {
                        return Err(EpxError::InvalidShape(format!(
                            "cannot splice inside player {i}'s own block"
                        )));
                    }
                }
            };
            player.borrow_mut().add_dummy(count, 0, player_position)?;
        }
        self.n_lead_var += count;
        if self.lead_cons.rows() > 0 {
            let n_rows = self.lead_cons.rows();
            let n_cols = self.lead_cons.cols();
            self.lead_cons = match position {
                DummyPosition::Append => matrix::resized(&self.lead_cons, n_rows, n_cols + count),
                DummyPosition::At(p) => {
                    let mut tri = sprs::TriMat::new((n_rows, n_cols + count));
                    for (&v, (r, c)) in self.lead_cons.iter() {
                        let col = if c < p { c } else { c + count };
                        tri.add_triplet(r, col, v);
                    }
                    tri.to_csr()
                }
            };
        } else if self.lead_cons.cols() > 0 {
            self.lead_cons = matrix::zeros(0, self.lead_cons.cols() + count);
        }
        self.set_positions();
        Ok(self)
    }

    /// Appends one leader constraint `a . v <= b` over the current
    /// primal-plus-leader columns.
    pub fn add_lead_cons(&mut self, a: &[f64], b: f64) -> EpxResult<&mut Self> {
        let n_cols = self.n_primals() + self.n_lead_var;
        if a.len() != n_cols {
            return Err(EpxError::InvalidShape(format!(
                "leader constraint has {} coefficients, expected {n_cols}",
                a.len()
            )));
        }
        let n_rows = self.lead_cons.rows();
        let mut tri = sprs::TriMat::new((n_rows + 1, n_cols));
        for (&v, (r, c)) in self.lead_cons.iter() {
            tri.add_triplet(r, c, v);
        }
        for (c, &v) in a.iter().enumerate() {
            if v != 0.0 {
                tri.add_triplet(n_rows, c, v);
            }
        }
        self.lead_cons = tri.to_csr();
        self.lead_rhs.push(b);
        Ok(self)
    }

    /// Extracts the parameters player `i` sees from a composite vector:
    /// all other primals plus the market-clearing duals and leader block.
    pub fn x_other(&self, player: usize, x: &[f64]) -> EpxResult<Vec<f64>> {
        let dual0 = self.dual_position[0];
        if x.len() < dual0 {
            return Err(EpxError::WrongArity {
                expected: dual0,
                found: x.len(),
            });
        }
        let mut out =
            Vec::with_capacity(dual0 - (self.primal_position[player + 1] - self.primal_position[player]));
        out.extend_from_slice(&x[..self.primal_position[player]]);
        out.extend_from_slice(&x[self.primal_position[player + 1]..dual0]);
        Ok(out)
    }

    /// Player `i`'s decision block from a composite vector.
    pub fn x_of<'a>(&self, player: usize, x: &'a [f64]) -> &'a [f64] {
        &x[self.primal_position[player]..self.primal_position[player + 1]]
    }

    /// Solves player `i`'s best response against the composite vector `x`.
    pub fn respond(&self, player: usize, x: &[f64]) -> EpxResult<Option<QpSolution>> {
        let other = self.x_other(player, x)?;
        self.players[player].borrow_mut().solve_fixed(&other)
    }

    /// Each player's objective value at the composite vector `x`.
    pub fn compute_qp_objvals(&self, x: &[f64]) -> EpxResult<Vec<f64>> {
        let mut vals = Vec::with_capacity(self.players.len());
        for i in 0..self.players.len() {
            let other = self.x_other(i, x)?;
            vals.push(self.players[i].borrow().compute_objective(
                self.x_of(i, x),
                &other,
                false,
                1e-6,
            )?);
        }
        Ok(vals)
    }

    /// Checks whether `x` is a Nash equilibrium within `tol`. When it is
    /// not, returns the first player able to improve together with its
    /// best-response deviation.
    pub fn is_solved(
        &self,
        x: &[f64],
        tol: f64,
    ) -> EpxResult<(bool, Option<(usize, Vec<f64>)>)> {
        for i in 0..self.players.len() {
            let other = self.x_other(i, x)?;
            let current =
                self.players[i]
                    .borrow()
                    .compute_objective(self.x_of(i, x), &other, false, tol)?;
            let response = self.players[i].borrow_mut().solve_fixed(&other)?;
            match response {
                None => return Ok((false, Some((i, Vec::new())))),
                Some(sol) => {
                    if current - sol.objective > tol {
                        trace!(
                            player = i,
                            current,
                            best = sol.objective,
                            "player has a profitable deviation"
                        );
                        return Ok((false, Some((i, sol.y))));
                    }
                }
            }
        }
        Ok((true, None))
    }

    pub fn save_into(&self, w: &mut impl std::io::Write) -> EpxResult<()> {
        persist::save_marker(w, "NashGame")?;
        persist::save_usize(w, "NashGame::NumPlayers", self.players.len())?;
        persist::save_usize(w, "NashGame::nLeadVar", self.n_lead_var)?;
        for player in &self.players {
            player.borrow().save_into(w)?;
        }
        persist::save_mat(w, "NashGame::MarketClearing", &self.market_clearing)?;
        persist::save_vec(w, "NashGame::MCRHS", &self.mc_rhs)?;
        persist::save_mat(w, "NashGame::LeaderConstraints", &self.lead_cons)?;
        persist::save_vec(w, "NashGame::LeaderConsRHS", &self.lead_rhs)?;
        Ok(())
    }

    pub fn save(&self, path: &Path, erase: bool) -> EpxResult<()> {
        persist::with_file(path, erase, |w| self.save_into(w))
    }

    pub fn load_from(loader: &mut persist::Loader) -> EpxResult<Self> {
        loader.expect("NashGame")?;
        let n_players = loader.read_headed_usize("NashGame::NumPlayers")?;
        let n_lead_var = loader.read_headed_usize("NashGame::nLeadVar")?;
        let mut players = Vec::with_capacity(n_players);
        for _ in 0..n_players {
            let mut qp = QpParam::new();
            qp.load_from(loader)?;
            players.push(Rc::new(RefCell::new(qp)));
        }
        let market_clearing = loader.read_mat("NashGame::MarketClearing")?;
        let mc_rhs = loader.read_vec("NashGame::MCRHS")?;
        let lead_cons = loader.read_mat("NashGame::LeaderConstraints")?;
        let lead_rhs = loader.read_vec("NashGame::LeaderConsRHS")?;
        NashGame::new(
            players,
            market_clearing,
            mc_rhs,
            n_lead_var,
            lead_cons,
            lead_rhs,
        )
    }

    pub fn load(path: &Path) -> EpxResult<Self> {
        let mut loader = persist::Loader::from_path(path)?;
        Self::load_from(&mut loader)
    }
}

impl std::fmt::Display for NashGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Nash game with {} players", self.n_players())?;
        writeln!(f, "  primal variables:       {}", self.n_primals())?;
        writeln!(f, "  dual variables:         {}", self.n_duals())?;
        writeln!(f, "  shadow price variables: {}", self.n_shadow())?;
        writeln!(f, "  leader variables:       {}", self.n_lead_vars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epx_core::matrix;
    use sprs::TriMat;

    fn mat(entries: &[(usize, usize, f64)], shape: (usize, usize)) -> SpMat {
        let mut tri = TriMat::new(shape);
        for &(r, c, v) in entries {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }

    /// Symmetric Cournot duopoly: player i solves
    /// min (1/2)(2b + q_i) y^2 + (c_i - a) y + b x y   with   y <= cap.
    fn cournot_duopoly() -> NashGame {
        let a = 100.0;
        let b = 1.0;
        let mut players = Vec::new();
        for (lin, quad, cap) in [(10.0, 0.1, 1000.0), (5.0, 0.2, 1000.0)] {
            let mut qp = QpParam::new();
            qp.set(
                mat(&[(0, 0, quad + 2.0 * b)], (1, 1)),
                mat(&[(0, 0, b)], (1, 1)),
                matrix::zeros(1, 1),
                mat(&[(0, 0, 1.0)], (1, 1)),
                vec![lin - a],
                vec![cap],
            )
            .unwrap();
            players.push(Rc::new(RefCell::new(qp)));
        }
        NashGame::new(
            players,
            matrix::zeros(0, 0),
            vec![],
            0,
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn positions_follow_canonical_ordering() {
        let game = cournot_duopoly();
        assert_eq!(game.n_primals(), 2);
        assert_eq!(game.mc_dual_loc(), 2);
        assert_eq!(game.leader_loc(), 2);
        assert_eq!(game.dual_loc(0), 2);
        assert_eq!(game.dual_loc(1), 3);
        assert_eq!(game.n_vars(), 4);
    }

    #[test]
    fn formulate_lcp_produces_square_pairing() {
        let game = cournot_duopoly();
        let (m, q, pairs) = game.formulate_lcp().unwrap();
        assert_eq!(m.shape(), (4, 4));
        assert_eq!(q.len(), 4);
        assert_eq!(pairs.len(), 4);
        // every equation appears in exactly one pair
        let mut eqs: Vec<usize> = pairs.iter().map(|p| p.0).collect();
        eqs.sort_unstable();
        eqs.dedup();
        assert_eq!(eqs.len(), 4);
        // player 0 stationarity: (q1 + 2b) y0 + b y1 + lambda0
        assert!((matrix::get(&m, 0, 0) - 2.1).abs() < 1e-12);
        assert!((matrix::get(&m, 0, 1) - 1.0).abs() < 1e-12);
        assert!((matrix::get(&m, 0, 2) - 1.0).abs() < 1e-12);
        // player 1 stationarity scatters its rival's coefficient left
        assert!((matrix::get(&m, 1, 0) - 1.0).abs() < 1e-12);
        assert!((matrix::get(&m, 1, 1) - 2.2).abs() < 1e-12);
        assert!((matrix::get(&m, 1, 3) - 1.0).abs() < 1e-12);
        // q carries (lin - a) then capacities
        assert_eq!(q, vec![-90.0, -95.0, 1000.0, 1000.0]);
    }

    #[test]
    fn nash_equilibrium_passes_is_solved() {
        let game = cournot_duopoly();
        // Closed form for this duopoly:
        // (2b+q0) y0 + b y1 = a - c0, b y0 + (2b+q1) y1 = a - c1
        let (a11, a12, a21, a22) = (2.1, 1.0, 1.0, 2.2);
        let det = a11 * a22 - a12 * a21;
        let y0 = (90.0 * a22 - a12 * 95.0) / det;
        let y1 = (a11 * 95.0 - 90.0 * a21) / det;
        let x = vec![y0, y1, 0.0, 0.0];
        let (solved, _) = game.is_solved(&x, 1e-4).unwrap();
        assert!(solved, "closed-form Cournot point should verify");
        // a perturbed profile is rejected and the deviation points back
        let bad = vec![y0 + 5.0, y1, 0.0, 0.0];
        let (solved, viol) = game.is_solved(&bad, 1e-4).unwrap();
        assert!(!solved);
        let (player, dev) = viol.unwrap();
        assert_eq!(player, 0);
        assert!((dev[0] - y0).abs() < 1e-3);
    }

    #[test]
    fn add_dummy_keeps_players_consistent() {
        let mut game = cournot_duopoly();
        game.add_dummy(2, DummyPosition::Append).unwrap();
        assert_eq!(game.n_lead_vars(), 2);
        assert_eq!(game.n_vars(), 6);
        let (m, _, pairs) = game.formulate_lcp().unwrap();
        assert_eq!(m.shape(), (4, 6));
        // dual rows now pair past the leader block
        assert!(pairs.contains(&(2, 4)));
        assert!(pairs.contains(&(3, 5)));
    }

    #[test]
    fn players_are_mutually_playable() {
        let game = cournot_duopoly();
        let players = game.players();
        assert!(players[0].borrow().is_playable(&players[1].borrow()));
        let mut lopsided = QpParam::new();
        lopsided
            .set(
                mat(&[(0, 0, 1.0)], (1, 1)),
                matrix::zeros(1, 3),
                matrix::zeros(0, 3),
                matrix::zeros(0, 1),
                vec![0.0],
                vec![],
            )
            .unwrap();
        assert!(!players[0].borrow().is_playable(&lopsided));
    }

    #[test]
    fn objective_values_match_the_players() {
        let game = cournot_duopoly();
        let x = vec![10.0, 20.0, 0.0, 0.0];
        let vals = game.compute_qp_objvals(&x).unwrap();
        // player 0: (1/2)(2.1) 100 + (10 - 100) 10 + 1 * 20 * 10
        assert!((vals[0] - (105.0 - 900.0 + 200.0)).abs() < 1e-9);
        assert_eq!(vals.len(), 2);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nash.dat");
        let game = cournot_duopoly();
        game.save(&path, true).unwrap();
        let back = NashGame::load(&path).unwrap();
        let (m1, q1, c1) = game.formulate_lcp().unwrap();
        let (m2, q2, c2) = back.formulate_lcp().unwrap();
        assert!(persist::mats_identical(&m1, &m2));
        assert_eq!(q1, q2);
        assert_eq!(c1, c2);
    }
}
