//! Inner polyhedral approximation of an LCP's feasible region.
//!
//! The feasible region of an LCP is a finite union of polyhedra, one per
//! fully resolved ±1 encoding. A [`PolyLcp`] materialises a subset of them,
//! tracks which encodings are enumerated / proved feasible / proved
//! infeasible, and lifts the union to a single polyhedron through Balas'
//! convex hull.
//!
//! Encodings are identified by a packed integer: bit `i` is set exactly when
//! complementarity `i` is resolved to +1, so the identifier space is
//! `[0, 2^n)` and the sequential policies walk it in natural order.

use super::{balas_hull, Lcp};
use crate::qp::{QpConstraints, QpObjective, QpParam};
use crate::Encoding;
use epx_core::{matrix, EpxError, EpxResult, SpMat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

/// Selection policy for [`PolyLcp::add_polyhedra`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PolySelection {
    /// Walk identifiers in natural order.
    Sequential,
    /// Walk identifiers in descending order.
    ReverseSequential,
    /// Sample identifiers uniformly, rejecting decided ones.
    Random,
}

pub struct PolyLcp {
    lcp: Lcp,
    /// Encodings already added to the approximation.
    enumerated: BTreeSet<u64>,
    /// Encodings proved non-empty.
    feasible: BTreeSet<u64>,
    /// Encodings proved empty.
    infeasible: BTreeSet<u64>,
    ai: Vec<SpMat>,
    bi: Vec<Vec<f64>>,
    /// Identifier of each stored polyhedron, aligned with `ai`/`bi`.
    order: Vec<u64>,
    sequential_counter: u64,
    reverse_counter: i64,
    max_theoretical: u64,
    feasible_count: usize,
    /// Seed for the random selection policy; `None` derives one from the
    /// clock and the row count so that separate runs differ but a run is
    /// reproducible once the seed is logged.
    pub seed: Option<u64>,
    rng: Option<StdRng>,
}

impl PolyLcp {
    pub fn new(lcp: Lcp) -> Self {
        let n = lcp.n_rows() as u32;
        let max_theoretical = if n >= 63 { u64::MAX } else { 1u64 << n };
        PolyLcp {
            lcp,
            enumerated: BTreeSet::new(),
            feasible: BTreeSet::new(),
            infeasible: BTreeSet::new(),
            ai: Vec::new(),
            bi: Vec::new(),
            order: Vec::new(),
            sequential_counter: 0,
            reverse_counter: max_theoretical as i64 - 1,
            max_theoretical,
            feasible_count: 0,
            seed: None,
            rng: None,
        }
    }

    pub fn base(&self) -> &Lcp {
        &self.lcp
    }

    pub fn base_mut(&mut self) -> &mut Lcp {
        &mut self.lcp
    }

    /// Number of polyhedra in the current approximation.
    pub fn n_polyhedra(&self) -> usize {
        self.ai.len()
    }

    pub fn enumerated_ids(&self) -> &BTreeSet<u64> {
        &self.enumerated
    }

    /// Stored polyhedron identifiers in insertion order — index `k` here is
    /// polyhedron `k` of the convex hull.
    pub fn polyhedron_ids(&self) -> &[u64] {
        &self.order
    }

    pub fn max_theoretical(&self) -> u64 {
        self.max_theoretical
    }

    /// Count of feasible polyhedra seen by the last convex hull.
    pub fn feasible_count(&self) -> usize {
        self.feasible_count
    }

    /// Packs a fully resolved encoding: bit `i` set iff `enc[i] == 1`.
    pub fn encoding_id(enc: &Encoding) -> u64 {
        enc.iter()
            .enumerate()
            .fold(0u64, |acc, (i, &v)| if v > 0 { acc | (1 << i) } else { acc })
    }

    /// Unpacks an identifier into a fully resolved ±1 encoding.
    pub fn id_encoding(id: u64, n: usize) -> Encoding {
        (0..n)
            .map(|i| if id & (1 << i) != 0 { 1 } else { -1 })
            .collect()
    }

    pub fn clear_polyhedra(&mut self) {
        self.ai.clear();
        self.bi.clear();
        self.order.clear();
        self.enumerated.clear();
    }

    /// The inequality description of one polyhedron: +1 rows fix the
    /// equation (`M_i x <= -q_i`), -1 rows fix the paired variable
    /// (`x_j <= 0`).
    fn build_polyhedron(&self, enc: &Encoding) -> (SpMat, Vec<f64>) {
        let n_r = self.lcp.n_rows();
        let mut tri = sprs::TriMat::new((n_r, self.lcp.n_cols()));
        let mut b = vec![0.0; n_r];
        for i in 0..n_r {
            match enc[i] {
                1 => {
                    if let Some(row) = self.lcp.m().outer_view(i) {
                        for (j, &v) in row.iter() {
                            tri.add_triplet(i, j, v);
                        }
                    }
                    b[i] = -self.lcp.q_vec()[i];
                }
                -1 => {
                    tri.add_triplet(i, self.lcp.var_position(i), 1.0);
                }
                _ => unreachable!("partial encodings never reach build_polyhedron"),
            }
        }
        (tri.to_csr(), b)
    }

    /// Adds the polyhedron of a fully resolved encoding.
    ///
    /// With `check_feas` the polyhedron is probed on the relaxed model first
    /// and silently rejected when empty. Already enumerated encodings are
    /// silently rejected too. Returns whether the polyhedron was added.
    pub fn add_poly_from_encoding(&mut self, enc: &Encoding, check_feas: bool) -> EpxResult<bool> {
        if enc.len() != self.lcp.n_rows() {
            return Err(EpxError::InvalidShape(format!(
                "encoding of length {}, expected {}",
                enc.len(),
                self.lcp.n_rows()
            )));
        }
        if enc.iter().any(|&v| v == 0) {
            return Err(EpxError::InvalidShape(
                "unresolved encoding passed to add_poly_from_encoding".into(),
            ));
        }
        let id = Self::encoding_id(enc);
        trace!(id, "considering polyhedron");
        if check_feas && !self.check_poly_feas_encoding(enc)? {
            return Ok(false);
        }
        if self.enumerated.contains(&id) {
            trace!(id, "polyhedron previously added");
            return Ok(false);
        }
        let (a, b) = self.build_polyhedron(enc);
        self.enumerated.insert(id);
        self.order.push(id);
        self.ai.push(a);
        self.bi.push(b);
        Ok(true)
    }

    /// Depth-first expansion of a partial encoding: every 0 is replaced by
    /// +1 and -1 recursively, adding each leaf polyhedron.
    pub fn add_polyhedra_from_encoding(
        &mut self,
        enc: &Encoding,
        check_feas: bool,
    ) -> EpxResult<usize> {
        match enc.iter().position(|&v| v == 0) {
            Some(i) => {
                let mut child = enc.clone();
                child[i] = 1;
                let mut added = self.add_polyhedra_from_encoding(&child, check_feas)?;
                child[i] = -1;
                added += self.add_polyhedra_from_encoding(&child, check_feas)?;
                Ok(added)
            }
            None => Ok(self.add_poly_from_encoding(enc, check_feas)? as usize),
        }
    }

    /// Populates the approximation with every polyhedron from the all-zero
    /// encoding — `2^n` candidates in the worst case.
    ///
    /// When everything is infeasible, a single empty polyhedron
    /// (`0 <= -1`) is stored so that downstream hull construction still has
    /// a (void) region to work with.
    pub fn enumerate_all(&mut self, check_feas: bool) -> EpxResult<usize> {
        self.clear_polyhedra();
        let zeros = vec![0i8; self.lcp.n_rows()];
        let added = self.add_polyhedra_from_encoding(&zeros, check_feas)?;
        if self.ai.is_empty() {
            warn!("no feasible polyhedron: the LCP region is empty");
            self.ai.push(matrix::zeros(1, self.lcp.n_cols()));
            self.bi.push(vec![-1.0]);
            self.order.push(0);
        }
        Ok(added)
    }

    fn next_poly(&mut self, method: PolySelection) -> u64 {
        match method {
            PolySelection::Sequential => {
                while self.sequential_counter < self.max_theoretical {
                    let id = self.sequential_counter;
                    self.sequential_counter += 1;
                    if !self.enumerated.contains(&id) && !self.infeasible.contains(&id) {
                        return id;
                    }
                }
                self.max_theoretical
            }
            PolySelection::ReverseSequential => {
                while self.reverse_counter >= 0 {
                    let id = self.reverse_counter as u64;
                    self.reverse_counter -= 1;
                    if !self.enumerated.contains(&id) && !self.infeasible.contains(&id) {
                        return id;
                    }
                }
                self.max_theoretical
            }
            PolySelection::Random => {
                if (self.infeasible.len() + self.enumerated.len()) as u64 >= self.max_theoretical {
                    return self.max_theoretical;
                }
                if self.rng.is_none() {
                    let seed = self.seed.unwrap_or_else(|| {
                        let clock = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_nanos() as u64)
                            .unwrap_or(0);
                        clock.wrapping_add(42 + self.lcp.n_rows() as u64)
                    });
                    debug!(seed, "seeding random polyhedron selection");
                    self.rng = Some(StdRng::seed_from_u64(seed));
                }
                let rng = self.rng.as_mut().expect("seeded above");
                loop {
                    let id = rng.gen_range(0..self.max_theoretical);
                    if !self.enumerated.contains(&id) && !self.infeasible.contains(&id) {
                        return id;
                    }
                }
            }
        }
    }

    /// Adds up to `n_poly` feasible polyhedra under the given selection
    /// policy; returns the encodings actually added. Fewer may come back
    /// when the undecided identifier space runs dry.
    pub fn add_polyhedra(
        &mut self,
        n_poly: u64,
        method: PolySelection,
    ) -> EpxResult<Vec<Encoding>> {
        let n_poly = n_poly.min(self.max_theoretical);
        let mut added = Vec::new();
        while (added.len() as u64) < n_poly {
            let id = self.next_poly(method);
            if id >= self.max_theoretical {
                break;
            }
            let enc = Self::id_encoding(id, self.lcp.n_rows());
            if self.add_poly_from_encoding(&enc, true)? {
                added.push(enc);
            }
        }
        Ok(added)
    }

    /// Adds the polyhedron with the given identifier, if feasible.
    pub fn add_the_poly(&mut self, id: u64) -> EpxResult<bool> {
        if id >= self.max_theoretical {
            warn!(id, "identifier outside the polyhedron space");
            return Ok(false);
        }
        let enc = Self::id_encoding(id, self.lcp.n_rows());
        self.add_poly_from_encoding(&enc, true)
    }

    /// Adds the polyhedron containing a feasible point, promoting unresolved
    /// positions to +1. Does nothing when a covering polyhedron is already
    /// enumerated.
    pub fn add_poly_from_point(&mut self, x: &[f64]) -> EpxResult<bool> {
        let enc = self.lcp.solution_encoding(x)?;
        for &id in &self.enumerated {
            let full = Self::id_encoding(id, self.lcp.n_rows());
            if enc
                .iter()
                .zip(&full)
                .all(|(&partial, &f)| partial == 0 || partial == f)
            {
                trace!(id, "point already covered by an enumerated polyhedron");
                return Ok(false);
            }
        }
        let full: Encoding = enc.iter().map(|&v| if v == 0 { 1 } else { v }).collect();
        self.add_poly_from_encoding(&full, false)
    }

    pub fn check_poly_feas(&mut self, id: u64) -> EpxResult<bool> {
        let enc = Self::id_encoding(id, self.lcp.n_rows());
        self.check_poly_feas_encoding(&enc)
    }

    /// Probes one polyhedron with a single LP on a copy of the relaxed
    /// model, caching the verdict.
    pub fn check_poly_feas_encoding(&mut self, enc: &Encoding) -> EpxResult<bool> {
        let id = Self::encoding_id(enc);
        if self.infeasible.contains(&id) {
            trace!(id, "known infeasible polyhedron");
            return Ok(false);
        }
        if self.feasible.contains(&id) {
            trace!(id, "known feasible polyhedron");
            return Ok(true);
        }
        let mut model = self.lcp.relaxed_model()?;
        for (i, &v) in enc.iter().enumerate() {
            if v > 0 {
                model.set_var_ub(self.lcp.z_var(i), 0.0);
            } else if v < 0 {
                model.set_var_ub(self.lcp.x_var(self.lcp.var_position(i)), 0.0);
            }
        }
        let sol = model.optimize().map_err(epx_core::EpxError::from)?;
        if sol.is_success() {
            self.feasible.insert(id);
            Ok(true)
        } else {
            trace!(id, "detected infeasibility");
            self.infeasible.insert(id);
            Ok(false)
        }
    }

    /// The convex hull of the enumerated polyhedra as one inequality block,
    /// with the LCP's side constraints and linearised `z = Mx + q` as the
    /// common part. Returns `(A, b, polyhedron count)`.
    pub fn convex_hull(&self) -> EpxResult<(SpMat, Vec<f64>, usize)> {
        if self.ai.is_empty() {
            return Err(EpxError::Unprepared(
                "no polyhedron has been added to the inner approximation".into(),
            ));
        }
        let a_common = matrix::vstack(&[self.lcp.a_side(), &matrix::neg(self.lcp.m())])?;
        let mut b_common = self.lcp.b_side().to_vec();
        b_common.extend_from_slice(self.lcp.q_vec());
        if self.ai.len() == 1 {
            let a = matrix::vstack(&[&self.ai[0], &a_common])?;
            let mut b = self.bi[0].clone();
            b.extend_from_slice(&b_common);
            return Ok((a, b, 1));
        }
        let (a, b) = balas_hull(&self.ai, &self.bi, &a_common, &b_common)?;
        Ok((a, b, self.ai.len()))
    }

    /// Folds the convex hull into a fresh parametric QP: the hull becomes
    /// the constraint block, and the objective template is lifted to the
    /// extended variable space.
    pub fn make_qp(&mut self, mut obj: QpObjective, qp: &mut QpParam) -> EpxResult<()> {
        let old_nx = obj.c_x.cols();
        let (b_hull, b_rhs, n_poly) = self.convex_hull()?;
        self.feasible_count = n_poly;
        debug!(n_poly, rows = b_hull.rows(), "built the convex hull QP");
        let ny = b_hull.cols();
        obj.c = matrix::resized_vec(&obj.c, ny);
        obj.c_x = matrix::resized(&obj.c_x, ny, old_nx);
        obj.q = matrix::resized(&obj.q, ny, ny);
        let cons = QpConstraints {
            a: matrix::zeros(b_hull.rows(), old_nx),
            b_mat: b_hull,
            b: b_rhs,
        };
        qp.set_parts(obj, cons)?;
        Ok(())
    }

    /// Start of polyhedron `k`'s copy variables inside the hull QP.
    pub fn conv_poly_position(&self, k: usize) -> usize {
        let n_c = self.lcp.n_cols();
        n_c + k * n_c
    }

    /// Position of the convex weight of polyhedron `k` inside the hull QP
    /// (0 when the approximation is a single polyhedron and no weights
    /// exist).
    pub fn conv_poly_weight(&self, k: usize) -> usize {
        let n_poly = self.ai.len();
        if n_poly <= 1 {
            return 0;
        }
        let n_c = self.lcp.n_cols();
        n_c + n_poly * n_c + k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcp::Lcp;
    use sprs::TriMat;

    fn mat(entries: &[(usize, usize, f64)], shape: (usize, usize)) -> SpMat {
        let mut tri = TriMat::new(shape);
        for &(r, c, v) in entries {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }

    /// M = [[0, 1], [1, 0]], q = (-1, -1): feasible points satisfy
    /// x0 ⊥ x1 - 1 and x1 ⊥ x0 - 1; the unique solution is (1, 1)... and
    /// the region decomposes into polyhedra indexed by 2 complementarities.
    fn cross_lcp() -> PolyLcp {
        let m = mat(&[(0, 1, 1.0), (1, 0, 1.0)], (2, 2));
        let lcp = Lcp::with_pairs(
            m,
            vec![-1.0, -1.0],
            vec![(0, 0), (1, 1)],
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap();
        PolyLcp::new(lcp)
    }

    #[test]
    fn id_round_trip() {
        let enc = vec![1, -1, 1, 1, -1];
        let id = PolyLcp::encoding_id(&enc);
        assert_eq!(id, 0b01101);
        assert_eq!(PolyLcp::id_encoding(id, 5), enc);
    }

    #[test]
    fn enumerate_all_visits_every_encoding() {
        let mut poly = cross_lcp();
        poly.enumerate_all(true).unwrap();
        assert_eq!(poly.max_theoretical(), 4);
        // encoding (+1, +1) is the solution polyhedron and must be kept
        assert!(poly.enumerated_ids().contains(&0b11));
        assert!(poly.n_polyhedra() >= 1);
    }

    #[test]
    fn feasibility_verdict_is_cached_and_order_independent() {
        let mut a = cross_lcp();
        let mut b = cross_lcp();
        // (-1, -1): x = 0 forces z = q = -1 < 0, infeasible
        let dead = vec![-1, -1];
        // (+1, +1): x = (1, 1), feasible
        let alive = vec![1, 1];
        assert!(!a.check_poly_feas_encoding(&dead).unwrap());
        assert!(a.check_poly_feas_encoding(&alive).unwrap());
        // reversed probing order on a fresh object gives the same verdicts
        assert!(b.check_poly_feas_encoding(&alive).unwrap());
        assert!(!b.check_poly_feas_encoding(&dead).unwrap());
        // cached now; adding elsewhere does not flip the verdict
        a.add_poly_from_encoding(&alive, true).unwrap();
        assert!(!a.check_poly_feas_encoding(&dead).unwrap());
    }

    #[test]
    fn duplicate_and_infeasible_additions_are_rejected() {
        let mut poly = cross_lcp();
        assert!(poly.add_poly_from_encoding(&vec![1, 1], true).unwrap());
        assert!(!poly.add_poly_from_encoding(&vec![1, 1], true).unwrap());
        assert!(!poly.add_poly_from_encoding(&vec![-1, -1], true).unwrap());
        assert_eq!(poly.n_polyhedra(), 1);
    }

    #[test]
    fn sequential_selection_skips_decided_ids() {
        let mut poly = cross_lcp();
        let added = poly.add_polyhedra(2, PolySelection::Sequential).unwrap();
        assert!(!added.is_empty());
        let ids: Vec<u64> = poly.enumerated_ids().iter().copied().collect();
        // no id may be cached infeasible
        for id in ids {
            assert!(!poly.infeasible.contains(&id));
        }
    }

    #[test]
    fn random_selection_is_reproducible_under_a_seed() {
        let mut a = cross_lcp();
        a.seed = Some(7);
        let added_a = a.add_polyhedra(2, PolySelection::Random).unwrap();
        let mut b = cross_lcp();
        b.seed = Some(7);
        let added_b = b.add_polyhedra(2, PolySelection::Random).unwrap();
        assert_eq!(added_a, added_b);
    }

    #[test]
    fn add_poly_from_point_promotes_zeros() {
        let mut poly = cross_lcp();
        // (1, 1) solves the LCP: z = (0, 0), both variables positive
        assert!(poly.add_poly_from_point(&[1.0, 1.0]).unwrap());
        assert!(poly.enumerated_ids().contains(&0b11));
        // the same point is now covered
        assert!(!poly.add_poly_from_point(&[1.0, 1.0]).unwrap());
    }

    #[test]
    fn hull_of_single_polyhedron_is_degenerate() {
        let mut poly = cross_lcp();
        poly.add_poly_from_encoding(&vec![1, 1], true).unwrap();
        let (a, b, n) = poly.convex_hull().unwrap();
        assert_eq!(n, 1);
        // polyhedron rows + side rows (none) + relaxation rows (-M | q)
        assert_eq!(a.rows(), 4);
        assert_eq!(a.cols(), 2);
        assert_eq!(b.len(), 4);
    }

    /// Same pairing with q = 0: every one of the four encodings is
    /// feasible, so the region genuinely has several pieces.
    fn wedge_lcp() -> PolyLcp {
        let m = mat(&[(0, 1, 1.0), (1, 0, 1.0)], (2, 2));
        let lcp = Lcp::with_pairs(
            m,
            vec![0.0, 0.0],
            vec![(0, 0), (1, 1)],
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap();
        PolyLcp::new(lcp)
    }

    #[test]
    fn hull_of_two_polyhedra_uses_extended_formulation() {
        let mut poly = wedge_lcp();
        poly.enumerate_all(true).unwrap();
        let n_poly = poly.n_polyhedra();
        assert!(n_poly >= 2, "the wedge LCP has several pieces");
        let n_c = 2;
        let (a, _, n) = poly.convex_hull().unwrap();
        assert_eq!(n, n_poly);
        assert_eq!(a.cols(), n_c + n_poly * n_c + n_poly);
        assert_eq!(poly.conv_poly_position(1), n_c + n_c);
        assert_eq!(poly.conv_poly_weight(0), n_c + n_poly * n_c);
    }
}
