//! Outer polyhedral approximation of an LCP's feasible region.
//!
//! Components here are *partial* encodings: zeros leave complementarities
//! unresolved, so each component is a polyhedral relaxation and the union of
//! components over-approximates the feasible region. Infeasibility of a
//! partial encoding proves infeasibility of every completion, which the
//! feasibility cache exploits to prune whole subtrees during branching.
//!
//! Identifiers pack two bits per complementarity (00 unresolved, 01 for +1,
//! 10 for -1), so partial encodings get distinct identifiers.

use super::{balas_hull, Lcp};
use crate::qp::{QpConstraints, QpObjective, QpParam};
use crate::Encoding;
use epx_core::{matrix, EpxError, EpxResult, SpMat};
use std::collections::BTreeSet;
use tracing::{debug, trace};

pub struct OuterLcp {
    lcp: Lcp,
    /// Components already part of the approximation.
    approximation: BTreeSet<u64>,
    feasible: BTreeSet<u64>,
    infeasible: BTreeSet<u64>,
    ai: Vec<SpMat>,
    bi: Vec<Vec<f64>>,
    feasible_count: usize,
    feas_approx: bool,
}

impl OuterLcp {
    pub fn new(lcp: Lcp) -> EpxResult<Self> {
        if lcp.n_rows() > 32 {
            return Err(EpxError::InvalidShape(
                "outer approximation supports at most 32 complementarities".into(),
            ));
        }
        Ok(OuterLcp {
            lcp,
            approximation: BTreeSet::new(),
            feasible: BTreeSet::new(),
            infeasible: BTreeSet::new(),
            ai: Vec::new(),
            bi: Vec::new(),
            feasible_count: 0,
            feas_approx: false,
        })
    }

    pub fn base(&self) -> &Lcp {
        &self.lcp
    }

    pub fn base_mut(&mut self) -> &mut Lcp {
        &mut self.lcp
    }

    pub fn n_components(&self) -> usize {
        self.ai.len()
    }

    /// Whether the last [`OuterLcp::outer_approximate`] kept at least one
    /// feasible component.
    pub fn feasible_approximation(&self) -> bool {
        self.feas_approx
    }

    pub fn feasible_count(&self) -> usize {
        self.feasible_count
    }

    /// Packs a partial encoding, two bits per complementarity.
    pub fn component_id(enc: &Encoding) -> u64 {
        enc.iter().enumerate().fold(0u64, |acc, (i, &v)| {
            let bits = match v {
                1 => 0b01,
                -1 => 0b10,
                _ => 0b00,
            };
            acc | (bits << (2 * i))
        })
    }

    pub fn id_component(id: u64, n: usize) -> Encoding {
        (0..n)
            .map(|i| match (id >> (2 * i)) & 0b11 {
                0b01 => 1,
                0b10 => -1,
                _ => 0,
            })
            .collect()
    }

    pub fn clear_approximation(&mut self) {
        self.ai.clear();
        self.bi.clear();
        self.approximation.clear();
        self.feas_approx = false;
    }

    /// Rebuilds the approximation for the given set of branched
    /// complementarities: every branched position expands into +1 and -1,
    /// unbranched positions stay unresolved.
    pub fn outer_approximate(&mut self, branched: &[bool], clear: bool) -> EpxResult<()> {
        if branched.len() != self.lcp.n_rows() {
            return Err(EpxError::InvalidShape(format!(
                "branch mask of length {}, expected {}",
                branched.len(),
                self.lcp.n_rows()
            )));
        }
        if clear {
            self.clear_approximation();
        }
        let mut enc = vec![0i8; branched.len()];
        let positions: Vec<usize> = branched
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        self.expand(&positions, 0, &mut enc)?;
        debug!(
            components = self.ai.len(),
            feasible = self.feas_approx,
            "rebuilt the outer approximation"
        );
        Ok(())
    }

    fn expand(&mut self, positions: &[usize], depth: usize, enc: &mut Encoding) -> EpxResult<()> {
        if depth == positions.len() {
            self.add_component(&enc.clone(), true)?;
            return Ok(());
        }
        let p = positions[depth];
        enc[p] = 1;
        self.expand(positions, depth + 1, enc)?;
        enc[p] = -1;
        self.expand(positions, depth + 1, enc)?;
        enc[p] = 0;
        Ok(())
    }

    /// Adds one (possibly partial) component, checking feasibility first
    /// when asked. Returns whether it was added.
    pub fn add_component(&mut self, enc: &Encoding, check_feas: bool) -> EpxResult<bool> {
        if enc.len() != self.lcp.n_rows() {
            return Err(EpxError::InvalidShape(format!(
                "encoding of length {}, expected {}",
                enc.len(),
                self.lcp.n_rows()
            )));
        }
        let id = Self::component_id(enc);
        trace!(id, "considering component");
        if check_feas && !self.check_component_feas(enc)? {
            return Ok(false);
        }
        if self.approximation.contains(&id) {
            trace!(id, "component previously added");
            return Ok(false);
        }
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
                _ => {}
            }
        }
        self.approximation.insert(id);
        self.ai.push(tri.to_csr());
        self.bi.push(b);
        self.feas_approx = true;
        Ok(true)
    }

    /// Feasibility of a partial encoding on the relaxed model. A cached
    /// infeasible parent settles every child without touching the solver.
    pub fn check_component_feas(&mut self, enc: &Encoding) -> EpxResult<bool> {
        let id = Self::component_id(enc);
        if self.infeasible.contains(&id) {
            trace!(id, "known infeasible component");
            return Ok(false);
        }
        if self.feasible.contains(&id) {
            trace!(id, "known feasible component");
            return Ok(true);
        }
        let n = self.lcp.n_rows();
        let parents: Vec<u64> = self.infeasible.iter().copied().collect();
        for parent_id in parents {
            let parent = Self::id_component(parent_id, n);
            if is_parent(&parent, enc) {
                trace!(id, parent_id, "completion of an infeasible component");
                self.infeasible.insert(id);
                return Ok(false);
            }
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

    /// Convex hull of the current components — same contract as the inner
    /// approximation's hull.
    pub fn convex_hull(&self) -> EpxResult<(SpMat, Vec<f64>, usize)> {
        if self.ai.is_empty() {
            return Err(EpxError::Unprepared(
                "no component has been added to the outer approximation".into(),
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

    /// Same contract as the inner approximation's `make_qp`.
    pub fn make_qp(&mut self, mut obj: QpObjective, qp: &mut QpParam) -> EpxResult<()> {
        let old_nx = obj.c_x.cols();
        let (b_hull, b_rhs, n_comp) = self.convex_hull()?;
        self.feasible_count = n_comp;
        debug!(n_comp, rows = b_hull.rows(), "built the outer hull QP");
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
}

/// `father` with zeros treated as wildcards covers `child`.
fn is_parent(father: &Encoding, child: &Encoding) -> bool {
    father
        .iter()
        .zip(child)
        .all(|(&f, &c)| f == 0 || f == c)
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

    fn cross_lcp() -> OuterLcp {
        let m = mat(&[(0, 1, 1.0), (1, 0, 1.0)], (2, 2));
        let lcp = Lcp::with_pairs(
            m,
            vec![-1.0, -1.0],
            vec![(0, 0), (1, 1)],
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap();
        OuterLcp::new(lcp).unwrap()
    }

    #[test]
    fn component_ids_distinguish_partial_fixings() {
        let a = OuterLcp::component_id(&vec![0, 1, -1]);
        let b = OuterLcp::component_id(&vec![-1, 1, 0]);
        let c = OuterLcp::component_id(&vec![0, 0, 0]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(OuterLcp::id_component(a, 3), vec![0, 1, -1]);
    }

    #[test]
    fn root_approximation_is_the_relaxation() {
        let mut outer = cross_lcp();
        outer.outer_approximate(&[false, false], true).unwrap();
        assert_eq!(outer.n_components(), 1);
        assert!(outer.feasible_approximation());
    }

    #[test]
    fn branching_splits_into_children() {
        let mut outer = cross_lcp();
        outer.outer_approximate(&[true, false], true).unwrap();
        // (+1, 0) keeps z0 = 0 (x1 = 1); (-1, 0) fixes x0 = 0, which kills
        // z1 = x0 - 1 >= 0 -> only one child survives
        assert_eq!(outer.n_components(), 1);
        assert!(outer.feasible_approximation());
    }

    #[test]
    fn infeasible_parent_prunes_children() {
        let mut outer = cross_lcp();
        // (-1, 0) is infeasible as a partial encoding...
        assert!(!outer.check_component_feas(&vec![-1, 0]).unwrap());
        // ... so its completions are settled without another LP
        assert!(!outer.check_component_feas(&vec![-1, 1]).unwrap());
        assert!(!outer.check_component_feas(&vec![-1, -1]).unwrap());
    }

    #[test]
    fn outer_hull_over_approximates() {
        let mut outer = cross_lcp();
        outer.outer_approximate(&[true, true], true).unwrap();
        let (a, b, n) = outer.convex_hull().unwrap();
        assert_eq!(n, outer.n_components());
        assert_eq!(a.rows(), b.len());
    }
}
