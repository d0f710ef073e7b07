//! Cross-checks between the two mixed-integer reformulations and the
//! polyhedral machinery.

use epx_core::{matrix, SpMat};
use epx_game::{Lcp, PolyLcp};
use sprs::TriMat;

fn mat(entries: &[(usize, usize, f64)], shape: (usize, usize)) -> SpMat {
    let mut tri = TriMat::new(shape);
    for &(r, c, v) in entries {
        tri.add_triplet(r, c, v);
    }
    tri.to_csr()
}

/// An LCP whose solution set has several points, so the MPEC objective
/// matters: M = [[0, 1], [1, 0]], q = 0. Solutions are the two axes; the
/// side constraint keeps them bounded.
fn axes_lcp() -> Lcp {
    let m = mat(&[(0, 1, 1.0), (1, 0, 1.0)], (2, 2));
    let a_side = mat(&[(0, 0, 1.0), (0, 1, 1.0)], (1, 2));
    Lcp::with_pairs(
        m,
        vec![0.0, 0.0],
        vec![(0, 0), (1, 1)],
        a_side,
        vec![5.0],
    )
    .unwrap()
}

#[test]
fn big_m_and_indicator_optima_agree() {
    // maximize-ish: minimize -2 x0 - x1 over the axes: best is x = (5, 0)
    // with objective -10.
    let c = vec![-2.0, -1.0];
    let c_x = matrix::zeros(2, 0);

    let mut with_ind = axes_lcp();
    with_ind.use_indicators = true;
    let sol_ind = with_ind
        .mpec_as_milp(&c_x, &c, &[])
        .unwrap()
        .optimize()
        .unwrap();
    assert!(sol_ind.is_success());

    let mut with_big_m = axes_lcp();
    with_big_m.use_indicators = false;
    let sol_big_m = with_big_m
        .mpec_as_milp(&c_x, &c, &[])
        .unwrap()
        .optimize()
        .unwrap();
    assert!(sol_big_m.is_success());

    assert!(
        (sol_ind.objective - sol_big_m.objective).abs() < 1e-4,
        "indicator {} vs big-M {}",
        sol_ind.objective,
        sol_big_m.objective
    );
    assert!((sol_ind.objective + 10.0).abs() < 1e-4);
}

#[test]
fn both_reformulations_respect_complementarity() {
    for indicators in [true, false] {
        let mut lcp = axes_lcp();
        lcp.use_indicators = indicators;
        let sol = lcp.as_mip().unwrap().optimize().unwrap();
        let (x, z) = lcp.extract(&sol).expect("the axes LCP is feasible");
        for (i, &(eq, var)) in lcp.compl().iter().enumerate() {
            assert!(
                x[var].min(z[eq]) < 1e-5,
                "pair {i} violated with indicators={indicators}"
            );
        }
    }
}

#[test]
fn full_enumeration_hull_contains_every_piece() {
    let m = mat(&[(0, 1, 1.0), (1, 0, 1.0)], (2, 2));
    let a_side = mat(&[(0, 0, 1.0), (0, 1, 1.0)], (1, 2));
    let lcp = Lcp::with_pairs(
        m,
        vec![0.0, 0.0],
        vec![(0, 0), (1, 1)],
        a_side,
        vec![5.0],
    )
    .unwrap();
    let mut poly = PolyLcp::new(lcp);
    poly.enumerate_all(true).unwrap();
    let n_poly = poly.n_polyhedra();
    assert!(n_poly >= 2);
    let (a, b, _) = poly.convex_hull().unwrap();
    let n_c = 2;

    // A representative point from each piece, lifted into the extended
    // formulation with full weight on its own polyhedron, must satisfy the
    // hull system.
    let pieces: Vec<Vec<f64>> = vec![vec![3.0, 0.0], vec![0.0, 3.0], vec![0.0, 0.0]];
    for point in pieces {
        // find a polyhedron that accepts the point
        let enc = poly.base().solution_encoding(&point).unwrap();
        let mut owner = None;
        for (k, &id) in poly.polyhedron_ids().iter().enumerate() {
            let full = PolyLcp::id_encoding(id, 2);
            if enc
                .iter()
                .zip(&full)
                .all(|(&p, &f)| p == 0 || p == f)
            {
                owner = Some(k);
                break;
            }
        }
        let owner = owner.expect("every feasible point belongs to a piece");
        let mut lifted = vec![0.0; a.cols()];
        lifted[..n_c].copy_from_slice(&point);
        let copy_start = poly.conv_poly_position(owner);
        lifted[copy_start..copy_start + n_c].copy_from_slice(&point);
        lifted[poly.conv_poly_weight(owner)] = 1.0;
        let lhs = matrix::mul_vec(&a, &lifted).unwrap();
        for (r, &v) in lhs.iter().enumerate() {
            assert!(
                v <= b[r] + 1e-6,
                "hull row {r} violated: {v} > {}",
                b[r]
            );
        }
    }
}
