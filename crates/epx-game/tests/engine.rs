//! End-to-end checks of the orchestrator on a hand-built single-leader
//! instance: one follower playing against a taxed Cournot market, the
//! leader minimising emissions.
//!
//! Follower: min (1/2)(0.6) y^2 + (10 - 300) y + t y  s.t.  y <= 100.
//! Leader: decides the tax t <= 20, minimises 1 * y.
//!
//! The follower's unconstrained optimum is (290 - t) / 0.6 >= 450, far
//! above the capacity, so y = 100 in every equilibrium while the tax can
//! sit anywhere inside its cap.

use epx_core::{matrix, SpMat};
use epx_game::{
    Algorithm, AlgorithmParams, CrossRef, Epec, EpecStatus, LeaderObjective, NashGame, QpParam,
};
use sprs::TriMat;
use std::cell::RefCell;
use std::rc::Rc;

fn mat(entries: &[(usize, usize, f64)], shape: (usize, usize)) -> SpMat {
    let mut tri = TriMat::new(shape);
    for &(r, c, v) in entries {
        tri.add_triplet(r, c, v);
    }
    tri.to_csr()
}

fn build_country(tax_cap: f64) -> NashGame {
    let mut follower = QpParam::new();
    follower
        .set(
            mat(&[(0, 0, 0.6)], (1, 1)),  // quad + 2 beta
            mat(&[(0, 0, 1.0)], (1, 1)),  // tax enters the marginal cost
            matrix::zeros(1, 1),          // no parameter in the constraint
            mat(&[(0, 0, 1.0)], (1, 1)),  // y <= capacity
            vec![10.0 - 300.0],
            vec![100.0],
        )
        .unwrap();
    // columns of the leader constraints: [y, t]
    let lead_cons = mat(&[(0, 1, 1.0)], (1, 2));
    NashGame::new(
        vec![Rc::new(RefCell::new(follower))],
        matrix::zeros(0, 0),
        vec![],
        1,
        lead_cons,
        vec![tax_cap],
    )
    .unwrap()
}

fn emission_objective() -> LeaderObjective {
    LeaderObjective {
        linear: vec![(0, 1.0)],
        quadratic: vec![],
        cross: vec![],
    }
}

fn build_epec(algorithm: Algorithm) -> Epec {
    let params = AlgorithmParams {
        algorithm,
        ..AlgorithmParams::default()
    };
    let mut epec = Epec::new(params);
    epec.add_leader(build_country(20.0)).unwrap();
    epec.set_leader_objective(0, emission_objective()).unwrap();
    epec.set_market_clearing(vec![]).unwrap();
    epec.finalize().unwrap();
    epec
}

#[test]
fn lifecycle_is_enforced() {
    let mut epec = Epec::new(AlgorithmParams::default());
    assert!(epec.find_nash_eq().is_err(), "solve before finalize");
    assert!(epec.finalize().is_err(), "finalize without countries");

    epec.add_leader(build_country(20.0)).unwrap();
    assert!(
        epec.finalize().is_err(),
        "finalize without a leader objective"
    );
    epec.set_leader_objective(0, emission_objective()).unwrap();
    epec.finalize().unwrap();
    assert!(epec.add_leader(build_country(20.0)).is_err(), "sealed");
    epec.unlock();
    assert!(epec.country_mut(0).is_ok(), "unlock reopens the build phase");
}

#[test]
fn full_enumeration_solves_the_capped_market() {
    let mut epec = build_epec(Algorithm::FullEnumeration);
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::NashEqFound);

    let x = epec.x_without_hull(0);
    // block layout: [y, t, lambda]
    assert!((x[0] - 100.0).abs() < 1e-3, "production: {}", x[0]);
    assert!(x[1] <= 20.0 + 1e-5, "tax respects its cap: {}", x[1]);
    // the verified equilibrium self-checks (property 7)
    assert!(epec.is_solved(1e-4).unwrap().0);
    assert!(epec.stats.wall_clock_time >= 0.0);
    assert_eq!(epec.stats.feasible_polyhedra.len(), 1);
    // a single feasible polyhedron makes the strategy trivially pure
    assert!(epec.is_pure_strategy(1e-5).unwrap());
    assert_eq!(epec.mixed_strategy_polyhedra(0, 1e-5).unwrap(), vec![0]);
    assert_eq!(epec.x_of_i(0).len(), epec.block_size(0));
    assert!(epec.upper_lcp().is_some());
}

#[test]
fn inner_approximation_matches_full_enumeration() {
    let mut epec = build_epec(Algorithm::InnerApproximation);
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::NashEqFound);
    let x = epec.x_without_hull(0);
    assert!((x[0] - 100.0).abs() < 1e-3, "production: {}", x[0]);
    assert!(epec.stats.num_iterations >= 1);
}

#[test]
fn combinatorial_pne_finds_a_pure_equilibrium() {
    let mut epec = build_epec(Algorithm::CombinatorialPne);
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::NashEqFound);
    assert!(epec.stats.pure_nash);
    let x = epec.x_without_hull(0);
    assert!((x[0] - 100.0).abs() < 1e-3);
}

#[test]
fn outer_approximation_agrees() {
    let mut epec = build_epec(Algorithm::OuterApproximation);
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::NashEqFound);
    let x = epec.x_without_hull(0);
    assert!((x[0] - 100.0).abs() < 1e-3, "production: {}", x[0]);
}

#[test]
fn impossible_tax_cap_reports_no_equilibrium() {
    // Tax cap below zero makes the leader constraints infeasible
    // (t >= 0 and t <= -5), so the lower level has no feasible point at all.
    let params = AlgorithmParams {
        algorithm: Algorithm::InnerApproximation,
        ..AlgorithmParams::default()
    };
    let mut epec = Epec::new(params);
    epec.add_leader(build_country(-5.0)).unwrap();
    epec.set_leader_objective(0, emission_objective()).unwrap();
    epec.set_market_clearing(vec![]).unwrap();
    epec.finalize().unwrap();
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::NashEqNotFound);
    assert_eq!(epec.stats.num_iterations, 1);
}

#[test]
fn time_limit_is_respected() {
    let params = AlgorithmParams {
        algorithm: Algorithm::InnerApproximation,
        time_limit: Some(0.0),
        ..AlgorithmParams::default()
    };
    let mut epec = Epec::new(params);
    epec.add_leader(build_country(20.0)).unwrap();
    epec.set_leader_objective(0, emission_objective()).unwrap();
    epec.set_market_clearing(vec![]).unwrap();
    epec.finalize().unwrap();
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::TimeLimit);
}

#[test]
fn leader_cross_reference_materialises() {
    // Two copies of the country trading nothing: cross terms reference the
    // other country's tax but with zero weight the equilibrium is unchanged.
    let params = AlgorithmParams {
        algorithm: Algorithm::FullEnumeration,
        ..AlgorithmParams::default()
    };
    let mut epec = Epec::new(params);
    epec.add_leader(build_country(20.0)).unwrap();
    epec.add_leader(build_country(20.0)).unwrap();
    for i in 0..2 {
        let mut obj = emission_objective();
        obj.cross.push((
            0,
            CrossRef::Leader {
                country: 1 - i,
                offset: 1,
            },
            0.0,
        ));
        epec.set_leader_objective(i, obj).unwrap();
    }
    epec.set_market_clearing(vec![]).unwrap();
    epec.finalize().unwrap();
    // both blocks were padded to the common width
    assert_eq!(epec.block_width(), 6);
    let status = epec.find_nash_eq().unwrap();
    assert_eq!(status, EpecStatus::NashEqFound);
    for i in 0..2 {
        assert!((epec.x_without_hull(i)[0] - 100.0).abs() < 1e-3);
    }
}
