//! End-to-end market scenarios with closed-form reference values.
//!
//! Every expected number below is derived from the follower stationarity
//! conditions and the leader's emission-minimising objective; the tests
//! check the solver reproduces them under the default indicator
//! reformulation (and once under big-M).

use epx_core::matrix;
use epx_game::{Algorithm, AlgorithmParams, EpecStatus};
use epx_market::{
    CountryParams, DemandParams, FollowerParams, LeaderParams, MarketEpec, TaxParadigm,
};

fn params(algorithm: Algorithm) -> AlgorithmParams {
    AlgorithmParams {
        algorithm,
        ..AlgorithmParams::default()
    }
}

fn solo_country(name: &str, tax_cap: f64, price_limit: f64) -> CountryParams {
    CountryParams {
        name: name.into(),
        followers: FollowerParams {
            costs_quad: vec![0.5],
            costs_lin: vec![10.0],
            capacities: vec![100.0],
            emission_costs: vec![1.0],
            tax_caps: vec![tax_cap],
            names: vec!["producer".into()],
        },
        demand: DemandParams {
            alpha: 300.0,
            beta: 0.05,
        },
        leader: LeaderParams {
            price_limit,
            ..LeaderParams::default()
        },
    }
}

fn single_country_market(country: CountryParams, algorithm: Algorithm) -> MarketEpec {
    let mut market = MarketEpec::new(params(algorithm));
    market.add_country(country).unwrap();
    market.finalize().unwrap();
    market
}

/// One follower, no tax cap, no price cap: the emission-minimising leader
/// taxes production away entirely; any supporting tax is at least
/// alpha - lin = 290.
#[test]
fn scenario_1_unbounded_tax_shuts_production() {
    let mut market = single_country_market(
        solo_country("One", -1.0, -1.0),
        Algorithm::FullEnumeration,
    );
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!(market.follower_production(0, 0).abs() < 1e-3);
    assert!(market.follower_tax(0, 0) >= 290.0 - 1e-3);
    assert!(market.is_solved(1e-4).unwrap());
}

/// Tax cap 20: the follower's interior optimum (290 - t)/0.6 >= 450 stays
/// far above the capacity, so production pins at 100 whatever the tax.
#[test]
fn scenario_2_tax_cap_keeps_capacity_binding() {
    let mut market = single_country_market(
        solo_country("Two", 20.0, -1.0),
        Algorithm::FullEnumeration,
    );
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!((market.follower_production(0, 0) - 100.0).abs() < 1e-3);
    let tax = market.follower_tax(0, 0);
    assert!((-1e-6..=20.0 + 1e-6).contains(&tax), "tax = {tax}");
    assert!(market.is_solved(1e-4).unwrap());
}

/// Price cap 299 forces at least 20 units onto the market; minimising
/// emissions stops exactly there, and the interior stationarity pins the
/// tax at 290 - 0.6 * 20 = 278.
#[test]
fn scenario_3_price_cap_floors_the_quantity() {
    let mut market = single_country_market(
        solo_country("Three", -1.0, 299.0),
        Algorithm::FullEnumeration,
    );
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!((market.follower_production(0, 0) - 20.0).abs() < 1e-2);
    assert!((market.follower_tax(0, 0) - 278.0).abs() < 0.1);
}

/// Scenario 3 again under the big-M reformulation: same equilibrium
/// quantities as with indicator constraints.
#[test]
fn scenario_3_big_m_matches_indicators() {
    let mut p = params(Algorithm::FullEnumeration);
    p.indicators = false;
    let mut market = MarketEpec::new(p);
    market
        .add_country(solo_country("ThreeM", -1.0, 299.0))
        .unwrap();
    market.finalize().unwrap();
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!((market.follower_production(0, 0) - 20.0).abs() < 1e-2);
}

fn gas_coal_country(name: &str) -> CountryParams {
    CountryParams {
        name: name.into(),
        followers: FollowerParams {
            costs_quad: vec![0.5, 0.3],
            costs_lin: vec![130.0, 120.0],
            capacities: vec![100.0, 150.0],
            emission_costs: vec![6.0, 10.0],
            tax_caps: vec![100.0, 100.0],
            names: vec!["gas".into(), "coal".into()],
        },
        demand: DemandParams {
            alpha: 300.0,
            beta: 0.5,
        },
        leader: LeaderParams {
            price_limit: 230.0,
            ..LeaderParams::default()
        },
    }
}

/// Two followers under a price cap of 230: total supply must reach 140, the
/// low-emission gas unit runs at capacity, coal fills the gap at 40 with a
/// tax of 78, and the cap binds the price at 230.
#[test]
fn scenario_4_two_followers_with_price_cap() {
    let mut market = single_country_market(
        gas_coal_country("Four"),
        Algorithm::InnerApproximation,
    );
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!((market.follower_production(0, 0) - 100.0).abs() < 1e-2);
    assert!((market.follower_production(0, 1) - 40.0).abs() < 1e-2);
    assert!(market.follower_tax(0, 0).abs() < 0.1);
    assert!((market.follower_tax(0, 1) - 78.0).abs() < 0.1);
    assert!((market.domestic_price(0) - 230.0).abs() < 0.1);
    assert!(market.is_solved(1e-4).unwrap());
}

/// Duopoly of two single-producer countries with open (costly) trade, taxes
/// capped at zero and no emission pressure: importing is a pure cost for
/// both governments, so the equilibrium is autarky with each market at its
/// own Cournot monopoly output (90 / 2.1 and 95 / 2.2).
#[test]
fn scenario_5_cournot_duopoly_trades_nothing() {
    let mk = |name: &str, lin: f64, quad: f64| CountryParams {
        name: name.into(),
        followers: FollowerParams {
            costs_quad: vec![quad],
            costs_lin: vec![lin],
            capacities: vec![-1.0],
            emission_costs: vec![0.0],
            tax_caps: vec![0.0],
            names: vec![],
        },
        demand: DemandParams {
            alpha: 100.0,
            beta: 1.0,
        },
        leader: LeaderParams::default(),
    };
    let mut market = MarketEpec::new(params(Algorithm::InnerApproximation));
    market.add_country(mk("Alpha", 10.0, 0.1)).unwrap();
    market.add_country(mk("Beta", 5.0, 0.2)).unwrap();
    let mut costs = sprs::TriMat::new((2, 2));
    costs.add_triplet(0, 1, 1.0);
    costs.add_triplet(1, 0, 1.0);
    market.add_transport_costs(costs.to_csr()).unwrap();
    market.finalize().unwrap();

    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!((market.follower_production(0, 0) - 90.0 / 2.1).abs() < 0.1);
    assert!((market.follower_production(1, 0) - 95.0 / 2.2).abs() < 0.1);
    for i in 0..2 {
        assert!(market.net_import(i).abs() < 1e-3);
        assert!(market.net_export(i).abs() < 1e-3);
    }
    assert!(market.is_solved(1e-3).unwrap());
}

/// Two isolated markets (gas/coal and gas/solar) with price caps 230 and
/// 240 and no trade channels: country A reproduces scenario 4, country B
/// splits its 120 mandated units between solar at its tax-free optimum
/// (71.43) and taxed gas (48.57).
#[test]
fn scenario_6_two_markets_without_trade() {
    let country_b = CountryParams {
        name: "Bravo".into(),
        followers: FollowerParams {
            costs_quad: vec![0.5, 0.9],
            costs_lin: vec![130.0, 140.0],
            capacities: vec![100.0, 100.0],
            emission_costs: vec![6.0, 1.0],
            tax_caps: vec![100.0, 100.0],
            names: vec!["gas".into(), "solar".into()],
        },
        demand: DemandParams {
            alpha: 300.0,
            beta: 0.5,
        },
        leader: LeaderParams {
            price_limit: 240.0,
            ..LeaderParams::default()
        },
    };
    let mut market = MarketEpec::new(params(Algorithm::InnerApproximation));
    market.add_country(gas_coal_country("Alpha")).unwrap();
    market.add_country(country_b).unwrap();
    market
        .add_transport_costs(matrix::zeros(2, 2))
        .unwrap();
    market.finalize().unwrap();

    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    // country A: the scenario-4 equilibrium
    assert!((market.follower_production(0, 0) - 100.0).abs() < 1e-2);
    assert!((market.follower_production(0, 1) - 40.0).abs() < 1e-2);
    assert!(market.follower_tax(0, 0).abs() < 0.1);
    assert!((market.follower_tax(0, 1) - 78.0).abs() < 0.1);
    // country B: 48.57 gas, 71.43 solar with taxes 61.43 and 0
    assert!((market.follower_production(1, 0) - 340.0 / 7.0).abs() < 0.1);
    assert!((market.follower_production(1, 1) - 500.0 / 7.0).abs() < 0.1);
    assert!((market.follower_tax(1, 0) - 430.0 / 7.0).abs() < 0.1);
    assert!(market.follower_tax(1, 1).abs() < 0.1);
    // empty trade: imports and exports vanish everywhere
    for i in 0..2 {
        assert!(market.net_import(i).abs() < 1e-4);
        assert!(market.net_export(i).abs() < 1e-4);
    }
}

/// A price cap below what the lone follower can ever serve makes the lower
/// level infeasible; the first iteration proves it.
#[test]
fn infeasible_price_cap_fails_in_the_first_iteration() {
    let mut market = single_country_market(
        solo_country("Impossible", -1.0, 250.0),
        Algorithm::InnerApproximation,
    );
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqNotFound);
    assert_eq!(market.statistics().num_iterations, 1);
}

/// The solution files round through JSON with the solved values.
#[test]
fn solution_report_serialises() {
    let mut market = single_country_market(
        solo_country("Report", 20.0, -1.0),
        Algorithm::FullEnumeration,
    );
    market.find_nash_eq().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("out");
    market.write_solution(2, &prefix).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(prefix.with_extension("json")).unwrap())
            .unwrap();
    assert_eq!(json["status"], "NashEqFound");
    let production = json["countries"][0]["followers"][0]["production"]
        .as_f64()
        .unwrap();
    assert!((production - 100.0).abs() < 1e-2);
    assert!(prefix.with_extension("txt").exists());
}

/// The combinatorial strategy certifies a pure equilibrium on the
/// single-country instance.
#[test]
fn combinatorial_pne_on_the_solo_market() {
    let mut market = single_country_market(
        solo_country("Comb", 20.0, -1.0),
        Algorithm::CombinatorialPne,
    );
    assert_eq!(market.find_nash_eq().unwrap(), EpecStatus::NashEqFound);
    assert!(market.statistics().pure_nash);
    assert!((market.follower_production(0, 0) - 100.0).abs() < 1e-3);
}
