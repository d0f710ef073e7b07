//! The plain-text instance format.
//!
//! An instance is a list of countries plus a square transportation-cost
//! matrix with zero diagonal. The file is a sequence of self-describing
//! sections, each a header line followed by its payload, reusing the
//! length-prefixed framing of the engine's state files. `load` is the exact
//! inverse of `save`.

use crate::params::{CountryParams, DemandParams, FollowerParams, LeaderParams, TaxParadigm};
use epx_core::{matrix, persist, EpxError, EpxResult, SpMat};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct EpecInstance {
    pub countries: Vec<CountryParams>,
    pub transport_costs: SpMat,
}

impl EpecInstance {
    pub fn new(countries: Vec<CountryParams>, transport_costs: SpMat) -> EpxResult<Self> {
        let instance = EpecInstance {
            countries,
            transport_costs,
        };
        instance.validate()?;
        Ok(instance)
    }

    pub fn validate(&self) -> EpxResult<()> {
        let n = self.countries.len();
        for c in &self.countries {
            c.validate()?;
        }
        for (i, a) in self.countries.iter().enumerate() {
            for b in &self.countries[i + 1..] {
                if a.name == b.name {
                    return Err(EpxError::Validation(format!(
                        "duplicate country name {}",
                        a.name
                    )));
                }
            }
        }
        let t = &self.transport_costs;
        if t.rows() != n || t.cols() != n {
            return Err(EpxError::Validation(format!(
                "transportation matrix is {}x{} for {n} countries",
                t.rows(),
                t.cols()
            )));
        }
        if (0..n).any(|i| matrix::get(t, i, i) != 0.0) {
            return Err(EpxError::Validation(
                "transportation matrix must have a zero diagonal".into(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> EpxResult<()> {
        self.validate()?;
        persist::with_file(path, true, |w| {
            persist::save_marker(w, "EPECInstance")?;
            persist::save_usize(w, "Countries", self.countries.len())?;
            for c in &self.countries {
                persist::save_marker(w, "Country")?;
                persist::save_marker(w, "Name")?;
                persist::save_marker(w, &c.name)?;
                persist::save_usize(w, "Followers", c.n_followers())?;
                persist::save_marker(w, "FollowerNames")?;
                persist::save_usize(w, "Count", c.followers.names.len())?;
                for name in &c.followers.names {
                    persist::save_marker(w, name)?;
                }
                persist::save_vec(w, "CostsLinear", &c.followers.costs_lin)?;
                persist::save_vec(w, "CostsQuadratic", &c.followers.costs_quad)?;
                persist::save_vec(w, "Capacities", &c.followers.capacities)?;
                persist::save_vec(w, "EmissionCosts", &c.followers.emission_costs)?;
                persist::save_vec(w, "TaxCaps", &c.followers.tax_caps)?;
                persist::save_vec(w, "Demand", &[c.demand.alpha, c.demand.beta])?;
                persist::save_marker(w, "Leader")?;
                persist::save_vec(
                    w,
                    "Limits",
                    &[
                        c.leader.import_limit,
                        c.leader.export_limit,
                        c.leader.price_limit,
                    ],
                )?;
                persist::save_usize(
                    w,
                    "TaxRevenue",
                    if c.leader.tax_revenue { 1 } else { 0 },
                )?;
                persist::save_marker(w, "TaxParadigm")?;
                persist::save_marker(w, c.leader.tax_paradigm.tag())?;
            }
            persist::save_mat(w, "TransportCosts", &self.transport_costs)
        })
    }

    pub fn load(path: &Path) -> EpxResult<Self> {
        let mut loader = persist::Loader::from_path(path)?;
        loader.expect("EPECInstance")?;
        let n = loader.read_headed_usize("Countries")?;
        let mut countries = Vec::with_capacity(n);
        for _ in 0..n {
            loader.expect("Country")?;
            loader.expect("Name")?;
            let name = loader.read_token()?;
            let n_followers = loader.read_headed_usize("Followers")?;
            loader.expect("FollowerNames")?;
            let n_names = loader.read_headed_usize("Count")?;
            let mut names = Vec::with_capacity(n_names);
            for _ in 0..n_names {
                names.push(loader.read_token()?);
            }
            let costs_lin = loader.read_vec("CostsLinear")?;
            let costs_quad = loader.read_vec("CostsQuadratic")?;
            let capacities = loader.read_vec("Capacities")?;
            let emission_costs = loader.read_vec("EmissionCosts")?;
            let tax_caps = loader.read_vec("TaxCaps")?;
            let demand = loader.read_vec("Demand")?;
            if demand.len() != 2 {
                return Err(EpxError::Parse("Demand must hold alpha and beta".into()));
            }
            loader.expect("Leader")?;
            let limits = loader.read_vec("Limits")?;
            if limits.len() != 3 {
                return Err(EpxError::Parse("Limits must hold three values".into()));
            }
            let tax_revenue = loader.read_headed_usize("TaxRevenue")? != 0;
            loader.expect("TaxParadigm")?;
            let tax_paradigm = TaxParadigm::from_tag(&loader.read_token()?)?;
            if costs_lin.len() != n_followers {
                return Err(EpxError::Parse(format!(
                    "country {name}: {} linear costs for {n_followers} followers",
                    costs_lin.len()
                )));
            }
            countries.push(CountryParams {
                name,
                followers: FollowerParams {
                    costs_quad,
                    costs_lin,
                    capacities,
                    emission_costs,
                    tax_caps,
                    names,
                },
                demand: DemandParams {
                    alpha: demand[0],
                    beta: demand[1],
                },
                leader: LeaderParams {
                    import_limit: limits[0],
                    export_limit: limits[1],
                    price_limit: limits[2],
                    tax_revenue,
                    tax_paradigm,
                },
            });
        }
        let transport_costs = loader.read_mat("TransportCosts")?;
        Self::new(countries, transport_costs)
    }
}
