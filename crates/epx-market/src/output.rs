//! Solution writers: structured JSON and a human-readable report.

use crate::market::{LeaderVar, MarketEpec};
use epx_core::EpxResult;
use epx_game::{EpecStatistics, EpecStatus};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Structured view of a solved (or exhausted) market, serialised as the
/// level-0 solution file.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionReport {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: EpecStatus,
    pub pure_nash: bool,
    pub countries: Vec<CountryReport>,
    pub statistics: EpecStatistics,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryReport {
    pub name: String,
    pub followers: Vec<FollowerReport>,
    pub domestic_production: f64,
    pub net_import: f64,
    pub net_export: f64,
    pub imports: Vec<ImportReport>,
    pub domestic_consumption: f64,
    pub domestic_price: f64,
    pub export_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowerReport {
    pub name: String,
    pub production: f64,
    pub capacity: f64,
    pub tax: f64,
    pub marginal_cost: f64,
    pub production_cost: f64,
    pub emission_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub from: String,
    pub quantity: f64,
    pub unit_transport_cost: f64,
}

impl MarketEpec {
    /// Snapshot of the current solution (valid after `find_nash_eq` stored
    /// a solution; empty vectors otherwise are reported as zeros).
    pub fn solution_report(&self) -> EpxResult<SolutionReport> {
        let solved = self.engine().nash_eq_found();
        let mut countries = Vec::with_capacity(self.n_countries());
        for i in 0..self.n_countries() {
            let params = self.country_params(i).clone();
            let n = params.n_followers();
            let mut followers = Vec::with_capacity(n);
            for j in 0..n {
                let q = if solved {
                    self.follower_production(i, j)
                } else {
                    0.0
                };
                let tax = if solved { self.follower_tax(i, j) } else { 0.0 };
                let lin = params.followers.costs_lin[j];
                let quad = params.followers.costs_quad[j];
                followers.push(FollowerReport {
                    name: params.follower_name(j),
                    production: q,
                    capacity: params.followers.capacities[j],
                    tax,
                    marginal_cost: lin + tax + quad * q,
                    production_cost: (lin + tax) * q + 0.5 * quad * q * q,
                    emission_cost: params.followers.emission_costs[j],
                });
            }
            let imports = self
                .import_sources(i)
                .iter()
                .enumerate()
                .map(|(idx, &src)| ImportReport {
                    from: self.country_params(src).name.clone(),
                    quantity: if solved { self.country_import(i, idx) } else { 0.0 },
                    unit_transport_cost: epx_core::matrix::get(self.transport_costs(), src, i),
                })
                .collect();
            let production = if solved { self.domestic_production(i) } else { 0.0 };
            let net_import = if solved { self.net_import(i) } else { 0.0 };
            let net_export = if solved { self.net_export(i) } else { 0.0 };
            countries.push(CountryReport {
                name: params.name.clone(),
                followers,
                domestic_production: production,
                net_import,
                net_export,
                imports,
                domestic_consumption: production + net_import - net_export,
                domestic_price: if solved { self.domestic_price(i) } else { 0.0 },
                export_price: if solved { self.export_price(i) } else { 0.0 },
            });
        }
        Ok(SolutionReport {
            timestamp: chrono::Utc::now(),
            status: self.status(),
            pure_nash: self.statistics().pure_nash,
            countries,
            statistics: self.statistics().clone(),
        })
    }

    /// Writes the solution at the given level: 0 = structured JSON only,
    /// 1 = human-readable only, 2 = both. `prefix` gets `.json` / `.txt`
    /// appended.
    pub fn write_solution(&self, level: u8, prefix: &Path) -> EpxResult<()> {
        let report = self.solution_report()?;
        if level == 0 || level == 2 {
            let path = prefix.with_extension("json");
            let file = std::fs::File::create(&path)?;
            serde_json::to_writer_pretty(file, &report)
                .map_err(|e| epx_core::EpxError::Io(std::io::Error::other(e)))?;
        }
        if level == 1 || level == 2 {
            let path = prefix.with_extension("txt");
            let mut w = std::io::BufWriter::new(std::fs::File::create(&path)?);
            write_human_readable(&mut w, self, &report)?;
        }
        Ok(())
    }
}

fn label_val(w: &mut impl Write, label: &str, value: f64) -> std::io::Result<()> {
    writeln!(w, "{label:<50}{value:>16.2}")
}

fn write_human_readable(
    w: &mut impl Write,
    market: &MarketEpec,
    report: &SolutionReport,
) -> EpxResult<()> {
    writeln!(w, "##################################################")?;
    writeln!(w, "EPEC solution report   {}", report.timestamp)?;
    writeln!(w, "Status: {:?}   pure: {}", report.status, report.pure_nash)?;
    writeln!(w, "##################################################")?;
    for country in &report.countries {
        writeln!(w, "\n**************************************************")?;
        writeln!(w, "COUNTRY: {}", country.name)?;
        writeln!(w, "**************************************************")?;
        label_val(w, "Domestic production", country.domestic_production)?;
        if country.net_export >= country.net_import {
            label_val(w, "Net exports", country.net_export - country.net_import)?;
        } else {
            label_val(w, "Net imports", country.net_import - country.net_export)?;
        }
        label_val(w, " -> Total export", country.net_export)?;
        label_val(w, " -> Total import", country.net_import)?;
        for import in &country.imports {
            label_val(
                w,
                &format!("    from {} (transport {:.2})", import.from, import.unit_transport_cost),
                import.quantity,
            )?;
        }
        label_val(w, "Domestic consumed quantity", country.domestic_consumption)?;
        label_val(w, "Domestic price", country.domestic_price)?;
        label_val(w, "Export price", country.export_price)?;
        writeln!(w, "- - - - - - - - - - - - - - - - - - - - - - - - - ")?;
        writeln!(w, "FOLLOWER DETAILS:")?;
        for follower in &country.followers {
            writeln!(w, "\n{} --- {}", country.name, follower.name)?;
            label_val(w, "Quantity produced", follower.production)?;
            label_val(w, "Capacity of production", follower.capacity)?;
            label_val(w, "Tax imposed", follower.tax)?;
            label_val(w, "Marginal cost of production", follower.marginal_cost)?;
            label_val(w, "Production cost", follower.production_cost)?;
            label_val(w, "Emission cost", follower.emission_cost)?;
        }
    }
    writeln!(w, "\n##################################################")?;
    writeln!(w, "############### COUNTRY PARAMETERS ###############")?;
    writeln!(w, "##################################################")?;
    for i in 0..market.n_countries() {
        writeln!(w, "\n{}", market.country_params(i))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::market::MarketEpec;
    use crate::params::{CountryParams, DemandParams, FollowerParams, LeaderParams};
    use epx_game::AlgorithmParams;

    #[test]
    fn reports_are_written_before_a_solve() {
        let mut market = MarketEpec::new(AlgorithmParams::default());
        market
            .add_country(CountryParams {
                name: "Solo".into(),
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
            })
            .unwrap();
        market.finalize().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("solution");
        market.write_solution(2, &prefix).unwrap();
        let json = std::fs::read_to_string(prefix.with_extension("json")).unwrap();
        assert!(json.contains("\"Solo\""));
        assert!(json.contains("Uninitialized"));
        let txt = std::fs::read_to_string(prefix.with_extension("txt")).unwrap();
        assert!(txt.contains("COUNTRY: Solo"));
        assert!(txt.contains("FOLLOWER DETAILS:"));
    }
}
