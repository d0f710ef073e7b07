//! Parameter structures of a country model.
//!
//! A negative value means "no limit" wherever a bound is optional; the
//! pretty-printers render those as infinity.

use epx_core::{EpxError, EpxResult};
use serde::Serialize;
use std::fmt;

/// How the government taxes its producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaxParadigm {
    /// One tax variable per follower.
    Standard,
    /// A single tax rate applied to every follower.
    Single,
    /// A single rate scaled by each follower's emission cost.
    Carbon,
}

impl TaxParadigm {
    /// Number of tax variables in the leader's decision space.
    pub fn tax_vars(&self, n_followers: usize) -> usize {
        match self {
            TaxParadigm::Standard => n_followers,
            TaxParadigm::Single | TaxParadigm::Carbon => 1,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            TaxParadigm::Standard => "standard",
            TaxParadigm::Single => "single",
            TaxParadigm::Carbon => "carbon",
        }
    }

    pub fn from_tag(tag: &str) -> EpxResult<Self> {
        match tag {
            "standard" => Ok(TaxParadigm::Standard),
            "single" => Ok(TaxParadigm::Single),
            "carbon" => Ok(TaxParadigm::Carbon),
            other => Err(EpxError::Parse(format!("unknown tax paradigm: {other}"))),
        }
    }
}

/// Producer-side parameters; all vectors have one entry per follower.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FollowerParams {
    /// Quadratic cost coefficient: producing `q` costs
    /// `costs_lin * q + (1/2) costs_quad * q^2`.
    pub costs_quad: Vec<f64>,
    pub costs_lin: Vec<f64>,
    /// Physical production capacity (-1 for unlimited).
    pub capacities: Vec<f64>,
    /// Emission cost per unit; enters the leader's objective only.
    pub emission_costs: Vec<f64>,
    /// Cap on the tax imposed on each follower (-1 for none).
    pub tax_caps: Vec<f64>,
    /// Optional follower names (whitespace-free); empty or one per follower.
    pub names: Vec<String>,
}

/// Demand curve: `price = alpha - beta * (total quantity in the market)`.
#[derive(Debug, Clone, Serialize)]
pub struct DemandParams {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for DemandParams {
    fn default() -> Self {
        DemandParams {
            alpha: 100.0,
            beta: 2.0,
        }
    }
}

/// Government-side parameters.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderParams {
    /// Maximum net import (-1 for no limit).
    pub import_limit: f64,
    /// Maximum net export (-1 for no limit).
    pub export_limit: f64,
    /// Cap on the domestic price (-1 for none).
    pub price_limit: f64,
    /// Include tax revenue in the leader's objective.
    pub tax_revenue: bool,
    pub tax_paradigm: TaxParadigm,
}

impl Default for LeaderParams {
    fn default() -> Self {
        LeaderParams {
            import_limit: -1.0,
            export_limit: -1.0,
            price_limit: -1.0,
            tax_revenue: false,
            tax_paradigm: TaxParadigm::Standard,
        }
    }
}

/// All parameters of one country.
#[derive(Debug, Clone, Serialize)]
pub struct CountryParams {
    pub name: String,
    pub followers: FollowerParams,
    pub demand: DemandParams,
    pub leader: LeaderParams,
}

impl CountryParams {
    pub fn n_followers(&self) -> usize {
        self.followers.costs_lin.len()
    }

    /// Validates internal consistency (sizes, signs, usable names).
    pub fn validate(&self) -> EpxResult<()> {
        let n = self.n_followers();
        if n == 0 {
            return Err(EpxError::Validation(format!(
                "country {} has no followers",
                self.name
            )));
        }
        let f = &self.followers;
        if f.costs_quad.len() != n
            || f.capacities.len() != n
            || f.emission_costs.len() != n
            || f.tax_caps.len() != n
        {
            return Err(EpxError::Validation(format!(
                "country {}: follower parameter vectors must all have length {n}",
                self.name
            )));
        }
        if !f.names.is_empty() && f.names.len() != n {
            return Err(EpxError::Validation(format!(
                "country {}: {} follower names for {n} followers",
                self.name,
                f.names.len()
            )));
        }
        if f.names.iter().any(|s| s.chars().any(char::is_whitespace)) {
            return Err(EpxError::Validation(
                "follower names must not contain whitespace".into(),
            ));
        }
        if self.demand.alpha <= 0.0 || self.demand.beta <= 0.0 {
            return Err(EpxError::Validation(format!(
                "country {}: demand intercept and slope must be positive",
                self.name
            )));
        }
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(EpxError::Validation(
                "country names must be non-empty and whitespace-free".into(),
            ));
        }
        Ok(())
    }

    pub fn follower_name(&self, j: usize) -> String {
        self.followers
            .names
            .get(j)
            .cloned()
            .unwrap_or_else(|| format!("follower-{j}"))
    }
}

fn limit(v: f64) -> String {
    if v < 0.0 {
        "inf".to_string()
    } else {
        format!("{v:.2}")
    }
}

impl fmt::Display for FollowerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Follower parameters:")?;
        write!(f, "{:<50}", "  Linear costs:")?;
        for v in &self.costs_lin {
            write!(f, "{v:>16.2}")?;
        }
        writeln!(f)?;
        write!(f, "{:<50}", "  Quadratic costs:")?;
        for v in &self.costs_quad {
            write!(f, "{v:>16.2}")?;
        }
        writeln!(f)?;
        write!(f, "{:<50}", "  Production capacities:")?;
        for v in &self.capacities {
            write!(f, "{:>16}", limit(*v))?;
        }
        writeln!(f)?;
        write!(f, "{:<50}", "  Emission costs:")?;
        for v in &self.emission_costs {
            write!(f, "{v:>16.2}")?;
        }
        writeln!(f)?;
        write!(f, "{:<50}", "  Tax caps:")?;
        for v in &self.tax_caps {
            write!(f, "{:>16}", limit(*v))?;
        }
        writeln!(f)
    }
}

impl fmt::Display for DemandParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Demand: price = {:.2} - {:.2} x quantity",
            self.alpha, self.beta
        )
    }
}

impl fmt::Display for LeaderParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Leader parameters:")?;
        writeln!(f, "{:<50}{:>16}", "  Import limit:", limit(self.import_limit))?;
        writeln!(f, "{:<50}{:>16}", "  Export limit:", limit(self.export_limit))?;
        writeln!(f, "{:<50}{:>16}", "  Price limit:", limit(self.price_limit))?;
        writeln!(
            f,
            "{:<50}{:>16}",
            "  Tax revenue in objective:",
            if self.tax_revenue { "yes" } else { "no" }
        )?;
        writeln!(f, "{:<50}{:>16}", "  Tax paradigm:", self.tax_paradigm.tag())
    }
}

impl fmt::Display for CountryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "***************************")?;
        writeln!(f, "COUNTRY: {}", self.name)?;
        writeln!(f, "***************************")?;
        writeln!(
            f,
            "{:<50}{:>16}",
            "Number of followers:",
            self.n_followers()
        )?;
        write!(f, "{}{}{}", self.leader, self.followers, self.demand)
    }
}
