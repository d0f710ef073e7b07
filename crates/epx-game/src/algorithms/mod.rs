//! Solution strategies for the EPEC.
//!
//! Each strategy is a function over the host [`crate::Epec`]: the host owns
//! the per-country LCPs (already rebuilt in the flavour the strategy needs
//! by `find_nash_eq`), and the strategy drives approximation refinement and
//! upper-level solves until a terminal status is reached. Strategies never
//! mutate the host outside their `solve` call.

pub(crate) mod combinatorial_pne;
pub(crate) mod full_enumeration;
pub(crate) mod inner_approximation;
pub(crate) mod outer_approximation;
