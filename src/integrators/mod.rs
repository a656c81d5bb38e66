//! Monte Carlo drivers.
pub mod sightlines;
