#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! The crate `igm_sightlines` estimates the [dispersion measure] (DM) and the [rotation measure]
//! (RM) that the intergalactic medium imprints on radio signals from sources at redshift $z$, such
//! as fast radio bursts. The medium between the source and the observer is modelled as a chain of
//! cells, each one Jeans length long, with log-normally distributed electron densities and
//! magnetic fields whose orientation flips between coherence domains. Many random sightlines are
//! drawn for each target redshift and their mean and variance are recorded.
//!
//! # Features
//!
//! - **Reproducibility**. All results only depend on the random number generator and the chosen
//! seed. In particular, they do not depend on the number of cores the draws are distributed on.
//! - **Non-finite number filtering**. Draws that produce `inf` or `nan` are counted and excluded
//! from the estimates.
//! - **Checkpoints**. After each redshift bin the state of the generator before and after the bin
//! is stored together with the estimates, so that any bin can be replayed exactly and an
//! interrupted run keeps all completed bins.
//!
//! # What is ...?
//!
//! Given the proper electron density $n_e$ and the line-of-sight magnetic field $B_\parallel$,
//!
//! $$ \mathrm{DM} = \int \frac{n_e}{1 + z} \, \mathrm{d} l, \qquad
//! \mathrm{RM} \propto \int \frac{n_e B_\parallel}{(1 + z)^2} \, \mathrm{d} l $$
//!
//! where $l$ is the comoving distance. We use the following terms:
//!
//! - a *sightline* is one random realisation of densities and fields between observer and source,
//! - a *draw* is the computation of DM and RM along one sightline,
//! - a *bin* is a target redshift together with all of its draws,
//! - the *grid* is the ascending list of redshifts at which the sightline is sampled, starting at
//! the observer ($z = 0$).
//!
//! [dispersion measure]: https://en.wikipedia.org/wiki/Dispersion_(optics)#Pulsar_emission
//! [rotation measure]: https://en.wikipedia.org/wiki/Faraday_effect#Faraday_rotation_in_the_interstellar_medium

pub mod callbacks;
pub mod config;
pub mod core;
pub mod cosmology;
pub mod density;
pub mod error;
pub mod grid;
pub mod integrators;
pub mod measures;
pub mod output;

pub use crate::core::*;
pub use crate::error::{Result, SightlineError};
