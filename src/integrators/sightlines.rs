//! Monte Carlo driver: many independent sightlines per target redshift.
use crate::callbacks::Callback;
use crate::config::{RunSettings, SightlineModel, SimulationConfig};
use crate::core::estimators::{DrawEstimators, Estimators, Updateable};
use crate::core::{compute_calls_for_core, Checkpoint};
use crate::cosmology::{Cosmology, LambdaCdm};
use crate::density::DensitySampler;
use crate::error::{Result, SightlineError};
use crate::grid::{RedshiftGrid, RedshiftGridBuilder};
use crate::measures::{dispersion_measure, MagneticFieldModel, SightlineTotals};

use crossbeam as cb;
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Everything needed to draw a single sightline: the background, the density and the field model.
pub struct Sightlines<'a, C: ?Sized> {
    cosmology: &'a C,
    sampler: DensitySampler,
    field: MagneticFieldModel,
    jeans_length: f64,
}

impl<'a, C: Cosmology + ?Sized> Sightlines<'a, C> {
    /// Combines the parts of a sightline generator. `jeans_length` (Mpc) sets the grid spacing.
    pub fn new(
        cosmology: &'a C,
        sampler: DensitySampler,
        field: MagneticFieldModel,
        jeans_length: f64,
    ) -> Result<Self> {
        // fail early instead of at the first grid build
        RedshiftGridBuilder::new(cosmology, jeans_length)?;

        Ok(Self {
            cosmology,
            sampler,
            field,
            jeans_length,
        })
    }

    /// Sets up the generator described by `model`.
    pub fn from_model(model: &SightlineModel, cosmology: &'a C) -> Result<Self> {
        model.validate()?;
        Self::new(
            cosmology,
            model.density_sampler()?,
            model.field_model()?,
            model.jeans_length,
        )
    }

    /// Builds the redshift grid up to `z_max`.
    pub fn build_grid(&self, z_max: f64) -> Result<RedshiftGrid> {
        RedshiftGridBuilder::new(self.cosmology, self.jeans_length)?.build(z_max)
    }

    /// Draws one sightline on `grid` and returns DM and RM to its far end.
    pub fn draw<R: Rng + ?Sized>(&self, grid: &RedshiftGrid, rng: &mut R) -> Result<SightlineTotals> {
        let density = self.sampler.sample(grid, rng);
        let dm = dispersion_measure(&density, grid)?;
        let rm = self.field.rotation_measure(&density, grid, rng)?;

        Ok(SightlineTotals {
            dm: dm.total(),
            rm: rm.total(),
        })
    }
}

/// Perform the draws of one chunk, in order, each with its own random number generator.
fn perform_draws<C, R>(
    sightlines: &Sightlines<'_, C>,
    grid: &RedshiftGrid,
    rngs: &mut [R],
) -> Result<Vec<SightlineTotals>>
where
    C: Cosmology + ?Sized,
    R: Rng,
{
    rngs.iter_mut().map(|rng| sightlines.draw(grid, rng)).collect()
}

/// Performs `n_draws` sightlines on `grid` for the bin with target redshift `redshift`, using
/// `n_cores` threads.
///
/// One generator per draw is derived from `rng`, which afterwards is in the state stored as
/// [`Checkpoint::rng_after`]. The result does not depend on `n_cores`. Passing the
/// [`Checkpoint::rng_before`] of an earlier run replays that bin exactly.
pub fn integrate_bin<C, R>(
    sightlines: &Sightlines<'_, C>,
    grid: &RedshiftGrid,
    redshift: f64,
    rng: &mut R,
    n_draws: usize,
    n_cores: usize,
) -> Result<Checkpoint<R>>
where
    C: Cosmology + ?Sized,
    R: Clone + Rng + SeedableRng + Send,
{
    grid.check_integrable()?;

    if n_cores == 0 {
        return Err(SightlineError::configuration(
            "n_cores must be greater than zero",
        ));
    }

    let rng_before = rng.clone();
    let mut draw_rngs = Vec::with_capacity(n_draws);
    for _ in 0..n_draws {
        draw_rngs.push(R::from_rng(&mut *rng)?);
    }

    let results = if n_cores == 1 {
        vec![perform_draws(sightlines, grid, &mut draw_rngs)]
    } else {
        // split the draws into contiguous chunks, one per core
        let mut chunks = Vec::with_capacity(n_cores);
        let mut rest: &mut [R] = &mut draw_rngs;
        for core in 0..n_cores {
            let (chunk, tail) =
                std::mem::take(&mut rest).split_at_mut(compute_calls_for_core(core, n_cores, n_draws));
            chunks.push(chunk);
            rest = tail;
        }

        cb::thread::scope(|s| {
            let handles = chunks
                .into_iter()
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| s.spawn(move |_| perform_draws(sightlines, grid, chunk)))
                .collect::<Vec<_>>();

            // wait for the threads to finish
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(SightlineError::computation("a draw thread panicked")))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| SightlineError::computation("a draw thread panicked"))?
    };

    // accumulate in draw order, so the sums are independent of the number of cores
    let mut dm = DrawEstimators::default();
    let mut rm = DrawEstimators::default();
    for chunk in results {
        for totals in chunk? {
            dm.update(totals.dm);
            rm.update(totals.rm);
        }
    }

    if dm.non_finite_calls() + rm.non_finite_calls() > 0 {
        warn!(
            "bin at z = {}: {} non-finite DM and {} non-finite RM draws were discarded",
            redshift,
            dm.non_finite_calls(),
            rm.non_finite_calls()
        );
    }

    Ok(Checkpoint::new(
        redshift,
        grid.len(),
        rng_before,
        rng.clone(),
        dm,
        rm,
    ))
}

/// Runs `settings.n_draws` sightlines for each of the log-spaced target redshifts of `settings`.
///
/// The random number generator in its initial state is provided in `rng` together with a
/// `callback` that is invoked after every bin. A single grid is built for `settings.z_max` and
/// truncated for every target. Bins are processed in order of increasing redshift; their
/// checkpoints are returned in the same order.
pub fn integrate<C, R>(
    sightlines: &Sightlines<'_, C>,
    rng: &R,
    callback: &impl Callback<R>,
    settings: &RunSettings,
) -> Result<Vec<Checkpoint<R>>>
where
    C: Cosmology + ?Sized,
    R: Clone + Rng + SeedableRng + Send,
{
    settings.validate()?;

    let bins = settings.redshift_bins();
    let grid = sightlines.build_grid(settings.z_max)?;

    let mut checkpoints = Vec::with_capacity(bins.len());
    let mut rng_global = rng.clone();

    for &z in &bins {
        let truncated = grid.truncated(z);
        debug!(
            "bin at z = {}: {} grid points, {} draws",
            z,
            truncated.len(),
            settings.n_draws
        );

        let checkpoint = integrate_bin(
            sightlines,
            &truncated,
            z,
            &mut rng_global,
            settings.n_draws,
            settings.n_cores,
        )?;

        checkpoints.push(checkpoint);
        callback.print(&checkpoints);
    }

    info!(
        "finished {} bins between z = {} and z = {}",
        bins.len(),
        settings.z_min,
        settings.z_max
    );

    Ok(checkpoints)
}

/// Runs a complete configuration with a [`Pcg64`] generator seeded from `config.run.seed`.
pub fn run(config: &SimulationConfig, callback: &impl Callback<Pcg64>) -> Result<Vec<Checkpoint<Pcg64>>> {
    config.validate()?;

    let cosmology = LambdaCdm::new(config.cosmology.clone())?;
    let sightlines = Sightlines::from_model(&config.model, &cosmology)?;
    let rng = Pcg64::seed_from_u64(config.run.seed);

    info!(
        "model `{}`: B0 = {} \u{b5}G, l0 = {} Mpc, reference density = {:.4e} cm^-3 ({:.3} of the mean baryon density)",
        config.model.name,
        config.model.b0,
        config.model.coherence_length,
        config.model.reference_density,
        config.model.reference_density / cosmology.mean_baryon_number_density()
    );

    integrate(&sightlines, &rng, callback, &config.run)
}

/// Splits checkpoints into the target redshifts and the mean DM and RM per bin.
pub fn mean_curves<R>(checkpoints: &[Checkpoint<R>]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    use crate::core::estimators::BasicEstimators;

    let redshifts = checkpoints.iter().map(Checkpoint::redshift).collect();
    let dm = checkpoints.iter().map(|c| c.dm().mean()).collect();
    let rm = checkpoints.iter().map(|c| c.rm().mean()).collect();

    (redshifts, dm, rm)
}
