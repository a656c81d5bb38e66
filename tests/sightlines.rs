use igm_sightlines::callbacks::{FileWriterCallback, SinkCallback};
use igm_sightlines::config::{RunSettings, SightlineModel, SimulationConfig};
use igm_sightlines::core::estimators::{BasicEstimators, Estimators};
use igm_sightlines::core::*;
use igm_sightlines::cosmology::{Cosmology, CosmologyParameters, LambdaCdm};
use igm_sightlines::density::{DensityModel, DensityProfile, DensitySampler, IonizedFraction};
use igm_sightlines::grid::{RedshiftGrid, RedshiftGridBuilder};
use igm_sightlines::integrators::sightlines::{integrate, integrate_bin, mean_curves, run, Sightlines};
use igm_sightlines::measures::{dispersion_measure, MagneticFieldModel};
use igm_sightlines::output::AggregatedCurve;
use igm_sightlines::SightlineError;

use assert_approx_eq::assert_approx_eq;
use proptest::prelude::*;
use rand::Rng;
use rand_pcg::Pcg64;
use serde::Serialize;
use std::fs;

const REFERENCE_DENSITY: f64 = 2.2e-7;

fn assert_eq_rng<R>(lhs: &R, rhs: &R)
where
    R: Rng + Serialize,
{
    assert_eq!(
        serde_json::to_string(lhs).unwrap(),
        serde_json::to_string(rhs).unwrap()
    );
}

fn cosmology() -> LambdaCdm {
    LambdaCdm::new(CosmologyParameters::default()).unwrap()
}

fn rng() -> Pcg64 {
    Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
}

fn sightlines(cosmology: &LambdaCdm) -> Sightlines<'_, LambdaCdm> {
    let model = SightlineModel {
        jeans_length: 20.0,
        reference_density: REFERENCE_DENSITY,
        ..SightlineModel::default()
    };
    Sightlines::from_model(&model, cosmology).unwrap()
}

fn settings() -> RunSettings {
    RunSettings {
        n_draws: 25,
        z_min: 0.1,
        z_max: 2.0,
        n_bins: 4,
        seed: 0,
        n_cores: 2,
    }
}

fn small_config(n_draws: usize) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.model.jeans_length = 20.0;
    config.run = RunSettings {
        n_draws,
        seed: 1234,
        ..settings()
    };
    config
}

fn compare_checkpoints(chkpt: &Checkpoint<Pcg64>, target: &Checkpoint<Pcg64>) {
    assert_eq!(chkpt.redshift(), target.redshift());
    assert_eq!(chkpt.grid_points(), target.grid_points());

    for &measure in &Measure::ALL {
        let lhs = chkpt.estimators(measure);
        let rhs = target.estimators(measure);

        assert_eq!(lhs.calls(), rhs.calls());
        assert_eq!(lhs.non_finite_calls(), rhs.non_finite_calls());
        assert_eq!(lhs.mean(), rhs.mean());
        assert_eq!(lhs.var(), rhs.var());
    }

    assert_eq_rng(chkpt.rng_before(), target.rng_before());
    assert_eq_rng(chkpt.rng_after(), target.rng_after());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn grid_is_increasing_from_zero_and_reaches_z_max(z_max in 1e-3f64..=10.0) {
        let cosmology = cosmology();
        let grid = RedshiftGridBuilder::new(&cosmology, 200.0).unwrap().build(z_max).unwrap();
        let z = grid.redshifts();

        prop_assert_eq!(z[0], 0.0);
        prop_assert!(z.windows(2).all(|w| w[1] > w[0]));
        prop_assert!(z[z.len() - 1] >= z_max);
        prop_assert!(z[z.len() - 2] < z_max);
        prop_assert!(grid.distances().windows(2).all(|w| w[1] > w[0]));
    }
}

#[test]
fn grid_rejects_non_positive_z_max() {
    let cosmology = cosmology();
    let builder = RedshiftGridBuilder::new(&cosmology, 2.3).unwrap();

    assert!(matches!(builder.build(0.0), Err(SightlineError::Configuration(_))));
    assert!(matches!(builder.build(-1.0), Err(SightlineError::Configuration(_))));
}

#[test]
fn densities_are_never_negative() {
    let cosmology = cosmology();
    let grid = RedshiftGridBuilder::new(&cosmology, 20.0).unwrap().build(8.0).unwrap();
    let sampler =
        DensitySampler::new(IonizedFraction::default(), REFERENCE_DENSITY, DensityModel::LogNormal)
            .unwrap();
    let mut rng = rng();

    for _ in 0..50 {
        let density = sampler.sample(&grid, &mut rng);
        assert_eq!(density.len(), grid.len());
        assert!(density.values().iter().all(|&n| n >= 0.0 && n.is_finite()));
    }
}

#[test]
fn ionized_fraction_is_continuous_at_z_const() {
    let f = IonizedFraction {
        f0: 0.7,
        f1: 0.9,
        z_const: 2.0,
    };

    assert_eq!(f.at(2.0), 0.9);
    assert_eq!(f.at(5.0), 0.9);
    assert_eq!(f.at(0.0), 0.7);

    for &eps in &[1e-1, 1e-3, 1e-6, 1e-9] {
        assert!((f.at(2.0 - eps) - 0.9).abs() <= 0.1 * eps + 1e-15);
    }
}

#[test]
fn dispersion_measure_is_non_decreasing() {
    let cosmology = cosmology();
    let grid = RedshiftGridBuilder::new(&cosmology, 20.0).unwrap().build(3.0).unwrap();
    let sampler =
        DensitySampler::new(IonizedFraction::default(), REFERENCE_DENSITY, DensityModel::LogNormal)
            .unwrap();
    let mut rng = rng();

    for _ in 0..10 {
        let dm = dispersion_measure(&sampler.sample(&grid, &mut rng), &grid).unwrap();

        assert_eq!(dm.values().len(), grid.len() - 1);
        assert!(dm.values().windows(2).all(|w| w[1] >= w[0]));
        assert!(dm.total() > 0.0);
    }
}

#[test]
fn rotation_measure_vanishes_without_field() {
    let cosmology = cosmology();
    let grid = RedshiftGridBuilder::new(&cosmology, 20.0).unwrap().build(3.0).unwrap();
    let sampler =
        DensitySampler::new(IonizedFraction::default(), REFERENCE_DENSITY, DensityModel::LogNormal)
            .unwrap();
    let field = MagneticFieldModel::flux_frozen(0.0, 1.0, REFERENCE_DENSITY).unwrap();
    let mut rng = rng();

    for _ in 0..10 {
        let density = sampler.sample(&grid, &mut rng);
        let rm = field.rotation_measure(&density, &grid, &mut rng).unwrap();

        assert_eq!(rm.values().len(), grid.len() - 1);
        assert!(rm.values().iter().all(|&v| v == 0.0));
    }
}

#[test]
fn dispersion_measure_of_a_single_cell() {
    let grid = RedshiftGrid::from_parts(vec![0.0, 1.0], vec![0.0, 1000.0]).unwrap();
    let density = DensityProfile::new(vec![1e-7, 1e-7]);

    let dm = dispersion_measure(&density, &grid).unwrap();

    assert_eq!(dm.values().len(), 1);
    assert_approx_eq!(dm.total(), 100.0, 1e-10);
}

#[test]
fn integration_requires_two_grid_points() {
    let grid = RedshiftGrid::from_parts(vec![0.0], vec![0.0]).unwrap();
    let density = DensityProfile::new(vec![1e-7]);

    assert!(matches!(
        dispersion_measure(&density, &grid),
        Err(SightlineError::InsufficientGrid { points: 1 })
    ));

    let field = MagneticFieldModel::flux_frozen(1e-3, 1.0, REFERENCE_DENSITY).unwrap();
    assert!(matches!(
        field.rotation_measure(&density, &grid, &mut rng()),
        Err(SightlineError::InsufficientGrid { points: 1 })
    ));
}

#[test]
fn points_in_one_coherence_domain_share_their_orientation() {
    // the domain size is ~2.3 Mpc for l0 = 1 Mpc at these tiny redshifts
    let grid = RedshiftGrid::from_parts(vec![0.0, 1e-3, 2e-3, 3e-3], vec![0.0, 1.0, 2.0, 5.0])
        .unwrap();
    let density = DensityProfile::new(vec![REFERENCE_DENSITY; 4]);
    let model = MagneticFieldModel::flux_frozen(1.0, 1.0, REFERENCE_DENSITY).unwrap();
    let mut rng = rng();

    let n = 20_000;
    let mut inner = Vec::with_capacity(n);
    let mut outer = Vec::with_capacity(n);

    for _ in 0..n {
        let field = model.sample(&density, &grid, &mut rng).unwrap();
        let b = field.values();

        assert_eq!(field.flip_indices(), &[0, 0, 0, 2]);
        assert_eq!(b[0], b[1]);
        assert_eq!(b[1], b[2]);
        assert!(b.iter().all(|v| v.abs() <= 1.0));

        inner.push(b[0]);
        outer.push(b[3]);
    }

    // cos(theta) for uniform theta has mean 0 and variance 1/2
    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    let covariance = inner.iter().zip(&outer).map(|(a, b)| a * b).sum::<f64>() / n as f64
        - mean(&inner) * mean(&outer);

    assert!(mean(&inner).abs() < 0.03);
    assert!(mean(&outer).abs() < 0.03);
    assert!((covariance / 0.5).abs() < 0.05);
}

#[test]
fn same_seed_gives_identical_curves() {
    let config = small_config(1);

    let first = mean_curves(&run(&config, &SinkCallback {}).unwrap());
    let second = mean_curves(&run(&config, &SinkCallback {}).unwrap());

    assert_eq!(first, second);
    assert_eq!(first.0, config.run.redshift_bins());

    let mut other = config;
    other.run.seed += 1;
    let third = mean_curves(&run(&other, &SinkCallback {}).unwrap());
    assert_ne!(first.1, third.1);
}

#[test]
fn checkpoints_chain_and_replay() {
    let cosmology = cosmology();
    let sightlines = sightlines(&cosmology);
    let settings = settings();

    let checkpoints = integrate(&sightlines, &rng(), &SinkCallback {}, &settings).unwrap();
    assert_eq!(checkpoints.len(), settings.n_bins);
    assert_eq_rng(checkpoints[0].rng_before(), &rng());

    for pair in checkpoints.windows(2) {
        assert_eq_rng(pair[0].rng_after(), pair[1].rng_before());
        assert!(pair[0].grid_points() <= pair[1].grid_points());
    }

    // replay the third bin from its checkpoint, on a different number of cores
    let target = &checkpoints[2];
    let grid = sightlines.build_grid(settings.z_max).unwrap().truncated(target.redshift());
    let mut rng = target.rng_before().clone();
    let replayed =
        integrate_bin(&sightlines, &grid, target.redshift(), &mut rng, settings.n_draws, 3)
            .unwrap();

    compare_checkpoints(&replayed, target);
    assert_eq_rng(&rng, target.rng_after());
}

#[test]
fn resume_from_checkpoint() {
    let cosmology = cosmology();
    let sightlines = sightlines(&cosmology);
    let settings = settings();

    let full = integrate(&sightlines, &rng(), &SinkCallback {}, &settings).unwrap();

    // a run over the upper bins only, started from where the first bin left off
    let upper = RunSettings {
        z_min: full[1].redshift(),
        n_bins: settings.n_bins - 1,
        ..settings
    };
    let resumed = integrate(&sightlines, full[0].rng_after(), &SinkCallback {}, &upper).unwrap();

    for (chkpt, target) in resumed.iter().zip(&full[1..]) {
        assert_approx_eq!(chkpt.redshift(), target.redshift(), 1e-12);
        assert_eq!(chkpt.dm().calls(), target.dm().calls());
        assert_approx_eq!(chkpt.dm().mean(), target.dm().mean(), 1e-9 * target.dm().mean());
        assert_eq_rng(chkpt.rng_after(), target.rng_after());
    }
}

#[test]
fn file_writer_keeps_all_finished_bins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.json");
    let cosmology = cosmology();
    let sightlines = sightlines(&cosmology);

    let checkpoints =
        integrate(&sightlines, &rng(), &FileWriterCallback::new(&path), &settings()).unwrap();

    let written: Vec<Checkpoint<Pcg64>> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(written.len(), checkpoints.len());
    for (chkpt, target) in written.iter().zip(&checkpoints) {
        assert_eq!(chkpt.redshift(), target.redshift());
        assert_eq!(chkpt.grid_points(), target.grid_points());
        assert_eq!(chkpt.dm().calls(), target.dm().calls());
        assert_approx_eq!(chkpt.dm().mean(), target.dm().mean(), 1e-12 * target.dm().mean());
        assert_approx_eq!(chkpt.dm().var(), target.dm().var(), 1e-12 * target.dm().var());
        assert_approx_eq!(chkpt.rm().mean(), target.rm().mean(), 1e-12 * target.rm().std());
        assert_eq_rng(chkpt.rng_before(), target.rng_before());
        assert_eq_rng(chkpt.rng_after(), target.rng_after());
    }
}

#[test]
fn failing_file_writer_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("checkpoints.json");
    let cosmology = cosmology();
    let sightlines = sightlines(&cosmology);

    let checkpoints =
        integrate(&sightlines, &rng(), &FileWriterCallback::new(&path), &settings()).unwrap();

    assert_eq!(checkpoints.len(), settings().n_bins);
    assert!(!path.exists());
}

#[test]
fn curves_round_trip_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(8);
    let checkpoints = run(&config, &SinkCallback {}).unwrap();

    for &measure in &Measure::ALL {
        let curve = AggregatedCurve::from_checkpoints(&config.model.name, measure, &checkpoints);
        let path = curve.write_csv(dir.path(), true).unwrap();
        assert_eq!(path, dir.path().join(format!("primordial_{}.csv", measure)));

        let read = AggregatedCurve::read_csv(dir.path(), "primordial", measure).unwrap();
        assert_eq!(read.redshifts().len(), config.run.n_bins);

        for (a, b) in read.means().iter().zip(curve.means()) {
            assert_approx_eq!(a, b, 1e-12 * b.abs().max(1e-300));
        }
        for (a, b) in read.stddevs().iter().zip(curve.stddevs()) {
            assert_approx_eq!(a, b, 1e-12 * b.abs().max(1e-300));
        }
    }

    let (_, dm, rm) = mean_curves(&checkpoints);
    assert_eq!(
        AggregatedCurve::from_checkpoints("primordial", Measure::Dm, &checkpoints).means(),
        &dm[..]
    );
    assert_eq!(
        AggregatedCurve::from_checkpoints("primordial", Measure::Rm, &checkpoints).means(),
        &rm[..]
    );
}

#[test]
fn invalid_configurations_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    fs::write(&path, r#"{"run": {"z_min": 0.0}}"#).unwrap();
    assert!(matches!(
        SimulationConfig::from_json_file(&path),
        Err(SightlineError::Configuration(_))
    ));

    fs::write(&path, r#"{"model": {"ionized_fraction": {"z_const": -1.0}}}"#).unwrap();
    assert!(matches!(
        SimulationConfig::from_json_file(&path),
        Err(SightlineError::Configuration(_))
    ));

    fs::write(&path, r#"{"cosmology": {"hubble": -0.7}}"#).unwrap();
    assert!(matches!(
        SimulationConfig::from_json_file(&path),
        Err(SightlineError::Configuration(_))
    ));

    fs::write(&path, "{").unwrap();
    assert!(matches!(
        SimulationConfig::from_json_file(&path),
        Err(SightlineError::Json(_))
    ));

    let mut config = small_config(10);
    config.run.n_draws = 0;
    assert!(matches!(
        run(&config, &SinkCallback {}),
        Err(SightlineError::Configuration(_))
    ));
}

#[test]
fn distances_beyond_the_horizon_do_not_converge() {
    let cosmology = cosmology();

    assert!(matches!(
        cosmology.redshift_at_lookback_distance(1.0e6),
        Err(SightlineError::Computation(_))
    ));

    let z = cosmology
        .redshift_at_lookback_distance(cosmology.lookback_distance(1.5))
        .unwrap();
    assert_approx_eq!(z, 1.5, 1e-6);
}
