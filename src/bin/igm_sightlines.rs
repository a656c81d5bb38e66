use clap::{Parser, ValueEnum};
use igm_sightlines::callbacks::{ChainedCallback, FileWriterCallback, SimpleCallback};
use igm_sightlines::config::{SightlineModel, SimulationConfig};
use igm_sightlines::density::DensityModel;
use igm_sightlines::integrators::sightlines::run;
use igm_sightlines::output::AggregatedCurve;
use igm_sightlines::{Checkpoint, Measure, Result};
use log::{error, info};
use rand_pcg::Pcg64;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MeasureArg {
    Dm,
    Rm,
    Both,
}

impl MeasureArg {
    fn measures(self) -> &'static [Measure] {
        match self {
            Self::Dm => &[Measure::Dm],
            Self::Rm => &[Measure::Rm],
            Self::Both => &[Measure::Dm, Measure::Rm],
        }
    }
}

/// Monte Carlo sightlines through the intergalactic medium.
///
/// Draws random sightlines for log-spaced source redshifts and writes the mean dispersion and
/// rotation measures per redshift as CSV tables.
#[derive(Debug, Parser)]
#[command(name = "igm-sightlines", version, about)]
struct Cli {
    /// JSON configuration file; options given on the command line take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model preset (`primordial`, `alpha1-3rd` .. `alpha9-3rd`), setting the name and field
    /// exponent of the configured model
    #[arg(long)]
    model: Option<String>,

    /// Which measure to write
    #[arg(long, value_enum, default_value = "both")]
    measure: MeasureArg,

    /// Sightlines per redshift bin
    #[arg(long)]
    draws: Option<usize>,

    /// Number of log-spaced redshift bins
    #[arg(long)]
    bins: Option<usize>,

    /// Smallest source redshift
    #[arg(long)]
    z_min: Option<f64>,

    /// Largest source redshift
    #[arg(long)]
    z_max: Option<f64>,

    /// Seed of the random number generator
    #[arg(long)]
    seed: Option<u64>,

    /// Threads the draws of each bin are distributed across
    #[arg(long)]
    cores: Option<usize>,

    /// Use the mean density everywhere instead of log-normal scatter
    #[arg(long)]
    uniform: bool,

    /// Also write the standard deviation of the draws
    #[arg(long)]
    stddev: bool,

    /// Directory the tables are written to
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Rewrite all checkpoints to this JSON file after every bin
    #[arg(long)]
    checkpoints: Option<PathBuf>,

    /// Write the tables from a checkpoint file of an earlier, possibly interrupted, run instead
    /// of drawing sightlines
    #[arg(long, conflicts_with = "checkpoints")]
    tables_from: Option<PathBuf>,

    /// Print the available model presets and exit
    #[arg(long)]
    list_models: bool,
}

impl Cli {
    fn simulation_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };

        if let Some(name) = &self.model {
            let preset = SightlineModel::preset(name)?;
            config.model.name = preset.name;
            config.model.field_exponent = preset.field_exponent;
        }

        if self.uniform {
            config.model.density = DensityModel::Uniform;
            config.model.name = format!("{}-uniform", config.model.name);
        }

        let run = &mut config.run;
        run.n_draws = self.draws.unwrap_or(run.n_draws);
        run.n_bins = self.bins.unwrap_or(run.n_bins);
        run.z_min = self.z_min.unwrap_or(run.z_min);
        run.z_max = self.z_max.unwrap_or(run.z_max);
        run.seed = self.seed.unwrap_or(run.seed);
        run.n_cores = self.cores.unwrap_or(run.n_cores);

        config.validate()?;
        Ok(config)
    }
}

fn simulate(cli: &Cli) -> Result<()> {
    if cli.list_models {
        for name in SightlineModel::preset_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = cli.simulation_config()?;

    let checkpoints: Vec<Checkpoint<Pcg64>> = match (&cli.tables_from, &cli.checkpoints) {
        (Some(path), _) => {
            let checkpoints = FileWriterCallback::read(path)?;
            info!("read {} bins from {}", checkpoints.len(), path.display());
            checkpoints
        }
        (None, Some(path)) => run(
            &config,
            &ChainedCallback(SimpleCallback {}, FileWriterCallback::new(path)),
        )?,
        (None, None) => run(&config, &SimpleCallback {})?,
    };

    for &measure in cli.measure.measures() {
        let curve = AggregatedCurve::from_checkpoints(&config.model.name, measure, &checkpoints);
        let path = curve.write_csv(&cli.output, cli.stddev)?;

        info!("wrote mean {} ({}) to {}", measure, measure.unit(), path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match simulate(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
