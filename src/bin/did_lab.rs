//! did-lab - Difference-in-Differences simulation CLI
//!
//! Command-line interface for generating DiD panels, estimating effects and
//! running simulation studies.

use clap::{Args, Parser, Subcommand, ValueEnum};
use did_lab::data::ParameterSet;
use did_lab::error::{DidError, Result};
use did_lab::estimate::estimate;
use did_lab::generate::{generate_panel, generate_placebo, PlaceboMode};
use did_lab::simulate::{gap_grid, run_simulation_with, sweep_bias_curve_with, SimulationConfig};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/// CLI-friendly placebo mode enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPlaceboMode {
    /// Randomly reassign treated/control labels across units
    Reshuffle,
    /// Observe the two pre-treatment periods instead
    Shift,
}

impl From<CliPlaceboMode> for PlaceboMode {
    fn from(mode: CliPlaceboMode) -> Self {
        match mode {
            CliPlaceboMode::Reshuffle => PlaceboMode::ReshuffleLabels,
            CliPlaceboMode::Shift => PlaceboMode::ShiftPeriod,
        }
    }
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Difference-in-Differences simulation lab
#[derive(Parser)]
#[command(name = "did-lab")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Data-generating parameters; flags override values from `--config`.
#[derive(Args, Debug, Clone)]
struct ParamArgs {
    /// YAML parameter file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Treated group baseline
    #[arg(long)]
    mu_treated: Option<f64>,

    /// Control group baseline
    #[arg(long)]
    mu_control: Option<f64>,

    /// Treated group time trend
    #[arg(long)]
    beta_treated: Option<f64>,

    /// Control group time trend
    #[arg(long)]
    beta_control: Option<f64>,

    /// True treatment effect
    #[arg(long)]
    tau: Option<f64>,

    /// Noise standard deviation
    #[arg(long)]
    epsilon: Option<f64>,

    /// Units per group
    #[arg(short = 'n', long)]
    units: Option<usize>,

    /// Simulation repetitions
    #[arg(short = 'r', long)]
    reps: Option<usize>,
}

impl ParamArgs {
    fn resolve(&self) -> Result<ParameterSet> {
        let mut params = match &self.config {
            Some(path) => {
                info!("loading parameters from {:?}", path);
                ParameterSet::from_yaml_file(path)?
            }
            None => ParameterSet::default(),
        };
        if let Some(v) = self.mu_treated {
            params.mu_treated = v;
        }
        if let Some(v) = self.mu_control {
            params.mu_control = v;
        }
        if let Some(v) = self.beta_treated {
            params.beta_treated = v;
        }
        if let Some(v) = self.beta_control {
            params.beta_control = v;
        }
        if let Some(v) = self.tau {
            params.tau = v;
        }
        if let Some(v) = self.epsilon {
            params.epsilon = v;
        }
        if let Some(v) = self.units {
            params.n_units = v;
        }
        if let Some(v) = self.reps {
            params.n_reps = v;
        }
        params.validate()?;
        Ok(params)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one panel and write it as CSV
    Panel {
        #[command(flatten)]
        params: ParamArgs,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output CSV path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate one placebo panel and write it as CSV
    Placebo {
        #[command(flatten)]
        params: ParamArgs,

        /// Placebo construction
        #[arg(long, value_enum, default_value = "reshuffle")]
        mode: CliPlaceboMode,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output CSV path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate one panel and estimate the effect
    Estimate {
        #[command(flatten)]
        params: ParamArgs,

        /// Estimate on a placebo panel instead
        #[arg(long, value_enum)]
        placebo: Option<CliPlaceboMode>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output format: text or json
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Run repeated simulations and summarize the estimators
    Simulate {
        #[command(flatten)]
        params: ParamArgs,

        /// Simulate placebo panels instead
        #[arg(long, value_enum)]
        placebo: Option<CliPlaceboMode>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Run on a single thread
        #[arg(long)]
        sequential: bool,

        /// Histogram bins for the text report
        #[arg(long, default_value = "20")]
        bins: usize,

        /// Output format: text, json, or csv (per-repetition estimates)
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Sweep the trend gap and report bias
    Sweep {
        #[command(flatten)]
        params: ParamArgs,

        /// Gap values (comma-separated, e.g., "-2,-1,0,1,2")
        #[arg(long, allow_hyphen_values = true, conflicts_with_all = ["from", "to", "points"])]
        gaps: Option<String>,

        /// First gap of an evenly spaced range
        #[arg(long, default_value = "-2.0", allow_hyphen_values = true)]
        from: f64,

        /// Last gap of an evenly spaced range
        #[arg(long, default_value = "2.0", allow_hyphen_values = true)]
        to: f64,

        /// Number of gaps in the range
        #[arg(long, default_value = "9")]
        points: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Run on a single thread
        #[arg(long)]
        sequential: bool,

        /// Output format: text, json, or csv
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Write an example parameter file
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "did.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Error: failed to initialise logging: {}", e);
    }

    let result = match cli.command {
        Commands::Panel {
            params,
            seed,
            output,
        } => cmd_panel(&params, seed, None, output.as_ref()),

        Commands::Placebo {
            params,
            mode,
            seed,
            output,
        } => cmd_panel(&params, seed, Some(mode.into()), output.as_ref()),

        Commands::Estimate {
            params,
            placebo,
            seed,
            output_format,
        } => cmd_estimate(&params, placebo.map(Into::into), seed, output_format),

        Commands::Simulate {
            params,
            placebo,
            seed,
            sequential,
            bins,
            output_format,
        } => cmd_simulate(
            &params,
            placebo.map(Into::into),
            seed,
            sequential,
            bins,
            output_format,
        ),

        Commands::Sweep {
            params,
            gaps,
            from,
            to,
            points,
            seed,
            sequential,
            output_format,
        } => cmd_sweep(
            &params,
            gaps.as_deref(),
            (from, to, points),
            seed,
            sequential,
            output_format,
        ),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Generate a treatment or placebo panel and write it
fn cmd_panel(
    args: &ParamArgs,
    seed: u64,
    placebo: Option<PlaceboMode>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let params = args.resolve()?;
    let panel = match placebo {
        None => generate_panel(&params, seed)?,
        Some(mode) => generate_placebo(&params, seed, mode)?,
    };
    info!(
        "generated {} rows for {} units",
        panel.len(),
        panel.n_units()
    );

    match output {
        Some(path) => {
            panel.to_csv_file(path)?;
            eprintln!("Wrote {} rows to {:?}", panel.len(), path);
        }
        None => panel.write_csv(std::io::stdout().lock())?,
    }
    Ok(())
}

/// Estimate the effect on one generated panel
fn cmd_estimate(
    args: &ParamArgs,
    placebo: Option<PlaceboMode>,
    seed: u64,
    format: OutputFormat,
) -> Result<()> {
    let params = args.resolve()?;
    let panel = match placebo {
        None => generate_panel(&params, seed)?,
        Some(mode) => generate_placebo(&params, seed, mode)?,
    };
    let est = estimate(&panel)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&est)?),
        OutputFormat::Csv => {
            return Err(DidError::InvalidParameter(
                "csv output is not available for estimate".to_string(),
            ))
        }
        OutputFormat::Text => {
            let m = &est.cell_means;
            println!("DiD Estimate (seed {})", seed);
            println!("========================");
            println!();
            println!("{:<10} {:>12} {:>12}", "", "Pre", "Post");
            println!("{:<10} {:>12.4} {:>12.4}", "Treated", m.treated_pre, m.treated_post);
            println!("{:<10} {:>12.4} {:>12.4}", "Control", m.control_pre, m.control_post);
            println!(
                "{:<10} {:>12} {:>12.4}",
                "Counterf.",
                "",
                m.counterfactual_treated_post()
            );
            println!();
            println!("ATT (difference in means): {:.4}", est.att_diff_in_means);
            println!("ATT (regression):          {:.4}", est.att_regression);
            if let Some(se) = est.regression_se {
                println!("SE (classical):            {:.4}", se);
            }
            if let Some(se) = est.robust_se {
                println!("SE (HC2):                  {:.4}", se);
            }
            if let (Some(lo), Some(hi)) = (est.ci_lower, est.ci_upper) {
                println!("95% CI:                    [{:.4}, {:.4}]", lo, hi);
            }
            if let Some(p) = est.p_value {
                println!("p-value:                   {:.4}", p);
            }
            let target = if placebo.is_some() { 0.0 } else { params.tau };
            println!("Target:                    {:.4}", target);
        }
    }
    Ok(())
}

/// Run a simulation study
fn cmd_simulate(
    args: &ParamArgs,
    placebo: Option<PlaceboMode>,
    seed: u64,
    sequential: bool,
    bins: usize,
    format: OutputFormat,
) -> Result<()> {
    let params = args.resolve()?;
    let mut config = SimulationConfig::default()
        .with_seed(seed)
        .with_parallel(!sequential)
        .with_keep_estimates(format != OutputFormat::Json);
    if let Some(mode) = placebo {
        config = config.with_placebo(mode);
    }

    let summary = run_simulation_with(&params, &config)?;

    match format {
        OutputFormat::Json => println!("{}", summary.to_json()?),
        OutputFormat::Csv => summary.write_estimates_csv(std::io::stdout().lock())?,
        OutputFormat::Text => {
            println!("{}", summary);
            if let Some(hist) = summary.histogram(bins) {
                let peak = hist.iter().map(|b| b.count).max().unwrap_or(0).max(1);
                println!();
                println!("Distribution of difference-in-means estimates:");
                for bin in &hist {
                    let bar = "#".repeat(bin.count * 40 / peak);
                    println!(
                        "  [{:>9.3}, {:>9.3}) {:>6} {}",
                        bin.lower, bin.upper, bin.count, bar
                    );
                }
            }
        }
    }
    Ok(())
}

/// Sweep the trend gap
fn cmd_sweep(
    args: &ParamArgs,
    gaps: Option<&str>,
    range: (f64, f64, usize),
    seed: u64,
    sequential: bool,
    format: OutputFormat,
) -> Result<()> {
    let params = args.resolve()?;
    let gaps = match gaps {
        Some(list) => parse_list(list)?,
        None => gap_grid(range.0, range.1, range.2)?,
    };
    let config = SimulationConfig::sequential()
        .with_seed(seed)
        .with_parallel(!sequential);

    let curve = sweep_bias_curve_with(&params, &gaps, &config)?;

    match format {
        OutputFormat::Json => println!("{}", curve.to_json()?),
        OutputFormat::Csv => print!("{}", curve.to_csv()?),
        OutputFormat::Text => println!("{}", curve),
    }
    Ok(())
}

/// Write the default parameter set as YAML
fn cmd_example(output_path: &PathBuf) -> Result<()> {
    let yaml = ParameterSet::default().to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example parameters to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}

fn parse_list(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| DidError::InvalidParameter(format!("invalid number '{}'", v)))
        })
        .collect()
}
