//! Command line front end for calibration curves and nanomaterial risk screening.
//!
//! ```text
//! nanocalibrate fit standards.csv --report report.txt
//! nanocalibrate predict standards.csv --responses samples.txt --confidence 99
//! nanocalibrate risk "Tidak ada" "Tidak diatur" "Tinggi" "< 20 nm" "Tinggi (> 1 mg/g)"
//! ```

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nanocalibrate::calibration::{self, CalibrationResult, CalibrationSet};
use nanocalibrate::prediction::{self, ConfidenceLevel};
use nanocalibrate::table::{self, SkippedRow};
use nanocalibrate::{report, risk, validation, Config};

#[derive(Parser, Debug)]
#[command(author, version, about = "Analytical calibration and nanomaterial risk screening")]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a calibration line to a table of standards
    Fit {
        #[command(flatten)]
        data: DataArgs,

        /// Write the point-by-point calculation table as CSV
        #[arg(long)]
        table: Option<PathBuf>,

        /// Write a plain-text calibration report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Estimate sample concentrations from measured responses
    Predict {
        #[command(flatten)]
        data: DataArgs,

        /// File of responses, one per line, or the first column of a CSV file
        #[arg(long, conflicts_with = "response")]
        responses: Option<PathBuf>,

        /// A single measured response
        #[arg(long, required_unless_present = "responses")]
        response: Option<f64>,

        /// Number of replicates of `--response` [default: 1]
        #[arg(long, conflicts_with = "responses")]
        replicates: Option<NonZeroUsize>,

        /// Confidence level of the prediction intervals in percent
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Report method validation parameters
    Validate {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Fit every CSV table in a directory, one analyte per file
    Batch {
        directory: PathBuf,
    },
    /// Score the five screening questions, answered in order
    Risk {
        #[arg(num_args = 5, value_names = ["TOXICITY", "REGULATION", "MIGRATION", "SIZE", "CONTENT"])]
        answers: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Table of calibration standards with a header row
    data: PathBuf,

    /// Header of the concentration column
    #[arg(long)]
    x_column: Option<String>,

    /// Header of the response column
    #[arg(long)]
    y_column: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Command::Fit {
            data,
            table: table_path,
            report: report_path,
        } => {
            let (set, calibration) = load_and_fit(&data, &mut config)?;
            print_calibration(&calibration);
            if let Some(path) = table_path {
                report::write_table(&set, &calibration, File::create(&path)?)?;
                info!(path = %path.display(), "wrote calculation table");
            }
            if let Some(path) = report_path {
                std::fs::write(&path, report::render_report(&set, &calibration))?;
                info!(path = %path.display(), "wrote calibration report");
            }
        }
        Command::Predict {
            data,
            responses,
            response,
            replicates,
            confidence,
        } => {
            let (_, calibration) = load_and_fit(&data, &mut config)?;
            let confidence_level =
                ConfidenceLevel::new(confidence.unwrap_or(config.confidence_level))?;
            let values = match (responses, response) {
                (Some(path), _) => {
                    let parsed = table::read_responses_file::<f64>(&path)?;
                    report_skipped(&parsed.skipped);
                    parsed.values
                }
                (None, Some(value)) => {
                    prediction::replicated(value, replicates.unwrap_or(NonZeroUsize::MIN))
                }
                (None, None) => bail!("no sample responses given"),
            };
            println!(
                "Using calibration equation: {} (R² = {:.6})",
                calibration.equation(),
                calibration.r_squared()
            );
            print_predictions(&prediction::predict(&calibration, &values, confidence_level)?);
        }
        Command::Validate { data } => {
            let (set, calibration) = load_and_fit(&data, &mut config)?;
            let validation = validation::validate(&set, &calibration, config.linearity_threshold);
            println!("Linearity");
            println!("  R²:          {:.6}", validation.r_squared);
            if let Some(f_value) = validation.f_value {
                println!("  F-value:     {f_value:.4}");
            }
            println!(
                "  Linear:      {} (R² > {})",
                if validation.linear { "yes" } else { "no" },
                config.linearity_threshold
            );
            println!("Sensitivity");
            println!("  Slope:       {:.6}", validation.sensitivity);
            println!("  LOD:         {:.6}", validation.lod);
            println!("  LOQ:         {:.6}", validation.loq);
            let (low, high) = validation.working_range;
            println!("Working range: {low:.6} - {high:.6}");
        }
        Command::Batch { directory } => {
            for analyte in calibration::build::<f64>(&directory, &config)? {
                report_skipped(&analyte.skipped);
                match analyte.fit {
                    Ok(calibration) => println!(
                        "{:<16} {}  R² = {:.6}  LOD = {:.6}  LOQ = {:.6}",
                        analyte.analyte.0,
                        calibration.equation(),
                        calibration.r_squared(),
                        calibration.lod(),
                        calibration.loq()
                    ),
                    Err(error) => println!("{:<16} {error}", analyte.analyte.0),
                }
            }
        }
        Command::Risk { answers } => {
            let answers: [&str; 5] = answers
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .try_into()
                .map_err(|_| anyhow::anyhow!("exactly five answers are required"))?;
            let assessment = risk::assess_in_order(answers);
            for ignored in &assessment.ignored {
                println!("Ignored answer for {}: {:?}", ignored.question, ignored.answer);
            }
            println!("Score: {} / 15", assessment.score);
            println!("Risk:  {}", assessment.band);
            println!("{}", assessment.advisory());
        }
    }

    Ok(())
}

fn load_and_fit(
    data: &DataArgs,
    config: &mut Config,
) -> Result<(CalibrationSet<f64>, CalibrationResult<f64>)> {
    if data.x_column.is_some() {
        config.x_column = data.x_column.clone();
    }
    if data.y_column.is_some() {
        config.y_column = data.y_column.clone();
    }
    let table = read_table(&data.data, config)?;
    info!(
        points = table.set.len(),
        x = %table.x_column,
        y = %table.y_column,
        "loaded calibration standards"
    );
    report_skipped(&table.skipped);
    let calibration = table.set.fit()?;
    Ok((table.set, calibration))
}

fn read_table(path: &Path, config: &Config) -> Result<table::CalibrationTable<f64>> {
    table::read_calibration_file(path, config)
        .with_context(|| format!("failed to read calibration data {}", path.display()))
}

fn report_skipped(skipped: &[SkippedRow]) {
    for row in skipped {
        println!("Skipped line {}: {}", row.line, row.reason);
    }
}

fn print_calibration(calibration: &CalibrationResult<f64>) {
    println!("Equation:   {}", calibration.equation());
    println!(
        "Slope:      {:.4} ± {:.4} (95% CI ±{:.4})",
        calibration.slope(),
        calibration.slope_std_err(),
        calibration.slope_ci95()
    );
    println!(
        "Intercept:  {:.4} ± {:.4} (95% CI ±{:.4})",
        calibration.intercept(),
        calibration.intercept_std_err(),
        calibration.intercept_ci95()
    );
    println!("R²:         {:.6}", calibration.r_squared());
    println!("R:          {:.4}", calibration.correlation());
    println!("p-value:    {:.6}", calibration.p_value());
    println!("LOD:        {:.6}", calibration.lod());
    println!("LOQ:        {:.6}", calibration.loq());
    println!("S_res:      {:.6}", calibration.residual_std_dev());
    if calibration.is_degenerate() {
        println!("Warning: zero slope, detection limits and predictions are not meaningful");
    }
}

fn print_predictions(report: &prediction::SampleReport<f64>) {
    let percent = report.confidence_level.percent();
    println!(
        "{:>12} {:>16} {:>14} {:>14} {:>14}",
        "Response",
        "Concentration",
        "SE prediction",
        format!("{percent}% lower"),
        format!("{percent}% upper")
    );
    for sample in &report.samples {
        match sample.interval {
            Some(interval) => println!(
                "{:>12.4} {:>16.6} {:>14.6} {:>14.6} {:>14.6}",
                sample.response,
                sample.concentration,
                interval.standard_error,
                interval.lower,
                interval.upper
            ),
            None => println!("{:>12.4} {:>16.6}", sample.response, sample.concentration),
        }
    }
    if let Some(replicates) = report.replicates {
        println!("Mean concentration: {:.6}", replicates.mean);
        println!("Standard deviation: {:.6}", replicates.standard_deviation);
        println!("CV%:                {:.2}%", replicates.coefficient_of_variation);
    }
}
