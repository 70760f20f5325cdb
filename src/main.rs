/// IMR Analyzer - exploratory analysis and hypothesis testing for Independent Medical Reviews
///
/// The main entry point for the analyzer application. It parses command-line
/// arguments and coordinates loading, analysis, chart rendering and export.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use imr_analyzer::config::AnalysisConfig;
use imr_analyzer::core::analyzer::{AnalysisReport, ImrAnalyzer};
use imr_analyzer::core::dataset::{ReviewField, ReviewTable};
use imr_analyzer::utils::charts::{self, ChartKind};
use imr_analyzer::utils::{file_utils, output_formatter};

/// Command line argument structure
#[derive(Parser, Debug)]
#[command(
    name = "imr_analyzer",
    version,
    about = "Exploratory analysis and hypothesis testing for Independent Medical Review outcomes",
    long_about = "This tool analyzes Independent Medical Review (IMR) extracts:
- Determination breakdowns by year, age, gender, diagnosis and treatment
- Overturn-rate comparison between one group and all other reviews
- Welch's t-test, significance thresholds and statistical power
- SVG charts and JSON, HTML or CSV reports"
)]
struct Args {
    /// Path to the IMR CSV file
    #[arg(name = "input", default_value = "data/imr_trends.csv")]
    input: String,

    /// Column defining the comparison group (e.g. AgeRange, PatientGender)
    #[arg(long = "group-field")]
    group_field: Option<String>,

    /// Value of the group column for the comparison group (default: "11 to 20")
    #[arg(long = "group-value")]
    group_value: Option<String>,

    /// Significance level: 0.05, 0.02 or 0.01 (default: 0.05)
    #[arg(long = "sig-level")]
    sig_level: Option<f64>,

    /// Directory for rendered SVG charts (default: charts)
    #[arg(long = "charts-dir")]
    charts_dir: Option<String>,

    /// Skip chart rendering
    #[arg(long = "no-charts", action = ArgAction::SetTrue)]
    no_charts: bool,

    /// Output in markdown format (wrapped in triple backticks)
    #[arg(long = "md", action = ArgAction::SetTrue)]
    md: bool,

    /// Export the report to a JSON file (name derived from the input if omitted)
    #[arg(long = "json", num_args = 0..=1)]
    json: Option<Option<String>>,

    /// Export the report to an HTML file (name derived from the input if omitted)
    #[arg(long = "html", num_args = 0..=1)]
    html: Option<Option<String>>,

    /// Export the report to a CSV file (name derived from the input if omitted)
    #[arg(long = "csv", num_args = 0..=1)]
    csv: Option<Option<String>>,

    /// Directory to store all output files
    #[arg(long = "output-dir")]
    output_dir: Option<String>,

    /// Suppress terminal output
    #[arg(long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Show only summary information
    #[arg(long = "summary-only", action = ArgAction::SetTrue)]
    summary_only: bool,

    /// Path to configuration file
    #[arg(long = "config")]
    config: Option<String>,

    /// Number of chart rendering workers (0=auto, default: auto)
    #[arg(long = "parallel", default_value = "0")]
    parallel: usize,

    /// Set logging level (default: INFO)
    #[arg(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// Log file path (default: imr_analyzer.log)
    #[arg(long = "log-file", default_value = "imr_analyzer.log")]
    log_file: String,
}

/// Main entry point function
fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    let _ = setup_logging(&args);

    let analyzer = match resolve_analyzer(&args) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            process::exit(2);
        }
    };

    let input = PathBuf::from(&args.input);
    if !input.is_file() {
        error!("Input file not found: {}", input.display());
        eprintln!("{} {}", "Error: Input file not found:".red(), input.display());
        eprintln!("Run with --help for usage information");
        process::exit(1);
    }

    let table = ReviewTable::load(&input)
        .context(format!("Failed to load reviews from {}", input.display()))?;
    let config = analyzer.config();
    let report = analyzer
        .analyze(&table)
        .context("Failed to analyze reviews")?;

    let output_dir = args.output_dir.as_deref().map(Path::new);
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let charts_written = if config.render_charts {
        let charts_dir = match output_dir {
            Some(dir) if config.charts_dir.is_relative() => dir.join(&config.charts_dir),
            _ => config.charts_dir.clone(),
        };
        render_charts(&report, &charts_dir, &args)?
    } else {
        Vec::new()
    };

    export_all_results(&report, &input, output_dir, &args)?;

    if !args.quiet {
        let elapsed_time = start_time.elapsed();
        println!("\n{}", "Analysis Complete".bold());
        println!("{} {}", "Reviews analyzed:".green(), report.summary.rows);
        println!("{} {}", "Charts written:".green(), charts_written.len());
        println!(
            "{} {:.2} seconds",
            "Time elapsed:".green(),
            elapsed_time.as_secs_f64()
        );

        println!("\n{}", "=".repeat(80).bold());
        println!("{} {}", "Results for:".cyan(), input.display());
        println!("{}", "=".repeat(80).bold());
        println!(
            "{}",
            output_formatter::format_report(&report, args.md, args.summary_only)
        );
    }

    Ok(())
}

/// Set up logging with file output
fn setup_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(args.log_level);

    builder.format(|buf, record| {
        use chrono::Local;
        use std::io::Write;
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Ok(file) = File::create(&args.log_file) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();

    Ok(())
}

/// Load configuration from file if provided
///
/// A missing or malformed file is logged and the defaults are used.
fn load_config(config_path: &Option<String>) -> AnalysisConfig {
    match config_path {
        Some(path) => {
            let path = Path::new(path);
            if !path.exists() {
                error!("Configuration file not found: {}", path.display());
                AnalysisConfig::default()
            } else {
                match AnalysisConfig::from_file(path) {
                    Ok(config) => {
                        info!("Loaded configuration from {}", path.display());
                        config
                    }
                    Err(e) => {
                        error!("{:#}", e);
                        AnalysisConfig::default()
                    }
                }
            }
        }
        None => AnalysisConfig::default(),
    }
}

/// Apply command line overrides on top of the configuration file
fn resolve_config(args: &Args) -> Result<AnalysisConfig> {
    let mut config = load_config(&args.config);

    if let Some(field) = &args.group_field {
        config.group_field = field.parse::<ReviewField>()?;
    }
    if let Some(value) = &args.group_value {
        config.group_value = value.clone();
    }
    if let Some(level) = args.sig_level {
        config.significance_level = level;
    }
    if let Some(dir) = &args.charts_dir {
        config.charts_dir = PathBuf::from(dir);
    }
    if args.no_charts {
        config.render_charts = false;
    }

    Ok(config)
}

/// Resolve the configuration and build an analyzer from it, before any data is read
fn resolve_analyzer(args: &Args) -> Result<ImrAnalyzer> {
    let config = resolve_config(args)?;
    Ok(ImrAnalyzer::new(&config)?)
}

/// Render all charts with progress tracking
fn render_charts(report: &AnalysisReport, charts_dir: &Path, args: &Args) -> Result<Vec<PathBuf>> {
    let num_workers = if args.parallel == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        args.parallel
    };
    let total_charts = ChartKind::all().len();

    if !args.quiet {
        println!(
            "\n{} {} charts with {} workers...",
            "Rendering".bold(),
            total_charts,
            num_workers
        );
    }

    let progress_bar = if !args.quiet {
        let pb = ProgressBar::new(total_charts as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} charts ({eta})")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let written = charts::render_all(report, charts_dir, num_workers, progress_bar.as_ref())?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Charts complete");
    }
    if written.len() < total_charts {
        warn!("{} charts failed to render", total_charts - written.len());
    }

    Ok(written)
}

/// Export the report based on command line arguments
fn export_all_results(
    report: &AnalysisReport,
    input: &Path,
    output_dir: Option<&Path>,
    args: &Args,
) -> Result<()> {
    let target = |requested: &Option<String>, extension: &str| match requested {
        Some(name) => file_utils::resolve_output_path(name, output_dir),
        None => file_utils::generate_output_path(output_dir, input, extension),
    };

    if let Some(json_path) = &args.json {
        let json_path = target(json_path, ".json");
        output_formatter::export_report_json(report, &json_path)?;
        info!("Wrote JSON report to {}", json_path.display());
    }

    if let Some(html_path) = &args.html {
        let html_path = target(html_path, ".html");
        output_formatter::create_html_report(report, &html_path)?;
        info!("Wrote HTML report to {}", html_path.display());
    }

    if let Some(csv_path) = &args.csv {
        let csv_path = target(csv_path, ".csv");
        output_formatter::create_csv_report(report, &csv_path)?;
        info!("Wrote CSV report to {}", csv_path.display());
    }

    Ok(())
}
