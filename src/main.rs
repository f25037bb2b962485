use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::util::SubscriberInitExt;

use cvtune::config::{Config, render_diagnostic};
use cvtune::cv::sweep::sweep;
use cvtune::table::OutOfRangePolicy;

#[derive(Parser)]
#[command(name = "cvtune")]
#[command(version, about = "Calibrated 1V/octave pitch lookup table generator", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// DAC reference voltage (volts)
    #[arg(long)]
    v_ref: Option<f64>,

    /// DAC resolution in bits
    #[arg(long)]
    bits: Option<u32>,

    /// Width of the DAC input register the codes are left-aligned in
    #[arg(long)]
    register_bits: Option<u32>,

    /// What to do with unreachable pitches: truncate or skip
    #[arg(long)]
    policy: Option<OutOfRangePolicy>,

    /// Lowest pitch in the table
    #[arg(long)]
    low: Option<u8>,

    /// Highest pitch in the table
    #[arg(long)]
    high: Option<u8>,

    /// Optimizer iterations
    #[arg(long)]
    iterations: Option<usize>,

    /// Optimizer learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Name of the emitted C array
    #[arg(long)]
    array_name: Option<String>,

    /// Build the table without a bias
    #[arg(long)]
    no_calibrate: bool,

    /// Also evaluate this many evenly spaced biases and print their coverage
    #[arg(long)]
    sweep: Option<usize>,

    /// Write the complete header here instead of printing the array
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Suppress the per-pitch tuning report
    #[arg(short, long)]
    quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let display = path.display().to_string();
            Config::from_json(&source).map_err(|e| anyhow!(render_diagnostic(&display, &source, &e)))?
        }
        None => Config::default(),
    };

    if let Some(v_ref) = cli.v_ref {
        config.v_ref = Some(v_ref);
    }
    if let Some(bits) = cli.bits {
        config.bits = Some(bits);
    }
    if let Some(register_bits) = cli.register_bits {
        config.header.register_bits = register_bits;
    }
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if let Some(low) = cli.low {
        config.pitch_low = low;
    }
    if let Some(high) = cli.high {
        config.pitch_high = high;
    }
    if let Some(iterations) = cli.iterations {
        config.calibrator.iterations = iterations;
    }
    if let Some(lr) = cli.learning_rate {
        config.calibrator.learning_rate = lr;
    }
    if let Some(name) = &cli.array_name {
        config.header.array_name = name.clone();
    }
    if cli.no_calibrate {
        config.calibrate = false;
    }

    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    let swept = match cli.sweep {
        Some(steps) => {
            let max_bias = config.calibrator.max_bias;
            Some(sweep(&config.dac()?, config.pitches()?, max_bias, steps)?)
        }
        None => None,
    };
    let generated = cvtune::generate(&config)?;

    if !cli.quiet {
        print!("{}", generated.report);
    }

    if let Some(result) = &swept {
        println!();
        print!("{result}");
    }

    if let Some(calibration) = &generated.calibration {
        println!("\n{calibration}");
    }

    if !generated.table.excluded.is_empty() {
        info!(
            "{} pitches excluded from the table ({:?} policy)",
            generated.table.excluded.len(),
            config.policy
        );
    }

    match &cli.output {
        Some(path) => {
            fs::write(path, &generated.header)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} entries to {}", generated.table.len(), path.display());
        }
        None => {
            println!();
            print!("{}", generated.array);
        }
    }

    Ok(())
}
