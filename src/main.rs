// src/main.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use neuroclean::container::{read_fif_file, SampleFormat};
use neuroclean::processing::RenderedFigure;
use neuroclean::{ChannelSelection, ContainerSource, PipelineConfig, SessionGate, SignalPipeline, ALL_CHANNELS};

#[derive(Parser, Debug)]
#[command(name = "neuroclean", version, about = "High-pass, de-artifact and export EEG recordings")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on a MAT-file recording
    Process(ProcessArgs),
    /// Summarize an exported FIFF file
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Input MAT-file
    input: PathBuf,
    /// Channels to plot; omit or pass "All Channels" for every channel
    #[arg(short, long, num_args = 1..)]
    channels: Vec<String>,
    /// High-pass cutoff in Hz (default from config, 0.5)
    #[arg(long)]
    cutoff: Option<f64>,
    /// JSON pipeline configuration; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory for the exported FIFF file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Directory for noisy.png and corrected.png (default: output dir)
    #[arg(long)]
    figures_dir: Option<PathBuf>,
    /// Skip PNG rendering
    #[arg(long)]
    no_figures: bool,
    /// Store samples in double precision
    #[arg(long)]
    double: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// FIFF file written by `process`
    file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Process(args) => process(args),
        Command::Inspect(args) => inspect(args),
    }
}

fn process(args: ProcessArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.output_dir {
        config.export.output_dir = dir.clone();
    }
    if args.no_figures {
        config.view.rasterize = false;
    }
    if args.double {
        config.export.format = SampleFormat::Double;
    }
    let cutoff = args.cutoff.unwrap_or(config.highpass.default_cutoff_hz);
    let figures_dir = args
        .figures_dir
        .clone()
        .unwrap_or_else(|| config.export.output_dir.clone());
    let selection = if args.channels.is_empty() {
        ChannelSelection::from_requested(&[ALL_CHANNELS])
    } else {
        ChannelSelection::from_requested(args.channels.as_slice())
    };

    let pipeline = SignalPipeline::new(config);
    // a local operator running the CLI is the authenticated party
    let output = pipeline
        .process(
            SessionGate::Authenticated,
            &ContainerSource::Path(args.input.clone()),
            &selection,
            cutoff,
        )
        .with_context(|| format!("processing {}", args.input.display()))?;

    write_figure(&figures_dir, "noisy.png", &output.noisy)?;
    write_figure(&figures_dir, "corrected.png", &output.corrected)?;
    println!(
        "{} channels at {} Hz, high-pass {} Hz, {} coefficients adjusted",
        output.metadata.len(),
        output.metadata.sampling_rate(),
        output.cutoff_hz,
        output.denoise_report.total_adjusted()
    );
    println!(
        "exported {} ({} bytes)",
        output.export.path.display(),
        output.export.bytes.len()
    );
    Ok(())
}

fn write_figure(dir: &Path, name: &str, figure: &RenderedFigure) -> Result<()> {
    let Some(png) = &figure.png else {
        return Ok(());
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
    println!("figure {}", path.display());
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let recording = read_fif_file(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    println!("channels: {}", recording.channel_names.join(", "));
    println!("sampling rate: {} Hz", recording.sampling_rate);
    println!(
        "samples: {} ({:.2} s)",
        recording.n_samples(),
        recording.n_samples() as f64 / recording.sampling_rate
    );
    println!(
        "pass band: {} - {} Hz",
        recording.highpass_hz, recording.lowpass_hz
    );
    Ok(())
}
