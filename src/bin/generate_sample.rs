//! Writes a synthetic 15-channel recording in the layout `neuroclean process`
//! expects: `eeg` (channels x samples, microvolts) and `info.ns` (Hz).
use std::f64::consts::PI;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use neuroclean::container::{MatWriter, WriteValue};
use neuroclean::processing::DEFAULT_CHANNELS;

#[derive(Parser, Debug)]
#[command(name = "generate_sample", about = "Generate a synthetic EEG MAT-file")]
struct Args {
    #[arg(short, long, default_value = "sample_eeg.mat")]
    output: PathBuf,
    #[arg(long, default_value_t = 20.0)]
    seconds: f64,
    #[arg(long, default_value_t = 256.0)]
    rate: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// zlib-compress the variables (MATLAB -v7 style)
    #[arg(long)]
    compress: bool,
}

fn gauss(rng: &mut StdRng, std_dev: f64) -> f64 {
    let u1 = rng.gen::<f64>().max(1e-15);
    let u2 = rng.gen::<f64>();
    std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn blink(t: f64, at: f64, amplitude: f64) -> f64 {
    amplitude * (-(t - at).powi(2) / (2.0 * 0.08f64.powi(2))).exp()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    ensure!(args.rate > 0.0, "rate must be positive");
    ensure!(args.seconds > 0.0, "seconds must be positive");

    let mut rng = StdRng::seed_from_u64(args.seed);
    let n_channels = DEFAULT_CHANNELS.len();
    let n_samples = (args.seconds * args.rate).round() as usize;
    let blinks: Vec<f64> = (1..)
        .map(|k| k as f64 * 4.0 - 1.5)
        .take_while(|&at| at < args.seconds)
        .collect();

    let mut eeg = Array2::<f64>::zeros((n_channels, n_samples));
    for ch in 0..n_channels {
        let name = DEFAULT_CHANNELS[ch];
        let frontal = name.starts_with("Fp") || name.starts_with("F7") || name.starts_with("F8");
        let alpha_amp = if name.starts_with('O') || name.starts_with('P') { 25.0 } else { 10.0 };
        let drift_phase = rng.gen::<f64>() * 2.0 * PI;
        let offset: f64 = rng.gen_range(-40.0..40.0);
        for s in 0..n_samples {
            let t = s as f64 / args.rate;
            eeg[[ch, s]] = if name == "Status" {
                // trigger pulses once a second
                if s % (args.rate as usize).max(1) == 0 { 1.0 } else { 0.0 }
            } else {
                let rhythm = alpha_amp * (2.0 * PI * 10.0 * t).sin()
                    + 6.0 * (2.0 * PI * 6.0 * t + ch as f64).sin();
                let drift = offset + 60.0 * (2.0 * PI * 0.07 * t + drift_phase).sin();
                let artifacts: f64 = if frontal {
                    blinks.iter().map(|&at| blink(t, at, 300.0)).sum()
                } else {
                    0.0
                };
                rhythm + drift + artifacts + gauss(&mut rng, 3.0)
            };
        }
    }

    let mut writer = MatWriter::new();
    writer.add("eeg", WriteValue::Numeric(eeg));
    writer.add(
        "info",
        WriteValue::Struct(vec![("ns".into(), WriteValue::Numeric(array![[args.rate]]))]),
    );
    writer
        .write_to_path(&args.output, args.compress)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "wrote {} ({} channels x {} samples at {} Hz, {} blinks)",
        args.output.display(),
        n_channels,
        n_samples,
        args.rate,
        blinks.len()
    );
    Ok(())
}
