//! Automatic artifact removal by adaptive wavelet thresholding.
//!
//! Each channel is decomposed, every level (details and the final
//! approximation) is split into windows whose threshold follows the local
//! robust spread, capped by a multiple of the level-wide spread. Coefficients
//! above the threshold are shrunk and the channel is rebuilt.
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::processing::error::PipelineError;
use crate::processing::matrix::SignalMatrix;
use crate::processing::wavelet::{wavedec, waverec, Wavelet};

/// Median absolute value to standard deviation, for Gaussian noise.
const MAD_SCALE: f64 = 0.6745;
const FLAT_TOLERANCE: f64 = 1e-12;
const MIN_WINDOW: usize = 8;

/// What happens to a coefficient above its threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Decays exponentially towards zero the further it exceeds the threshold.
    #[default]
    Soft,
    Elimination,
    /// Mirrored about the threshold, reaching zero at twice the threshold.
    LinearAttenuation,
}
impl ThresholdMode {
    fn apply(self, w: f64, theta: f64) -> f64 {
        let m = w.abs();
        match self {
            ThresholdMode::Soft => (theta * (-(m - theta) / theta).exp()).copysign(w),
            ThresholdMode::Elimination => 0.0,
            ThresholdMode::LinearAttenuation => (2.0 * theta - m).max(0.0).copysign(w),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    pub wavelet: Wavelet,
    /// Upper bound on decomposition depth.
    pub levels: usize,
    /// Window length in samples at the signal resolution; halves per level.
    pub window_len: usize,
    /// Threshold in units of robust spread.
    pub threshold_k: f64,
    /// Local spread is capped at this multiple of the level-wide spread.
    pub spread_ceiling: f64,
    pub mode: ThresholdMode,
}
impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            wavelet: Wavelet::Db3,
            levels: 6,
            window_len: 128,
            threshold_k: 4.0,
            spread_ceiling: 3.0,
            mode: ThresholdMode::Soft,
        }
    }
}
impl DenoiseConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.levels == 0 {
            return Err(PipelineError::invalid("denoise.levels", 0.0, "must be at least 1"));
        }
        if self.window_len == 0 {
            return Err(PipelineError::invalid("denoise.window_len", 0.0, "must be at least 1"));
        }
        if !self.threshold_k.is_finite() || self.threshold_k <= 0.0 {
            return Err(PipelineError::invalid(
                "denoise.threshold_k",
                self.threshold_k,
                "must be a positive finite number",
            ));
        }
        if !self.spread_ceiling.is_finite() || self.spread_ceiling < 1.0 {
            return Err(PipelineError::invalid(
                "denoise.spread_ceiling",
                self.spread_ceiling,
                "must be a finite number of at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Passthrough {
    Constant,
    NonFinite,
    TooShort,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelReport {
    pub passthrough: Option<Passthrough>,
    /// Coefficients shrunk that map inside the channel, not its extension.
    pub adjusted: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenoiseReport {
    pub channels: Vec<ChannelReport>,
}
impl DenoiseReport {
    pub fn total_adjusted(&self) -> usize {
        self.channels.iter().map(|c| c.adjusted).sum()
    }
    pub fn passthrough_count(&self) -> usize {
        self.channels.iter().filter(|c| c.passthrough.is_some()).count()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ArtifactRemover {
    config: DenoiseConfig,
}
impl ArtifactRemover {
    pub fn new(config: DenoiseConfig) -> Self {
        Self { config }
    }
    pub fn denoise(&self, matrix: SignalMatrix) -> Result<SignalMatrix, PipelineError> {
        self.denoise_with_report(matrix).map(|(m, _)| m)
    }
    pub fn denoise_with_report(
        &self,
        matrix: SignalMatrix,
    ) -> Result<(SignalMatrix, DenoiseReport), PipelineError> {
        self.config.validate()?;
        let mut report = DenoiseReport::default();
        let out = matrix.map_rows(|idx, row| {
            let (clean, channel) = self.denoise_channel(row)?;
            match channel.passthrough {
                Some(reason) => log::warn!("channel {idx} passed through unchanged ({reason:?})"),
                None => log::debug!("channel {idx}: {} coefficients adjusted", channel.adjusted),
            }
            report.channels.push(channel);
            Ok(clean)
        })?;
        Ok((out, report))
    }
    fn denoise_channel(&self, x: ArrayView1<'_, f64>) -> Result<(Array1<f64>, ChannelReport), PipelineError> {
        let cfg = &self.config;
        let n = x.len();
        let skip = |reason| {
            Ok((
                x.to_owned(),
                ChannelReport {
                    passthrough: Some(reason),
                    adjusted: 0,
                },
            ))
        };
        if x.iter().any(|v| !v.is_finite()) {
            return skip(Passthrough::NonFinite);
        }
        let (lo, hi) = x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if n == 0 || hi - lo <= FLAT_TOLERANCE * 1f64.max(lo.abs()).max(hi.abs()) {
            return skip(Passthrough::Constant);
        }
        let levels = cfg.levels.min(cfg.wavelet.max_level(2 * n));
        if levels == 0 {
            return skip(Passthrough::TooShort);
        }

        // x, then the last sample held, then x mirrored: the periodized
        // transform wraps from the mirrored tail back onto x[0] seamlessly.
        let block = 1usize << levels;
        let extended_len = (2 * n).div_ceil(block) * block;
        let hold = extended_len - 2 * n;
        let mut z = Vec::with_capacity(extended_len);
        z.extend(x.iter().copied());
        z.extend(std::iter::repeat(x[n - 1]).take(hold));
        z.extend(x.iter().rev().copied());

        let mut coeffs = wavedec(cfg.wavelet, &z, levels)?;
        let mut adjusted = 0;
        for (j, detail) in coeffs.details.iter_mut().enumerate() {
            adjusted += self.shrink_level(detail, j + 1, n);
        }
        adjusted += self.shrink_level(&mut coeffs.approx, levels, n);
        let rebuilt = waverec(cfg.wavelet, &coeffs);
        Ok((
            Array1::from(rebuilt[..n].to_vec()),
            ChannelReport {
                passthrough: None,
                adjusted,
            },
        ))
    }
    fn shrink_level(&self, coeffs: &mut [f64], level: usize, n: usize) -> usize {
        let cfg = &self.config;
        let level_spread = median_abs(coeffs) / MAD_SCALE;
        if level_spread <= 0.0 {
            return 0;
        }
        let window = (cfg.window_len >> level).max(MIN_WINDOW);
        let mut adjusted = 0;
        for (w_idx, chunk) in coeffs.chunks_mut(window).enumerate() {
            let mut local = median_abs(chunk) / MAD_SCALE;
            if local <= 0.0 {
                local = level_spread;
            }
            let theta = cfg.threshold_k * local.min(cfg.spread_ceiling * level_spread);
            for (i, w) in chunk.iter_mut().enumerate() {
                if w.abs() > theta {
                    *w = cfg.mode.apply(*w, theta);
                    if (w_idx * window + i) << level < n {
                        adjusted += 1;
                    }
                }
            }
        }
        adjusted
    }
}

fn median_abs(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    abs.sort_by(f64::total_cmp);
    let mid = abs.len() / 2;
    if abs.len() % 2 == 1 {
        abs[mid]
    } else {
        0.5 * (abs[mid - 1] + abs[mid])
    }
}
