use std::f64::consts::PI;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::processing::error::PipelineError;
use crate::processing::matrix::SignalMatrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPassConfig {
    pub order: usize,
    /// Used when the caller does not pass a cutoff (CLI default).
    pub default_cutoff_hz: f64,
}
impl Default for HighPassConfig {
    fn default() -> Self {
        Self {
            order: 4,
            default_cutoff_hz: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}
impl BiquadCoeffs {
    /// Output/input ratio for a constant input.
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

#[derive(Clone, Copy, Debug)]
struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}
impl BiquadFilter {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }
    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let c = &self.coeffs;
        let y = c.b0 * input + self.state.z1;
        self.state.z1 = c.b1 * input - c.a1 * y + self.state.z2;
        self.state.z2 = c.b2 * input - c.a2 * y;
        y
    }
    /// Load the state a constant input `u` would settle into; returns the
    /// settled output, which is the next section's input.
    fn prime(&mut self, u: f64) -> f64 {
        let c = &self.coeffs;
        let g = c.dc_gain();
        self.state.z2 = (c.b2 - c.a2 * g) * u;
        self.state.z1 = (c.b1 + c.b2 - (c.a1 + c.a2) * g) * u;
        g * u
    }
}

/// Butterworth high-pass applied forward and backward (zero phase).
#[derive(Clone, Debug)]
pub struct HighPassFilter {
    order: usize,
}
impl Default for HighPassFilter {
    fn default() -> Self {
        Self::new(HighPassConfig::default().order)
    }
}
impl HighPassFilter {
    pub fn new(order: usize) -> Self {
        Self { order }
    }
    pub fn from_config(config: &HighPassConfig) -> Self {
        Self::new(config.order)
    }
    /// Samples of odd extension added on each side before filtering.
    pub fn pad_len(&self) -> usize {
        3 * (self.order + 1)
    }
    pub fn filter(
        &self,
        matrix: SignalMatrix,
        cutoff_hz: f64,
        sampling_rate: f64,
    ) -> Result<SignalMatrix, PipelineError> {
        let sections = self.design(cutoff_hz, sampling_rate)?;
        let pad = self.pad_len();
        if matrix.n_samples() <= pad {
            return Err(PipelineError::SignalTooShort {
                samples: matrix.n_samples(),
                required: pad,
            });
        }
        log::debug!(
            "high-pass order {} at {cutoff_hz} Hz ({} sections) over {} channels",
            self.order,
            sections.len(),
            matrix.n_channels()
        );
        matrix.map_rows(|_, row| Ok(filtfilt(&sections, row, pad)))
    }
    fn design(&self, cutoff_hz: f64, sampling_rate: f64) -> Result<Vec<BiquadCoeffs>, PipelineError> {
        if self.order == 0 {
            return Err(PipelineError::invalid("order", 0.0, "must be at least 1"));
        }
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(PipelineError::invalid(
                "sampling_rate",
                sampling_rate,
                "must be a positive finite number",
            ));
        }
        let nyquist = 0.5 * sampling_rate;
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 || cutoff_hz >= nyquist {
            return Err(PipelineError::invalid(
                "highpass_cutoff",
                cutoff_hz,
                format!("must lie strictly between 0 and {nyquist} Hz (half the sampling rate)"),
            ));
        }
        Ok(butterworth_highpass(self.order, cutoff_hz, sampling_rate))
    }
}

/// Second-order sections of an `order`-pole Butterworth high-pass, designed
/// with the prewarped bilinear transform.
fn butterworth_highpass(order: usize, cutoff_hz: f64, sampling_rate: f64) -> Vec<BiquadCoeffs> {
    let wc = (PI * cutoff_hz / sampling_rate).tan();
    let wc2 = wc * wc;
    let mut sections = Vec::with_capacity(order.div_ceil(2));
    for k in 0..order / 2 {
        let zeta = (PI * (2 * k + 1) as f64 / (2 * order) as f64).sin();
        let d = 1.0 + 2.0 * zeta * wc + wc2;
        sections.push(BiquadCoeffs {
            b0: 1.0 / d,
            b1: -2.0 / d,
            b2: 1.0 / d,
            a1: 2.0 * (wc2 - 1.0) / d,
            a2: (1.0 - 2.0 * zeta * wc + wc2) / d,
        });
    }
    if order % 2 == 1 {
        let b0 = 1.0 / (1.0 + wc);
        sections.push(BiquadCoeffs {
            b0,
            b1: -b0,
            b2: 0.0,
            a1: (wc - 1.0) / (wc + 1.0),
            a2: 0.0,
        });
    }
    sections
}

fn run_cascade(sections: &[BiquadCoeffs], input: &[f64]) -> Vec<f64> {
    let mut filters: Vec<BiquadFilter> = sections.iter().copied().map(BiquadFilter::new).collect();
    let mut u = input.first().copied().unwrap_or(0.0);
    for f in &mut filters {
        u = f.prime(u);
    }
    input
        .iter()
        .map(|&x| filters.iter_mut().fold(x, |v, f| f.process(v)))
        .collect()
}

fn filtfilt(sections: &[BiquadCoeffs], x: ArrayView1<'_, f64>, pad: usize) -> Array1<f64> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
    ext.extend(x.iter().copied());
    ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));

    let mut forward = run_cascade(sections, &ext);
    forward.reverse();
    let mut backward = run_cascade(sections, &forward);
    backward.reverse();
    Array1::from(backward[pad..pad + n].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 128.0;

    fn sine(n: usize, freq: f64, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    fn single(row: Vec<f64>) -> SignalMatrix {
        SignalMatrix::from_rows(vec![row]).unwrap()
    }

    fn rms(v: &[f64]) -> f64 {
        (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt()
    }

    #[test]
    fn sections_have_zero_dc_and_unit_nyquist_gain() {
        for order in [1, 3, 4, 6] {
            let sections = butterworth_highpass(order, 0.5, FS);
            assert_eq!(sections.len(), (order + 1) / 2);
            let nyquist: f64 = sections
                .iter()
                .map(|c| (c.b0 - c.b1 + c.b2) / (1.0 - c.a1 + c.a2))
                .product();
            assert!((nyquist - 1.0).abs() < 1e-9, "order {order}: {nyquist}");
            for c in &sections {
                assert!(c.dc_gain().abs() < 1e-12);
                // poles inside the unit circle
                assert!(c.a2.abs() < 1.0 && c.a1.abs() < 1.0 + c.a2);
            }
        }
    }

    #[test]
    fn passband_sine_keeps_gain_and_phase() {
        let n = 2560;
        let input = sine(n, 10.0, 20.0);
        let out = HighPassFilter::default()
            .filter(single(input.clone()), 0.5, FS)
            .unwrap();
        let out: Vec<f64> = out.row(0).to_vec();
        assert_eq!(out.len(), n);
        let mid = n / 4..3 * n / 4;
        let ratio = rms(&out[mid.clone()]) / rms(&input[mid.clone()]);
        assert!((ratio - 1.0).abs() < 1e-3, "gain {ratio}");
        let max_err = mid
            .clone()
            .map(|i| (out[i] - input[i]).abs())
            .fold(0.0, f64::max);
        assert!(max_err < 0.1, "max error {max_err}");
        let best_lag = (-3i64..=3)
            .max_by(|&a, &b| {
                let corr = |lag: i64| -> f64 {
                    mid.clone()
                        .map(|i| input[i] * out[(i as i64 + lag) as usize])
                        .sum()
                };
                corr(a).total_cmp(&corr(b))
            })
            .unwrap();
        assert_eq!(best_lag, 0);
    }

    #[test]
    fn slow_drift_and_offset_are_removed() {
        let n = 2560;
        let clean = sine(n, 10.0, 20.0);
        let drifted: Vec<f64> = clean
            .iter()
            .enumerate()
            .map(|(i, v)| v + 30.0 + 100.0 * (2.0 * PI * 0.05 * i as f64 / FS).sin())
            .collect();
        let out = HighPassFilter::default()
            .filter(single(drifted), 0.5, FS)
            .unwrap();
        let max_err = (n / 4..3 * n / 4)
            .map(|i| (out.row(0)[i] - clean[i]).abs())
            .fold(0.0, f64::max);
        assert!(max_err < 0.5, "max error {max_err}");
    }

    #[test]
    fn constant_channel_filters_to_zero() {
        let out = HighPassFilter::default()
            .filter(single(vec![42.0; 200]), 1.0, FS)
            .unwrap();
        assert!(out.row(0).iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn shape_is_preserved_for_many_channels() {
        let rows = (0..5).map(|c| sine(300, 5.0 + c as f64, 10.0)).collect();
        let m = SignalMatrix::from_rows(rows).unwrap();
        let out = HighPassFilter::default().filter(m, 1.0, FS).unwrap();
        assert_eq!(out.shape(), (5, 300));
    }

    #[test]
    fn cutoff_outside_open_band_is_rejected() {
        let f = HighPassFilter::default();
        for cutoff in [0.0, -1.0, 64.0, 100.0, f64::NAN, f64::INFINITY] {
            let err = f.filter(single(vec![0.0; 100]), cutoff, FS).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidParameter { name: "highpass_cutoff", .. }),
                "cutoff {cutoff}"
            );
        }
    }

    #[test]
    fn signal_must_exceed_pad_length() {
        let f = HighPassFilter::default();
        assert_eq!(f.pad_len(), 15);
        let err = f.filter(single(vec![1.0; 15]), 1.0, FS).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SignalTooShort { samples: 15, required: 15 }
        ));
        assert!(f.filter(single(vec![1.0; 16]), 1.0, FS).is_ok());
    }
}
