//! Periodized orthonormal discrete wavelet transform.
use std::f64::consts::FRAC_1_SQRT_2;

use serde::{Deserialize, Serialize};

use crate::processing::error::PipelineError;

const HAAR: [f64; 2] = [FRAC_1_SQRT_2, FRAC_1_SQRT_2];
const DB2: [f64; 4] = [
    0.482_962_913_144_534_16,
    0.836_516_303_737_807_9,
    0.224_143_868_042_013_4,
    -0.129_409_522_551_260_37,
];
const DB3: [f64; 6] = [
    0.332_670_552_950_082_63,
    0.806_891_509_311_092_5,
    0.459_877_502_118_491_54,
    -0.135_011_020_010_254_58,
    -0.085_441_273_882_026_66,
    0.035_226_291_885_709_53,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    Haar,
    Db2,
    #[default]
    Db3,
}
impl Wavelet {
    /// Decomposition low-pass filter.
    pub fn low_pass(&self) -> &'static [f64] {
        match self {
            Wavelet::Haar => &HAAR,
            Wavelet::Db2 => &DB2,
            Wavelet::Db3 => &DB3,
        }
    }
    pub fn filter_len(&self) -> usize {
        self.low_pass().len()
    }
    fn high_pass(&self) -> Vec<f64> {
        let h = self.low_pass();
        let l = h.len();
        (0..l)
            .map(|n| if n % 2 == 0 { h[l - 1 - n] } else { -h[l - 1 - n] })
            .collect()
    }
    /// Deepest level at which the filter still spans the coefficients.
    pub fn max_level(&self, len: usize) -> usize {
        let span = self.filter_len() - 1;
        let ratio = len / span;
        if ratio == 0 {
            0
        } else {
            ratio.ilog2() as usize
        }
    }
}

/// Multi-level decomposition; `details[0]` is the finest level.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveletCoeffs {
    pub approx: Vec<f64>,
    pub details: Vec<Vec<f64>>,
}
impl WaveletCoeffs {
    pub fn levels(&self) -> usize {
        self.details.len()
    }
}

fn analyze(h: &[f64], g: &[f64], x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let m = x.len();
    let half = m / 2;
    let mut approx = vec![0.0; half];
    let mut detail = vec![0.0; half];
    for k in 0..half {
        for (n, (&hn, &gn)) in h.iter().zip(g).enumerate() {
            let v = x[(2 * k + n) % m];
            approx[k] += hn * v;
            detail[k] += gn * v;
        }
    }
    (approx, detail)
}

fn synthesize(h: &[f64], g: &[f64], approx: &[f64], detail: &[f64]) -> Vec<f64> {
    let m = approx.len() * 2;
    let mut x = vec![0.0; m];
    for (k, (&a, &d)) in approx.iter().zip(detail).enumerate() {
        for (n, (&hn, &gn)) in h.iter().zip(g).enumerate() {
            x[(2 * k + n) % m] += hn * a + gn * d;
        }
    }
    x
}

/// Decompose `x` over `levels` levels. `x.len()` must be a positive multiple
/// of `2^levels`.
pub fn wavedec(wavelet: Wavelet, x: &[f64], levels: usize) -> Result<WaveletCoeffs, PipelineError> {
    let block = 1usize.checked_shl(levels as u32).unwrap_or(0);
    if x.is_empty() || block == 0 || x.len() % block != 0 {
        return Err(PipelineError::invalid(
            "levels",
            levels as f64,
            format!("signal length {} is not a multiple of 2^levels", x.len()),
        ));
    }
    let h = wavelet.low_pass();
    let g = wavelet.high_pass();
    let mut approx = x.to_vec();
    let mut details = Vec::with_capacity(levels);
    for _ in 0..levels {
        let (a, d) = analyze(h, &g, &approx);
        details.push(d);
        approx = a;
    }
    Ok(WaveletCoeffs { approx, details })
}

pub fn waverec(wavelet: Wavelet, coeffs: &WaveletCoeffs) -> Vec<f64> {
    let h = wavelet.low_pass();
    let g = wavelet.high_pass();
    coeffs
        .details
        .iter()
        .rev()
        .fold(coeffs.approx.clone(), |approx, detail| {
            synthesize(h, &g, &approx, detail)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Wavelet; 3] = [Wavelet::Haar, Wavelet::Db2, Wavelet::Db3];

    fn test_signal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                (t * 0.3).sin() * 5.0 + (t * 0.05).cos() * 12.0 + if i % 17 == 0 { 8.0 } else { 0.0 }
            })
            .collect()
    }

    #[test]
    fn filters_are_orthonormal() {
        for w in ALL {
            let h = w.low_pass();
            let sum: f64 = h.iter().sum();
            let energy: f64 = h.iter().map(|v| v * v).sum();
            assert!((sum - std::f64::consts::SQRT_2).abs() < 1e-12, "{w:?}");
            assert!((energy - 1.0).abs() < 1e-12, "{w:?}");
            // double-shift orthogonality
            for shift in (2..h.len()).step_by(2) {
                let dot: f64 = (0..h.len() - shift).map(|n| h[n] * h[n + shift]).sum();
                assert!(dot.abs() < 1e-12, "{w:?} shift {shift}");
            }
        }
    }

    #[test]
    fn reconstruction_is_perfect() {
        let x = test_signal(512);
        for w in ALL {
            let levels = w.max_level(x.len()).min(6);
            let coeffs = wavedec(w, &x, levels).unwrap();
            assert_eq!(coeffs.levels(), levels);
            assert_eq!(coeffs.details[0].len(), 256);
            let back = waverec(w, &coeffs);
            let err = x
                .iter()
                .zip(&back)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            assert!(err < 1e-9, "{w:?}: {err}");
        }
    }

    #[test]
    fn transform_preserves_energy() {
        let x = test_signal(256);
        let coeffs = wavedec(Wavelet::Db3, &x, 4).unwrap();
        let e_in: f64 = x.iter().map(|v| v * v).sum();
        let e_out: f64 = coeffs
            .details
            .iter()
            .flatten()
            .chain(&coeffs.approx)
            .map(|v| v * v)
            .sum();
        assert!((e_in - e_out).abs() / e_in < 1e-10);
    }

    #[test]
    fn haar_of_constant_has_no_detail() {
        let coeffs = wavedec(Wavelet::Haar, &[1.0; 4], 1).unwrap();
        assert!(coeffs.details[0].iter().all(|d| d.abs() < 1e-15));
        assert!(coeffs.approx.iter().all(|a| (a - std::f64::consts::SQRT_2).abs() < 1e-15));
    }

    #[test]
    fn max_level_and_length_checks() {
        assert_eq!(Wavelet::Db3.max_level(2560), 9);
        assert_eq!(Wavelet::Haar.max_level(1024), 10);
        assert_eq!(Wavelet::Db3.max_level(4), 0);
        assert!(wavedec(Wavelet::Db2, &[0.0; 12], 3).is_err());
        assert!(wavedec(Wavelet::Db2, &[], 1).is_err());
    }
}
