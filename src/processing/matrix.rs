use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::processing::error::PipelineError;

/// Channels x samples. Every stage consumes one and hands back a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalMatrix {
    data: Array2<f64>,
}
impl SignalMatrix {
    pub fn new(data: Array2<f64>) -> Self {
        Self { data }
    }
    /// Build from per-channel rows; all rows must share one length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        let n_samples = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_samples) {
            return Err(PipelineError::format(
                "matrix",
                format!(
                    "channel {idx} has {} samples, expected {n_samples}",
                    row.len()
                ),
            ));
        }
        let n_channels = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((n_channels, n_samples), flat)
            .map_err(|e| PipelineError::format("matrix", e.to_string()))?;
        Ok(Self { data })
    }
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
    pub fn row(&self, channel: usize) -> ArrayView1<'_, f64> {
        self.data.row(channel)
    }
    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }
    pub(crate) fn remove_channel(self, channel: usize) -> Self {
        let keep: Vec<usize> = (0..self.n_channels()).filter(|&c| c != channel).collect();
        Self {
            data: self.data.select(Axis(0), &keep),
        }
    }
    /// Apply `f` to every channel independently, rebuilding a matrix of the
    /// same shape.
    pub fn map_rows<F>(mut self, mut f: F) -> Result<Self, PipelineError>
    where
        F: FnMut(usize, ArrayView1<'_, f64>) -> Result<Array1<f64>, PipelineError>,
    {
        let n_samples = self.n_samples();
        for (idx, mut row) in self.data.axis_iter_mut(Axis(0)).enumerate() {
            let out = f(idx, row.view())?;
            if out.len() != n_samples {
                return Err(PipelineError::format(
                    "matrix",
                    format!("channel {idx} changed length to {}", out.len()),
                ));
            }
            row.assign(&out);
        }
        Ok(self)
    }
}

/// Ordered unique channel names plus the shared sampling rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMetadata {
    names: Vec<String>,
    sampling_rate: f64,
}
impl ChannelMetadata {
    pub fn new(names: Vec<String>, sampling_rate: f64) -> Result<Self, PipelineError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(PipelineError::invalid(
                "sampling_rate",
                sampling_rate,
                "must be a positive finite number",
            ));
        }
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(PipelineError::format(
                    "channel_names",
                    format!("duplicate channel name `{name}`"),
                ));
            }
        }
        Ok(Self {
            names,
            sampling_rate,
        })
    }
    pub fn names(&self) -> &[String] {
        &self.names
    }
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
    /// Names cut down to the first `count` channels.
    pub fn truncated(&self, count: usize) -> &[String] {
        &self.names[..count.min(self.names.len())]
    }
    pub(crate) fn without(mut self, index: usize) -> Self {
        self.names.remove(index);
        self
    }
}
