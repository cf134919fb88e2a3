use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::container::{MatFile, MatValue};
use crate::processing::error::PipelineError;
use crate::processing::matrix::{ChannelMetadata, SignalMatrix};

/// Montage stored in the recordings this tool was built for; the last entry
/// is the trigger/marker line, not an electrode.
pub const DEFAULT_CHANNELS: [&str; 15] = [
    "Fp1", "Fp2", "F3", "F4", "C3", "C4", "P3", "P4", "O1", "O2", "F7", "F8", "T7", "T8", "Status",
];

/// Where in the MAT-file the signal and its metadata live.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Variable holding the channels x samples matrix.
    pub signal_key: String,
    /// Struct variable holding acquisition metadata.
    pub info_key: String,
    /// Field of `info_key` holding the sampling rate.
    pub rate_field: String,
    /// One name per matrix row, in row order.
    pub channel_names: Vec<String>,
    /// Non-signal channel dropped after loading.
    pub marker_channel: Option<String>,
}
impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            signal_key: "eeg".into(),
            info_key: "info".into(),
            rate_field: "ns".into(),
            channel_names: DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect(),
            marker_channel: Some("Status".into()),
        }
    }
}

pub struct ContainerLoader {
    config: LoaderConfig,
}
impl ContainerLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }
    pub fn load_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(SignalMatrix, ChannelMetadata), PipelineError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        log::debug!("read {} bytes from {}", bytes.len(), path.display());
        self.load_bytes(&bytes)
    }
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<(SignalMatrix, ChannelMetadata), PipelineError> {
        let cfg = &self.config;
        let mat = MatFile::from_bytes(bytes)?;
        let signal = mat
            .variable(&cfg.signal_key)
            .ok_or_else(|| PipelineError::format(&cfg.signal_key, "variable not found"))?;
        let data = signal.as_numeric().ok_or_else(|| {
            PipelineError::format(
                &cfg.signal_key,
                format!("expected a numeric matrix, found {}", signal.kind()),
            )
        })?;
        let rate = self.sampling_rate(&mat)?;

        if cfg.channel_names.len() != data.nrows() {
            return Err(PipelineError::format(
                "channel_names",
                format!(
                    "{} channel names for a matrix with {} rows",
                    cfg.channel_names.len(),
                    data.nrows()
                ),
            ));
        }
        let mut matrix = SignalMatrix::new(data.clone());
        let mut metadata = ChannelMetadata::new(cfg.channel_names.clone(), rate)?;

        if let Some(marker) = &cfg.marker_channel {
            match metadata.position(marker) {
                Some(idx) => {
                    matrix = matrix.remove_channel(idx);
                    metadata = metadata.without(idx);
                    log::debug!("dropped marker channel `{marker}` (row {idx})");
                }
                None => log::warn!("marker channel `{marker}` not in channel list; keeping all rows"),
            }
        }
        log::info!(
            "loaded {} channels x {} samples at {} Hz",
            matrix.n_channels(),
            matrix.n_samples(),
            rate
        );
        Ok((matrix, metadata))
    }
    fn sampling_rate(&self, mat: &MatFile) -> Result<f64, PipelineError> {
        let cfg = &self.config;
        let field = format!("{}.{}", cfg.info_key, cfg.rate_field);
        let info = mat
            .variable(&cfg.info_key)
            .ok_or_else(|| PipelineError::format(&cfg.info_key, "variable not found"))?;
        let record = info.as_struct().ok_or_else(|| {
            PipelineError::format(&cfg.info_key, format!("expected a struct, found {}", info.kind()))
        })?;
        let value = record
            .field(&cfg.rate_field)
            .ok_or_else(|| PipelineError::format(&field, "field not found"))?;
        match value {
            MatValue::Numeric(_) => value
                .first_scalar()
                .ok_or_else(|| PipelineError::format(&field, "empty array")),
            other => Err(PipelineError::format(
                &field,
                format!("expected a number, found {}", other.kind()),
            )),
        }
    }
}

/// Load with the default layout.
pub fn load_container(path: impl AsRef<Path>) -> Result<(SignalMatrix, ChannelMetadata), PipelineError> {
    ContainerLoader::new(LoaderConfig::default()).load_path(path)
}
