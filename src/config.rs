use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::processing::denoise::DenoiseConfig;
use crate::processing::error::PipelineError;
use crate::processing::export::ExportConfig;
use crate::processing::filter::HighPassConfig;
use crate::processing::loader::LoaderConfig;
use crate::processing::view::ViewConfig;

/// Every tunable of a pipeline run. Missing keys in a JSON file fall back to
/// the defaults below.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub highpass: HighPassConfig,
    pub denoise: DenoiseConfig,
    pub view: ViewConfig,
    pub export: ExportConfig,
}
impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let config = Self::from_json_str(&text).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.highpass.order == 0 {
            return Err(PipelineError::invalid("highpass.order", 0.0, "must be at least 1"));
        }
        let cutoff = self.highpass.default_cutoff_hz;
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(PipelineError::invalid(
                "highpass.default_cutoff_hz",
                cutoff,
                "must be a positive finite number",
            ));
        }
        self.denoise.validate()?;
        let offset = self.view.vertical_offset;
        if !offset.is_finite() || offset < 0.0 {
            return Err(PipelineError::invalid(
                "view.vertical_offset",
                offset,
                "must be a non-negative finite number",
            ));
        }
        if self.loader.channel_names.is_empty() {
            return Err(PipelineError::format("loader.channel_names", "list is empty"));
        }
        if self.export.file_name.is_empty() {
            return Err(PipelineError::format("export.file_name", "name is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::denoise::ThresholdMode;
    use crate::container::SampleFormat;

    #[test]
    fn partial_json_overrides_only_given_keys() {
        let cfg = PipelineConfig::from_json_str(
            r#"{ "denoise": { "mode": "elimination" }, "export": { "format": "double" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.denoise.mode, ThresholdMode::Elimination);
        assert_eq!(cfg.denoise.levels, 6);
        assert_eq!(cfg.export.format, SampleFormat::Double);
        assert_eq!(cfg.export.file_name, "corrected_eeg.fif");
        assert_eq!(cfg.highpass.order, 4);
        assert_eq!(cfg.view.vertical_offset, 200.0);
        assert_eq!(cfg.loader.channel_names.len(), 15);
    }

    #[test]
    fn defaults_survive_a_json_round_trip() {
        let cfg = PipelineConfig::default();
        let text = cfg.to_json_pretty().unwrap();
        assert_eq!(PipelineConfig::from_json_str(&text).unwrap(), cfg);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_files_report_their_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Config { path: ref p, .. } if p == &path));

        std::fs::write(&path, r#"{ "highpass": { "order": 0 } }"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }
}
