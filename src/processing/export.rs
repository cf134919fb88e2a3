use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::container::{write_fif, FifRecording, SampleFormat};
use crate::processing::error::PipelineError;
use crate::processing::matrix::SignalMatrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub file_name: String,
    pub format: SampleFormat,
}
impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            file_name: "corrected_eeg.fif".into(),
            format: SampleFormat::Single,
        }
    }
}

/// The persisted file and its exact contents.
#[derive(Clone, Debug)]
pub struct ExportedContainer {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct ContainerExporter {
    config: ExportConfig,
}
impl ContainerExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }
    pub fn target_path(&self) -> PathBuf {
        self.config.output_dir.join(&self.config.file_name)
    }
    pub fn export(
        &self,
        matrix: &SignalMatrix,
        names: &[String],
        sampling_rate: f64,
    ) -> Result<ExportedContainer, PipelineError> {
        self.export_with_band(matrix, names, sampling_rate, 0.0)
    }
    /// Like [`export`](Self::export), recording `highpass_hz` as the lower
    /// edge of the data's pass band.
    pub fn export_with_band(
        &self,
        matrix: &SignalMatrix,
        names: &[String],
        sampling_rate: f64,
        highpass_hz: f64,
    ) -> Result<ExportedContainer, PipelineError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(PipelineError::invalid(
                "sampling_rate",
                sampling_rate,
                "must be a positive finite number",
            ));
        }
        let n_channels = matrix.n_channels();
        if names.len() < n_channels {
            return Err(PipelineError::format(
                "channel_names",
                format!("{} names for {n_channels} channels", names.len()),
            ));
        }
        let recording = FifRecording {
            channel_names: names[..n_channels].to_vec(),
            sampling_rate,
            highpass_hz,
            lowpass_hz: sampling_rate / 2.0,
            meas_date: Some(SystemTime::now()),
            data: matrix.as_array().clone(),
        };
        let buffer_len = (sampling_rate.round() as usize).max(1);
        let mut bytes = Vec::new();
        write_fif(&mut bytes, &recording, self.config.format, buffer_len)?;

        let path = self.target_path();
        persist(&path, &bytes)?;
        log::info!(
            "exported {} channels x {} samples to {} ({} bytes)",
            n_channels,
            matrix.n_samples(),
            path.display(),
            bytes.len()
        );
        Ok(ExportedContainer { path, bytes })
    }
}

/// Write through a uniquely named sibling temp file and rename it over
/// `path`. Concurrent exports to one target each leave a complete file.
fn persist(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| PipelineError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::read_fif_file;
    use tempfile::tempdir;

    fn matrix() -> SignalMatrix {
        SignalMatrix::from_rows(vec![
            (0..300).map(|i| i as f64 * 0.5).collect(),
            (0..300).map(|i| -(i as f64)).collect(),
        ])
        .unwrap()
    }

    fn names() -> Vec<String> {
        ["Fp1", "Fp2", "F3", "Status"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn names_are_truncated_and_file_reloads() {
        let dir = tempdir().unwrap();
        let exporter = ContainerExporter::new(ExportConfig {
            output_dir: dir.path().join("nested"),
            format: SampleFormat::Double,
            ..ExportConfig::default()
        });
        let out = exporter.export_with_band(&matrix(), &names(), 128.0, 0.5).unwrap();
        assert_eq!(out.path, dir.path().join("nested").join("corrected_eeg.fif"));
        assert_eq!(fs::read(&out.path).unwrap(), out.bytes);
        let back = read_fif_file(&out.path).unwrap();
        assert_eq!(back.channel_names, vec!["Fp1", "Fp2"]);
        assert_eq!(back.data, *matrix().as_array());
        assert_eq!(back.highpass_hz, 0.5);
        assert_eq!(back.lowpass_hz, 64.0);
    }

    #[test]
    fn second_export_overwrites_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let exporter = ContainerExporter::new(ExportConfig {
            output_dir: dir.path().to_path_buf(),
            ..ExportConfig::default()
        });
        exporter.export(&matrix(), &names(), 128.0).unwrap();
        let smaller = SignalMatrix::from_rows(vec![vec![1.0; 10]]).unwrap();
        let out = exporter.export(&smaller, &names(), 128.0).unwrap();
        assert_eq!(read_fif_file(&out.path).unwrap().channel_names, vec!["Fp1"]);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn concurrent_exports_leave_one_complete_file() {
        let dir = tempdir().unwrap();
        let config = ExportConfig {
            output_dir: dir.path().to_path_buf(),
            ..ExportConfig::default()
        };
        let handles: Vec<_> = (0..6)
            .map(|k| {
                let exporter = ContainerExporter::new(config.clone());
                std::thread::spawn(move || {
                    let rows = (0..4)
                        .map(|c| (0..20_000 + k * 5_000).map(|i| (i * (c + 1)) as f64).collect())
                        .collect();
                    let matrix = SignalMatrix::from_rows(rows).unwrap();
                    let names: Vec<String> =
                        ["Fp1", "Fp2", "F3", "F4"].iter().map(|s| s.to_string()).collect();
                    exporter.export(&matrix, &names, 256.0).unwrap().bytes
                })
            })
            .collect();
        let written: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let target = ContainerExporter::new(config).target_path();
        let on_disk = fs::read(&target).unwrap();
        assert!(written.iter().any(|b| *b == on_disk));
        assert_eq!(read_fif_file(&target).unwrap().channel_names.len(), 4);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn too_few_names_is_format_error() {
        let dir = tempdir().unwrap();
        let exporter = ContainerExporter::new(ExportConfig {
            output_dir: dir.path().to_path_buf(),
            ..ExportConfig::default()
        });
        let err = exporter
            .export(&matrix(), &["Fp1".to_string()], 128.0)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
        assert!(!exporter.target_path().exists());
    }

    #[test]
    fn unwritable_location_is_io_error_naming_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let exporter = ContainerExporter::new(ExportConfig {
            output_dir: blocker.join("sub"),
            ..ExportConfig::default()
        });
        let err = exporter.export(&matrix(), &names(), 128.0).unwrap_err();
        match err {
            PipelineError::Io { path, .. } => assert!(path.starts_with(&blocker)),
            other => panic!("unexpected {other}"),
        }
    }
}
