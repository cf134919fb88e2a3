use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::processing::denoise::{ArtifactRemover, DenoiseReport};
use crate::processing::error::PipelineError;
use crate::processing::export::{ContainerExporter, ExportedContainer};
use crate::processing::filter::HighPassFilter;
use crate::processing::loader::ContainerLoader;
use crate::processing::matrix::ChannelMetadata;
use crate::processing::selection::ChannelSelection;
use crate::processing::session::SessionGate;
use crate::processing::view::{ChannelView, RenderedFigure, CORRECTED_TITLE, NOISY_TITLE};

/// Where the input container comes from.
#[derive(Clone, Debug)]
pub enum ContainerSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}
impl From<&Path> for ContainerSource {
    fn from(value: &Path) -> Self {
        ContainerSource::Path(value.to_path_buf())
    }
}
impl From<Vec<u8>> for ContainerSource {
    fn from(value: Vec<u8>) -> Self {
        ContainerSource::Bytes(value)
    }
}

/// Everything a run hands back to the presentation layer.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub metadata: ChannelMetadata,
    pub cutoff_hz: f64,
    pub noisy: RenderedFigure,
    pub corrected: RenderedFigure,
    pub denoise_report: DenoiseReport,
    pub export: ExportedContainer,
}

/// Load, high-pass, plot, denoise, plot, export.
pub struct SignalPipeline {
    loader: ContainerLoader,
    filter: HighPassFilter,
    remover: ArtifactRemover,
    view: ChannelView,
    exporter: ContainerExporter,
}
impl Default for SignalPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
impl SignalPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            loader: ContainerLoader::new(config.loader),
            filter: HighPassFilter::from_config(&config.highpass),
            remover: ArtifactRemover::new(config.denoise),
            view: ChannelView::new(config.view),
            exporter: ContainerExporter::new(config.export),
        }
    }
    pub fn process(
        &self,
        gate: SessionGate,
        source: &ContainerSource,
        selection: &ChannelSelection,
        cutoff_hz: f64,
    ) -> Result<PipelineOutput, PipelineError> {
        gate.ensure_authenticated()?;
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
            return Err(PipelineError::invalid(
                "highpass_cutoff",
                cutoff_hz,
                "must be a positive finite number",
            ));
        }
        let started = Instant::now();

        let (matrix, metadata) = match source {
            ContainerSource::Path(path) => self.loader.load_path(path)?,
            ContainerSource::Bytes(bytes) => self.loader.load_bytes(bytes)?,
        };
        let rate = metadata.sampling_rate();
        // fail on unknown channels before any work is done
        let rows = selection.resolve(&metadata)?;
        log::debug!("selection resolved to rows {rows:?}");

        let stage = Instant::now();
        let filtered = self.filter.filter(matrix, cutoff_hz, rate)?;
        log::info!("high-pass at {cutoff_hz} Hz took {:?}", stage.elapsed());

        let noisy = self.view.render(NOISY_TITLE, &filtered, &metadata, selection)?;

        let stage = Instant::now();
        let (corrected_matrix, denoise_report) = self.remover.denoise_with_report(filtered)?;
        log::info!(
            "artifact removal adjusted {} coefficients ({} channels passed through) in {:?}",
            denoise_report.total_adjusted(),
            denoise_report.passthrough_count(),
            stage.elapsed()
        );

        let corrected = self
            .view
            .render(CORRECTED_TITLE, &corrected_matrix, &metadata, selection)?;

        let export = self.exporter.export_with_band(
            &corrected_matrix,
            metadata.truncated(corrected_matrix.n_channels()),
            rate,
            cutoff_hz,
        )?;
        log::info!("pipeline finished in {:?}", started.elapsed());
        Ok(PipelineOutput {
            metadata,
            cutoff_hz,
            noisy,
            corrected,
            denoise_report,
            export,
        })
    }
}

/// Run the whole pipeline on `file` with default settings.
pub fn process_pipeline<S: AsRef<str>>(
    gate: SessionGate,
    file: impl AsRef<Path>,
    selected_channels: &[S],
    highpass_cutoff: f64,
) -> Result<PipelineOutput, PipelineError> {
    let selection = ChannelSelection::from_requested(selected_channels);
    SignalPipeline::default().process(
        gate,
        &ContainerSource::from(file.as_ref()),
        &selection,
        highpass_cutoff,
    )
}
