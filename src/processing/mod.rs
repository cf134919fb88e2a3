// src/processing/mod.rs
// Signal stages and the pipeline that chains them.
pub mod denoise;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod matrix;
pub mod pipeline;
pub mod plot;
pub mod selection;
pub mod session;
pub mod view;
pub mod wavelet;

pub use denoise::{ArtifactRemover, ChannelReport, DenoiseConfig, DenoiseReport, Passthrough, ThresholdMode};
pub use error::PipelineError;
pub use export::{ContainerExporter, ExportConfig, ExportedContainer};
pub use filter::{HighPassConfig, HighPassFilter};
pub use loader::{load_container, ContainerLoader, LoaderConfig, DEFAULT_CHANNELS};
pub use matrix::{ChannelMetadata, SignalMatrix};
pub use pipeline::{process_pipeline, ContainerSource, PipelineOutput, SignalPipeline};
pub use plot::{render_figure_png, PlotStyle};
pub use selection::{ChannelSelection, ALL_CHANNELS};
pub use session::SessionGate;
pub use view::{ChannelView, FigureLayout, RenderedFigure, Trace, ViewConfig, YTick};
pub use wavelet::Wavelet;
