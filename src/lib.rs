//! EEG clean-up pipeline: load a MAT-file recording, remove drift with a
//! zero-phase Butterworth high-pass, suppress transient artifacts with
//! adaptive wavelet thresholding, plot before/after, and export FIFF.
pub mod config;
pub mod container;
pub mod processing;

pub use config::PipelineConfig;
pub use processing::{
    process_pipeline, ChannelSelection, ContainerSource, PipelineError, PipelineOutput,
    SessionGate, SignalPipeline, ALL_CHANNELS,
};
