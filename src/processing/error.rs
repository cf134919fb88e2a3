use std::path::PathBuf;

use thiserror::Error;

use crate::container::ContainerError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed container ({field}): {detail}")]
    Format { field: String, detail: String },
    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: String,
    },
    #[error("unknown channel `{name}`")]
    UnknownChannel { name: String },
    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("signal has {samples} samples; filtering needs more than {required}")]
    SignalTooShort { samples: usize, required: usize },
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("invalid configuration {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },
}
impl PipelineError {
    pub(crate) fn format(field: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::Format {
            field: field.into(),
            detail: detail.into(),
        }
    }
    pub(crate) fn invalid(name: &'static str, value: f64, reason: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            name,
            value,
            reason: reason.into(),
        }
    }
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
impl From<ContainerError> for PipelineError {
    fn from(value: ContainerError) -> Self {
        let field = match &value {
            ContainerError::MissingVariable(name) => name.clone(),
            ContainerError::MissingField { parent, field } => format!("{parent}.{field}"),
            ContainerError::WrongKind { name, .. } => name.clone(),
            ContainerError::ChannelNameTooLong(name) => name.clone(),
            _ => "container".into(),
        };
        PipelineError::Format {
            field,
            detail: value.to_string(),
        }
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for PipelineError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PipelineError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for PipelineError {
    fn from(value: image::ImageError) -> Self {
        PipelineError::Plot(value.to_string())
    }
}
