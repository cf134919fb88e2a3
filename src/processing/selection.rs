use crate::processing::error::PipelineError;
use crate::processing::matrix::ChannelMetadata;

/// Selection entry meaning "every channel".
pub const ALL_CHANNELS: &str = "All Channels";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChannelSelection {
    #[default]
    All,
    Named(Vec<String>),
}
impl ChannelSelection {
    /// Interpret a list as chosen in the UI: the sentinel anywhere wins.
    pub fn from_requested<S: AsRef<str>>(requested: &[S]) -> Self {
        if requested.iter().any(|r| r.as_ref() == ALL_CHANNELS) {
            ChannelSelection::All
        } else {
            ChannelSelection::Named(requested.iter().map(|r| r.as_ref().to_string()).collect())
        }
    }
    /// Row indices in plot order. Repeated names are kept once.
    pub fn resolve(&self, metadata: &ChannelMetadata) -> Result<Vec<usize>, PipelineError> {
        match self {
            ChannelSelection::All => Ok((0..metadata.len()).collect()),
            ChannelSelection::Named(names) => {
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    let idx = metadata
                        .position(name)
                        .ok_or_else(|| PipelineError::UnknownChannel { name: name.clone() })?;
                    if !indices.contains(&idx) {
                        indices.push(idx);
                    }
                }
                Ok(indices)
            }
        }
    }
}
