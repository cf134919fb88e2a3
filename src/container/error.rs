use thiserror::Error;
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("i/o failure while reading container: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a MAT-file: {0}")]
    BadHeader(String),
    #[error("unsupported MAT-file version: {0}")]
    UnsupportedVersion(String),
    #[error("malformed element at offset {offset}: {detail}")]
    Malformed { offset: u64, detail: String },
    #[error("unsupported data type {0}")]
    UnsupportedDataType(u32),
    #[error("variable `{0}` not found")]
    MissingVariable(String),
    #[error("field `{field}` not found in `{parent}`")]
    MissingField { parent: String, field: String },
    #[error("`{name}` has the wrong kind: expected {expected}")]
    WrongKind { name: String, expected: &'static str },
    #[error("FIFF structure error: {0}")]
    Fiff(String),
    #[error("channel name `{0}` does not fit a FIFF channel record (max 15 bytes)")]
    ChannelNameTooLong(String),
}
