// Binary container codecs: MAT-file input, FIFF raw output.
pub mod error;
pub mod fif;
pub mod mat;
pub mod mat_writer;

pub use error::ContainerError;
pub use fif::{read_fif, read_fif_file, write_fif, FifRecording, SampleFormat};
pub use mat::{MatFile, MatStruct, MatValue};
pub use mat_writer::{MatWriter, WriteValue};
