//! FIFF raw-file codec (the raw format MNE reads with `read_raw_fif`).
//!
//! Files are a flat sequence of big-endian tags. Every tag written here uses
//! sequential `next = 0` linkage, the last one being a NOP with `next = -1`.
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::container::error::ContainerError;

const FIFF_FILE_ID: i32 = 100;
const FIFF_DIR_POINTER: i32 = 101;
const FIFF_BLOCK_ID: i32 = 103;
const FIFF_BLOCK_START: i32 = 104;
const FIFF_BLOCK_END: i32 = 105;
const FIFF_FREE_LIST: i32 = 106;
const FIFF_NOP: i32 = 108;
const FIFF_NCHAN: i32 = 200;
const FIFF_SFREQ: i32 = 201;
const FIFF_CH_INFO: i32 = 203;
const FIFF_MEAS_DATE: i32 = 204;
const FIFF_FIRST_SAMPLE: i32 = 208;
const FIFF_LOWPASS: i32 = 219;
const FIFF_HIGHPASS: i32 = 223;
const FIFF_DATA_BUFFER: i32 = 300;

const FIFFB_MEAS: i32 = 100;
const FIFFB_MEAS_INFO: i32 = 101;
const FIFFB_RAW_DATA: i32 = 102;

const FIFFT_VOID: i32 = 0;
const FIFFT_INT: i32 = 3;
const FIFFT_FLOAT: i32 = 4;
const FIFFT_DOUBLE: i32 = 5;
const FIFFT_CH_INFO_STRUCT: i32 = 30;
const FIFFT_ID_STRUCT: i32 = 31;

const FIFFV_EEG_CH: i32 = 2;
const FIFFV_COIL_EEG: i32 = 1;
const FIFF_UNIT_V: i32 = 107;

const FIFFC_VERSION: i32 = 0x0001_0003;
const TAG_HEADER_LEN: usize = 16;
const CH_INFO_LEN: usize = 96;
const CH_NAME_LEN: usize = 16;

/// Precision of the stored data buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    Single,
    Double,
}

/// In-memory form of a raw FIFF recording. `data` is channels x samples.
#[derive(Clone, Debug)]
pub struct FifRecording {
    pub channel_names: Vec<String>,
    pub sampling_rate: f64,
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub meas_date: Option<SystemTime>,
    pub data: Array2<f64>,
}
impl FifRecording {
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }
}

struct TagWriter<'w, W: Write> {
    out: &'w mut W,
}
impl<W: Write> TagWriter<'_, W> {
    fn header(&mut self, kind: i32, ty: i32, size: usize, next: i32) -> std::io::Result<()> {
        self.out.write_i32::<BigEndian>(kind)?;
        self.out.write_i32::<BigEndian>(ty)?;
        self.out.write_i32::<BigEndian>(size as i32)?;
        self.out.write_i32::<BigEndian>(next)
    }
    fn int(&mut self, kind: i32, value: i32) -> std::io::Result<()> {
        self.header(kind, FIFFT_INT, 4, 0)?;
        self.out.write_i32::<BigEndian>(value)
    }
    fn float(&mut self, kind: i32, value: f32) -> std::io::Result<()> {
        self.header(kind, FIFFT_FLOAT, 4, 0)?;
        self.out.write_f32::<BigEndian>(value)
    }
    fn file_id(&mut self, kind: i32, at: SystemTime) -> std::io::Result<()> {
        let (secs, usecs) = split_time(at);
        self.header(kind, FIFFT_ID_STRUCT, 20, 0)?;
        self.out.write_i32::<BigEndian>(FIFFC_VERSION)?;
        // machine id; no meaningful hardware address to record
        self.out.write_i32::<BigEndian>(0)?;
        self.out.write_i32::<BigEndian>(0)?;
        self.out.write_i32::<BigEndian>(secs)?;
        self.out.write_i32::<BigEndian>(usecs)
    }
    fn start_block(&mut self, block: i32) -> std::io::Result<()> {
        self.int(FIFF_BLOCK_START, block)
    }
    fn end_block(&mut self, block: i32) -> std::io::Result<()> {
        self.int(FIFF_BLOCK_END, block)
    }
}

fn split_time(at: SystemTime) -> (i32, i32) {
    let since = at.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    (since.as_secs() as i32, since.subsec_micros() as i32)
}

/// Serialize `recording` as a raw FIFF file, splitting the data into buffers of
/// `buffer_len` samples.
pub fn write_fif<W: Write>(
    out: &mut W,
    recording: &FifRecording,
    format: SampleFormat,
    buffer_len: usize,
) -> Result<(), ContainerError> {
    let (n_channels, n_samples) = recording.data.dim();
    if recording.channel_names.len() != n_channels {
        return Err(ContainerError::Fiff(format!(
            "{} channel names for {n_channels} data rows",
            recording.channel_names.len()
        )));
    }
    if let Some(long) = recording
        .channel_names
        .iter()
        .find(|n| n.len() >= CH_NAME_LEN)
    {
        return Err(ContainerError::ChannelNameTooLong(long.clone()));
    }
    let created = SystemTime::now();
    let mut tags = TagWriter { out };
    tags.file_id(FIFF_FILE_ID, created)?;
    tags.int(FIFF_DIR_POINTER, -1)?;
    tags.int(FIFF_FREE_LIST, -1)?;

    tags.start_block(FIFFB_MEAS)?;
    tags.file_id(FIFF_BLOCK_ID, created)?;
    tags.start_block(FIFFB_MEAS_INFO)?;
    tags.int(FIFF_NCHAN, n_channels as i32)?;
    tags.float(FIFF_SFREQ, recording.sampling_rate as f32)?;
    tags.float(FIFF_LOWPASS, recording.lowpass_hz as f32)?;
    tags.float(FIFF_HIGHPASS, recording.highpass_hz as f32)?;
    if let Some(date) = recording.meas_date {
        let (secs, usecs) = split_time(date);
        tags.header(FIFF_MEAS_DATE, FIFFT_INT, 8, 0)?;
        tags.out.write_i32::<BigEndian>(secs)?;
        tags.out.write_i32::<BigEndian>(usecs)?;
    }
    for (idx, name) in recording.channel_names.iter().enumerate() {
        tags.header(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, CH_INFO_LEN, 0)?;
        let o = &mut *tags.out;
        o.write_i32::<BigEndian>(idx as i32 + 1)?; // scanNo
        o.write_i32::<BigEndian>(idx as i32 + 1)?; // logNo
        o.write_i32::<BigEndian>(FIFFV_EEG_CH)?;
        o.write_f32::<BigEndian>(1.0)?; // range
        o.write_f32::<BigEndian>(1.0)?; // cal
        o.write_i32::<BigEndian>(FIFFV_COIL_EEG)?;
        for _ in 0..12 {
            o.write_f32::<BigEndian>(0.0)?;
        }
        o.write_i32::<BigEndian>(FIFF_UNIT_V)?;
        o.write_i32::<BigEndian>(0)?; // unit_mul
        let mut slot = [0u8; CH_NAME_LEN];
        slot[..name.len()].copy_from_slice(name.as_bytes());
        o.write_all(&slot)?;
    }
    tags.end_block(FIFFB_MEAS_INFO)?;

    tags.start_block(FIFFB_RAW_DATA)?;
    tags.int(FIFF_FIRST_SAMPLE, 0)?;
    let buffer_len = buffer_len.max(1);
    let mut start = 0;
    while start < n_samples {
        let end = (start + buffer_len).min(n_samples);
        let count = (end - start) * n_channels;
        match format {
            SampleFormat::Single => {
                tags.header(FIFF_DATA_BUFFER, FIFFT_FLOAT, count * 4, 0)?;
                for s in start..end {
                    for ch in 0..n_channels {
                        tags.out.write_f32::<BigEndian>(recording.data[[ch, s]] as f32)?;
                    }
                }
            }
            SampleFormat::Double => {
                tags.header(FIFF_DATA_BUFFER, FIFFT_DOUBLE, count * 8, 0)?;
                for s in start..end {
                    for ch in 0..n_channels {
                        tags.out.write_f64::<BigEndian>(recording.data[[ch, s]])?;
                    }
                }
            }
        }
        start = end;
    }
    tags.end_block(FIFFB_RAW_DATA)?;
    tags.end_block(FIFFB_MEAS)?;
    tags.header(FIFF_NOP, FIFFT_VOID, 0, -1)?;
    tags.out.flush()?;
    Ok(())
}

pub fn read_fif_file(path: impl AsRef<Path>) -> Result<FifRecording, ContainerError> {
    let bytes = std::fs::read(path)?;
    read_fif(&bytes)
}

pub fn read_fif(bytes: &[u8]) -> Result<FifRecording, ContainerError> {
    let mut pos = 0usize;
    let mut first = true;
    let mut n_channels: Option<usize> = None;
    let mut sampling_rate: Option<f64> = None;
    let mut highpass_hz = 0.0;
    let mut lowpass_hz = 0.0;
    let mut meas_date = None;
    let mut channels: Vec<(String, f64)> = Vec::new();
    let mut samples: Vec<f64> = Vec::new();

    while pos + TAG_HEADER_LEN <= bytes.len() {
        let kind = BigEndian::read_i32(&bytes[pos..]);
        let ty = BigEndian::read_i32(&bytes[pos + 4..]);
        let size = BigEndian::read_i32(&bytes[pos + 8..]).max(0) as usize;
        let next = BigEndian::read_i32(&bytes[pos + 12..]);
        let start = pos + TAG_HEADER_LEN;
        let data = bytes.get(start..start + size).ok_or_else(|| {
            ContainerError::Fiff(format!("tag {kind} at {pos} overruns the file"))
        })?;
        if first && kind != FIFF_FILE_ID {
            return Err(ContainerError::Fiff("file does not start with a file id".into()));
        }
        first = false;
        match kind {
            FIFF_NCHAN => n_channels = Some(read_int(data)?.max(0) as usize),
            FIFF_SFREQ => sampling_rate = Some(read_float(data)?),
            FIFF_HIGHPASS => highpass_hz = read_float(data)?,
            FIFF_LOWPASS => lowpass_hz = read_float(data)?,
            FIFF_MEAS_DATE if data.len() >= 8 => {
                let secs = BigEndian::read_i32(data).max(0) as u64;
                let usecs = BigEndian::read_i32(&data[4..]).max(0) as u64;
                meas_date = Some(UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(usecs));
            }
            FIFF_CH_INFO => {
                if data.len() < CH_INFO_LEN {
                    return Err(ContainerError::Fiff("short channel info record".into()));
                }
                let range = BigEndian::read_f32(&data[12..]) as f64;
                let cal = BigEndian::read_f32(&data[16..]) as f64;
                let raw_name = &data[80..96];
                let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
                let name = String::from_utf8_lossy(&raw_name[..end]).into_owned();
                channels.push((name, range * cal));
            }
            FIFF_DATA_BUFFER => match ty {
                FIFFT_FLOAT => samples.extend(data.chunks_exact(4).map(|c| BigEndian::read_f32(c) as f64)),
                FIFFT_DOUBLE => samples.extend(data.chunks_exact(8).map(BigEndian::read_f64)),
                other => {
                    return Err(ContainerError::Fiff(format!(
                        "unsupported data buffer type {other}"
                    )))
                }
            },
            _ => {}
        }
        if next == -1 {
            break;
        }
        pos = if next > 0 { next as usize } else { start + size };
    }

    let n_channels = n_channels.ok_or_else(|| ContainerError::Fiff("missing channel count".into()))?;
    let sampling_rate =
        sampling_rate.ok_or_else(|| ContainerError::Fiff("missing sampling rate".into()))?;
    if channels.len() != n_channels {
        return Err(ContainerError::Fiff(format!(
            "{} channel records for {n_channels} channels",
            channels.len()
        )));
    }
    if n_channels == 0 || samples.len() % n_channels != 0 {
        return Err(ContainerError::Fiff(format!(
            "{} samples do not divide into {n_channels} channels",
            samples.len()
        )));
    }
    let n_samples = samples.len() / n_channels;
    let mut data = Array2::zeros((n_channels, n_samples));
    for (s, frame) in samples.chunks_exact(n_channels).enumerate() {
        for (ch, value) in frame.iter().enumerate() {
            data[[ch, s]] = value * channels[ch].1;
        }
    }
    Ok(FifRecording {
        channel_names: channels.into_iter().map(|(n, _)| n).collect(),
        sampling_rate,
        highpass_hz,
        lowpass_hz,
        meas_date,
        data,
    })
}

fn read_int(data: &[u8]) -> Result<i32, ContainerError> {
    if data.len() < 4 {
        return Err(ContainerError::Fiff("short int tag".into()));
    }
    Ok(BigEndian::read_i32(data))
}

fn read_float(data: &[u8]) -> Result<f64, ContainerError> {
    if data.len() < 4 {
        return Err(ContainerError::Fiff("short float tag".into()));
    }
    Ok(BigEndian::read_f32(data) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(n_samples: usize) -> FifRecording {
        let data = Array2::from_shape_fn((3, n_samples), |(c, s)| (c * 1000 + s) as f64 * 0.25);
        FifRecording {
            channel_names: vec!["Fp1".into(), "Fp2".into(), "Cz".into()],
            sampling_rate: 128.0,
            highpass_hz: 0.5,
            lowpass_hz: 64.0,
            meas_date: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            data,
        }
    }

    #[test]
    fn double_precision_round_trip_is_exact() {
        let rec = recording(300);
        let mut bytes = Vec::new();
        write_fif(&mut bytes, &rec, SampleFormat::Double, 128).unwrap();
        let back = read_fif(&bytes).unwrap();
        assert_eq!(back.channel_names, rec.channel_names);
        assert_eq!(back.sampling_rate, 128.0);
        assert_eq!(back.highpass_hz, 0.5);
        assert_eq!(back.lowpass_hz, 64.0);
        assert_eq!(back.meas_date, rec.meas_date);
        assert_eq!(back.data, rec.data);
    }

    #[test]
    fn single_precision_is_within_float_tolerance() {
        let rec = recording(129);
        let mut bytes = Vec::new();
        write_fif(&mut bytes, &rec, SampleFormat::Single, 128).unwrap();
        let back = read_fif(&bytes).unwrap();
        assert_eq!(back.n_samples(), 129);
        for (a, b) in back.data.iter().zip(rec.data.iter()) {
            assert!((a - b).abs() <= 1e-6 * b.abs().max(1.0));
        }
    }

    #[test]
    fn file_ends_with_terminating_nop() {
        let mut bytes = Vec::new();
        write_fif(&mut bytes, &recording(10), SampleFormat::Single, 128).unwrap();
        let tail = &bytes[bytes.len() - TAG_HEADER_LEN..];
        assert_eq!(BigEndian::read_i32(tail), FIFF_NOP);
        assert_eq!(BigEndian::read_i32(&tail[12..]), -1);
    }

    #[test]
    fn long_channel_names_are_rejected() {
        let mut rec = recording(4);
        rec.channel_names[0] = "AVeryLongChannelName".into();
        let mut bytes = Vec::new();
        assert!(matches!(
            write_fif(&mut bytes, &rec, SampleFormat::Single, 128),
            Err(ContainerError::ChannelNameTooLong(_))
        ));
    }

    #[test]
    fn garbage_is_not_a_fiff_file() {
        assert!(read_fif(&[0u8; 64]).is_err());
    }
}
