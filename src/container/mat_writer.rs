//! Minimal little-endian Level-5 MAT-file writer.
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::Array2;

use crate::container::error::ContainerError;
use crate::container::mat::{
    MI_COMPRESSED, MI_DOUBLE, MI_INT32, MI_INT8, MI_MATRIX, MI_UINT16, MI_UINT32, MX_CELL,
    MX_CHAR, MX_DOUBLE, MX_STRUCT,
};

#[derive(Clone, Debug)]
pub enum WriteValue {
    Numeric(Array2<f64>),
    Char(String),
    Struct(Vec<(String, WriteValue)>),
    Cell(Vec<WriteValue>),
}

#[derive(Clone, Debug)]
pub struct MatWriter {
    description: String,
    variables: Vec<(String, WriteValue)>,
}
impl Default for MatWriter {
    fn default() -> Self {
        Self::new()
    }
}
impl MatWriter {
    pub fn new() -> Self {
        Self {
            description: "MATLAB 5.0 MAT-file, written by neuroclean".into(),
            variables: Vec::new(),
        }
    }
    pub fn add(&mut self, name: impl Into<String>, value: WriteValue) -> &mut Self {
        self.variables.push((name.into(), value));
        self
    }
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>, ContainerError> {
        let mut out = Vec::new();
        let mut text = self.description.clone().into_bytes();
        text.resize(116, b' ');
        out.extend_from_slice(&text);
        out.extend_from_slice(&[0u8; 8]);
        out.write_u16::<LittleEndian>(0x0100)?;
        out.extend_from_slice(b"IM");
        for (name, value) in &self.variables {
            let element = encode_matrix(name, value)?;
            if compress {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&element)?;
                let packed = encoder.finish()?;
                write_tag(&mut out, MI_COMPRESSED, packed.len())?;
                out.extend_from_slice(&packed);
            } else {
                out.extend_from_slice(&element);
            }
        }
        Ok(out)
    }
    pub fn write_to_path(&self, path: impl AsRef<Path>, compress: bool) -> Result<(), ContainerError> {
        std::fs::write(path, self.to_bytes(compress)?)?;
        Ok(())
    }
}

fn write_tag(out: &mut Vec<u8>, data_type: u32, size: usize) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(data_type)?;
    out.write_u32::<LittleEndian>(size as u32)
}

fn pad(out: &mut Vec<u8>) {
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

fn write_header(out: &mut Vec<u8>, class: u8, rows: usize, cols: usize, name: &str) -> std::io::Result<()> {
    write_tag(out, MI_UINT32, 8)?;
    out.write_u32::<LittleEndian>(class as u32)?;
    out.write_u32::<LittleEndian>(0)?;
    write_tag(out, MI_INT32, 8)?;
    out.write_i32::<LittleEndian>(rows as i32)?;
    out.write_i32::<LittleEndian>(cols as i32)?;
    write_tag(out, MI_INT8, name.len())?;
    out.extend_from_slice(name.as_bytes());
    pad(out);
    Ok(())
}

fn encode_matrix(name: &str, value: &WriteValue) -> Result<Vec<u8>, ContainerError> {
    let mut body = Vec::new();
    match value {
        WriteValue::Numeric(array) => {
            let (rows, cols) = array.dim();
            write_header(&mut body, MX_DOUBLE, rows, cols, name)?;
            write_tag(&mut body, MI_DOUBLE, rows * cols * 8)?;
            // column-major
            for v in array.t().iter() {
                body.write_f64::<LittleEndian>(*v)?;
            }
        }
        WriteValue::Char(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            write_header(&mut body, MX_CHAR, 1, units.len(), name)?;
            write_tag(&mut body, MI_UINT16, units.len() * 2)?;
            for u in units {
                body.write_u16::<LittleEndian>(u)?;
            }
            pad(&mut body);
        }
        WriteValue::Struct(fields) => {
            write_header(&mut body, MX_STRUCT, 1, 1, name)?;
            let name_len = fields
                .iter()
                .map(|(f, _)| f.len() + 1)
                .max()
                .unwrap_or(1)
                .max(32);
            write_tag(&mut body, MI_INT32, 4)?;
            body.write_i32::<LittleEndian>(name_len as i32)?;
            pad(&mut body);
            write_tag(&mut body, MI_INT8, name_len * fields.len())?;
            for (field, _) in fields {
                let mut slot = field.clone().into_bytes();
                slot.resize(name_len, 0);
                body.extend_from_slice(&slot);
            }
            pad(&mut body);
            for (_, field_value) in fields {
                body.extend_from_slice(&encode_matrix("", field_value)?);
            }
        }
        WriteValue::Cell(items) => {
            write_header(&mut body, MX_CELL, 1, items.len(), name)?;
            for item in items {
                body.extend_from_slice(&encode_matrix("", item)?);
            }
        }
    }
    let mut element = Vec::with_capacity(body.len() + 8);
    write_tag(&mut element, MI_MATRIX, body.len())?;
    element.extend_from_slice(&body);
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mat::{MatFile, MatValue};
    use ndarray::array;

    #[test]
    fn cell_of_channel_names_reads_back() {
        let mut writer = MatWriter::new();
        writer.add(
            "labels",
            WriteValue::Cell(vec![
                WriteValue::Char("Fp1".into()),
                WriteValue::Char("Fp2".into()),
            ]),
        );
        writer.add("x", WriteValue::Numeric(array![[0.5], [1.5], [2.5]]));
        let mat = MatFile::from_bytes(&writer.to_bytes(true).unwrap()).unwrap();
        match mat.variable("labels").unwrap() {
            MatValue::Cell(items) => {
                let names: Vec<_> = items
                    .iter()
                    .map(|v| match v {
                        MatValue::Char(rows) => rows[0].clone(),
                        _ => String::new(),
                    })
                    .collect();
                assert_eq!(names, vec!["Fp1", "Fp2"]);
            }
            other => panic!("unexpected {}", other.kind()),
        }
        assert_eq!(
            mat.variable("x").unwrap().as_numeric().unwrap().dim(),
            (3, 1)
        );
    }

    #[test]
    fn elements_stay_eight_byte_aligned() {
        let mut writer = MatWriter::new();
        writer.add("odd", WriteValue::Char("abc".into()));
        let bytes = writer.to_bytes(false).unwrap();
        assert_eq!(bytes.len() % 8, 0);
    }

    #[test]
    fn file_on_disk_opens_with_struct_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.mat");
        let mut writer = MatWriter::new();
        writer.add(
            "info",
            WriteValue::Struct(vec![("ns".into(), WriteValue::Numeric(array![[256.0]]))]),
        );
        writer.write_to_path(&path, false).unwrap();
        let mat = MatFile::open(&path).unwrap();
        assert_eq!(mat.variable_names().collect::<Vec<_>>(), vec!["info"]);
        match mat.variable("info").unwrap() {
            MatValue::Struct(s) => {
                let ns = s.field("ns").unwrap().as_numeric().unwrap();
                assert_eq!(ns[[0, 0]], 256.0);
            }
            other => panic!("unexpected {}", other.kind()),
        }
        assert!(matches!(
            MatFile::open(dir.path().join("missing.mat")),
            Err(ContainerError::Io(_))
        ));
    }
}
