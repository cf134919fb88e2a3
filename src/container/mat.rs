//! Reader for MATLAB Level-5 MAT-files.
//!
//! Covers what recorded signal containers actually use: numeric arrays of any
//! class (converted to `f64`), char arrays, structs and cells, in either byte
//! order, with or without zlib-compressed variables.
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use ndarray::{Array2, ShapeBuilder};

use crate::container::error::ContainerError;

const HEADER_LEN: usize = 128;

pub(crate) const MI_INT8: u32 = 1;
pub(crate) const MI_UINT8: u32 = 2;
pub(crate) const MI_INT16: u32 = 3;
pub(crate) const MI_UINT16: u32 = 4;
pub(crate) const MI_INT32: u32 = 5;
pub(crate) const MI_UINT32: u32 = 6;
pub(crate) const MI_SINGLE: u32 = 7;
pub(crate) const MI_DOUBLE: u32 = 9;
pub(crate) const MI_INT64: u32 = 12;
pub(crate) const MI_UINT64: u32 = 13;
pub(crate) const MI_MATRIX: u32 = 14;
pub(crate) const MI_COMPRESSED: u32 = 15;
pub(crate) const MI_UTF8: u32 = 16;
pub(crate) const MI_UTF16: u32 = 17;

pub(crate) const MX_CELL: u8 = 1;
pub(crate) const MX_STRUCT: u8 = 2;
pub(crate) const MX_OBJECT: u8 = 3;
pub(crate) const MX_CHAR: u8 = 4;
pub(crate) const MX_SPARSE: u8 = 5;
pub(crate) const MX_DOUBLE: u8 = 6;

const FLAG_COMPLEX: u32 = 0x0800;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}
impl Endian {
    fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        }
    }
    fn read_i32(self, bytes: &[u8]) -> i32 {
        match self {
            Endian::Little => LittleEndian::read_i32(bytes),
            Endian::Big => BigEndian::read_i32(bytes),
        }
    }
}

/// Decoded MAT-file value.
#[derive(Clone, Debug)]
pub enum MatValue {
    /// Numeric or logical array, rows x columns (trailing dimensions folded
    /// into the column count).
    Numeric(Array2<f64>),
    /// Char array, one string per row.
    Char(Vec<String>),
    Struct(MatStruct),
    Cell(Vec<MatValue>),
    /// A class this reader does not decode (sparse, object, complex data).
    Unsupported(&'static str),
}
impl MatValue {
    pub fn kind(&self) -> &'static str {
        match self {
            MatValue::Numeric(_) => "numeric",
            MatValue::Char(_) => "char",
            MatValue::Struct(_) => "struct",
            MatValue::Cell(_) => "cell",
            MatValue::Unsupported(kind) => *kind,
        }
    }
    pub fn as_numeric(&self) -> Option<&Array2<f64>> {
        match self {
            MatValue::Numeric(array) => Some(array),
            _ => None,
        }
    }
    pub fn as_struct(&self) -> Option<&MatStruct> {
        match self {
            MatValue::Struct(s) => Some(s),
            _ => None,
        }
    }
    /// First element of a numeric array, the way a 1x1 scalar is stored.
    pub fn first_scalar(&self) -> Option<f64> {
        self.as_numeric().and_then(|a| a.iter().next().copied())
    }
}

/// Struct array. Fields are stored element-major: `elements[e][f]`.
#[derive(Clone, Debug)]
pub struct MatStruct {
    pub field_names: Vec<String>,
    pub elements: Vec<Vec<MatValue>>,
}
impl MatStruct {
    /// Field of the first struct element.
    pub fn field(&self, name: &str) -> Option<&MatValue> {
        let idx = self.field_names.iter().position(|f| f == name)?;
        self.elements.first().and_then(|e| e.get(idx))
    }
}

#[derive(Clone, Debug)]
pub struct MatFile {
    pub description: String,
    pub endian: Endian,
    variables: Vec<(String, MatValue)>,
}
impl MatFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_LEN {
            return Err(ContainerError::BadHeader(format!(
                "file is {} bytes, shorter than the 128-byte header",
                bytes.len()
            )));
        }
        let description = String::from_utf8_lossy(&bytes[..116])
            .trim_end_matches(|c: char| c == ' ' || c == '\0')
            .to_string();
        if description.starts_with("MATLAB 7.3") {
            return Err(ContainerError::UnsupportedVersion(
                "v7.3 (HDF5-based) files are not supported".into(),
            ));
        }
        let endian = match &bytes[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            other => {
                return Err(ContainerError::BadHeader(format!(
                    "unknown endian indicator {other:?}"
                )))
            }
        };
        let mut reader = ElementReader::new(&bytes[HEADER_LEN..], endian, HEADER_LEN as u64);
        let mut variables = Vec::new();
        while let Some(element) = reader.next_element()? {
            if let Some(var) = parse_top_level(element, endian)? {
                variables.push(var);
            }
        }
        Ok(Self {
            description,
            endian,
            variables,
        })
    }
    pub fn variable(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }
}

struct Element<'a> {
    data_type: u32,
    data: &'a [u8],
    offset: u64,
}

struct ElementReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
    base: u64,
}
impl<'a> ElementReader<'a> {
    fn new(buf: &'a [u8], endian: Endian, base: u64) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
            base,
        }
    }
    fn malformed(&self, detail: impl Into<String>) -> ContainerError {
        ContainerError::Malformed {
            offset: self.base + self.pos as u64,
            detail: detail.into(),
        }
    }
    fn next_element(&mut self) -> Result<Option<Element<'a>>, ContainerError> {
        let buf: &'a [u8] = self.buf;
        let remaining = buf.len() - self.pos;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < 8 {
            return Err(self.malformed("truncated element tag"));
        }
        let offset = self.base + self.pos as u64;
        let first = self.endian.read_u32(&buf[self.pos..]);
        if first >> 16 != 0 {
            // small data element: type and size packed into one word
            let data_type = first & 0xFFFF;
            let size = (first >> 16) as usize;
            if size > 4 {
                return Err(self.malformed(format!("small element claims {size} bytes")));
            }
            let data = &buf[self.pos + 4..self.pos + 4 + size];
            self.pos += 8;
            return Ok(Some(Element {
                data_type,
                data,
                offset,
            }));
        }
        let data_type = first;
        let size = self.endian.read_u32(&buf[self.pos + 4..]) as usize;
        let start = self.pos + 8;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| self.malformed(format!("element of {size} bytes overruns buffer")))?;
        let data = &buf[start..end];
        self.pos = if data_type == MI_COMPRESSED {
            end
        } else {
            (start + padded(size)).min(buf.len())
        };
        Ok(Some(Element {
            data_type,
            data,
            offset,
        }))
    }
    /// Bound a declared element count by what the remaining bytes could hold.
    fn capacity_hint(&self, declared: usize) -> usize {
        declared.min((self.buf.len() - self.pos) / 8)
    }
    fn expect_element(&mut self, what: &str) -> Result<Element<'a>, ContainerError> {
        self.next_element()?
            .ok_or_else(|| self.malformed(format!("missing {what}")))
    }
}

fn padded(size: usize) -> usize {
    (size + 7) & !7
}

fn parse_top_level(
    element: Element<'_>,
    endian: Endian,
) -> Result<Option<(String, MatValue)>, ContainerError> {
    match element.data_type {
        MI_MATRIX => parse_matrix(element.data, endian, element.offset).map(Some),
        MI_COMPRESSED => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(element.data)
                .read_to_end(&mut inflated)
                .map_err(|e| ContainerError::Malformed {
                    offset: element.offset,
                    detail: format!("zlib stream: {e}"),
                })?;
            let mut inner = ElementReader::new(&inflated, endian, element.offset);
            match inner.next_element()? {
                Some(el) if el.data_type == MI_MATRIX => {
                    parse_matrix(el.data, endian, el.offset).map(Some)
                }
                Some(el) => Err(ContainerError::UnsupportedDataType(el.data_type)),
                None => Ok(None),
            }
        }
        other => {
            log::debug!("skipping top-level element of type {other}");
            Ok(None)
        }
    }
}

fn parse_matrix(
    data: &[u8],
    endian: Endian,
    offset: u64,
) -> Result<(String, MatValue), ContainerError> {
    if data.is_empty() {
        return Ok((String::new(), MatValue::Numeric(Array2::zeros((0, 0)))));
    }
    let mut reader = ElementReader::new(data, endian, offset + 8);
    let flags = reader.expect_element("array flags")?;
    if flags.data.len() < 4 {
        return Err(reader.malformed("array flags too short"));
    }
    let flag_word = endian.read_u32(flags.data);
    let class = (flag_word & 0xFF) as u8;
    let dims_el = reader.expect_element("dimensions")?;
    let dims: Vec<usize> = dims_el
        .data
        .chunks_exact(4)
        .map(|c| endian.read_i32(c).max(0) as usize)
        .collect();
    if dims.is_empty() {
        return Err(reader.malformed("array has no dimensions"));
    }
    let name_el = reader.expect_element("array name")?;
    let name = String::from_utf8_lossy(name_el.data).into_owned();
    let rows = dims[0];
    let cols = dims[1..]
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| reader.malformed(format!("`{name}` dimensions {dims:?} overflow")))?;
    let count = rows
        .checked_mul(cols)
        .ok_or_else(|| reader.malformed(format!("`{name}` dimensions {dims:?} overflow")))?;

    let value = match class {
        MX_CELL => {
            let mut cells = Vec::with_capacity(reader.capacity_hint(count));
            for _ in 0..count {
                let el = reader.expect_element("cell element")?;
                cells.push(parse_matrix(el.data, endian, el.offset)?.1);
            }
            MatValue::Cell(cells)
        }
        MX_STRUCT => parse_struct(&mut reader, endian, count)?,
        MX_CHAR => {
            let el = reader.expect_element("char data")?;
            let units = decode_char_units(&el, endian)?;
            if units.len() < count {
                return Err(ContainerError::Malformed {
                    offset: el.offset,
                    detail: format!(
                        "`{name}` declares {rows}x{cols} chars but holds {}",
                        units.len()
                    ),
                });
            }
            if count == 0 {
                MatValue::Char(Vec::new())
            } else {
                MatValue::Char(char_rows(&units, rows, cols))
            }
        }
        MX_OBJECT => MatValue::Unsupported("object"),
        MX_SPARSE => MatValue::Unsupported("sparse"),
        6..=15 => {
            if flag_word & FLAG_COMPLEX != 0 {
                MatValue::Unsupported("complex")
            } else {
                let el = reader.expect_element("real part")?;
                let values = decode_numeric(el.data_type, el.data, endian).map_err(|e| {
                    match e {
                        ContainerError::Malformed { detail, .. } => ContainerError::Malformed {
                            offset: el.offset,
                            detail,
                        },
                        other => other,
                    }
                })?;
                if values.len() != count {
                    return Err(ContainerError::Malformed {
                        offset: el.offset,
                        detail: format!(
                            "`{name}` declares {rows}x{cols} but holds {} values",
                            values.len()
                        ),
                    });
                }
                let array = Array2::from_shape_vec((rows, cols).f(), values).map_err(|e| {
                    ContainerError::Malformed {
                        offset: el.offset,
                        detail: e.to_string(),
                    }
                })?;
                MatValue::Numeric(array)
            }
        }
        _ => MatValue::Unsupported("unknown class"),
    };
    Ok((name, value))
}

fn parse_struct(
    reader: &mut ElementReader<'_>,
    endian: Endian,
    count: usize,
) -> Result<MatValue, ContainerError> {
    let len_el = reader.expect_element("field name length")?;
    if len_el.data.len() < 4 {
        return Err(reader.malformed("field name length too short"));
    }
    let name_len = endian.read_i32(len_el.data).max(0) as usize;
    let names_el = reader.expect_element("field names")?;
    let field_names: Vec<String> = if name_len == 0 {
        Vec::new()
    } else {
        names_el
            .data
            .chunks(name_len)
            .map(|chunk| {
                let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                String::from_utf8_lossy(&chunk[..end]).into_owned()
            })
            .filter(|n| !n.is_empty())
            .collect()
    };
    if field_names.is_empty() {
        // fieldless elements occupy no bytes; none are kept
        return Ok(MatValue::Struct(MatStruct {
            field_names,
            elements: Vec::new(),
        }));
    }
    let mut elements = Vec::with_capacity(reader.capacity_hint(count));
    for _ in 0..count {
        let mut fields = Vec::with_capacity(field_names.len());
        for _ in 0..field_names.len() {
            let el = reader.expect_element("struct field")?;
            fields.push(parse_matrix(el.data, endian, el.offset)?.1);
        }
        elements.push(fields);
    }
    Ok(MatValue::Struct(MatStruct {
        field_names,
        elements,
    }))
}

fn decode_char_units(el: &Element<'_>, endian: Endian) -> Result<Vec<u32>, ContainerError> {
    Ok(match el.data_type {
        MI_UTF8 | MI_INT8 | MI_UINT8 => el.data.iter().map(|&b| b as u32).collect(),
        MI_UINT16 | MI_UTF16 | MI_INT16 => el
            .data
            .chunks_exact(2)
            .map(|c| match endian {
                Endian::Little => LittleEndian::read_u16(c) as u32,
                Endian::Big => BigEndian::read_u16(c) as u32,
            })
            .collect(),
        other => return Err(ContainerError::UnsupportedDataType(other)),
    })
}

fn char_rows(units: &[u32], rows: usize, cols: usize) -> Vec<String> {
    (0..rows)
        .map(|r| {
            (0..cols)
                .filter_map(|c| units.get(r + rows * c))
                .filter_map(|&u| char::from_u32(u))
                .collect()
        })
        .collect()
}

fn decode_numeric(data_type: u32, bytes: &[u8], endian: Endian) -> Result<Vec<f64>, ContainerError> {
    match endian {
        Endian::Little => decode_numeric_as::<LittleEndian>(data_type, bytes),
        Endian::Big => decode_numeric_as::<BigEndian>(data_type, bytes),
    }
}

fn decode_numeric_as<B: ByteOrder>(data_type: u32, bytes: &[u8]) -> Result<Vec<f64>, ContainerError> {
    let width = match data_type {
        MI_INT8 | MI_UINT8 => 1,
        MI_INT16 | MI_UINT16 => 2,
        MI_INT32 | MI_UINT32 | MI_SINGLE => 4,
        MI_DOUBLE | MI_INT64 | MI_UINT64 => 8,
        other => return Err(ContainerError::UnsupportedDataType(other)),
    };
    if bytes.len() % width != 0 {
        return Err(ContainerError::Malformed {
            offset: 0,
            detail: format!("{} bytes is not a multiple of {width}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(width)
        .map(|c| match data_type {
            MI_INT8 => c[0] as i8 as f64,
            MI_UINT8 => c[0] as f64,
            MI_INT16 => B::read_i16(c) as f64,
            MI_UINT16 => B::read_u16(c) as f64,
            MI_INT32 => B::read_i32(c) as f64,
            MI_UINT32 => B::read_u32(c) as f64,
            MI_SINGLE => B::read_f32(c) as f64,
            MI_DOUBLE => B::read_f64(c),
            MI_INT64 => B::read_i64(c) as f64,
            _ => B::read_u64(c) as f64,
        })
        .collect())
}
