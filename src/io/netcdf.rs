//! Minimal NetCDF classic (CDF-1) encoder/decoder.
//!
//! Supports what the posterior trace needs: fixed-size dimensions (no record
//! dimension), global and per-variable attributes, and `char`/`int`/`double`
//! data. Everything is big-endian and padded to 4-byte boundaries.
//!
//! ```text
//! header  = "CDF" 0x01  numrecs  dim_list  gatt_list  var_list
//! var     = name  ndims  [dimid..]  vatt_list  nc_type  vsize  begin
//! ```

use crate::error::AppError;

const MAGIC: &[u8; 4] = b"CDF\x01";

const NC_DIMENSION: i32 = 0x0A;
const NC_VARIABLE: i32 = 0x0B;
const NC_ATTRIBUTE: i32 = 0x0C;

const NC_CHAR: i32 = 2;
const NC_INT: i32 = 4;
const NC_DOUBLE: i32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Ints(Vec<i32>),
    Doubles(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    Int(Vec<i32>),
    Double(Vec<f64>),
}

impl VarData {
    fn len(&self) -> usize {
        match self {
            VarData::Int(v) => v.len(),
            VarData::Double(v) => v.len(),
        }
    }

    fn nc_type(&self) -> i32 {
        match self {
            VarData::Int(_) => NC_INT,
            VarData::Double(_) => NC_DOUBLE,
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            VarData::Int(v) => v.len() * 4,
            VarData::Double(v) => v.len() * 8,
        }
    }

    /// Values widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            VarData::Int(v) => v.iter().map(|&x| x as f64).collect(),
            VarData::Double(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NcVariable {
    pub name: String,
    /// Dimension ids, slowest-varying first.
    pub dims: Vec<usize>,
    pub attrs: Vec<(String, AttrValue)>,
    pub data: VarData,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NcFile {
    pub dims: Vec<(String, usize)>,
    pub attrs: Vec<(String, AttrValue)>,
    pub vars: Vec<NcVariable>,
}

impl NcFile {
    pub fn dim_id(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|(n, _)| n == name)
    }

    pub fn var(&self, name: &str) -> Option<&NcVariable> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Serialize to CDF-1 bytes.
pub fn encode(file: &NcFile) -> Result<Vec<u8>, AppError> {
    for var in &file.vars {
        let expected = var_len(file, var)?;
        if var.data.len() != expected {
            return Err(AppError::model(format!(
                "NetCDF variable `{}` has {} values, expected {expected}.",
                var.name,
                var.data.len()
            )));
        }
    }

    // Header length does not depend on the begin offsets, so lay it out once
    // with zeros to learn where the data section starts.
    let placeholder = vec![0i32; file.vars.len()];
    let header_len = encode_header(file, &placeholder).len();

    let mut begins = Vec::with_capacity(file.vars.len());
    let mut offset = header_len;
    for var in &file.vars {
        begins.push(i32::try_from(offset).map_err(|_| AppError::io("Trace too large for NetCDF classic format."))?);
        offset += padded(var.data.byte_len());
    }

    let mut out = encode_header(file, &begins);
    out.reserve(offset - header_len);
    for var in &file.vars {
        match &var.data {
            VarData::Int(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            VarData::Double(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
        }
        pad_to_4(&mut out);
    }
    Ok(out)
}

/// Parse CDF-1 bytes.
pub fn decode(bytes: &[u8]) -> Result<NcFile, AppError> {
    let mut r = Reader { buf: bytes, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(AppError::data_format("Not a NetCDF classic (CDF-1) file."));
    }
    let _numrecs = r.i32()?;

    let mut file = NcFile::default();

    for _ in 0..r.list_len(NC_DIMENSION)? {
        let name = r.name()?;
        let len = r.count()?;
        file.dims.push((name, len));
    }

    file.attrs = r.attr_list()?;

    let mut locations = Vec::new();
    for _ in 0..r.list_len(NC_VARIABLE)? {
        let name = r.name()?;
        let ndims = r.count()?;
        let mut dims = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            let id = r.count()?;
            if id >= file.dims.len() {
                return Err(AppError::data_format(format!("Variable `{name}` references unknown dimension {id}.")));
            }
            dims.push(id);
        }
        let attrs = r.attr_list()?;
        let nc_type = r.i32()?;
        let _vsize = r.i32()?;
        let begin = r.count()?;
        locations.push((nc_type, begin));
        file.vars.push(NcVariable {
            name,
            dims,
            attrs,
            data: VarData::Int(Vec::new()),
        });
    }

    for (i, (nc_type, begin)) in locations.into_iter().enumerate() {
        let len = var_len(&file, &file.vars[i])?;
        let mut data = Reader { buf: bytes, pos: begin };
        file.vars[i].data = match nc_type {
            NC_INT => VarData::Int((0..len).map(|_| data.i32()).collect::<Result<_, _>>()?),
            NC_DOUBLE => VarData::Double((0..len).map(|_| data.f64()).collect::<Result<_, _>>()?),
            other => {
                return Err(AppError::data_format(format!(
                    "Variable `{}` has unsupported NetCDF type {other}.",
                    file.vars[i].name
                )));
            }
        };
    }

    Ok(file)
}

fn var_len(file: &NcFile, var: &NcVariable) -> Result<usize, AppError> {
    var.dims.iter().try_fold(1usize, |acc, &id| {
        let (_, len) = file
            .dims
            .get(id)
            .ok_or_else(|| AppError::data_format(format!("Variable `{}` references unknown dimension {id}.", var.name)))?;
        acc.checked_mul(*len)
            .ok_or_else(|| AppError::data_format(format!("Variable `{}` is too large to address.", var.name)))
    })
}

fn encode_header(file: &NcFile, begins: &[i32]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    put_i32(&mut out, 0);

    put_list_tag(&mut out, NC_DIMENSION, file.dims.len());
    for (name, len) in &file.dims {
        put_name(&mut out, name);
        put_i32(&mut out, *len as i32);
    }

    put_attr_list(&mut out, &file.attrs);

    put_list_tag(&mut out, NC_VARIABLE, file.vars.len());
    for (var, &begin) in file.vars.iter().zip(begins) {
        put_name(&mut out, &var.name);
        put_i32(&mut out, var.dims.len() as i32);
        for &id in &var.dims {
            put_i32(&mut out, id as i32);
        }
        put_attr_list(&mut out, &var.attrs);
        put_i32(&mut out, var.data.nc_type());
        put_i32(&mut out, padded(var.data.byte_len()) as i32);
        put_i32(&mut out, begin);
    }
    out
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// `ABSENT` is two zero words.
fn put_list_tag(out: &mut Vec<u8>, tag: i32, len: usize) {
    if len == 0 {
        put_i32(out, 0);
        put_i32(out, 0);
    } else {
        put_i32(out, tag);
        put_i32(out, len as i32);
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    put_i32(out, name.len() as i32);
    out.extend_from_slice(name.as_bytes());
    pad_to_4(out);
}

fn put_attr_list(out: &mut Vec<u8>, attrs: &[(String, AttrValue)]) {
    put_list_tag(out, NC_ATTRIBUTE, attrs.len());
    for (name, value) in attrs {
        put_name(out, name);
        match value {
            AttrValue::Text(s) => {
                put_i32(out, NC_CHAR);
                put_i32(out, s.len() as i32);
                out.extend_from_slice(s.as_bytes());
            }
            AttrValue::Ints(v) => {
                put_i32(out, NC_INT);
                put_i32(out, v.len() as i32);
                v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            }
            AttrValue::Doubles(v) => {
                put_i32(out, NC_DOUBLE);
                put_i32(out, v.len() as i32);
                v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            }
        }
        pad_to_4(out);
    }
}

fn pad_to_4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn padded(n: usize) -> usize {
    n.div_ceil(4) * 4
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], AppError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| AppError::data_format(format!("NetCDF file truncated at byte {}.", self.pos)))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip_padding(&mut self, n: usize) -> Result<(), AppError> {
        self.take(padded(n) - n).map(|_| ())
    }

    fn i32(&mut self) -> Result<i32, AppError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64, AppError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_be_bytes(raw))
    }

    /// Non-negative count or offset.
    fn count(&mut self) -> Result<usize, AppError> {
        let v = self.i32()?;
        usize::try_from(v).map_err(|_| AppError::data_format(format!("Negative NetCDF count {v}.")))
    }

    fn name(&mut self) -> Result<String, AppError> {
        let len = self.count()?;
        let raw = self.take(len)?;
        let name = String::from_utf8(raw.to_vec())
            .map_err(|_| AppError::data_format("NetCDF name is not valid UTF-8."))?;
        self.skip_padding(len)?;
        Ok(name)
    }

    fn list_len(&mut self, tag: i32) -> Result<usize, AppError> {
        let found = self.i32()?;
        let len = self.count()?;
        match found {
            0 if len == 0 => Ok(0),
            t if t == tag => Ok(len),
            other => Err(AppError::data_format(format!(
                "Unexpected NetCDF header tag {other:#x} (expected {tag:#x})."
            ))),
        }
    }

    fn attr_list(&mut self) -> Result<Vec<(String, AttrValue)>, AppError> {
        let len = self.list_len(NC_ATTRIBUTE)?;
        let mut attrs = Vec::with_capacity(len);
        for _ in 0..len {
            let name = self.name()?;
            let nc_type = self.i32()?;
            let n = self.count()?;
            let value = match nc_type {
                NC_CHAR => {
                    let raw = self.take(n)?;
                    self.skip_padding(n)?;
                    AttrValue::Text(String::from_utf8_lossy(raw).into_owned())
                }
                NC_INT => AttrValue::Ints((0..n).map(|_| self.i32()).collect::<Result<_, _>>()?),
                NC_DOUBLE => AttrValue::Doubles((0..n).map(|_| self.f64()).collect::<Result<_, _>>()?),
                other => {
                    return Err(AppError::data_format(format!(
                        "Attribute `{name}` has unsupported NetCDF type {other}."
                    )));
                }
            };
            attrs.push((name, value));
        }
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NcFile {
        NcFile {
            dims: vec![("chain".into(), 2), ("draw".into(), 3)],
            attrs: vec![
                ("created_by".into(), AttrValue::Text("cpd".into())),
                ("seed".into(), AttrValue::Ints(vec![42])),
            ],
            vars: vec![
                NcVariable {
                    name: "tau".into(),
                    dims: vec![0, 1],
                    attrs: Vec::new(),
                    data: VarData::Int(vec![1, 2, 3, 4, 5, 6]),
                },
                NcVariable {
                    name: "mu_1".into(),
                    dims: vec![0, 1],
                    attrs: vec![("units".into(), AttrValue::Text("log-return".into()))],
                    data: VarData::Double(vec![0.1, -0.2, 0.3, 1e-9, f64::MAX, -0.0]),
                },
            ],
        }
    }

    #[test]
    fn header_starts_with_magic_and_is_aligned() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(&bytes[..4], b"CDF\x01");
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn decode_restores_structure_and_values() {
        let file = sample();
        let decoded = decode(&encode(&file).unwrap()).unwrap();
        assert_eq!(decoded, file);
        assert_eq!(decoded.dim_id("draw"), Some(1));
        assert_eq!(decoded.attr("seed"), Some(&AttrValue::Ints(vec![42])));
    }

    #[test]
    fn empty_lists_are_absent() {
        let file = NcFile::default();
        let bytes = encode(&file).unwrap();
        // magic + numrecs + 3 × ABSENT
        assert_eq!(bytes.len(), 4 + 4 + 3 * 8);
        assert_eq!(decode(&bytes).unwrap(), file);
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let file = NcFile {
            dims: vec![("a".into(), 1), ("b".into(), 1), ("c".into(), 1)],
            attrs: Vec::new(),
            vars: vec![NcVariable {
                name: "x".into(),
                dims: vec![0, 1, 2],
                attrs: Vec::new(),
                data: VarData::Int(vec![7]),
            }],
        };
        let mut bytes = encode(&file).unwrap();
        // magic, numrecs, tag, count; then per dim: name length, padded name, length.
        for offset in [24, 36, 48] {
            bytes[offset..offset + 4].copy_from_slice(&i32::MAX.to_be_bytes());
        }

        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DataFormat);
    }

    #[test]
    fn rejects_wrong_shape_and_garbage() {
        let mut file = sample();
        file.vars[0].data = VarData::Int(vec![1, 2]);
        assert!(encode(&file).is_err());

        assert!(decode(b"HDF\x01\0\0\0\0").is_err());
        let bytes = encode(&sample()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 4]).is_err());
    }
}
