//! Exemplar and Cohort records: property bags keyed by a 32-bit ID, iterated
//! in ascending order so re-encoding a freshly-parsed binary exemplar is
//! byte-identical to the original.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::stream::{read_i32_le, read_i64_le, read_u16_le, read_u32_le, read_u8, read_f32_le, take};
use crate::tgi::Tgi;

const SIG_EXEMPLAR_BINARY: &[u8; 8] = b"EQZB1###";
const SIG_COHORT_BINARY: &[u8; 8] = b"CQZB1###";
const SIG_EXEMPLAR_TEXT: &[u8; 8] = b"EQZT1###";
const SIG_COHORT_TEXT: &[u8; 8] = b"CQZT1###";

const KEY_TYPE_SINGLE: u16 = 0x0000;
const KEY_TYPE_ARRAY: u16 = 0x0080;

/// One value slot in an exemplar's property bag, tagged by the closed set of
/// data types the format defines.
#[derive(Debug, Clone, PartialEq)]
pub enum ExemplarProperty {
    Boolean(Vec<bool>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    SInt32(Vec<i32>),
    SInt64(Vec<i64>),
    Float32(Vec<f32>),
    String(String),
}

impl ExemplarProperty {
    fn data_type_code(&self) -> u16 {
        match self {
            ExemplarProperty::Boolean(_) => 0x0B00,
            ExemplarProperty::UInt8(_) => 0x0100,
            ExemplarProperty::UInt16(_) => 0x0200,
            ExemplarProperty::UInt32(_) => 0x0300,
            ExemplarProperty::SInt32(_) => 0x0700,
            ExemplarProperty::SInt64(_) => 0x0800,
            ExemplarProperty::Float32(_) => 0x0900,
            ExemplarProperty::String(_) => 0x0C00,
        }
    }

    /// Logical item count: number of values for numeric/boolean properties,
    /// byte length for `String` (whose on-wire "rep count" is a length, not
    /// an element count).
    fn arity(&self) -> usize {
        match self {
            ExemplarProperty::Boolean(v) => v.len(),
            ExemplarProperty::UInt8(v) => v.len(),
            ExemplarProperty::UInt16(v) => v.len(),
            ExemplarProperty::UInt32(v) => v.len(),
            ExemplarProperty::SInt32(v) => v.len(),
            ExemplarProperty::SInt64(v) => v.len(),
            ExemplarProperty::Float32(v) => v.len(),
            ExemplarProperty::String(s) => s.len(),
        }
    }

    /// A property is array-shaped on the wire iff its arity is > 1 or it's a string.
    fn is_array(&self) -> bool {
        matches!(self, ExemplarProperty::String(_)) || self.arity() != 1
    }
}

/// An Exemplar (or, when `is_cohort` is set, a Cohort — same shape, different
/// signature) property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
    pub is_cohort: bool,
    pub parent_cohort: Tgi,
    pub properties: BTreeMap<u32, ExemplarProperty>,
}

impl Exemplar {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 8 {
            return Err(Error::TruncatedInput { expected: 8, found: bytes.len() });
        }
        let sig: &[u8; 8] = bytes[0..8].try_into().unwrap();

        if sig == SIG_EXEMPLAR_BINARY {
            decode_binary(false, &bytes[8..])
        } else if sig == SIG_COHORT_BINARY {
            decode_binary(true, &bytes[8..])
        } else if sig == SIG_EXEMPLAR_TEXT || sig == SIG_COHORT_TEXT {
            if bytes.len() < 9 || bytes[8] != b'\n' {
                return Err(Error::MalformedRecord(
                    "exemplar text record missing newline after 8-byte signature".into(),
                ));
            }
            decode_text(sig == SIG_COHORT_TEXT, &bytes[9..])
        } else {
            Err(Error::MalformedRecord(format!("unrecognized exemplar signature {sig:?}")))
        }
    }

    /// Serialize to the binary form. The property collection is emitted in
    /// ascending order by ID (guaranteed by `BTreeMap`'s iteration order).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(if self.is_cohort { SIG_COHORT_BINARY } else { SIG_EXEMPLAR_BINARY });
        out.extend_from_slice(&self.parent_cohort.type_id.to_le_bytes());
        out.extend_from_slice(&self.parent_cohort.group_id.to_le_bytes());
        out.extend_from_slice(&self.parent_cohort.instance_id.to_le_bytes());
        out.extend_from_slice(&(self.properties.len() as i32).to_le_bytes());

        for (id, prop) in &self.properties {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&prop.data_type_code().to_le_bytes());
            let is_array = prop.is_array();
            out.extend_from_slice(&(if is_array { KEY_TYPE_ARRAY } else { KEY_TYPE_SINGLE }).to_le_bytes());
            out.push(0); // unused

            if is_array {
                out.extend_from_slice(&(prop.arity() as i32).to_le_bytes());
            }

            match prop {
                ExemplarProperty::Boolean(v) => v.iter().for_each(|b| out.push(if *b { 1 } else { 0 })),
                ExemplarProperty::UInt8(v) => out.extend_from_slice(v),
                ExemplarProperty::UInt16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                ExemplarProperty::UInt32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                ExemplarProperty::SInt32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                ExemplarProperty::SInt64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                ExemplarProperty::Float32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
                ExemplarProperty::String(s) => out.extend_from_slice(s.as_bytes()),
            }
        }

        out
    }
}

fn decode_binary(is_cohort: bool, rest: &[u8]) -> Result<Exemplar, Error> {
    let mut pos = 0usize;
    let type_id = read_u32_le(rest, &mut pos)?;
    let group_id = read_u32_le(rest, &mut pos)?;
    let instance_id = read_u32_le(rest, &mut pos)?;
    let parent_cohort = Tgi::new(type_id, group_id, instance_id);

    let property_count = read_i32_le(rest, &mut pos)?;
    if property_count < 0 {
        return Err(Error::MalformedRecord("negative exemplar property count".into()));
    }

    let mut properties = BTreeMap::new();
    for _ in 0..property_count {
        let id = read_u32_le(rest, &mut pos)?;
        let data_type = read_u16_le(rest, &mut pos)?;
        let key_type = read_u16_le(rest, &mut pos)?;
        let _unused = read_u8(rest, &mut pos)?;
        let is_array = key_type == KEY_TYPE_ARRAY;

        let prop = match data_type {
            0x0C00 => {
                let len = if is_array { read_i32_le(rest, &mut pos)? as usize } else { 1 };
                let bytes = take(rest, &mut pos, len)?;
                ExemplarProperty::String(String::from_utf8_lossy(bytes).into_owned())
            }
            0x0B00 => ExemplarProperty::Boolean(read_values(rest, &mut pos, is_array, read_bool)?),
            0x0100 => ExemplarProperty::UInt8(read_values(rest, &mut pos, is_array, read_u8)?),
            0x0200 => ExemplarProperty::UInt16(read_values(rest, &mut pos, is_array, read_u16_le)?),
            0x0300 => ExemplarProperty::UInt32(read_values(rest, &mut pos, is_array, read_u32_le)?),
            0x0700 => ExemplarProperty::SInt32(read_values(rest, &mut pos, is_array, read_i32_le)?),
            0x0800 => ExemplarProperty::SInt64(read_values(rest, &mut pos, is_array, read_i64_le)?),
            0x0900 => ExemplarProperty::Float32(read_values(rest, &mut pos, is_array, read_f32_le)?),
            other => return Err(Error::MalformedRecord(format!("unknown exemplar property type tag {other:#06x}"))),
        };
        properties.insert(id, prop);
    }

    Ok(Exemplar { is_cohort, parent_cohort, properties })
}

fn read_bool(data: &[u8], pos: &mut usize) -> Result<bool, Error> {
    Ok(read_u8(data, pos)? != 0)
}

fn read_values<T>(
    data: &[u8],
    pos: &mut usize,
    is_array: bool,
    read_one: fn(&[u8], &mut usize) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    let count = if is_array { read_i32_le(data, pos)? as usize } else { 1 };
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_one(data, pos)?);
    }
    Ok(values)
}

fn decode_text(is_cohort: bool, rest: &[u8]) -> Result<Exemplar, Error> {
    let text = std::str::from_utf8(rest)
        .map_err(|_| Error::MalformedRecord("exemplar text is not valid UTF-8".into()))?;
    let mut lines = text.lines();

    let parent_line = lines
        .next()
        .ok_or_else(|| Error::MalformedRecord("exemplar text missing ParentCohort line".into()))?;
    let parent_cohort = parse_parent_cohort(parent_line)?;

    let count_line = lines
        .next()
        .ok_or_else(|| Error::MalformedRecord("exemplar text missing PropCount line".into()))?;
    let declared_count = parse_prop_count(count_line)?;

    let mut properties = BTreeMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (id, prop) = parse_property_line(line)?;
        properties.insert(id, prop);
    }

    if properties.len() != declared_count {
        return Err(Error::MalformedRecord(format!(
            "exemplar text PropCount {declared_count} does not match {} parsed properties",
            properties.len()
        )));
    }

    Ok(Exemplar { is_cohort, parent_cohort, properties })
}

fn parse_parent_cohort(line: &str) -> Result<Tgi, Error> {
    let bad = || Error::MalformedRecord(format!("malformed ParentCohort line: {line:?}"));
    let rest = line.strip_prefix("ParentCohort=Key:{").ok_or_else(bad)?;
    let rest = rest.strip_suffix('}').ok_or_else(bad)?;
    let mut parts = rest.split(',');
    let group = parse_hex_u32(parts.next().ok_or_else(bad)?)?;
    let instance = parse_hex_u32(parts.next().ok_or_else(bad)?)?;
    let type_id = parse_hex_u32(parts.next().ok_or_else(bad)?)?;
    Ok(Tgi::new(type_id, group, instance))
}

fn parse_prop_count(line: &str) -> Result<usize, Error> {
    let rest = line
        .strip_prefix("PropCount=")
        .ok_or_else(|| Error::MalformedRecord(format!("malformed PropCount line: {line:?}")))?;
    Ok(parse_hex_u32(rest)? as usize)
}

fn parse_property_line(line: &str) -> Result<(u32, ExemplarProperty), Error> {
    let bad = || Error::MalformedRecord(format!("malformed exemplar property line: {line:?}"));
    let (id_str, rest) = line.split_once(':').ok_or_else(bad)?;
    let id = parse_hex_u32(id_str)?;

    let rest = rest.strip_prefix('{').ok_or_else(bad)?;
    let (_name, rest) = rest.split_once('}').ok_or_else(bad)?;
    let rest = rest.strip_prefix('=').ok_or_else(bad)?;

    let (type_name, rest) = rest.split_once(':').ok_or_else(bad)?;
    let (rep_str, rest) = rest.split_once(':').ok_or_else(bad)?;
    let rep_count = parse_hex_u32(rep_str)?;
    let rep_count = if rep_count == 0 { 1 } else { rep_count as usize };

    let rest = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')).ok_or_else(bad)?;

    let prop = match type_name {
        "String" => {
            let s = rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')).ok_or_else(bad)?;
            ExemplarProperty::String(s.to_string())
        }
        "Bool" => ExemplarProperty::Boolean(
            split_values(rest, rep_count)?.into_iter().map(|v| parse_hex_u32(v).map(|n| n != 0)).collect::<Result<_, _>>()?,
        ),
        "Uint8" => ExemplarProperty::UInt8(
            split_values(rest, rep_count)?.into_iter().map(|v| parse_hex_u32(v).map(|n| n as u8)).collect::<Result<_, _>>()?,
        ),
        "Uint16" => ExemplarProperty::UInt16(
            split_values(rest, rep_count)?.into_iter().map(|v| parse_hex_u32(v).map(|n| n as u16)).collect::<Result<_, _>>()?,
        ),
        "Uint32" => ExemplarProperty::UInt32(
            split_values(rest, rep_count)?.into_iter().map(parse_hex_u32).collect::<Result<_, _>>()?,
        ),
        "Sint32" => ExemplarProperty::SInt32(
            split_values(rest, rep_count)?.into_iter().map(|v| parse_hex_u32(v).map(|n| n as i32)).collect::<Result<_, _>>()?,
        ),
        "Sint64" => ExemplarProperty::SInt64(
            split_values(rest, rep_count)?.into_iter().map(parse_hex_i64).collect::<Result<_, _>>()?,
        ),
        "Float32" => ExemplarProperty::Float32(
            split_values(rest, rep_count)?
                .into_iter()
                .map(|v| v.trim().parse::<f32>().map_err(|_| Error::MalformedRecord(format!("bad float literal: {v:?}"))))
                .collect::<Result<_, _>>()?,
        ),
        other => return Err(Error::MalformedRecord(format!("unknown exemplar text type name: {other:?}"))),
    };

    Ok((id, prop))
}

fn split_values(rest: &str, expected: usize) -> Result<Vec<&str>, Error> {
    let values: Vec<&str> = rest.split(',').map(str::trim).collect();
    if values.len() != expected {
        return Err(Error::MalformedRecord(format!(
            "expected {expected} values, found {} in {rest:?}",
            values.len()
        )));
    }
    Ok(values)
}

fn parse_hex_u32(s: &str) -> Result<u32, Error> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(s, 16).map_err(|_| Error::MalformedRecord(format!("bad hex literal: {s:?}")))
}

fn parse_hex_i64(s: &str) -> Result<i64, Error> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16)
        .map(|v| v as i64)
        .map_err(|_| Error::MalformedRecord(format!("bad hex literal: {s:?}")))
}
