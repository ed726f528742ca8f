//! Property set streams ([MS-OLEPS])
//!
//! Streams such as `\u{5}SummaryInformation` hold one or more sections of
//! typed properties. Each section is a table of `(id, offset)` pairs followed
//! by the values, every value starting with its 32-bit type tag.

use super::codepage::AsciiCodepage;
use super::consts::*;
use super::directory::Clsid;
use crate::common::{Error, Result};
use chrono::{DateTime, Utc};

/// FMTID of the `\u{5}SummaryInformation` section
pub const FMTID_SUMMARY_INFORMATION: Clsid = Clsid([
    0xE0, 0x85, 0x9F, 0xF2, 0xF9, 0x4F, 0x68, 0x10, 0xAB, 0x91, 0x08, 0x00, 0x2B, 0x27, 0xB3, 0xD9,
]);

/// FMTID of the first `\u{5}DocumentSummaryInformation` section
pub const FMTID_DOC_SUMMARY_INFORMATION: Clsid = Clsid([
    0x02, 0xD5, 0xCD, 0xD5, 0x9C, 0x2E, 0x1B, 0x10, 0x93, 0x97, 0x08, 0x00, 0x2B, 0x2C, 0xF9, 0xAE,
]);

const PROPERTY_SET_HEADER_SIZE: usize = 28;
const SECTION_LIST_ENTRY_SIZE: usize = 20;

/// Sections in one stream; anything beyond this is treated as corruption
const MAX_SECTIONS: u32 = 16;

/// A typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Empty,
    Null,
    I1(i8),
    UI1(u8),
    I2(i16),
    I4(i32),
    UI2(u16),
    UI4(u32),
    I8(i64),
    UI8(u64),
    R8(f64),
    /// Currency in units of 1/10000
    Currency(i64),
    /// OLE automation date: days since 1899-12-30
    Date(f64),
    Bool(bool),
    /// Narrow string, decoded with the section or file codepage
    Lpstr(String),
    /// UTF-16 string
    Lpwstr(String),
    /// Raw FILETIME ticks
    Filetime(u64),
    Blob(Vec<u8>),
    /// Clipboard data with its format tag
    ClipboardFormat { format: i32, data: Vec<u8> },
    Clsid(Clsid),
    /// `VT_VECTOR` of strings or variants
    Vector(Vec<PropertyValue>),
    /// A value whose type is not decoded, with the bytes up to the next property
    Unsupported { vt: u16, data: Vec<u8> },
}

impl PropertyValue {
    /// String content of LPSTR and LPWSTR values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Lpstr(s) | PropertyValue::Lpwstr(s) => Some(s),
            _ => None,
        }
    }

    /// FILETIME values as a date-time
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Filetime(ft) => super::directory::filetime_to_datetime(*ft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub id: u32,
    pub value: PropertyValue,
}

/// One section of a property set
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySection {
    /// Identifies the meaning of the property ids in this section
    pub format_id: Clsid,
    /// Codepage declared by the section, if any
    pub codepage: Option<u32>,
    /// Properties in stream order; the dictionary (id 0) is skipped
    pub properties: Vec<Property>,
}

impl PropertySection {
    pub fn get(&self, id: u32) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.id == id)
            .map(|p| &p.value)
    }
}

/// A parsed property set stream
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySet {
    pub format: u16,
    pub system_version: u32,
    pub clsid: Clsid,
    pub sections: Vec<PropertySection>,
}

impl PropertySet {
    /// Parse a property set stream
    ///
    /// `fallback` decodes narrow strings in sections that declare no
    /// codepage, or one this crate cannot decode.
    pub fn parse(data: &[u8], fallback: AsciiCodepage) -> Result<Self> {
        let bytes = Bytes(data);
        if data.len() < PROPERTY_SET_HEADER_SIZE {
            return Err(Error::format("property set stream is shorter than its header"));
        }
        let byte_order = bytes.u16_at(0)?;
        if byte_order != BYTE_ORDER_MARK {
            return Err(Error::Format(format!(
                "property set has byte order {byte_order:#06x}"
            )));
        }
        let format = bytes.u16_at(2)?;
        let system_version = bytes.u32_at(4)?;
        let clsid = bytes.clsid_at(8)?;
        let num_sections = bytes.u32_at(24)?;
        if num_sections > MAX_SECTIONS {
            return Err(Error::Format(format!(
                "property set declares {num_sections} sections"
            )));
        }

        let mut sections = Vec::with_capacity(num_sections as usize);
        for i in 0..num_sections as usize {
            let entry = PROPERTY_SET_HEADER_SIZE + i * SECTION_LIST_ENTRY_SIZE;
            let format_id = bytes.clsid_at(entry)?;
            let offset = bytes.u32_at(entry + 16)? as usize;
            sections.push(parse_section(bytes, format_id, offset, fallback)?);
        }

        log::debug!("parsed property set with {} sections", sections.len());

        Ok(PropertySet {
            format,
            system_version,
            clsid,
            sections,
        })
    }

    /// Section with the given FMTID
    pub fn section(&self, format_id: &Clsid) -> Option<&PropertySection> {
        self.sections.iter().find(|s| s.format_id == *format_id)
    }
}

fn parse_section(
    bytes: Bytes<'_>,
    format_id: Clsid,
    offset: usize,
    fallback: AsciiCodepage,
) -> Result<PropertySection> {
    let size = bytes.u32_at(offset)? as usize;
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= bytes.0.len())
        .ok_or_else(|| Error::Format(format!("section at {offset} overruns the stream")))?;
    let section = Bytes(&bytes.0[offset..end]);

    let count = section.u32_at(4)? as usize;
    let table_end = count
        .checked_mul(8)
        .and_then(|n| n.checked_add(8))
        .filter(|&n| n <= size)
        .ok_or_else(|| Error::Format(format!("section at {offset} declares {count} properties")))?;

    let mut slots = Vec::with_capacity(count);
    for pos in (8..table_end).step_by(8) {
        slots.push((section.u32_at(pos)?, section.u32_at(pos + 4)? as usize));
    }

    // Undecoded values run until the next value or the end of the section
    let mut starts: Vec<usize> = slots.iter().map(|&(_, at)| at).collect();
    starts.sort_unstable();
    starts.dedup();
    let limit_of = |at: usize| {
        starts
            .iter()
            .copied()
            .find(|&next| next > at)
            .unwrap_or(size)
    };

    // The codepage decides how every LPSTR in the section is read
    let mut codepage = None;
    if let Some(&(_, at)) = slots.iter().find(|(id, _)| *id == PID_CODEPAGE) {
        codepage = match parse_property(section, at, limit_of(at), Strings::Fallback(fallback))? {
            PropertyValue::I2(cp) => Some(u32::from(cp as u16)),
            PropertyValue::UI2(cp) => Some(u32::from(cp)),
            PropertyValue::I4(cp) => Some(cp as u32),
            PropertyValue::UI4(cp) => Some(cp),
            _ => None,
        };
    }
    let strings = Strings::for_section(codepage, fallback);

    let mut properties = Vec::with_capacity(slots.len());
    for (id, at) in slots {
        if id == 0 {
            log::trace!("skipping property dictionary in section {format_id}");
            continue;
        }
        properties.push(Property {
            id,
            value: parse_property(section, at, limit_of(at), strings)?,
        });
    }

    Ok(PropertySection {
        format_id,
        codepage,
        properties,
    })
}

/// How narrow strings are decoded in one section
#[derive(Debug, Clone, Copy)]
enum Strings {
    Utf16,
    Utf8,
    Fallback(AsciiCodepage),
}

impl Strings {
    fn for_section(codepage: Option<u32>, fallback: AsciiCodepage) -> Self {
        match codepage {
            Some(cp) if cp == u32::from(CP_UTF16LE) => Strings::Utf16,
            Some(cp) if cp == u32::from(CP_UTF8) => Strings::Utf8,
            Some(cp) => Strings::Fallback(AsciiCodepage::from_codepage(cp).unwrap_or(fallback)),
            None => Strings::Fallback(fallback),
        }
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Strings::Utf16 => decode_utf16(bytes),
            Strings::Utf8 => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            },
            Strings::Fallback(cp) => cp.decode(bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Values are stored padded to a multiple of four bytes
#[inline]
fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Decode the property value at `offset`; undecodable types keep their
/// bytes up to `limit`
fn parse_property(section: Bytes<'_>, offset: usize, limit: usize, strings: Strings) -> Result<PropertyValue> {
    if let Some((value, _)) = parse_typed(section, offset, strings)? {
        return Ok(value);
    }
    let vt = section.u16_at(offset)?;
    let data = section.slice(offset + 4, limit.saturating_sub(offset + 4))?.to_vec();
    log::debug!("property type {vt:#06x} at offset {offset} is not decoded");
    Ok(PropertyValue::Unsupported { vt, data })
}

/// Decode a type tag and its value, returning the value and the offset past it
///
/// `None` means the type is not decoded, so its length is unknown.
fn parse_typed(section: Bytes<'_>, offset: usize, strings: Strings) -> Result<Option<(PropertyValue, usize)>> {
    let vt = section.u16_at(offset)?;
    let at = offset + 4;
    if vt & VT_VECTOR != 0 {
        parse_vector(section, at, vt & !VT_VECTOR, strings)
    } else {
        parse_scalar(section, at, vt, strings)
    }
}

fn parse_scalar(
    section: Bytes<'_>,
    at: usize,
    vt: u16,
    strings: Strings,
) -> Result<Option<(PropertyValue, usize)>> {
    let fixed = |value: PropertyValue, len: usize| Ok(Some((value, at + padded(len))));
    match vt {
        VT_EMPTY => fixed(PropertyValue::Empty, 0),
        VT_NULL => fixed(PropertyValue::Null, 0),
        VT_I1 => fixed(PropertyValue::I1(section.array::<1>(at)?[0] as i8), 1),
        VT_UI1 => fixed(PropertyValue::UI1(section.array::<1>(at)?[0]), 1),
        VT_I2 => fixed(PropertyValue::I2(section.u16_at(at)? as i16), 2),
        VT_UI2 => fixed(PropertyValue::UI2(section.u16_at(at)?), 2),
        VT_BOOL => fixed(PropertyValue::Bool(section.u16_at(at)? != 0), 2),
        VT_I4 | VT_INT | VT_ERROR => fixed(PropertyValue::I4(section.u32_at(at)? as i32), 4),
        VT_UI4 | VT_UINT => fixed(PropertyValue::UI4(section.u32_at(at)?), 4),
        VT_R4 => fixed(PropertyValue::R8(f64::from(f32::from_bits(section.u32_at(at)?))), 4),
        VT_I8 => fixed(PropertyValue::I8(section.u64_at(at)? as i64), 8),
        VT_UI8 => fixed(PropertyValue::UI8(section.u64_at(at)?), 8),
        VT_R8 => fixed(PropertyValue::R8(f64::from_bits(section.u64_at(at)?)), 8),
        VT_CY => fixed(PropertyValue::Currency(section.u64_at(at)? as i64), 8),
        VT_DATE => fixed(PropertyValue::Date(f64::from_bits(section.u64_at(at)?)), 8),
        VT_FILETIME => fixed(PropertyValue::Filetime(section.u64_at(at)?), 8),
        VT_CLSID => fixed(PropertyValue::Clsid(section.clsid_at(at)?), 16),
        VT_LPSTR | VT_BSTR => {
            let len = section.u32_at(at)? as usize;
            let text = strings.decode(section.slice(at + 4, len)?);
            Ok(Some((PropertyValue::Lpstr(text), at + 4 + padded(len))))
        },
        VT_LPWSTR => {
            let chars = section.u32_at(at)? as usize;
            let len = chars
                .checked_mul(2)
                .ok_or_else(|| Error::format("LPWSTR length overflows"))?;
            let text = decode_utf16(section.slice(at + 4, len)?);
            Ok(Some((PropertyValue::Lpwstr(text), at + 4 + padded(len))))
        },
        VT_BLOB => {
            let len = section.u32_at(at)? as usize;
            let data = section.slice(at + 4, len)?.to_vec();
            Ok(Some((PropertyValue::Blob(data), at + 4 + padded(len))))
        },
        VT_CF => {
            // The size covers the format tag and the data
            let size = section.u32_at(at)? as usize;
            let len = size
                .checked_sub(4)
                .ok_or_else(|| Error::Format(format!("clipboard data at {at} has size {size}")))?;
            let format = section.u32_at(at + 4)? as i32;
            let data = section.slice(at + 8, len)?.to_vec();
            Ok(Some((PropertyValue::ClipboardFormat { format, data }, at + 8 + padded(len))))
        },
        _ => Ok(None),
    }
}

fn parse_vector(
    section: Bytes<'_>,
    at: usize,
    element: u16,
    strings: Strings,
) -> Result<Option<(PropertyValue, usize)>> {
    if !matches!(element, VT_LPSTR | VT_LPWSTR | VT_VARIANT) {
        return Ok(None);
    }

    let count = section.u32_at(at)? as usize;
    // Every element takes at least four bytes
    if count > section.0.len().saturating_sub(at + 4) / 4 {
        return Err(Error::Format(format!(
            "vector at {at} declares {count} elements"
        )));
    }

    let mut values = Vec::with_capacity(count);
    let mut pos = at + 4;
    for _ in 0..count {
        let decoded = match element {
            VT_VARIANT => parse_typed(section, pos, strings)?,
            _ => parse_scalar(section, pos, element, strings)?,
        };
        let Some((value, next)) = decoded else {
            return Err(Error::Format(format!(
                "vector element at {pos} has an undecodable type"
            )));
        };
        values.push(value);
        pos = next;
    }
    Ok(Some((PropertyValue::Vector(values), pos)))
}

/// Bounds-checked little-endian reads
#[derive(Clone, Copy)]
struct Bytes<'a>(&'a [u8]);

impl<'a> Bytes<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.0.get(offset..end))
            .ok_or_else(|| {
                Error::Format(format!(
                    "property data at {offset}+{len} is outside its section"
                ))
            })
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(offset, N)?);
        Ok(out)
    }

    fn u16_at(&self, offset: usize) -> Result<u16> {
        self.array(offset).map(u16::from_le_bytes)
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        self.array(offset).map(u32::from_le_bytes)
    }

    fn u64_at(&self, offset: usize) -> Result<u64> {
        self.array(offset).map(u64::from_le_bytes)
    }

    fn clsid_at(&self, offset: usize) -> Result<Clsid> {
        self.array(offset).map(Clsid)
    }
}
