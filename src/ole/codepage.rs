//! Codepage used for 8-bit strings
//!
//! Names inside the directory are always UTF-16, but property sets and
//! application streams carry narrow strings whose encoding is not recorded
//! anywhere in the file. The caller picks one of a closed set of Windows
//! codepages; plain ASCII is the default.

use crate::common::{Error, Result};
use encoding_rs::Encoding;
use std::fmt;
use std::str::FromStr;

/// Supported narrow-string codepages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AsciiCodepage {
    /// 7-bit ASCII; bytes above 0x7F decode to U+FFFD
    #[default]
    Ascii,
    Windows874,
    Windows932,
    Windows936,
    Windows949,
    Windows950,
    Windows1250,
    Windows1251,
    Windows1252,
    Windows1253,
    Windows1254,
    Windows1255,
    Windows1256,
    Windows1257,
    Windows1258,
}

impl AsciiCodepage {
    /// Every supported codepage
    pub const ALL: [AsciiCodepage; 15] = [
        AsciiCodepage::Ascii,
        AsciiCodepage::Windows874,
        AsciiCodepage::Windows932,
        AsciiCodepage::Windows936,
        AsciiCodepage::Windows949,
        AsciiCodepage::Windows950,
        AsciiCodepage::Windows1250,
        AsciiCodepage::Windows1251,
        AsciiCodepage::Windows1252,
        AsciiCodepage::Windows1253,
        AsciiCodepage::Windows1254,
        AsciiCodepage::Windows1255,
        AsciiCodepage::Windows1256,
        AsciiCodepage::Windows1257,
        AsciiCodepage::Windows1258,
    ];

    /// Windows codepage identifier (20127 for ASCII)
    pub fn codepage(self) -> u32 {
        match self {
            AsciiCodepage::Ascii => 20127,
            AsciiCodepage::Windows874 => 874,
            AsciiCodepage::Windows932 => 932,
            AsciiCodepage::Windows936 => 936,
            AsciiCodepage::Windows949 => 949,
            AsciiCodepage::Windows950 => 950,
            AsciiCodepage::Windows1250 => 1250,
            AsciiCodepage::Windows1251 => 1251,
            AsciiCodepage::Windows1252 => 1252,
            AsciiCodepage::Windows1253 => 1253,
            AsciiCodepage::Windows1254 => 1254,
            AsciiCodepage::Windows1255 => 1255,
            AsciiCodepage::Windows1256 => 1256,
            AsciiCodepage::Windows1257 => 1257,
            AsciiCodepage::Windows1258 => 1258,
        }
    }

    /// Look up a codepage by its Windows identifier
    pub fn from_codepage(codepage: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|cp| cp.codepage() == codepage)
    }

    /// Canonical lowercase name, e.g. `cp1252`
    pub fn name(self) -> &'static str {
        match self {
            AsciiCodepage::Ascii => "ascii",
            AsciiCodepage::Windows874 => "cp874",
            AsciiCodepage::Windows932 => "cp932",
            AsciiCodepage::Windows936 => "cp936",
            AsciiCodepage::Windows949 => "cp949",
            AsciiCodepage::Windows950 => "cp950",
            AsciiCodepage::Windows1250 => "cp1250",
            AsciiCodepage::Windows1251 => "cp1251",
            AsciiCodepage::Windows1252 => "cp1252",
            AsciiCodepage::Windows1253 => "cp1253",
            AsciiCodepage::Windows1254 => "cp1254",
            AsciiCodepage::Windows1255 => "cp1255",
            AsciiCodepage::Windows1256 => "cp1256",
            AsciiCodepage::Windows1257 => "cp1257",
            AsciiCodepage::Windows1258 => "cp1258",
        }
    }

    /// Parse a codepage name
    ///
    /// Accepts `ascii`, `cpNNN` and `windows-NNN` in any letter case.
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        if lower == "ascii" || lower == "us-ascii" {
            return Ok(AsciiCodepage::Ascii);
        }

        lower
            .strip_prefix("cp")
            .or_else(|| lower.strip_prefix("windows-"))
            .and_then(|digits| digits.parse::<u32>().ok())
            .and_then(Self::from_codepage)
            .filter(|cp| *cp != AsciiCodepage::Ascii)
            .ok_or_else(|| Error::UnsupportedCodepage(name.to_string()))
    }

    /// encoding_rs decoder for this codepage, `None` for ASCII
    pub fn encoding(self) -> Option<&'static Encoding> {
        match self {
            AsciiCodepage::Ascii => None,
            AsciiCodepage::Windows874 => Some(encoding_rs::WINDOWS_874),
            AsciiCodepage::Windows932 => Some(encoding_rs::SHIFT_JIS),
            AsciiCodepage::Windows936 => Some(encoding_rs::GBK),
            AsciiCodepage::Windows949 => Some(encoding_rs::EUC_KR),
            AsciiCodepage::Windows950 => Some(encoding_rs::BIG5),
            AsciiCodepage::Windows1250 => Some(encoding_rs::WINDOWS_1250),
            AsciiCodepage::Windows1251 => Some(encoding_rs::WINDOWS_1251),
            AsciiCodepage::Windows1252 => Some(encoding_rs::WINDOWS_1252),
            AsciiCodepage::Windows1253 => Some(encoding_rs::WINDOWS_1253),
            AsciiCodepage::Windows1254 => Some(encoding_rs::WINDOWS_1254),
            AsciiCodepage::Windows1255 => Some(encoding_rs::WINDOWS_1255),
            AsciiCodepage::Windows1256 => Some(encoding_rs::WINDOWS_1256),
            AsciiCodepage::Windows1257 => Some(encoding_rs::WINDOWS_1257),
            AsciiCodepage::Windows1258 => Some(encoding_rs::WINDOWS_1258),
        }
    }

    /// Decode a narrow string, stopping at the first NUL
    pub fn decode(self, bytes: &[u8]) -> String {
        let bytes = strip_null_terminator(bytes);
        match self.encoding() {
            Some(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
            None => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        }
    }
}

#[inline]
fn strip_null_terminator(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

impl FromStr for AsciiCodepage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for AsciiCodepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
