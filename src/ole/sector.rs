//! Reading raw sectors from the byte source.

use super::chain::SectorChain;
use super::header::Header;
use crate::common::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom};
use zerocopy::{FromBytes, LE, U32};

/// Fill `buf` from the reader, returning how many bytes were available.
///
/// Unlike `read_exact` a short count is not an error; callers decide whether
/// running into the end of the file is acceptable.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one regular sector.
///
/// The last sector of a file is sometimes stored without its trailing
/// padding; the missing bytes read as zero. A sector that starts at or past
/// the end of the file is a format error.
pub(crate) fn read_sector<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    sector_count: u64,
    sector: u32,
) -> Result<Vec<u8>> {
    if u64::from(sector) >= sector_count {
        return Err(Error::Format(format!(
            "sector {sector} beyond end of file ({sector_count} sectors)"
        )));
    }

    reader.seek(SeekFrom::Start(header.sector_offset(sector)))?;
    let mut buffer = vec![0u8; header.sector_size() as usize];
    let filled = read_fully(reader, &mut buffer)?;
    if filled < buffer.len() {
        log::debug!(
            "sector {sector} truncated to {filled} bytes, padding with zeros"
        );
    }
    Ok(buffer)
}

/// Read the concatenated payload of every sector in `chain`
pub(crate) fn read_chain<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    sector_count: u64,
    chain: &SectorChain,
) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(chain.len() * header.sector_size() as usize);
    for &sector in chain.iter() {
        data.extend_from_slice(&read_sector(reader, header, sector_count, sector)?);
    }
    Ok(data)
}

/// Decode a buffer of little-endian 32-bit table entries
pub(crate) fn decode_entries(data: &[u8], entries: &mut Vec<u32>) {
    entries.reserve(data.len() / 4);
    entries.extend(
        data.chunks_exact(4)
            .map(|chunk| U32::<LE>::read_from_bytes(chunk).map_or(0, |v| v.get())),
    );
}
