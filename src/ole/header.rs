//! Compound file header decoding.
//!
//! The header occupies the first 512 bytes of the file. For 4096-byte sector
//! files the rest of sector "-1" is zero padding, which is why sector `n`
//! always starts at `(n + 1) * sector_size`.

use super::consts::*;
use crate::common::{Error, Result};
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Raw OLE header structure (512 bytes)
///
/// This represents the on-disk layout of the header, field for field.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
#[allow(dead_code)] // signature and reserved bytes are layout only
struct RawHeader {
    /// Magic signature
    signature: [u8; 8],
    /// Reserved class ID (should be all zero)
    clsid: [u8; 16],
    /// Minor format version
    minor_version: U16<LE>,
    /// Major format version (3 or 4)
    major_version: U16<LE>,
    /// Byte order mark (0xFFFE)
    byte_order: U16<LE>,
    /// log2 of the sector size
    sector_shift: U16<LE>,
    /// log2 of the short sector size
    short_sector_shift: U16<LE>,
    /// Reserved
    reserved: [u8; 6],
    /// Number of directory sectors (version 4 only)
    num_dir_sectors: U32<LE>,
    /// Number of FAT sectors
    num_fat_sectors: U32<LE>,
    /// First directory sector
    first_dir_sector: U32<LE>,
    /// Transaction signature
    transaction_signature: U32<LE>,
    /// Streams below this size live in the mini stream
    mini_stream_cutoff: U32<LE>,
    /// First MiniFAT sector
    first_minifat_sector: U32<LE>,
    /// Number of MiniFAT sectors
    num_minifat_sectors: U32<LE>,
    /// First DIFAT sector
    first_difat_sector: U32<LE>,
    /// Number of DIFAT sectors
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector locations
    difat: [U32<LE>; INLINE_DIFAT_ENTRIES],
}

/// Decoded and validated compound file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub clsid: [u8; 16],
    pub minor_version: u16,
    pub major_version: u16,
    pub sector_shift: u16,
    pub short_sector_shift: u16,
    pub num_dir_sectors: u32,
    pub num_fat_sectors: u32,
    pub first_dir_sector: u32,
    pub transaction_signature: u32,
    pub mini_stream_cutoff: u32,
    pub first_minifat_sector: u32,
    pub num_minifat_sectors: u32,
    pub first_difat_sector: u32,
    pub num_difat_sectors: u32,
    /// FAT sector locations stored inline in the header
    pub inline_difat: [u32; INLINE_DIFAT_ENTRIES],
}

impl Header {
    /// Decode the 512-byte header.
    ///
    /// The signature is checked before anything else, so a file that is not a
    /// compound file is rejected without looking at any other field.
    pub fn parse(data: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &data[0..8] != MAGIC {
            return Err(Error::format("invalid file signature"));
        }

        let raw = RawHeader::read_from_bytes(&data[..])
            .map_err(|_| Error::format("failed to decode file header"))?;

        let byte_order = raw.byte_order.get();
        if byte_order != BYTE_ORDER_MARK {
            return Err(Error::Format(format!(
                "unsupported byte order: 0x{byte_order:04x}"
            )));
        }

        let sector_shift = raw.sector_shift.get();
        if sector_shift != SECTOR_SHIFT_V3 && sector_shift != SECTOR_SHIFT_V4 {
            return Err(Error::Format(format!(
                "unsupported sector shift: {sector_shift}"
            )));
        }

        let short_sector_shift = raw.short_sector_shift.get();
        if short_sector_shift != SHORT_SECTOR_SHIFT {
            return Err(Error::Format(format!(
                "unsupported short sector shift: {short_sector_shift}"
            )));
        }

        let major_version = raw.major_version.get();
        match (major_version, sector_shift) {
            (3, SECTOR_SHIFT_V3) | (4, SECTOR_SHIFT_V4) => {},
            (3 | 4, _) => {
                return Err(Error::Format(format!(
                    "sector shift {sector_shift} does not match major version {major_version}"
                )));
            },
            _ => {
                return Err(Error::Format(format!(
                    "unsupported major version: {major_version}"
                )));
            },
        }

        let minor_version = raw.minor_version.get();
        if minor_version != MINOR_VERSION {
            log::warn!("unexpected minor version 0x{minor_version:04x}, continuing");
        }

        let num_dir_sectors = raw.num_dir_sectors.get();
        if major_version == 3 && num_dir_sectors != 0 {
            return Err(Error::Format(format!(
                "version 3 header declares {num_dir_sectors} directory sectors"
            )));
        }

        let mini_stream_cutoff = raw.mini_stream_cutoff.get();
        if mini_stream_cutoff == 0 {
            return Err(Error::format("mini stream cutoff is zero"));
        }

        let mut inline_difat = [FREESECT; INLINE_DIFAT_ENTRIES];
        for (slot, value) in inline_difat.iter_mut().zip(raw.difat.iter()) {
            *slot = value.get();
        }

        Ok(Header {
            clsid: raw.clsid,
            minor_version,
            major_version,
            sector_shift,
            short_sector_shift,
            num_dir_sectors,
            num_fat_sectors: raw.num_fat_sectors.get(),
            first_dir_sector: raw.first_dir_sector.get(),
            transaction_signature: raw.transaction_signature.get(),
            mini_stream_cutoff,
            first_minifat_sector: raw.first_minifat_sector.get(),
            num_minifat_sectors: raw.num_minifat_sectors.get(),
            first_difat_sector: raw.first_difat_sector.get(),
            num_difat_sectors: raw.num_difat_sectors.get(),
            inline_difat,
        })
    }

    /// Sector size in bytes (512 or 4096)
    #[inline]
    pub fn sector_size(&self) -> u32 {
        1u32 << self.sector_shift
    }

    /// Short sector size in bytes (64)
    #[inline]
    pub fn short_sector_size(&self) -> u32 {
        1u32 << self.short_sector_shift
    }

    /// Byte offset of a regular sector in the file
    #[inline]
    pub fn sector_offset(&self, sector: u32) -> u64 {
        (u64::from(sector) + 1) << self.sector_shift
    }

    /// Number of whole or partial sectors a file of `file_size` bytes holds after the header
    pub fn sector_count(&self, file_size: u64) -> u64 {
        let sector_size = u64::from(self.sector_size());
        file_size.saturating_sub(sector_size).div_ceil(sector_size)
    }

    /// Number of 32-bit entries in one FAT, MiniFAT or DIFAT sector
    #[inline]
    pub fn entries_per_sector(&self) -> usize {
        (self.sector_size() / 4) as usize
    }
}
