//! File Allocation Table and its DIFAT index.
//!
//! The header lists the first 109 FAT sectors. Larger files chain further
//! DIFAT sectors, each holding `sector_size / 4 - 1` FAT sector locations
//! followed by the index of the next DIFAT sector.

use super::chain::AllocationTable;
use super::consts::*;
use super::header::Header;
use super::sector::{decode_entries, read_sector};
use crate::common::{Error, Result};
use fixedbitset::FixedBitSet;
use std::io::{Read, Seek};

/// The primary allocation table, indexed by sector number
#[derive(Debug, Clone, Default)]
pub struct Fat {
    /// Chain links for every sector the FAT describes
    entries: Vec<u32>,
    /// Number of sectors present in the file
    sector_count: u64,
}

impl Fat {
    /// Build a table from already decoded entries
    pub fn from_entries(entries: Vec<u32>, sector_count: u64) -> Self {
        Fat {
            entries,
            sector_count,
        }
    }

    /// Load the FAT described by `header`
    ///
    /// # Arguments
    /// * `reader` - Byte source positioned anywhere
    /// * `header` - The decoded file header
    /// * `sector_count` - Number of sectors in the file after the header
    pub fn load<R: Read + Seek>(reader: &mut R, header: &Header, sector_count: u64) -> Result<Self> {
        let fat_sectors = collect_fat_sectors(reader, header, sector_count)?;

        let mut entries = Vec::with_capacity(fat_sectors.len() * header.entries_per_sector());
        for &sector in &fat_sectors {
            let data = read_sector(reader, header, sector_count, sector)?;
            decode_entries(&data, &mut entries);
        }

        log::debug!(
            "loaded FAT: {} sectors, {} entries, {} sectors in file",
            fat_sectors.len(),
            entries.len(),
            sector_count
        );

        Ok(Fat {
            entries,
            sector_count,
        })
    }

    /// Raw entries of the table
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }
}

impl AllocationTable for Fat {
    const NAME: &'static str = "FAT";

    #[inline]
    fn entry(&self, index: u32) -> Option<u32> {
        self.entries.get(index as usize).copied()
    }

    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn capacity(&self) -> u64 {
        self.sector_count
    }
}

/// Gather the locations of every FAT sector from the header and DIFAT chain
fn collect_fat_sectors<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    sector_count: u64,
) -> Result<Vec<u32>> {
    let declared = header.num_fat_sectors as usize;
    let mut fat_sectors = Vec::with_capacity(declared.min(sector_count as usize));

    for &sector in header.inline_difat.iter() {
        if sector == FREESECT || sector == ENDOFCHAIN {
            break;
        }
        push_fat_sector(&mut fat_sectors, sector, declared)?;
    }

    if header.num_difat_sectors > 0 {
        let slots = header.entries_per_sector() - 1;
        let mut visited = FixedBitSet::with_capacity(sector_count as usize);
        let mut difat_sector = header.first_difat_sector;
        let mut read = 0u32;

        while difat_sector != ENDOFCHAIN && difat_sector != FREESECT {
            if read == header.num_difat_sectors {
                return Err(Error::Format(format!(
                    "DIFAT chain longer than the declared {} sectors",
                    header.num_difat_sectors
                )));
            }
            if u64::from(difat_sector) >= sector_count {
                return Err(Error::Format(format!(
                    "DIFAT sector {difat_sector} beyond end of file"
                )));
            }
            if visited.put(difat_sector as usize) {
                return Err(Error::Format(format!(
                    "DIFAT chain contains a cycle at sector {difat_sector}"
                )));
            }

            let data = read_sector(reader, header, sector_count, difat_sector)?;
            let mut values = Vec::with_capacity(slots + 1);
            decode_entries(&data, &mut values);

            for &sector in &values[..slots] {
                if sector == FREESECT || sector == ENDOFCHAIN {
                    continue;
                }
                push_fat_sector(&mut fat_sectors, sector, declared)?;
            }

            difat_sector = values[slots];
            read += 1;
        }

        if read < header.num_difat_sectors {
            log::warn!(
                "DIFAT chain ended after {read} of {} declared sectors",
                header.num_difat_sectors
            );
        }
    } else if header.first_difat_sector != ENDOFCHAIN && header.first_difat_sector != FREESECT {
        log::warn!(
            "header has no DIFAT sectors but DIFAT start is {}",
            header.first_difat_sector
        );
    }

    if fat_sectors.len() < declared {
        log::warn!(
            "found {} FAT sectors, header declares {declared}",
            fat_sectors.len()
        );
    }

    Ok(fat_sectors)
}

fn push_fat_sector(fat_sectors: &mut Vec<u32>, sector: u32, declared: usize) -> Result<()> {
    if sector > MAXREGSECT {
        return Err(Error::Format(format!(
            "invalid FAT sector location 0x{sector:08x}"
        )));
    }
    if fat_sectors.len() == declared {
        return Err(Error::Format(format!(
            "more FAT sectors listed than the declared {declared}"
        )));
    }
    fat_sectors.push(sector);
    Ok(())
}
