//! MiniFAT and the mini stream it allocates from.
//!
//! Streams smaller than the header's cutoff are stored in 64-byte short
//! sectors carved out of the mini stream, which is the root entry's own
//! stream and is itself allocated through the regular FAT. Loading therefore
//! has to wait until the directory has been parsed.

use super::chain::{AllocationTable, SectorChain, resolve_chain, resolve_chain_prefix};
use super::consts::*;
use super::directory::DirectoryEntry;
use super::fat::Fat;
use super::header::Header;
use super::sector::{decode_entries, read_chain};
use crate::common::Result;
use std::io::{Read, Seek};

/// The secondary allocation table, indexed by short sector number
#[derive(Debug, Clone, Default)]
pub struct MiniFat {
    /// Chain links for every short sector
    entries: Vec<u32>,
    /// Number of short sectors the mini stream can hold
    short_sector_count: u64,
}

impl MiniFat {
    /// Build a table from already decoded entries
    pub fn from_entries(entries: Vec<u32>, short_sector_count: u64) -> Self {
        MiniFat {
            entries,
            short_sector_count,
        }
    }

    /// Raw entries of the table
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }
}

impl AllocationTable for MiniFat {
    const NAME: &'static str = "MiniFAT";

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
        self.short_sector_count
    }
}

/// The MiniFAT together with the location of the mini stream in the file
#[derive(Debug, Clone, Default)]
pub struct MiniStream {
    /// Allocation table for short sectors
    pub table: MiniFat,
    /// Regular sectors holding the mini stream, in order
    pub sectors: SectorChain,
    /// Size of the mini stream in bytes
    pub size: u64,
}

impl MiniStream {
    /// Load the MiniFAT and resolve the mini stream's sectors
    ///
    /// Returns `None` when the file has no short-sector storage at all.
    pub fn load<R: Read + Seek>(
        reader: &mut R,
        header: &Header,
        fat: &Fat,
        root: &DirectoryEntry,
    ) -> Result<Option<Self>> {
        let has_minifat = header.first_minifat_sector != ENDOFCHAIN
            && header.first_minifat_sector != FREESECT
            && header.num_minifat_sectors > 0;
        let has_ministream = root.size > 0 && root.start_sector != ENDOFCHAIN;

        match (has_minifat, has_ministream) {
            (false, false) => return Ok(None),
            (true, false) => {
                log::warn!("MiniFAT present but the root entry has no mini stream");
                return Ok(None);
            },
            (false, true) => {
                log::warn!("root entry has a mini stream but the file has no MiniFAT");
                return Ok(None);
            },
            (true, true) => {},
        }

        let sector_count = fat.capacity();
        let sector_size = u64::from(header.sector_size());
        let needed = root.size.div_ceil(sector_size) as usize;
        let sectors = resolve_chain_prefix(fat, root.start_sector, needed)?;
        let short_sector_count = root.size.div_ceil(u64::from(header.short_sector_size()));

        let minifat_chain = resolve_chain(fat, header.first_minifat_sector)?;
        if minifat_chain.len() != header.num_minifat_sectors as usize {
            log::warn!(
                "MiniFAT chain has {} sectors, header declares {}",
                minifat_chain.len(),
                header.num_minifat_sectors
            );
        }
        let data = read_chain(reader, header, sector_count, &minifat_chain)?;
        let mut entries = Vec::new();
        decode_entries(&data, &mut entries);

        log::debug!(
            "loaded MiniFAT: {} entries, mini stream {} bytes in {} sectors",
            entries.len(),
            root.size,
            sectors.len()
        );

        Ok(Some(MiniStream {
            table: MiniFat {
                entries,
                short_sector_count,
            },
            sectors,
            size: root.size,
        }))
    }

    /// Byte offset in the file of `offset` bytes into short sector `short_sector`
    pub fn file_offset(&self, header: &Header, short_sector: u32, offset: u64) -> Option<u64> {
        let sector_size = u64::from(header.sector_size());
        let position = u64::from(short_sector) * u64::from(header.short_sector_size()) + offset;
        if position >= self.size {
            return None;
        }
        let sector = *self.sectors.get((position / sector_size) as usize)?;
        Some(header.sector_offset(sector) + position % sector_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::directory::DirectoryTree;
    use crate::ole::test_support::CompoundFileBuilder;
    use std::io::Cursor;

    fn load(data: Vec<u8>) -> (Header, Option<MiniStream>) {
        let bytes: &[u8; HEADER_SIZE] = data[..HEADER_SIZE].try_into().unwrap();
        let header = Header::parse(bytes).unwrap();
        let sector_count = header.sector_count(data.len() as u64);
        let mut cursor = Cursor::new(data);
        let fat = Fat::load(&mut cursor, &header, sector_count).unwrap();
        let dir_chain = resolve_chain(&fat, header.first_dir_sector).unwrap();
        let dir = read_chain(&mut cursor, &header, sector_count, &dir_chain).unwrap();
        let (tree, _) = DirectoryTree::parse(&dir, header.major_version, false).unwrap();
        let mini = MiniStream::load(&mut cursor, &header, &fat, tree.root_entry()).unwrap();
        (header, mini)
    }

    #[test]
    fn test_no_small_streams_means_no_mini_stream() {
        let built = CompoundFileBuilder::new()
            .stream("Big", vec![1u8; 4096])
            .build();
        let (_, mini) = load(built.data);
        assert!(mini.is_none());
    }

    #[test]
    fn test_load_mini_stream() {
        let built = CompoundFileBuilder::new()
            .stream("One", vec![1u8; 100])
            .stream("Two", vec![2u8; 64])
            .build();
        let start_two = built.start_sector("Two");
        let ministream = built.ministream_sectors.clone();
        let (header, mini) = load(built.data);
        let mini = mini.unwrap();

        assert_eq!(mini.size, 192);
        assert_eq!(mini.sectors.sectors(), ministream.as_slice());
        assert_eq!(mini.table.capacity(), 3);
        assert_eq!(resolve_chain(&mini.table, 0).unwrap().sectors(), &[0, 1]);
        assert_eq!(resolve_chain(&mini.table, start_two).unwrap().sectors(), &[2]);

        let base = header.sector_offset(ministream[0]);
        assert_eq!(mini.file_offset(&header, 2, 5), Some(base + 133));
        assert_eq!(mini.file_offset(&header, 3, 0), None);
    }

    #[test]
    fn test_minifat_cycle_is_format_error() {
        let mut built = CompoundFileBuilder::new()
            .stream("Small", vec![7u8; 300])
            .build();
        built.set_minifat_entry(3, 1);
        let (_, mini) = load(built.data);
        let mini = mini.unwrap();
        assert!(resolve_chain(&mini.table, 0).unwrap_err().is_format());
    }
}
