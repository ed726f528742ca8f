//! Byte-level access to stream contents.
//!
//! A [`StreamReader`] resolves the stream's chain once when it is created and
//! then maps every read position to a file offset through that chain. Streams
//! below the mini stream cutoff go through the MiniFAT and the mini stream;
//! everything else goes through the FAT.

use super::chain::{SectorChain, resolve_chain_prefix};
use super::directory::{DirectoryEntry, EntryType};
use super::fat::Fat;
use super::header::Header;
use super::minifat::MiniStream;
use super::sector::read_fully;
use crate::common::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// Allocation unit a stream is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStorage {
    /// Regular sectors allocated through the FAT
    Sectors,
    /// Short sectors allocated through the MiniFAT
    ShortSectors,
}

/// Everything needed to locate stream data in the file
#[derive(Debug, Clone, Copy)]
pub(crate) struct Allocation<'a> {
    pub header: &'a Header,
    pub fat: &'a Fat,
    pub mini: Option<&'a MiniStream>,
}

impl Allocation<'_> {
    /// Decide where an entry's data lives
    ///
    /// The root entry's stream is the mini stream itself and is always read
    /// through the FAT.
    pub fn storage_for(&self, entry: &DirectoryEntry) -> StreamStorage {
        if entry.entry_type != EntryType::Root
            && entry.size < u64::from(self.header.mini_stream_cutoff)
        {
            StreamStorage::ShortSectors
        } else {
            StreamStorage::Sectors
        }
    }
}

/// Seekable reader over one stream.
///
/// Reads never go past the declared size, even when the last sector holds
/// more bytes; reading at or after the end returns 0.
pub struct StreamReader<'a, R> {
    reader: &'a mut R,
    header: &'a Header,
    mini: Option<&'a MiniStream>,
    storage: StreamStorage,
    chain: SectorChain,
    size: u64,
    position: u64,
}

impl<'a, R: Read + Seek> StreamReader<'a, R> {
    /// Resolve the chain behind `entry` and create a reader positioned at 0
    pub(crate) fn new(
        reader: &'a mut R,
        allocation: Allocation<'a>,
        entry: &DirectoryEntry,
    ) -> Result<Self> {
        match entry.entry_type {
            EntryType::Stream | EntryType::Root => {},
            other => {
                return Err(Error::Argument(format!(
                    "entry {} ({other:?}) has no stream data",
                    entry.sid
                )));
            },
        }

        let storage = allocation.storage_for(entry);
        let size = entry.size;
        let chain = match storage {
            StreamStorage::Sectors => {
                let unit = u64::from(allocation.header.sector_size());
                resolve_chain_prefix(allocation.fat, entry.start_sector, size.div_ceil(unit) as usize)?
            },
            StreamStorage::ShortSectors if size == 0 => SectorChain::default(),
            StreamStorage::ShortSectors => {
                let mini = allocation.mini.ok_or_else(|| {
                    Error::Format(format!(
                        "stream {} needs the mini stream but the file has none",
                        entry.sid
                    ))
                })?;
                let unit = u64::from(allocation.header.short_sector_size());
                resolve_chain_prefix(&mini.table, entry.start_sector, size.div_ceil(unit) as usize)?
            },
        };

        Ok(StreamReader {
            reader,
            header: allocation.header,
            mini: allocation.mini,
            storage,
            chain,
            size,
            position: 0,
        })
    }

    /// Declared size of the stream
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether the stream lives in regular or short sectors
    pub fn storage(&self) -> StreamStorage {
        self.storage
    }

    /// Sector (or short sector) indices backing the stream
    pub fn sectors(&self) -> &[u32] {
        &self.chain
    }

    fn unit_size(&self) -> u64 {
        match self.storage {
            StreamStorage::Sectors => u64::from(self.header.sector_size()),
            StreamStorage::ShortSectors => u64::from(self.header.short_sector_size()),
        }
    }

    /// File offset of the current position and the bytes left in its unit
    fn locate(&self) -> Result<(u64, u64)> {
        let unit = self.unit_size();
        let index = (self.position / unit) as usize;
        let within = self.position % unit;
        let sector = *self.chain.get(index).ok_or_else(|| {
            Error::Format(format!("stream position {} has no sector", self.position))
        })?;

        let offset = match self.storage {
            StreamStorage::Sectors => self.header.sector_offset(sector) + within,
            StreamStorage::ShortSectors => self
                .mini
                .and_then(|mini| mini.file_offset(self.header, sector, within))
                .ok_or_else(|| {
                    Error::Format(format!("short sector {sector} is outside the mini stream"))
                })?,
        };
        Ok((offset, unit - within))
    }

    /// Read the remainder of the stream into a vector
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.position);
        let mut data = vec![0u8; remaining as usize];
        let mut filled = 0;
        while filled < data.len() {
            let n = self
                .read(&mut data[filled..])
                .map_err(crate::common::error::conversions::unwrap_io_error)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data.truncate(filled);
        Ok(data)
    }
}

impl<R: Read + Seek> Read for StreamReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() && self.position < self.size {
            let (offset, unit_left) = self.locate()?;
            let want = (buf.len() - total) as u64;
            let count = want.min(unit_left).min(self.size - self.position) as usize;

            self.reader.seek(SeekFrom::Start(offset))?;
            let got = read_fully(&mut *self.reader, &mut buf[total..total + count])?;
            if got < count {
                return Err(Error::Format(format!(
                    "file truncated inside stream data at offset {}",
                    offset + got as u64
                ))
                .into());
            }

            total += count;
            self.position += count as u64;
        }
        Ok(total)
    }
}

impl<R: Read + Seek> Seek for StreamReader<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            },
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl<R> std::fmt::Debug for StreamReader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("storage", &self.storage)
            .field("size", &self.size)
            .field("position", &self.position)
            .field("sectors", &self.chain.len())
            .finish()
    }
}
