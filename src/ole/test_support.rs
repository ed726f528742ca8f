//! In-memory compound file builder for tests.
//!
//! Produces byte-exact files with a real FAT, MiniFAT, DIFAT and directory so
//! the reader can be exercised end to end, and records where every structure
//! landed so tests can corrupt specific bytes afterwards.
//!
//! Layout: regular stream sectors (insertion order), mini stream, MiniFAT,
//! directory, FAT, DIFAT. Children of each storage are sorted with the
//! directory name order and arranged as a balanced binary tree.

use super::consts::*;
use super::directory::compare_names;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum FixtureKind {
    Storage,
    Stream(Vec<u8>),
}

#[derive(Debug, Clone)]
struct FixtureEntry {
    path: String,
    name: String,
    parent: u32,
    kind: FixtureKind,
    clsid: [u8; 16],
    created: u64,
    modified: u64,
    sid_left: u32,
    sid_right: u32,
    sid_child: u32,
    start_sector: u32,
}

/// Builder for a valid compound file
#[derive(Debug, Clone)]
pub(crate) struct CompoundFileBuilder {
    sector_shift: u16,
    entries: Vec<FixtureEntry>,
    root_clsid: [u8; 16],
    root_created: u64,
    root_modified: u64,
}

/// A built file plus the location of every structure in it
#[derive(Debug, Clone)]
pub(crate) struct BuiltFile {
    pub data: Vec<u8>,
    pub sector_size: usize,
    pub fat_sectors: Vec<u32>,
    pub difat_sectors: Vec<u32>,
    pub minifat_sectors: Vec<u32>,
    pub dir_sectors: Vec<u32>,
    pub ministream_sectors: Vec<u32>,
    starts: HashMap<String, u32>,
    sids: HashMap<String, u32>,
}

impl CompoundFileBuilder {
    /// Version 3 file with 512-byte sectors
    pub fn new() -> Self {
        CompoundFileBuilder {
            sector_shift: SECTOR_SHIFT_V3,
            entries: Vec::new(),
            root_clsid: [0; 16],
            root_created: 0,
            root_modified: 0,
        }
    }

    /// Version 4 file with 4096-byte sectors
    pub fn version4() -> Self {
        CompoundFileBuilder {
            sector_shift: SECTOR_SHIFT_V4,
            ..Self::new()
        }
    }

    fn parent_sid(&self, path: &str) -> (u32, String) {
        match path.rsplit_once('/') {
            None => (0, path.to_string()),
            Some((parent, name)) => {
                let sid = self
                    .entries
                    .iter()
                    .position(|e| e.path == parent && matches!(e.kind, FixtureKind::Storage))
                    .unwrap_or_else(|| panic!("storage {parent} must be added first"));
                (sid as u32 + 1, name.to_string())
            },
        }
    }

    fn push(mut self, path: &str, kind: FixtureKind) -> Self {
        let (parent, name) = self.parent_sid(path);
        self.entries.push(FixtureEntry {
            path: path.to_string(),
            name,
            parent,
            kind,
            clsid: [0; 16],
            created: 0,
            modified: 0,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
            start_sector: ENDOFCHAIN,
        });
        self
    }

    /// Add a storage; `path` uses `/` between components
    pub fn storage(self, path: &str) -> Self {
        self.push(path, FixtureKind::Storage)
    }

    /// Add a stream; its parent storage must already exist
    pub fn stream(self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.push(path, FixtureKind::Stream(data.into()))
    }

    /// Set the CLSID of an entry (the root when `path` is empty)
    pub fn clsid(mut self, path: &str, clsid: [u8; 16]) -> Self {
        if path.is_empty() {
            self.root_clsid = clsid;
        } else if let Some(entry) = self.entries.iter_mut().find(|e| e.path == path) {
            entry.clsid = clsid;
        }
        self
    }

    /// Set the FILETIME stamps of an entry (the root when `path` is empty)
    pub fn times(mut self, path: &str, created: u64, modified: u64) -> Self {
        if path.is_empty() {
            self.root_created = created;
            self.root_modified = modified;
        } else if let Some(entry) = self.entries.iter_mut().find(|e| e.path == path) {
            entry.created = created;
            entry.modified = modified;
        }
        self
    }

    pub fn build(mut self) -> BuiltFile {
        let sector_size = 1usize << self.sector_shift;
        let per_sector = sector_size / 4;
        let short_size = 1usize << SHORT_SECTOR_SHIFT;
        let cutoff = DEFAULT_MINI_STREAM_CUTOFF as usize;

        let mut fat: Vec<u32> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        let mut starts = HashMap::new();

        fn alloc_chain(fat: &mut Vec<u32>, body: &mut Vec<u8>, data: &[u8], unit: usize) -> Vec<u32> {
            let count = data.len().div_ceil(unit);
            let first = fat.len() as u32;
            let mut sectors = Vec::with_capacity(count);
            for i in 0..count {
                let sector = first + i as u32;
                fat.push(if i + 1 < count { sector + 1 } else { ENDOFCHAIN });
                let chunk = &data[i * unit..((i + 1) * unit).min(data.len())];
                body.extend_from_slice(chunk);
                body.resize(body.len() + unit - chunk.len(), 0);
                sectors.push(sector);
            }
            sectors
        }

        // Regular streams
        for entry in self.entries.iter_mut() {
            if let FixtureKind::Stream(data) = &entry.kind
                && data.len() >= cutoff
            {
                let sectors = alloc_chain(&mut fat, &mut body, data, sector_size);
                entry.start_sector = sectors[0];
                starts.insert(entry.path.clone(), entry.start_sector);
            }
        }

        // Mini streams
        let mut minifat: Vec<u32> = Vec::new();
        let mut ministream: Vec<u8> = Vec::new();
        for entry in self.entries.iter_mut() {
            if let FixtureKind::Stream(data) = &entry.kind
                && !data.is_empty()
                && data.len() < cutoff
            {
                let sectors = alloc_chain(&mut minifat, &mut ministream, data, short_size);
                entry.start_sector = sectors[0];
                starts.insert(entry.path.clone(), entry.start_sector);
            }
        }

        let ministream_sectors = alloc_chain(&mut fat, &mut body, &ministream, sector_size);
        let mut minifat_bytes = Vec::with_capacity(minifat.len() * 4);
        for value in &minifat {
            minifat_bytes.extend_from_slice(&value.to_le_bytes());
        }
        // Unused MiniFAT slots are free
        minifat_bytes.resize(minifat_bytes.len().div_ceil(sector_size) * sector_size, 0xFF);
        let minifat_sectors = alloc_chain(&mut fat, &mut body, &minifat_bytes, sector_size);

        // Directory tree
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            children.entry(entry.parent).or_default().push(i as u32 + 1);
        }
        let mut root_child = NOSTREAM;
        for (parent, mut sids) in children {
            sids.sort_by(|&a, &b| {
                compare_names(
                    &self.entries[a as usize - 1].name,
                    &self.entries[b as usize - 1].name,
                )
            });
            let top = self.balance(&sids);
            if parent == 0 {
                root_child = top;
            } else {
                self.entries[parent as usize - 1].sid_child = top;
            }
        }

        let mut dir_bytes = encode_entry(
            "Root Entry",
            STGTY_ROOT,
            NOSTREAM,
            NOSTREAM,
            root_child,
            &self.root_clsid,
            self.root_created,
            self.root_modified,
            ministream_sectors.first().copied().unwrap_or(ENDOFCHAIN),
            ministream.len() as u64,
        );
        for entry in &self.entries {
            let (kind, size) = match &entry.kind {
                FixtureKind::Storage => (STGTY_STORAGE, 0),
                FixtureKind::Stream(data) => (STGTY_STREAM, data.len() as u64),
            };
            let start = if kind == STGTY_STORAGE { 0 } else { entry.start_sector };
            dir_bytes.extend(encode_entry(
                &entry.name,
                kind,
                entry.sid_left,
                entry.sid_right,
                entry.sid_child,
                &entry.clsid,
                entry.created,
                entry.modified,
                start,
                size,
            ));
        }
        while dir_bytes.len() % sector_size != 0 {
            dir_bytes.extend(encode_entry("", STGTY_EMPTY, NOSTREAM, NOSTREAM, NOSTREAM, &[0; 16], 0, 0, 0, 0));
        }
        let dir_sectors = alloc_chain(&mut fat, &mut body, &dir_bytes, sector_size);

        // FAT and DIFAT sizing
        let base = fat.len();
        let (mut fat_count, mut difat_count) = (1usize, 0usize);
        loop {
            let needed_fat = (base + fat_count + difat_count).div_ceil(per_sector);
            let needed_difat = needed_fat
                .saturating_sub(INLINE_DIFAT_ENTRIES)
                .div_ceil(per_sector - 1);
            if needed_fat == fat_count && needed_difat == difat_count {
                break;
            }
            fat_count = needed_fat;
            difat_count = needed_difat;
        }
        let fat_sectors: Vec<u32> = (base..base + fat_count).map(|s| s as u32).collect();
        let difat_sectors: Vec<u32> = (base + fat_count..base + fat_count + difat_count)
            .map(|s| s as u32)
            .collect();
        fat.extend(std::iter::repeat_n(FATSECT, fat_count));
        fat.extend(std::iter::repeat_n(DIFSECT, difat_count));
        fat.resize(fat_count * per_sector, FREESECT);

        for value in &fat {
            body.extend_from_slice(&value.to_le_bytes());
        }
        let overflow: Vec<u32> = fat_sectors.iter().skip(INLINE_DIFAT_ENTRIES).copied().collect();
        for (i, &difat) in difat_sectors.iter().enumerate() {
            let mut slots = vec![FREESECT; per_sector];
            for (slot, &sector) in slots
                .iter_mut()
                .zip(overflow.iter().skip(i * (per_sector - 1)).take(per_sector - 1))
            {
                *slot = sector;
            }
            slots[per_sector - 1] = difat_sectors.get(i + 1).copied().unwrap_or(ENDOFCHAIN);
            debug_assert_eq!(difat, (base + fat_count + i) as u32);
            for value in slots {
                body.extend_from_slice(&value.to_le_bytes());
            }
        }

        // Header
        let mut data = vec![0u8; sector_size];
        data[0..8].copy_from_slice(MAGIC);
        data[0x18..0x1A].copy_from_slice(&MINOR_VERSION.to_le_bytes());
        let major: u16 = if self.sector_shift == SECTOR_SHIFT_V3 { 3 } else { 4 };
        data[0x1A..0x1C].copy_from_slice(&major.to_le_bytes());
        data[0x1C..0x1E].copy_from_slice(&BYTE_ORDER_MARK.to_le_bytes());
        data[0x1E..0x20].copy_from_slice(&self.sector_shift.to_le_bytes());
        data[0x20..0x22].copy_from_slice(&SHORT_SECTOR_SHIFT.to_le_bytes());
        let num_dir = if major == 3 { 0 } else { dir_sectors.len() as u32 };
        data[0x28..0x2C].copy_from_slice(&num_dir.to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&(fat_count as u32).to_le_bytes());
        data[0x30..0x34].copy_from_slice(&dir_sectors[0].to_le_bytes());
        data[0x38..0x3C].copy_from_slice(&DEFAULT_MINI_STREAM_CUTOFF.to_le_bytes());
        let minifat_start = minifat_sectors.first().copied().unwrap_or(ENDOFCHAIN);
        data[0x3C..0x40].copy_from_slice(&minifat_start.to_le_bytes());
        data[0x40..0x44].copy_from_slice(&(minifat_sectors.len() as u32).to_le_bytes());
        let difat_start = difat_sectors.first().copied().unwrap_or(ENDOFCHAIN);
        data[0x44..0x48].copy_from_slice(&difat_start.to_le_bytes());
        data[0x48..0x4C].copy_from_slice(&(difat_count as u32).to_le_bytes());
        for slot in 0..INLINE_DIFAT_ENTRIES {
            let value = fat_sectors.get(slot).copied().unwrap_or(FREESECT);
            let offset = 0x4C + slot * 4;
            data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        data.extend_from_slice(&body);

        let mut sids = HashMap::new();
        sids.insert(String::new(), 0);
        for (i, entry) in self.entries.iter().enumerate() {
            sids.insert(entry.path.clone(), i as u32 + 1);
        }

        BuiltFile {
            data,
            sector_size,
            fat_sectors,
            difat_sectors,
            minifat_sectors,
            dir_sectors,
            ministream_sectors,
            starts,
            sids,
        }
    }

    /// Link sorted siblings into a balanced tree and return its top
    fn balance(&mut self, sorted: &[u32]) -> u32 {
        if sorted.is_empty() {
            return NOSTREAM;
        }
        let mid = sorted.len() / 2;
        let left = self.balance(&sorted[..mid]);
        let right = self.balance(&sorted[mid + 1..]);
        let entry = &mut self.entries[sorted[mid] as usize - 1];
        entry.sid_left = left;
        entry.sid_right = right;
        sorted[mid]
    }
}

#[allow(clippy::too_many_arguments)]
fn encode_entry(
    name: &str,
    entry_type: u8,
    sid_left: u32,
    sid_right: u32,
    sid_child: u32,
    clsid: &[u8; 16],
    created: u64,
    modified: u64,
    start_sector: u32,
    size: u64,
) -> Vec<u8> {
    let mut data = vec![0u8; DIRENTRY_SIZE];
    let utf16: Vec<u16> = name.encode_utf16().take(31).collect();
    for (i, unit) in utf16.iter().enumerate() {
        data[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    let name_len = if entry_type == STGTY_EMPTY {
        0u16
    } else {
        ((utf16.len() + 1) * 2) as u16
    };
    data[64..66].copy_from_slice(&name_len.to_le_bytes());
    data[66] = entry_type;
    data[67] = 1;
    data[68..72].copy_from_slice(&sid_left.to_le_bytes());
    data[72..76].copy_from_slice(&sid_right.to_le_bytes());
    data[76..80].copy_from_slice(&sid_child.to_le_bytes());
    data[80..96].copy_from_slice(clsid);
    data[100..108].copy_from_slice(&created.to_le_bytes());
    data[108..116].copy_from_slice(&modified.to_le_bytes());
    data[116..120].copy_from_slice(&start_sector.to_le_bytes());
    data[120..128].copy_from_slice(&size.to_le_bytes());
    data
}

impl BuiltFile {
    /// Byte offset of a regular sector
    pub fn sector_offset(&self, sector: u32) -> usize {
        (sector as usize + 1) * self.sector_size
    }

    /// First sector (or short sector) of the stream at `path`
    pub fn start_sector(&self, path: &str) -> u32 {
        self.starts[path]
    }

    /// Directory index of the entry at `path` (`""` is the root)
    pub fn sid(&self, path: &str) -> u32 {
        self.sids[path]
    }

    /// Byte offset of directory entry `sid`
    pub fn dir_entry_offset(&self, sid: u32) -> usize {
        let byte = sid as usize * DIRENTRY_SIZE;
        self.sector_offset(self.dir_sectors[byte / self.sector_size]) + byte % self.sector_size
    }

    /// Overwrite one FAT entry
    pub fn set_fat_entry(&mut self, index: u32, value: u32) {
        let per_sector = self.sector_size / 4;
        let sector = self.fat_sectors[index as usize / per_sector];
        let offset = self.sector_offset(sector) + (index as usize % per_sector) * 4;
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite one MiniFAT entry
    pub fn set_minifat_entry(&mut self, index: u32, value: u32) {
        let per_sector = self.sector_size / 4;
        let sector = self.minifat_sectors[index as usize / per_sector];
        let offset = self.sector_offset(sector) + (index as usize % per_sector) * 4;
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite the type byte of directory entry `sid`
    pub fn set_entry_type(&mut self, sid: u32, entry_type: u8) {
        let offset = self.dir_entry_offset(sid) + 66;
        self.data[offset] = entry_type;
    }

    /// Overwrite a 32-bit field of directory entry `sid` at `field_offset`
    pub fn set_entry_u32(&mut self, sid: u32, field_offset: usize, value: u32) {
        let offset = self.dir_entry_offset(sid) + field_offset;
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
