//! Directory entries and the storage tree.
//!
//! The directory stream is a flat array of 128-byte records. Each storage
//! points at one of its children; the children of a storage form a binary
//! search tree through their left/right sibling indices. The tree is kept as
//! an arena: entries are addressed by index and every relation is an index.

use super::consts::*;
use crate::common::{Error, Result};
use chrono::{DateTime, Utc};
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// On-disk layout of one 128-byte directory record
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    /// Left sibling SID
    sid_left: U32<LE>,
    /// Right sibling SID
    sid_right: U32<LE>,
    /// Child SID
    sid_child: U32<LE>,
    /// CLSID (16 bytes)
    clsid: [u8; 16],
    /// State bits
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    /// Starting sector
    start_sector: U32<LE>,
    /// Stream size
    stream_size: U64<LE>,
}

/// Type tag of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Unused slot
    Empty,
    /// Storage (directory)
    Storage,
    /// Stream (file)
    Stream,
    /// Legacy ILockBytes entry
    LockBytes,
    /// Legacy IPropertyStorage entry
    Property,
    /// The root storage
    Root,
    /// Any other value
    Unknown(u8),
}

impl From<u8> for EntryType {
    fn from(value: u8) -> Self {
        match value {
            STGTY_EMPTY => EntryType::Empty,
            STGTY_STORAGE => EntryType::Storage,
            STGTY_STREAM => EntryType::Stream,
            STGTY_LOCKBYTES => EntryType::LockBytes,
            STGTY_PROPERTY => EntryType::Property,
            STGTY_ROOT => EntryType::Root,
            other => EntryType::Unknown(other),
        }
    }
}

impl EntryType {
    /// Storages and the root can have children
    pub fn is_container(self) -> bool {
        matches!(self, EntryType::Storage | EntryType::Root)
    }
}

/// 16-byte class identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Clsid(pub [u8; 16]);

impl Clsid {
    pub fn is_nil(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Clsid {
    /// Formats as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9],
            b[10],
            b[11],
            b[12],
            b[13],
            b[14],
            b[15],
        )
    }
}

/// Convert FILETIME ticks (100 ns since 1601-01-01 UTC) to a date-time.
///
/// Zero means "not set" and yields `None`, as do values outside chrono's range.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let ticks = i64::try_from(filetime).ok()? - FILETIME_UNIX_EPOCH_OFFSET;
    let secs = ticks.div_euclid(10_000_000);
    let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Represents an OLE directory entry (stream or storage)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Storage ID (index in directory)
    pub sid: u32,
    /// Entry name (UTF-16 decoded to UTF-8)
    pub name: String,
    /// Entry type (stream, storage, root, etc.)
    pub entry_type: EntryType,
    /// Red-black tree color (0 = red, 1 = black)
    pub node_color: u8,
    /// Index of left sibling in red-black tree
    pub sid_left: u32,
    /// Index of right sibling in red-black tree
    pub sid_right: u32,
    /// Index of child node in red-black tree
    pub sid_child: u32,
    /// CLSID of this entry
    pub clsid: Clsid,
    /// User-defined state flags
    pub state_bits: u32,
    /// Creation time as raw FILETIME ticks
    pub creation_filetime: u64,
    /// Modification time as raw FILETIME ticks
    pub modification_filetime: u64,
    /// First sector (or short sector) of the stream
    pub start_sector: u32,
    /// Size of the stream in bytes
    pub size: u64,
}

impl DirectoryEntry {
    /// Parse a single directory entry from 128 bytes
    pub fn parse(data: &[u8], sid: u32, major_version: u16) -> Result<Self> {
        let raw = RawDirectoryEntry::read_from_bytes(data).map_err(|_| {
            Error::Format(format!("directory entry {sid} has an unexpected size"))
        })?;

        let entry_type = EntryType::from(raw.entry_type);

        // Unused slots may hold leftover bytes; only their type matters
        let name = if entry_type == EntryType::Empty {
            String::new()
        } else {
            let name_len = raw.name_len.get() as usize;
            if name_len > raw.name.len() || name_len % 2 != 0 {
                return Err(Error::Format(format!(
                    "directory entry {sid} has invalid name length {name_len}"
                )));
            }
            decode_name(&raw.name[..name_len])
        };

        // Version 3 files only use the low 32 bits of the size
        let mut size = if major_version == 3 {
            raw.stream_size.get() & 0xFFFF_FFFF
        } else {
            raw.stream_size.get()
        };
        if entry_type == EntryType::Storage {
            size = 0;
        }

        Ok(DirectoryEntry {
            sid,
            name,
            entry_type,
            node_color: raw.node_color,
            sid_left: raw.sid_left.get(),
            sid_right: raw.sid_right.get(),
            sid_child: raw.sid_child.get(),
            clsid: Clsid(raw.clsid),
            state_bits: raw.state_bits.get(),
            creation_filetime: raw.creation_time.get(),
            modification_filetime: raw.modified_time.get(),
            start_sector: raw.start_sector.get(),
            size,
        })
    }

    /// Creation time, or `None` when unset
    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.creation_filetime)
    }

    /// Modification time, or `None` when unset
    pub fn modification_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.modification_filetime)
    }
}

/// Decode a UTF-16LE name, dropping the terminator and any padding after it
fn decode_name(bytes: &[u8]) -> String {
    let (decoded, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(bytes);
    match decoded.find('\0') {
        Some(end) => decoded[..end].to_string(),
        None => decoded.into_owned(),
    }
}

/// Compare two entry names in directory order.
///
/// Shorter names sort first; names of equal length compare by their
/// uppercased UTF-16 code units.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let len_a = a.encode_utf16().count();
    let len_b = b.encode_utf16().count();
    len_a.cmp(&len_b).then_with(|| {
        let upper_a = a.chars().flat_map(char::to_uppercase).collect::<String>();
        let upper_b = b.chars().flat_map(char::to_uppercase).collect::<String>();
        upper_a.encode_utf16().cmp(upper_b.encode_utf16())
    })
}

/// Case-insensitive name equality used for lookups
pub fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_uppercase)
        .eq(b.chars().flat_map(char::to_uppercase))
}

/// A tolerated irregularity found while building the tree in strict mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// Two siblings appear in the wrong order during in-order traversal
    MisorderedSiblings { parent: u32, left: u32, right: u32 },
    /// A stream entry carries a child pointer
    StreamWithChildren { sid: u32 },
    /// The root entry is not the first record
    RootNotFirst { sid: u32 },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyWarning::MisorderedSiblings {
                parent,
                left,
                right,
            } => write!(
                f,
                "children of entry {parent} out of order: {left} sorts after {right}"
            ),
            ConsistencyWarning::StreamWithChildren { sid } => {
                write!(f, "stream entry {sid} has a child pointer")
            },
            ConsistencyWarning::RootNotFirst { sid } => {
                write!(f, "root entry found at index {sid}")
            },
        }
    }
}

/// All directory entries plus the resolved parent/child structure
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    /// All entries indexed by SID
    entries: Vec<DirectoryEntry>,
    /// Ordered direct children of each entry
    children: Vec<Vec<u32>>,
    /// SID of the root entry
    root: u32,
    /// Entries linked into the tree, the root included
    reachable: FixedBitSet,
}

impl DirectoryTree {
    /// Decode the directory stream and rebuild the storage tree
    ///
    /// # Arguments
    /// * `data` - The complete directory stream
    /// * `major_version` - Format version from the header
    /// * `strict` - Collect ordering and shape irregularities as warnings
    pub fn parse(
        data: &[u8],
        major_version: u16,
        strict: bool,
    ) -> Result<(Self, Vec<ConsistencyWarning>)> {
        let count = data.len() / DIRENTRY_SIZE;
        if count == 0 {
            return Err(Error::format("directory stream is empty"));
        }

        let entries = data
            .chunks_exact(DIRENTRY_SIZE)
            .enumerate()
            .map(|(sid, chunk)| DirectoryEntry::parse(chunk, sid as u32, major_version))
            .collect::<Result<Vec<_>>>()?;

        let mut roots = entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Root)
            .map(|e| e.sid);
        let root = match (roots.next(), roots.next()) {
            (Some(root), None) => root,
            (None, _) => return Err(Error::format("directory has no root entry")),
            (Some(_), Some(_)) => {
                return Err(Error::format("directory has more than one root entry"));
            },
        };

        let mut warnings = Vec::new();
        if strict && root != 0 {
            warnings.push(ConsistencyWarning::RootNotFirst { sid: root });
        }

        let mut tree = DirectoryTree {
            children: vec![Vec::new(); entries.len()],
            reachable: FixedBitSet::with_capacity(entries.len()),
            entries,
            root,
        };
        tree.link(strict, &mut warnings)?;

        for warning in &warnings {
            log::warn!("directory: {warning}");
        }
        log::debug!(
            "loaded directory: {} entries, root at {root}",
            tree.entries.len()
        );

        Ok((tree, warnings))
    }

    /// Resolve the children of every reachable storage
    fn link(&mut self, strict: bool, warnings: &mut Vec<ConsistencyWarning>) -> Result<()> {
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        visited.insert(self.root as usize);

        let mut pending: Vec<u32> = vec![self.root];
        while let Some(parent) = pending.pop() {
            let children = self.collect_siblings(parent, &mut visited)?;

            if strict {
                for pair in children.windows(2) {
                    let (left, right) = (pair[0], pair[1]);
                    if compare_names(&self.entries[left as usize].name, &self.entries[right as usize].name)
                        != Ordering::Less
                    {
                        warnings.push(ConsistencyWarning::MisorderedSiblings {
                            parent,
                            left,
                            right,
                        });
                    }
                }
            }

            for &child in &children {
                let entry = &self.entries[child as usize];
                if entry.entry_type.is_container() {
                    pending.push(child);
                } else if entry.sid_child != NOSTREAM && strict {
                    warnings.push(ConsistencyWarning::StreamWithChildren { sid: child });
                }
            }
            self.children[parent as usize] = children;
        }
        self.reachable = visited;
        Ok(())
    }

    /// In-order walk of the sibling tree hanging off `parent`
    fn collect_siblings(&self, parent: u32, visited: &mut FixedBitSet) -> Result<Vec<u32>> {
        let mut children = Vec::new();
        let mut stack: SmallVec<[u32; 16]> = SmallVec::new();
        let mut node = self.entries[parent as usize].sid_child;

        loop {
            while node != NOSTREAM {
                let entry = self.checked_entry(parent, node)?;
                if visited.put(node as usize) {
                    return Err(Error::Format(format!(
                        "directory entry {node} is referenced more than once"
                    )));
                }
                stack.push(node);
                node = entry.sid_left;
            }
            let Some(current) = stack.pop() else {
                break;
            };
            children.push(current);
            node = self.entries[current as usize].sid_right;
        }
        Ok(children)
    }

    fn checked_entry(&self, parent: u32, sid: u32) -> Result<&DirectoryEntry> {
        if sid > MAXREGSID {
            return Err(Error::Format(format!(
                "entry {sid:#x} under {parent} is a reserved marker"
            )));
        }
        let entry = self.entries.get(sid as usize).ok_or_else(|| {
            Error::Format(format!(
                "entry {sid} under {parent} is outside the directory ({} entries)",
                self.entries.len()
            ))
        })?;
        match entry.entry_type {
            EntryType::Storage | EntryType::Stream => Ok(entry),
            EntryType::Root => Err(Error::Format(format!(
                "root entry {sid} appears as a child of {parent}"
            ))),
            other => Err(Error::Format(format!(
                "entry {sid} under {parent} has unusable type {other:?}"
            ))),
        }
    }

    /// SID of the root entry
    pub fn root(&self) -> u32 {
        self.root
    }

    /// The root entry
    pub fn root_entry(&self) -> &DirectoryEntry {
        &self.entries[self.root as usize]
    }

    /// Entry by SID
    pub fn entry(&self, sid: u32) -> Option<&DirectoryEntry> {
        self.entries.get(sid as usize)
    }

    /// Whether `sid` is the root or linked below it
    pub fn is_reachable(&self, sid: u32) -> bool {
        self.reachable.contains(sid as usize)
    }

    /// All decoded records, including unreachable ones
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Ordered children of `sid`
    pub fn children(&self, sid: u32) -> &[u32] {
        self.children.get(sid as usize).map_or(&[], Vec::as_slice)
    }

    /// Find a direct child by case-insensitive name
    ///
    /// Sibling order is not trusted, so this scans rather than descending
    /// the search tree.
    pub fn find_child(&self, parent: u32, name: &str) -> Option<u32> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&sid| names_match(&self.entries[sid as usize].name, name))
    }

    /// Resolve a `/`-delimited path from the root; empty segments are ignored
    pub fn find_path(&self, path: &str) -> Option<u32> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.root, |sid, segment| self.find_child(sid, segment))
    }

    /// Number of entries reachable from the root, the root included
    pub fn reachable_count(&self) -> usize {
        1 + self.children.iter().map(Vec::len).sum::<usize>()
    }
}
