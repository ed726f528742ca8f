//! The compound file facade.
//!
//! An [`OleFile`] starts closed. Opening parses the header, loads the FAT,
//! decodes the directory and finally loads the MiniFAT (which can only be
//! located once the root entry is known). Everything derived from the source
//! lives in a single state value, so a failed open or a close leaves nothing
//! behind.

use super::chain::resolve_chain;
use super::codepage::AsciiCodepage;
use super::consts::*;
use super::directory::{ConsistencyWarning, DirectoryTree};
use super::fat::Fat;
use super::header::Header;
use super::item::Item;
use super::minifat::MiniStream;
use super::property_set::PropertySet;
use super::sector::{read_chain, read_fully};
use super::stream::{Allocation, StreamReader};
use crate::common::{Error, Result};
use bitflags::bitflags;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

bitflags! {
    /// Requested access mode; only read access is supported
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
    }
}

/// Settings applied when a file is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Record directory irregularities as [`ConsistencyWarning`]s
    pub strict: bool,
    /// Codepage for narrow strings in property sets
    pub ascii_codepage: AsciiCodepage,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn ascii_codepage(mut self, codepage: AsciiCodepage) -> Self {
        self.ascii_codepage = codepage;
        self
    }
}

/// Whether `data` starts with the compound file signature
pub fn is_olecf_signature(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Check the signature of a source without opening it
///
/// The source is rewound to its start afterwards. Sources shorter than the
/// signature are not compound files.
pub fn check_signature<R: Read + Seek>(source: &mut R) -> Result<bool> {
    source.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; MAGIC.len()];
    let filled = read_fully(source, &mut magic)?;
    source.seek(SeekFrom::Start(0))?;
    Ok(filled == magic.len() && is_olecf_signature(&magic))
}

/// Everything parsed from an open source
struct OpenState<R> {
    reader: R,
    file_size: u64,
    header: Header,
    fat: Fat,
    mini: Option<MiniStream>,
    tree: DirectoryTree,
    warnings: Vec<ConsistencyWarning>,
}

impl<R: Read + Seek> OpenState<R> {
    fn load(mut reader: R, options: &OpenOptions) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < HEADER_SIZE as u64 {
            return Err(Error::Format(format!(
                "file is {file_size} bytes, smaller than the {HEADER_SIZE}-byte header"
            )));
        }

        reader.seek(SeekFrom::Start(0))?;
        let mut block = [0u8; HEADER_SIZE];
        reader.read_exact(&mut block)?;
        let header = Header::parse(&block)?;

        let sector_count = header.sector_count(file_size);
        log::debug!(
            "compound file v{}.{:#x}: {} byte sectors, {} sectors, {} bytes",
            header.major_version,
            header.minor_version,
            header.sector_size(),
            sector_count,
            file_size
        );

        let fat = Fat::load(&mut reader, &header, sector_count)?;

        let dir_chain = resolve_chain(&fat, header.first_dir_sector)?;
        let dir_data = read_chain(&mut reader, &header, sector_count, &dir_chain)?;
        let (tree, warnings) = DirectoryTree::parse(&dir_data, header.major_version, options.strict)?;

        let mini = MiniStream::load(&mut reader, &header, &fat, tree.root_entry())?;

        Ok(OpenState {
            reader,
            file_size,
            header,
            fat,
            mini,
            tree,
            warnings,
        })
    }
}

/// A read-only compound file.
///
/// The source is any `Read + Seek`: an owned [`File`], a `Cursor` over bytes,
/// or a `&mut` borrow of either. [`OleFile::close`] hands it back.
///
/// # Examples
///
/// ```no_run
/// use olecf::ole::OleFile;
///
/// let mut file = OleFile::new();
/// file.open_path("document.doc")?;
/// let root = file.root_item()?;
/// for item in root.sub_items() {
///     println!("{} ({} bytes)", item.name(), item.size());
/// }
///
/// let data = file.read_stream("WordDocument")?;
/// println!("{} bytes", data.len());
/// # Ok::<(), olecf::Error>(())
/// ```
pub struct OleFile<R: Read + Seek> {
    options: OpenOptions,
    state: Option<OpenState<R>>,
}

impl<R: Read + Seek> Default for OleFile<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read + Seek> OleFile<R> {
    /// A closed file with default options
    pub fn new() -> Self {
        Self::with_options(OpenOptions::default())
    }

    /// A closed file with the given options
    pub fn with_options(options: OpenOptions) -> Self {
        OleFile {
            options,
            state: None,
        }
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Parse `source` and keep it for stream reads
    ///
    /// On failure the file stays closed and the source is dropped.
    pub fn open(&mut self, source: R) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.state = Some(OpenState::load(source, &self.options)?);
        Ok(())
    }

    /// Open with an explicit access mode
    ///
    /// Only [`AccessFlags::READ`] is accepted.
    pub fn open_with_flags(&mut self, source: R, flags: AccessFlags) -> Result<()> {
        if flags != AccessFlags::READ {
            return Err(Error::Argument(format!(
                "unsupported access flags {flags:?}, only read access is available"
            )));
        }
        self.open(source)
    }

    /// Drop all parsed state and return the source
    pub fn close(&mut self) -> Result<R> {
        self.state
            .take()
            .map(|state| state.reader)
            .ok_or(Error::NotOpen)
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&OpenState<R>> {
        self.state.as_ref().ok_or(Error::NotOpen)
    }

    /// Size of the source in bytes
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.state()?.file_size)
    }

    /// Major and minor format version from the header
    pub fn format_version(&self) -> Result<(u16, u16)> {
        let header = &self.state()?.header;
        Ok((header.major_version, header.minor_version))
    }

    pub fn sector_size(&self) -> Result<u32> {
        Ok(self.state()?.header.sector_size())
    }

    pub fn short_sector_size(&self) -> Result<u32> {
        Ok(self.state()?.header.short_sector_size())
    }

    /// The parsed header
    pub fn header(&self) -> Result<&Header> {
        Ok(&self.state()?.header)
    }

    /// Codepage used for narrow strings
    pub fn ascii_codepage(&self) -> AsciiCodepage {
        self.options.ascii_codepage
    }

    /// Select the narrow-string codepage by name, open or not
    ///
    /// Unknown names leave the current codepage unchanged.
    pub fn set_ascii_codepage(&mut self, name: &str) -> Result<()> {
        self.options.ascii_codepage = AsciiCodepage::from_name(name)?;
        Ok(())
    }

    /// Number of items reachable from the root, the root included
    pub fn number_of_items(&self) -> Result<usize> {
        Ok(self.state()?.tree.reachable_count())
    }

    /// Irregularities found while opening in strict mode
    pub fn warnings(&self) -> Result<&[ConsistencyWarning]> {
        Ok(&self.state()?.warnings)
    }

    pub fn root_item(&self) -> Result<Item<'_>> {
        let tree = &self.state()?.tree;
        Ok(Item::new(tree, tree.root()))
    }

    /// Item by `/`-delimited path; `""` and `"/"` name the root
    pub fn item_by_path(&self, path: &str) -> Result<Item<'_>> {
        let tree = &self.state()?.tree;
        tree.find_path(path)
            .map(|sid| Item::new(tree, sid))
            .ok_or_else(|| Error::ItemNotFound(path.to_string()))
    }

    /// Item by directory index
    ///
    /// Records that are not linked into the tree are not items.
    pub fn item(&self, sid: u32) -> Result<Item<'_>> {
        let tree = &self.state()?.tree;
        if tree.is_reachable(sid) {
            Ok(Item::new(tree, sid))
        } else {
            Err(Error::ItemNotFound(format!("#{sid}")))
        }
    }

    /// Seekable reader over the stream with directory index `sid`
    pub fn stream(&mut self, sid: u32) -> Result<StreamReader<'_, R>> {
        let OpenState {
            reader,
            header,
            fat,
            mini,
            tree,
            ..
        } = self.state.as_mut().ok_or(Error::NotOpen)?;
        let entry = tree
            .entry(sid)
            .filter(|_| tree.is_reachable(sid))
            .ok_or_else(|| Error::ItemNotFound(format!("#{sid}")))?;
        let allocation = Allocation {
            header,
            fat,
            mini: mini.as_ref(),
        };
        StreamReader::new(reader, allocation, entry)
    }

    /// Seekable reader over the stream at `path`
    pub fn stream_by_path(&mut self, path: &str) -> Result<StreamReader<'_, R>> {
        let sid = self.item_by_path(path)?.sid();
        self.stream(sid)
    }

    /// Read a whole stream into memory
    pub fn read_stream(&mut self, path: &str) -> Result<Vec<u8>> {
        self.stream_by_path(path)?.read_to_vec()
    }

    /// Read and parse a property set stream such as `\u{5}SummaryInformation`
    pub fn property_set(&mut self, path: &str) -> Result<PropertySet> {
        let data = self.read_stream(path)?;
        PropertySet::parse(&data, self.options.ascii_codepage)
    }
}

impl OleFile<File> {
    /// Open the file at `path`; the handle is owned until [`OleFile::close`]
    pub fn open_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::Argument("empty path".to_string()));
        }
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        let file = File::open(path)?;
        self.open(file)
    }
}

impl<R: Read + Seek> fmt::Debug for OleFile<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("OleFile");
        s.field("options", &self.options);
        match &self.state {
            Some(state) => s
                .field("file_size", &state.file_size)
                .field("version", &state.header.major_version)
                .field("items", &state.tree.reachable_count()),
            None => s.field("open", &false),
        };
        s.finish()
    }
}
