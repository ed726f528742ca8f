/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Size of the fixed file header in bytes
pub const HEADER_SIZE: usize = 512;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Number of FAT sector locations stored directly in the header
pub const INLINE_DIFAT_ENTRIES: usize = 109;

/// Sector size for major version 3 (512 bytes)
pub const SECTOR_SIZE_V3: u32 = 512;

/// Sector size for major version 4 (4096 bytes)
pub const SECTOR_SIZE_V4: u32 = 4096;

/// Sector shift for 512-byte sectors
pub const SECTOR_SHIFT_V3: u16 = 9;

/// Sector shift for 4096-byte sectors
pub const SECTOR_SHIFT_V4: u16 = 12;

/// The only short-sector shift in use (64-byte short sectors)
pub const SHORT_SECTOR_SHIFT: u16 = 6;

/// Expected byte order mark (little-endian)
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;

/// Minor version written by reference implementations
pub const MINOR_VERSION: u16 = 0x003E;

/// Default mini stream cutoff size
pub const DEFAULT_MINI_STREAM_CUTOFF: u32 = 4096;

// Sector IDs (from AAF specifications)
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes a DIFAT sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

// Directory Entry IDs (from AAF specifications)
/// Maximum directory entry ID
pub const MAXREGSID: u32 = 0xFFFFFFFA; // -6
/// Unallocated directory entry
pub const NOSTREAM: u32 = 0xFFFFFFFF; // -1

// Object types in storage (from AAF specifications)
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is an ILockBytes object
pub const STGTY_LOCKBYTES: u8 = 3;
/// Element is an IPropertyStorage object
pub const STGTY_PROPERTY: u8 = 4;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;

// Property types
pub const VT_EMPTY: u16 = 0;
pub const VT_NULL: u16 = 1;
pub const VT_I2: u16 = 2;
pub const VT_I4: u16 = 3;
pub const VT_R4: u16 = 4;
pub const VT_R8: u16 = 5;
pub const VT_CY: u16 = 6;
pub const VT_DATE: u16 = 7;
pub const VT_BSTR: u16 = 8;
pub const VT_ERROR: u16 = 10;
pub const VT_BOOL: u16 = 11;
pub const VT_VARIANT: u16 = 12;
pub const VT_I1: u16 = 16;
pub const VT_UI1: u16 = 17;
pub const VT_UI2: u16 = 18;
pub const VT_UI4: u16 = 19;
pub const VT_I8: u16 = 20;
pub const VT_UI8: u16 = 21;
pub const VT_INT: u16 = 22;
pub const VT_UINT: u16 = 23;
pub const VT_LPSTR: u16 = 30;
pub const VT_LPWSTR: u16 = 31;
pub const VT_FILETIME: u16 = 64;
pub const VT_BLOB: u16 = 65;
pub const VT_CF: u16 = 71;
pub const VT_CLSID: u16 = 72;
/// Flag bit marking a counted array of the base type
pub const VT_VECTOR: u16 = 0x1000;

/// Property identifier holding the section codepage
pub const PID_CODEPAGE: u32 = 1;

/// UTF-16LE codepage identifier, as found in property set sections
pub const CP_UTF16LE: u16 = 1200;

/// UTF-8 codepage identifier
pub const CP_UTF8: u16 = 65001;

/// Difference between the FILETIME epoch (1601-01-01) and the Unix epoch, in 100 ns ticks
pub const FILETIME_UNIX_EPOCH_OFFSET: i64 = 116_444_736_000_000_000;
