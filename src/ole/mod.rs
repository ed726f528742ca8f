//! OLE Compound File Binary Format reader
//!
//! Layering, bottom up: [`header`] decodes the fixed 512-byte header,
//! [`fat`] and [`minifat`] load the two allocation tables, [`chain`] walks
//! sector chains through either table, [`directory`] rebuilds the storage
//! tree, and [`stream`] reads stream contents. [`OleFile`] ties them
//! together behind an open/close lifecycle.

/// Constants for the compound file format
pub mod consts;

pub mod chain;
pub mod codepage;
pub mod directory;
pub mod fat;
pub mod header;
pub mod item;
pub mod minifat;
pub mod property_set;
pub mod stream;

mod file;
mod sector;

#[cfg(test)]
mod test_support;

pub use codepage::AsciiCodepage;
pub use directory::{Clsid, ConsistencyWarning, DirectoryEntry, EntryType};
pub use file::{AccessFlags, OleFile, OpenOptions, check_signature, is_olecf_signature};
pub use item::Item;
pub use property_set::{Property, PropertySection, PropertySet, PropertyValue};
pub use stream::{StreamReader, StreamStorage};
