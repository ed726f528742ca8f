//! Borrowed views of directory entries.

use super::directory::{Clsid, DirectoryEntry, DirectoryTree, EntryType};
use crate::common::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// A storage, stream or the root, viewed through the directory tree.
///
/// Items are cheap handles into the tree owned by the open file; they never
/// own entry data. Use [`Item::sid`] with [`OleFile::stream`](super::OleFile::stream)
/// to read a stream's contents.
#[derive(Clone, Copy)]
pub struct Item<'a> {
    tree: &'a DirectoryTree,
    sid: u32,
}

impl<'a> Item<'a> {
    pub(crate) fn new(tree: &'a DirectoryTree, sid: u32) -> Self {
        Item { tree, sid }
    }

    fn entry(&self) -> &'a DirectoryEntry {
        &self.tree.entries()[self.sid as usize]
    }

    /// Directory index of this item
    pub fn sid(&self) -> u32 {
        self.sid
    }

    /// Name of the item
    pub fn name(&self) -> &'a str {
        &self.entry().name
    }

    /// Type of the item
    pub fn item_type(&self) -> EntryType {
        self.entry().entry_type
    }

    pub fn is_root(&self) -> bool {
        self.item_type() == EntryType::Root
    }

    pub fn is_storage(&self) -> bool {
        self.item_type() == EntryType::Storage
    }

    pub fn is_stream(&self) -> bool {
        self.item_type() == EntryType::Stream
    }

    /// Declared size in bytes (always 0 for storages)
    pub fn size(&self) -> u64 {
        self.entry().size
    }

    pub fn clsid(&self) -> Clsid {
        self.entry().clsid
    }

    pub fn state_bits(&self) -> u32 {
        self.entry().state_bits
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.entry().creation_time()
    }

    pub fn modification_time(&self) -> Option<DateTime<Utc>> {
        self.entry().modification_time()
    }

    /// The raw directory entry behind this item
    pub fn directory_entry(&self) -> &'a DirectoryEntry {
        self.entry()
    }

    /// Number of direct children
    pub fn number_of_sub_items(&self) -> usize {
        self.tree.children(self.sid).len()
    }

    /// Direct child by position in name order
    pub fn sub_item(&self, index: usize) -> Option<Item<'a>> {
        self.tree
            .children(self.sid)
            .get(index)
            .map(|&sid| Item::new(self.tree, sid))
    }

    /// Iterate direct children in name order
    pub fn sub_items(self) -> impl Iterator<Item = Item<'a>> + 'a {
        let tree = self.tree;
        tree.children(self.sid)
            .iter()
            .map(move |&sid| Item::new(tree, sid))
    }

    /// Direct child by case-insensitive name
    pub fn sub_item_by_name(&self, name: &str) -> Result<Item<'a>> {
        self.tree
            .find_child(self.sid, name)
            .map(|sid| Item::new(self.tree, sid))
            .ok_or_else(|| Error::ItemNotFound(name.to_string()))
    }

    /// Descendant by `/`-delimited path relative to this item
    pub fn sub_item_by_path(&self, path: &str) -> Result<Item<'a>> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.sid, |sid, segment| self.tree.find_child(sid, segment))
            .map(|sid| Item::new(self.tree, sid))
            .ok_or_else(|| Error::ItemNotFound(path.to_string()))
    }
}

impl PartialEq for Item<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.sid == other.sid
    }
}

impl Eq for Item<'_> {}

impl fmt::Debug for Item<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("sid", &self.sid)
            .field("name", &self.name())
            .field("type", &self.item_type())
            .field("size", &self.size())
            .finish()
    }
}
