//! olecf - a reader for the OLE Compound File Binary Format
//!
//! Compound files (also called OLE2 or structured storage files) pack a
//! small file system into a single file: storages play the role of
//! directories and streams hold data. Legacy Office documents (.doc, .xls,
//! .ppt), MSI packages and Outlook .msg files all use this container.
//!
//! # Features
//!
//! - **Header, FAT and DIFAT**: Version 3 (512-byte sectors) and version 4
//!   (4096-byte sectors) files
//! - **MiniFAT**: Small streams stored in 64-byte short sectors
//! - **Directory tree**: Case-insensitive path lookup over storages and streams
//! - **Streams**: Seekable readers bounded by the declared stream size
//! - **Property sets**: `\u{5}SummaryInformation` style metadata streams
//! - **Corruption checks**: Sector cycles, out-of-range links and malformed
//!   directories are reported as errors instead of looping or panicking
//!
//! # Example
//!
//! ```no_run
//! use olecf::ole::OleFile;
//! use std::io::Read;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = OleFile::new();
//! file.open_path("presentation.ppt")?;
//!
//! let sid = file.item_by_path("/PowerPoint Document")?.sid();
//! let mut stream = file.stream(sid)?;
//! let mut header = [0u8; 8];
//! stream.read_exact(&mut header)?;
//!
//! let source = file.close()?;
//! drop(source);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod ole;

pub use common::{Error, Result};
pub use ole::{Item, OleFile, OpenOptions};
