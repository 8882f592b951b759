#![forbid(unsafe_code)]

//! Read-only access to VMFS volumes, the clustered filesystem used to back
//! virtual-machine images.
//!
//! A [`Volume`] is opened over any source of positioned reads (a raw block
//! device, an image file, or an in-memory buffer). Opening decodes the
//! fixed-offset volume descriptors, bootstraps the root directory out of the
//! file-descriptor container, and opens the five well-known meta-files that
//! index the rest of the filesystem. After that, [`Volume::open_file`]
//! resolves a slash-separated path to a [`File`] whose contents can be read
//! or dumped.
//!
//! Everything here is strictly read-only: no locking, no allocation, no
//! write support.

use std::io;

use thiserror::Error;

pub mod bitmap;
pub mod block;
pub mod dir;
pub mod file;
pub mod ondisk;
pub mod volume;

pub use block::{BlockList, BlockType};
pub use file::{File, Whence};
pub use ondisk::{BitmapHeader, FileInfo, FileRecord, FsInfo, Heartbeat, VolumeInfo};
pub use volume::{ReadAt, Volume};

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The backing image yielded fewer bytes than a structure requires.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("invalid magic number {found:#010x} (expected {expected:#010x})")]
    BadMagic { expected: u32, found: u32 },

    /// A block id encodes a type that is not valid in the current context.
    #[error("unexpected block type in id {0:#010x}")]
    UnexpectedBlockType(u32),

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("block position {0} is out of range")]
    OutOfRange(u64),

    #[error("malformed descriptor: {0}")]
    Descriptor(#[from] deku::DekuError),
}

pub type Result<T> = std::result::Result<T, Error>;
