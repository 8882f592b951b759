//! On-disk descriptor layouts.
//!
//! Every multi-byte integer on disk is little-endian; decoding goes through
//! deku field by field, never by reinterpreting the raw buffer. The
//! `pad_bytes_before` attributes encode the gaps between the documented
//! field offsets of each structure.

use std::borrow::Cow;
use std::fmt;

use deku::{DekuContainerRead, DekuRead};
use itertools::Itertools;

use crate::Error;
use crate::Result as Res;

/// Absolute offset of the volume information descriptor; doubles as the base
/// for every other descriptor region.
pub const VOLINFO_BASE: u64 = 0x10_0000;
pub const VOLINFO_MAGIC: u32 = 0xc001_d00d;

/// Offset of the filesystem information descriptor, relative to the volume
/// base.
pub const FSINFO_BASE: u64 = 0x120_0000;
pub const FSINFO_MAGIC: u32 = 0x2fab_f15e;

/// Offset of the heartbeat region, relative to the volume base. The region
/// is an array of 0x200-byte slots inside full-block 3.
pub const HB_BASE: u64 = 0x130_0000;
pub const HB_MAGIC_OFF: u32 = 0xabcd_ef01;
pub const HB_MAGIC_ON: u32 = 0xabcd_ef02;

/// Offset of the file-descriptor container, relative to the volume base.
pub const FDC_BASE: u64 = 0x140_0000;

/// Size of one bitmap entry inside a meta-file area.
pub const BITMAP_ENTRY_SIZE: u64 = 0x400;

/// Capacity of the inline block-id array of a file's meta-info.
pub const FILE_INFO_BLK_COUNT: usize = 0x100;

/// Trim a fixed-size on-disk string at its first NUL.
pub fn nul_str(bytes: &[u8]) -> Cow<'_, str> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
}

/// Render a UUID the way the filesystem labels volumes: the first two dwords
/// byte-swapped, then the remaining bytes in storage order.
pub fn uuid_str(uuid: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{}",
        uuid[3],
        uuid[2],
        uuid[1],
        uuid[0],
        uuid[7],
        uuid[6],
        uuid[5],
        uuid[4],
        uuid[9],
        uuid[8],
        uuid[10..16]
            .iter()
            .format_with("", |b, f| f(&format_args!("{b:02x}"))),
    )
}

/// Volume descriptor at [`VOLINFO_BASE`].
#[derive(Debug, Clone, PartialEq, DekuRead)]
#[deku(endian = "little")]
pub struct VolumeInfo {
    pub magic: u32,
    pub version: u32,
    #[deku(pad_bytes_before = "10")]
    pub name: [u8; 28],
    #[deku(pad_bytes_before = "84")]
    pub uuid: [u8; 16],
    /// Total size of the volume in bytes.
    #[deku(pad_bytes_before = "366")]
    pub size: u64,
    pub blocks: u64,
}

impl VolumeInfo {
    pub const SIZE: usize = 1024;

    pub fn parse(buf: &[u8]) -> Res<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortRead {
                expected: Self::SIZE,
                got: buf.len(),
            });
        }
        let (_rest, info) = Self::from_bytes((buf, 0))?;
        if info.magic != VOLINFO_MAGIC {
            return Err(Error::BadMagic {
                expected: VOLINFO_MAGIC,
                found: info.magic,
            });
        }
        Ok(info)
    }

    pub fn name(&self) -> Cow<'_, str> {
        nul_str(&self.name)
    }
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VMFS Volume Information:")?;
        writeln!(f, "  - Version : {}", self.version)?;
        writeln!(f, "  - Name    : {}", self.name())?;
        writeln!(f, "  - UUID    : {}", uuid_str(&self.uuid))?;
        writeln!(f, "  - Size    : {} Gb", self.size / (1024 * 1048576))?;
        writeln!(f, "  - Blocks  : {}", self.blocks)
    }
}

/// Filesystem descriptor at `vmfs_base +` [`FSINFO_BASE`].
#[derive(Debug, Clone, PartialEq, DekuRead)]
#[deku(endian = "little")]
pub struct FsInfo {
    pub magic: u32,
    pub vol_version: u32,
    pub version: u8,
    pub uuid: [u8; 16],
    #[deku(pad_bytes_before = "4")]
    pub label: [u8; 128],
    /// Size of a full filesystem block in bytes. Stored as 32 bits.
    #[deku(pad_bytes_before = "4", bytes = "4")]
    pub block_size: u64,
}

impl FsInfo {
    pub const SIZE: usize = 512;

    pub fn parse(buf: &[u8]) -> Res<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortRead {
                expected: Self::SIZE,
                got: buf.len(),
            });
        }
        let (_rest, info) = Self::from_bytes((buf, 0))?;
        if info.magic != FSINFO_MAGIC {
            return Err(Error::BadMagic {
                expected: FSINFO_MAGIC,
                found: info.magic,
            });
        }
        Ok(info)
    }

    pub fn label(&self) -> Cow<'_, str> {
        nul_str(&self.label)
    }
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VMFS FS Information:")?;
        writeln!(f, "  - Vol. Version : {}", self.vol_version)?;
        writeln!(f, "  - Version      : {}", self.version)?;
        writeln!(f, "  - Label        : {}", self.label())?;
        writeln!(f, "  - UUID         : {}", uuid_str(&self.uuid))?;
        writeln!(
            f,
            "  - Block size   : {} ({:#x})",
            self.block_size, self.block_size
        )
    }
}

/// One heartbeat slot. Slots with [`HB_MAGIC_ON`] belong to a live host;
/// nothing here is interpreted beyond display.
#[derive(Debug, Clone, PartialEq, DekuRead)]
#[deku(endian = "little")]
pub struct Heartbeat {
    pub magic: u32,
    pub position: u64,
    /// Uptime of the locker, in microseconds.
    #[deku(pad_bytes_before = "8")]
    pub uptime: u64,
    pub uuid: [u8; 16],
}

impl Heartbeat {
    /// On-disk size of one slot.
    pub const SIZE: usize = 0x200;

    pub fn parse(buf: &[u8]) -> Res<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortRead {
                expected: Self::SIZE,
                got: buf.len(),
            });
        }
        let (_rest, hb) = Self::from_bytes((buf, 0))?;
        Ok(hb)
    }

    pub fn is_active(&self) -> bool {
        self.magic == HB_MAGIC_ON
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Heartbeat ID {:#x}:", self.position)?;
        writeln!(f, "  - Magic  : {:#010x}", self.magic)?;
        writeln!(f, "  - Uptime : {:#x}", self.uptime)?;
        writeln!(f, "  - UUID   : {}", uuid_str(&self.uuid))
    }
}

/// A file's meta-info record, as stored in the file-descriptor container.
///
/// The tail of the record is an inline array of up to
/// [`FILE_INFO_BLK_COUNT`] block ids; the first zero id terminates it.
#[derive(Debug, Clone, PartialEq, DekuRead)]
#[deku(endian = "little")]
pub struct FileInfo {
    pub group_id: u32,
    pub position: u64,
    pub hb_pos: u64,
    #[deku(pad_bytes_before = "16")]
    pub hb_lock: u32,
    pub hb_uuid: [u8; 16],
    #[deku(pad_bytes_before = "456")]
    pub id: u32,
    pub id2: u32,
    #[deku(pad_bytes_before = "4")]
    pub kind: u32,
    #[deku(pad_bytes_before = "4")]
    pub size: u64,
    #[deku(pad_bytes_before = "16")]
    pub ts1: u32,
    pub ts2: u32,
    pub ts3: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    #[deku(pad_bytes_before = "444", count = "256")]
    pub blocks: Vec<u32>,
}

impl FileInfo {
    pub const SIZE: usize = 0x800;

    pub fn parse(buf: &[u8]) -> Res<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortRead {
                expected: Self::SIZE,
                got: buf.len(),
            });
        }
        let (_rest, info) = Self::from_bytes((buf, 0))?;
        Ok(info)
    }
}

/// One directory entry. Directories are tightly packed arrays of these.
#[derive(Debug, Clone, PartialEq, DekuRead)]
#[deku(endian = "little")]
pub struct FileRecord {
    pub kind: u32,
    pub block_id: u32,
    pub record_id: u32,
    pub name: [u8; 128],
}

impl FileRecord {
    pub const SIZE: usize = 0x8c;

    pub fn parse(buf: &[u8]) -> Res<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortRead {
                expected: Self::SIZE,
                got: buf.len(),
            });
        }
        let (_rest, rec) = Self::from_bytes((buf, 0))?;
        Ok(rec)
    }

    pub fn name(&self) -> Cow<'_, str> {
        nul_str(&self.name)
    }
}

/// Stride constants of a bitmap-organized meta-file, stored in its first
/// bytes. All meta-file addressing derives from these six fields.
#[derive(Debug, Clone, Copy, PartialEq, DekuRead)]
#[deku(endian = "little")]
pub struct BitmapHeader {
    pub items_per_bitmap_entry: u32,
    pub bmp_entries_per_area: u32,
    pub hdr_size: u32,
    pub data_size: u32,
    pub area_size: u32,
    pub total_items: u32,
}

impl BitmapHeader {
    pub const SIZE: usize = 0x18;

    pub fn parse(buf: &[u8]) -> Res<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortRead {
                expected: Self::SIZE,
                got: buf.len(),
            });
        }
        let (_rest, bmh) = Self::from_bytes((buf, 0))?;
        Ok(bmh)
    }
}

impl fmt::Display for BitmapHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  - Items per bitmap entry : {}",
            self.items_per_bitmap_entry
        )?;
        writeln!(
            f,
            "  - Bitmap entries per area: {}",
            self.bmp_entries_per_area
        )?;
        writeln!(f, "  - Header size            : {:#x}", self.hdr_size)?;
        writeln!(f, "  - Data size              : {:#x}", self.data_size)?;
        writeln!(f, "  - Area size              : {:#x}", self.area_size)?;
        writeln!(f, "  - Total items            : {}", self.total_items)
    }
}
