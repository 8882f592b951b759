//! Mounted-volume management: the open sequence, raw positioned I/O, and
//! the heartbeat scan.

use std::io;
use std::path::Path;

use log::debug;

use crate::dir;
use crate::file::File;
use crate::ondisk::{
    BitmapHeader, FDC_BASE, FSINFO_BASE, FileInfo, FileRecord, FsInfo, Heartbeat, VOLINFO_BASE,
    VolumeInfo,
};
use crate::{Error, Result};

/// Offset of the full-block data region, relative to the volume base.
const BLOCK_DATA_BASE: u64 = 0x100_0000;

/// Full block holding the heartbeat slots.
const HB_BLOCK: u32 = 3;

/// Bytes read when decoding a meta-file's bitmap header.
const BITMAP_HDR_LEN: usize = 512;

const FBB_FILENAME: &str = ".fbb.sf";
const FDC_FILENAME: &str = ".fdc.sf";
const PBC_FILENAME: &str = ".pbc.sf";
const SBC_FILENAME: &str = ".sbc.sf";
const VH_FILENAME: &str = ".vh.sf";

/// Positioned reads against a backing image.
///
/// Short reads return the actual count; only reads are ever issued.
pub trait ReadAt {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize>;
}

#[cfg(unix)]
impl ReadAt for std::fs::File {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, pos)
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if pos >= self.len() as u64 {
            return Ok(0);
        }
        let start = pos as usize;
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_slice().read_at(pos, buf)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(pos, buf)
    }
}

fn read_exact_at<S: ReadAt + ?Sized>(storage: &S, pos: u64, buf: &mut [u8]) -> Result<()> {
    let mut done = 0;
    while done < buf.len() {
        let n = storage.read_at(pos + done as u64, &mut buf[done..])?;
        if n == 0 {
            return Err(Error::ShortRead {
                expected: buf.len(),
                got: done,
            });
        }
        done += n;
    }
    Ok(())
}

/// An open VMFS volume.
///
/// The volume exclusively owns the backing storage and the meta-files
/// derived from it; [`File`]s opened through it are plain values that take
/// the volume by reference on every operation.
pub struct Volume<S> {
    storage: S,
    vmfs_base: u64,
    fdc_base: u64,
    vol_info: VolumeInfo,
    fs_info: FsInfo,
    fdc_bmh: BitmapHeader,
    root_dir: Option<File>,
    fbb: Option<File>,
    fdc: Option<File>,
    pbc: Option<File>,
    sbc: Option<File>,
    vh: Option<File>,
    fbb_bmh: Option<BitmapHeader>,
    pbc_bmh: Option<BitmapHeader>,
    sbc_bmh: Option<BitmapHeader>,
}

impl<S: ReadAt> Volume<S> {
    /// Open a volume: decode the fixed-offset descriptors, bootstrap the
    /// root directory out of the FDC region, then open the five well-known
    /// meta-files through it.
    pub fn open(storage: S) -> Result<Self> {
        let vmfs_base = VOLINFO_BASE;

        let mut buf = vec![0u8; VolumeInfo::SIZE];
        read_exact_at(&storage, vmfs_base, &mut buf)?;
        let vol_info = VolumeInfo::parse(&buf)?;
        debug!("volume information:\n{vol_info}");

        let mut buf = vec![0u8; FsInfo::SIZE];
        read_exact_at(&storage, vmfs_base + FSINFO_BASE, &mut buf)?;
        let fs_info = FsInfo::parse(&buf)?;
        debug!("filesystem information:\n{fs_info}");

        let fdc_base = vmfs_base + FDC_BASE;
        debug!("FDC base at {fdc_base:#x}");

        // The FDC is not readable through the file machinery yet, so its
        // bitmap header comes straight off the image.
        let mut buf = vec![0u8; BITMAP_HDR_LEN];
        read_exact_at(&storage, fdc_base, &mut buf)?;
        let fdc_bmh = BitmapHeader::parse(&buf)?;
        debug!("FDC bitmap:\n{fdc_bmh}");

        let mut vol = Volume {
            storage,
            vmfs_base,
            fdc_base,
            vol_info,
            fs_info,
            fdc_bmh,
            root_dir: None,
            fbb: None,
            fdc: None,
            pbc: None,
            sbc: None,
            vh: None,
            fbb_bmh: None,
            pbc_bmh: None,
            sbc_bmh: None,
        };

        // The root directory's meta-info is the first FDC item.
        let fmi_pos = vol.fdc_base + vol.fdc_bmh.area_data_addr(0);
        debug!("root directory meta-info at {fmi_pos:#x}");
        let mut fmi = vec![0u8; vol.fdc_bmh.data_size as usize];
        vol.read_data_exact(fmi_pos, &mut fmi)?;
        vol.root_dir = Some(File::bind(&vol, &fmi)?);

        let (fbb, bmh) = vol.open_meta_file(FBB_FILENAME, true)?;
        vol.fbb = Some(fbb);
        vol.fbb_bmh = bmh;

        let (fdc, bmh) = vol.open_meta_file(FDC_FILENAME, true)?;
        vol.fdc = Some(fdc);
        if let Some(bmh) = bmh {
            vol.fdc_bmh = bmh;
        }

        let (pbc, bmh) = vol.open_meta_file(PBC_FILENAME, true)?;
        vol.pbc = Some(pbc);
        vol.pbc_bmh = bmh;

        let (sbc, bmh) = vol.open_meta_file(SBC_FILENAME, true)?;
        vol.sbc = Some(sbc);
        vol.sbc_bmh = bmh;

        let (vh, _) = vol.open_meta_file(VH_FILENAME, false)?;
        vol.vh = Some(vh);

        debug!("volume opened successfully");
        Ok(vol)
    }

    pub fn vol_info(&self) -> &VolumeInfo {
        &self.vol_info
    }

    pub fn fs_info(&self) -> &FsInfo {
        &self.fs_info
    }

    pub fn block_size(&self) -> u64 {
        self.fs_info.block_size
    }

    pub fn fbb_bitmap(&self) -> Option<&BitmapHeader> {
        self.fbb_bmh.as_ref()
    }

    pub fn fdc_bitmap(&self) -> &BitmapHeader {
        &self.fdc_bmh
    }

    pub fn pbc_bitmap(&self) -> Option<&BitmapHeader> {
        self.pbc_bmh.as_ref()
    }

    pub fn sbc_bitmap(&self) -> Option<&BitmapHeader> {
        self.sbc_bmh.as_ref()
    }

    pub fn root_dir(&self) -> Option<&File> {
        self.root_dir.as_ref()
    }

    pub fn fbb_file(&self) -> Option<&File> {
        self.fbb.as_ref()
    }

    pub fn fdc_file(&self) -> Option<&File> {
        self.fdc.as_ref()
    }

    pub fn pbc_file(&self) -> Option<&File> {
        self.pbc.as_ref()
    }

    pub fn sbc_file(&self) -> Option<&File> {
        self.sbc.as_ref()
    }

    pub fn vh_file(&self) -> Option<&File> {
        self.vh.as_ref()
    }

    pub(crate) fn sbc(&self) -> Option<(&File, &BitmapHeader)> {
        self.sbc.as_ref().zip(self.sbc_bmh.as_ref())
    }

    pub(crate) fn pbc(&self) -> Option<(&File, &BitmapHeader)> {
        self.pbc.as_ref().zip(self.pbc_bmh.as_ref())
    }

    /// Read raw bytes at an absolute position. Returns the count actually
    /// read; short only at the end of the image.
    pub fn read_data(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.storage.read_at(pos + done as u64, &mut buf[done..])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    pub(crate) fn read_data_exact(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        read_exact_at(&self.storage, pos, buf)
    }

    /// Read from a full block, at `offset` bytes into it.
    pub fn read_block(&self, blk: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let pos = self.vmfs_base + BLOCK_DATA_BASE + blk as u64 * self.block_size() + offset;
        self.read_data(pos, buf)
    }

    /// Offset of a file's meta-info within the FDC file.
    pub(crate) fn meta_info_offset(&self, blk_id: u32) -> Result<u64> {
        use crate::block::{BlockType, fd_number, fd_subgroup};

        if BlockType::of(blk_id) != BlockType::FileDesc {
            return Err(Error::UnexpectedBlockType(blk_id));
        }
        let bmh = &self.fdc_bmh;
        let fdc_item = fd_subgroup(blk_id) * bmh.items_per_bitmap_entry;
        Ok(bmh.block_addr(fdc_item) + fd_number(blk_id) as u64 * bmh.data_size as u64)
    }

    /// Fetch a file's meta-info through the FDC file.
    pub(crate) fn fetch_meta_info(&self, blk_id: u32) -> Result<Vec<u8>> {
        let fdc = self.fdc.as_ref().ok_or(Error::UnexpectedBlockType(blk_id))?;
        let offset = self.meta_info_offset(blk_id)?;
        let mut buf = vec![0u8; self.fdc_bmh.data_size as usize];
        let n = fdc.read_at(self, offset, &mut buf)?;
        if n != buf.len() {
            return Err(Error::ShortRead {
                expected: buf.len(),
                got: n,
            });
        }
        Ok(buf)
    }

    /// Open one of the well-known meta-files by name. Until the FDC file
    /// itself is open its items are addressed raw, relative to the FDC base.
    fn open_meta_file(&self, name: &str, want_bmh: bool) -> Result<(File, Option<BitmapHeader>)> {
        let root = self
            .root_dir
            .as_ref()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let rec = dir::search(self, root, name)?;

        let fmi = if self.fdc.is_some() {
            self.fetch_meta_info(rec.block_id)?
        } else {
            let offset = self.meta_info_offset(rec.block_id)?;
            let mut buf = vec![0u8; FileInfo::SIZE];
            self.read_data_exact(self.fdc_base + offset, &mut buf)?;
            buf
        };
        let file = File::bind(self, &fmi)?;

        let bmh = if want_bmh {
            let mut buf = vec![0u8; BITMAP_HDR_LEN];
            let n = file.read_at(self, 0, &mut buf)?;
            if n != buf.len() {
                return Err(Error::ShortRead {
                    expected: buf.len(),
                    got: n,
                });
            }
            Some(BitmapHeader::parse(&buf)?)
        } else {
            None
        };

        Ok((file, bmh))
    }

    /// Open a file from one of its directory records.
    pub fn open_record(&self, rec: &FileRecord) -> Result<File> {
        let fmi = self.fetch_meta_info(rec.block_id)?;
        File::bind(self, &fmi)
    }

    /// Resolve a slash-separated path from the root directory and open the
    /// file it names. Empty segments are skipped; the empty path is the
    /// root directory itself.
    pub fn open_file(&self, path: &str) -> Result<File> {
        let root = self
            .root_dir
            .as_ref()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(root.clone());
        };

        let mut cur = root.clone();
        for segment in parents {
            let rec = dir::search(self, &cur, segment)?;
            cur = self.open_record(&rec)?;
        }
        let rec = dir::search(self, &cur, last)?;
        self.open_record(&rec)
    }

    /// Scan the heartbeat region and return the slots claimed by a live
    /// host. Purely informational; nothing is interpreted.
    pub fn active_heartbeats(&self) -> Result<Vec<Heartbeat>> {
        let mut active = Vec::new();
        let mut buf = [0u8; Heartbeat::SIZE];
        let mut pos = 0;
        while pos < self.block_size() {
            let n = self.read_block(HB_BLOCK, pos, &mut buf)?;
            if n != buf.len() {
                return Err(Error::ShortRead {
                    expected: buf.len(),
                    got: n,
                });
            }
            let hb = Heartbeat::parse(&buf)?;
            if hb.is_active() {
                active.push(hb);
            }
            pos += buf.len() as u64;
        }
        Ok(active)
    }
}

#[cfg(unix)]
impl Volume<std::fs::File> {
    /// Open a volume image from the filesystem.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(std::fs::File::open(path)?)
    }
}
