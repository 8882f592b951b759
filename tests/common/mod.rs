//! Builder for a small synthetic VMFS image, laid out with 1 MiB blocks.
//!
//! The full-block data region starts at `vmfs_base + 0x100_0000`, so full
//! block 3 coincides with the heartbeat region and full blocks 4-5 host the
//! file-descriptor container. The builder populates the fixed descriptors,
//! the FDC items for the root directory, the five meta-files and a handful
//! of test files, and fills their data blocks with recognizable patterns.

use vmfsrust::block::{fb_id, fd_id, pb_id, sb_id};
use vmfsrust::ondisk::{FSINFO_MAGIC, HB_MAGIC_OFF, HB_MAGIC_ON, VOLINFO_MAGIC};

pub const BLOCK_SIZE: u64 = 0x10_0000;
pub const VMFS_BASE: u64 = 0x10_0000;
pub const DATA_BASE: u64 = VMFS_BASE + 0x100_0000;
pub const FDC_BASE: u64 = VMFS_BASE + 0x140_0000;

// FDC geometry: 4 bitmap entries per area, 8 items each, 0x800-byte items.
pub const FDC_ITEMS_PER_ENTRY: u32 = 8;
pub const FDC_BMP_PER_AREA: u32 = 4;
pub const FDC_HDR_SIZE: u32 = 0x1000;
pub const FDC_DATA_SIZE: u32 = 0x800;
pub const FDC_AREA_SIZE: u32 = 0x11000;
pub const FDC_AREA_DATA: u64 = FDC_HDR_SIZE as u64 + FDC_BMP_PER_AREA as u64 * 0x400;

// SBC geometry: 0x40-byte sub-blocks.
pub const SBC_ITEMS_PER_ENTRY: u32 = 16;
pub const SBC_DATA_SIZE: u32 = 0x40;

// PBC geometry: 0x10-byte pointer blocks, i.e. four child ids each.
pub const PBC_ITEMS_PER_ENTRY: u32 = 16;
pub const PBC_DATA_SIZE: u32 = 0x10;

pub const SB_PAYLOAD: &[u8] = b"Hello from a sub-block.";

/// Sub-block id used by `Test1/Test1.vmx`: subgroup 1, number 2.
pub const VMX_SB_ID: (u32, u32) = (1, 2);

/// Full blocks behind `big.bin`'s pointer block.
pub const BIG_BLOCKS: [u32; 4] = [16, 17, 18, 19];

/// Full block behind `flat.bin`.
pub const FLAT_BLOCK: u32 = 20;

/// Real full blocks of `sparse.bin`; positions 1 and 3 are holes.
pub const SPARSE_BLOCKS: [u32; 2] = [21, 22];

/// Absolute offset of full block `n`.
pub fn fb_offset(n: u32) -> u64 {
    DATA_BASE + n as u64 * BLOCK_SIZE
}

/// Absolute offset of FDC item `k` (first area only).
pub fn fdc_item_offset(k: u32) -> u64 {
    FDC_BASE + FDC_AREA_DATA + k as u64 * FDC_DATA_SIZE as u64
}

pub struct Image {
    pub data: Vec<u8>,
}

impl Image {
    fn put(&mut self, at: u64, bytes: &[u8]) {
        let at = at as usize;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn put_u32(&mut self, at: u64, v: u32) {
        self.put(at, &v.to_le_bytes());
    }

    fn put_u64(&mut self, at: u64, v: u64) {
        self.put(at, &v.to_le_bytes());
    }

    fn bitmap_header(&mut self, at: u64, fields: [u32; 6]) {
        for (i, v) in fields.into_iter().enumerate() {
            self.put_u32(at + i as u64 * 4, v);
        }
    }

    /// Write the meta-info of FDC item `k`.
    fn meta_info(&mut self, k: u32, kind: u32, size: u64, blocks: &[u32]) {
        let at = fdc_item_offset(k);
        self.put_u32(at + 0x200, k);
        self.put_u32(at + 0x20c, kind);
        self.put_u64(at + 0x214, size);
        for (i, &blk) in blocks.iter().enumerate() {
            self.put_u32(at + 0x400 + i as u64 * 4, blk);
        }
    }

    fn dir_records(&mut self, at: u64, records: &[(u32, u32, &str)]) {
        for (i, &(kind, block_id, name)) in records.iter().enumerate() {
            let rec = at + i as u64 * 0x8c;
            self.put_u32(rec, kind);
            self.put_u32(rec + 4, block_id);
            self.put_u32(rec + 8, i as u32);
            self.put(rec + 0xc, name.as_bytes());
        }
    }

    fn fill_block(&mut self, n: u32, seed: u8) {
        let start = fb_offset(n) as usize;
        for (i, b) in self.data[start..start + BLOCK_SIZE as usize]
            .iter_mut()
            .enumerate()
        {
            *b = seed.wrapping_add((i % 251) as u8);
        }
    }
}

/// Build the standard well-formed test image.
pub fn build() -> Vec<u8> {
    let blocks = 23u32;
    let len = fb_offset(blocks) as usize;
    let mut img = Image {
        data: vec![0u8; len],
    };

    // Volume information.
    img.put_u32(VMFS_BASE, VOLINFO_MAGIC);
    img.put_u32(VMFS_BASE + 0x04, 3);
    img.put(VMFS_BASE + 0x12, b"testvol");
    img.put(VMFS_BASE + 0x82, &[0x11; 16]);
    img.put_u64(VMFS_BASE + 0x200, len as u64);
    img.put_u64(VMFS_BASE + 0x208, blocks as u64);

    // Filesystem information.
    let fsinfo = VMFS_BASE + 0x120_0000;
    img.put_u32(fsinfo, FSINFO_MAGIC);
    img.put_u32(fsinfo + 0x04, 12);
    img.put(fsinfo + 0x08, &[5]);
    img.put(fsinfo + 0x09, &[0x22; 16]);
    img.put(fsinfo + 0x1d, b"testfs");
    img.put_u32(fsinfo + 0xa1, BLOCK_SIZE as u32);

    // Two heartbeat slots in full block 3: one live, one released.
    let hb = fb_offset(3);
    img.put_u32(hb, HB_MAGIC_ON);
    img.put_u64(hb + 0x04, 0x1200);
    img.put_u64(hb + 0x14, 86_400_000_000);
    img.put(hb + 0x1c, &[0x33; 16]);
    img.put_u32(hb + 0x200, HB_MAGIC_OFF);
    img.put_u64(hb + 0x204, 0x1400);

    // FDC bitmap header, straight at the FDC base.
    img.bitmap_header(
        FDC_BASE,
        [
            FDC_ITEMS_PER_ENTRY,
            FDC_BMP_PER_AREA,
            FDC_HDR_SIZE,
            FDC_DATA_SIZE,
            FDC_AREA_SIZE,
            64,
        ],
    );

    // Root directory: FDC item 0, one full block of records.
    let root_records: &[(u32, u32, &str)] = &[
        (4, fd_id(0, 1), ".fbb.sf"),
        (4, fd_id(0, 2), ".fdc.sf"),
        (4, fd_id(0, 3), ".pbc.sf"),
        (4, fd_id(0, 4), ".sbc.sf"),
        (4, fd_id(0, 5), ".vh.sf"),
        (2, fd_id(0, 6), "Test1"),
        (3, fd_id(1, 0), "big.bin"),
        (3, fd_id(1, 1), "flat.bin"),
        (3, fd_id(1, 2), "sparse.bin"),
        (3, fd_id(1, 3), "badblk.bin"),
    ];
    img.meta_info(0, 2, root_records.len() as u64 * 0x8c, &[fb_id(8)]);
    img.dir_records(fb_offset(8), root_records);

    // The five meta-files.
    img.meta_info(1, 4, 0x1_0000, &[fb_id(9)]);
    img.meta_info(2, 4, 2 * BLOCK_SIZE, &[fb_id(4), fb_id(5)]);
    img.meta_info(3, 4, 0x1_0000, &[fb_id(10)]);
    img.meta_info(4, 4, 0x1_0000, &[fb_id(11)]);
    img.meta_info(5, 4, 0x1000, &[fb_id(12)]);

    // FBB bitmap header (only ever displayed).
    img.bitmap_header(fb_offset(9), [32, 16, 0x1000, 0x400, 0x5000, 512]);

    // PBC: pointer-block items of four child ids each.
    img.bitmap_header(
        fb_offset(10),
        [PBC_ITEMS_PER_ENTRY, 4, 0x1000, PBC_DATA_SIZE, 0x1400, 64],
    );
    // Item 16 (= number 1 * 16 + subgroup 0): big.bin's children.
    let item16 = fb_offset(10) + 0x2000 + 16 * PBC_DATA_SIZE as u64;
    for (i, &blk) in BIG_BLOCKS.iter().enumerate() {
        img.put_u32(item16 + i as u64 * 4, fb_id(blk));
    }
    // Item 32 (= number 2 * 16 + subgroup 0): sparse.bin, holes at 1 and 3.
    let item32 = fb_offset(10) + 0x2000 + 32 * PBC_DATA_SIZE as u64;
    img.put_u32(item32, fb_id(SPARSE_BLOCKS[0]));
    img.put_u32(item32 + 8, fb_id(SPARSE_BLOCKS[1]));

    // SBC: 0x40-byte sub-blocks.
    img.bitmap_header(
        fb_offset(11),
        [SBC_ITEMS_PER_ENTRY, 4, 0x1000, SBC_DATA_SIZE, 0x2000, 64],
    );
    // Item 33 (= number 2 * 16 + subgroup 1) carries the vmx payload.
    let item33 = fb_offset(11) + 0x2000 + 33 * SBC_DATA_SIZE as u64;
    img.put(item33, SB_PAYLOAD);

    // VH: opened but never addressed through a bitmap.
    img.put(fb_offset(12), b"volume headers");

    // Test1 directory with the one file.
    img.meta_info(6, 2, 0x8c, &[fb_id(13)]);
    img.dir_records(fb_offset(13), &[(3, fd_id(0, 7), "Test1.vmx")]);
    img.meta_info(
        7,
        3,
        SB_PAYLOAD.len() as u64,
        &[sb_id(VMX_SB_ID.0, VMX_SB_ID.1)],
    );

    // big.bin: four full blocks behind one pointer block.
    img.meta_info(8, 3, 4 * BLOCK_SIZE, &[pb_id(0, 1)]);
    for (i, &blk) in BIG_BLOCKS.iter().enumerate() {
        img.fill_block(blk, 0x10 * (i as u8 + 1));
    }

    // flat.bin: one direct full block.
    img.meta_info(9, 3, BLOCK_SIZE, &[fb_id(FLAT_BLOCK)]);
    img.fill_block(FLAT_BLOCK, 0x77);

    // sparse.bin: pointer block with holes.
    img.meta_info(10, 3, 4 * BLOCK_SIZE, &[pb_id(0, 2)]);
    img.fill_block(SPARSE_BLOCKS[0], 0xa0);
    img.fill_block(SPARSE_BLOCKS[1], 0xb0);

    // badblk.bin: a file-descriptor id where only data blocks are valid.
    img.meta_info(11, 3, 0x100, &[fd_id(0, 1)]);

    img.data
}
