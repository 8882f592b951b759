//! Directory scanning.
//!
//! A directory is an ordinary file whose body is a tightly packed array of
//! [`FileRecord`]s.

use crate::file::File;
use crate::ondisk::FileRecord;
use crate::volume::{ReadAt, Volume};
use crate::{Error, Result};

/// Number of records in a directory file.
pub fn record_count(dir: &File) -> u64 {
    dir.size() / FileRecord::SIZE as u64
}

/// Find the record named `name`, comparing the full NUL-trimmed name.
///
/// Exactly `record_count` records are examined; a directory without the
/// name is `NotFound`, never an endless scan.
pub fn search<S: ReadAt>(vol: &Volume<S>, dir: &File, name: &str) -> Result<FileRecord> {
    let mut buf = [0u8; FileRecord::SIZE];
    for i in 0..record_count(dir) {
        read_record(vol, dir, i, &mut buf)?;
        let rec = FileRecord::parse(&buf)?;
        if rec.name() == name {
            return Ok(rec);
        }
    }
    Err(Error::NotFound(name.to_string()))
}

/// All records of a directory, in storage order.
pub fn read_dir<S: ReadAt>(vol: &Volume<S>, dir: &File) -> Result<Vec<FileRecord>> {
    let mut buf = [0u8; FileRecord::SIZE];
    let mut records = Vec::with_capacity(record_count(dir) as usize);
    for i in 0..record_count(dir) {
        read_record(vol, dir, i, &mut buf)?;
        records.push(FileRecord::parse(&buf)?);
    }
    Ok(records)
}

fn read_record<S: ReadAt>(vol: &Volume<S>, dir: &File, index: u64, buf: &mut [u8]) -> Result<()> {
    let n = dir.read_at(vol, index * FileRecord::SIZE as u64, buf)?;
    if n != buf.len() {
        return Err(Error::ShortRead {
            expected: buf.len(),
            got: n,
        });
    }
    Ok(())
}
