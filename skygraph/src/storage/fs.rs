/*
 * Created on Wed Feb 05 2025
 *
 * This file is a part of Skygraph
 * Skygraph is a free and open-source embedded graph database that keeps
 * an entire labeled directed graph in a single on-disk file, written by
 * Sayan Nandan ("the Author") with the vision of making very large
 * graphs cheap to store and fast to walk on ordinary machines.
 *
 * Copyright (c) 2025, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

/*
    file system
*/

use {crate::IoResult, std::fs as std_fs};

/// A file accessed exclusively through positioned reads and writes. Nothing here moves
/// a shared cursor, which is what lets read paths run off `&self` (and lets any number
/// of iterators borrow the same handle).
#[derive(Debug)]
pub struct RawFile {
    f: std_fs::File,
}

impl RawFile {
    /// Create (or truncate) the file at `path`, read-write
    pub fn create(path: &str) -> IoResult<Self> {
        let f = std_fs::File::options()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self { f })
    }
    /// Open an existing file, read-write
    pub fn open_rw(path: &str) -> IoResult<Self> {
        let f = std_fs::File::options().read(true).write(true).open(path)?;
        Ok(Self { f })
    }
    /// Open an existing file, read-only
    pub fn open_ro(path: &str) -> IoResult<Self> {
        let f = std_fs::File::options().read(true).open(path)?;
        Ok(Self { f })
    }
    pub fn inner(&self) -> &std_fs::File {
        &self.f
    }
    pub fn len(&self) -> IoResult<u64> {
        self.f.metadata().map(|md| md.len())
    }
    /// Grow (or shrink) the file to `new_len` bytes; growth reads back as zeroes
    pub fn set_len(&self, new_len: u64) -> IoResult<()> {
        self.f.set_len(new_len)
    }
    pub fn sync_all(&self) -> IoResult<()> {
        self.f.sync_all()
    }
}

#[cfg(unix)]
impl RawFile {
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<()> {
        std::os::unix::fs::FileExt::read_exact_at(&self.f, buf, offset)
    }
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> IoResult<()> {
        std::os::unix::fs::FileExt::write_all_at(&self.f, buf, offset)
    }
}

#[cfg(windows)]
impl RawFile {
    pub fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> IoResult<()> {
        use std::{io, os::windows::fs::FileExt};
        while !buf.is_empty() {
            match self.f.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
    pub fn write_all_at(&self, mut offset: u64, mut buf: &[u8]) -> IoResult<()> {
        use std::{io, os::windows::fs::FileExt};
        while !buf.is_empty() {
            match self.f.seek_write(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
