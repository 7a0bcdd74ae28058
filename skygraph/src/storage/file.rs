/*
 * Created on Tue Mar 04 2025
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

//! # The slot file
//!
//! [`SlotFile`] owns the descriptor, the decoded header and the live counters, and
//! hands out slots. Allocation pops the freelist if it has anything, else takes the
//! tail slot, growing the file to the next page boundary when the new slot would cross
//! the current length. Freeing overwrites the slot with a tombstone that chains to the
//! previous freelist head, so reuse is LIFO.
//!
//! The counters are written through to the dynamic block by [`SlotFile::commit`] at the
//! end of every mutating operation, without an fsync; durability is the caller's call
//! via [`SlotFile::fsync`].

use {
    super::{
        fs::RawFile,
        record::{
            decode_tombstone, encode_tombstone, EdgeLink, EdgeRecord, NodeLink, NodeRecord,
            SlotKind,
        },
        spec::{DynState, Header, Settings},
    },
    crate::{
        error::{CorruptKind, RuntimeResult},
        util::os,
    },
};

/// Tail growth quantum. Extending by whole pages keeps the tail slot writes from
/// repeatedly resizing the file.
pub const PAGE_SIZE: u64 = 4096;

#[derive(Debug)]
pub struct SlotFile {
    fd: RawFile,
    writable: bool,
    header: Header,
    state: DynState,
    file_len: u64,
}

impl SlotFile {
    /// Create a fresh graph file: truncate, zero the directory region and write both
    /// header blocks
    pub fn create(path: &str, settings: Settings) -> RuntimeResult<Self> {
        settings.validate()?;
        let fd = RawFile::create(path)?;
        os::lock_file(fd.inner())?;
        let header = Header::new(settings);
        let state = DynState::initial();
        let file_len = settings.slots_offset();
        fd.set_len(file_len)?;
        fd.write_all_at(0, &header.encode())?;
        fd.write_all_at(DynState::OFFSET, &state.encode())?;
        fd.sync_all()?;
        log::debug!(
            "created graph file `{path}`: table_size={}, max_key_len={}, record_size={}",
            settings.table_size(),
            settings.max_key_len(),
            settings.record_size()
        );
        Ok(Self {
            fd,
            writable: true,
            header,
            state,
            file_len,
        })
    }
    /// Open an existing graph file, validating both header blocks and the gross
    /// geometry before anything else is read
    pub fn open(path: &str, writable: bool) -> RuntimeResult<Self> {
        let fd = if writable {
            let fd = RawFile::open_rw(path)?;
            os::lock_file(fd.inner())?;
            fd
        } else {
            RawFile::open_ro(path)?
        };
        let mut static_block = [0u8; Header::STATIC_SIZE];
        fd.read_exact_at(0, &mut static_block)?;
        let header = Header::decode(static_block)?;
        let mut dyn_block = [0u8; DynState::SIZE];
        fd.read_exact_at(DynState::OFFSET, &mut dyn_block)?;
        let state = DynState::decode(dyn_block)?;
        let file_len = fd.len()?;
        if file_len < header.settings().slot_offset(state.tail) {
            return Err(CorruptKind::HeaderGeometry.into());
        }
        log::debug!(
            "opened graph file `{path}` ({} nodes, {} edges, writable={writable})",
            state.n_nodes,
            state.n_edges
        );
        Ok(Self {
            fd,
            writable,
            header,
            state,
            file_len,
        })
    }

    pub fn settings(&self) -> &Settings {
        self.header.settings()
    }
    pub fn state(&self) -> &DynState {
        &self.state
    }
    pub fn state_mut(&mut self) -> &mut DynState {
        debug_assert!(self.writable);
        &mut self.state
    }
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Bounds-check a slot index against the live range and return its byte offset
    fn checked_offset(&self, index: u64) -> RuntimeResult<u64> {
        if index == 0 || index >= self.state.tail {
            return Err(CorruptKind::PointerRange.into());
        }
        Ok(self.header.settings().slot_offset(index))
    }
    fn record_size(&self) -> usize {
        self.header.settings().record_size() as usize
    }
    fn read_slot(&self, index: u64) -> RuntimeResult<Vec<u8>> {
        let offset = self.checked_offset(index)?;
        let mut buf = vec![0u8; self.record_size()];
        self.fd.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /*
        record i/o
    */

    pub fn read_kind(&self, index: u64) -> RuntimeResult<SlotKind> {
        let offset = self.checked_offset(index)?;
        let mut kind = [0u8; 1];
        self.fd.read_exact_at(offset, &mut kind)?;
        SlotKind::try_from_raw(kind[0]).ok_or_else(|| CorruptKind::RecordKind.into())
    }
    pub fn read_node(&self, index: u64) -> RuntimeResult<NodeRecord> {
        let buf = self.read_slot(index)?;
        let node = NodeRecord::decode(self.header.settings(), &buf)?;
        // the stored position must agree with where we found the record
        if node.pos != index {
            return Err(CorruptKind::PointerRange.into());
        }
        Ok(node)
    }
    pub fn read_edge(&self, index: u64) -> RuntimeResult<EdgeRecord> {
        let buf = self.read_slot(index)?;
        EdgeRecord::decode(self.header.settings(), &buf)
    }
    /// Read the next-free pointer of a tombstone slot
    pub fn read_tombstone(&self, index: u64) -> RuntimeResult<u64> {
        let buf = self.read_slot(index)?;
        decode_tombstone(&buf)
    }
    pub fn write_node(&mut self, node: &NodeRecord) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        let offset = self.checked_offset(node.pos)?;
        let mut buf = vec![0u8; self.record_size()];
        node.encode(self.header.settings(), &mut buf);
        self.fd.write_all_at(offset, &buf)?;
        Ok(())
    }
    pub fn write_edge(&mut self, index: u64, edge: &EdgeRecord) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        let offset = self.checked_offset(index)?;
        let mut buf = vec![0u8; self.record_size()];
        edge.encode(self.header.settings(), &mut buf);
        self.fd.write_all_at(offset, &buf)?;
        Ok(())
    }

    /*
        link i/o

        Tree surgery rewrites single pointer fields in place. Going through targeted
        8-byte writes (instead of read-modify-write of whole records) means two
        insertion points living on the same slot can never clobber each other.
    */

    pub fn write_node_link(&mut self, index: u64, link: NodeLink, value: u64) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        let offset = self.checked_offset(index)? + link.offset() as u64;
        self.fd.write_all_at(offset, &value.to_le_bytes())?;
        Ok(())
    }
    pub fn write_edge_link(&mut self, index: u64, link: EdgeLink, value: u64) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        let offset = self.checked_offset(index)? + link.offset() as u64;
        self.fd.write_all_at(offset, &value.to_le_bytes())?;
        Ok(())
    }
    pub fn write_node_attrs(&mut self, index: u64, attrs: &[u8]) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        debug_assert_eq!(attrs.len(), self.settings().node_attr_size() as usize);
        let offset =
            self.checked_offset(index)? + NodeRecord::attr_offset(self.header.settings()) as u64;
        self.fd.write_all_at(offset, attrs)?;
        Ok(())
    }
    pub fn write_edge_attrs(&mut self, index: u64, attrs: &[u8]) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        debug_assert_eq!(attrs.len(), self.settings().edge_attr_size() as usize);
        let offset = self.checked_offset(index)? + EdgeRecord::attr_offset() as u64;
        self.fd.write_all_at(offset, attrs)?;
        Ok(())
    }

    /*
        allocation
    */

    /// Hand out a slot: freelist head first, tail otherwise. The slot contents are
    /// whatever was there before; the caller must fully write its record.
    pub fn alloc(&mut self) -> RuntimeResult<u64> {
        debug_assert!(self.writable);
        if self.state.freelist_head != 0 {
            let index = self.state.freelist_head;
            let buf = self.read_slot(index)?;
            let next = decode_tombstone(&buf).map_err(|_| CorruptKind::Freelist)?;
            if !okay!(next == 0 || next < self.state.tail, next != index) {
                return Err(CorruptKind::Freelist.into());
            }
            self.state.freelist_head = next;
            return Ok(index);
        }
        let index = self.state.tail;
        let needed = self.header.settings().slot_offset(index + 1);
        if needed > self.file_len {
            let new_len = needed.next_multiple_of(PAGE_SIZE);
            self.fd.set_len(new_len)?;
            self.file_len = new_len;
        }
        self.state.tail += 1;
        Ok(index)
    }
    /// Turn the slot into a tombstone and push it onto the freelist
    pub fn free(&mut self, index: u64) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        let offset = self.checked_offset(index)?;
        let mut buf = vec![0u8; self.record_size()];
        encode_tombstone(self.state.freelist_head, &mut buf);
        self.fd.write_all_at(offset, &buf)?;
        self.state.freelist_head = index;
        Ok(())
    }

    /*
        bucket directory
    */

    fn directory_entry_offset(&self, bucket: u64) -> RuntimeResult<u64> {
        if bucket >= self.header.settings().table_size() {
            return Err(CorruptKind::PointerRange.into());
        }
        Ok(self.header.settings().directory_offset() + bucket * sizeof!(u64) as u64)
    }
    pub fn bucket_root(&self, bucket: u64) -> RuntimeResult<u64> {
        let offset = self.directory_entry_offset(bucket)?;
        let mut buf = [0u8; 8];
        self.fd.read_exact_at(offset, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
    pub fn set_bucket_root(&mut self, bucket: u64, index: u64) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        let offset = self.directory_entry_offset(bucket)?;
        self.fd.write_all_at(offset, &index.to_le_bytes())?;
        Ok(())
    }

    /*
        state write-through
    */

    /// Write the dynamic block through to disk (no fsync)
    pub fn commit(&mut self) -> RuntimeResult<()> {
        debug_assert!(self.writable);
        self.fd
            .write_all_at(DynState::OFFSET, &self.state.encode())?;
        Ok(())
    }
    pub fn fsync(&self) -> RuntimeResult<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{SlotFile, PAGE_SIZE},
        crate::{
            error::{CorruptKind, GraphError},
            storage::spec::Settings,
            util::test_utils::TestFile,
        },
    };

    fn settings() -> Settings {
        Settings::new(4, 8)
    }

    #[test]
    fn alloc_is_tail_then_lifo_freelist() {
        let tf = TestFile::new("slotfile_alloc");
        let mut f = SlotFile::create(tf.path(), settings()).unwrap();
        assert_eq!(f.alloc().unwrap(), 1);
        assert_eq!(f.alloc().unwrap(), 2);
        assert_eq!(f.alloc().unwrap(), 3);
        f.free(2).unwrap();
        f.free(1).unwrap();
        // LIFO: the most recently freed slot comes back first
        assert_eq!(f.alloc().unwrap(), 1);
        assert_eq!(f.alloc().unwrap(), 2);
        // freelist drained: back to the tail
        assert_eq!(f.alloc().unwrap(), 4);
    }

    #[test]
    fn tail_growth_is_page_aligned() {
        let tf = TestFile::new("slotfile_growth");
        let mut f = SlotFile::create(tf.path(), settings()).unwrap();
        for _ in 0..100 {
            f.alloc().unwrap();
        }
        let len = std::fs::metadata(tf.path()).unwrap().len();
        assert_eq!(len % PAGE_SIZE, 0);
        assert!(len >= f.settings().slot_offset(101));
    }

    #[test]
    fn state_survives_reopen() {
        let tf = TestFile::new("slotfile_reopen");
        {
            let mut f = SlotFile::create(tf.path(), settings()).unwrap();
            for _ in 0..5 {
                f.alloc().unwrap();
            }
            f.free(3).unwrap();
            f.state_mut().next_id = 17;
            f.commit().unwrap();
        }
        let f = SlotFile::open(tf.path(), false).unwrap();
        assert_eq!(f.settings(), &settings());
        assert_eq!(f.state().tail, 6);
        assert_eq!(f.state().freelist_head, 3);
        assert_eq!(f.state().next_id, 17);
    }

    #[test]
    fn out_of_range_slot_is_corruption() {
        let tf = TestFile::new("slotfile_range");
        let f = SlotFile::create(tf.path(), settings()).unwrap();
        assert_eq!(
            f.read_kind(0).unwrap_err(),
            GraphError::Corrupted(CorruptKind::PointerRange)
        );
        assert_eq!(
            f.read_kind(1).unwrap_err(),
            GraphError::Corrupted(CorruptKind::PointerRange)
        );
    }

    #[test]
    fn bucket_directory_round_trip() {
        let tf = TestFile::new("slotfile_dir");
        let mut f = SlotFile::create(tf.path(), settings()).unwrap();
        for b in 0..4 {
            assert_eq!(f.bucket_root(b).unwrap(), 0);
        }
        f.set_bucket_root(2, 9).unwrap();
        assert_eq!(f.bucket_root(2).unwrap(), 9);
        assert_eq!(
            f.bucket_root(4).unwrap_err(),
            GraphError::Corrupted(CorruptKind::PointerRange)
        );
    }
}
