/*
 * Created on Tue Feb 11 2025
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

//! # Header blocks
//!
//! The first 128 bytes of every skygraph file. Split in two:
//!
//! - the *static block* (64B): magic, header/engine versions, byte order and the
//!   creation parameters. Written once, never touched again; every later open decodes
//!   and cross-checks it.
//! - the *dynamic block* (64B): live counters under a CRC-64 line. Rewritten on every
//!   structural mutation, so after a clean shutdown it always matches the slots.
//!
//! All integers are little-endian. The endian tag exists so a future build could accept
//! foreign files; today decode simply refuses anything that is not little-endian.

use {
    super::{
        memcpy,
        record::{EDGE_BASE, NODE_BASE, TOMB_SIZE},
    },
    crate::error::{CorruptKind, GraphError, RuntimeResult},
    crc::{Crc, CRC_64_XZ},
    std::ops::Range,
};

/// The 8B magic block: `b"skygraph"` read as a little-endian word
pub const SKYGRAPH_MAGIC: u64 = u64::from_le_bytes(*b"skygraph");

pub const HEADER_V1: HeaderVersion = HeaderVersion(0);
pub const ENGINE_V0: EngineVersion = EngineVersion(0);

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
/// The header layout version. Barely ever changes.
pub struct HeaderVersion(u64);

impl HeaderVersion {
    pub const fn little_endian(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
/// The engine version that wrote the file; bumped when slot semantics change
pub struct EngineVersion(u64);

impl EngineVersion {
    pub const fn little_endian(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

tagged_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    /// Byte order tag
    pub enum EndianTag: u8 {
        Big = 0,
        Little = 1,
    }
}

/*
    creation parameters
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Creation-time parameters of a graph file. Fixed forever once the file exists;
/// reopening reads them back from the static block and refuses overrides.
pub struct Settings {
    table_size: u64,
    max_key_len: u64,
    node_attr_size: u32,
    edge_attr_size: u32,
}

impl Settings {
    /// A graph with `table_size` key buckets and keys of at most `max_key_len` bytes,
    /// with no user attributes. A reasonable table size is the expected node count
    /// divided by the tree depth you are willing to pay.
    pub const fn new(table_size: u64, max_key_len: u64) -> Self {
        Self {
            table_size,
            max_key_len,
            node_attr_size: 0,
            edge_attr_size: 0,
        }
    }
    /// Reserve fixed attribute regions on every node and edge record. The engine never
    /// interprets these bytes; encode them however you like, they come back verbatim.
    pub const fn with_attrs(mut self, node_attr_size: u32, edge_attr_size: u32) -> Self {
        self.node_attr_size = node_attr_size;
        self.edge_attr_size = edge_attr_size;
        self
    }
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.table_size == 0 || self.table_size > (1 << 30) {
            return Err(GraphError::BadSettings("table size"));
        }
        if self.max_key_len == 0 || self.max_key_len > (1 << 16) {
            return Err(GraphError::BadSettings("max key length"));
        }
        if self.node_attr_size > (1 << 24) || self.edge_attr_size > (1 << 24) {
            return Err(GraphError::BadSettings("attribute size"));
        }
        Ok(())
    }
    pub const fn table_size(&self) -> u64 {
        self.table_size
    }
    pub const fn max_key_len(&self) -> u64 {
        self.max_key_len
    }
    pub const fn node_attr_size(&self) -> u32 {
        self.node_attr_size
    }
    pub const fn edge_attr_size(&self) -> u32 {
        self.edge_attr_size
    }
    /// The uniform slot size: the largest of the three record layouts. Uniformity is
    /// what lets the freelist recycle any slot as any record kind.
    pub const fn record_size(&self) -> u64 {
        let node = (NODE_BASE as u64) + self.max_key_len + self.node_attr_size as u64;
        let edge = (EDGE_BASE as u64) + self.edge_attr_size as u64;
        let mut max = TOMB_SIZE as u64;
        if node > max {
            max = node;
        }
        if edge > max {
            max = edge;
        }
        max
    }
    /// Byte offset of the bucket directory
    pub const fn directory_offset(&self) -> u64 {
        Header::SIZE as u64
    }
    pub const fn directory_len(&self) -> u64 {
        self.table_size * sizeof!(u64) as u64
    }
    /// Byte offset of slot 1
    pub const fn slots_offset(&self) -> u64 {
        self.directory_offset() + self.directory_len()
    }
    /// Byte offset of a (1-based) slot index
    pub const fn slot_offset(&self, index: u64) -> u64 {
        self.slots_offset() + (index - 1) * self.record_size()
    }
}

/*
    static block
*/

#[derive(Debug, PartialEq)]
/// The decoded static block
pub struct Header {
    settings: Settings,
}

impl Header {
    const SEG1_MAGIC: Range<usize> = 0..8;
    const SEG1_HEADER_VERSION: Range<usize> = 8..16;
    const SEG1_ENGINE_VERSION: Range<usize> = 16..24;
    const SEG2_ENDIAN: usize = 24;
    // 25..32 reserved
    const SEG2_TABLE_SIZE: Range<usize> = 32..40;
    const SEG2_MAX_KEY_LEN: Range<usize> = 40..48;
    const SEG2_NODE_ATTR: Range<usize> = 48..52;
    const SEG2_EDGE_ATTR: Range<usize> = 52..56;
    const SEG2_RECORD_SIZE: Range<usize> = 56..64;
    /// Size of the static block
    pub const STATIC_SIZE: usize = 64;
    /// Size of the full header region (static + dynamic)
    pub const SIZE: usize = Self::STATIC_SIZE + DynState::SIZE;

    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn encode(&self) -> [u8; 64] {
        let s = &self.settings;
        let mut ret = [0u8; 64];
        ret[Self::SEG1_MAGIC].copy_from_slice(&SKYGRAPH_MAGIC.to_le_bytes());
        ret[Self::SEG1_HEADER_VERSION].copy_from_slice(&HEADER_V1.little_endian());
        ret[Self::SEG1_ENGINE_VERSION].copy_from_slice(&ENGINE_V0.little_endian());
        ret[Self::SEG2_ENDIAN] = EndianTag::Little.dscr();
        ret[Self::SEG2_TABLE_SIZE].copy_from_slice(&s.table_size.to_le_bytes());
        ret[Self::SEG2_MAX_KEY_LEN].copy_from_slice(&s.max_key_len.to_le_bytes());
        ret[Self::SEG2_NODE_ATTR].copy_from_slice(&s.node_attr_size.to_le_bytes());
        ret[Self::SEG2_EDGE_ATTR].copy_from_slice(&s.edge_attr_size.to_le_bytes());
        ret[Self::SEG2_RECORD_SIZE].copy_from_slice(&s.record_size().to_le_bytes());
        ret
    }
    /// Decode and validate a static block. Anything that fails here is a reason to not
    /// touch the rest of the file.
    pub fn decode(block: [u8; 64]) -> RuntimeResult<Self> {
        let raw_magic = u64::from_le_bytes(memcpy(&block[Self::SEG1_MAGIC]));
        let raw_header_version =
            HeaderVersion(u64::from_le_bytes(memcpy(&block[Self::SEG1_HEADER_VERSION])));
        let raw_engine_version =
            EngineVersion(u64::from_le_bytes(memcpy(&block[Self::SEG1_ENGINE_VERSION])));
        let raw_endian = block[Self::SEG2_ENDIAN];
        if raw_magic != SKYGRAPH_MAGIC {
            return Err(CorruptKind::HeaderMagic.into());
        }
        if !okay!(
            raw_header_version == HEADER_V1,
            raw_engine_version == ENGINE_V0
        ) {
            return Err(CorruptKind::HeaderVersion.into());
        }
        if EndianTag::try_from_raw(raw_endian) != Some(EndianTag::Little) {
            return Err(CorruptKind::HeaderEndian.into());
        }
        let settings = Settings {
            table_size: u64::from_le_bytes(memcpy(&block[Self::SEG2_TABLE_SIZE])),
            max_key_len: u64::from_le_bytes(memcpy(&block[Self::SEG2_MAX_KEY_LEN])),
            node_attr_size: u32::from_le_bytes(memcpy(&block[Self::SEG2_NODE_ATTR])),
            edge_attr_size: u32::from_le_bytes(memcpy(&block[Self::SEG2_EDGE_ATTR])),
        };
        let raw_record_size = u64::from_le_bytes(memcpy(&block[Self::SEG2_RECORD_SIZE]));
        if settings.validate().is_err() || raw_record_size != settings.record_size() {
            return Err(CorruptKind::HeaderGeometry.into());
        }
        Ok(Self { settings })
    }
}

/*
    dynamic block
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The decoded dynamic block: every mutable scalar of the file. `tail` is the next
/// never-used slot index, so live slots are exactly `1..tail` and a fresh file has
/// `tail == 1`.
pub struct DynState {
    pub n_nodes: u64,
    pub n_edges: u64,
    pub next_id: u64,
    pub tail: u64,
    pub freelist_head: u64,
}

impl DynState {
    const SEG_NODE_COUNT: Range<usize> = 0..8;
    const SEG_EDGE_COUNT: Range<usize> = 8..16;
    const SEG_NEXT_ID: Range<usize> = 16..24;
    const SEG_TAIL: Range<usize> = 24..32;
    const SEG_FREELIST: Range<usize> = 32..40;
    // 40..56 reserved
    const SEG_CRC: Range<usize> = 56..64;
    const CRC_COVERAGE: Range<usize> = 0..56;
    pub const SIZE: usize = 64;
    /// Byte offset of the dynamic block within the file
    pub const OFFSET: u64 = Header::STATIC_SIZE as u64;

    pub const fn initial() -> Self {
        Self {
            n_nodes: 0,
            n_edges: 0,
            next_id: 0,
            tail: 1,
            freelist_head: 0,
        }
    }
    pub fn encode(&self) -> [u8; 64] {
        let mut ret = [0u8; 64];
        ret[Self::SEG_NODE_COUNT].copy_from_slice(&self.n_nodes.to_le_bytes());
        ret[Self::SEG_EDGE_COUNT].copy_from_slice(&self.n_edges.to_le_bytes());
        ret[Self::SEG_NEXT_ID].copy_from_slice(&self.next_id.to_le_bytes());
        ret[Self::SEG_TAIL].copy_from_slice(&self.tail.to_le_bytes());
        ret[Self::SEG_FREELIST].copy_from_slice(&self.freelist_head.to_le_bytes());
        let crc = CRC64.checksum(&ret[Self::CRC_COVERAGE]);
        ret[Self::SEG_CRC].copy_from_slice(&crc.to_le_bytes());
        ret
    }
    pub fn decode(block: [u8; 64]) -> RuntimeResult<Self> {
        let crc = u64::from_le_bytes(memcpy(&block[Self::SEG_CRC]));
        if crc != CRC64.checksum(&block[Self::CRC_COVERAGE]) {
            return Err(CorruptKind::HeaderChecksum.into());
        }
        let me = Self {
            n_nodes: u64::from_le_bytes(memcpy(&block[Self::SEG_NODE_COUNT])),
            n_edges: u64::from_le_bytes(memcpy(&block[Self::SEG_EDGE_COUNT])),
            next_id: u64::from_le_bytes(memcpy(&block[Self::SEG_NEXT_ID])),
            tail: u64::from_le_bytes(memcpy(&block[Self::SEG_TAIL])),
            freelist_head: u64::from_le_bytes(memcpy(&block[Self::SEG_FREELIST])),
        };
        if !okay!(
            me.tail >= 1,
            me.freelist_head == 0 || me.freelist_head < me.tail
        ) {
            return Err(CorruptKind::HeaderGeometry.into());
        }
        Ok(me)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{DynState, Header, Settings},
        crate::error::{CorruptKind, GraphError},
    };

    fn settings() -> Settings {
        Settings::new(64, 32).with_attrs(16, 8)
    }

    #[test]
    fn static_block_round_trip() {
        let h = Header::new(settings());
        let decoded = Header::decode(h.encode()).unwrap();
        assert_eq!(decoded.settings(), &settings());
    }

    #[test]
    fn static_block_rejects_damage() {
        let h = Header::new(settings());
        let mut bad_magic = h.encode();
        bad_magic[0] ^= 0xFF;
        assert_eq!(
            Header::decode(bad_magic).unwrap_err(),
            GraphError::Corrupted(CorruptKind::HeaderMagic)
        );
        let mut bad_version = h.encode();
        bad_version[8] = 0xEE;
        assert_eq!(
            Header::decode(bad_version).unwrap_err(),
            GraphError::Corrupted(CorruptKind::HeaderVersion)
        );
        let mut bad_endian = h.encode();
        bad_endian[24] = 0;
        assert_eq!(
            Header::decode(bad_endian).unwrap_err(),
            GraphError::Corrupted(CorruptKind::HeaderEndian)
        );
        let mut bad_record_size = h.encode();
        bad_record_size[56] ^= 0x01;
        assert_eq!(
            Header::decode(bad_record_size).unwrap_err(),
            GraphError::Corrupted(CorruptKind::HeaderGeometry)
        );
    }

    #[test]
    fn dynamic_block_round_trip() {
        let st = DynState {
            n_nodes: 10,
            n_edges: 25,
            next_id: 11,
            tail: 36,
            freelist_head: 7,
        };
        assert_eq!(DynState::decode(st.encode()).unwrap(), st);
    }

    #[test]
    fn dynamic_block_rejects_bit_flip() {
        let mut block = DynState::initial().encode();
        block[3] ^= 0x10;
        assert_eq!(
            DynState::decode(block).unwrap_err(),
            GraphError::Corrupted(CorruptKind::HeaderChecksum)
        );
    }

    #[test]
    fn record_size_covers_all_kinds() {
        let s = settings();
        assert!(s.record_size() >= 64 + 32 + 16);
        assert!(s.record_size() >= 64 + 8);
        // the node layout (base + key + attrs) dominates this geometry
        assert_eq!(s.record_size(), 64 + 32 + 16);
    }
}
