/*
 * Created on Mon Feb 24 2025
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

//! # Record codecs
//!
//! Three record kinds share the uniform slot size, discriminated by byte 0:
//!
//! ```text
//! node:  kind=1 | rsvd(7) | id | pos | hash | left | right | out | in | key[L] | attrs
//! edge:  kind=2 | tag | rsvd(6) | source | target | hash | oL | oR | iL | iR   | attrs
//! tomb:  kind=0 | rsvd(7) | next
//! ```
//!
//! (every named field after the kind byte is a little-endian `u64`). The kind byte being
//! zero for tombstones means a zero-grown file region reads back as free space, never as
//! a live record.
//!
//! The key field is exactly L bytes, zero padded; equality runs up to the first NUL.
//! Decode rejects nonzero bytes after the padding boundary so a torn write cannot
//! silently shorten a key.

use {
    super::{memcpy, spec::Settings},
    crate::error::{CorruptKind, RuntimeResult},
    std::ops::Range,
};

/// Fixed prefix of a node record, before the key field
pub const NODE_BASE: usize = 64;
/// Fixed prefix of an edge record, before the attribute region
pub const EDGE_BASE: usize = 64;
/// A tombstone record: kind byte plus the next-free pointer
pub const TOMB_SIZE: usize = 16;

tagged_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    /// Slot discriminator
    pub enum SlotKind: u8 {
        Tombstone = 0,
        Node = 1,
        Edge = 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One of a node's two adjacency trees
pub enum Adj {
    /// the tree over edges leaving the node, ordered by target
    Out,
    /// the tree over edges entering the node, ordered by source
    In,
}

impl Adj {
    pub const fn head_link(self) -> NodeLink {
        match self {
            Self::Out => NodeLink::OutHead,
            Self::In => NodeLink::InHead,
        }
    }
    pub const fn left_link(self) -> EdgeLink {
        match self {
            Self::Out => EdgeLink::OutLeft,
            Self::In => EdgeLink::InLeft,
        }
    }
    pub const fn right_link(self) -> EdgeLink {
        match self {
            Self::Out => EdgeLink::OutRight,
            Self::In => EdgeLink::InRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A branch direction within any of the trees
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A pointer-sized field of a node record that can be rewritten in place
pub enum NodeLink {
    Left,
    Right,
    OutHead,
    InHead,
}

impl NodeLink {
    pub const fn offset(self) -> usize {
        match self {
            Self::Left => 32,
            Self::Right => 40,
            Self::OutHead => 48,
            Self::InHead => 56,
        }
    }
    pub const fn of(side: Side) -> Self {
        match side {
            Side::Left => Self::Left,
            Side::Right => Self::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A pointer-sized field of an edge record that can be rewritten in place
pub enum EdgeLink {
    Source,
    Target,
    OutLeft,
    OutRight,
    InLeft,
    InRight,
}

impl EdgeLink {
    pub const fn offset(self) -> usize {
        match self {
            Self::Source => 8,
            Self::Target => 16,
            Self::OutLeft => 32,
            Self::OutRight => 40,
            Self::InLeft => 48,
            Self::InRight => 56,
        }
    }
}

/*
    node records
*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// dense auto-assigned id; immutable identity of the node
    pub id: u64,
    /// the slot this record lives in
    pub pos: u64,
    /// ordering hash of the key
    pub hash: u64,
    /// bucket-tree children
    pub left: u64,
    pub right: u64,
    /// adjacency tree roots
    pub out_head: u64,
    pub in_head: u64,
    /// key bytes, unpadded
    pub key: Vec<u8>,
    /// user attribute bytes, exactly `node_attr_size` long
    pub attrs: Vec<u8>,
}

impl NodeRecord {
    const SEG_ID: Range<usize> = 8..16;
    const SEG_POS: Range<usize> = 16..24;
    const SEG_HASH: Range<usize> = 24..32;
    const SEG_LEFT: Range<usize> = 32..40;
    const SEG_RIGHT: Range<usize> = 40..48;
    const SEG_OUT_HEAD: Range<usize> = 48..56;
    const SEG_IN_HEAD: Range<usize> = 56..64;

    pub fn head(&self, adj: Adj) -> u64 {
        match adj {
            Adj::Out => self.out_head,
            Adj::In => self.in_head,
        }
    }
    /// Byte offset of the attribute region within the slot
    pub const fn attr_offset(s: &Settings) -> usize {
        NODE_BASE + s.max_key_len() as usize
    }
    pub fn encode(&self, s: &Settings, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), s.record_size() as usize);
        debug_assert!(self.key.len() <= s.max_key_len() as usize);
        debug_assert_eq!(self.attrs.len(), s.node_attr_size() as usize);
        buf.fill(0);
        buf[0] = SlotKind::Node.dscr();
        buf[Self::SEG_ID].copy_from_slice(&self.id.to_le_bytes());
        buf[Self::SEG_POS].copy_from_slice(&self.pos.to_le_bytes());
        buf[Self::SEG_HASH].copy_from_slice(&self.hash.to_le_bytes());
        buf[Self::SEG_LEFT].copy_from_slice(&self.left.to_le_bytes());
        buf[Self::SEG_RIGHT].copy_from_slice(&self.right.to_le_bytes());
        buf[Self::SEG_OUT_HEAD].copy_from_slice(&self.out_head.to_le_bytes());
        buf[Self::SEG_IN_HEAD].copy_from_slice(&self.in_head.to_le_bytes());
        buf[NODE_BASE..NODE_BASE + self.key.len()].copy_from_slice(&self.key);
        let attr_at = Self::attr_offset(s);
        buf[attr_at..attr_at + self.attrs.len()].copy_from_slice(&self.attrs);
    }
    pub fn decode(s: &Settings, buf: &[u8]) -> RuntimeResult<Self> {
        debug_assert_eq!(buf.len(), s.record_size() as usize);
        if buf[0] != SlotKind::Node.dscr() {
            return Err(CorruptKind::RecordKind.into());
        }
        let key_field = &buf[NODE_BASE..Self::attr_offset(s)];
        let key_len = key_field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(key_field.len());
        if key_len == 0 || key_field[key_len..].iter().any(|b| *b != 0) {
            return Err(CorruptKind::RecordKey.into());
        }
        let attr_at = Self::attr_offset(s);
        Ok(Self {
            id: u64::from_le_bytes(memcpy(&buf[Self::SEG_ID])),
            pos: u64::from_le_bytes(memcpy(&buf[Self::SEG_POS])),
            hash: u64::from_le_bytes(memcpy(&buf[Self::SEG_HASH])),
            left: u64::from_le_bytes(memcpy(&buf[Self::SEG_LEFT])),
            right: u64::from_le_bytes(memcpy(&buf[Self::SEG_RIGHT])),
            out_head: u64::from_le_bytes(memcpy(&buf[Self::SEG_OUT_HEAD])),
            in_head: u64::from_le_bytes(memcpy(&buf[Self::SEG_IN_HEAD])),
            key: key_field[..key_len].to_vec(),
            attrs: buf[attr_at..attr_at + s.node_attr_size() as usize].to_vec(),
        })
    }
}

/*
    edge records
*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    /// small user-defined edge type tag
    pub tag: u8,
    /// slot of the source node
    pub source: u64,
    /// slot of the target node
    pub target: u64,
    /// identity hash mixed from both endpoints' key hashes
    pub hash: u64,
    /// children within the source's out-tree
    pub out_left: u64,
    pub out_right: u64,
    /// children within the target's in-tree
    pub in_left: u64,
    pub in_right: u64,
    /// user attribute bytes, exactly `edge_attr_size` long
    pub attrs: Vec<u8>,
}

impl EdgeRecord {
    const OFF_TAG: usize = 1;
    const SEG_SOURCE: Range<usize> = 8..16;
    const SEG_TARGET: Range<usize> = 16..24;
    const SEG_HASH: Range<usize> = 24..32;
    const SEG_OUT_LEFT: Range<usize> = 32..40;
    const SEG_OUT_RIGHT: Range<usize> = 40..48;
    const SEG_IN_LEFT: Range<usize> = 48..56;
    const SEG_IN_RIGHT: Range<usize> = 56..64;

    /// The far end of this edge as seen from the anchor of `adj`
    pub fn peer(&self, adj: Adj) -> u64 {
        match adj {
            Adj::Out => self.target,
            Adj::In => self.source,
        }
    }
    /// The near end: the node whose tree `adj` refers to
    pub fn anchor(&self, adj: Adj) -> u64 {
        match adj {
            Adj::Out => self.source,
            Adj::In => self.target,
        }
    }
    pub fn left(&self, adj: Adj) -> u64 {
        match adj {
            Adj::Out => self.out_left,
            Adj::In => self.in_left,
        }
    }
    pub fn right(&self, adj: Adj) -> u64 {
        match adj {
            Adj::Out => self.out_right,
            Adj::In => self.in_right,
        }
    }
    pub const fn attr_offset() -> usize {
        EDGE_BASE
    }
    pub fn encode(&self, s: &Settings, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), s.record_size() as usize);
        debug_assert_eq!(self.attrs.len(), s.edge_attr_size() as usize);
        buf.fill(0);
        buf[0] = SlotKind::Edge.dscr();
        buf[Self::OFF_TAG] = self.tag;
        buf[Self::SEG_SOURCE].copy_from_slice(&self.source.to_le_bytes());
        buf[Self::SEG_TARGET].copy_from_slice(&self.target.to_le_bytes());
        buf[Self::SEG_HASH].copy_from_slice(&self.hash.to_le_bytes());
        buf[Self::SEG_OUT_LEFT].copy_from_slice(&self.out_left.to_le_bytes());
        buf[Self::SEG_OUT_RIGHT].copy_from_slice(&self.out_right.to_le_bytes());
        buf[Self::SEG_IN_LEFT].copy_from_slice(&self.in_left.to_le_bytes());
        buf[Self::SEG_IN_RIGHT].copy_from_slice(&self.in_right.to_le_bytes());
        buf[EDGE_BASE..EDGE_BASE + self.attrs.len()].copy_from_slice(&self.attrs);
    }
    pub fn decode(s: &Settings, buf: &[u8]) -> RuntimeResult<Self> {
        debug_assert_eq!(buf.len(), s.record_size() as usize);
        if buf[0] != SlotKind::Edge.dscr() {
            return Err(CorruptKind::RecordKind.into());
        }
        Ok(Self {
            tag: buf[Self::OFF_TAG],
            source: u64::from_le_bytes(memcpy(&buf[Self::SEG_SOURCE])),
            target: u64::from_le_bytes(memcpy(&buf[Self::SEG_TARGET])),
            hash: u64::from_le_bytes(memcpy(&buf[Self::SEG_HASH])),
            out_left: u64::from_le_bytes(memcpy(&buf[Self::SEG_OUT_LEFT])),
            out_right: u64::from_le_bytes(memcpy(&buf[Self::SEG_OUT_RIGHT])),
            in_left: u64::from_le_bytes(memcpy(&buf[Self::SEG_IN_LEFT])),
            in_right: u64::from_le_bytes(memcpy(&buf[Self::SEG_IN_RIGHT])),
            attrs: buf[EDGE_BASE..EDGE_BASE + s.edge_attr_size() as usize].to_vec(),
        })
    }
}

/*
    tombstones
*/

const TOMB_SEG_NEXT: Range<usize> = 8..16;

/// Overwrite the slot with a tombstone chaining to `next`
pub fn encode_tombstone(next: u64, buf: &mut [u8]) {
    buf.fill(0);
    buf[0] = SlotKind::Tombstone.dscr();
    buf[TOMB_SEG_NEXT].copy_from_slice(&next.to_le_bytes());
}

/// Read the next-free pointer of a tombstone slot
pub fn decode_tombstone(buf: &[u8]) -> RuntimeResult<u64> {
    if buf[0] != SlotKind::Tombstone.dscr() {
        return Err(CorruptKind::RecordKind.into());
    }
    Ok(u64::from_le_bytes(memcpy(&buf[TOMB_SEG_NEXT])))
}

#[cfg(test)]
mod tests {
    use {
        super::{encode_tombstone, decode_tombstone, EdgeRecord, NodeRecord},
        crate::{
            error::{CorruptKind, GraphError},
            storage::spec::Settings,
        },
    };

    fn settings() -> Settings {
        Settings::new(8, 12).with_attrs(4, 2)
    }

    fn node() -> NodeRecord {
        NodeRecord {
            id: 42,
            pos: 7,
            hash: 0xDEAD_BEEF_CAFE_F00D,
            left: 3,
            right: 0,
            out_head: 9,
            in_head: 0,
            key: b"meridian".to_vec(),
            attrs: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn node_round_trip() {
        let s = settings();
        let mut buf = vec![0u8; s.record_size() as usize];
        node().encode(&s, &mut buf);
        assert_eq!(NodeRecord::decode(&s, &buf).unwrap(), node());
    }

    #[test]
    fn node_full_width_key() {
        let s = settings();
        let mut n = node();
        n.key = b"exactly12byt".to_vec();
        let mut buf = vec![0u8; s.record_size() as usize];
        n.encode(&s, &mut buf);
        assert_eq!(NodeRecord::decode(&s, &buf).unwrap().key, n.key);
    }

    #[test]
    fn node_rejects_bytes_after_padding() {
        let s = settings();
        let mut buf = vec![0u8; s.record_size() as usize];
        node().encode(&s, &mut buf);
        // "meridian" is 8 bytes; poke a byte past its NUL terminator
        buf[64 + 10] = b'x';
        assert_eq!(
            NodeRecord::decode(&s, &buf).unwrap_err(),
            GraphError::Corrupted(CorruptKind::RecordKey)
        );
    }

    #[test]
    fn edge_round_trip() {
        let s = settings();
        let e = EdgeRecord {
            tag: 3,
            source: 7,
            target: 11,
            hash: 0x0123_4567_89AB_CDEF,
            out_left: 0,
            out_right: 5,
            in_left: 2,
            in_right: 0,
            attrs: vec![0xAA, 0xBB],
        };
        let mut buf = vec![0u8; s.record_size() as usize];
        e.encode(&s, &mut buf);
        assert_eq!(EdgeRecord::decode(&s, &buf).unwrap(), e);
    }

    #[test]
    fn kind_confusion_is_corruption() {
        let s = settings();
        let mut buf = vec![0u8; s.record_size() as usize];
        node().encode(&s, &mut buf);
        assert_eq!(
            EdgeRecord::decode(&s, &buf).unwrap_err(),
            GraphError::Corrupted(CorruptKind::RecordKind)
        );
        assert_eq!(
            decode_tombstone(&buf).unwrap_err(),
            GraphError::Corrupted(CorruptKind::RecordKind)
        );
    }

    #[test]
    fn tombstone_round_trip() {
        let s = settings();
        let mut buf = vec![0u8; s.record_size() as usize];
        encode_tombstone(99, &mut buf);
        assert_eq!(decode_tombstone(&buf).unwrap(), 99);
    }
}
