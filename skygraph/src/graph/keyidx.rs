/*
 * Created on Wed Mar 19 2025
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

//! # The key index
//!
//! Keys are partitioned into T buckets by one hash and ordered *within* a bucket's
//! binary search tree by a second, unrelated hash (ties fall back to the raw key
//! bytes). The bucket fan-out is the whole balancing strategy: none of the trees
//! rebalance, they just stay shallow because T splits the key space up front.
//!
//! Deletion with two children copies the in-order successor's identity into the
//! deleted node's slot and removes the successor's slot instead, so the surviving
//! node keeps the deleted node's position. The successor's incident edges still name
//! its old slot though, so the copy is followed by a repatriation walk over the two
//! adjacency trees it brought along, rewriting each edge's endpoint field. That walk
//! is bounded by the successor's degree.

use {
    crate::{
        error::{GraphError, RuntimeResult},
        hash,
        storage::{
            file::SlotFile,
            record::{EdgeLink, NodeLink, NodeRecord, Side},
            spec::Settings,
        },
    },
    core::cmp::Ordering,
};

#[derive(Debug, Clone, Copy)]
/// A validated key with both of its hashes
pub struct Key<'a> {
    pub bytes: &'a [u8],
    pub hash: u64,
    pub bucket: u64,
}

impl<'a> Key<'a> {
    pub fn analyze(raw: &'a str, s: &Settings) -> RuntimeResult<Self> {
        let bytes = raw.as_bytes();
        if bytes.is_empty() || bytes.contains(&0) {
            return Err(GraphError::InvalidKey);
        }
        if bytes.len() as u64 > s.max_key_len() {
            return Err(GraphError::KeyTooLong);
        }
        Ok(Self {
            bytes,
            hash: hash::key_hash(bytes),
            bucket: hash::bucket_hash(bytes) % s.table_size(),
        })
    }
}

/// Tree order: ordering hash first, raw key bytes as the tiebreak
pub fn cmp(hash_a: u64, key_a: &[u8], hash_b: u64, key_b: &[u8]) -> Ordering {
    (hash_a, key_a).cmp(&(hash_b, key_b))
}

#[derive(Debug, Clone, Copy)]
/// A writable location holding (or about to hold) a node pointer
pub enum NodeRef {
    /// the bucket's directory entry
    Root(u64),
    /// a child pointer of another node
    Child { parent: u64, side: Side },
}

#[derive(Debug)]
pub enum Locate {
    Found(u64),
    Vacant(NodeRef),
}

/// Descend the bucket tree. Returns the node's position if the key is present, plus
/// the reference that points (or would point) to it.
fn descend(f: &SlotFile, key: &Key) -> RuntimeResult<(Option<u64>, NodeRef)> {
    let mut at_ref = NodeRef::Root(key.bucket);
    let mut at = f.bucket_root(key.bucket)?;
    while at != 0 {
        let n = f.read_node(at)?;
        match cmp(key.hash, key.bytes, n.hash, &n.key) {
            Ordering::Equal => return Ok((Some(at), at_ref)),
            Ordering::Less => {
                at_ref = NodeRef::Child {
                    parent: at,
                    side: Side::Left,
                };
                at = n.left;
            }
            Ordering::Greater => {
                at_ref = NodeRef::Child {
                    parent: at,
                    side: Side::Right,
                };
                at = n.right;
            }
        }
    }
    Ok((None, at_ref))
}

pub fn locate(f: &SlotFile, key: &Key) -> RuntimeResult<Locate> {
    descend(f, key).map(|(found, at_ref)| match found {
        Some(pos) => Locate::Found(pos),
        None => Locate::Vacant(at_ref),
    })
}

pub fn lookup(f: &SlotFile, key: &Key) -> RuntimeResult<Option<u64>> {
    descend(f, key).map(|(found, _)| found)
}

/// Point the reference at `index`. For inserts this is the last write of the splice,
/// so the record is fully on disk before it becomes reachable.
pub fn link(f: &mut SlotFile, at: NodeRef, index: u64) -> RuntimeResult<()> {
    match at {
        NodeRef::Root(bucket) => f.set_bucket_root(bucket, index),
        NodeRef::Child { parent, side } => f.write_node_link(parent, NodeLink::of(side), index),
    }
}

/// Unlink the key from its bucket tree and free a node slot. Returns the removed
/// node's record (its adjacency must already be drained by the caller).
pub fn remove(f: &mut SlotFile, key: &Key) -> RuntimeResult<NodeRecord> {
    let (found, at_ref) = descend(f, key)?;
    let pos = found.ok_or(GraphError::NotFound)?;
    let x = f.read_node(pos)?;
    match (x.left, x.right) {
        (0, 0) => link(f, at_ref, 0)?,
        (l, 0) => link(f, at_ref, l)?,
        (0, r) => link(f, at_ref, r)?,
        (l, r) => {
            // two children: copy the in-order successor up into this slot and drop
            // the successor's slot instead
            let mut s_parent = 0; // 0: the successor is the right child itself
            let mut s_pos = r;
            let mut s = f.read_node(s_pos)?;
            while s.left != 0 {
                s_parent = s_pos;
                s_pos = s.left;
                s = f.read_node(s_pos)?;
            }
            if s_parent != 0 {
                f.write_node_link(s_parent, NodeLink::Left, s.right)?;
            }
            let relocated = NodeRecord {
                id: s.id,
                pos,
                hash: s.hash,
                left: l,
                right: if s_parent == 0 { s.right } else { r },
                out_head: s.out_head,
                in_head: s.in_head,
                key: s.key,
                attrs: s.attrs,
            };
            f.write_node(&relocated)?;
            repatriate(f, &relocated)?;
            f.free(s_pos)?;
            return Ok(x);
        }
    }
    f.free(pos)?;
    Ok(x)
}

/// After a copy-up, every edge incident to the relocated node still records the old
/// position. Walk both adjacency trees and rewrite the endpoint fields. Tree links are
/// untouched: edges are addressed by their own slots, which have not moved.
fn repatriate(f: &mut SlotFile, node: &NodeRecord) -> RuntimeResult<()> {
    let mut stack = Vec::new();
    if node.out_head != 0 {
        stack.push(node.out_head);
    }
    while let Some(at) = stack.pop() {
        let e = f.read_edge(at)?;
        if e.out_left != 0 {
            stack.push(e.out_left);
        }
        if e.out_right != 0 {
            stack.push(e.out_right);
        }
        f.write_edge_link(at, EdgeLink::Source, node.pos)?;
    }
    if node.in_head != 0 {
        stack.push(node.in_head);
    }
    while let Some(at) = stack.pop() {
        let e = f.read_edge(at)?;
        if e.in_left != 0 {
            stack.push(e.in_left);
        }
        if e.in_right != 0 {
            stack.push(e.in_right);
        }
        f.write_edge_link(at, EdgeLink::Target, node.pos)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::{link, locate, lookup, remove, Key, Locate},
        crate::{
            error::GraphError,
            storage::{file::SlotFile, record::NodeRecord, spec::Settings},
            util::test_utils::TestFile,
        },
    };

    // one bucket, so every key lands in the same tree
    fn settings() -> Settings {
        Settings::new(1, 16)
    }

    fn put(f: &mut SlotFile, raw: &str) -> u64 {
        let key = Key::analyze(raw, &settings()).unwrap();
        let at_ref = match locate(f, &key).unwrap() {
            Locate::Vacant(r) => r,
            Locate::Found(_) => panic!("duplicate insert of {raw}"),
        };
        let pos = f.alloc().unwrap();
        let id = f.state().next_id;
        f.state_mut().next_id += 1;
        f.write_node(&NodeRecord {
            id,
            pos,
            hash: key.hash,
            left: 0,
            right: 0,
            out_head: 0,
            in_head: 0,
            key: key.bytes.to_vec(),
            attrs: vec![],
        })
        .unwrap();
        link(f, at_ref, pos).unwrap();
        pos
    }

    fn get(f: &SlotFile, raw: &str) -> Option<u64> {
        lookup(f, &Key::analyze(raw, &settings()).unwrap()).unwrap()
    }

    #[test]
    fn insert_then_lookup() {
        let tf = TestFile::new("keyidx_basic");
        let mut f = SlotFile::create(tf.path(), settings()).unwrap();
        let keys = ["ark", "beacon", "cinder", "dune", "ember"];
        let mut positions = vec![];
        for k in keys {
            positions.push(put(&mut f, k));
        }
        for (k, pos) in keys.iter().zip(&positions) {
            assert_eq!(get(&f, k), Some(*pos));
        }
        assert_eq!(get(&f, "flint"), None);
    }

    #[test]
    fn remove_every_structural_case() {
        let tf = TestFile::new("keyidx_remove");
        let mut f = SlotFile::create(tf.path(), settings()).unwrap();
        let keys = [
            "ark", "beacon", "cinder", "dune", "ember", "flint", "gale", "harbor",
        ];
        for k in keys {
            put(&mut f, k);
        }
        // remove in an order that exercises leaves, single children and two-children
        // nodes regardless of how the hashes shaped the tree
        for (i, k) in keys.iter().enumerate() {
            remove(&mut f, &Key::analyze(k, &settings()).unwrap()).unwrap();
            assert_eq!(get(&f, k), None);
            for live in &keys[i + 1..] {
                assert!(get(&f, live).is_some(), "lost {live} removing {k}");
            }
        }
        assert_eq!(f.bucket_root(0).unwrap(), 0);
    }

    #[test]
    fn remove_absent_is_not_found() {
        let tf = TestFile::new("keyidx_absent");
        let mut f = SlotFile::create(tf.path(), settings()).unwrap();
        put(&mut f, "ark");
        assert_eq!(
            remove(&mut f, &Key::analyze("zephyr", &settings()).unwrap()).unwrap_err(),
            GraphError::NotFound
        );
    }

    #[test]
    fn key_validation() {
        let s = settings();
        assert_eq!(
            Key::analyze("", &s).unwrap_err(),
            GraphError::InvalidKey
        );
        assert_eq!(
            Key::analyze("nul\0key", &s).unwrap_err(),
            GraphError::InvalidKey
        );
        assert_eq!(
            Key::analyze("seventeen-bytes!!", &s).unwrap_err(),
            GraphError::KeyTooLong
        );
        assert!(Key::analyze("sixteen-bytes!!!", &s).is_ok());
    }
}
