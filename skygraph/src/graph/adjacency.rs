/*
 * Created on Tue Mar 25 2025
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

//! # Adjacency trees
//!
//! Every node roots two binary search trees over its incident edges: the out-tree,
//! ordered by the target's key hash, and the in-tree, ordered by the source's. One
//! edge record is therefore linked into exactly two trees at once, through disjoint
//! child-pointer pairs.
//!
//! That sharing dictates the deletion discipline. Removing an edge from one tree must
//! not move any *other* edge between slots, because the other tree addresses edges by
//! slot. So two-children deletion here transplants the in-order successor: the
//! successor is unlinked from this tree only and adopts the removed edge's children in
//! this tree, while its record (and with it, its links in the opposite tree) stays
//! exactly where it was.

use {
    super::keyidx,
    crate::{
        error::{CorruptKind, RuntimeResult},
        storage::{
            file::SlotFile,
            record::{Adj, EdgeLink, EdgeRecord, NodeRecord},
        },
    },
    core::cmp::Ordering,
};

#[derive(Debug, Clone, Copy)]
/// A writable location holding (or about to hold) an edge pointer
pub enum EdgeRef {
    /// one of the anchor node's tree heads
    Head { node: u64, adj: Adj },
    /// a child pointer of another edge
    Child { edge: u64, link: EdgeLink },
}

#[derive(Debug)]
pub enum LocateEdge {
    Found { pos: u64, at: EdgeRef },
    Vacant(EdgeRef),
}

/// Descend the anchor's tree looking for the edge whose far endpoint is
/// `(peer_hash, peer_key)`. Each visited edge costs one extra read to fetch its peer's
/// ordering hash.
pub fn locate(
    f: &SlotFile,
    anchor: &NodeRecord,
    adj: Adj,
    peer_hash: u64,
    peer_key: &[u8],
) -> RuntimeResult<LocateEdge> {
    let mut at_ref = EdgeRef::Head {
        node: anchor.pos,
        adj,
    };
    let mut at = anchor.head(adj);
    while at != 0 {
        let e = f.read_edge(at)?;
        if e.anchor(adj) != anchor.pos {
            return Err(CorruptKind::EdgeEndpoint.into());
        }
        let peer = f.read_node(e.peer(adj))?;
        match keyidx::cmp(peer_hash, peer_key, peer.hash, &peer.key) {
            Ordering::Equal => return Ok(LocateEdge::Found { pos: at, at: at_ref }),
            Ordering::Less => {
                at_ref = EdgeRef::Child {
                    edge: at,
                    link: adj.left_link(),
                };
                at = e.left(adj);
            }
            Ordering::Greater => {
                at_ref = EdgeRef::Child {
                    edge: at,
                    link: adj.right_link(),
                };
                at = e.right(adj);
            }
        }
    }
    Ok(LocateEdge::Vacant(at_ref))
}

/// Point the reference at `index`. For inserts this is the last write of the splice.
pub fn link(f: &mut SlotFile, at: EdgeRef, index: u64) -> RuntimeResult<()> {
    match at {
        EdgeRef::Head { node, adj } => f.write_node_link(node, adj.head_link(), index),
        EdgeRef::Child { edge, link } => f.write_edge_link(edge, link, index),
    }
}

/// Unlink the edge at `pos` from this tree only (`at` must reference it, as returned
/// by [`locate`]). The record itself is left in place for the caller to free once the
/// opposite tree lets go of it too.
pub fn unlink(f: &mut SlotFile, pos: u64, at: EdgeRef, adj: Adj) -> RuntimeResult<EdgeRecord> {
    let e = f.read_edge(pos)?;
    let (l, r) = (e.left(adj), e.right(adj));
    if l == 0 {
        link(f, at, r)?;
    } else if r == 0 {
        link(f, at, l)?;
    } else {
        // transplant the in-order successor; its opposite-tree links stay put
        let mut s_parent = 0; // 0: the successor is the right child itself
        let mut s_pos = r;
        let mut s = f.read_edge(s_pos)?;
        while s.left(adj) != 0 {
            s_parent = s_pos;
            s_pos = s.left(adj);
            s = f.read_edge(s_pos)?;
        }
        if s_parent != 0 {
            f.write_edge_link(s_parent, adj.left_link(), s.right(adj))?;
            f.write_edge_link(s_pos, adj.right_link(), r)?;
        }
        f.write_edge_link(s_pos, adj.left_link(), l)?;
        link(f, at, s_pos)?;
    }
    Ok(e)
}
