/*
 * Created on Wed May 21 2025
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

//! # The consistency pass
//!
//! [`check`] walks everything: every slot, every bucket tree, both adjacency trees of
//! every node and the freelist, and cross-checks them against each other and the
//! header counters. Structural damage never aborts the pass; each finding lands in the
//! report as a [`ChkFault`] and the walk carries on, so one run paints the full
//! picture. Only real I/O failures abort.
//!
//! The engine itself never needs this: it is the offline answer to a crash mid
//! mutation (there is no journal, so a torn multi-slot update is detectable but not
//! repairable) and the executable statement of what a healthy file looks like. Unlike
//! the engine, the pass keeps an in-memory copy of every live record, so expect memory
//! proportional to the graph, not the page cache.

use {
    crate::{
        error::{GraphError, RuntimeResult},
        graph::Graph,
        hash,
        storage::record::{EdgeRecord, NodeRecord, SlotKind},
    },
    core::fmt,
    std::collections::{HashMap, HashSet},
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One structural finding
pub enum ChkFault {
    /// header node count disagrees with the slot scan
    NodeCount { header: u64, scanned: u64 },
    /// header edge count disagrees with the slot scan
    EdgeCount { header: u64, scanned: u64 },
    /// slot discriminator is not a known record kind
    UnknownKind { pos: u64 },
    /// the record failed to decode
    BadRecord { pos: u64 },
    /// a node's stored ordering hash does not match its key
    NodeHash { pos: u64 },
    /// two live nodes share a key
    DuplicateKey { pos: u64 },
    /// a node sits in a tree rooted at the wrong bucket
    WrongBucket { pos: u64 },
    /// a tree pointer does not land on a live record of the right kind
    TreeLink { at: u64, to: u64 },
    /// a record violates the search order of the tree it sits in
    TreeOrder { pos: u64 },
    /// a tree walk revisited a slot
    TreeCycle { pos: u64 },
    /// a live node is in no bucket tree
    NodeUnreachable { pos: u64 },
    /// an edge names a slot that is not its endpoint
    EdgeEndpoint { pos: u64 },
    /// a live edge is in no out-tree
    EdgeOutUnreachable { pos: u64 },
    /// a live edge is in no in-tree
    EdgeInUnreachable { pos: u64 },
    /// the edge is not found by descent from the opposite endpoint
    EdgeAsymmetric { pos: u64 },
    /// a freelist entry is not a tombstone, or the list cycles
    Freelist { pos: u64 },
    /// the freelist length disagrees with the tombstone scan
    FreeCount { walked: u64, scanned: u64 },
}

impl fmt::Display for ChkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeCount { header, scanned } => {
                write!(f, "node count: header says {header}, scan found {scanned}")
            }
            Self::EdgeCount { header, scanned } => {
                write!(f, "edge count: header says {header}, scan found {scanned}")
            }
            Self::UnknownKind { pos } => write!(f, "slot {pos}: unknown record kind"),
            Self::BadRecord { pos } => write!(f, "slot {pos}: record failed to decode"),
            Self::NodeHash { pos } => write!(f, "node {pos}: stored hash does not match key"),
            Self::DuplicateKey { pos } => write!(f, "node {pos}: key already seen"),
            Self::WrongBucket { pos } => write!(f, "node {pos}: linked under the wrong bucket"),
            Self::TreeLink { at, to } => write!(f, "slot {at}: tree link to dead slot {to}"),
            Self::TreeOrder { pos } => write!(f, "slot {pos}: search order violated"),
            Self::TreeCycle { pos } => write!(f, "slot {pos}: tree walk revisited this slot"),
            Self::NodeUnreachable { pos } => write!(f, "node {pos}: not in any bucket tree"),
            Self::EdgeEndpoint { pos } => write!(f, "edge {pos}: endpoint mismatch"),
            Self::EdgeOutUnreachable { pos } => write!(f, "edge {pos}: not in any out-tree"),
            Self::EdgeInUnreachable { pos } => write!(f, "edge {pos}: not in any in-tree"),
            Self::EdgeAsymmetric { pos } => {
                write!(f, "edge {pos}: unreachable from the opposite endpoint")
            }
            Self::Freelist { pos } => write!(f, "slot {pos}: freelist damage"),
            Self::FreeCount { walked, scanned } => {
                write!(f, "freelist: walked {walked} entries, scan found {scanned}")
            }
        }
    }
}

#[derive(Debug)]
/// The outcome of a full consistency pass
pub struct ChkReport {
    pub scanned_nodes: u64,
    pub scanned_edges: u64,
    pub scanned_free: u64,
    pub key_depth_total: u64,
    pub key_depth_max: u32,
    pub faults: Vec<ChkFault>,
}

impl ChkReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
    /// Mean depth of a node within its bucket tree (root = depth 1)
    pub fn avg_key_depth(&self) -> f64 {
        if self.scanned_nodes == 0 {
            0.0
        } else {
            self.key_depth_total as f64 / self.scanned_nodes as f64
        }
    }
}

impl fmt::Display for ChkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} nodes, {} edges, {} free slots; mean bucket depth {:.2} (max {})",
            self.scanned_nodes,
            self.scanned_edges,
            self.scanned_free,
            self.avg_key_depth(),
            self.key_depth_max,
        )?;
        if self.is_clean() {
            write!(f, "no faults")
        } else {
            write!(f, "{} fault(s):", self.faults.len())?;
            for fault in &self.faults {
                write!(f, "\n  - {fault}")?;
            }
            Ok(())
        }
    }
}

type Bound<'a> = Option<(u64, &'a [u8])>;

fn within(hash: u64, key: &[u8], lo: Bound<'_>, hi: Bound<'_>) -> bool {
    let above = lo.map_or(true, |(h, k)| (hash, key) > (h, k));
    let below = hi.map_or(true, |(h, k)| (hash, key) < (h, k));
    above && below
}

/// Run the full pass against an open handle (read-only handles are fine and are the
/// usual way to run this)
pub fn check(g: &Graph) -> RuntimeResult<ChkReport> {
    let f = g.file();
    let state = *f.state();
    let mut faults = Vec::new();

    /*
        pass 1: flat slot scan
    */
    let mut nodes: HashMap<u64, NodeRecord> = HashMap::new();
    let mut edges: HashMap<u64, EdgeRecord> = HashMap::new();
    let mut free: HashSet<u64> = HashSet::new();
    for pos in 1..state.tail {
        let kind = match f.read_kind(pos) {
            Ok(kind) => kind,
            Err(GraphError::Corrupted(_)) => {
                faults.push(ChkFault::UnknownKind { pos });
                continue;
            }
            Err(e) => return Err(e),
        };
        match kind {
            SlotKind::Node => match f.read_node(pos) {
                Ok(n) => {
                    if hash::key_hash(&n.key) != n.hash {
                        faults.push(ChkFault::NodeHash { pos });
                    }
                    nodes.insert(pos, n);
                }
                Err(GraphError::Corrupted(_)) => faults.push(ChkFault::BadRecord { pos }),
                Err(e) => return Err(e),
            },
            SlotKind::Edge => match f.read_edge(pos) {
                Ok(e) => {
                    edges.insert(pos, e);
                }
                Err(GraphError::Corrupted(_)) => faults.push(ChkFault::BadRecord { pos }),
                Err(e) => return Err(e),
            },
            SlotKind::Tombstone => {
                free.insert(pos);
            }
        }
    }
    if state.n_nodes != nodes.len() as u64 {
        faults.push(ChkFault::NodeCount {
            header: state.n_nodes,
            scanned: nodes.len() as u64,
        });
    }
    if state.n_edges != edges.len() as u64 {
        faults.push(ChkFault::EdgeCount {
            header: state.n_edges,
            scanned: edges.len() as u64,
        });
    }
    let mut keys_seen: HashSet<&[u8]> = HashSet::new();
    for n in nodes.values() {
        if !keys_seen.insert(&n.key) {
            faults.push(ChkFault::DuplicateKey { pos: n.pos });
        }
    }

    /*
        pass 2: bucket trees. Bounds propagate down the walk, so any single record
        breaking the search order is pinned directly.
    */
    let table_size = f.settings().table_size();
    let mut reached: HashSet<u64> = HashSet::new();
    let mut depth_total = 0u64;
    let mut depth_max = 0u32;
    for bucket in 0..table_size {
        let root = f.bucket_root(bucket)?;
        let mut stack: Vec<(u64, u64, u32, Bound<'_>, Bound<'_>)> = Vec::new();
        if root != 0 {
            stack.push((root, 0, 1, None, None));
        }
        while let Some((pos, from, depth, lo, hi)) = stack.pop() {
            let Some(n) = nodes.get(&pos) else {
                faults.push(ChkFault::TreeLink { at: from, to: pos });
                continue;
            };
            if !reached.insert(pos) {
                faults.push(ChkFault::TreeCycle { pos });
                continue;
            }
            if !within(n.hash, &n.key, lo, hi) {
                faults.push(ChkFault::TreeOrder { pos });
            }
            if hash::bucket_hash(&n.key) % table_size != bucket {
                faults.push(ChkFault::WrongBucket { pos });
            }
            depth_total += depth as u64;
            depth_max = depth_max.max(depth);
            if n.left != 0 {
                stack.push((n.left, pos, depth + 1, lo, Some((n.hash, &n.key))));
            }
            if n.right != 0 {
                stack.push((n.right, pos, depth + 1, Some((n.hash, &n.key)), hi));
            }
        }
    }
    for pos in nodes.keys() {
        if !reached.contains(pos) {
            faults.push(ChkFault::NodeUnreachable { pos: *pos });
        }
    }

    /*
        pass 3: adjacency trees. Every edge must hang off its own endpoints, in order,
        and must be reachable by descent from both sides.
    */
    let mut out_reached: HashSet<u64> = HashSet::new();
    let mut in_reached: HashSet<u64> = HashSet::new();
    for (&n_pos, n) in &nodes {
        for out in [true, false] {
            let (head, seen) = if out {
                (n.out_head, &mut out_reached)
            } else {
                (n.in_head, &mut in_reached)
            };
            let mut stack: Vec<(u64, u64, Bound<'_>, Bound<'_>)> = Vec::new();
            if head != 0 {
                stack.push((head, n_pos, None, None));
            }
            while let Some((pos, from, lo, hi)) = stack.pop() {
                let Some(e) = edges.get(&pos) else {
                    faults.push(ChkFault::TreeLink { at: from, to: pos });
                    continue;
                };
                if !seen.insert(pos) {
                    faults.push(ChkFault::TreeCycle { pos });
                    continue;
                }
                let (anchor, peer) = if out {
                    (e.source, e.target)
                } else {
                    (e.target, e.source)
                };
                if anchor != n_pos {
                    faults.push(ChkFault::EdgeEndpoint { pos });
                    continue;
                }
                let Some(p) = nodes.get(&peer) else {
                    faults.push(ChkFault::EdgeEndpoint { pos });
                    continue;
                };
                if !within(p.hash, &p.key, lo, hi) {
                    faults.push(ChkFault::TreeOrder { pos });
                }
                let (left, right) = if out {
                    (e.out_left, e.out_right)
                } else {
                    (e.in_left, e.in_right)
                };
                if left != 0 {
                    stack.push((left, pos, lo, Some((p.hash, &p.key))));
                }
                if right != 0 {
                    stack.push((right, pos, Some((p.hash, &p.key)), hi));
                }
                // symmetry, checked once per edge from the out side: the target's
                // in-tree must find this same slot by descending on the source key
                if out && !in_tree_finds(&nodes, &edges, p, n, pos) {
                    faults.push(ChkFault::EdgeAsymmetric { pos });
                }
            }
        }
    }
    for pos in edges.keys() {
        if !out_reached.contains(pos) {
            faults.push(ChkFault::EdgeOutUnreachable { pos: *pos });
        }
        if !in_reached.contains(pos) {
            faults.push(ChkFault::EdgeInUnreachable { pos: *pos });
        }
    }

    /*
        pass 4: the freelist
    */
    let mut walked = 0u64;
    let mut visited: HashSet<u64> = HashSet::new();
    let mut cur = state.freelist_head;
    while cur != 0 {
        if !free.contains(&cur) || !visited.insert(cur) {
            faults.push(ChkFault::Freelist { pos: cur });
            break;
        }
        walked += 1;
        cur = match f.read_tombstone(cur) {
            Ok(next) => next,
            Err(GraphError::Corrupted(_)) => {
                faults.push(ChkFault::Freelist { pos: cur });
                break;
            }
            Err(e) => return Err(e),
        };
    }
    if walked != free.len() as u64 {
        faults.push(ChkFault::FreeCount {
            walked,
            scanned: free.len() as u64,
        });
    }

    Ok(ChkReport {
        scanned_nodes: nodes.len() as u64,
        scanned_edges: edges.len() as u64,
        scanned_free: free.len() as u64,
        key_depth_total: depth_total,
        key_depth_max: depth_max,
        faults,
    })
}

/// Pure in-memory descent of `target`'s in-tree on the source's key; true if it lands
/// exactly on `expect`
fn in_tree_finds(
    nodes: &HashMap<u64, NodeRecord>,
    edges: &HashMap<u64, EdgeRecord>,
    target: &NodeRecord,
    source: &NodeRecord,
    expect: u64,
) -> bool {
    let mut at = target.in_head;
    let mut steps = 0u64;
    while at != 0 && steps <= edges.len() as u64 {
        let Some(e) = edges.get(&at) else {
            return false;
        };
        let Some(peer) = nodes.get(&e.source) else {
            return false;
        };
        match (source.hash, source.key.as_slice()).cmp(&(peer.hash, peer.key.as_slice())) {
            core::cmp::Ordering::Equal => return at == expect,
            core::cmp::Ordering::Less => at = e.in_left,
            core::cmp::Ordering::Greater => at = e.in_right,
        }
        steps += 1;
    }
    false
}
