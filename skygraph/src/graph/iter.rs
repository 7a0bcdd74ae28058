/*
 * Created on Wed Apr 16 2025
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

//! Lazy walks over the on-disk trees. All of them drive an explicit stack instead of
//! recursing, since an adversarial insertion order can make a tree as deep as the node
//! count. Every iterator borrows the graph immutably, so the borrow checker enforces
//! the one contract that matters here: positions read from the file are only stable
//! until the next mutation, and a live iterator keeps mutation away.

use {
    super::{EdgeEntry, NodeData},
    crate::{
        error::{CorruptKind, RuntimeResult},
        storage::{
            file::SlotFile,
            record::{Adj, NodeRecord, SlotKind},
        },
    },
};

/// In-order walk over every node, bucket by bucket. Yield order within a bucket is
/// hash order: arbitrary but stable for a given key set.
#[derive(Debug)]
pub struct Nodes<'g> {
    f: &'g SlotFile,
    bucket: u64,
    stack: Vec<u64>,
    fused: bool,
}

impl<'g> Nodes<'g> {
    pub(crate) fn new(f: &'g SlotFile) -> Self {
        Self {
            f,
            bucket: 0,
            stack: Vec::new(),
            fused: false,
        }
    }
    fn push_left_spine(&mut self, mut at: u64) -> RuntimeResult<()> {
        while at != 0 {
            self.stack.push(at);
            at = self.f.read_node(at)?.left;
        }
        Ok(())
    }
}

impl Iterator for Nodes<'_> {
    type Item = RuntimeResult<NodeData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        loop {
            if let Some(pos) = self.stack.pop() {
                let step = self.f.read_node(pos).and_then(|n| {
                    self.push_left_spine(n.right)?;
                    NodeData::from_record(n)
                });
                if step.is_err() {
                    self.fused = true;
                }
                return Some(step);
            }
            // stack drained: move to the next non-empty bucket
            let table_size = self.f.settings().table_size();
            while self.bucket < table_size && self.stack.is_empty() {
                let bucket = self.bucket;
                self.bucket += 1;
                let step = self
                    .f
                    .bucket_root(bucket)
                    .and_then(|root| self.push_left_spine(root));
                if let Err(e) = step {
                    self.fused = true;
                    return Some(Err(e));
                }
            }
            if self.stack.is_empty() {
                return None;
            }
        }
    }
}

/// In-order walk over one adjacency tree, yielding the far endpoint's key: targets
/// for an out-tree, sources for an in-tree
#[derive(Debug)]
pub struct AdjacentKeys<'g> {
    f: &'g SlotFile,
    adj: Adj,
    anchor: u64,
    stack: Vec<u64>,
    fused: bool,
}

impl<'g> AdjacentKeys<'g> {
    pub(crate) fn new(f: &'g SlotFile, anchor: &NodeRecord, adj: Adj) -> RuntimeResult<Self> {
        let mut me = Self {
            f,
            adj,
            anchor: anchor.pos,
            stack: Vec::new(),
            fused: false,
        };
        me.push_left_spine(anchor.head(adj))?;
        Ok(me)
    }
    fn push_left_spine(&mut self, mut at: u64) -> RuntimeResult<()> {
        while at != 0 {
            self.stack.push(at);
            at = self.f.read_edge(at)?.left(self.adj);
        }
        Ok(())
    }
}

impl Iterator for AdjacentKeys<'_> {
    type Item = RuntimeResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let pos = self.stack.pop()?;
        let step = self.f.read_edge(pos).and_then(|e| {
            if e.anchor(self.adj) != self.anchor {
                return Err(CorruptKind::EdgeEndpoint.into());
            }
            self.push_left_spine(e.right(self.adj))?;
            let peer = self.f.read_node(e.peer(self.adj))?;
            String::from_utf8(peer.key).map_err(|_| CorruptKind::RecordKey.into())
        });
        if step.is_err() {
            self.fused = true;
        }
        Some(step)
    }
}

/// Flat scan over every slot, yielding the live edges. Order is slot order, which
/// means allocation order mangled by freelist reuse: treat it as arbitrary.
#[derive(Debug)]
pub struct Edges<'g> {
    f: &'g SlotFile,
    at: u64,
    fused: bool,
}

impl<'g> Edges<'g> {
    pub(crate) fn new(f: &'g SlotFile) -> Self {
        Self { f, at: 1, fused: false }
    }
}

impl Iterator for Edges<'_> {
    type Item = RuntimeResult<EdgeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        while self.at < self.f.state().tail {
            let pos = self.at;
            self.at += 1;
            let step: RuntimeResult<Option<EdgeEntry>> = (|| {
                if self.f.read_kind(pos)? != SlotKind::Edge {
                    return Ok(None);
                }
                let e = self.f.read_edge(pos)?;
                let source = self.f.read_node(e.source)?;
                let target = self.f.read_node(e.target)?;
                Ok(Some(EdgeEntry {
                    source: String::from_utf8(source.key)
                        .map_err(|_| CorruptKind::RecordKey)?,
                    target: String::from_utf8(target.key)
                        .map_err(|_| CorruptKind::RecordKey)?,
                    tag: e.tag,
                }))
            })();
            match step {
                Ok(None) => {}
                Ok(Some(entry)) => return Some(Ok(entry)),
                Err(e) => {
                    self.fused = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
