/*
 * Created on Mon Mar 10 2025
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

//! # The graph handle
//!
//! [`Graph`] composes the slot file, the key index and the adjacency trees into the
//! public operations, and owns the two pieces of cross-structure discipline:
//!
//! - write ordering: a new record is fully on disk before any pointer makes it
//!   reachable, and the counters are written through at the end of every mutation, so
//!   the file stays forward-readable between operations.
//! - poisoning: once any mutation trips a structural error the handle refuses further
//!   mutation. The file did not get more broken by the refusal, and `sg-check` can say
//!   how broken it already was.

mod adjacency;
mod iter;
mod keyidx;
#[cfg(test)]
mod tests;

pub use iter::{AdjacentKeys, Edges, Nodes};

use {
    self::{
        adjacency::LocateEdge,
        keyidx::{Key, Locate, NodeRef},
    },
    crate::{
        error::{CorruptKind, GraphError, RuntimeResult},
        hash,
        storage::{
            file::SlotFile,
            record::{Adj, EdgeRecord, NodeLink, NodeRecord},
            spec::Settings,
        },
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A node as the caller sees it
pub struct NodeData {
    pub id: u64,
    pub key: String,
    pub attrs: Vec<u8>,
}

impl NodeData {
    fn from_record(n: NodeRecord) -> RuntimeResult<Self> {
        Ok(Self {
            id: n.id,
            key: String::from_utf8(n.key).map_err(|_| CorruptKind::RecordKey)?,
            attrs: n.attrs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An edge as the caller sees it
pub struct EdgeData {
    pub tag: u8,
    pub attrs: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One entry of the full edge scan
pub struct EdgeEntry {
    pub source: String,
    pub target: String,
    pub tag: u8,
}

/// An open graph file. Obtain one with [`Graph::create`], [`Graph::open_rw`] or
/// [`Graph::open_ro`]; the read-only flavor fails every mutator with
/// [`GraphError::ReadOnly`] and skips the writer lock.
///
/// Only string keys are stable references. Slot positions move when nodes are removed
/// and freed slots are recycled across record kinds, so nothing positional is exposed
/// here.
#[derive(Debug)]
pub struct Graph {
    file: SlotFile,
    poisoned: bool,
    closed: bool,
}

impl Graph {
    /// Create a new graph file at `path` (truncating anything already there)
    pub fn create(path: &str, settings: Settings) -> RuntimeResult<Self> {
        Ok(Self::new(SlotFile::create(path, settings)?))
    }
    /// Open an existing graph file for reading and writing
    pub fn open_rw(path: &str) -> RuntimeResult<Self> {
        Ok(Self::new(SlotFile::open(path, true)?))
    }
    /// Open an existing graph file read-only
    pub fn open_ro(path: &str) -> RuntimeResult<Self> {
        Ok(Self::new(SlotFile::open(path, false)?))
    }
    fn new(file: SlotFile) -> Self {
        Self {
            file,
            poisoned: false,
            closed: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.file.settings()
    }
    pub fn node_count(&self) -> u64 {
        self.file.state().n_nodes
    }
    pub fn edge_count(&self) -> u64 {
        self.file.state().n_edges
    }
    pub(crate) fn file(&self) -> &SlotFile {
        &self.file
    }

    fn guard_mut(&self) -> RuntimeResult<()> {
        if !self.file.is_writable() {
            return Err(GraphError::ReadOnly);
        }
        if self.poisoned {
            return Err(CorruptKind::Poisoned.into());
        }
        Ok(())
    }
    /// Mark the handle poisoned if the operation hit structural damage
    fn seal<T>(&mut self, r: RuntimeResult<T>) -> RuntimeResult<T> {
        if matches!(r, Err(GraphError::Corrupted(_))) {
            self.poisoned = true;
        }
        r
    }
    fn check_attrs(given: Option<&[u8]>, expected: u32) -> RuntimeResult<Vec<u8>> {
        match given {
            Some(a) if a.len() == expected as usize => Ok(a.to_vec()),
            Some(_) => Err(GraphError::AttrSizeMismatch),
            None => Ok(vec![0; expected as usize]),
        }
    }

    /*
        node operations
    */

    /// Insert a node with zeroed attributes. Returns the fresh auto-assigned id.
    pub fn add_node(&mut self, key: &str) -> RuntimeResult<u64> {
        let r = self.add_node_inner(key, None);
        self.seal(r)
    }
    /// Insert a node carrying `attrs` (must be exactly the configured size)
    pub fn add_node_with(&mut self, key: &str, attrs: &[u8]) -> RuntimeResult<u64> {
        let r = self.add_node_inner(key, Some(attrs));
        self.seal(r)
    }
    fn add_node_inner(&mut self, key: &str, attrs: Option<&[u8]>) -> RuntimeResult<u64> {
        self.guard_mut()?;
        let attrs = Self::check_attrs(attrs, self.file.settings().node_attr_size())?;
        let k = Key::analyze(key, self.file.settings())?;
        match keyidx::locate(&self.file, &k)? {
            Locate::Found(_) => Err(GraphError::AlreadyExists),
            Locate::Vacant(at) => {
                let (_, id) = self.create_node(&k, at, attrs)?;
                self.file.commit()?;
                Ok(id)
            }
        }
    }
    /// Write the record, then make it reachable, then bump the counters
    fn create_node(&mut self, k: &Key, at: NodeRef, attrs: Vec<u8>) -> RuntimeResult<(u64, u64)> {
        let pos = self.file.alloc()?;
        let id = self.file.state().next_id;
        self.file.write_node(&NodeRecord {
            id,
            pos,
            hash: k.hash,
            left: 0,
            right: 0,
            out_head: 0,
            in_head: 0,
            key: k.bytes.to_vec(),
            attrs,
        })?;
        keyidx::link(&mut self.file, at, pos)?;
        let st = self.file.state_mut();
        st.next_id += 1;
        st.n_nodes += 1;
        Ok((pos, id))
    }

    pub fn has_node(&self, key: &str) -> RuntimeResult<bool> {
        let k = Key::analyze(key, self.file.settings())?;
        Ok(keyidx::lookup(&self.file, &k)?.is_some())
    }
    pub fn get_node(&self, key: &str) -> RuntimeResult<NodeData> {
        let k = Key::analyze(key, self.file.settings())?;
        let pos = keyidx::lookup(&self.file, &k)?.ok_or(GraphError::NotFound)?;
        NodeData::from_record(self.file.read_node(pos)?)
    }
    /// Replace the node's whole attribute region
    pub fn set_node(&mut self, key: &str, attrs: &[u8]) -> RuntimeResult<()> {
        let r = self.set_node_inner(key, attrs);
        self.seal(r)
    }
    fn set_node_inner(&mut self, key: &str, attrs: &[u8]) -> RuntimeResult<()> {
        self.guard_mut()?;
        if attrs.len() != self.file.settings().node_attr_size() as usize {
            return Err(GraphError::AttrSizeMismatch);
        }
        let k = Key::analyze(key, self.file.settings())?;
        let pos = keyidx::lookup(&self.file, &k)?.ok_or(GraphError::NotFound)?;
        self.file.write_node_attrs(pos, attrs)
    }
    /// Remove the node and every edge incident to it
    pub fn remove_node(&mut self, key: &str) -> RuntimeResult<()> {
        let r = self.remove_node_inner(key);
        self.seal(r)
    }
    fn remove_node_inner(&mut self, key: &str) -> RuntimeResult<()> {
        self.guard_mut()?;
        let k = Key::analyze(key, self.file.settings())?;
        let u_pos = keyidx::lookup(&self.file, &k)?.ok_or(GraphError::NotFound)?;
        let u = self.file.read_node(u_pos)?;
        // drain the out-tree: every edge leaves its target's in-tree and dies. The
        // record is read (and its children queued) before the slot is freed.
        let mut stack = Vec::new();
        if u.out_head != 0 {
            stack.push(u.out_head);
        }
        while let Some(pos) = stack.pop() {
            let e = self.file.read_edge(pos)?;
            if e.source != u_pos {
                return Err(CorruptKind::EdgeEndpoint.into());
            }
            if e.out_left != 0 {
                stack.push(e.out_left);
            }
            if e.out_right != 0 {
                stack.push(e.out_right);
            }
            let w = self.file.read_node(e.target)?;
            self.detach(&w, Adj::In, k.hash, k.bytes, pos)?;
            self.file.free(pos)?;
            self.file.state_mut().n_edges -= 1;
        }
        self.file.write_node_link(u_pos, NodeLink::OutHead, 0)?;
        // drain the in-tree symmetrically; self-loops are already gone
        let u = self.file.read_node(u_pos)?;
        if u.in_head != 0 {
            stack.push(u.in_head);
        }
        while let Some(pos) = stack.pop() {
            let e = self.file.read_edge(pos)?;
            if e.target != u_pos {
                return Err(CorruptKind::EdgeEndpoint.into());
            }
            if e.in_left != 0 {
                stack.push(e.in_left);
            }
            if e.in_right != 0 {
                stack.push(e.in_right);
            }
            let w = self.file.read_node(e.source)?;
            self.detach(&w, Adj::Out, k.hash, k.bytes, pos)?;
            self.file.free(pos)?;
            self.file.state_mut().n_edges -= 1;
        }
        self.file.write_node_link(u_pos, NodeLink::InHead, 0)?;
        keyidx::remove(&mut self.file, &k)?;
        self.file.state_mut().n_nodes -= 1;
        self.file.commit()
    }
    /// Unlink the edge `expect` from `anchor`'s tree, found by descending on the far
    /// endpoint's key. Landing anywhere else means the trees disagree.
    fn detach(
        &mut self,
        anchor: &NodeRecord,
        adj: Adj,
        peer_hash: u64,
        peer_key: &[u8],
        expect: u64,
    ) -> RuntimeResult<()> {
        match adjacency::locate(&self.file, anchor, adj, peer_hash, peer_key)? {
            LocateEdge::Found { pos, at } if pos == expect => {
                adjacency::unlink(&mut self.file, pos, at, adj)?;
                Ok(())
            }
            _ => Err(CorruptKind::Adjacency.into()),
        }
    }

    /*
        edge operations
    */

    /// Insert the edge (src, dst), creating either endpoint if it is missing
    pub fn add_edge(&mut self, src: &str, dst: &str) -> RuntimeResult<()> {
        let r = self.add_edge_inner(src, dst, 0, None);
        self.seal(r)
    }
    /// Insert the edge (src, dst) with a type tag and attributes
    pub fn add_edge_with(
        &mut self,
        src: &str,
        dst: &str,
        tag: u8,
        attrs: &[u8],
    ) -> RuntimeResult<()> {
        let r = self.add_edge_inner(src, dst, tag, Some(attrs));
        self.seal(r)
    }
    fn add_edge_inner(
        &mut self,
        src: &str,
        dst: &str,
        tag: u8,
        attrs: Option<&[u8]>,
    ) -> RuntimeResult<()> {
        self.guard_mut()?;
        let attrs = Self::check_attrs(attrs, self.file.settings().edge_attr_size())?;
        let ks = Key::analyze(src, self.file.settings())?;
        let kd = Key::analyze(dst, self.file.settings())?;
        let u_pos = self.ensure_node(&ks)?;
        let v_pos = self.ensure_node(&kd)?;
        // both splice points are found before the slot is allocated, so a duplicate
        // costs nothing and needs no rollback
        let u = self.file.read_node(u_pos)?;
        let out_at = match adjacency::locate(&self.file, &u, Adj::Out, kd.hash, kd.bytes)? {
            LocateEdge::Found { .. } => return Err(GraphError::AlreadyExists),
            LocateEdge::Vacant(at) => at,
        };
        let v = self.file.read_node(v_pos)?;
        let in_at = match adjacency::locate(&self.file, &v, Adj::In, ks.hash, ks.bytes)? {
            // the out-tree just said the edge is absent
            LocateEdge::Found { .. } => return Err(CorruptKind::Adjacency.into()),
            LocateEdge::Vacant(at) => at,
        };
        let pos = self.file.alloc()?;
        self.file.write_edge(
            pos,
            &EdgeRecord {
                tag,
                source: u_pos,
                target: v_pos,
                hash: hash::pair_hash(ks.hash, kd.hash),
                out_left: 0,
                out_right: 0,
                in_left: 0,
                in_right: 0,
                attrs,
            },
        )?;
        adjacency::link(&mut self.file, out_at, pos)?;
        adjacency::link(&mut self.file, in_at, pos)?;
        self.file.state_mut().n_edges += 1;
        self.file.commit()
    }
    /// Resolve the key to a slot, creating the node (zeroed attributes) if absent.
    /// A created endpoint is committed immediately and survives even if the edge
    /// insert then fails as a duplicate.
    fn ensure_node(&mut self, k: &Key) -> RuntimeResult<u64> {
        match keyidx::locate(&self.file, k)? {
            Locate::Found(pos) => Ok(pos),
            Locate::Vacant(at) => {
                let attrs = vec![0; self.file.settings().node_attr_size() as usize];
                let (pos, _) = self.create_node(k, at, attrs)?;
                self.file.commit()?;
                Ok(pos)
            }
        }
    }

    pub fn has_edge(&self, src: &str, dst: &str) -> RuntimeResult<bool> {
        match self.find_edge(src, dst)? {
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
    pub fn get_edge(&self, src: &str, dst: &str) -> RuntimeResult<EdgeData> {
        let (_, e) = self
            .find_edge(src, dst)?
            .ok_or(GraphError::NotFound)?;
        Ok(EdgeData {
            tag: e.tag,
            attrs: e.attrs,
        })
    }
    /// Replace the edge's whole attribute region
    pub fn set_edge(&mut self, src: &str, dst: &str, attrs: &[u8]) -> RuntimeResult<()> {
        let r = self.set_edge_inner(src, dst, attrs);
        self.seal(r)
    }
    fn set_edge_inner(&mut self, src: &str, dst: &str, attrs: &[u8]) -> RuntimeResult<()> {
        self.guard_mut()?;
        if attrs.len() != self.file.settings().edge_attr_size() as usize {
            return Err(GraphError::AttrSizeMismatch);
        }
        let (pos, _) = self
            .find_edge(src, dst)?
            .ok_or(GraphError::NotFound)?;
        self.file.write_edge_attrs(pos, attrs)
    }
    /// Find (src, dst) through src's out-tree. `None` when either endpoint or the
    /// edge itself is absent.
    fn find_edge(&self, src: &str, dst: &str) -> RuntimeResult<Option<(u64, EdgeRecord)>> {
        let ks = Key::analyze(src, self.file.settings())?;
        let kd = Key::analyze(dst, self.file.settings())?;
        let Some(u_pos) = keyidx::lookup(&self.file, &ks)? else {
            return Ok(None);
        };
        let Some(v_pos) = keyidx::lookup(&self.file, &kd)? else {
            return Ok(None);
        };
        let u = self.file.read_node(u_pos)?;
        match adjacency::locate(&self.file, &u, Adj::Out, kd.hash, kd.bytes)? {
            LocateEdge::Found { pos, .. } => {
                let e = self.file.read_edge(pos)?;
                if e.target != v_pos {
                    return Err(CorruptKind::EdgeEndpoint.into());
                }
                Ok(Some((pos, e)))
            }
            LocateEdge::Vacant(_) => Ok(None),
        }
    }
    pub fn remove_edge(&mut self, src: &str, dst: &str) -> RuntimeResult<()> {
        let r = self.remove_edge_inner(src, dst);
        self.seal(r)
    }
    fn remove_edge_inner(&mut self, src: &str, dst: &str) -> RuntimeResult<()> {
        self.guard_mut()?;
        let ks = Key::analyze(src, self.file.settings())?;
        let kd = Key::analyze(dst, self.file.settings())?;
        let u_pos = keyidx::lookup(&self.file, &ks)?.ok_or(GraphError::NotFound)?;
        let v_pos = keyidx::lookup(&self.file, &kd)?.ok_or(GraphError::NotFound)?;
        let u = self.file.read_node(u_pos)?;
        let (e_pos, out_at) = match adjacency::locate(&self.file, &u, Adj::Out, kd.hash, kd.bytes)? {
            LocateEdge::Found { pos, at } => (pos, at),
            LocateEdge::Vacant(_) => return Err(GraphError::NotFound),
        };
        if self.file.read_edge(e_pos)?.target != v_pos {
            return Err(CorruptKind::EdgeEndpoint.into());
        }
        adjacency::unlink(&mut self.file, e_pos, out_at, Adj::Out)?;
        // reread the target: a self-loop's out-unlink may have moved its heads
        let v = self.file.read_node(v_pos)?;
        match adjacency::locate(&self.file, &v, Adj::In, ks.hash, ks.bytes)? {
            LocateEdge::Found { pos, at } if pos == e_pos => {
                adjacency::unlink(&mut self.file, pos, at, Adj::In)?;
            }
            _ => return Err(CorruptKind::Adjacency.into()),
        }
        self.file.free(e_pos)?;
        self.file.state_mut().n_edges -= 1;
        self.file.commit()
    }

    /*
        iteration
    */

    /// The keys this node points at, in hash order
    pub fn neighbors(&self, key: &str) -> RuntimeResult<AdjacentKeys<'_>> {
        self.adjacent(key, Adj::Out)
    }
    /// The keys pointing at this node, in hash order
    pub fn predecessors(&self, key: &str) -> RuntimeResult<AdjacentKeys<'_>> {
        self.adjacent(key, Adj::In)
    }
    fn adjacent(&self, key: &str, adj: Adj) -> RuntimeResult<AdjacentKeys<'_>> {
        let k = Key::analyze(key, self.file.settings())?;
        let pos = keyidx::lookup(&self.file, &k)?.ok_or(GraphError::NotFound)?;
        let n = self.file.read_node(pos)?;
        AdjacentKeys::new(&self.file, &n, adj)
    }
    /// Every node in the graph
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes::new(&self.file)
    }
    /// Every edge in the graph
    pub fn edges(&self) -> Edges<'_> {
        Edges::new(&self.file)
    }

    /*
        durability
    */

    /// Write the counters through and fsync. This is the durability boundary: nothing
    /// is guaranteed to survive a crash past the last flush.
    pub fn flush(&mut self) -> RuntimeResult<()> {
        if !self.file.is_writable() {
            return Ok(());
        }
        self.file.commit()?;
        self.file.fsync()
    }
    /// Flush and consume the handle. Dropping without closing flushes on a best-effort
    /// basis and logs on failure.
    pub fn close(mut self) -> RuntimeResult<()> {
        self.closed = true;
        if self.file.is_writable() {
            self.file.commit()?;
            self.file.fsync()?;
        }
        Ok(())
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if self.file.is_writable() && !self.closed {
            let flushed = self.file.commit().and_then(|_| self.file.fsync());
            if flushed.is_err() {
                log::warn!("failed to flush graph file on drop");
            }
        }
    }
}
