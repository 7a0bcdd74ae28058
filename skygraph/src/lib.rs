/*
 * Created on Mon Jan 06 2025
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

//! # Skygraph
//!
//! Skygraph is an embedded, single-file, on-disk directed graph store. Nodes are keyed
//! by strings, and both nodes and edges can carry fixed-size user attribute records. The
//! whole graph lives in one growable file of uniform slots; the working set is whatever
//! the operating system keeps in its page cache, never the graph itself.
//!
//! The major pieces, bottom up:
//! - the file format: a checksummed header, a bucket directory and an array of
//!   fixed-size record slots with a freelist for reuse.
//! - the index structures: a hash-partitioned binary search tree maps keys to node
//!   slots, and every node roots two more trees over its outgoing and incoming edges.
//! - [`Graph`]: the public handle tying the two together.
//! - [`chk`]: an offline consistency pass over all of the above.
//!
//! A handle is single-writer: open a file in read-write mode from exactly one process
//! (enforced with an advisory lock where the platform has one) or in read-only mode from
//! as many as you like.

#![deny(unreachable_patterns)]

#[macro_use]
mod macros;
mod error;
mod graph;
mod hash;
mod storage;
mod util;

pub mod chk;

pub use {
    error::{CorruptKind, GraphError, RuntimeResult},
    graph::{AdjacentKeys, EdgeData, EdgeEntry, Edges, Graph, NodeData, Nodes},
    storage::spec::Settings,
    util::os::SysIOError,
};

/// Result of a raw I/O operation
pub type IoResult<T> = Result<T, std::io::Error>;
