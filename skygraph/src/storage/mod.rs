/*
 * Created on Mon Feb 03 2025
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

//! # The file format
//!
//! One skygraph file is laid out as:
//!
//! ```text
//! 0                64               128              128 + 8T
//! +----------------+----------------+----------------+--------------------
//! |  static block  | dynamic block  | bucket dir (T) | slots (1-based) ...
//! +----------------+----------------+----------------+--------------------
//! ```
//!
//! The static block pins everything that never changes after creation: magic, versions,
//! byte order, the bucket count T, the maximum key length L, attribute sizes and the
//! derived record size. The dynamic block carries the live counters (node/edge counts,
//! next id, tail, freelist head) under a CRC and is rewritten on every structural
//! mutation. After the directory come the record slots, each exactly `record_size`
//! bytes; slot index 0 is reserved as nil so that a zero pointer always means "none".

pub mod file;
pub mod fs;
pub mod record;
pub mod spec;

/// Copy a fixed-size block out of a slice. Panics if `src` is not exactly `N` bytes,
/// which every caller guarantees with a constant range.
pub(crate) fn memcpy<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut block = [0u8; N];
    block.copy_from_slice(src);
    block
}
