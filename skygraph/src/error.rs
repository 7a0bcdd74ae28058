/*
 * Created on Tue Jan 14 2025
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

use {crate::util::os::SysIOError, core::fmt, std::io};

pub type RuntimeResult<T> = Result<T, GraphError>;

#[derive(Debug, PartialEq)]
/// An error returned by a public graph operation
pub enum GraphError {
    /// the referenced node or edge is absent
    NotFound,
    /// the key, or the (source, target) pair, is already present
    AlreadyExists,
    /// the key is longer than the file's maximum key length
    KeyTooLong,
    /// the key is empty or contains a NUL byte
    InvalidKey,
    /// the attribute buffer does not match the configured attribute size
    AttrSizeMismatch,
    /// a creation-time parameter is out of range
    BadSettings(&'static str),
    /// a mutation was attempted through a read-only handle
    ReadOnly,
    /// a structural invariant does not hold on disk; close the handle
    Corrupted(CorruptKind),
    /// an I/O level error
    Io(SysIOError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
/// What exactly failed a structural check. [`GraphError::Corrupted`] carries one of
/// these so that tooling can tell header damage from index damage.
pub enum CorruptKind {
    /// the magic block does not identify a skygraph file
    HeaderMagic,
    /// the header or engine version is not one this build understands
    HeaderVersion,
    /// the file was written with a byte order this build does not read
    HeaderEndian,
    /// the mutable header block failed its checksum
    HeaderChecksum,
    /// header geometry (table size, key length, record size) is inconsistent
    HeaderGeometry,
    /// a slot discriminator does not match the record kind expected there
    RecordKind,
    /// stored key bytes violate the padding rules or are not valid UTF-8
    RecordKey,
    /// a slot pointer is outside the file's live slot range
    PointerRange,
    /// an edge names a slot that is not its endpoint
    EdgeEndpoint,
    /// an edge is not linked where the opposite tree says it must be
    Adjacency,
    /// a freelist entry is not a tombstone
    Freelist,
    /// the handle was poisoned by an earlier structural error
    Poisoned,
}

impl From<CorruptKind> for GraphError {
    fn from(k: CorruptKind) -> Self {
        Self::Corrupted(k)
    }
}

impl From<io::Error> for GraphError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.into())
    }
}

impl From<SysIOError> for GraphError {
    fn from(e: SysIOError) -> Self {
        Self::Io(e)
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::AlreadyExists => f.write_str("already exists"),
            Self::KeyTooLong => f.write_str("key exceeds the maximum key length"),
            Self::InvalidKey => f.write_str("key is empty or contains a NUL byte"),
            Self::AttrSizeMismatch => f.write_str("attribute buffer has the wrong size"),
            Self::BadSettings(which) => write!(f, "bad settings: {which}"),
            Self::ReadOnly => f.write_str("handle is read-only"),
            Self::Corrupted(k) => write!(f, "file is corrupted ({k})"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl fmt::Display for CorruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::HeaderMagic => "bad magic",
            Self::HeaderVersion => "unknown version",
            Self::HeaderEndian => "foreign byte order",
            Self::HeaderChecksum => "header checksum mismatch",
            Self::HeaderGeometry => "inconsistent header geometry",
            Self::RecordKind => "unexpected record kind",
            Self::RecordKey => "damaged key field",
            Self::PointerRange => "slot pointer out of range",
            Self::EdgeEndpoint => "edge endpoint mismatch",
            Self::Adjacency => "adjacency trees disagree",
            Self::Freelist => "freelist damage",
            Self::Poisoned => "handle poisoned by earlier corruption",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for GraphError {}
