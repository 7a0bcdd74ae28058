/*
 * Created on Mon Jan 20 2025
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

/*
    This module implements the Fowler-Noll-Vo hash function.

    Two independent policies are deliberate: the 32-bit policy picks the bucket a key
    lands in, while the 64-bit policy orders keys *within* a bucket's tree. Using
    unrelated constants for the two keeps the bucket assignment from correlating with
    tree shape.
*/

use std::marker::PhantomData;

pub type BucketFnv = Fnv1a<Fnv1aPolicy32A>;
pub type KeyFnv = Fnv1a<Fnv1aPolicy64A>;

pub struct Fnv1aPolicy32A;
impl HashPolicy for Fnv1aPolicy32A {
    const OFFSET: u64 = 0x811C9DC5;
    const PRIME: u64 = 0x1000193;
    const MASK: u64 = u32::MAX as u64;
}

pub struct Fnv1aPolicy64A;
impl HashPolicy for Fnv1aPolicy64A {
    const OFFSET: u64 = 0xCBF29CE484222325;
    const PRIME: u64 = 0x100000001B3;
    const MASK: u64 = u64::MAX;
}

pub trait HashPolicy {
    const OFFSET: u64;
    const PRIME: u64;
    const MASK: u64;
}

pub struct Fnv1a<P: HashPolicy> {
    _m: PhantomData<P>,
}

impl<P: HashPolicy> Fnv1a<P> {
    pub const fn hash(src: &[u8]) -> u64 {
        let mut hash = P::OFFSET;
        let mut i = 0;
        while i < src.len() {
            hash ^= src[i] as u64;
            hash = hash.wrapping_mul(P::PRIME) & P::MASK;
            i += 1;
        }
        hash
    }
}

/// The ordering hash of a key: decides a key's position within its bucket tree and, by
/// extension, the position of adjacent edges within adjacency trees
pub const fn key_hash(key: &[u8]) -> u64 {
    KeyFnv::hash(key)
}

/// The partitioning hash of a key; reduce modulo the table size to get the bucket
pub const fn bucket_hash(key: &[u8]) -> u64 {
    BucketFnv::hash(key)
}

/// A stable identity hash for an edge, mixed from both endpoints' ordering hashes.
/// Asymmetric, so (u, v) and (v, u) disagree.
pub const fn pair_hash(source_hash: u64, target_hash: u64) -> u64 {
    source_hash
        .wrapping_mul(Fnv1aPolicy64A::PRIME)
        .rotate_left(29)
        ^ target_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv64_reference_vectors() {
        assert_eq!(key_hash(b""), 0xCBF29CE484222325);
        assert_eq!(key_hash(b"a"), 0xAF63DC4C8601EC8C);
        assert_eq!(key_hash(b"foobar"), 0x85944171F73967E8);
    }

    #[test]
    fn fnv32_reference_vectors() {
        assert_eq!(bucket_hash(b""), 0x811C9DC5);
        assert_eq!(bucket_hash(b"a"), 0xE40C292C);
        assert_eq!(bucket_hash(b"foobar"), 0xBF9CF968);
    }

    #[test]
    fn pair_hash_is_directed() {
        let (u, v) = (key_hash(b"u"), key_hash(b"v"));
        assert_ne!(pair_hash(u, v), pair_hash(v, u));
    }
}
