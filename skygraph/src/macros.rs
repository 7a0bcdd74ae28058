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

macro_rules! sizeof {
    ($ty:ty) => {
        ::core::mem::size_of::<$ty>()
    };
    ($ty:ty, $by:literal) => {
        ::core::mem::size_of::<$ty>() * $by
    };
}

/// Fold a list of boolean expressions with `&&`
macro_rules! okay {
    ($($expr:expr),+ $(,)?) => {
        $($expr)&&+
    };
}

/// Declare a field-less `repr` enum whose discriminants are dense and ascending from
/// zero, with the raw-byte conversions the codec layer needs: `dscr()` to encode and
/// `try_from_raw()` to decode with an out-of-range check.
macro_rules! tagged_enum {
    ($(#[$attr:meta])* $vis:vis enum $name:ident: $dscr:ty {
        $($(#[$vattr:meta])* $variant:ident = $value:literal),+ $(,)?
    }) => {
        $(#[$attr])*
        #[repr($dscr)]
        $vis enum $name { $($(#[$vattr])* $variant = $value),+ }
        impl $name {
            // discriminants ascend from zero, so the last literal is the bound
            const LAST_DSCR: $dscr = {
                let vals = [$(($value) as $dscr),+];
                vals[vals.len() - 1]
            };
            /// The on-disk discriminant
            pub const fn dscr(self) -> $dscr {
                self as $dscr
            }
            /// Decode a stored discriminant, refusing anything out of range
            pub fn try_from_raw(d: $dscr) -> Option<Self> {
                if d > Self::LAST_DSCR {
                    None
                } else {
                    Some(unsafe {
                        // UNSAFE: in range, and the discriminant space has no holes
                        ::core::mem::transmute::<$dscr, Self>(d)
                    })
                }
            }
        }
    };
}
