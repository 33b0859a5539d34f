// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Name hashing.

const FNV1_32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV1_32_PRIME: u32 = 0x0100_0193;

/// Compute the 32-bit FNV-1 hash of a byte string.
///
/// Names of structures, fields and entries are identified by this hash. Note
/// this is FNV-1 (multiply then xor), not FNV-1a.
pub fn fnv1_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV1_32_OFFSET_BASIS, |hash, b| {
        hash.wrapping_mul(FNV1_32_PRIME) ^ *b as u32
    })
}
