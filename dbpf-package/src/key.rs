// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resource keys.

use {
    crate::Error,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

const FNV1A_64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A_64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Compute the 64-bit FNV-1a hash of a byte string.
///
/// This is the hash used to derive resource instance numbers from names.
/// It is unrelated to the 32-bit FNV-1 hash naming fields inside `DATA`
/// resources and the two must not be interchanged.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV1A_64_OFFSET_BASIS, |hash, b| {
        (hash ^ *b as u64).wrapping_mul(FNV1A_64_PRIME)
    })
}

/// Identifies a single resource within a package.
///
/// Keys order lexicographically by type, then group, then instance. The
/// derived ordering relies on the field declaration order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceKey {
    /// Resource type identifier.
    pub resource_type: u32,

    /// Resource group.
    pub group: u32,

    /// Resource instance.
    pub instance: u64,
}

impl ResourceKey {
    pub fn new(resource_type: u32, group: u32, instance: u64) -> Self {
        Self {
            resource_type,
            group,
            instance,
        }
    }

    /// Construct a key whose instance is the FNV-1a hash of a name.
    pub fn from_instance_name(resource_type: u32, group: u32, name: &str) -> Self {
        Self::new(resource_type, group, fnv1a_64(name.as_bytes()))
    }

    /// High 32 bits of the instance, as stored in index records.
    pub fn instance_high(&self) -> u32 {
        (self.instance >> 32) as u32
    }

    /// Low 32 bits of the instance, as stored in index records.
    pub fn instance_low(&self) -> u32 {
        self.instance as u32
    }

    /// Reassemble a key from the split representation used by index records.
    pub fn from_parts(resource_type: u32, group: u32, instance_high: u32, instance_low: u32) -> Self {
        Self::new(
            resource_type,
            group,
            ((instance_high as u64) << 32) | instance_low as u64,
        )
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X}:{:08X}:{:016X}",
            self.resource_type, self.group, self.instance
        )
    }
}

impl FromStr for ResourceKey {
    type Err = Error;

    /// Parse the `TTTTTTTT:GGGGGGGG:IIIIIIIIIIIIIIII` form emitted by [Display].
    ///
    /// Components are hexadecimal and may carry an optional `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(':').collect::<Vec<_>>();

        if parts.len() != 3 {
            return Err(Error::KeyParse(s.to_string()));
        }

        let strip = |v: &str| -> String {
            v.trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X")
                .to_string()
        };

        let resource_type = u32::from_str_radix(&strip(parts[0]), 16)
            .map_err(|_| Error::KeyParse(s.to_string()))?;
        let group = u32::from_str_radix(&strip(parts[1]), 16)
            .map_err(|_| Error::KeyParse(s.to_string()))?;
        let instance = u64::from_str_radix(&strip(parts[2]), 16)
            .map_err(|_| Error::KeyParse(s.to_string()))?;

        Ok(Self::new(resource_type, group, instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let a = ResourceKey::new(1, 9, 9);
        let b = ResourceKey::new(2, 0, 0);
        let c = ResourceKey::new(2, 0, 1);
        let d = ResourceKey::new(2, 1, 0);

        let mut keys = vec![d, c, b, a];
        keys.sort();

        assert_eq!(keys, vec![a, b, c, d]);
    }

    #[test]
    fn instance_split() {
        let key = ResourceKey::new(0x0166_1233, 0, 0x0123_4567_89ab_cdef);

        assert_eq!(key.instance_high(), 0x0123_4567);
        assert_eq!(key.instance_low(), 0x89ab_cdef);
        assert_eq!(
            ResourceKey::from_parts(0x0166_1233, 0, 0x0123_4567, 0x89ab_cdef),
            key
        );
    }

    #[test]
    fn text_form() -> Result<(), Error> {
        let key = ResourceKey::new(0x0166_1233, 0x8000_0000, 1);
        let s = key.to_string();

        assert_eq!(s, "01661233:80000000:0000000000000001");
        assert_eq!(s.parse::<ResourceKey>()?, key);
        assert_eq!(
            "0x01661233:0x0:0x1".parse::<ResourceKey>()?,
            ResourceKey::new(0x0166_1233, 0, 1)
        );
        assert!("01661233:0".parse::<ResourceKey>().is_err());
        assert!("zz:0:0".parse::<ResourceKey>().is_err());

        Ok(())
    }

    #[test]
    fn fnv1a_64_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x8594_4171_f739_67e8);
    }
}
