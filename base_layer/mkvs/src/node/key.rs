// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::{Debug, Display, Formatter},
    io,
};

use borsh::{BorshDeserialize, BorshSerialize};
use tari_utilities::hex::to_hex;
use thiserror::Error;

/// A bit position or a bit length within a [`Key`].
pub type Depth = u16;

/// An ordered sequence of bits, most significant bit of the first byte first.
///
/// The bit length is tracked explicitly, so a key need not be byte aligned. Keys are always kept in canonical form:
/// exactly `ceil(bit_length / 8)` bytes, with every bit past `bit_length` cleared. This makes the derived equality and
/// hashing correct and is enforced when decoding.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Key {
    bytes: Vec<u8>,
    bit_length: Depth,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Key of {len} bytes exceeds the maximum of {max}")]
    TooLong { len: usize, max: usize },
}

/// Gets the bit at an offset from the most significant bit. Does NOT perform range checking
#[inline]
fn get_bit(data: &[u8], position: usize) -> bool {
    data[position / 8] & (0x80 >> (position % 8)) != 0
}

#[inline]
fn set_bit(data: &mut [u8], position: usize) {
    data[position / 8] |= 0x80 >> (position % 8);
}

#[inline]
const fn byte_length(bit_length: usize) -> usize {
    (bit_length + 7) / 8
}

impl Key {
    /// The longest byte-aligned key whose bit length still fits in a [`Depth`].
    pub const MAX_BYTE_LENGTH: usize = Depth::MAX as usize / 8;

    /// Creates a byte-aligned key, or fails if `bytes` is longer than [`Key::MAX_BYTE_LENGTH`].
    pub fn try_new(bytes: Vec<u8>) -> Result<Self, KeyError> {
        if bytes.len() > Self::MAX_BYTE_LENGTH {
            return Err(KeyError::TooLong {
                len: bytes.len(),
                max: Self::MAX_BYTE_LENGTH,
            });
        }
        let bit_length = (bytes.len() * 8) as Depth;
        Ok(Self { bytes, bit_length })
    }

    /// Creates a byte-aligned key.
    ///
    /// Panics if `bytes` is longer than [`Key::MAX_BYTE_LENGTH`]. Use [`Key::try_new`] for untrusted input.
    pub fn new(bytes: Vec<u8>) -> Self {
        assert!(
            bytes.len() <= Self::MAX_BYTE_LENGTH,
            "mkvs: key of {} bytes exceeds the maximum of {}",
            bytes.len(),
            Self::MAX_BYTE_LENGTH
        );
        let bit_length = (bytes.len() * 8) as Depth;
        Self { bytes, bit_length }
    }

    /// Creates a key holding the first `bit_length` bits of `bytes`. Missing bits are zero.
    pub fn from_bits(mut bytes: Vec<u8>, bit_length: Depth) -> Self {
        bytes.resize(byte_length(bit_length as usize), 0);
        let rem = bit_length % 8;
        if rem != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xff << (8 - rem);
            }
        }
        Self { bytes, bit_length }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bit_length(&self) -> Depth {
        self.bit_length
    }

    pub fn is_empty(&self) -> bool {
        self.bit_length == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the bit at `position`. Panics if `position` is not below the bit length.
    pub fn get_bit(&self, position: Depth) -> bool {
        assert!(
            position < self.bit_length,
            "mkvs: bit {} out of range for key of {} bits",
            position,
            self.bit_length
        );
        get_bit(&self.bytes, position as usize)
    }

    /// The first `bit_length` bits of this key (or the whole key if it is shorter).
    pub fn prefix(&self, bit_length: Depth) -> Key {
        let bit_length = bit_length.min(self.bit_length);
        Key::from_bits(self.bytes[..byte_length(bit_length as usize)].to_vec(), bit_length)
    }

    /// Splits the key at `split_point` into the bits before it and the bits from it onwards.
    pub fn split(&self, split_point: Depth) -> (Key, Key) {
        let split_point = split_point.min(self.bit_length);
        let suffix_length = (self.bit_length - split_point) as usize;
        let mut suffix = vec![0u8; byte_length(suffix_length)];
        if split_point % 8 == 0 {
            let start = split_point as usize / 8;
            suffix.copy_from_slice(&self.bytes[start..start + byte_length(suffix_length)]);
        } else {
            for i in 0..suffix_length {
                if get_bit(&self.bytes, split_point as usize + i) {
                    set_bit(&mut suffix, i);
                }
            }
        }
        (self.prefix(split_point), Key {
            bytes: suffix,
            bit_length: suffix_length as Depth,
        })
    }

    /// The first `bit_length` bits of this key followed by `bit`.
    pub fn append_bit(&self, bit_length: Depth, bit: bool) -> Key {
        let mut key = self.prefix(bit_length);
        let position = key.bit_length as usize;
        assert!(position < Depth::MAX as usize, "mkvs: key length overflow");
        key.bit_length += 1;
        key.bytes.resize(byte_length(key.bit_length as usize), 0);
        if bit {
            set_bit(&mut key.bytes, position);
        }
        key
    }

    /// The first `bit_length` bits of this key followed by all bits of `label`.
    pub fn merge(&self, bit_length: Depth, label: &Key) -> Key {
        let mut key = self.prefix(bit_length);
        let offset = key.bit_length as usize;
        let total = offset + label.bit_length as usize;
        assert!(total <= Depth::MAX as usize, "mkvs: key length overflow");
        key.bytes.resize(byte_length(total), 0);
        if offset % 8 == 0 {
            key.bytes[offset / 8..].copy_from_slice(&label.bytes);
        } else {
            for i in 0..label.bit_length as usize {
                if get_bit(&label.bytes, i) {
                    set_bit(&mut key.bytes, offset + i);
                }
            }
        }
        key.bit_length = total as Depth;
        key
    }

    /// The number of leading bits the two keys have in common.
    pub fn common_prefix_len(&self, other: &Key) -> Depth {
        let n = self.bit_length.min(other.bit_length) as usize;
        let mut offset = 0;
        while (offset + 1) * 8 <= n && self.bytes[offset] == other.bytes[offset] {
            offset += 1;
        }
        let mut i = offset * 8;
        while i < n && get_bit(&self.bytes, i) == get_bit(&other.bytes, i) {
            i += 1;
        }
        i as Depth
    }

    /// Whether the bits `[offset, offset + label.bit_length())` of this key are exactly `label`.
    pub fn matches_at(&self, offset: Depth, label: &Key) -> bool {
        if offset as usize + label.bit_length as usize > self.bit_length as usize {
            return false;
        }
        (0..label.bit_length as usize).all(|i| get_bit(&self.bytes, offset as usize + i) == get_bit(&label.bytes, i))
    }
}

/// Panics on keys longer than [`Key::MAX_BYTE_LENGTH`], see [`Key::try_new`].
impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key::new(bytes)
    }
}

/// Panics on keys longer than [`Key::MAX_BYTE_LENGTH`], see [`Key::try_new`].
impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key::new(bytes.to_vec())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.bit_length <= 64 {
            for i in 0..self.bit_length as usize {
                f.write_str(if get_bit(&self.bytes, i) { "1" } else { "0" })?;
            }
            if self.bit_length == 0 {
                f.write_str("<empty>")?;
            }
            Ok(())
        } else {
            write!(f, "{}/{}", to_hex(&self.bytes), self.bit_length)
        }
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

impl BorshSerialize for Key {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        self.bit_length.serialize(writer)?;
        self.bytes.serialize(writer)
    }
}

impl BorshDeserialize for Key {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let bit_length = Depth::deserialize_reader(reader)?;
        let bytes = Vec::<u8>::deserialize_reader(reader)?;
        if bytes.len() != byte_length(bit_length as usize) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("key of {} bits encoded with {} bytes", bit_length, bytes.len()),
            ));
        }
        let key = Key::from_bits(bytes.clone(), bit_length);
        if key.bytes != bytes {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "non-canonical key padding"));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bits(s: &str) -> Key {
        let mut key = Key::empty();
        for (i, c) in s.chars().enumerate() {
            key = key.append_bit(i as Depth, c == '1');
        }
        key
    }

    #[test]
    fn get_bits() {
        let key = Key::new(vec![0b1010_1010, 0b1010_1010, 0b0000_0000, 0b1111_1111]);
        assert_eq!(key.bit_length(), 32);
        for i in 0..16 {
            assert_eq!(key.get_bit(i), i % 2 == 0);
        }
        for i in 16..24 {
            assert!(!key.get_bit(i));
        }
        for i in 24..32 {
            assert!(key.get_bit(i));
        }
    }

    #[test]
    #[should_panic]
    fn get_bit_out_of_range() {
        bits("101").get_bit(3);
    }

    #[test]
    fn from_bits_is_canonical() {
        let key = Key::from_bits(vec![0xff, 0xff], 3);
        assert_eq!(key.as_bytes(), &[0b1110_0000]);
        assert_eq!(key, bits("111"));
        let key = Key::from_bits(vec![0x80], 12);
        assert_eq!(key.as_bytes(), &[0x80, 0x00]);
        assert_eq!(key.to_string(), "100000000000");
    }

    #[test]
    fn split_and_merge() {
        let key = Key::new(b"ab".to_vec());
        // 'a' = 01100001, 'b' = 01100010
        let (prefix, suffix) = key.split(3);
        assert_eq!(prefix, bits("011"));
        assert_eq!(suffix, bits("0000101100010"));
        assert_eq!(prefix.merge(3, &suffix), key);

        let (prefix, suffix) = key.split(8);
        assert_eq!(prefix, Key::new(b"a".to_vec()));
        assert_eq!(suffix, Key::new(b"b".to_vec()));
        assert_eq!(prefix.merge(8, &suffix), key);

        let (prefix, suffix) = key.split(0);
        assert!(prefix.is_empty());
        assert_eq!(suffix, key);

        let (prefix, suffix) = key.split(100);
        assert_eq!(prefix, key);
        assert!(suffix.is_empty());
    }

    #[test]
    fn merge_truncates_to_bit_length() {
        let key = bits("110101");
        assert_eq!(key.merge(2, &bits("0")), bits("110"));
        assert_eq!(key.merge(0, &bits("01")), bits("01"));
        assert_eq!(key.merge(6, &Key::empty()), key);
    }

    #[test]
    fn append_bits() {
        let key = bits("1010");
        assert_eq!(key.append_bit(4, true), bits("10101"));
        assert_eq!(key.append_bit(2, true), bits("101"));
        assert_eq!(Key::empty().append_bit(0, false), bits("0"));
        assert_eq!(Key::new(vec![0xff]).append_bit(8, true).as_bytes(), &[0xff, 0x80]);
    }

    #[test]
    fn common_prefix() {
        let a = Key::new(b"abcdefgh12345678abcdefgh12345678".to_vec());
        let b = Key::new(b"abcdefgh12345678abcdefgh12345678".to_vec());
        assert_eq!(a.common_prefix_len(&b), 256);
        // 'd' in binary is 01100100
        // 'D' in binary is 01000100
        let b = Key::new(b"abcDEFgh12345678abcdefgh12345678".to_vec());
        assert_eq!(a.common_prefix_len(&b), 3 * 8 + 2);
        let b = Key::new(b"\xffbcdefgh12345678abcdefgh12345678".to_vec());
        assert_eq!(a.common_prefix_len(&b), 0);
        // limited by the shorter key
        assert_eq!(a.common_prefix_len(&a.prefix(13)), 13);
        assert_eq!(bits("1011").common_prefix_len(&bits("1010")), 3);
    }

    #[test]
    fn matches_at() {
        let key = bits("0110101");
        assert!(key.matches_at(0, &bits("011")));
        assert!(key.matches_at(3, &bits("0101")));
        assert!(!key.matches_at(3, &bits("011")));
        assert!(!key.matches_at(5, &bits("011")));
        assert!(key.matches_at(7, &Key::empty()));
    }

    #[test]
    fn oversized_keys_are_rejected() {
        let longest = vec![0xab; Key::MAX_BYTE_LENGTH];
        let key = Key::try_new(longest.clone()).unwrap();
        assert_eq!(key, Key::new(longest));
        assert_eq!(key.bit_length() as usize, Key::MAX_BYTE_LENGTH * 8);
        assert_eq!(
            Key::try_new(vec![0; Key::MAX_BYTE_LENGTH + 1]),
            Err(KeyError::TooLong {
                len: Key::MAX_BYTE_LENGTH + 1,
                max: Key::MAX_BYTE_LENGTH
            })
        );
        assert_eq!(Key::try_new(vec![]).unwrap(), Key::empty());
    }

    #[test]
    #[should_panic]
    fn new_panics_on_oversized_keys() {
        let _ = Key::new(vec![0; Key::MAX_BYTE_LENGTH + 1]);
    }

    #[test]
    fn decode_rejects_non_canonical_keys() {
        let key = bits("10110");
        let encoded = borsh::to_vec(&key).unwrap();
        assert_eq!(borsh::from_slice::<Key>(&encoded).unwrap(), key);

        // padding bit set
        let mut bad = encoded.clone();
        *bad.last_mut().unwrap() |= 0x01;
        assert!(borsh::from_slice::<Key>(&bad).is_err());

        // byte length does not agree with the bit length
        let mut bad = encoded;
        bad[0] = 9;
        assert!(borsh::from_slice::<Key>(&bad).is_err());
    }
}
