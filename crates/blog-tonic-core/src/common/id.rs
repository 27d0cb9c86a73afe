//! # Blog Identifier Codec
//!
//! Blog posts are keyed by MongoDB [`ObjectId`]s in storage and by their
//! lowercase hexadecimal rendering on the wire. [`BlogId`] is the bridge
//! between the two.
//!
//! ## Wire format
//!
//! - Exactly [`BlogId::HEX_LEN`] ASCII characters.
//! - Only `0-9` and `a-f`. Uppercase digits are rejected so that
//!   `encode(decode(s)) == s` holds for every accepted `s`.
//!
//! ```
//! use blog_tonic_core::BlogId;
//!
//! let id = BlogId::decode("602a5d6b2738b05ae3c7bde2").unwrap();
//! assert_eq!(id.to_string(), "602a5d6b2738b05ae3c7bde2");
//! assert!(BlogId::decode("602A5D6B2738B05AE3C7BDE2").is_err());
//! ```

use bson::oid::ObjectId;
use core::fmt;
use core::str::FromStr;

/// Store-assigned primary key of a blog post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlogId(ObjectId);

/// Reasons a wire identifier failed to decode.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid length: {len} (expected {})", BlogId::HEX_LEN)]
    InvalidLength { len: usize },
    #[error("invalid byte 0x{byte:02x} at index {index}")]
    InvalidCharacter { byte: u8, index: usize },
}

impl BlogId {
    /// Number of bytes in the binary form.
    pub const BYTES_LEN: usize = 12;

    /// Number of characters in the wire form.
    pub const HEX_LEN: usize = Self::BYTES_LEN * 2;

    /// Decodes a wire identifier.
    pub fn decode(hex: &str) -> Result<Self, IdError> {
        let bytes = hex.as_bytes();
        if bytes.len() != Self::HEX_LEN {
            return Err(IdError::InvalidLength { len: bytes.len() });
        }

        let mut raw = [0u8; Self::BYTES_LEN];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = nibble(pair[0]).ok_or(IdError::InvalidCharacter {
                byte: pair[0],
                index: i * 2,
            })?;
            let lo = nibble(pair[1]).ok_or(IdError::InvalidCharacter {
                byte: pair[1],
                index: i * 2 + 1,
            })?;
            raw[i] = (hi << 4) | lo;
        }

        Ok(Self(ObjectId::from_bytes(raw)))
    }

    /// Encodes this identifier into its wire form.
    pub fn encode(&self) -> String {
        self.0.to_hex()
    }

    pub const fn object_id(&self) -> ObjectId {
        self.0
    }
}

const fn nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

impl From<ObjectId> for BlogId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<BlogId> for ObjectId {
    fn from(id: BlogId) -> Self {
        id.0
    }
}

impl FromStr for BlogId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_valid_identifiers() {
        let samples = [
            "602a5d6b2738b05ae3c7bde2",
            "000000000000000000000000",
            "ffffffffffffffffffffffff",
            "0123456789abcdef01234567",
        ];
        for s in samples {
            let id = BlogId::decode(s).unwrap();
            assert_eq!(id.encode(), s);
            assert_eq!(id.to_string(), s);
        }
    }

    #[test]
    fn round_trips_generated_object_ids() {
        for _ in 0..256 {
            let oid = ObjectId::new();
            let hex = oid.to_hex();
            let id = BlogId::decode(&hex).unwrap();
            assert_eq!(ObjectId::from(id), oid);
            assert_eq!(id.encode(), hex);
        }
    }

    #[test]
    fn decodes_to_expected_bytes() {
        let id = BlogId::decode("0102030405060708090a0b0c").unwrap();
        assert_eq!(
            id.object_id().bytes(),
            [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(BlogId::decode(""), Err(IdError::InvalidLength { len: 0 }));
        assert_eq!(
            BlogId::decode("602a5d6b2738b05ae3c7bde"),
            Err(IdError::InvalidLength { len: 23 })
        );
        assert_eq!(
            BlogId::decode("602a5d6b2738b05ae3c7bde2a"),
            Err(IdError::InvalidLength { len: 25 })
        );
        assert!(matches!(
            BlogId::decode("not-hex"),
            Err(IdError::InvalidLength { len: 7 })
        ));
    }

    #[test]
    fn rejects_non_hex_characters() {
        assert_eq!(
            BlogId::decode("602a5d6b2738b05ae3c7bdzz"),
            Err(IdError::InvalidCharacter {
                byte: b'z',
                index: 22
            })
        );
        assert_eq!(
            BlogId::decode("-02a5d6b2738b05ae3c7bde2"),
            Err(IdError::InvalidCharacter {
                byte: b'-',
                index: 0
            })
        );
    }

    #[test]
    fn rejects_uppercase_hex() {
        assert_eq!(
            BlogId::decode("602A5D6B2738B05AE3C7BDE2"),
            Err(IdError::InvalidCharacter {
                byte: b'A',
                index: 3
            })
        );
    }

    #[test]
    fn rejects_non_ascii_input() {
        // 12 two-byte characters: 24 bytes but not ASCII hex.
        let s = "éééééééééééé";
        assert_eq!(s.len(), 24);
        assert!(matches!(
            BlogId::decode(s),
            Err(IdError::InvalidCharacter { index: 0, .. })
        ));
    }

    #[test]
    fn error_messages_are_readable() {
        assert_eq!(
            IdError::InvalidLength { len: 3 }.to_string(),
            "invalid length: 3 (expected 24)"
        );
        assert_eq!(
            IdError::InvalidCharacter {
                byte: b'x',
                index: 5
            }
            .to_string(),
            "invalid byte 0x78 at index 5"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Every lowercase 24-digit hex string decodes and encodes back to
        /// itself.
        #[test]
        fn lowercase_hex_round_trips(s in "[0-9a-f]{24}") {
            let id = BlogId::decode(&s).unwrap();
            prop_assert_eq!(id.encode(), s.clone());
            prop_assert_eq!(id.object_id().to_hex(), s);
        }

        /// One uppercase hex digit anywhere is enough to reject the id.
        #[test]
        fn any_uppercase_digit_is_rejected(
            s in "[0-9a-f]{24}",
            index in 0usize..24,
            upper in "[A-F]",
        ) {
            let mut raw = s.into_bytes();
            raw[index] = upper.as_bytes()[0];
            let s = String::from_utf8(raw).unwrap();

            prop_assert_eq!(
                BlogId::decode(&s),
                Err(IdError::InvalidCharacter { byte: upper.as_bytes()[0], index })
            );
        }

        /// Any length other than 24 is rejected before the content is
        /// looked at.
        #[test]
        fn wrong_length_is_rejected(s in "[0-9a-fA-F]{0,23}|[0-9a-fA-F]{25,48}") {
            prop_assert_eq!(
                BlogId::decode(&s),
                Err(IdError::InvalidLength { len: s.len() })
            );
        }
    }
}
