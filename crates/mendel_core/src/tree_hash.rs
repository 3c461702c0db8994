//! Compact binary identifiers for resolved trees.
//!
//! Layout, before base64:
//!
//! | bytes | content |
//! |---|---|
//! | 6 | magic `mendel` |
//! | 1 | version (`1`) |
//! | n | branch indices `0..=254` |
//! | 1 | terminator `255` |
//! | 2 | file count, little-endian |
//! | 20 | digest |

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine as _};
use mendel_common::{SourceDigest, DIGEST_LEN};

use crate::error::TreeHashError;

const MAGIC: [u8; 6] = *b"mendel";
const VERSION: u8 = 1;
const TERMINATOR: u8 = 255;

/// Decoder that accepts URL-safe input with or without padding.
const DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A decoded tree hash: one branch index per visited module, the file count
/// and the combined digest of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeHash {
    branches: Vec<u8>,
    file_count: u16,
    digest: SourceDigest,
}

impl TreeHash {
    /// Builds a tree hash, rejecting branch indices that cannot be encoded.
    pub fn new(
        branches: &[usize],
        file_count: u16,
        digest: SourceDigest,
    ) -> Result<Self, TreeHashError> {
        let branches = branches
            .iter()
            .map(|&index| match u8::try_from(index) {
                Ok(b) if b != TERMINATOR => Ok(b),
                _ => Err(TreeHashError::BranchOutOfRange { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            branches,
            file_count,
            digest,
        })
    }

    /// Branch indices in visit order.
    pub fn branches(&self) -> &[u8] {
        &self.branches
    }

    /// Number of files in the tree.
    pub fn file_count(&self) -> u16 {
        self.file_count
    }

    /// Combined digest of the tree.
    pub fn digest(&self) -> &SourceDigest {
        &self.digest
    }

    /// Serializes to the binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAGIC.len() + 4 + self.branches.len() + DIGEST_LEN);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&self.branches);
        out.push(TERMINATOR);
        out.extend_from_slice(&self.file_count.to_le_bytes());
        out.extend_from_slice(self.digest.as_bytes());
        out
    }

    /// Parses the binary layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeHashError> {
        let rest = bytes.strip_prefix(&MAGIC).ok_or(TreeHashError::Magic)?;
        let (&version, rest) = rest.split_first().ok_or(TreeHashError::Unterminated)?;
        if version != VERSION {
            return Err(TreeHashError::Version { found: version });
        }
        let end = rest
            .iter()
            .position(|&b| b == TERMINATOR)
            .ok_or(TreeHashError::Unterminated)?;
        let branches = rest[..end].to_vec();
        let rest = &rest[end + 1..];
        if rest.len() < 2 {
            return Err(TreeHashError::MissingFileCount);
        }
        let file_count = u16::from_le_bytes([rest[0], rest[1]]);
        let digest: [u8; DIGEST_LEN] = rest[2..]
            .try_into()
            .map_err(|_| TreeHashError::Digest {
                len: rest.len() - 2,
            })?;
        Ok(Self {
            branches,
            file_count,
            digest: SourceDigest::from_raw(digest),
        })
    }

    /// Encodes as URL-safe base64 without padding.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    /// Decodes the URL-safe base64 form. Padding is optional.
    pub fn decode(hash: &str) -> Result<Self, TreeHashError> {
        let bytes = DECODER
            .decode(hash)
            .map_err(|_| TreeHashError::Base64)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeHash {
        TreeHash::new(&[0, 1, 0, 254], 4, SourceDigest::of(b"tree")).unwrap()
    }

    #[test]
    fn round_trip() {
        let hash = sample();
        let encoded = hash.encode();
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(TreeHash::decode(&encoded).unwrap(), hash);
    }

    #[test]
    fn empty_branch_list() {
        let hash = TreeHash::new(&[], 0, SourceDigest::of(b"")).unwrap();
        let bytes = hash.to_bytes();
        assert_eq!(bytes[7], TERMINATOR);
        assert_eq!(bytes.len(), 6 + 1 + 1 + 2 + 20);
        assert_eq!(TreeHash::decode(&hash.encode()).unwrap(), hash);
    }

    #[test]
    fn padded_input_is_accepted() {
        let hash = sample();
        let mut padded = hash.encode();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        assert_eq!(TreeHash::decode(&padded).unwrap(), hash);
    }

    #[test]
    fn branch_out_of_range() {
        let err = TreeHash::new(&[255], 1, SourceDigest::of(b"")).unwrap_err();
        assert_eq!(err, TreeHashError::BranchOutOfRange { index: 255 });
        let err = TreeHash::new(&[1000], 1, SourceDigest::of(b"")).unwrap_err();
        assert_eq!(err.code(), "BADHASH");
    }

    #[test]
    fn surrounding_whitespace_is_rejected() {
        let padded = format!(" {}\n", sample().encode());
        assert_eq!(TreeHash::decode(&padded).unwrap_err(), TreeHashError::Base64);
    }

    #[test]
    fn bad_base64() {
        assert_eq!(TreeHash::decode("not base64!").unwrap_err(), TreeHashError::Base64);
    }

    #[test]
    fn wrong_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'M';
        let encoded = URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(TreeHash::decode(&encoded).unwrap_err(), TreeHashError::Magic);
    }

    #[test]
    fn wrong_version() {
        let mut bytes = sample().to_bytes();
        bytes[6] = 2;
        let encoded = URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(
            TreeHash::decode(&encoded).unwrap_err(),
            TreeHashError::Version { found: 2 }
        );
    }

    #[test]
    fn unterminated_branches() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[VERSION, 0, 1, 2]);
        let encoded = URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(
            TreeHash::decode(&encoded).unwrap_err(),
            TreeHashError::Unterminated
        );
    }

    #[test]
    fn missing_file_count() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[VERSION, 0, TERMINATOR, 7]);
        let encoded = URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(
            TreeHash::decode(&encoded).unwrap_err(),
            TreeHashError::MissingFileCount
        );
    }

    #[test]
    fn truncated_digest() {
        let mut bytes = sample().to_bytes();
        bytes.truncate(bytes.len() - 3);
        let encoded = URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(
            TreeHash::decode(&encoded).unwrap_err(),
            TreeHashError::Digest { len: 17 }
        );
    }

    #[test]
    fn truncated_string_is_badhash() {
        let encoded = sample().encode();
        for cut in 1..encoded.len() {
            let err = TreeHash::decode(&encoded[..cut]).unwrap_err();
            assert_eq!(err.code(), "BADHASH");
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        let encoded = URL_SAFE_NO_PAD.encode(&bytes);
        assert_eq!(
            TreeHash::decode(&encoded).unwrap_err(),
            TreeHashError::Digest { len: 21 }
        );
    }
}
